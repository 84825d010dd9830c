//! Receipts handed out by the allocator

use crate::node::NodeIndex;


/// A range of offsets reserved from an `Allocator`
///
/// This is a plain value which does not borrow the allocator. It must be
/// passed back to `Allocator::free()` of the allocator that produced it
/// exactly once, which resets it to `Allocation::INVALID`. Copies made before
/// that call are not reset, and must not be freed again.
///
/// Failed allocations are also reported as `Allocation::INVALID`, so please
/// check `is_valid()` before using the offset.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[must_use]
pub struct Allocation {
    /// First reserved offset
    offset: u32,

    /// Number of reserved offsets
    size: u32,

    /// Index of the node which tracks this range inside the allocator
    token: NodeIndex,
}

impl Allocation {
    /// Marker value for "no space" and "already freed"
    pub const NO_SPACE: u32 = u32::MAX;

    /// The invalid allocation
    pub const INVALID: Self = Self {
        offset: Self::NO_SPACE,
        size: 0,
        token: Self::NO_SPACE,
    };

    pub(crate) fn new(offset: u32, size: u32, token: NodeIndex) -> Self {
        debug_assert_ne!(token, Self::NO_SPACE, "Node index collides with the sentinel");
        Self { offset, size, token }
    }

    /// First offset of the reserved range
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Length of the reserved range
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Truth that this allocation denotes a live range
    pub fn is_valid(&self) -> bool {
        self.offset != Self::NO_SPACE && self.token != Self::NO_SPACE
    }

    /// Node tracking this allocation
    pub(crate) fn token(&self) -> NodeIndex {
        self.token
    }

    /// Turn this allocation into the invalid allocation
    pub(crate) fn invalidate(&mut self) {
        *self = Self::INVALID;
    }
}

impl Default for Allocation {
    fn default() -> Self {
        Self::INVALID
    }
}
