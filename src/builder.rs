//! Mechanism for building an `Allocator`, with proper invariant checking

use crate::Allocator;


/// Builder for an offset allocator
//
// NOTE: The main purpose of this builder is to ensure that a certain number of
//       preconditions are upheld upon constructing the allocator. These are
//       listed as "must" bullet points in the struct members' doc comments.
#[derive(Debug, Default)]
pub struct Builder {
    /// Number of offsets managed by the allocator
    /// - Must be specified
    /// - Must be nonzero, there is nothing to allocate otherwise
    capacity: Option<u32>,

    /// Maximal number of simultaneously live allocations
    /// - Must be specified
    /// - Must be nonzero
    /// - Must be below `u32::MAX`, so that node indices (which go up to this
    ///   value inclusive) never collide with the invalid allocation marker
    max_allocs: Option<u32>,
}

impl Builder {
    /// Start building an allocator
    pub const fn new() -> Self {
        Self {
            capacity: None,
            max_allocs: None,
        }
    }

    /// Set the number of offsets managed by the allocator
    ///
    /// Allocations will be carved out of the range `0..capacity`. What an
    /// offset means (byte, descriptor slot...) is up to the caller.
    pub fn capacity(&mut self, capacity: u32) -> &mut Self {
        assert!(capacity != 0, "Allocator capacity must not be zero");
        assert!(self.capacity.replace(capacity).is_none(),
                "Allocator capacity must only be set once");
        self
    }

    /// Set the maximal number of simultaneously live allocations
    ///
    /// The allocator's bookkeeping storage is proportional to this number,
    /// and is allocated once and for all when the allocator is built.
    pub fn max_allocs(&mut self, max_allocs: u32) -> &mut Self {
        assert!(max_allocs != 0, "Maximal allocation count must not be zero");
        assert!(max_allocs < u32::MAX,
                "Maximal allocation count must be below u32::MAX");
        assert!(self.max_allocs.replace(max_allocs).is_none(),
                "Maximal allocation count must only be set once");
        self
    }

    /// Build the previously configured allocator
    ///
    /// You must have configured a capacity and a maximal allocation count
    /// before calling this function.
    pub fn build(&self) -> Allocator {
        let capacity = self.capacity
                           .expect("You must specify an allocator capacity");
        let max_allocs = self.max_allocs
                             .expect("You must specify a maximal allocation count");

        // All preconditions listed in the Builder struct documentation have
        // been checked by the setters at this point.
        Allocator::new_unchecked(capacity, max_allocs)
    }
}
