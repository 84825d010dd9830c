//! Mechanisms for tracking which size classes hold free nodes
//!
//! Searching 256 bins one by one would be slow, so non-empty bins are tracked
//! in a two-level bitmap: one bit per top-level bin in a `u32`, and one bit
//! per leaf bin in a `u8` per top-level bin. Finding the smallest non-empty
//! bin above a given size class then takes at most two bit scans.

use crate::{
    node::NodeIndex,
    size_class::{self, BinIndex, NUM_LEAF_BINS, NUM_TOP_BINS},
};


/// Free list heads and occupancy bitmaps of all bins
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Bins {
    /// Bit `t` is set iff `leaf_bitmaps[t]` is nonzero
    top_bitmap: u32,

    /// Bit `l` of entry `t` is set iff bin `t * 8 + l` has a free list head
    leaf_bitmaps: [u8; NUM_TOP_BINS],

    /// Head of each bin's free node list
    heads: [Option<NodeIndex>; NUM_LEAF_BINS],
}

impl Bins {
    /// Set up an empty bin table
    pub const fn new() -> Self {
        Self {
            top_bitmap: 0,
            leaf_bitmaps: [0; NUM_TOP_BINS],
            heads: [None; NUM_LEAF_BINS],
        }
    }

    /// Forget about all free nodes
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// Head of a bin's free node list, if the bin is not empty
    pub fn head(&self, bin: BinIndex) -> Option<NodeIndex> {
        self.heads[usize::from(bin)]
    }

    /// Replace the head of a bin's free node list, updating the bitmaps
    pub fn set_head(&mut self, bin: BinIndex, head: Option<NodeIndex>) {
        let top = bin.top() as usize;
        let leaf_bit = 1u8 << bin.leaf();
        self.heads[usize::from(bin)] = head;

        if head.is_some() {
            self.leaf_bitmaps[top] |= leaf_bit;
            self.top_bitmap |= 1 << top;
        } else {
            self.leaf_bitmaps[top] &= !leaf_bit;
            if self.leaf_bitmaps[top] == 0 {
                self.top_bitmap &= !(1 << top);
            }
        }
    }

    /// Find the smallest non-empty bin at or above `min_bin`
    ///
    /// Within the top-level bin of `min_bin`, only leaf bins at or above its
    /// leaf are eligible. Any leaf of a higher top-level bin will do, since
    /// all of them are larger than `min_bin`.
    pub fn search(&self, min_bin: BinIndex) -> Option<BinIndex> {
        let min_top = min_bin.top();

        // Try the leaf bins of the requested top-level bin first
        if self.top_bitmap & (1 << min_top) != 0 {
            let leaves = u32::from(self.leaf_bitmaps[min_top as usize]);
            if let Some(leaf) = size_class::find_lowest_set_bit_after(leaves, min_bin.leaf()) {
                return Some(BinIndex::from_parts(min_top, leaf));
            }
        }

        // Otherwise, the lowest leaf of the next non-empty top-level bin. A
        // top-level bit is only set when one of its leaf bits is.
        let top = size_class::find_lowest_set_bit_after(self.top_bitmap, min_top + 1)?;
        let leaves = self.leaf_bitmaps[top as usize];
        debug_assert_ne!(leaves, 0, "Top-level bin is marked used but has no leaf");
        Some(BinIndex::from_parts(top, leaves.trailing_zeros()))
    }

    /// Largest non-empty bin, if any
    pub fn highest(&self) -> Option<BinIndex> {
        if self.top_bitmap == 0 {
            return None;
        }
        let top = size_class::highest_set_bit(self.top_bitmap);
        let leaf = size_class::highest_set_bit(u32::from(self.leaf_bitmaps[top as usize]));
        Some(BinIndex::from_parts(top, leaf))
    }

    /// Number of non-empty bins
    pub fn num_used(&self) -> u32 {
        self.leaf_bitmaps
            .iter()
            .map(|&leaves| size_class::count_bits(u32::from(leaves)))
            .sum()
    }

    /// Check that the bitmaps agree with the list heads
    #[cfg(test)]
    pub fn debug_check_invariants(&self) {
        for top in 0..NUM_TOP_BINS {
            assert_eq!(
                self.top_bitmap & (1 << top) != 0,
                self.leaf_bitmaps[top] != 0,
                "Top-level bit {} is out of sync with its leaves",
                top
            );
            for leaf in 0..8 {
                let bin = BinIndex::from_parts(top as u32, leaf);
                assert_eq!(
                    self.leaf_bitmaps[top] & (1 << leaf) != 0,
                    self.head(bin).is_some(),
                    "Leaf bit of bin {:?} is out of sync with its list head",
                    bin
                );
            }
        }
    }
}

impl Default for Bins {
    fn default() -> Self {
        Self::new()
    }
}
