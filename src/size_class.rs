//! Mechanisms for mapping allocation sizes to size classes (bins)
//!
//! Free nodes are filed into bins according to a tiny floating-point encoding
//! of their size: 3 mantissa bits, and an exponent which is the position of
//! the highest set bit minus the mantissa width. This keeps the bin count small
//! and fixed (256) while bounding the rounding waste to 1/8 of the request.
//!
//! Sizes below `MANTISSA_VALUE` are "denormal": one bin per size.

/// Number of mantissa bits in the size class encoding
pub const MANTISSA_BITS: u32 = 3;

/// Number of distinct mantissa values, also the first "normal" size
pub const MANTISSA_VALUE: u32 = 1 << MANTISSA_BITS;

/// Mask extracting the mantissa from a bin index
pub const MANTISSA_MASK: u32 = MANTISSA_VALUE - 1;

/// Number of top-level bins (one bit each in the top bitmap)
pub const NUM_TOP_BINS: usize = 32;

/// Number of leaf bins per top-level bin (one bit each in a leaf bitmap)
pub const BINS_PER_LEAF: usize = 8;

/// Total number of bins
pub const NUM_LEAF_BINS: usize = NUM_TOP_BINS * BINS_PER_LEAF;

/// Shift from bin index to top-level bin index
pub const TOP_BINS_INDEX_SHIFT: u32 = 3;

/// Mask from bin index to leaf bin index within its top-level bin
pub const LEAF_BINS_INDEX_MASK: u32 = 0x7;


/// Index of a size class, in `0..NUM_LEAF_BINS`
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub struct BinIndex(u32);

impl BinIndex {
    /// Build a bin index from its top-level and leaf coordinates
    pub fn from_parts(top: u32, leaf: u32) -> Self {
        debug_assert!((top as usize) < NUM_TOP_BINS, "Top bin out of range");
        debug_assert!((leaf as usize) < BINS_PER_LEAF, "Leaf bin out of range");
        Self((top << TOP_BINS_INDEX_SHIFT) | leaf)
    }

    /// Build a bin index from its flat position in `0..NUM_LEAF_BINS`
    pub fn from_usize(index: usize) -> Self {
        debug_assert!(index < NUM_LEAF_BINS, "Bin index out of range");
        Self(index as u32)
    }

    /// Smallest bin whose size class can serve a request of `size`
    ///
    /// Rounds up whenever `size` is not exactly representable, so that every
    /// node filed in the returned bin or above is large enough.
    pub fn round_up(size: u32) -> Self {
        if size < MANTISSA_VALUE {
            return Self(size);
        }

        let mantissa_start = highest_set_bit(size) - MANTISSA_BITS;
        let exponent = mantissa_start + 1;
        let mut mantissa = (size >> mantissa_start) & MANTISSA_MASK;

        let low_bits_mask = (1 << mantissa_start) - 1;
        if size & low_bits_mask != 0 {
            mantissa += 1;
        }

        // Mantissa overflow carries into the exponent
        Self((exponent << MANTISSA_BITS) + mantissa)
    }

    /// Largest bin whose size class floor does not exceed `size`
    ///
    /// This is where a free node of `size` bytes must be filed, so that it
    /// can serve any request which rounds up to this bin.
    pub fn round_down(size: u32) -> Self {
        if size < MANTISSA_VALUE {
            return Self(size);
        }

        let mantissa_start = highest_set_bit(size) - MANTISSA_BITS;
        let exponent = mantissa_start + 1;
        let mantissa = (size >> mantissa_start) & MANTISSA_MASK;
        Self((exponent << MANTISSA_BITS) | mantissa)
    }

    /// Smallest size that belongs to this size class
    ///
    /// The topmost classes lie beyond `u32::MAX`, hence the wider type.
    pub fn floor_size(self) -> u64 {
        let exponent = self.0 >> MANTISSA_BITS;
        let mantissa = u64::from(self.0 & MANTISSA_MASK);
        if exponent == 0 {
            mantissa
        } else {
            (mantissa | u64::from(MANTISSA_VALUE)) << (exponent - 1)
        }
    }

    /// Index of the top-level bin
    pub fn top(self) -> u32 {
        self.0 >> TOP_BINS_INDEX_SHIFT
    }

    /// Index of the leaf bin within its top-level bin
    pub fn leaf(self) -> u32 {
        self.0 & LEAF_BINS_INDEX_MASK
    }
}

impl From<BinIndex> for usize {
    fn from(x: BinIndex) -> usize {
        x.0 as usize
    }
}


/// Number of set bits in a word
pub fn count_bits(value: u32) -> u32 {
    value.count_ones()
}

/// Position of the highest set bit of a nonzero word
pub fn highest_set_bit(value: u32) -> u32 {
    debug_assert_ne!(value, 0, "Zero has no highest set bit");
    31 - value.leading_zeros()
}

/// Position of the lowest set bit at or above `start_bit`, if any
pub fn find_lowest_set_bit_after(mask: u32, start_bit: u32) -> Option<u32> {
    // Shifting by 32 or more clears everything
    let bits_after = mask & u32::MAX.checked_shl(start_bit).unwrap_or(0);
    if bits_after == 0 {
        None
    } else {
        Some(bits_after.trailing_zeros())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_primitives() {
        assert_eq!(count_bits(0), 0);
        assert_eq!(count_bits(0b1011_0000), 3);
        assert_eq!(count_bits(u32::MAX), 32);

        assert_eq!(highest_set_bit(1), 0);
        assert_eq!(highest_set_bit(0b1011_0000), 7);
        assert_eq!(highest_set_bit(u32::MAX), 31);

        assert_eq!(find_lowest_set_bit_after(0, 0), None);
        assert_eq!(find_lowest_set_bit_after(0b1011_0000, 0), Some(4));
        assert_eq!(find_lowest_set_bit_after(0b1011_0000, 4), Some(4));
        assert_eq!(find_lowest_set_bit_after(0b1011_0000, 5), Some(5));
        assert_eq!(find_lowest_set_bit_after(0b1011_0000, 6), Some(7));
        assert_eq!(find_lowest_set_bit_after(0b1011_0000, 8), None);
        assert_eq!(find_lowest_set_bit_after(1 << 31, 31), Some(31));
        assert_eq!(find_lowest_set_bit_after(u32::MAX, 32), None);
    }

    #[test]
    fn denormal_sizes() {
        for size in 0..MANTISSA_VALUE {
            assert_eq!(usize::from(BinIndex::round_up(size)), size as usize);
            assert_eq!(usize::from(BinIndex::round_down(size)), size as usize);
            assert_eq!(BinIndex::round_up(size).floor_size(), u64::from(size));
        }
    }

    #[test]
    fn known_bins() {
        // Exactly representable sizes land in the same bin both ways
        assert_eq!(usize::from(BinIndex::round_up(8)), 8);
        assert_eq!(usize::from(BinIndex::round_down(8)), 8);
        assert_eq!(usize::from(BinIndex::round_up(96)), 36);
        assert_eq!(usize::from(BinIndex::round_down(96)), 36);
        assert_eq!(BinIndex::from_usize(36).floor_size(), 96);

        // Others differ by one bin
        assert_eq!(usize::from(BinIndex::round_up(100)), 37);
        assert_eq!(usize::from(BinIndex::round_down(100)), 36);
        assert_eq!(usize::from(BinIndex::round_up(200)), 45);
        assert_eq!(usize::from(BinIndex::round_down(200)), 44);
        assert_eq!(usize::from(BinIndex::round_up(50)), 29);
        assert_eq!(usize::from(BinIndex::round_down(924)), 62);

        // Mantissa overflow carries into the next exponent
        let carried = BinIndex::round_up(31);
        assert_eq!(carried.top(), 3);
        assert_eq!(carried.leaf(), 0);
        assert_eq!(carried.floor_size(), 32);

        // The largest sizes still fit in the bin table
        let top = BinIndex::round_up(u32::MAX);
        assert!(usize::from(top) < NUM_LEAF_BINS);
        assert_eq!(top.top(), 30);
        assert_eq!(top.floor_size(), 1 << 32);
    }

    #[test]
    fn bin_parts() {
        for index in 0..NUM_LEAF_BINS {
            let bin = BinIndex::from_usize(index);
            assert_eq!(BinIndex::from_parts(bin.top(), bin.leaf()), bin);
        }
    }

    #[test]
    fn floor_sizes_are_monotonic() {
        for index in 1..NUM_LEAF_BINS {
            let prev = BinIndex::from_usize(index - 1).floor_size();
            let next = BinIndex::from_usize(index).floor_size();
            assert!(prev < next, "Bin {} floor is not above bin {}", index, index - 1);
        }
    }

    #[test]
    fn rounding_bounds() {
        let mut sizes = (1..4096).collect::<Vec<u32>>();
        for shift in 12..32 {
            let base = 1u32 << shift;
            sizes.extend_from_slice(&[base - 1, base, base + 1, base | (base >> 3) | 1]);
        }
        sizes.push(u32::MAX);

        for size in sizes {
            // Rounding down never overstates what a free node can serve
            let down = BinIndex::round_down(size);
            assert!(down.floor_size() <= u64::from(size));

            // Rounding up never under-serves, and wastes at most 1/8
            let up = BinIndex::round_up(size);
            assert!(up >= down);
            let floor = up.floor_size();
            assert!(floor >= u64::from(size), "Bin too small for {}", size);
            assert!(floor * 8 <= u64::from(size) * 9, "Bin too wasteful for {}", size);
        }
    }
}
