//! Summaries of an allocator's free space

use crate::size_class::NUM_LEAF_BINS;


/// Quick summary of the free space
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct StorageReport {
    /// Total number of free offsets which may still be allocated
    ///
    /// Zero when no node slot is left, since nothing can be allocated then.
    pub total_free_space: u32,

    /// Lower bound of the largest free range
    ///
    /// This is the floor of the largest non-empty size class, the actual
    /// largest free range may be up to 1/8 larger.
    pub largest_free_region: u32,
}


/// Free ranges filed in one size class
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct StorageRegion {
    /// Smallest size of this size class
    pub size: u64,

    /// Number of free ranges currently filed in this size class
    pub count: u32,
}


/// Per-size-class breakdown of the free space
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StorageReportFull {
    /// One entry per bin, in increasing size order
    pub free_regions: [StorageRegion; NUM_LEAF_BINS],
}

impl StorageReportFull {
    /// Number of free ranges across all size classes
    pub fn num_free_regions(&self) -> u32 {
        self.free_regions.iter().map(|region| region.count).sum()
    }
}

impl Default for StorageReportFull {
    fn default() -> Self {
        Self {
            free_regions: [StorageRegion::default(); NUM_LEAF_BINS],
        }
    }
}
