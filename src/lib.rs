//! This crate provides an Offset Allocator, which you can use to carve
//! non-overlapping ranges out of a fixed-size linear extent that is managed
//! by someone else: a descriptor table, a GPU buffer, a heap arena...
//!
//! The allocator never touches the extent itself. It only hands out offsets
//! and sizes, and takes them back, with O(1) allocation and liberation and a
//! bookkeeping footprint that does not depend on how fragmented things get.
//!
//! # Offset allocation primer
//!
//! The managed range `0..capacity` is split into **nodes**, contiguous
//! segments which are either used by a live allocation or free. Nodes are
//! chained to their physical neighbours, so that upon liberation, a node can
//! be merged with the free nodes on either side of it in constant time. As a
//! result, two free nodes are never adjacent once an operation completes.
//!
//! Free nodes are filed into 256 **bins** according to a tiny floating-point
//! encoding of their size (3 mantissa bits). Allocation rounds the requested
//! size up to the next size class, then looks for the first non-empty bin at or
//! above that class using a two-level bitmap, takes the first node from it,
//! and gives back the unused tail of that node as a new free node. Because
//! size classes are geometric, at most 1/8 of the requested size is wasted by
//! this rounding.
//!
//! The number of nodes is bounded, and chosen at construction time: an
//! allocator that can hold N simultaneous allocations needs N+1 nodes, since
//! every used node may be followed by a free remainder. Once all node slots
//! are in use, allocation fails even if free space remains.
//!
//! # Usage
//!
//! Allocations are reported as plain `Allocation` values, which must be
//! checked with `is_valid()` (failure is reported as `Allocation::INVALID`)
//! and later given back to the allocator exactly once:
//!
//! ```
//! use offalloc::Allocator;
//!
//! let mut allocator = Allocator::with_capacity(1024, 8);
//! let mut allocation = allocator.allocate(100);
//! assert!(allocation.is_valid());
//! assert_eq!(allocation.offset(), 0);
//! allocator.free(&mut allocation);
//! assert!(!allocation.is_valid());
//! assert_eq!(allocator.free_size(), 1024);
//! ```
//!
//! The allocator is not thread-safe: it takes `&mut self` everywhere, so
//! sharing one between threads requires an external lock.
//!
//! Allocations carry the index of their bookkeeping node, nothing more.
//! Passing an allocation to an allocator which did not produce it, or keeping
//! an allocation around across `reset()`, will silently corrupt the
//! allocator's bookkeeping (or panic if the index is out of range).

mod allocation;
mod bins;
mod builder;
mod error;
mod node;
mod report;
mod size_class;

use crate::{
    bins::Bins,
    node::{Node, NodeArena, NodeIndex},
    size_class::BinIndex,
};

use log::{debug, trace};


// Re-export the public parts of the submodules at the crate root
pub use crate::{
    allocation::Allocation,
    builder::Builder,
    error::AllocError,
    report::{StorageRegion, StorageReport, StorageReportFull},
};


/// An offset allocator
///
/// The `Default` allocator is a terminated one, which owns no storage and
/// cannot allocate anything. This is also the state in which `term()` and
/// `std::mem::take()` leave an allocator.
#[derive(Debug, Default)]
pub struct Allocator {
    /// Number of offsets managed by the allocator
    size: u32,

    /// Maximal number of simultaneously live allocations
    max_allocs: u32,

    /// Sum of the sizes of all free nodes
    free_storage: u32,

    /// Free lists of all size classes
    bins: Bins,

    /// Storage for `max_allocs + 1` nodes, empty once terminated
    nodes: NodeArena,
}

impl Allocator {
    /// Start building an allocator
    ///
    /// See the `Builder` documentation for more details on the subsequent
    /// allocator configuration process.
    pub const fn new() -> Builder {
        Builder::new()
    }

    /// Build an allocator managing offsets `0..size`, with room for
    /// `max_allocs` simultaneous allocations
    ///
    /// Both parameters must be nonzero, and `max_allocs` must be below
    /// `u32::MAX`.
    pub fn with_capacity(size: u32, max_allocs: u32) -> Self {
        Builder::new().capacity(size).max_allocs(max_allocs).build()
    }

    /// Allocator constructor proper, without invariant checking
    ///
    /// Parameters are assumed to uphold the preconditions listed in the
    /// `Builder` struct documentation.
    pub(crate) fn new_unchecked(size: u32, max_allocs: u32) -> Self {
        let mut allocator = Self {
            size,
            max_allocs,
            free_storage: 0,
            bins: Bins::new(),
            nodes: NodeArena::new(max_allocs + 1),
        };
        allocator.reset();
        debug!("Created offset allocator with capacity {} and {} allocation slots",
               size, max_allocs);
        allocator
    }

    /// Number of offsets managed by this allocator (0 once terminated)
    pub fn capacity(&self) -> u32 {
        self.size
    }

    /// Maximal number of simultaneously live allocations (0 once terminated)
    pub fn max_allocs(&self) -> u32 {
        self.max_allocs
    }

    /// Truth that this allocator has released its storage
    pub fn is_terminated(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of offsets which are currently allocated
    pub fn used_size(&self) -> u32 {
        self.size - self.free_size()
    }

    /// Number of offsets which are currently free (0 once terminated)
    ///
    /// Some of this space may not be allocatable in one piece due to
    /// fragmentation, see `storage_report()` for an estimate of the largest
    /// free range.
    pub fn free_size(&self) -> u32 {
        if self.is_terminated() {
            0
        } else {
            self.free_storage
        }
    }

    /// Forget about every allocation, making the whole range free again
    ///
    /// Outstanding allocations must not be freed after this, as their node
    /// indices may be reused by unrelated allocations. Does nothing on a
    /// terminated allocator.
    pub fn reset(&mut self) {
        if self.is_terminated() {
            return;
        }

        self.free_storage = 0;
        self.bins.clear();
        self.nodes.reset();
        self.insert_node(0, self.size);
        debug!("Reset offset allocator with capacity {}", self.size);
    }

    /// Release this allocator's storage
    ///
    /// Every subsequent allocation will fail, and freeing will only invalidate
    /// the allocation that is passed in. Dropping the allocator has the same
    /// effect as terminating it.
    pub fn term(&mut self) {
        if !self.is_terminated() {
            debug!("Terminated offset allocator with capacity {}", self.size);
        }
        *self = Self::default();
    }

    /// Allocate `size` contiguous offsets
    ///
    /// Returns `Allocation::INVALID` if the request is empty, if the
    /// allocation count limit has been reached, or if no free range is large
    /// enough. Use `try_allocate()` to tell these cases apart.
    pub fn allocate(&mut self, size: u32) -> Allocation {
        self.try_allocate(size).unwrap_or(Allocation::INVALID)
    }

    /// Allocate `size` contiguous offsets, rounded up to a multiple of
    /// `alignment`
    ///
    /// Only the size is rounded, the offset of the allocation is not aligned
    /// unless every allocation made from this allocator is. Any nonzero
    /// alignment is accepted, a zero alignment yields `Allocation::INVALID`.
    pub fn allocate_aligned(&mut self, size: u32, alignment: u32) -> Allocation {
        self.try_allocate_aligned(size, alignment)
            .unwrap_or(Allocation::INVALID)
    }

    /// Like `allocate_aligned()`, but reports why allocation failed
    pub fn try_allocate_aligned(
        &mut self,
        size: u32,
        alignment: u32,
    ) -> Result<Allocation, AllocError> {
        if alignment == 0 {
            trace!("Rejected allocation of {} offsets with zero alignment", size);
            return Err(AllocError::ZeroAlignment);
        }
        let aligned_size = size.checked_add(alignment - 1)
                               .map(|padded| padded / alignment * alignment)
                               .ok_or(AllocError::OutOfSpace {
                                   requested: size,
                                   free: self.free_size(),
                               })?;
        self.try_allocate(aligned_size)
    }

    /// Like `allocate()`, but reports why allocation failed
    pub fn try_allocate(&mut self, size: u32) -> Result<Allocation, AllocError> {
        let result = self.allocate_node(size);
        match result {
            Ok(allocation) => trace!("Allocated {} offsets at offset {} (node {})",
                                     size, allocation.offset(), allocation.token()),
            Err(error) => trace!("Failed to allocate {} offsets: {} ({} size classes in use)",
                                 size, error, self.bins.num_used()),
        }
        result
    }

    /// Allocation algorithm proper
    fn allocate_node(&mut self, size: u32) -> Result<Allocation, AllocError> {
        if size == 0 {
            return Err(AllocError::ZeroSize);
        }
        if self.nodes.num_available() == 0 {
            return Err(AllocError::OutOfNodes);
        }
        if size > self.free_size() {
            return Err(AllocError::OutOfSpace {
                requested: size,
                free: self.free_size(),
            });
        }

        // Round the size class up so that any node we find is large enough,
        // then look for the smallest non-empty size class above that.
        let no_fit = AllocError::NoFittingBin { requested: size };
        let bin = self.bins.search(BinIndex::round_up(size)).ok_or(no_fit)?;
        let node_index = self.bins.head(bin).ok_or(no_fit)?;

        // Pop the head of that bin's free list and mark it used
        let node = &mut self.nodes[node_index];
        debug_assert!(!node.used, "Found a used node in a free list");
        debug_assert_eq!(node.bin_list_prev, None, "Bin head has a predecessor");
        let node_total_size = node.data_size;
        let node_offset = node.data_offset;
        let bin_list_next = node.bin_list_next.take();
        node.data_size = size;
        node.used = true;

        self.bins.set_head(bin, bin_list_next);
        if let Some(next_index) = bin_list_next {
            self.nodes[next_index].bin_list_prev = None;
        }
        self.free_storage -= node_total_size;

        // Give back the unused tail of the node as a new free node, which
        // comes right after the allocated one in the neighbour chain.
        let remainder_size = node_total_size - size;
        if remainder_size > 0 {
            let remainder_index = self.insert_node(node_offset + size, remainder_size);
            let neighbor_next = self.nodes[node_index].neighbor_next;
            if let Some(next_index) = neighbor_next {
                self.nodes[next_index].neighbor_prev = Some(remainder_index);
            }
            let remainder = &mut self.nodes[remainder_index];
            remainder.neighbor_prev = Some(node_index);
            remainder.neighbor_next = neighbor_next;
            self.nodes[node_index].neighbor_next = Some(remainder_index);
        }

        Ok(Allocation::new(node_offset, size, node_index))
    }

    /// Give back an allocation, turning it into `Allocation::INVALID`
    ///
    /// Does nothing if the allocation is already invalid, or if it denotes a
    /// node that is not in use anymore. The latter only detects double frees
    /// as long as the allocator has not been reset in between.
    ///
    /// # Panics
    ///
    /// May panic if the allocation was produced by another allocator. More
    /// likely, such an allocation will corrupt this allocator's bookkeeping.
    pub fn free(&mut self, allocation: &mut Allocation) {
        if !allocation.is_valid() {
            return;
        }
        if self.is_terminated() {
            allocation.invalidate();
            return;
        }

        let node_index = allocation.token();
        let node = self.nodes[node_index];
        if !node.used {
            debug!("Ignored double free of node {}", node_index);
            allocation.invalidate();
            return;
        }
        debug_assert_eq!(node.data_offset, allocation.offset(),
                         "Allocation does not match its node");

        let mut offset = node.data_offset;
        let mut size = node.data_size;
        let mut neighbor_prev = node.neighbor_prev;
        let mut neighbor_next = node.neighbor_next;

        // Absorb the previous node if it is free, the offset moves back
        if let Some(prev_index) = neighbor_prev {
            let prev = self.nodes[prev_index];
            if !prev.used {
                debug_assert_eq!(prev.neighbor_next, Some(node_index),
                                 "Neighbour chain is not symmetric");
                debug_assert_eq!(prev.data_end(), u64::from(node.data_offset),
                                 "Neighbour chain has a gap");
                offset = prev.data_offset;
                size += prev.data_size;
                self.remove_node(prev_index);
                neighbor_prev = prev.neighbor_prev;
            }
        }

        // Absorb the next node if it is free, the offset stays put
        if let Some(next_index) = neighbor_next {
            let next = self.nodes[next_index];
            if !next.used {
                debug_assert_eq!(next.neighbor_prev, Some(node_index),
                                 "Neighbour chain is not symmetric");
                size += next.data_size;
                self.remove_node(next_index);
                neighbor_next = next.neighbor_next;
            }
        }

        // File the combined free node, then splice it in place of the nodes
        // that it replaces in the neighbour chain.
        self.nodes.release(node_index);
        let combined_index = self.insert_node(offset, size);
        if let Some(next_index) = neighbor_next {
            self.nodes[combined_index].neighbor_next = Some(next_index);
            self.nodes[next_index].neighbor_prev = Some(combined_index);
        }
        if let Some(prev_index) = neighbor_prev {
            self.nodes[combined_index].neighbor_prev = Some(prev_index);
            self.nodes[prev_index].neighbor_next = Some(combined_index);
        }

        trace!("Freed {} offsets at offset {} (node {})",
               allocation.size(), allocation.offset(), node_index);
        allocation.invalidate();
    }

    /// Quick summary of the free space, in O(1)
    pub fn storage_report(&self) -> StorageReport {
        if self.nodes.num_available() == 0 {
            return StorageReport::default();
        }

        // Node sizes fit in u32, and so do the floors of their size classes
        let largest_free_region = self.bins
                                      .highest()
                                      .map_or(0, |bin| bin.floor_size() as u32);
        StorageReport {
            total_free_space: self.free_storage,
            largest_free_region,
        }
    }

    /// Per-size-class breakdown of the free space
    ///
    /// This walks every free list, so it takes time proportional to the
    /// number of free nodes.
    pub fn storage_report_full(&self) -> StorageReportFull {
        let mut report = StorageReportFull::default();
        for (bin_index, region) in report.free_regions.iter_mut().enumerate() {
            let bin = BinIndex::from_usize(bin_index);
            region.size = bin.floor_size();

            let mut current = self.bins.head(bin);
            while let Some(node_index) = current {
                region.count += 1;
                current = self.nodes[node_index].bin_list_next;
            }
        }
        report
    }

    /// Create a free node and push it at the head of its bin's free list
    ///
    /// A node slot must be available, which callers guarantee by checking for
    /// it upfront or by releasing a node first.
    fn insert_node(&mut self, data_offset: u32, data_size: u32) -> NodeIndex {
        // Round the size class down so that the node can serve every request
        // that rounds up to this class.
        let bin = BinIndex::round_down(data_size);
        let head = self.bins.head(bin);
        let node_index = self.nodes
                             .acquire(Node::new_free(data_offset, data_size, head))
                             .expect("Node slot availability should have been checked");

        if let Some(head_index) = head {
            self.nodes[head_index].bin_list_prev = Some(node_index);
        }
        self.bins.set_head(bin, Some(node_index));
        self.free_storage += data_size;
        node_index
    }

    /// Unlink a free node from its bin's free list and release its slot
    fn remove_node(&mut self, node_index: NodeIndex) {
        let node = self.nodes[node_index];
        debug_assert!(!node.used, "Tried to unlink a used node from a free list");

        match node.bin_list_prev {
            // Easy case: just unlink the node from the middle of the list
            Some(prev_index) => {
                self.nodes[prev_index].bin_list_next = node.bin_list_next;
                if let Some(next_index) = node.bin_list_next {
                    self.nodes[next_index].bin_list_prev = Some(prev_index);
                }
            }

            // Hard case: the node is the head of its bin, which we must find
            None => {
                let bin = BinIndex::round_down(node.data_size);
                debug_assert_eq!(self.bins.head(bin), Some(node_index),
                                 "Free node without predecessor is not a bin head");
                self.bins.set_head(bin, node.bin_list_next);
                if let Some(next_index) = node.bin_list_next {
                    self.nodes[next_index].bin_list_prev = None;
                }
            }
        }

        self.nodes.release(node_index);
        self.free_storage -= node.data_size;
    }

    /// Check every bookkeeping invariant, in time proportional to the number
    /// of nodes
    #[cfg(test)]
    pub(crate) fn debug_check_invariants(&self) {
        self.bins.debug_check_invariants();
        if self.is_terminated() {
            assert_eq!(self.bins.num_used(), 0);
            assert_eq!(self.free_size(), 0);
            return;
        }

        // Exactly one live node starts the neighbour chain
        let live = self.nodes.live_indices();
        let chain_starts = live.iter()
                               .copied()
                               .filter(|&index| self.nodes[index].neighbor_prev.is_none())
                               .collect::<Vec<_>>();
        assert_eq!(chain_starts.len(), 1, "Neighbour chain must have one start");

        // Walking the chain covers the whole range without gaps or overlaps,
        // and never meets two free nodes in a row.
        let mut expected_offset = 0;
        let mut prev_index = None;
        let mut prev_free = false;
        let mut num_chained = 0;
        let mut num_free = 0;
        let mut free_sum = 0;
        let mut current = Some(chain_starts[0]);
        while let Some(index) = current {
            let node = &self.nodes[index];
            assert_eq!(node.neighbor_prev, prev_index, "Asymmetric neighbour chain");
            assert_eq!(u64::from(node.data_offset), expected_offset, "Gap or overlap");
            assert_ne!(node.data_size, 0, "Empty node");
            if !node.used {
                assert!(!prev_free, "Two adjacent free nodes at offset {}", node.data_offset);
                num_free += 1;
                free_sum += u64::from(node.data_size);
            }
            prev_free = !node.used;
            prev_index = Some(index);
            expected_offset = node.data_end();
            num_chained += 1;
            current = node.neighbor_next;
        }
        assert_eq!(expected_offset, u64::from(self.size), "Chain does not cover the range");
        assert_eq!(num_chained, live.len(), "Some live nodes are not chained");
        assert_eq!(free_sum, u64::from(self.free_storage), "Free counter is off");

        // Every free node is listed exactly once, in the right bin
        let mut num_listed = 0;
        for bin_index in 0..size_class::NUM_LEAF_BINS {
            let bin = BinIndex::from_usize(bin_index);
            let mut prev_index = None;
            let mut current = self.bins.head(bin);
            while let Some(index) = current {
                let node = &self.nodes[index];
                assert!(!node.used, "Used node in a free list");
                assert_eq!(BinIndex::round_down(node.data_size), bin, "Node in wrong bin");
                assert_eq!(node.bin_list_prev, prev_index, "Asymmetric free list");
                prev_index = Some(index);
                num_listed += 1;
                current = node.bin_list_next;
            }
        }
        assert_eq!(num_listed, num_free, "Free nodes and free lists disagree");
    }

    /// Free ranges as (offset, size) pairs, in address order
    #[cfg(test)]
    pub(crate) fn free_ranges(&self) -> Vec<(u32, u32)> {
        let mut ranges = self.bin_lists().into_iter().flatten().collect::<Vec<_>>();
        ranges.sort_unstable();
        ranges
    }

    /// Contents of every bin's free list as (offset, size) pairs, in list
    /// order, which identifies the allocator's state without node indices
    #[cfg(test)]
    pub(crate) fn bin_lists(&self) -> Vec<Vec<(u32, u32)>> {
        (0..size_class::NUM_LEAF_BINS).map(|bin_index| {
            let mut list = Vec::new();
            let mut current = self.bins.head(BinIndex::from_usize(bin_index));
            while let Some(index) = current {
                let node = &self.nodes[index];
                list.push((node.data_offset, node.data_size));
                current = node.bin_list_next;
            }
            list
        }).collect()
    }
}
