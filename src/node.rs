//! Fixed-capacity storage for the nodes that describe the managed range
//!
//! Every node is a segment of the allocator's range, either free (and then
//! listed in a bin) or used by a live allocation. Nodes never reference each
//! other by address, only by their index in the arena, and recycled indices
//! are kept on a stack so that acquiring and releasing a node is O(1).

use std::ops::{Index, IndexMut};


/// Index of a node within its arena
pub type NodeIndex = u32;

/// Physical segment of the allocator's range
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Node {
    /// First offset covered by this node
    pub data_offset: u32,

    /// Number of offsets covered by this node
    pub data_size: u32,

    /// Truth that the node is owned by a live allocation
    pub used: bool,

    /// Previous node in the same bin's free list (free nodes only)
    pub bin_list_prev: Option<NodeIndex>,

    /// Next node in the same bin's free list (free nodes only)
    pub bin_list_next: Option<NodeIndex>,

    /// Node covering the offsets right before this one, if any
    pub neighbor_prev: Option<NodeIndex>,

    /// Node covering the offsets right after this one, if any
    pub neighbor_next: Option<NodeIndex>,
}

impl Node {
    /// Build a free node which is about to become the head of a bin list
    pub fn new_free(data_offset: u32, data_size: u32, bin_list_next: Option<NodeIndex>) -> Self {
        Self {
            data_offset,
            data_size,
            bin_list_next,
            ..Self::default()
        }
    }

    /// First offset after the end of this node
    pub fn data_end(&self) -> u64 {
        u64::from(self.data_offset) + u64::from(self.data_size)
    }
}


/// Node storage with a stack of unused slots
#[derive(Clone, Debug, Default)]
pub struct NodeArena {
    /// Node storage, sized once at construction
    nodes: Box<[Node]>,

    /// Indices of the slots which are not currently holding a node
    ///
    /// Capacity is reserved upfront so that pushing never reallocates.
    free_indices: Vec<NodeIndex>,
}

impl NodeArena {
    /// Allocate an arena with room for `capacity` nodes, all of them unused
    pub fn new(capacity: u32) -> Self {
        debug_assert_ne!(capacity, 0, "A node arena must hold at least one node");
        let mut arena = Self {
            nodes: vec![Node::default(); capacity as usize].into_boxed_slice(),
            free_indices: Vec::with_capacity(capacity as usize),
        };
        arena.reset();
        arena
    }

    /// Mark every slot as unused, lowest indices being handed out first
    pub fn reset(&mut self) {
        let capacity = self.capacity();
        self.free_indices.clear();
        self.free_indices.extend((0..capacity).rev());
    }

    /// Total number of slots
    pub fn capacity(&self) -> u32 {
        self.nodes.len() as u32
    }

    /// Number of slots which can still be acquired
    pub fn num_available(&self) -> u32 {
        self.free_indices.len() as u32
    }

    /// Truth that this arena has no storage at all
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Take an unused slot and store a node there
    pub fn acquire(&mut self, node: Node) -> Option<NodeIndex> {
        let index = self.free_indices.pop()?;
        self.nodes[index as usize] = node;
        Some(index)
    }

    /// Give a slot back, its contents become meaningless
    pub fn release(&mut self, index: NodeIndex) {
        debug_assert!(index < self.capacity(), "Released an out-of-range node");
        debug_assert!(
            self.free_indices.len() < self.nodes.len(),
            "Released more nodes than the arena can hold"
        );
        self.free_indices.push(index);
    }

    /// Indices of the slots which are currently holding a node
    #[cfg(test)]
    pub fn live_indices(&self) -> Vec<NodeIndex> {
        let mut live = vec![true; self.nodes.len()];
        for &index in &self.free_indices {
            assert!(live[index as usize], "Node {} was released twice", index);
            live[index as usize] = false;
        }
        (0..self.capacity()).filter(|&index| live[index as usize]).collect()
    }
}

impl Index<NodeIndex> for NodeArena {
    type Output = Node;

    fn index(&self, index: NodeIndex) -> &Node {
        &self.nodes[index as usize]
    }
}

impl IndexMut<NodeIndex> for NodeArena {
    fn index_mut(&mut self, index: NodeIndex) -> &mut Node {
        &mut self.nodes[index as usize]
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_in_index_order() {
        let mut arena = NodeArena::new(3);
        assert_eq!(arena.capacity(), 3);
        assert_eq!(arena.num_available(), 3);
        assert!(!arena.is_empty());

        let node = Node::new_free(10, 20, None);
        assert_eq!(arena.acquire(node), Some(0));
        assert_eq!(arena.acquire(node), Some(1));
        assert_eq!(arena.acquire(node), Some(2));
        assert_eq!(arena.acquire(node), None);
        assert_eq!(arena.num_available(), 0);
        assert_eq!(arena[1], node);
        assert_eq!(arena[1].data_end(), 30);
        assert_eq!(arena.live_indices(), vec![0, 1, 2]);
    }

    #[test]
    fn release_is_lifo() {
        let mut arena = NodeArena::new(4);
        for _ in 0..4 {
            arena.acquire(Node::default()).unwrap();
        }
        arena.release(2);
        arena.release(0);
        assert_eq!(arena.live_indices(), vec![1, 3]);

        let node = Node::new_free(5, 6, Some(3));
        assert_eq!(arena.acquire(node), Some(0));
        assert_eq!(arena[0].bin_list_next, Some(3));
        assert!(!arena[0].used);
        assert_eq!(arena.acquire(node), Some(2));
        assert_eq!(arena.acquire(node), None);

        arena.reset();
        assert_eq!(arena.num_available(), 4);
        assert!(arena.live_indices().is_empty());
    }

    #[test]
    fn default_is_empty() {
        let mut arena = NodeArena::default();
        assert!(arena.is_empty());
        assert_eq!(arena.num_available(), 0);
        assert_eq!(arena.acquire(Node::default()), None);
    }
}
