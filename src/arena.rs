//! Arena Allocator - block-based slab of cache-line aligned order nodes.
//!
//! Storage is a list of fixed-size blocks. A free list is threaded through
//! the `next` field of vacant nodes, so allocation and release are O(1).
//! When the free list runs dry a new block is appended; blocks are never
//! returned, so a slot index stays valid for the arena's lifetime.
//!
//! Callers hold [`OrderHandle`]s rather than references. A handle carries
//! the slot's generation, which is bumped on every release, so a handle
//! kept past its release is detected instead of aliasing the next tenant.

use std::fmt;

use tracing::debug;

use crate::config::BookConfig;
use crate::error::ArenaError;
use crate::order::{Order, Side};

/// Sentinel value representing a null/invalid index
pub const NULL_INDEX: u32 = u32::MAX;

/// Slot index inside the arena, used for intrusive FIFO links.
pub type ArenaIndex = u32;

const EMPTY_ORDER: Order = Order::new(0, Side::Buy, 0, 0, 0);

/// Generational reference to an occupied arena slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OrderHandle {
    index: ArenaIndex,
    generation: u32,
}

impl OrderHandle {
    #[inline]
    pub const fn index(&self) -> ArenaIndex {
        self.index
    }

    #[inline]
    pub const fn generation(&self) -> u32 {
        self.generation
    }
}

/// A single resting order plus its queue links - one cache line.
///
/// # Memory Layout
///
/// | Field      | Type      | Size |
/// |------------|-----------|------|
/// | order      | Order     | 32   |
/// | next       | u32       | 4    |
/// | prev       | u32       | 4    |
/// | generation | u32       | 4    |
/// | occupied   | bool      | 1    |
/// | (padding)  | -         | 19   |
#[repr(C)]
#[repr(align(64))]
#[derive(Clone, Copy)]
pub struct OrderNode {
    /// The resting order; `quantity` is its remaining size
    pub order: Order,

    /// Next (newer) order at the same level, or the next free slot
    pub next: ArenaIndex,

    /// Previous (older) order at the same level
    pub prev: ArenaIndex,

    generation: u32,
    occupied: bool,
}

const _: () = assert!(
    std::mem::size_of::<OrderNode>() == 64,
    "OrderNode must be exactly 64 bytes (one cache line)"
);

const _: () = assert!(
    std::mem::align_of::<OrderNode>() == 64,
    "OrderNode must be 64-byte aligned"
);

impl OrderNode {
    #[inline]
    const fn vacant() -> Self {
        Self {
            order: EMPTY_ORDER,
            next: NULL_INDEX,
            prev: NULL_INDEX,
            generation: 0,
            occupied: false,
        }
    }

    #[inline]
    pub const fn is_occupied(&self) -> bool {
        self.occupied
    }
}

impl fmt::Debug for OrderNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderNode")
            .field("order", &self.order)
            .field("prev", &self.prev)
            .field("next", &self.next)
            .field("generation", &self.generation)
            .field("occupied", &self.occupied)
            .finish()
    }
}

/// Growable pool of order nodes with O(1) allocation and release.
pub struct Arena {
    /// Fixed-size blocks; block `b` holds slots `b * block_size ..`
    blocks: Vec<Box<[OrderNode]>>,

    /// Slots per block
    block_size: u32,

    /// Growth limit in blocks
    max_blocks: u32,

    /// Head of the free list (index of first available node)
    free_head: ArenaIndex,

    /// Number of currently allocated nodes
    allocated_count: u32,
}

impl Arena {
    /// Create an arena with `initial_blocks` blocks of `block_size` slots.
    ///
    /// `max_blocks` bounds growth; it is further capped so that every slot
    /// index stays below [`NULL_INDEX`].
    ///
    /// # Panics
    /// Panics if `block_size` is zero.
    pub fn new(block_size: u32, initial_blocks: u32, max_blocks: Option<u32>) -> Self {
        assert!(block_size > 0, "block_size must be positive");

        let addressable = u32::MAX / block_size;
        let max_blocks = max_blocks.unwrap_or(u32::MAX).min(addressable);

        let mut arena = Self {
            blocks: Vec::with_capacity(initial_blocks.min(max_blocks) as usize),
            block_size,
            max_blocks,
            free_head: NULL_INDEX,
            allocated_count: 0,
        };
        for _ in 0..initial_blocks.min(max_blocks) {
            // Bounded by max_blocks above, cannot fail
            let _ = arena.grow();
        }
        arena
    }

    /// Create an arena sized by a (validated) book config.
    pub fn from_config(config: &BookConfig) -> Self {
        Self::new(config.block_size, config.initial_blocks, config.max_blocks)
    }

    /// Append one block and push its slots onto the free list.
    fn grow(&mut self) -> Result<(), ArenaError> {
        if self.blocks.len() as u32 >= self.max_blocks {
            return Err(ArenaError::Exhausted {
                capacity: self.capacity(),
            });
        }

        let base = self.capacity();
        let mut block = vec![OrderNode::vacant(); self.block_size as usize].into_boxed_slice();

        // Thread the free list through the new block, ending at the old head
        for (offset, node) in block.iter_mut().enumerate() {
            node.next = base + offset as u32 + 1;
        }
        if let Some(last) = block.last_mut() {
            last.next = self.free_head;
        }

        self.free_head = base;
        self.blocks.push(block);

        debug!(
            blocks = self.blocks.len(),
            capacity = self.capacity(),
            "arena grew by one block"
        );
        Ok(())
    }

    /// Store `order` in a free slot, growing by a block if necessary.
    ///
    /// # Complexity
    /// O(1), plus O(block_size) when a new block is added
    pub fn alloc(&mut self, order: Order) -> Result<OrderHandle, ArenaError> {
        if self.free_head == NULL_INDEX {
            self.grow()?;
        }

        let index = self.free_head;
        let node = self.node_mut(index);
        let next_free = node.next;
        node.order = order;
        node.next = NULL_INDEX;
        node.prev = NULL_INDEX;
        node.occupied = true;
        let generation = node.generation;

        self.free_head = next_free;
        self.allocated_count += 1;

        Ok(OrderHandle { index, generation })
    }

    /// Return a slot to the free list and hand back the order it held.
    ///
    /// Releasing the same handle twice, or a handle whose slot has since
    /// been reused, yields [`ArenaError::StaleHandle`].
    pub fn free(&mut self, handle: OrderHandle) -> Result<Order, ArenaError> {
        self.check(handle)?;

        let free_head = self.free_head;
        let node = self.node_mut(handle.index);
        let order = node.order;
        node.order = EMPTY_ORDER;
        node.occupied = false;
        node.generation = node.generation.wrapping_add(1);
        node.prev = NULL_INDEX;
        node.next = free_head;

        self.free_head = handle.index;
        self.allocated_count -= 1;

        Ok(order)
    }

    #[inline]
    fn check(&self, handle: OrderHandle) -> Result<(), ArenaError> {
        let stale = ArenaError::StaleHandle {
            index: handle.index,
            generation: handle.generation,
        };
        if handle.index >= self.capacity() {
            return Err(stale);
        }
        let node = self.node(handle.index);
        if !node.occupied || node.generation != handle.generation {
            return Err(stale);
        }
        Ok(())
    }

    /// Order behind a live handle.
    #[inline]
    pub fn get(&self, handle: OrderHandle) -> Result<&Order, ArenaError> {
        self.check(handle)?;
        Ok(&self.node(handle.index).order)
    }

    /// Mutable order behind a live handle.
    #[inline]
    pub fn get_mut(&mut self, handle: OrderHandle) -> Result<&mut Order, ArenaError> {
        self.check(handle)?;
        Ok(&mut self.node_mut(handle.index).order)
    }

    /// Current handle for an occupied slot, `None` if the slot is vacant.
    #[inline]
    pub fn handle_at(&self, index: ArenaIndex) -> Option<OrderHandle> {
        if index >= self.capacity() {
            return None;
        }
        let node = self.node(index);
        node.occupied.then_some(OrderHandle {
            index,
            generation: node.generation,
        })
    }

    /// Node at a raw slot index (queue traversal).
    ///
    /// # Panics
    /// Panics if `index` is outside the arena.
    #[inline]
    pub fn node(&self, index: ArenaIndex) -> &OrderNode {
        let (block, offset) = self.locate(index);
        &self.blocks[block][offset]
    }

    /// Mutable node at a raw slot index (queue linking).
    ///
    /// # Panics
    /// Panics if `index` is outside the arena.
    #[inline]
    pub fn node_mut(&mut self, index: ArenaIndex) -> &mut OrderNode {
        let (block, offset) = self.locate(index);
        &mut self.blocks[block][offset]
    }

    #[inline]
    fn locate(&self, index: ArenaIndex) -> (usize, usize) {
        debug_assert!(index < self.capacity(), "Index out of bounds");
        (
            (index / self.block_size) as usize,
            (index % self.block_size) as usize,
        )
    }

    /// True if one more `alloc` would succeed.
    #[inline]
    pub fn has_capacity(&self) -> bool {
        self.free_head != NULL_INDEX || (self.blocks.len() as u32) < self.max_blocks
    }

    /// Returns the number of currently allocated nodes.
    #[inline]
    pub fn allocated(&self) -> u32 {
        self.allocated_count
    }

    /// Slots across all blocks allocated so far.
    #[inline]
    pub fn capacity(&self) -> u32 {
        self.blocks.len() as u32 * self.block_size
    }

    #[inline]
    pub fn block_count(&self) -> u32 {
        self.blocks.len() as u32
    }

    #[inline]
    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    /// Returns true if the arena is empty (no allocated nodes).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.allocated_count == 0
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::from_config(&BookConfig::default())
    }
}

impl fmt::Debug for Arena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("blocks", &self.blocks.len())
            .field("block_size", &self.block_size)
            .field("capacity", &self.capacity())
            .field("allocated", &self.allocated_count)
            .field("free_head", &self.free_head)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(id: u64, quantity: u32) -> Order {
        Order::new(id, Side::Buy, 10_000, quantity, id)
    }

    #[test]
    fn test_order_node_size() {
        assert_eq!(std::mem::size_of::<OrderNode>(), 64);
        assert_eq!(std::mem::align_of::<OrderNode>(), 64);
    }

    #[test]
    fn test_arena_creation() {
        let arena = Arena::new(100, 1, None);
        assert_eq!(arena.capacity(), 100);
        assert_eq!(arena.block_count(), 1);
        assert_eq!(arena.allocated(), 0);
        assert!(arena.has_capacity());
        assert!(arena.is_empty());
    }

    #[test]
    fn test_lazy_arena_has_no_blocks() {
        let mut arena = Arena::new(8, 0, None);
        assert_eq!(arena.capacity(), 0);

        let handle = arena.alloc(order(1, 10)).unwrap();
        assert_eq!(arena.block_count(), 1);
        assert_eq!(arena.get(handle).unwrap().id, 1);
    }

    #[test]
    fn test_arena_alloc_free() {
        let mut arena = Arena::new(3, 1, Some(1));

        let h0 = arena.alloc(order(0, 1)).expect("Should allocate");
        let h1 = arena.alloc(order(1, 1)).expect("Should allocate");
        let h2 = arena.alloc(order(2, 1)).expect("Should allocate");

        assert_eq!(arena.allocated(), 3);
        assert!(!arena.has_capacity());
        assert_eq!(
            arena.alloc(order(3, 1)),
            Err(ArenaError::Exhausted { capacity: 3 })
        );

        // Free one
        let released = arena.free(h1).unwrap();
        assert_eq!(released.id, 1);
        assert_eq!(arena.allocated(), 2);
        assert!(arena.has_capacity());

        // Allocate again (should reuse h1's slot with a new generation)
        let h3 = arena.alloc(order(4, 1)).expect("Should allocate");
        assert_eq!(h3.index(), h1.index());
        assert_ne!(h3.generation(), h1.generation());

        arena.free(h0).unwrap();
        arena.free(h2).unwrap();
        arena.free(h3).unwrap();
        assert!(arena.is_empty());
    }

    #[test]
    fn test_grows_by_block() {
        let mut arena = Arena::new(2, 1, None);
        let handles: Vec<_> = (0..5).map(|i| arena.alloc(order(i, 1)).unwrap()).collect();

        assert_eq!(arena.block_count(), 3);
        assert_eq!(arena.capacity(), 6);
        assert_eq!(arena.allocated(), 5);

        // Earlier handles survive growth
        for (i, handle) in handles.iter().enumerate() {
            assert_eq!(arena.get(*handle).unwrap().id, i as u64);
        }
    }

    #[test]
    fn test_never_shrinks() {
        let mut arena = Arena::new(2, 1, None);
        let handles: Vec<_> = (0..4).map(|i| arena.alloc(order(i, 1)).unwrap()).collect();
        for handle in handles {
            arena.free(handle).unwrap();
        }
        assert!(arena.is_empty());
        assert_eq!(arena.block_count(), 2);
    }

    #[test]
    fn test_double_free_detected() {
        let mut arena = Arena::new(4, 1, None);
        let handle = arena.alloc(order(1, 1)).unwrap();

        arena.free(handle).unwrap();
        assert_eq!(
            arena.free(handle),
            Err(ArenaError::StaleHandle {
                index: handle.index(),
                generation: handle.generation(),
            })
        );
        assert_eq!(arena.allocated(), 0);
    }

    #[test]
    fn test_stale_handle_after_reuse() {
        let mut arena = Arena::new(1, 1, Some(1));
        let old = arena.alloc(order(1, 5)).unwrap();
        arena.free(old).unwrap();
        let new = arena.alloc(order(2, 7)).unwrap();

        assert_eq!(old.index(), new.index());
        assert!(arena.get(old).is_err());
        assert!(arena.get_mut(old).is_err());
        assert_eq!(arena.get(new).unwrap().quantity, 7);
    }

    #[test]
    fn test_arena_get_mut() {
        let mut arena = Arena::new(10, 1, None);
        let handle = arena.alloc(order(12345, 100)).unwrap();

        arena.get_mut(handle).unwrap().quantity = 40;

        let stored = arena.get(handle).unwrap();
        assert_eq!(stored.id, 12345);
        assert_eq!(stored.quantity, 40);
    }

    #[test]
    fn test_handle_at() {
        let mut arena = Arena::new(4, 1, None);
        let handle = arena.alloc(order(9, 1)).unwrap();

        assert_eq!(arena.handle_at(handle.index()), Some(handle));
        arena.free(handle).unwrap();
        assert_eq!(arena.handle_at(handle.index()), None);
        assert_eq!(arena.handle_at(1_000), None);
    }

    #[test]
    fn test_max_blocks_capped_by_slot_space() {
        let arena = Arena::new(u32::MAX / 2, 0, None);
        assert_eq!(arena.capacity(), 0);
        assert!(arena.has_capacity());
    }
}
