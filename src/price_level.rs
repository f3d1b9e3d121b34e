//! Price Level - A FIFO queue of orders at a single price point.
//!
//! Implements a doubly-linked list using arena indices for O(1)
//! insertion, removal from head, and removal from arbitrary position.

use crate::arena::{Arena, ArenaIndex, NULL_INDEX};
use crate::order::Order;

/// A queue of orders at a specific price level.
///
/// Orders are processed in FIFO order (price-time priority).
/// The doubly-linked structure enables O(1) cancel from any position.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PriceLevel {
    /// Price shared by every order in the queue
    pub price: i64,
    /// Index of the oldest order (highest priority, first to match)
    pub head: ArenaIndex,
    /// Index of the newest order (last to match)
    pub tail: ArenaIndex,
    /// Total remaining quantity across all orders at this level
    pub total_quantity: u64,
    /// Number of orders at this level
    pub count: u32,
}

impl PriceLevel {
    /// Create a new empty price level
    #[inline]
    pub const fn new(price: i64) -> Self {
        Self {
            price,
            head: NULL_INDEX,
            tail: NULL_INDEX,
            total_quantity: 0,
            count: 0,
        }
    }

    /// Returns true if there are no orders at this level
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Append an order to the tail of the queue (newest order).
    ///
    /// # Complexity
    /// O(1)
    #[inline]
    pub fn push_back(&mut self, arena: &mut Arena, index: ArenaIndex) {
        let quantity = arena.node(index).order.quantity;

        if self.tail == NULL_INDEX {
            // Empty list: new node becomes both head and tail
            debug_assert!(self.head == NULL_INDEX);
            self.head = index;
        } else {
            arena.node_mut(self.tail).next = index;
        }

        let node = arena.node_mut(index);
        node.prev = self.tail;
        node.next = NULL_INDEX;
        self.tail = index;

        self.count += 1;
        self.total_quantity += quantity as u64;
    }

    /// Remove and return the head order (oldest/highest priority).
    ///
    /// The slot is NOT released to the arena; caller must do that.
    ///
    /// # Complexity
    /// O(1)
    #[inline]
    pub fn pop_front(&mut self, arena: &mut Arena) -> Option<ArenaIndex> {
        if self.head == NULL_INDEX {
            return None;
        }
        let index = self.head;
        self.remove(arena, index);
        Some(index)
    }

    /// Remove an order from anywhere in the queue (for cancel).
    ///
    /// Handles all edge cases:
    /// - Only node in level (head == tail)
    /// - Removing head
    /// - Removing tail
    /// - Removing from middle
    ///
    /// # Returns
    /// `true` if the level is now empty, `false` otherwise.
    /// The slot is NOT released to the arena; caller must do that.
    ///
    /// # Complexity
    /// O(1)
    #[inline]
    pub fn remove(&mut self, arena: &mut Arena, index: ArenaIndex) -> bool {
        let node = arena.node(index);
        let prev_idx = node.prev;
        let next_idx = node.next;
        let quantity = node.order.quantity;

        if prev_idx == NULL_INDEX {
            debug_assert!(self.head == index);
            self.head = next_idx;
        } else {
            arena.node_mut(prev_idx).next = next_idx;
        }

        if next_idx == NULL_INDEX {
            debug_assert!(self.tail == index);
            self.tail = prev_idx;
        } else {
            arena.node_mut(next_idx).prev = prev_idx;
        }

        self.count -= 1;
        self.total_quantity -= quantity as u64;

        let node = arena.node_mut(index);
        node.prev = NULL_INDEX;
        node.next = NULL_INDEX;

        self.count == 0
    }

    /// Peek at the head order without removing it.
    ///
    /// # Returns
    /// Index of the head order, or `NULL_INDEX` if empty.
    #[inline]
    pub const fn peek_head(&self) -> ArenaIndex {
        self.head
    }

    /// Update total quantity after a partial fill or a size reduction.
    ///
    /// Call this after lowering an order's quantity directly.
    #[inline]
    pub fn subtract_qty(&mut self, quantity: u32) {
        debug_assert!(self.total_quantity >= quantity as u64);
        self.total_quantity -= quantity as u64;
    }

    /// Update total quantity after a size increase.
    #[inline]
    pub fn add_qty(&mut self, quantity: u32) {
        self.total_quantity += quantity as u64;
    }

    /// Walk the queue from head to tail.
    pub fn iter<'a>(&self, arena: &'a Arena) -> LevelIter<'a> {
        LevelIter {
            arena,
            cursor: self.head,
        }
    }
}

/// FIFO iterator over the orders of one level.
pub struct LevelIter<'a> {
    arena: &'a Arena,
    cursor: ArenaIndex,
}

impl<'a> Iterator for LevelIter<'a> {
    type Item = (ArenaIndex, &'a Order);

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor == NULL_INDEX {
            return None;
        }
        let index = self.cursor;
        let node = self.arena.node(index);
        self.cursor = node.next;
        Some((index, &node.order))
    }
}
