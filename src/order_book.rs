//! Order Book - The central limit order book data structure.
//!
//! Price levels live in ordered maps keyed by price, so the best level
//! on either side is an end of its map and depth walks come out in
//! priority order. An FxHashMap index takes an order id straight to its
//! level and arena slot for O(1) cancel and modify.

use std::collections::BTreeMap;
use std::fmt;

use rustc_hash::FxHashMap;
use tracing::{debug, error, trace};

use crate::arena::{Arena, OrderHandle};
use crate::config::BookConfig;
use crate::error::BookError;
use crate::order::{Order, Side};
use crate::price_level::PriceLevel;

/// Price-keyed levels for one side of the book
pub type Levels = BTreeMap<i64, PriceLevel>;

/// Where a resting order lives: its level (side + price) and its slot
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderRef {
    /// Slot in the arena
    pub handle: OrderHandle,
    /// Book side holding the level
    pub side: Side,
    /// Level price (level key)
    pub price: i64,
}

/// Mapping from order id to its location, for O(1) cancel lookup
pub type OrderIndex = FxHashMap<u64, OrderRef>;

/// Best bid and ask with their level aggregates.
///
/// A side with no levels reports zero price and zero quantity, so an
/// all-zero value means "no market", not a zero-spread market.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BookTop {
    pub bid_price: i64,
    pub bid_quantity: u64,
    pub ask_price: i64,
    pub ask_quantity: u64,
}

impl BookTop {
    /// `ask - bid`, computed regardless of whether both sides exist.
    ///
    /// Widened to `i128`: the distance between two `i64` prices does not
    /// always fit in an `i64`.
    #[inline]
    pub const fn spread(&self) -> i128 {
        self.ask_price as i128 - self.bid_price as i128
    }

    /// `(ask + bid) / 2`, truncating toward zero
    #[inline]
    pub const fn mid(&self) -> i64 {
        // The mean of two i64 values is always an i64
        ((self.ask_price as i128 + self.bid_price as i128) / 2) as i64
    }
}

/// Aggregate view of one price level
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LevelInfo {
    pub price: i64,
    pub total_quantity: u64,
    pub order_count: u32,
}

impl From<&PriceLevel> for LevelInfo {
    fn from(level: &PriceLevel) -> Self {
        Self {
            price: level.price,
            total_quantity: level.total_quantity,
            order_count: level.count,
        }
    }
}

/// Single-instrument limit order book.
///
/// Owns its arena; nothing here is shared across threads. Callers that
/// need concurrency run one book per instrument and feed each from a
/// single sequential path.
pub struct OrderBook {
    /// Bid levels; best bid is the last key
    pub(crate) bids: Levels,
    /// Ask levels; best ask is the first key
    pub(crate) asks: Levels,
    /// Order lookup map: OrderId -> OrderRef
    pub(crate) index: OrderIndex,
    /// Storage for resting orders
    pub(crate) arena: Arena,
}

/// Pick one side's levels while leaving the rest of the book borrowable.
#[inline]
pub(crate) fn side_levels<'a>(bids: &'a mut Levels, asks: &'a mut Levels, side: Side) -> &'a mut Levels {
    match side {
        Side::Buy => bids,
        Side::Sell => asks,
    }
}

/// Hand a slot back to the arena.
///
/// Every handle in the index is live, so a failure here means the index
/// and the arena have drifted apart. It is logged at error level and the
/// arena is left as it was.
#[inline]
pub(crate) fn release_slot(arena: &mut Arena, handle: OrderHandle) -> Option<Order> {
    match arena.free(handle) {
        Ok(order) => Some(order),
        Err(err) => {
            error!(
                index = handle.index(),
                generation = handle.generation(),
                error = %err,
                "order index held a stale handle"
            );
            None
        }
    }
}

impl OrderBook {
    /// Create an empty book with the default arena sizing
    pub fn new() -> Self {
        Self {
            bids: Levels::new(),
            asks: Levels::new(),
            index: OrderIndex::default(),
            arena: Arena::default(),
        }
    }

    /// Create an empty book sized by `config`
    pub fn with_config(config: BookConfig) -> Result<Self, BookError> {
        config.validate()?;
        let capacity = (config.block_size as usize).saturating_mul(config.initial_blocks as usize);
        Ok(Self {
            bids: Levels::new(),
            asks: Levels::new(),
            index: OrderIndex::with_capacity_and_hasher(capacity, Default::default()),
            arena: Arena::from_config(&config),
        })
    }

    // ========================================================================
    // Best Price Access
    // ========================================================================

    /// Get the best bid price (highest buy price)
    #[inline]
    pub fn best_bid(&self) -> Option<i64> {
        self.bids.last_key_value().map(|(price, _)| *price)
    }

    /// Get the best ask price (lowest sell price)
    #[inline]
    pub fn best_ask(&self) -> Option<i64> {
        self.asks.first_key_value().map(|(price, _)| *price)
    }

    /// Get the best price on a given side
    #[inline]
    pub fn best_price(&self, side: Side) -> Option<i64> {
        match side {
            Side::Buy => self.best_bid(),
            Side::Sell => self.best_ask(),
        }
    }

    /// Get a price level
    #[inline]
    pub fn level(&self, side: Side, price: i64) -> Option<&PriceLevel> {
        match side {
            Side::Buy => self.bids.get(&price),
            Side::Sell => self.asks.get(&price),
        }
    }

    // ========================================================================
    // Order Management
    // ========================================================================

    /// Rest an order on its own side without matching.
    ///
    /// Allocates a slot, appends it to the tail of the level at
    /// `(side, price)` (creating the level if needed) and indexes it.
    /// Rejects zero quantity, a duplicate id, and any price that would
    /// leave the book crossed; use [`OrderBook::add_order`] to match first.
    pub fn insert_order(&mut self, order: Order) -> Result<OrderHandle, BookError> {
        if order.quantity == 0 {
            return Err(BookError::ZeroQuantity { order_id: order.id });
        }
        if self.index.contains_key(&order.id) {
            return Err(BookError::DuplicateOrderId(order.id));
        }
        if let Some(opposite) = self.best_price(order.side.opposite()) {
            if order.side.crosses(order.price, opposite) {
                return Err(BookError::WouldCross {
                    side: order.side,
                    price: order.price,
                });
            }
        }

        let handle = self.arena.alloc(order)?;

        let levels = side_levels(&mut self.bids, &mut self.asks, order.side);
        let level = levels.entry(order.price).or_insert_with(|| {
            debug!(side = ?order.side, price = order.price, "level created");
            PriceLevel::new(order.price)
        });
        level.push_back(&mut self.arena, handle.index());

        self.index.insert(
            order.id,
            OrderRef {
                handle,
                side: order.side,
                price: order.price,
            },
        );

        trace!(
            order_id = order.id,
            side = ?order.side,
            price = order.price,
            quantity = order.quantity,
            "order rested"
        );
        Ok(handle)
    }

    /// Remove a resting order from the book.
    ///
    /// Returns the order as it was (with its remaining quantity), or
    /// `None` if the id is not resting. Drops the level if it empties.
    pub fn remove_order(&mut self, order_id: u64) -> Option<Order> {
        let entry = self.index.remove(&order_id)?;

        let levels = side_levels(&mut self.bids, &mut self.asks, entry.side);
        if let Some(level) = levels.get_mut(&entry.price) {
            if level.remove(&mut self.arena, entry.handle.index()) {
                levels.remove(&entry.price);
                debug!(side = ?entry.side, price = entry.price, "level removed");
            }
        }

        let order = release_slot(&mut self.arena, entry.handle);
        trace!(order_id, "order removed");
        order
    }

    /// Cancel a resting order. Unknown ids are a no-op returning `None`.
    #[inline]
    pub fn cancel_order(&mut self, order_id: u64) -> Option<Order> {
        self.remove_order(order_id)
    }

    /// Set a resting order's remaining quantity in place.
    ///
    /// The order keeps its queue position. A new quantity of zero cancels
    /// the order. Returns the order as it was before the change, or
    /// `None` if the id is not resting.
    pub fn modify_order(&mut self, order_id: u64, new_quantity: u32) -> Option<Order> {
        if new_quantity == 0 {
            return self.remove_order(order_id);
        }

        let entry = *self.index.get(&order_id)?;
        let stored = self.arena.get_mut(entry.handle).ok()?;
        let before = *stored;
        stored.quantity = new_quantity;

        let levels = side_levels(&mut self.bids, &mut self.asks, entry.side);
        if let Some(level) = levels.get_mut(&entry.price) {
            if new_quantity < before.quantity {
                level.subtract_qty(before.quantity - new_quantity);
            } else {
                level.add_qty(new_quantity - before.quantity);
            }
        }

        trace!(
            order_id,
            old_quantity = before.quantity,
            new_quantity,
            "order modified"
        );
        Some(before)
    }

    /// Look up a resting order by ID.
    #[inline]
    pub fn get_order(&self, order_id: u64) -> Option<Order> {
        let entry = self.index.get(&order_id)?;
        self.arena.get(entry.handle).ok().copied()
    }

    /// Check if an order is resting.
    #[inline]
    pub fn contains_order(&self, order_id: u64) -> bool {
        self.index.contains_key(&order_id)
    }

    /// Orders resting at one level, oldest first.
    pub fn orders_at(&self, side: Side, price: i64) -> Vec<Order> {
        self.level(side, price)
            .map(|level| level.iter(&self.arena).map(|(_, order)| *order).collect())
            .unwrap_or_default()
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Best bid/ask prices and their aggregate quantities.
    pub fn get_top(&self) -> BookTop {
        let mut top = BookTop::default();
        if let Some((price, level)) = self.bids.last_key_value() {
            top.bid_price = *price;
            top.bid_quantity = level.total_quantity;
        }
        if let Some((price, level)) = self.asks.first_key_value() {
            top.ask_price = *price;
            top.ask_quantity = level.total_quantity;
        }
        top
    }

    /// Number of bid levels
    #[inline]
    pub fn bid_depth(&self) -> usize {
        self.bids.len()
    }

    /// Number of ask levels
    #[inline]
    pub fn ask_depth(&self) -> usize {
        self.asks.len()
    }

    /// Up to `max_depth` bid levels, highest price first.
    pub fn get_bids(&self, max_depth: usize) -> Vec<LevelInfo> {
        self.bids
            .values()
            .rev()
            .take(max_depth)
            .map(LevelInfo::from)
            .collect()
    }

    /// Up to `max_depth` ask levels, lowest price first.
    pub fn get_asks(&self, max_depth: usize) -> Vec<LevelInfo> {
        self.asks
            .values()
            .take(max_depth)
            .map(LevelInfo::from)
            .collect()
    }

    // ========================================================================
    // Utility Methods
    // ========================================================================

    /// Get the total number of resting orders
    #[inline]
    pub fn order_count(&self) -> usize {
        self.index.len()
    }

    /// Check if the book is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// The arena backing this book
    #[inline]
    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    /// Remove every resting order, returning all slots to the arena.
    pub fn clear(&mut self) {
        for (_, entry) in self.index.drain() {
            release_slot(&mut self.arena, entry.handle);
        }
        self.bids.clear();
        self.asks.clear();
    }
}

impl Default for OrderBook {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for OrderBook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderBook")
            .field("best_bid", &self.best_bid())
            .field("best_ask", &self.best_ask())
            .field("bid_levels", &self.bids.len())
            .field("ask_levels", &self.asks.len())
            .field("order_count", &self.index.len())
            .field("arena", &self.arena)
            .finish()
    }
}
