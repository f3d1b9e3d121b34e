//! Error types for the arena and the order book.

use thiserror::Error;

use crate::order::Side;

/// Errors raised by the order arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ArenaError {
    /// No free slot and no room to add another block.
    #[error("arena exhausted at {capacity} slots")]
    Exhausted { capacity: u32 },

    /// Handle refers to a slot that has been released (or reused since).
    #[error("stale handle: slot {index} generation {generation}")]
    StaleHandle { index: u32, generation: u32 },
}

/// Errors raised by order book operations.
///
/// Any operation returning `Err` has left the book untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BookError {
    /// New orders must carry a positive quantity.
    #[error("order {order_id} has zero quantity")]
    ZeroQuantity { order_id: u64 },

    /// An order with this id is already resting.
    #[error("order {0} is already resting")]
    DuplicateOrderId(u64),

    /// Match attempted against a level the order does not reach.
    #[error("{side:?} order at {order_price} does not cross level {level_price}")]
    NotCrossing {
        side: Side,
        order_price: i64,
        level_price: i64,
    },

    /// Match attempted against a price with no resting level.
    #[error("no {side:?} level at {price}")]
    LevelNotFound { side: Side, price: i64 },

    /// Resting this order would leave the book crossed.
    #[error("{side:?} order at {price} would cross the book")]
    WouldCross { side: Side, price: i64 },

    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),

    #[error(transparent)]
    Arena(#[from] ArenaError),
}
