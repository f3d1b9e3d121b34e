//! Order, fill and command types.
//!
//! Orders and commands are inputs from the session layer.
//! Fills and output events are what the book hands back.

use serde::{Deserialize, Serialize};

/// Order side (buy = bid, sell = ask)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Side {
    /// Buy side (bids)
    Buy = 0,
    /// Sell side (asks)
    Sell = 1,
}

impl Side {
    /// Returns the opposite side
    #[inline]
    pub const fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// True if an order on this side at `order_price` may trade against
    /// a resting level at `level_price` on the opposite side.
    #[inline]
    pub const fn crosses(self, order_price: i64, level_price: i64) -> bool {
        match self {
            // Buyer willing to pay >= lowest ask
            Side::Buy => level_price <= order_price,
            // Seller willing to accept <= highest bid
            Side::Sell => level_price >= order_price,
        }
    }
}

/// A limit order.
///
/// Everything except `quantity` is fixed once the order is created;
/// `quantity` is the remaining (unfilled) amount.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Order {
    /// Caller-assigned id, unique among resting orders
    pub id: u64,
    /// Price in integer minor-currency units (e.g. cents)
    pub price: i64,
    /// Caller-assigned arrival time
    pub timestamp: u64,
    /// Remaining quantity
    pub quantity: u32,
    pub side: Side,
}

impl Order {
    #[inline]
    pub const fn new(id: u64, side: Side, price: i64, quantity: u32, timestamp: u64) -> Self {
        Self {
            id,
            price,
            timestamp,
            quantity,
            side,
        }
    }
}

/// One execution between an aggressing order and a resting order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fill {
    /// Incoming (aggressing) order ID
    pub aggressor_id: u64,
    /// Resting order ID
    pub resting_id: u64,
    /// Side of the aggressing order
    pub side: Side,
    /// Execution price (always the resting level's price)
    pub price: i64,
    /// Executed quantity
    pub quantity: u32,
}

// ============================================================================
// Input Commands
// ============================================================================

/// Input commands from the session layer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    /// Match and/or rest a new limit order
    Add(Order),
    /// Change the remaining quantity of a resting order
    Modify { order_id: u64, new_quantity: u32 },
    /// Remove a resting order
    Cancel { order_id: u64 },
}

// ============================================================================
// Output Events
// ============================================================================

/// Order rested in the book with its remaining quantity
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderRested {
    pub order_id: u64,
    pub side: Side,
    pub price: i64,
    pub quantity: u32,
}

/// Resting order quantity was changed in place
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderModified {
    pub order_id: u64,
    pub old_quantity: u32,
    pub new_quantity: u32,
}

/// Resting order was removed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderCanceled {
    pub order_id: u64,
    /// Remaining quantity that was canceled
    pub canceled_quantity: u32,
}

/// Command was refused; the book is unchanged
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderRejected {
    pub order_id: u64,
    pub reason: RejectReason,
}

/// Reasons for rejection
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum RejectReason {
    /// Order ID already resting
    DuplicateOrderId = 0,
    /// Order not found (for cancel/modify)
    OrderNotFound = 1,
    /// Arena cannot grow any further
    ArenaFull = 2,
    /// Zero quantity on a new order
    InvalidQuantity = 3,
    /// Book refused the order for any other reason
    Internal = 4,
}

/// Output events from the engine
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputEvent {
    Fill(Fill),
    Rested(OrderRested),
    Modified(OrderModified),
    Canceled(OrderCanceled),
    Rejected(OrderRejected),
}
