//! # Arena-LOB
//!
//! A single-instrument limit order book with price-time priority matching.
//!
//! ## Design Principles
//!
//! - **Single-Writer**: One thread owns a book exclusively (no locks)
//! - **Stable Handles**: Resting orders live in a block arena and are
//!   addressed by generational handles, never by reference
//! - **O(1) Cancel/Modify**: An id index points straight at the slot
//! - **Explicit Fills**: Matching reports every execution
//!
//! ## Architecture
//!
//! ```text
//! [Session Layer] --Command--> [Engine] --> [OrderBook] --> [PriceLevel FIFO]
//!                                 |              |
//!                           [OutputEvent]     [Arena]
//! ```

pub mod arena;
pub mod config;
pub mod engine;
pub mod error;
pub mod matching;
pub mod order;
pub mod order_book;
pub mod price_level;

// Re-exports for convenience
pub use arena::{Arena, ArenaIndex, OrderHandle, OrderNode, NULL_INDEX};
pub use config::BookConfig;
pub use engine::Engine;
pub use error::{ArenaError, BookError};
pub use matching::Execution;
pub use order::{
    Command, Fill, Order, OrderCanceled, OrderModified, OrderRejected, OrderRested, OutputEvent,
    RejectReason, Side,
};
pub use order_book::{BookTop, LevelInfo, OrderBook};
pub use price_level::PriceLevel;
