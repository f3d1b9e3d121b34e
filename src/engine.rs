//! Engine - single-writer command loop around one order book.
//!
//! Turns [`Command`]s into [`OutputEvent`]s. With the `runtime` feature
//! it can own a pinned thread fed by an rtrb ring buffer.

use tracing::{info, warn};

use crate::config::BookConfig;
use crate::error::{ArenaError, BookError};
use crate::order::{
    Command, Order, OrderCanceled, OrderModified, OrderRejected, OrderRested, OutputEvent,
    RejectReason,
};
use crate::order_book::OrderBook;

/// Processes commands for one instrument, one at a time.
pub struct Engine {
    /// The underlying order book
    pub book: OrderBook,
}

impl Engine {
    /// Create an engine with a book sized by `config`.
    pub fn new(config: BookConfig) -> Result<Self, BookError> {
        Ok(Self {
            book: OrderBook::with_config(config)?,
        })
    }

    /// Run the engine event loop.
    ///
    /// # Arguments
    /// * `input` - Consumer end of the command ring buffer
    /// * `output` - Producer end of the output event ring buffer
    /// * `pin_to_core` - Whether to pin to the last available CPU core
    ///
    /// # Note
    /// This function runs forever (until the program terminates).
    #[cfg(feature = "runtime")]
    pub fn run(
        &mut self,
        input: &mut rtrb::Consumer<Command>,
        output: &mut rtrb::Producer<OutputEvent>,
        pin_to_core: bool,
    ) {
        if pin_to_core {
            self.pin_to_core();
        }

        // Main event loop (busy-wait)
        loop {
            while let Ok(cmd) = input.pop() {
                for event in self.process_command(cmd) {
                    if output.push(event).is_err() {
                        warn!("output ring full, event dropped");
                    }
                }
            }
            std::hint::spin_loop();
        }
    }

    /// Process a single command and return output events.
    ///
    /// This is the main entry point for synchronous usage (testing, replay).
    pub fn process_command(&mut self, cmd: Command) -> Vec<OutputEvent> {
        match cmd {
            Command::Add(order) => self.process_add(order),
            Command::Modify {
                order_id,
                new_quantity,
            } => match self.book.modify_order(order_id, new_quantity) {
                Some(before) if new_quantity == 0 => vec![OutputEvent::Canceled(OrderCanceled {
                    order_id,
                    canceled_quantity: before.quantity,
                })],
                Some(before) => vec![OutputEvent::Modified(OrderModified {
                    order_id,
                    old_quantity: before.quantity,
                    new_quantity,
                })],
                None => vec![reject(order_id, RejectReason::OrderNotFound)],
            },
            Command::Cancel { order_id } => match self.book.cancel_order(order_id) {
                Some(order) => vec![OutputEvent::Canceled(OrderCanceled {
                    order_id,
                    canceled_quantity: order.quantity,
                })],
                None => vec![reject(order_id, RejectReason::OrderNotFound)],
            },
        }
    }

    fn process_add(&mut self, order: Order) -> Vec<OutputEvent> {
        match self.book.add_order(order) {
            Ok(exec) => {
                let mut events: Vec<OutputEvent> =
                    exec.fills.iter().copied().map(OutputEvent::Fill).collect();
                if exec.is_resting() {
                    events.push(OutputEvent::Rested(OrderRested {
                        order_id: order.id,
                        side: order.side,
                        price: order.price,
                        quantity: exec.remaining,
                    }));
                }
                events
            }
            Err(err) => {
                warn!(order_id = order.id, error = %err, "order rejected");
                let reason = match err {
                    BookError::ZeroQuantity { .. } => RejectReason::InvalidQuantity,
                    BookError::DuplicateOrderId(_) => RejectReason::DuplicateOrderId,
                    BookError::Arena(ArenaError::Exhausted { .. }) => RejectReason::ArenaFull,
                    _ => RejectReason::Internal,
                };
                vec![reject(order.id, reason)]
            }
        }
    }

    /// Pin the current thread to the last available CPU core.
    ///
    /// The last core is typically isolated from OS interrupts.
    pub fn pin_to_core(&self) {
        if let Some(core_ids) = core_affinity::get_core_ids() {
            if let Some(last_core) = core_ids.last() {
                if core_affinity::set_for_current(*last_core) {
                    info!(core = last_core.id, "engine pinned");
                } else {
                    warn!(core = last_core.id, "failed to pin engine thread");
                }
            }
        }
    }

    /// Compute a hash of the visible book state (for determinism testing)
    pub fn state_hash(&self) -> u64 {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();

        for level in self.book.get_bids(usize::MAX) {
            (level.price, level.total_quantity, level.order_count).hash(&mut hasher);
        }
        for level in self.book.get_asks(usize::MAX) {
            (level.price, level.total_quantity, level.order_count).hash(&mut hasher);
        }
        self.book.order_count().hash(&mut hasher);
        self.book.arena().allocated().hash(&mut hasher);

        hasher.finish()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self {
            book: OrderBook::new(),
        }
    }
}

#[inline]
fn reject(order_id: u64, reason: RejectReason) -> OutputEvent {
    OutputEvent::Rejected(OrderRejected { order_id, reason })
}
