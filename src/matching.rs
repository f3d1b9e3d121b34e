//! Matching - price-time crossing of an incoming order against the book.
//!
//! Implements the cross/rest algorithm:
//! 1. CROSSING: consume the opposite side's best levels while they cross
//! 2. RESTING: place any remaining quantity in the book
//!
//! Every execution is reported as a [`Fill`]; nothing is dropped.

use tracing::{debug, trace};

use crate::arena::NULL_INDEX;
use crate::error::{ArenaError, BookError};
use crate::order::{Fill, Order};
use crate::order_book::{release_slot, side_levels, OrderBook};

/// Outcome of [`OrderBook::add_order`]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Execution {
    /// Fills generated, in execution order
    pub fills: Vec<Fill>,
    /// Quantity left after crossing; if non-zero it is now resting
    pub remaining: u32,
}

impl Execution {
    /// Total quantity executed against resting orders
    pub fn filled(&self) -> u64 {
        self.fills.iter().map(|fill| fill.quantity as u64).sum()
    }

    #[inline]
    pub fn is_resting(&self) -> bool {
        self.remaining > 0
    }
}

impl OrderBook {
    /// Match an order against the opposite side, then rest what is left.
    ///
    /// # Algorithm
    /// 1. Validate quantity and id uniqueness
    /// 2. If nothing crosses, the order must rest: check arena headroom
    /// 3. While the opposite best level crosses, execute against it
    /// 4. If quantity remains, rest it on the order's own side
    ///
    /// Validation happens before any state changes, so an `Err` leaves
    /// the book untouched. A crossing order needs no headroom: either it
    /// is used up, or it leaves a remainder only after consuming at least
    /// one whole level, which releases a slot for the final insert.
    pub fn add_order(&mut self, mut order: Order) -> Result<Execution, BookError> {
        if order.quantity == 0 {
            return Err(BookError::ZeroQuantity { order_id: order.id });
        }
        if self.index.contains_key(&order.id) {
            return Err(BookError::DuplicateOrderId(order.id));
        }

        let opposite = order.side.opposite();
        let crosses = self
            .best_price(opposite)
            .is_some_and(|level_price| order.side.crosses(order.price, level_price));
        if !crosses && !self.arena.has_capacity() {
            return Err(BookError::Arena(ArenaError::Exhausted {
                capacity: self.arena.capacity(),
            }));
        }

        let mut fills = Vec::new();

        while order.quantity > 0 {
            let Some(level_price) = self.best_price(opposite) else {
                break; // No orders on opposite side
            };
            if !order.side.crosses(order.price, level_price) {
                break;
            }
            self.execute_match_into(&mut order, level_price, &mut fills)?;
        }

        if order.quantity > 0 {
            self.insert_order(order)?;
        }

        Ok(Execution {
            fills,
            remaining: order.quantity,
        })
    }

    /// Execute `order` against the opposite-side level at `level_price`.
    ///
    /// Decrements `order.quantity` by whatever traded and returns the
    /// fills. Fails without touching the book if there is no such level
    /// or the order's price does not reach it.
    pub fn execute_match(&mut self, order: &mut Order, level_price: i64) -> Result<Vec<Fill>, BookError> {
        let mut fills = Vec::new();
        self.execute_match_into(order, level_price, &mut fills)?;
        Ok(fills)
    }

    fn execute_match_into(
        &mut self,
        order: &mut Order,
        level_price: i64,
        fills: &mut Vec<Fill>,
    ) -> Result<(), BookError> {
        let maker_side = order.side.opposite();
        let levels = side_levels(&mut self.bids, &mut self.asks, maker_side);

        let Some(level) = levels.get_mut(&level_price) else {
            return Err(BookError::LevelNotFound {
                side: maker_side,
                price: level_price,
            });
        };
        if !order.side.crosses(order.price, level_price) {
            return Err(BookError::NotCrossing {
                side: order.side,
                order_price: order.price,
                level_price,
            });
        }

        if level.total_quantity <= order.quantity as u64 {
            // Whole level goes: drop it in one step and release every order
            let consumed = level.total_quantity as u32;
            let mut cursor = level.head;
            levels.remove(&level_price);

            while cursor != NULL_INDEX {
                let node = self.arena.node(cursor);
                let next = node.next;
                let resting = node.order;

                fills.push(Fill {
                    aggressor_id: order.id,
                    resting_id: resting.id,
                    side: order.side,
                    price: level_price,
                    quantity: resting.quantity,
                });
                trace!(
                    aggressor_id = order.id,
                    resting_id = resting.id,
                    price = level_price,
                    quantity = resting.quantity,
                    "fill"
                );

                if let Some(entry) = self.index.remove(&resting.id) {
                    release_slot(&mut self.arena, entry.handle);
                }
                cursor = next;
            }

            order.quantity -= consumed;
            debug!(side = ?maker_side, price = level_price, "level consumed");
            return Ok(());
        }

        // Part of the level: walk the queue from the head. The level holds
        // more than the order wants, so it never empties here.
        while order.quantity > 0 {
            let head = level.peek_head();
            if head == NULL_INDEX {
                break;
            }

            let resting = &mut self.arena.node_mut(head).order;
            let matched = resting.quantity.min(order.quantity);
            resting.quantity -= matched;
            let resting_id = resting.id;
            let resting_left = resting.quantity;

            level.subtract_qty(matched);
            order.quantity -= matched;

            fills.push(Fill {
                aggressor_id: order.id,
                resting_id,
                side: order.side,
                price: level_price,
                quantity: matched,
            });
            trace!(
                aggressor_id = order.id,
                resting_id,
                price = level_price,
                quantity = matched,
                "fill"
            );

            if resting_left == 0 {
                level.remove(&mut self.arena, head);
                if let Some(entry) = self.index.remove(&resting_id) {
                    release_slot(&mut self.arena, entry.handle);
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BookConfig;
    use crate::order::Side;

    fn buy(id: u64, price: i64, quantity: u32) -> Order {
        Order::new(id, Side::Buy, price, quantity, id)
    }

    fn sell(id: u64, price: i64, quantity: u32) -> Order {
        Order::new(id, Side::Sell, price, quantity, id)
    }

    #[test]
    fn test_place_bid_no_match() {
        let mut book = OrderBook::new();

        let exec = book.add_order(buy(1, 10_000, 100)).unwrap();

        assert!(exec.fills.is_empty());
        assert_eq!(exec.remaining, 100);
        assert!(exec.is_resting());
        assert_eq!(book.best_bid(), Some(10_000));
        assert_eq!(book.best_ask(), None);
        assert_eq!(book.order_count(), 1);
    }

    #[test]
    fn test_full_match() {
        let mut book = OrderBook::new();
        book.add_order(sell(1, 10_000, 100)).unwrap();

        let exec = book.add_order(buy(2, 10_000, 100)).unwrap();

        assert_eq!(
            exec.fills,
            vec![Fill {
                aggressor_id: 2,
                resting_id: 1,
                side: Side::Buy,
                price: 10_000,
                quantity: 100,
            }]
        );
        assert_eq!(exec.remaining, 0);
        assert!(book.is_empty());
        assert_eq!(book.ask_depth(), 0);
        assert!(book.arena().is_empty());
    }

    #[test]
    fn test_partial_match_taker_remains() {
        let mut book = OrderBook::new();
        book.add_order(sell(1, 10_000, 50)).unwrap();

        let exec = book.add_order(buy(2, 10_000, 100)).unwrap();

        assert_eq!(exec.filled(), 50);
        assert_eq!(exec.remaining, 50);
        assert_eq!(book.order_count(), 1);
        assert_eq!(book.best_bid(), Some(10_000));
        assert_eq!(book.best_ask(), None);
        assert_eq!(book.get_order(2).map(|o| o.quantity), Some(50));
    }

    #[test]
    fn test_partial_match_maker_remains() {
        let mut book = OrderBook::new();
        book.add_order(sell(1, 10_000, 100)).unwrap();

        book.add_order(buy(2, 10_000, 30)).unwrap();

        assert_eq!(book.order_count(), 1);
        assert_eq!(book.get_top().ask_quantity, 70);
        assert_eq!(book.get_order(1).map(|o| o.quantity), Some(70));
    }

    #[test]
    fn test_match_multiple_levels() {
        let mut book = OrderBook::new();
        book.add_order(sell(1, 10_000, 50)).unwrap();
        book.add_order(sell(2, 10_010, 50)).unwrap();
        book.add_order(sell(3, 10_020, 50)).unwrap();

        let exec = book.add_order(buy(4, 10_020, 120)).unwrap();

        let prices: Vec<(i64, u32)> = exec.fills.iter().map(|f| (f.price, f.quantity)).collect();
        assert_eq!(prices, vec![(10_000, 50), (10_010, 50), (10_020, 20)]);

        assert_eq!(book.order_count(), 1);
        assert_eq!(book.best_ask(), Some(10_020));
        assert_eq!(book.get_top().ask_quantity, 30);
    }

    #[test]
    fn test_limit_price_stops_walk() {
        let mut book = OrderBook::new();
        book.add_order(buy(1, 105, 10)).unwrap();
        book.add_order(buy(2, 104, 10)).unwrap();
        book.add_order(buy(3, 103, 10)).unwrap();

        let exec = book.add_order(sell(4, 104, 30)).unwrap();

        assert_eq!(exec.filled(), 20);
        assert_eq!(exec.remaining, 10);
        assert_eq!(book.best_bid(), Some(103));
        assert_eq!(book.best_ask(), Some(104));
    }

    #[test]
    fn test_fifo_order_priority() {
        let mut book = OrderBook::new();
        book.add_order(sell(1, 10_000, 100)).unwrap();
        book.add_order(sell(2, 10_000, 100)).unwrap();
        book.add_order(sell(3, 10_000, 100)).unwrap();

        let exec = book.add_order(buy(4, 10_000, 150)).unwrap();

        let makers: Vec<(u64, u32)> = exec.fills.iter().map(|f| (f.resting_id, f.quantity)).collect();
        assert_eq!(makers, vec![(1, 100), (2, 50)]);

        let left: Vec<(u64, u32)> = book
            .orders_at(Side::Sell, 10_000)
            .iter()
            .map(|o| (o.id, o.quantity))
            .collect();
        assert_eq!(left, vec![(2, 50), (3, 100)]);
    }

    #[test]
    fn test_full_level_fills_reported_in_fifo_order() {
        let mut book = OrderBook::new();
        book.add_order(buy(1, 105, 4)).unwrap();
        book.add_order(buy(2, 105, 6)).unwrap();

        let exec = book.add_order(sell(3, 105, 10)).unwrap();

        let makers: Vec<u64> = exec.fills.iter().map(|f| f.resting_id).collect();
        assert_eq!(makers, vec![1, 2]);
        assert_eq!(exec.remaining, 0);
        assert!(book.is_empty());
    }

    #[test]
    fn test_price_time_priority() {
        let mut book = OrderBook::new();
        book.add_order(sell(1, 10_020, 100)).unwrap(); // Worst
        book.add_order(sell(2, 10_000, 100)).unwrap(); // Best
        book.add_order(sell(3, 10_010, 100)).unwrap(); // Middle

        let exec = book.add_order(buy(4, 10_020, 250)).unwrap();

        let prices: Vec<i64> = exec.fills.iter().map(|f| f.price).collect();
        assert_eq!(prices, vec![10_000, 10_010, 10_020]);
    }

    #[test]
    fn test_aggressor_gets_resting_price() {
        let mut book = OrderBook::new();
        book.add_order(sell(1, 100, 5)).unwrap();

        let exec = book.add_order(buy(2, 110, 5)).unwrap();
        assert_eq!(exec.fills[0].price, 100);
    }

    #[test]
    fn test_zero_quantity_rejected() {
        let mut book = OrderBook::new();
        book.add_order(sell(1, 100, 5)).unwrap();

        assert_eq!(
            book.add_order(buy(2, 100, 0)),
            Err(BookError::ZeroQuantity { order_id: 2 })
        );
        assert_eq!(book.get_top().ask_quantity, 5);
    }

    #[test]
    fn test_duplicate_order_id_rejected_before_matching() {
        let mut book = OrderBook::new();
        book.add_order(buy(1, 100, 10)).unwrap();
        book.add_order(sell(2, 101, 10)).unwrap();

        // Would cross the bid, but id 2 is already resting
        assert_eq!(
            book.add_order(sell(2, 100, 5)),
            Err(BookError::DuplicateOrderId(2))
        );
        assert_eq!(book.get_top().bid_quantity, 10);
    }

    fn single_slot_book() -> OrderBook {
        OrderBook::with_config(BookConfig {
            block_size: 1,
            initial_blocks: 1,
            max_blocks: Some(1),
        })
        .unwrap()
    }

    #[test]
    fn test_full_arena_rejects_order_that_must_rest() {
        let mut book = single_slot_book();
        book.add_order(sell(1, 100, 10)).unwrap();

        // Bid below the ask: nothing crosses, so it needs a slot
        assert_eq!(
            book.add_order(buy(2, 99, 5)),
            Err(BookError::Arena(ArenaError::Exhausted { capacity: 1 }))
        );
        assert_eq!(book.get_top().ask_quantity, 10);
        assert_eq!(book.best_bid(), None);
    }

    #[test]
    fn test_full_arena_still_matches_crossing_order() {
        let mut book = single_slot_book();
        book.add_order(sell(1, 100, 10)).unwrap();

        let exec = book.add_order(buy(2, 100, 5)).unwrap();

        assert_eq!(exec.filled(), 5);
        assert_eq!(exec.remaining, 0);
        assert_eq!(book.get_order(1).map(|o| o.quantity), Some(5));
        assert_eq!(book.arena().allocated(), 1);
    }

    #[test]
    fn test_full_arena_sweep_then_rest() {
        let mut book = single_slot_book();
        book.add_order(sell(1, 100, 10)).unwrap();

        // Sweeping the level frees the only slot for the remainder
        let exec = book.add_order(buy(2, 100, 15)).unwrap();

        assert_eq!(exec.filled(), 10);
        assert_eq!(exec.remaining, 5);
        assert_eq!(book.best_ask(), None);
        assert_eq!(book.best_bid(), Some(100));
        assert_eq!(book.get_order(2).map(|o| o.quantity), Some(5));
        assert_eq!(book.arena().allocated(), 1);
    }

    #[test]
    fn test_freed_slot_is_reused() {
        let mut book = OrderBook::with_config(BookConfig {
            block_size: 1,
            initial_blocks: 1,
            max_blocks: Some(1),
        })
        .unwrap();

        book.add_order(sell(1, 100, 10)).unwrap();
        book.cancel_order(1);
        assert!(book.add_order(buy(2, 99, 10)).is_ok());
        assert_eq!(book.arena().allocated(), 1);
    }

    #[test]
    fn test_execute_match_not_crossing() {
        let mut book = OrderBook::new();
        book.add_order(sell(1, 101, 10)).unwrap();

        let mut order = buy(2, 100, 5);
        assert_eq!(
            book.execute_match(&mut order, 101),
            Err(BookError::NotCrossing {
                side: Side::Buy,
                order_price: 100,
                level_price: 101,
            })
        );
        assert_eq!(order.quantity, 5);
        assert_eq!(book.get_top().ask_quantity, 10);
    }

    #[test]
    fn test_execute_match_missing_level() {
        let mut book = OrderBook::new();
        let mut order = buy(1, 100, 5);
        assert_eq!(
            book.execute_match(&mut order, 100),
            Err(BookError::LevelNotFound {
                side: Side::Sell,
                price: 100
            })
        );
    }

    #[test]
    fn test_execute_match_single_level() {
        let mut book = OrderBook::new();
        book.add_order(sell(1, 100, 10)).unwrap();
        book.add_order(sell(2, 100, 10)).unwrap();
        book.add_order(sell(3, 99, 10)).unwrap();

        // Explicitly target the 100 level even though 99 is better
        let mut order = buy(4, 100, 15);
        let fills = book.execute_match(&mut order, 100).unwrap();

        assert_eq!(order.quantity, 0);
        assert_eq!(fills.len(), 2);
        assert_eq!(book.get_asks(10).len(), 2);
        assert!(!book.contains_order(1));
        assert_eq!(book.get_order(2).map(|o| o.quantity), Some(5));
        // Aggressor is never rested by execute_match
        assert!(!book.contains_order(4));
    }
}
