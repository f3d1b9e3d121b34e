//! Replay a CSV order log through the book and print the resulting fills.
//!
//! Input columns: `action,order_id,side,price,quantity,timestamp`
//!
//! - `action` is `add`, `modify` or `cancel`
//! - `price` is a decimal, scaled to integer minor units by `--price-scale`
//! - `timestamp` is RFC 3339; it becomes nanoseconds since the epoch
//!
//! Fills go to stdout as CSV; a depth summary goes to stderr.

use std::fs::File;
use std::io;
use std::path::PathBuf;

use arena_lob::{BookConfig, Command, Engine, Order, OutputEvent, Side};
use chrono::{DateTime, Utc};
use clap::Parser;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "replay", about = "Replay an order log through the limit order book")]
struct Args {
    /// CSV order log
    input: PathBuf,

    /// Minor units per price unit (100 for cents)
    #[arg(long, default_value_t = 100)]
    price_scale: u64,

    /// Levels per side in the final summary
    #[arg(long, default_value_t = 10)]
    depth: usize,

    /// Arena slots per block
    #[arg(long, default_value_t = 1024)]
    block_size: u32,

    /// Upper bound on arena blocks
    #[arg(long)]
    max_blocks: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Action {
    Add,
    Modify,
    Cancel,
}

#[derive(Debug, Deserialize)]
struct Row {
    action: Action,
    order_id: u64,
    side: Option<Side>,
    price: Option<Decimal>,
    quantity: Option<u32>,
    timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Error)]
enum RowError {
    #[error("order {order_id}: missing {field}")]
    Missing { order_id: u64, field: &'static str },

    #[error("order {order_id}: price {price} is not a whole number of minor units")]
    OffTick { order_id: u64, price: Decimal },

    #[error("order {order_id}: price {price} out of range")]
    PriceRange { order_id: u64, price: Decimal },

    #[error("order {order_id}: timestamp before the epoch")]
    Timestamp { order_id: u64 },
}

impl Row {
    fn to_command(&self, price_scale: u64) -> Result<Command, RowError> {
        let order_id = self.order_id;
        let missing = |field| RowError::Missing { order_id, field };

        match self.action {
            Action::Cancel => Ok(Command::Cancel { order_id }),
            Action::Modify => Ok(Command::Modify {
                order_id,
                new_quantity: self.quantity.ok_or_else(|| missing("quantity"))?,
            }),
            Action::Add => {
                let side = self.side.ok_or_else(|| missing("side"))?;
                let quantity = self.quantity.ok_or_else(|| missing("quantity"))?;
                let price = self.price.ok_or_else(|| missing("price"))?;
                let scaled = price
                    .checked_mul(Decimal::from(price_scale))
                    .ok_or(RowError::PriceRange { order_id, price })?;
                if !scaled.fract().is_zero() {
                    return Err(RowError::OffTick { order_id, price });
                }
                let price_minor = scaled
                    .to_i64()
                    .ok_or(RowError::PriceRange { order_id, price })?;
                let timestamp = match self.timestamp {
                    Some(ts) => ts
                        .timestamp_nanos_opt()
                        .and_then(|nanos| u64::try_from(nanos).ok())
                        .ok_or(RowError::Timestamp { order_id })?,
                    None => 0,
                };
                Ok(Command::Add(Order::new(
                    order_id,
                    side,
                    price_minor,
                    quantity,
                    timestamp,
                )))
            }
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let mut engine = Engine::new(BookConfig {
        block_size: args.block_size,
        initial_blocks: 1,
        max_blocks: args.max_blocks,
    })?;

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(File::open(&args.input)?);
    let mut writer = csv::Writer::from_writer(io::stdout());

    let mut commands = 0u64;
    let mut fills = 0u64;
    let mut rejected = 0u64;

    for (line, record) in reader.deserialize::<Row>().enumerate() {
        let row = record?;
        let cmd = match row.to_command(args.price_scale) {
            Ok(cmd) => cmd,
            Err(err) => {
                warn!(line = line + 2, error = %err, "skipping row");
                rejected += 1;
                continue;
            }
        };
        commands += 1;

        for event in engine.process_command(cmd) {
            match event {
                OutputEvent::Fill(fill) => {
                    writer.serialize(fill)?;
                    fills += 1;
                }
                OutputEvent::Rejected(_) => rejected += 1,
                _ => {}
            }
        }
    }
    writer.flush()?;

    info!(commands, fills, rejected, "replay finished");

    let book = &engine.book;
    let top = book.get_top();
    eprintln!(
        "top: bid {} x {} | ask {} x {}",
        top.bid_price, top.bid_quantity, top.ask_price, top.ask_quantity
    );
    eprintln!("levels: {} bid / {} ask", book.bid_depth(), book.ask_depth());
    for level in book.get_asks(args.depth).iter().rev() {
        eprintln!("  ask {:>12} {:>10} ({})", level.price, level.total_quantity, level.order_count);
    }
    for level in book.get_bids(args.depth) {
        eprintln!("  bid {:>12} {:>10} ({})", level.price, level.total_quantity, level.order_count);
    }

    Ok(())
}
