use arena_lob::{BookConfig, Command, Engine, Order, Side};
use clap::Parser;
use hdrhistogram::Histogram;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Per-command latency of the order book under a synthetic load.
#[derive(Parser, Debug)]
#[command(name = "latency-report")]
struct Args {
    /// Commands to time
    #[arg(long, default_value_t = 1_000_000)]
    iterations: u64,

    /// Arena slots per block
    #[arg(long, default_value_t = 1024)]
    block_size: u32,

    /// Blocks allocated before the run
    #[arg(long, default_value_t = 128)]
    initial_blocks: u32,

    /// Pin the measuring thread to the last core
    #[arg(long)]
    pin: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let mut engine = Engine::new(BookConfig {
        block_size: args.block_size,
        initial_blocks: args.initial_blocks,
        max_blocks: None,
    })?;
    if args.pin {
        engine.pin_to_core();
    }

    let mut histogram = Histogram::<u64>::new_with_bounds(1, 100_000, 3)?;

    info!(iterations = args.iterations, "running latency benchmark");

    let mut total_duration = std::time::Duration::new(0, 0);

    for order_id in 0..args.iterations {
        // Alternating sides at rising prices: sells rest, buys sweep them
        let side = if order_id % 2 == 1 { Side::Buy } else { Side::Sell };
        let cmd = Command::Add(Order::new(
            order_id,
            side,
            2 * order_id as i64,
            (order_id % 1_000) as u32 + 1,
            order_id,
        ));

        // Critical measurement section
        let start = Instant::now();
        std::hint::black_box(engine.process_command(cmd));
        std::hint::black_box(engine.book.get_top());
        let elapsed = start.elapsed();

        // Outliers above the histogram bound are dropped
        histogram.record(elapsed.as_nanos() as u64).unwrap_or(());
        total_duration += elapsed;
    }

    // Depth walks once the book is populated
    let start = Instant::now();
    let bids = std::hint::black_box(engine.book.get_bids(engine.book.bid_depth()));
    let asks = std::hint::black_box(engine.book.get_asks(engine.book.ask_depth()));
    let depth_elapsed = start.elapsed();

    println!("\n=== Latency Report (ns) ===");
    println!("Total Ops:  {}", args.iterations);
    println!(
        "Throughput: {:.2} ops/sec",
        args.iterations as f64 / total_duration.as_secs_f64()
    );
    println!("---------------------------");
    println!("Min:    {:6} ns", histogram.min());
    println!("P50:    {:6} ns", histogram.value_at_quantile(0.50));
    println!("P90:    {:6} ns", histogram.value_at_quantile(0.90));
    println!("P99:    {:6} ns", histogram.value_at_quantile(0.99));
    println!("P99.9:  {:6} ns", histogram.value_at_quantile(0.999));
    println!("P99.99: {:6} ns", histogram.value_at_quantile(0.9999));
    println!("Max:    {:6} ns", histogram.max());
    println!("---------------------------");
    println!(
        "Depth walk: {} bid / {} ask levels in {} ns",
        bids.len(),
        asks.len(),
        depth_elapsed.as_nanos()
    );
    println!(
        "Arena: {} of {} slots in {} blocks",
        engine.book.arena().allocated(),
        engine.book.arena().capacity(),
        engine.book.arena().block_count()
    );

    println!("\nDistribution:");
    for v in histogram.iter_log(100, 2.0) {
        let count = v.count_since_last_iteration();
        if count > 0 {
            println!("<= {:8} ns: {:10} count", v.value_iterated_to(), count);
        }
    }

    Ok(())
}
