use std::sync::Arc;
use std::time::Instant;
use tokio::time::Duration;
use tracing::error;

use betterstack_log_sink::init::{init_tracing_with_config, LoggerConfig};
use betterstack_log_sink::noop_sink::NoopSink;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let sink = Arc::new(NoopSink::default());

    let config = LoggerConfig {
        channel_buffer: 50_000,
        batch_size: 1_000,
        flush_frequency: Duration::from_millis(200),
        ..LoggerConfig::default()
    };
    let provider = init_tracing_with_config(sink, config)?;

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        error!(iteration = i, "load test error");
    }

    let elapsed = start.elapsed();
    println!(
        "submitted {} events in {:?} (~{:.0} ev/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    provider.shutdown().await;
    println!("queue: {:?}", provider.queue_stats());
    println!("flush: {:?}", provider.flush_stats());
    Ok(())
}
