use tracing::{error, info, info_span, warn};

use betterstack_log_sink::env;
use betterstack_log_sink::init::init_tracing_with_config;
use betterstack_log_sink::BetterStackSink;
use std::sync::Arc;

/// Reads `BETTERSTACK_SOURCE_TOKEN` (and friends) from the environment and
/// ships a few events from inside nested spans.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (sink_config, mut logger_config) = env::from_env()?;
    let sink_config = sink_config
        .with_context("service", "web_service")
        .with_context("version", env!("CARGO_PKG_VERSION"));
    logger_config.enable_stdout = true;

    let sink = BetterStackSink::new(sink_config)?;
    let provider = init_tracing_with_config(Arc::new(sink), logger_config)?;

    info!("starting service");
    {
        let _request = info_span!("GET /orders").entered();
        let _db = info_span!("load orders").entered();
        warn!(rows = 0, "no orders found");
    }

    let io_err = std::io::Error::new(std::io::ErrorKind::TimedOut, "upstream timed out");
    error!(error = &io_err as &(dyn std::error::Error + 'static), user_id = 42, "checkout failed");

    provider.shutdown().await;
    Ok(())
}
