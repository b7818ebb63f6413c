use crate::betterstack::{BetterStackConfig, BetterStackSink};
use crate::error::InitError;
use crate::layer::BetterStackLayer;
use crate::provider::LoggerProvider;
use crate::record::LogLevel;
use crate::sink::LogSink;
use std::sync::Arc;
use tokio::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

/// Pipeline settings: buffering, batching, filtering and shutdown.
///
/// **Fields**
/// - `channel_buffer`: maximum number of queued envelopes before new ones
///   are dropped. Fixed once the provider is built.
/// - `batch_size`: maximum envelopes per upload.
/// - `flush_frequency`: how long the flush loop sleeps after finding the
///   queue empty.
/// - `min_level`: events below this severity are discarded on submit.
/// - `drain_timeout`: how long shutdown waits for the queue to drain.
/// - `enable_stdout`: when `true`, [`init_tracing_with_config`] also
///   installs a `tracing_subscriber::fmt` layer printing to the console.
#[derive(Clone, Debug)]
pub struct LoggerConfig {
    pub channel_buffer: usize,
    pub batch_size: usize,
    pub flush_frequency: Duration,
    pub min_level: LogLevel,
    pub drain_timeout: Duration,
    pub enable_stdout: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            channel_buffer: 10_000,
            batch_size: 1_000,
            flush_frequency: Duration::from_secs(1),
            min_level: LogLevel::Information,
            drain_timeout: Duration::from_secs(5),
            enable_stdout: false,
        }
    }
}

impl LoggerConfig {
    /// Clamp settings to minimal thresholds to avoid degenerate configs.
    pub fn normalized(mut self) -> Self {
        self.channel_buffer = self.channel_buffer.max(16);
        self.batch_size = self.batch_size.max(1);
        if self.flush_frequency < Duration::from_millis(10) {
            self.flush_frequency = Duration::from_millis(10);
        }
        self
    }
}

/// Install a global `tracing` subscriber shipping events through `sink`.
///
/// **Parameters**
/// - `sink`: implementation of [`LogSink`] receiving batches.
/// - `config`: [`LoggerConfig`] controlling buffering and batching.
///
/// **Returns**
/// - The [`LoggerProvider`] behind the installed layer. Call
///   [`LoggerProvider::shutdown`] before the process exits so queued
///   events are delivered.
///
/// Must be called from within a Tokio runtime.
pub fn init_tracing_with_config(
    sink: Arc<dyn LogSink>,
    config: LoggerConfig,
) -> Result<LoggerProvider, InitError> {
    let enable_stdout = config.enable_stdout;
    let provider = LoggerProvider::new(sink, config)?;
    let layer = BetterStackLayer::new(provider.clone());

    // Two branches because the subscriber types differ.
    if enable_stdout {
        let fmt_layer = tracing_subscriber::fmt::layer();
        let subscriber = Registry::default().with(layer).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::set_global_default(subscriber)?;
    }
    Ok(provider)
}

/// Ship all `tracing` events to Better Stack with default pipeline
/// settings.
///
/// Equivalent to building a [`BetterStackSink`] from `config` and calling
/// [`init_tracing_with_config`] with [`LoggerConfig::default`].
pub fn init_tracing(config: BetterStackConfig) -> Result<LoggerProvider, InitError> {
    let sink = BetterStackSink::new(config)?;
    init_tracing_with_config(Arc::new(sink), LoggerConfig::default())
}
