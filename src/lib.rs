pub mod record;
pub mod error;
pub mod sink;
pub mod queue;
pub mod flush;
pub mod provider;
pub mod layer;
pub mod betterstack;

pub mod init;
pub mod env;
pub mod noop_sink;

pub use betterstack::{BetterStackConfig, BetterStackSink, RetryPolicy};
pub use error::{ConfigError, InitError, UploadError};
pub use init::{init_tracing, init_tracing_with_config, LoggerConfig};
pub use layer::BetterStackLayer;
pub use provider::{Logger, LoggerProvider};
pub use record::{LogEnvelope, LogLevel, MetadataValue};
pub use sink::LogSink;

/// Target of the crate's own diagnostic events. [`BetterStackLayer`] never
/// ships events under this target.
pub const INTERNAL_TARGET: &str = "betterstack_log_sink::internal";
