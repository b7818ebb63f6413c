use crate::betterstack::{BetterStackConfig, BetterStackSink};
use crate::error::ConfigError;
use crate::flush::{FlushLoop, FlushState, FlushStatsSnapshot};
use crate::init::LoggerConfig;
use crate::queue::{envelope_queue, EnvelopeQueue, QueueStatsSnapshot};
use crate::record::{
    ErrorValue, LogEnvelope, LogLevel, MetadataValue, ERROR_KEY, LOGGER_KEY, SCOPE_KEY,
    SCOPE_SEPARATOR,
};
use crate::sink::LogSink;
use std::collections::{BTreeMap, HashMap};
use std::error::Error;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;

/// Field-name prefix used by the logging framework for its own bookkeeping
/// (`log.target`, `log.module_path`, ... added by the `log` bridge). Such
/// fields are never shipped.
pub const FRAMEWORK_FIELD_PREFIX: &str = "log.";

/// Front door of the pipeline. Owns the queue and the flush loop, and hands
/// out one [`Logger`] per category.
///
/// Cloning is cheap and every clone refers to the same pipeline.
#[derive(Clone)]
pub struct LoggerProvider {
    inner: Arc<ProviderInner>,
}

struct ProviderInner {
    queue: EnvelopeQueue,
    loggers: Mutex<HashMap<String, Logger>>,
    settings: watch::Sender<LoggerConfig>,
    flush: FlushLoop,
}

impl LoggerProvider {
    /// Build the pipeline and spawn its flush loop on the current Tokio
    /// runtime.
    pub fn new(sink: Arc<dyn LogSink>, config: LoggerConfig) -> Result<Self, ConfigError> {
        tokio::runtime::Handle::try_current().map_err(|_| ConfigError::NoRuntime)?;

        let config = config.normalized();
        let (queue, consumer) = envelope_queue(config.channel_buffer);
        let (settings, settings_rx) = watch::channel(config);
        let flush = FlushLoop::spawn(consumer, sink, settings_rx);

        Ok(Self {
            inner: Arc::new(ProviderInner {
                queue,
                loggers: Mutex::new(HashMap::new()),
                settings,
                flush,
            }),
        })
    }

    /// Build a pipeline delivering to Better Stack.
    pub fn betterstack(config: BetterStackConfig, logger_config: LoggerConfig) -> Result<Self, ConfigError> {
        let sink = BetterStackSink::new(config)?;
        Self::new(Arc::new(sink), logger_config)
    }

    /// Return the logger for `name`, creating it on first use.
    ///
    /// Lookups are case-insensitive: `"App"` and `"app"` share one logger,
    /// which keeps the spelling it was first requested with.
    pub fn get_logger(&self, name: &str) -> Logger {
        let mut loggers = self
            .inner
            .loggers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        loggers
            .entry(name.to_lowercase())
            .or_insert_with(|| Logger {
                category: Arc::from(name),
                queue: self.inner.queue.clone(),
                settings: self.inner.settings.subscribe(),
            })
            .clone()
    }

    /// Publish new settings. Batch size, flush frequency, minimum level and
    /// drain timeout take effect on the next flush cycle or submit; the
    /// queue capacity is fixed at construction.
    pub fn update_config(&self, config: LoggerConfig) {
        self.inner.settings.send_replace(config.normalized());
    }

    /// Level check against the current settings, without touching the
    /// logger table.
    pub fn is_enabled(&self, level: LogLevel) -> bool {
        level >= self.inner.settings.borrow().min_level
    }

    pub fn config(&self) -> LoggerConfig {
        self.inner.settings.borrow().clone()
    }

    pub fn queue_stats(&self) -> QueueStatsSnapshot {
        self.inner.queue.stats().snapshot()
    }

    pub fn flush_stats(&self) -> FlushStatsSnapshot {
        self.inner.flush.stats().snapshot()
    }

    pub fn state(&self) -> FlushState {
        self.inner.flush.state()
    }

    /// Stop accepting events and deliver everything already queued, waiting
    /// at most the configured `drain_timeout`. Idempotent.
    pub async fn shutdown(&self) {
        self.inner
            .loggers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        let grace = self.inner.settings.borrow().drain_timeout;
        self.inner.flush.shutdown(grace).await;
    }
}

/// Per-category handle turning log calls into envelopes. Never blocks and
/// never reports delivery problems to the caller.
#[derive(Clone)]
pub struct Logger {
    category: Arc<str>,
    queue: EnvelopeQueue,
    settings: watch::Receiver<LoggerConfig>,
}

impl Logger {
    pub fn category(&self) -> &str {
        &self.category
    }

    /// Whether both handles were produced by the same `get_logger` entry.
    pub fn same_as(&self, other: &Logger) -> bool {
        Arc::ptr_eq(&self.category, &other.category)
    }

    pub fn is_enabled(&self, level: LogLevel) -> bool {
        level >= self.settings.borrow().min_level
    }

    /// Build an envelope and queue it.
    ///
    /// `scopes` is the active scope chain, outermost first; it is stored
    /// under `Scope` joined by `" / "`. The category goes under `Logger` and
    /// `error` under `Exception`; when set, those keys win over caller fields
    /// of the same name. Fields with the framework prefix are skipped.
    ///
    /// Returns whether the envelope was queued. Events below the minimum
    /// level return `false` before any work is done.
    pub fn submit<I, S>(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        fields: I,
        scopes: &[S],
        error: Option<&(dyn Error + 'static)>,
    ) -> bool
    where
        I: IntoIterator<Item = (String, MetadataValue)>,
        S: AsRef<str>,
    {
        if !self.is_enabled(level) {
            return false;
        }
        self.submit_captured(level, message, fields, scopes, error.map(ErrorValue::capture))
    }

    pub(crate) fn submit_captured<I, S>(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        fields: I,
        scopes: &[S],
        error: Option<ErrorValue>,
    ) -> bool
    where
        I: IntoIterator<Item = (String, MetadataValue)>,
        S: AsRef<str>,
    {
        if !self.is_enabled(level) {
            return false;
        }

        let mut metadata: BTreeMap<String, MetadataValue> = fields
            .into_iter()
            .filter(|(key, _)| !key.starts_with(FRAMEWORK_FIELD_PREFIX))
            .collect();

        metadata.insert(LOGGER_KEY.to_string(), MetadataValue::from(&*self.category));

        let scope_path = scopes
            .iter()
            .map(AsRef::as_ref)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(SCOPE_SEPARATOR);
        if !scope_path.is_empty() {
            metadata.insert(SCOPE_KEY.to_string(), MetadataValue::String(scope_path));
        }

        if let Some(err) = error {
            metadata.insert(ERROR_KEY.to_string(), MetadataValue::Error(err));
        }

        self.queue.enqueue(LogEnvelope::new(message, level, metadata))
    }

    /// Submit a plain message with no fields, scopes or error.
    pub fn log(&self, level: LogLevel, message: impl Into<String>) -> bool {
        let no_scopes: &[&str] = &[];
        self.submit(
            level,
            message,
            std::iter::empty::<(String, MetadataValue)>(),
            no_scopes,
            None,
        )
    }

    pub fn debug(&self, message: impl Into<String>) -> bool {
        self.log(LogLevel::Debug, message)
    }

    pub fn info(&self, message: impl Into<String>) -> bool {
        self.log(LogLevel::Information, message)
    }

    pub fn warn(&self, message: impl Into<String>) -> bool {
        self.log(LogLevel::Warning, message)
    }

    pub fn error(&self, message: impl Into<String>) -> bool {
        self.log(LogLevel::Error, message)
    }

    pub fn critical(&self, message: impl Into<String>) -> bool {
        self.log(LogLevel::Critical, message)
    }
}
