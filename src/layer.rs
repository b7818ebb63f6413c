use crate::provider::LoggerProvider;
use crate::record::{ErrorValue, LogLevel, MetadataValue};
use crate::INTERNAL_TARGET;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// Crates whose events are emitted while a batch is being delivered,
/// including from connection tasks running outside the flush task.
const TRANSPORT_TARGETS: &[&str] = &["hyper", "hyper_util", "h2", "reqwest", "rustls", "want"];

fn is_delivery_target(target: &str) -> bool {
    if target.starts_with(INTERNAL_TARGET) {
        return true;
    }
    let krate = target.split("::").next().unwrap_or(target);
    TRANSPORT_TARGETS.contains(&krate)
}

/// `tracing_subscriber` layer that turns events into envelopes and submits
/// them to a [`LoggerProvider`].
///
/// The event target is the logger category and the names of the enclosing
/// spans, outermost first, form the scope path. Submitting only queues the
/// envelope; network I/O happens on the provider's flush task.
pub struct BetterStackLayer {
    provider: LoggerProvider,
}

impl BetterStackLayer {
    pub fn new(provider: LoggerProvider) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &LoggerProvider {
        &self.provider
    }
}

impl<S> Layer<S> for BetterStackLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let meta = event.metadata();
        // The pipeline's own diagnostics and the HTTP stack it delivers
        // through must not feed back into it.
        if is_delivery_target(meta.target()) {
            return;
        }

        let level = LogLevel::from(meta.level());
        if !self.provider.is_enabled(level) {
            return;
        }

        let mut scopes: Vec<&str> = Vec::new();
        if let Some(scope) = ctx.event_scope(event) {
            for span in scope.from_root() {
                // Raised from inside the flush task.
                if span.metadata().target().starts_with(INTERNAL_TARGET) {
                    return;
                }
                scopes.push(span.name());
            }
        }

        let logger = self.provider.get_logger(meta.target());
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        logger.submit_captured(
            level,
            visitor.message.unwrap_or_default(),
            visitor.fields,
            scopes.as_slice(),
            visitor.error,
        );
    }
}

/// Collects an event's fields. `message` becomes the rendered text, the
/// first error value becomes the attached error, everything else metadata.
#[derive(Default)]
pub struct FieldVisitor {
    pub fields: Vec<(String, MetadataValue)>,
    pub message: Option<String>,
    pub error: Option<ErrorValue>,
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields.push((field.name().to_string(), MetadataValue::from(value)));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.push((field.name().to_string(), MetadataValue::from(value)));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.push((field.name().to_string(), MetadataValue::from(value)));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields.push((field.name().to_string(), MetadataValue::from(value)));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.push((field.name().to_string(), MetadataValue::from(value)));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        let captured = ErrorValue::capture(value);
        if self.error.is_none() {
            self.error = Some(captured);
        } else {
            self.fields.push((field.name().to_string(), MetadataValue::Error(captured)));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{:?}", value));
        } else {
            self.fields.push((field.name().to_string(), MetadataValue::String(format!("{:?}", value))));
        }
    }
}
