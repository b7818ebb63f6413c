use async_trait::async_trait;
use betterstack_log_sink::record::{LogEnvelope, LogLevel, MetadataValue, ERROR_KEY, SCOPE_KEY};
use betterstack_log_sink::betterstack::{BetterStackConfig, BetterStackSink};
use betterstack_log_sink::{BetterStackLayer, LogSink, LoggerConfig, LoggerProvider, UploadError};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, info_span, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Sink remembering every batch it was handed.
#[derive(Default)]
struct RecordingSink {
    batches: Mutex<Vec<Vec<LogEnvelope>>>,
}

impl RecordingSink {
    fn batches(&self) -> Vec<Vec<LogEnvelope>> {
        self.batches.lock().unwrap().clone()
    }

    fn envelopes(&self) -> Vec<LogEnvelope> {
        self.batches().into_iter().flatten().collect()
    }
}

#[async_trait]
impl LogSink for RecordingSink {
    async fn upload(&self, batch: &[LogEnvelope]) -> Result<(), UploadError> {
        self.batches.lock().unwrap().push(batch.to_vec());
        Ok(())
    }
}

fn pipeline(flush_ms: u64) -> (Arc<RecordingSink>, LoggerProvider) {
    let sink = Arc::new(RecordingSink::default());
    let config = LoggerConfig {
        flush_frequency: Duration::from_millis(flush_ms),
        min_level: LogLevel::Debug,
        ..LoggerConfig::default()
    };
    let provider = LoggerProvider::new(sink.clone(), config).unwrap();
    (sink, provider)
}

#[tokio::test]
async fn uploads_one_ordered_batch_per_flush() {
    let (sink, provider) = pipeline(50);
    let logger = provider.get_logger("LoggerTests");

    logger.debug("Test debug");
    logger.info("Test info");
    logger.warn("Test warning");
    logger.error("Test error");
    logger.critical("Test critical");
    sleep(Duration::from_millis(100)).await;

    let batches = sink.batches();
    assert_eq!(batches.len(), 1);
    let levels: Vec<_> = batches[0].iter().map(|e| e.level()).collect();
    assert_eq!(
        levels,
        vec![
            LogLevel::Debug,
            LogLevel::Information,
            LogLevel::Warning,
            LogLevel::Error,
            LogLevel::Critical
        ]
    );
    assert_eq!(batches[0][0].message(), "Test debug");
    assert_eq!(batches[0][4].message(), "Test critical");
    assert_eq!(batches[0][0].metadata()["Logger"], MetadataValue::from("LoggerTests"));

    provider.shutdown().await;
}

#[tokio::test]
async fn shutdown_drains_everything_submitted_before_it() {
    let (sink, provider) = pipeline(60_000);
    provider.update_config(LoggerConfig {
        batch_size: 10,
        flush_frequency: Duration::from_secs(60),
        min_level: LogLevel::Debug,
        ..LoggerConfig::default()
    });
    let logger = provider.get_logger("drain");
    for i in 0..95 {
        logger.info(format!("event {i}"));
    }

    provider.shutdown().await;

    let batches = sink.batches();
    assert!(batches.iter().all(|b| b.len() <= 10));
    let messages: Vec<_> = sink.envelopes().iter().map(|e| e.message().to_string()).collect();
    let expected: Vec<_> = (0..95).map(|i| format!("event {i}")).collect();
    assert_eq!(messages, expected);
    assert_eq!(provider.flush_stats().envelopes_delivered, 95);
}

#[tokio::test]
async fn tracing_events_carry_fields_and_errors() {
    let (sink, provider) = pipeline(10);
    let subscriber = Registry::default().with(BetterStackLayer::new(provider.clone()));

    tracing::subscriber::with_default(subscriber, || {
        error!(TestData = "Test value", "Test error with Test value");
        let io_err = std::io::Error::new(std::io::ErrorKind::Other, "Test exception");
        error!(error = &io_err as &(dyn std::error::Error + 'static), "Test error");
    });
    provider.shutdown().await;

    let envelopes = sink.envelopes();
    assert_eq!(envelopes.len(), 2);

    assert_eq!(envelopes[0].level(), LogLevel::Error);
    assert_eq!(envelopes[0].message(), "Test error with Test value");
    assert_eq!(envelopes[0].metadata()["TestData"], MetadataValue::from("Test value"));
    assert_eq!(envelopes[0].metadata()["Logger"], MetadataValue::from("pipeline"));

    match &envelopes[1].metadata()[ERROR_KEY] {
        MetadataValue::Error(e) => assert_eq!(e.message, "Test exception"),
        other => panic!("expected error metadata, got {other:?}"),
    }
}

#[tokio::test]
async fn nested_spans_become_scope_path() {
    let (sink, provider) = pipeline(10);
    let subscriber = Registry::default().with(BetterStackLayer::new(provider.clone()));

    tracing::subscriber::with_default(subscriber, || {
        let outer = info_span!("Outer scope").entered();
        {
            let _inner = info_span!("Inner scope").entered();
            info!("Test message");
        }
        info!("After inner");
        drop(outer);
        info!("Outside");
    });
    provider.shutdown().await;

    let envelopes = sink.envelopes();
    assert_eq!(envelopes.len(), 3);
    assert_eq!(
        envelopes[0].metadata()[SCOPE_KEY],
        MetadataValue::from("Outer scope / Inner scope")
    );
    assert_eq!(envelopes[1].metadata()[SCOPE_KEY], MetadataValue::from("Outer scope"));
    assert!(!envelopes[2].metadata().contains_key(SCOPE_KEY));
}

#[tokio::test]
async fn layer_filters_levels_framework_fields_and_own_diagnostics() {
    let sink = Arc::new(RecordingSink::default());
    let config = LoggerConfig {
        min_level: LogLevel::Information,
        flush_frequency: Duration::from_millis(10),
        ..LoggerConfig::default()
    };
    let provider = LoggerProvider::new(sink.clone(), config).unwrap();
    let subscriber = Registry::default().with(BetterStackLayer::new(provider.clone()));

    tracing::subscriber::with_default(subscriber, || {
        debug!("too chatty");
        warn!(target: "betterstack_log_sink::internal", "internal diagnostic");
        warn!(log.target = "legacy", user = 7, "bridged");
    });
    provider.shutdown().await;

    let envelopes = sink.envelopes();
    assert_eq!(envelopes.len(), 1);
    assert_eq!(envelopes[0].message(), "bridged");
    assert!(!envelopes[0].metadata().contains_key("log.target"));
    assert_eq!(envelopes[0].metadata()["user"], MetadataValue::from(7i64));
    assert_eq!(provider.queue_stats().submitted, 1);
}

#[tokio::test]
async fn delivery_traffic_is_never_shipped_at_trace_level() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(202))
        .mount(&server)
        .await;

    let sink = BetterStackSink::new(BetterStackConfig::new("token").with_endpoint(server.uri())).unwrap();
    let config = LoggerConfig {
        min_level: LogLevel::Trace,
        flush_frequency: Duration::from_millis(20),
        ..LoggerConfig::default()
    };
    let provider = LoggerProvider::new(Arc::new(sink), config).unwrap();
    let subscriber = Registry::default().with(BetterStackLayer::new(provider.clone()));
    let _guard = tracing::subscriber::set_default(subscriber);

    info!(target: "app", "only event");
    sleep(Duration::from_millis(600)).await;
    provider.shutdown().await;

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    let entries = body.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["message"], "only event");
    assert_eq!(provider.queue_stats().submitted, 1);
}

/// Sink that logs through `tracing` while uploading.
#[derive(Default)]
struct ChattySink {
    inner: RecordingSink,
}

#[async_trait]
impl LogSink for ChattySink {
    async fn upload(&self, batch: &[LogEnvelope]) -> Result<(), UploadError> {
        info!(target: "chatty_sink", count = batch.len(), "uploading");
        self.inner.upload(batch).await
    }
}

#[tokio::test]
async fn events_raised_during_delivery_are_not_requeued() {
    let sink = Arc::new(ChattySink::default());
    let config = LoggerConfig {
        min_level: LogLevel::Debug,
        flush_frequency: Duration::from_millis(10),
        ..LoggerConfig::default()
    };
    let provider = LoggerProvider::new(sink.clone(), config).unwrap();
    let subscriber = Registry::default().with(BetterStackLayer::new(provider.clone()));
    let _guard = tracing::subscriber::set_default(subscriber);

    info!(target: "app", "hello");
    sleep(Duration::from_millis(100)).await;
    provider.shutdown().await;

    let envelopes = sink.inner.envelopes();
    assert_eq!(envelopes.len(), 1);
    assert_eq!(envelopes[0].message(), "hello");
}

#[tokio::test]
async fn direct_submit_attaches_scopes_error_and_fields() {
    let (sink, provider) = pipeline(10);
    let logger = provider.get_logger("orders");
    let err = std::io::Error::new(std::io::ErrorKind::TimedOut, "upstream timed out");

    logger.submit(
        LogLevel::Error,
        "checkout failed",
        vec![
            ("order_id".to_string(), MetadataValue::from(42i64)),
            ("log.file".to_string(), MetadataValue::from("main.rs")),
            ("items".to_string(), MetadataValue::structured(vec!["a", "b"])),
        ],
        &["request", "", "checkout"],
        Some(&err),
    );
    provider.shutdown().await;

    let envelopes = sink.envelopes();
    let metadata = envelopes[0].metadata();
    assert_eq!(metadata[SCOPE_KEY], MetadataValue::from("request / checkout"));
    assert_eq!(metadata["order_id"], MetadataValue::from(42i64));
    assert!(!metadata.contains_key("log.file"));
    assert!(matches!(&metadata["items"], MetadataValue::Structured(_)));
    assert!(matches!(&metadata[ERROR_KEY], MetadataValue::Error(e) if e.message == "upstream timed out"));
}
