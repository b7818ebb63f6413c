use crate::error::{ConfigError, UploadError};
use crate::record::{format_timestamp, LogEnvelope, MetadataValue};
use crate::sink::LogSink;
use crate::INTERNAL_TARGET;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Url};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Default Better Stack Logs ingestion endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://in.logs.betterstack.com/";

/// Exponential backoff applied to transient delivery failures.
///
/// The delay before retry `n` (1-based) is `unit * base^n`, capped at
/// `max_delay`. With the defaults that is 2s, 4s, 8s, 16s, 32s.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base: f64,
    pub unit: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base: 2.0,
            unit: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn delay_for(&self, retry: u32) -> Duration {
        let secs = self.unit.as_secs_f64() * self.base.powi(retry as i32);
        let capped = secs.min(self.max_delay.as_secs_f64()).max(0.0);
        Duration::from_secs_f64(capped)
    }
}

/// Configuration for [`BetterStackSink`].
#[derive(Clone)]
pub struct BetterStackConfig {
    /// Intake URL. Only scheme, host and port are used: batches are POSTed
    /// to the root path of this address.
    pub endpoint: String,
    pub source_token: String,
    /// Static metadata merged into every envelope at delivery time.
    /// Context keys override envelope keys of the same name.
    pub context: BTreeMap<String, MetadataValue>,
    pub retry: RetryPolicy,
    pub request_timeout: Duration,
}

impl BetterStackConfig {
    pub fn new(source_token: impl Into<String>) -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            source_token: source_token.into(),
            context: BTreeMap::new(),
            retry: RetryPolicy::default(),
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Check the settings and resolve the endpoint to its root, `/`.
    pub fn validate(&self) -> Result<Url, ConfigError> {
        if self.source_token.trim().is_empty() {
            return Err(ConfigError::MissingSourceToken);
        }
        let url = Url::parse(self.endpoint.trim()).map_err(|e| ConfigError::InvalidEndpoint {
            url: self.endpoint.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidEndpoint {
                url: self.endpoint.clone(),
                reason: format!("unsupported scheme `{}`", url.scheme()),
            });
        }
        url.join("/").map_err(|e| ConfigError::InvalidEndpoint {
            url: self.endpoint.clone(),
            reason: e.to_string(),
        })
    }
}

impl fmt::Debug for BetterStackConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BetterStackConfig")
            .field("endpoint", &self.endpoint)
            .field("source_token", &"<redacted>")
            .field("context", &self.context)
            .field("retry", &self.retry)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Better Stack implementation of [`LogSink`]: one JSON array per batch,
/// POSTed with bearer authorization and retried with backoff.
#[derive(Clone)]
pub struct BetterStackSink {
    client: Client,
    endpoint: Url,
    config: BetterStackConfig,
}

impl BetterStackSink {
    /// Construct a sink with its own HTTP client.
    ///
    /// **Returns**
    /// - A ready-to-use [`BetterStackSink`].
    /// - `Err(ConfigError)` if the token is blank, the endpoint does not
    ///   parse, or the HTTP client cannot be built.
    pub fn new(config: BetterStackConfig) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(ConfigError::HttpClient)?;
        Self::with_client(config, client)
    }

    /// Construct a sink on top of a caller-supplied client, e.g. one
    /// sharing a connection pool with the rest of the application.
    pub fn with_client(config: BetterStackConfig, client: Client) -> Result<Self, ConfigError> {
        let endpoint = config.validate()?;
        Ok(Self {
            client,
            endpoint,
            config,
        })
    }

    pub fn config(&self) -> &BetterStackConfig {
        &self.config
    }

    async fn post(&self, payload: &str) -> Result<(), UploadError> {
        let resp = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.config.source_token)
            .header(CONTENT_TYPE, "application/json")
            .body(payload.to_owned())
            .send()
            .await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_else(|_| "<no body>".to_string());
            Err(UploadError::Status { status, body })
        }
    }
}

#[async_trait]
impl LogSink for BetterStackSink {
    async fn upload(&self, batch: &[LogEnvelope]) -> Result<(), UploadError> {
        let payload = serialize_batch(batch, &self.config.context)?;
        let mut retry = 0;
        loop {
            match self.post(&payload).await {
                Ok(()) => {
                    debug!(target: INTERNAL_TARGET, count = batch.len(), retries = retry, "batch accepted");
                    return Ok(());
                }
                Err(e) if e.is_transient() && retry < self.config.retry.max_retries => {
                    retry += 1;
                    let delay = self.config.retry.delay_for(retry);
                    warn!(target: INTERNAL_TARGET, error = %e, ?delay, retry, "upload failed, retrying");
                    sleep(delay).await;
                }
                Err(e) if e.is_transient() => {
                    return Err(UploadError::RetriesExhausted {
                        attempts: retry + 1,
                        last: Box::new(e),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[derive(Serialize)]
struct WireEnvelope<'a> {
    message: &'a str,
    level: &'static str,
    metadata: serde_json::Map<String, serde_json::Value>,
    dt: String,
}

/// Render a batch as the intake's JSON array.
///
/// `context` is merged into each envelope's metadata (context wins) without
/// touching the envelope itself, so a batch serialized twice comes out the
/// same. An envelope whose complex metadata cannot be converted is sent with
/// its primitive metadata only.
pub fn serialize_batch(
    batch: &[LogEnvelope],
    context: &BTreeMap<String, MetadataValue>,
) -> Result<String, serde_json::Error> {
    let mut wire = Vec::with_capacity(batch.len());
    for envelope in batch {
        let merged = merge_context(envelope, context);
        let metadata = match metadata_json(&merged, false) {
            Ok(metadata) => metadata,
            Err(e) => {
                debug!(target: INTERNAL_TARGET, error = %e, "metadata not serializable, keeping primitive fields only");
                metadata_json(&merged, true)?
            }
        };
        wire.push(WireEnvelope {
            message: envelope.message(),
            level: envelope.level().as_str(),
            metadata,
            dt: format_timestamp(&envelope.timestamp()),
        });
    }
    serde_json::to_string(&wire)
}

fn merge_context<'a>(
    envelope: &'a LogEnvelope,
    context: &'a BTreeMap<String, MetadataValue>,
) -> BTreeMap<&'a str, &'a MetadataValue> {
    let mut merged: BTreeMap<&str, &MetadataValue> = envelope
        .metadata()
        .iter()
        .map(|(k, v)| (k.as_str(), v))
        .collect();
    for (k, v) in context {
        merged.insert(k.as_str(), v);
    }
    merged
}

fn metadata_json(
    merged: &BTreeMap<&str, &MetadataValue>,
    primitive_only: bool,
) -> Result<serde_json::Map<String, serde_json::Value>, serde_json::Error> {
    let mut out = serde_json::Map::new();
    for (key, value) in merged {
        if primitive_only && !value.is_primitive() {
            continue;
        }
        out.insert((*key).to_string(), value.to_json()?);
    }
    Ok(out)
}
