//! Environment variable names used by this crate for convenient
//! configuration from services.
//!
//! These are purely helpers; the sink and provider types remain decoupled
//! from environment access.

use crate::betterstack::{BetterStackConfig, DEFAULT_ENDPOINT};
use crate::error::ConfigError;
use crate::init::LoggerConfig;
use crate::record::LogLevel;
use std::time::Duration;

/// Better Stack source token (required).
pub const BETTERSTACK_SOURCE_TOKEN_ENV: &str = "BETTERSTACK_SOURCE_TOKEN";

/// Ingestion endpoint, defaults to the public Better Stack intake.
pub const BETTERSTACK_ENDPOINT_ENV: &str = "BETTERSTACK_ENDPOINT";

/// Flush frequency in milliseconds.
pub const BETTERSTACK_FLUSH_FREQUENCY_MS_ENV: &str = "BETTERSTACK_FLUSH_FREQUENCY_MS";

/// Maximum envelopes per upload.
pub const BETTERSTACK_BATCH_SIZE_ENV: &str = "BETTERSTACK_BATCH_SIZE";

/// Minimum level shipped, e.g. `debug` or `warning`.
pub const BETTERSTACK_MIN_LEVEL_ENV: &str = "BETTERSTACK_MIN_LEVEL";

/// Build both configurations from the process environment.
pub fn from_env() -> Result<(BetterStackConfig, LoggerConfig), ConfigError> {
    from_lookup(|key| std::env::var(key).ok())
}

/// Build both configurations from an arbitrary key lookup. Unset keys keep
/// their defaults; set but unparsable values are errors.
pub fn from_lookup<F>(lookup: F) -> Result<(BetterStackConfig, LoggerConfig), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let token = lookup(BETTERSTACK_SOURCE_TOKEN_ENV).ok_or(ConfigError::MissingSourceToken)?;
    let endpoint = lookup(BETTERSTACK_ENDPOINT_ENV).unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
    let sink_config = BetterStackConfig::new(token).with_endpoint(endpoint);
    sink_config.validate()?;

    let mut logger_config = LoggerConfig::default();
    if let Some(raw) = lookup(BETTERSTACK_FLUSH_FREQUENCY_MS_ENV) {
        let ms = parse_number(BETTERSTACK_FLUSH_FREQUENCY_MS_ENV, &raw)?;
        logger_config.flush_frequency = Duration::from_millis(ms);
    }
    if let Some(raw) = lookup(BETTERSTACK_BATCH_SIZE_ENV) {
        let size = parse_number(BETTERSTACK_BATCH_SIZE_ENV, &raw)?;
        if size == 0 {
            return Err(ConfigError::InvalidSetting {
                key: BETTERSTACK_BATCH_SIZE_ENV,
                value: raw,
            });
        }
        logger_config.batch_size = size as usize;
    }
    if let Some(raw) = lookup(BETTERSTACK_MIN_LEVEL_ENV) {
        logger_config.min_level = LogLevel::parse(&raw).ok_or(ConfigError::InvalidSetting {
            key: BETTERSTACK_MIN_LEVEL_ENV,
            value: raw.clone(),
        })?;
    }

    Ok((sink_config, logger_config))
}

fn parse_number(key: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidSetting {
        key,
        value: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn reads_all_settings() {
        let (sink, logger) = from_lookup(lookup(&[
            (BETTERSTACK_SOURCE_TOKEN_ENV, "tok"),
            (BETTERSTACK_ENDPOINT_ENV, "https://intake.example.com/"),
            (BETTERSTACK_FLUSH_FREQUENCY_MS_ENV, "250"),
            (BETTERSTACK_BATCH_SIZE_ENV, "42"),
            (BETTERSTACK_MIN_LEVEL_ENV, "debug"),
        ]))
        .unwrap();
        assert_eq!(sink.source_token, "tok");
        assert_eq!(sink.endpoint, "https://intake.example.com/");
        assert_eq!(logger.flush_frequency, Duration::from_millis(250));
        assert_eq!(logger.batch_size, 42);
        assert_eq!(logger.min_level, LogLevel::Debug);
    }

    #[test]
    fn missing_token_fails_fast() {
        let err = from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingSourceToken));
    }

    #[test]
    fn rejects_zero_batch_size_and_unknown_level() {
        let err = from_lookup(lookup(&[
            (BETTERSTACK_SOURCE_TOKEN_ENV, "tok"),
            (BETTERSTACK_BATCH_SIZE_ENV, "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSetting { key, .. } if key == BETTERSTACK_BATCH_SIZE_ENV));

        let err = from_lookup(lookup(&[
            (BETTERSTACK_SOURCE_TOKEN_ENV, "tok"),
            (BETTERSTACK_MIN_LEVEL_ENV, "loud"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSetting { .. }));
    }

    #[test]
    fn defaults_endpoint() {
        let (sink, _) = from_lookup(lookup(&[(BETTERSTACK_SOURCE_TOKEN_ENV, "tok")])).unwrap();
        assert_eq!(sink.endpoint, DEFAULT_ENDPOINT);
    }
}
