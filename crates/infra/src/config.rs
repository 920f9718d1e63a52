//! Projection daemon configuration.

use std::time::Duration;

use thiserror::Error;

pub const ENV_BATCH_SIZE: &str = "STREAMFOLD_BATCH_SIZE";
pub const ENV_POLL_INTERVAL_MS: &str = "STREAMFOLD_POLL_INTERVAL_MS";
pub const ENV_SKIP_APPLY_ERRORS: &str = "STREAMFOLD_SKIP_APPLY_ERRORS";
pub const ENV_SKIP_SERIALIZATION_ERRORS: &str = "STREAMFOLD_SKIP_SERIALIZATION_ERRORS";
pub const ENV_SKIP_UNKNOWN_EVENTS: &str = "STREAMFOLD_SKIP_UNKNOWN_EVENTS";

const DEFAULT_BATCH_SIZE: usize = 500;
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}' ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Which projection failures a worker logs and steps over instead of halting on.
///
/// Everything defaults to `false`: a failure halts the affected worker until it
/// is rebuilt.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct ErrorPolicy {
    pub skip_apply_errors: bool,
    pub skip_serialization_errors: bool,
    pub skip_unknown_events: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    /// Maximum number of events read from the log per batch.
    pub batch_size: usize,
    /// How long an idle worker waits for a bus wake-up before polling the log.
    pub poll_interval: Duration,
    pub error_policy: ErrorPolicy,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            error_policy: ErrorPolicy::default(),
        }
    }
}

impl DaemonConfig {
    /// Read overrides from the process environment; unset keys keep defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_BATCH_SIZE) {
            config.batch_size = parse_positive(ENV_BATCH_SIZE, &raw)?;
        }
        if let Some(raw) = lookup(ENV_POLL_INTERVAL_MS) {
            config.poll_interval = Duration::from_millis(parse_positive(ENV_POLL_INTERVAL_MS, &raw)? as u64);
        }
        if let Some(raw) = lookup(ENV_SKIP_APPLY_ERRORS) {
            config.error_policy.skip_apply_errors = parse_flag(ENV_SKIP_APPLY_ERRORS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_SKIP_SERIALIZATION_ERRORS) {
            config.error_policy.skip_serialization_errors = parse_flag(ENV_SKIP_SERIALIZATION_ERRORS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_SKIP_UNKNOWN_EVENTS) {
            config.error_policy.skip_unknown_events = parse_flag(ENV_SKIP_UNKNOWN_EVENTS, &raw)?;
        }

        Ok(config)
    }
}

fn parse_positive(key: &'static str, raw: &str) -> Result<usize, ConfigError> {
    let invalid = |reason: &str| ConfigError::Invalid {
        key,
        value: raw.to_string(),
        reason: reason.to_string(),
    };
    match raw.trim().parse::<usize>() {
        Ok(0) => Err(invalid("must be greater than zero")),
        Ok(n) => Ok(n),
        Err(e) => Err(invalid(&e.to_string())),
    }
}

fn parse_flag(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value: raw.to_string(),
            reason: "expected a boolean".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_halt_on_every_error() {
        let config = DaemonConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, DaemonConfig::default());
        assert_eq!(config.error_policy, ErrorPolicy::default());
        assert!(!config.error_policy.skip_apply_errors);
    }

    #[test]
    fn overrides_are_applied() {
        let config = DaemonConfig::from_lookup(lookup(&[
            (ENV_BATCH_SIZE, "50"),
            (ENV_POLL_INTERVAL_MS, "20"),
            (ENV_SKIP_UNKNOWN_EVENTS, "true"),
        ]))
        .unwrap();

        assert_eq!(config.batch_size, 50);
        assert_eq!(config.poll_interval, Duration::from_millis(20));
        assert!(config.error_policy.skip_unknown_events);
        assert!(!config.error_policy.skip_serialization_errors);
    }

    #[test]
    fn malformed_values_are_rejected() {
        let err = DaemonConfig::from_lookup(lookup(&[(ENV_BATCH_SIZE, "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: ENV_BATCH_SIZE, .. }));

        let err = DaemonConfig::from_lookup(lookup(&[(ENV_SKIP_APPLY_ERRORS, "maybe")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: ENV_SKIP_APPLY_ERRORS, .. }));
    }
}
