//! Environment-driven configuration.
//!
//! # Responsibility
//! - Resolve `NOTEDESK_*` variables into a typed `NotesConfig`.
//!
//! # Invariants
//! - Values are trimmed; empty values count as unset.
//! - Invalid values fail with `ConfigError`, never silently fall back.

use crate::logging::{default_log_level, normalize_level, LoggingConfig};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_BASE_URL: &str = "NOTEDESK_BASE_URL";
pub const ENV_TIMEOUT_MS: &str = "NOTEDESK_TIMEOUT_MS";
pub const ENV_STALE_AFTER_SECS: &str = "NOTEDESK_STALE_AFTER_SECS";
pub const ENV_LOG_LEVEL: &str = "NOTEDESK_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "NOTEDESK_LOG_DIR";
pub const ENV_EXPORT_DIR: &str = "NOTEDESK_EXPORT_DIR";

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";
const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Invalid configuration value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
    pub reason: &'static str,
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid {}=`{}`: {}", self.key, self.value, self.reason)
    }
}

impl Error for ConfigError {}

/// Resolved runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotesConfig {
    pub base_url: String,
    pub request_timeout: Duration,
    pub stale_after: Option<Duration>,
    pub log_level: &'static str,
    pub log_dir: Option<PathBuf>,
    pub export_dir: PathBuf,
}

impl Default for NotesConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            stale_after: None,
            log_level: default_log_level(),
            log_dir: None,
            export_dir: PathBuf::from("."),
        }
    }
}

impl NotesConfig {
    /// Reads configuration from the process environment.
    ///
    /// # Errors
    /// - `ConfigError` naming the first invalid variable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through an arbitrary lookup function.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let mut config = Self::default();

        if let Some(value) = read(ENV_BASE_URL) {
            config.base_url = parse_base_url(value)?;
        }
        if let Some(value) = read(ENV_TIMEOUT_MS) {
            let millis = parse_u64(ENV_TIMEOUT_MS, &value)?;
            if millis == 0 {
                return Err(invalid(ENV_TIMEOUT_MS, value, "must be greater than zero"));
            }
            config.request_timeout = Duration::from_millis(millis);
        }
        if let Some(value) = read(ENV_STALE_AFTER_SECS) {
            config.stale_after = Some(Duration::from_secs(parse_u64(
                ENV_STALE_AFTER_SECS,
                &value,
            )?));
        }
        if let Some(value) = read(ENV_LOG_LEVEL) {
            config.log_level = normalize_level(&value)
                .map_err(|_| invalid(ENV_LOG_LEVEL, value, "expected trace|debug|info|warn|error"))?;
        }
        if let Some(value) = read(ENV_LOG_DIR) {
            let path = PathBuf::from(&value);
            if !path.is_absolute() {
                return Err(invalid(ENV_LOG_DIR, value, "must be an absolute path"));
            }
            config.log_dir = Some(path);
        }
        if let Some(value) = read(ENV_EXPORT_DIR) {
            config.export_dir = PathBuf::from(value);
        }

        Ok(config)
    }

    /// Logging setup derived from this configuration.
    pub fn logging(&self) -> LoggingConfig {
        LoggingConfig {
            level: self.log_level.to_string(),
            log_dir: self.log_dir.clone(),
            duplicate_to_stderr: true,
        }
    }
}

fn parse_base_url(value: String) -> Result<String, ConfigError> {
    let lower = value.to_ascii_lowercase();
    let rest = lower
        .strip_prefix("http://")
        .or_else(|| lower.strip_prefix("https://"));
    match rest {
        Some(host) if !host.trim_matches('/').is_empty() => {
            Ok(value.trim_end_matches('/').to_string())
        }
        Some(_) => Err(invalid(ENV_BASE_URL, value, "missing host")),
        None => Err(invalid(ENV_BASE_URL, value, "expected an http:// or https:// url")),
    }
}

fn parse_u64(key: &'static str, value: &str) -> Result<u64, ConfigError> {
    value
        .parse::<u64>()
        .map_err(|_| invalid(key, value.to_string(), "expected a non-negative integer"))
}

fn invalid(key: &'static str, value: String, reason: &'static str) -> ConfigError {
    ConfigError { key, value, reason }
}

#[cfg(test)]
mod tests {
    use super::{NotesConfig, ENV_BASE_URL, ENV_LOG_DIR, ENV_TIMEOUT_MS};
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::time::Duration;

    fn config_from(pairs: &[(&str, &str)]) -> Result<NotesConfig, super::ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        NotesConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config, NotesConfig::default());
        assert_eq!(config.base_url, "http://127.0.0.1:8000");
        assert_eq!(config.request_timeout, Duration::from_millis(10_000));
        assert_eq!(config.stale_after, None);
    }

    #[test]
    fn values_are_trimmed_and_parsed() {
        let config = config_from(&[
            ("NOTEDESK_BASE_URL", "  https://notes.example.com/api/  "),
            ("NOTEDESK_TIMEOUT_MS", "2500"),
            ("NOTEDESK_STALE_AFTER_SECS", "30"),
            ("NOTEDESK_LOG_LEVEL", "WARN"),
            ("NOTEDESK_LOG_DIR", "/var/log/notedesk"),
            ("NOTEDESK_EXPORT_DIR", "exports"),
        ])
        .unwrap();

        assert_eq!(config.base_url, "https://notes.example.com/api");
        assert_eq!(config.request_timeout, Duration::from_millis(2500));
        assert_eq!(config.stale_after, Some(Duration::from_secs(30)));
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.log_dir, Some(PathBuf::from("/var/log/notedesk")));
        assert_eq!(config.export_dir, PathBuf::from("exports"));
    }

    #[test]
    fn blank_values_count_as_unset() {
        let config = config_from(&[("NOTEDESK_BASE_URL", "   "), ("NOTEDESK_LOG_DIR", "")]).unwrap();
        assert_eq!(config.base_url, "http://127.0.0.1:8000");
        assert_eq!(config.log_dir, None);
    }

    #[test]
    fn invalid_values_name_the_variable() {
        let err = config_from(&[("NOTEDESK_BASE_URL", "ftp://host")]).unwrap_err();
        assert_eq!(err.key, ENV_BASE_URL);

        let err = config_from(&[("NOTEDESK_TIMEOUT_MS", "0")]).unwrap_err();
        assert_eq!(err.key, ENV_TIMEOUT_MS);

        let err = config_from(&[("NOTEDESK_TIMEOUT_MS", "soon")]).unwrap_err();
        assert_eq!(err.key, ENV_TIMEOUT_MS);

        let err = config_from(&[("NOTEDESK_LOG_DIR", "relative/logs")]).unwrap_err();
        assert_eq!(err.key, ENV_LOG_DIR);
        assert!(err.to_string().contains("absolute"));
    }
}
