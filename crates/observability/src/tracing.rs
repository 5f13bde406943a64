//! Tracing subscriber installation.
//!
//! The bus only emits `tracing` events; whether and how they are printed is up
//! to the host. This module is the default: an fmt subscriber filtered by
//! `RUST_LOG`.

use serde::Deserialize;
use tracing_subscriber::EnvFilter;

/// Output encoding of log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Human-readable single-line output.
    Compact,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub format: LogFormat,
    /// Directive used when `RUST_LOG` is unset or invalid.
    pub default_filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Json,
            default_filter: "info".to_string(),
        }
    }
}

impl LogConfig {
    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.default_filter))
    }
}

/// Install the global subscriber described by `config`.
///
/// Returns `false` if a subscriber was already installed, in which case
/// nothing changes.
pub fn init(config: &LogConfig) -> bool {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(config.env_filter())
        .with_target(false);

    let installed = match config.format {
        LogFormat::Json => builder
            .json()
            .with_timer(tracing_subscriber::fmt::time::SystemTime)
            .try_init(),
        LogFormat::Compact => builder.compact().try_init(),
    };

    if installed.is_err() {
        return false;
    }
    ::tracing::debug!(format = ?config.format, "tracing subscriber installed");
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_json_at_info() {
        let config = LogConfig::default();
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.default_filter, "info");
    }

    #[test]
    fn deserializes_partial_config() {
        let config: LogConfig = serde_json::from_str(r#"{ "format": "compact" }"#).unwrap();
        assert_eq!(config.format, LogFormat::Compact);
        assert_eq!(config.default_filter, "info");
    }

    #[test]
    fn second_init_is_a_noop() {
        let config = LogConfig {
            format: LogFormat::Compact,
            default_filter: "debug".to_string(),
        };
        init(&config);
        assert!(!init(&config));
    }
}
