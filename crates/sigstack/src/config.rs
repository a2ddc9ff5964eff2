//! Stack configuration, loadable from TOML
//!
//! ```toml
//! event_capacity = 256
//!
//! [timers]
//! t1 = 500
//! wait_time_h = 32000
//!
//! [dispatcher]
//! channel_capacity = 100
//! send_deadline_ms = 200
//!
//! [logging]
//! level = "debug"
//! ```
//!
//! Every section and field is optional and falls back to its default.

use std::path::Path;

use serde::{Deserialize, Serialize};

use sigstack_dispatcher::DispatcherConfig;
use sigstack_transaction_core::{TimerSettings, DEFAULT_EVENT_CAPACITY};

use crate::error::ConfigError;
use crate::logging::LoggingConfig;

/// Configuration for a whole [`SipServer`](crate::SipServer)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StackConfig {
    /// Transaction timer durations
    pub timers: TimerSettings,
    /// Dispatcher channel sizing and backpressure reporting
    pub dispatcher: DispatcherConfig,
    /// Capacity of the transaction event channel to the TU
    pub event_capacity: usize,
    /// Logging setup
    pub logging: LoggingConfig,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            timers: TimerSettings::default(),
            dispatcher: DispatcherConfig::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
            logging: LoggingConfig::default(),
        }
    }
}

impl StackConfig {
    /// Parses a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads and parses a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(StackConfig::from_toml_str("").unwrap(), StackConfig::default());
    }

    #[test]
    fn test_partial_sections() {
        let config = StackConfig::from_toml_str(
            r#"
            event_capacity = 16

            [timers]
            t1 = 250

            [logging]
            level = "trace"
            "#,
        )
        .unwrap();

        assert_eq!(config.event_capacity, 16);
        assert_eq!(config.timers.t1, Duration::from_millis(250));
        assert_eq!(config.timers.t2, Duration::from_secs(4));
        assert_eq!(config.dispatcher, DispatcherConfig::default());
        assert_eq!(config.logging.level, "trace");
        assert_eq!(config.logging.app_name, "sigstack");
    }

    #[test]
    fn test_wrong_type_is_rejected() {
        let result = StackConfig::from_toml_str("event_capacity = \"many\"");
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    #[test]
    fn test_missing_file() {
        let result = StackConfig::load("/nonexistent/sigstack.toml");
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
