use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ConfigError, MonitorError};
use crate::queue::DEFAULT_QUEUE_CAPACITY;
use crate::stats::collector::DEFAULT_WINDOW_SIZE;

// ─── Monitor configuration ───────────────────────────────────────

/// Tunables shared by every verb. Loaded from an optional JSON file, then
/// overridden by command-line flags.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MonitorConfig {
    /// Samples kept per topic for windowed statistics
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    /// Reporting cadence (milliseconds)
    #[serde(default = "default_report_period_ms")]
    pub report_period_ms: u64,

    /// Pre-rendered blocks held by the echo output queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// How long the echo consumer blocks before re-checking for shutdown
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,

    /// Upper bound on waiting for the output task at shutdown (milliseconds)
    #[serde(default = "default_join_timeout_ms")]
    pub join_timeout_ms: u64,
}

fn default_window_size() -> usize {
    DEFAULT_WINDOW_SIZE
}
fn default_report_period_ms() -> u64 {
    1_000
}
fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}
fn default_poll_timeout_ms() -> u64 {
    500
}
fn default_join_timeout_ms() -> u64 {
    1_000
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            report_period_ms: default_report_period_ms(),
            queue_capacity: default_queue_capacity(),
            poll_timeout_ms: default_poll_timeout_ms(),
            join_timeout_ms: default_join_timeout_ms(),
        }
    }
}

impl MonitorConfig {
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(format!("{}: {e}", path.display())))?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| ConfigError::Read(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("window_size", self.window_size as u64),
            ("report_period_ms", self.report_period_ms),
            ("queue_capacity", self.queue_capacity as u64),
            ("poll_timeout_ms", self.poll_timeout_ms),
            ("join_timeout_ms", self.join_timeout_ms),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::NotPositive { field });
            }
        }
        Ok(())
    }

    pub fn report_period(&self) -> Duration {
        Duration::from_millis(self.report_period_ms)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }
}

// ─── Topic selection ─────────────────────────────────────────────

/// Which topics a statistics run attaches to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicSelection {
    Named(Vec<String>),
    All { include_hidden: bool },
}

impl TopicSelection {
    /// Exactly one of explicit names or "all" must be given.
    pub fn new(names: Vec<String>, all: bool, include_hidden: bool) -> Result<Self, MonitorError> {
        match (names.is_empty(), all) {
            (true, false) => Err(MonitorError::Usage(
                "Either specify topic names or use --all/-a option".into(),
            )),
            (false, true) => Err(MonitorError::Usage(
                "Cannot specify both --all/-a and topic names".into(),
            )),
            (true, true) => Ok(Self::All { include_hidden }),
            (false, false) => Ok(Self::Named(names)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let config: MonitorConfig = serde_json::from_str(r#"{ "window_size": 20 }"#).unwrap();
        assert_eq!(config.window_size, 20);
        assert_eq!(config.report_period(), Duration::from_secs(1));
        assert_eq!(config.queue_capacity, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_zero_window() {
        let config = MonitorConfig {
            window_size: 0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::NotPositive { field: "window_size" })
        );
    }

    #[test]
    fn rejects_unknown_fields() {
        assert!(serde_json::from_str::<MonitorConfig>(r#"{ "windw": 1 }"#).is_err());
        // push timeouts are given per call, not configured
        assert!(serde_json::from_str::<MonitorConfig>(r#"{ "push_timeout_ms": 500 }"#).is_err());
    }

    #[test]
    fn topic_selection_requires_exactly_one_source() {
        let err = TopicSelection::new(vec![], false, false).unwrap_err();
        assert_eq!(err.to_string(), "Either specify topic names or use --all/-a option");

        let err = TopicSelection::new(vec!["/a".into()], true, false).unwrap_err();
        assert_eq!(err.to_string(), "Cannot specify both --all/-a and topic names");

        assert_eq!(
            TopicSelection::new(vec![], true, true).unwrap(),
            TopicSelection::All { include_hidden: true }
        );
        assert_eq!(
            TopicSelection::new(vec!["/a".into()], false, false).unwrap(),
            TopicSelection::Named(vec!["/a".into()])
        );
    }
}
