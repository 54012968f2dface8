//! Configuration schema definitions.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use warden_core::DEFAULT_CAPACITY;
use warden_framework::DispatcherOptions;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WardenConfig {
    /// Log output settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Work channel sizing.
    #[serde(default)]
    pub channels: ChannelsConfig,

    /// Shutdown behaviour.
    #[serde(default)]
    pub shutdown: ShutdownConfig,

    /// Entity lock table housekeeping.
    #[serde(default)]
    pub locks: LocksConfig,
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Returns the level as a filter directive string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Converts to the `tracing` level.
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    #[cfg(feature = "json-log")]
    Json,
}

/// Where log lines go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoggingConfig {
    /// Base level, used unless `RUST_LOG` is set.
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    /// Target file when `output = "file"`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Include thread ids in log lines.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include source file and line in log lines.
    #[serde(default)]
    pub file_location: bool,

    /// Per-module levels, e.g. `warden_core = "debug"`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,
}

// =============================================================================
// Channels
// =============================================================================

/// Work channel sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelsConfig {
    /// Capacity of every channel without an override.
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Per-channel capacity, keyed by channel label (`pets`, `stats`, ...).
    #[serde(default)]
    pub overrides: HashMap<String, usize>,
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            overrides: HashMap::new(),
        }
    }
}

impl ChannelsConfig {
    /// Converts to dispatcher construction options.
    pub fn to_options(&self) -> DispatcherOptions {
        DispatcherOptions {
            default_capacity: self.capacity,
            capacities: self.overrides.clone(),
        }
    }
}

fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}

// =============================================================================
// Shutdown
// =============================================================================

/// Shutdown configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// How long queued work may keep draining before consumers are cancelled.
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: default_grace_period_ms(),
        }
    }
}

impl ShutdownConfig {
    /// Returns the grace period as a `Duration`.
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}

fn default_grace_period_ms() -> u64 {
    5_000
}

// =============================================================================
// Locks
// =============================================================================

/// Entity lock table configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocksConfig {
    /// How often lock entries nobody holds or waits on are dropped.
    #[serde(default = "default_prune_interval_ms")]
    pub prune_interval_ms: u64,
}

impl Default for LocksConfig {
    fn default() -> Self {
        Self {
            prune_interval_ms: default_prune_interval_ms(),
        }
    }
}

impl LocksConfig {
    /// Returns the prune interval as a `Duration`.
    pub fn prune_interval(&self) -> Duration {
        Duration::from_millis(self.prune_interval_ms)
    }
}

fn default_prune_interval_ms() -> u64 {
    60_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WardenConfig::default();
        assert_eq!(config.channels.capacity, 10_000);
        assert!(config.channels.overrides.is_empty());
        assert_eq!(config.shutdown.grace_period(), Duration::from_secs(5));
        assert_eq!(config.locks.prune_interval(), Duration::from_secs(60));
        assert_eq!(config.logging.level, LogLevel::Info);
        assert_eq!(config.logging.output, LogOutput::Stdout);
    }

    #[test]
    fn test_channel_options() {
        let mut channels = ChannelsConfig::default();
        channels.overrides.insert("stats".into(), 50);

        let options = channels.to_options();
        assert_eq!(options.capacity_for("stats"), 50);
        assert_eq!(options.capacity_for("pets"), 10_000);
    }
}
