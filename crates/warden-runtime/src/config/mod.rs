//! Configuration module for the Warden runtime.
//!
//! Layered loading (defaults, files, environment, programmatic overrides)
//! and validation of logging, channel sizing, shutdown and lock table settings.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile};
pub use schema::{
    ChannelsConfig, LocksConfig, LogFormat, LogLevel, LogOutput, LoggingConfig, ShutdownConfig,
    SpanEventConfig, WardenConfig,
};
pub use validation::validate_config;
