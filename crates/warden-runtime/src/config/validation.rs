//! Configuration validation utilities.

use warden_framework::LABELS;

use super::error::{ConfigError, ConfigResult};
use super::schema::{
    ChannelsConfig, LocksConfig, LogOutput, LoggingConfig, ShutdownConfig, WardenConfig,
};

/// Validates the entire configuration.
pub fn validate_config(config: &WardenConfig) -> ConfigResult<()> {
    validate_logging_config(&config.logging)?;
    validate_channels_config(&config.channels)?;
    validate_shutdown_config(&config.shutdown)?;
    validate_locks_config(&config.locks)?;
    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::validation(
            "logging.file_path is required when logging.output is \"file\"",
        ));
    }
    Ok(())
}

fn validate_channels_config(channels: &ChannelsConfig) -> ConfigResult<()> {
    if channels.capacity == 0 {
        return Err(ConfigError::ZeroCapacity {
            label: "default".to_string(),
        });
    }

    for (label, capacity) in &channels.overrides {
        if !LABELS.contains(&label.as_str()) {
            return Err(ConfigError::UnknownChannel(label.clone()));
        }
        if *capacity == 0 {
            return Err(ConfigError::ZeroCapacity {
                label: label.clone(),
            });
        }
    }

    Ok(())
}

fn validate_shutdown_config(shutdown: &ShutdownConfig) -> ConfigResult<()> {
    if shutdown.grace_period_ms == 0 {
        return Err(ConfigError::validation(
            "shutdown.grace_period_ms must be greater than 0",
        ));
    }
    Ok(())
}

fn validate_locks_config(locks: &LocksConfig) -> ConfigResult<()> {
    if locks.prune_interval_ms == 0 {
        return Err(ConfigError::validation(
            "locks.prune_interval_ms must be greater than 0",
        ));
    }
    Ok(())
}
