// SPDX-FileCopyrightText: 2026 Rescon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for container configuration.

use crate::diagnostic::ConfigError;
use crate::model::ContainerConfig;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Collects every failure instead of stopping at the first.
pub fn validate_config(config: &ContainerConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if !LOG_LEVELS.contains(&config.container.log_level.as_str()) {
        errors.push(ConfigError::validation(format!(
            "container.log_level `{}` must be one of {}",
            config.container.log_level,
            LOG_LEVELS.join(", ")
        )));
    }

    if config.dispatch.timeout_ms == 0 {
        errors.push(ConfigError::validation(
            "dispatch.timeout_ms must be greater than zero",
        ));
    }

    if config.discovery.event_buffer == 0 {
        errors.push(ConfigError::validation(
            "discovery.event_buffer must be greater than zero",
        ));
    }

    if config.discovery.update_buffer == 0 {
        errors.push(ConfigError::validation(
            "discovery.update_buffer must be greater than zero",
        ));
    }

    if config.bundles.default_interface.trim().is_empty() {
        errors.push(ConfigError::validation(
            "bundles.default_interface must not be empty",
        ));
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}
