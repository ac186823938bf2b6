// SPDX-FileCopyrightText: 2026 Rescon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the rescon container.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup.

use std::path::PathBuf;
use std::time::Duration;

use rescon_core::BASELINE_INTERFACE;
use serde::{Deserialize, Serialize};

/// Top-level container configuration.
///
/// Loaded from TOML files following the XDG hierarchy, with environment
/// variable overrides. All sections default to sensible values.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ContainerConfig {
    /// Process-level settings.
    #[serde(default)]
    pub container: HostConfig,

    /// Request dispatch settings.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Soft-sensor discovery settings.
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Defaults applied to bundle-created resources.
    #[serde(default)]
    pub bundles: BundlesConfig,
}

/// `[container]` section.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HostConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Bundle descriptor file read by `start` when no path is given.
    #[serde(default)]
    pub descriptor_path: Option<PathBuf>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            descriptor_path: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// `[dispatch]` section.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DispatchConfig {
    /// Wall-clock budget for a single GET or SET, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl DispatchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    10_000
}

/// `[discovery]` section.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DiscoveryConfig {
    /// Capacity of the registry event channel shared by all bindings.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// Pending forwarded updates queued per output resource.
    #[serde(default = "default_update_buffer")]
    pub update_buffer: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            event_buffer: default_event_buffer(),
            update_buffer: default_update_buffer(),
        }
    }
}

fn default_event_buffer() -> usize {
    256
}

fn default_update_buffer() -> usize {
    32
}

/// `[bundles]` section.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BundlesConfig {
    /// Interface given to resources that do not declare one.
    #[serde(default = "default_interface")]
    pub default_interface: String,
}

impl Default for BundlesConfig {
    fn default() -> Self {
        Self {
            default_interface: default_interface(),
        }
    }
}

fn default_interface() -> String {
    BASELINE_INTERFACE.to_string()
}
