// SPDX-FileCopyrightText: 2026 Rescon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./rescon.toml` > `~/.config/rescon/rescon.toml` > `/etc/rescon/rescon.toml`
//! with environment variable overrides via the `RESCON_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::ContainerConfig;

pub(crate) const SYSTEM_CONFIG: &str = "/etc/rescon/rescon.toml";
pub(crate) const LOCAL_CONFIG: &str = "rescon.toml";

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/rescon/rescon.toml`
/// 3. `~/.config/rescon/rescon.toml`
/// 4. `./rescon.toml`
/// 5. `RESCON_*` environment variables
pub fn load_config() -> Result<ContainerConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no file lookup, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<ContainerConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ContainerConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<ContainerConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ContainerConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used for config loading, before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(ContainerConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("rescon/rescon.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file(LOCAL_CONFIG))
        .merge(env_provider())
}

/// Environment provider with explicit section mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` so keys that contain
/// underscores survive: `RESCON_DISPATCH_TIMEOUT_MS` maps to
/// `dispatch.timeout_ms`, not `dispatch.timeout.ms`.
fn env_provider() -> Env {
    Env::prefixed("RESCON_").map(|key| map_env_key(key.as_str()).into())
}

/// Map a lowercased, prefix-stripped env var name to its dotted config path.
pub(crate) fn map_env_key(key: &str) -> String {
    const SECTIONS: [&str; 4] = ["container", "dispatch", "discovery", "bundles"];
    for section in SECTIONS {
        if let Some(rest) = key.strip_prefix(section).and_then(|r| r.strip_prefix('_')) {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}
