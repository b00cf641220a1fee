// SPDX-FileCopyrightText: 2026 Docket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./docket.toml` > `~/.config/docket/docket.toml` > `/etc/docket/docket.toml`
//! with environment variable overrides via `DOCKET_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::DocketConfig;

/// Top-level sections recognized in `DOCKET_*` variable names.
const SECTIONS: &[&str] = &[
    "circuit_breaker",
    "rate_limit",
    "transaction",
    "prometheus",
    "rollback",
    "storage",
    "queue",
    "retry",
    "bot",
];

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/docket/docket.toml` (system-wide)
/// 3. `~/.config/docket/docket.toml` (user XDG config)
/// 4. `./docket.toml` (local directory)
/// 5. `DOCKET_*` environment variables
pub fn load_config() -> Result<DocketConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<DocketConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(DocketConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<DocketConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(DocketConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Config file locations, lowest precedence first.
pub fn config_file_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("/etc/docket/docket.toml")];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("docket").join("docket.toml"));
    }
    let local = std::env::current_dir()
        .map(|d| d.join("docket.toml"))
        .unwrap_or_else(|_| PathBuf::from("docket.toml"));
    paths.push(local);
    paths
}

/// Build the Figment used internally for config loading (exposed for diagnostic use).
pub fn build_figment() -> Figment {
    config_file_paths()
        .into_iter()
        .fold(
            Figment::new().merge(Serialized::defaults(DocketConfig::default())),
            |figment, path| figment.merge(Toml::file(path)),
        )
        .merge(env_provider())
}

/// Create the environment variable provider using explicit `map()` for section-to-dot mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` because both section and key
/// names contain underscores: `DOCKET_RATE_LIMIT_MAX_ACTIONS` must map to
/// `rate_limit.max_actions`, not `rate.limit.max.actions`.
fn env_provider() -> Env {
    Env::prefixed("DOCKET_").map(|key| map_env_key(key.as_str()).into())
}

/// Map a lowercased, prefix-stripped env key to its dotted config path.
pub fn map_env_key(key: &str) -> String {
    for section in SECTIONS {
        if let Some(rest) = key.strip_prefix(section) {
            if let Some(field) = rest.strip_prefix('_') {
                return format!("{section}.{field}");
            }
        }
    }
    key.to_string()
}
