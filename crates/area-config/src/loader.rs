// SPDX-FileCopyrightText: 2026 Area Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered configuration loading with Figment.
//!
//! Merge order (later overrides earlier): compiled defaults,
//! `/etc/area/area.toml`, `~/.config/area/area.toml`, `./area.toml`,
//! then `AREA_*` environment variables.

#![allow(clippy::result_large_err)] // figment::Error is external

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::AreaConfig;

/// Top-level sections addressable from the environment.
const ENV_SECTIONS: &[&str] = &["server", "storage", "auth", "vault", "engine", "oauth", "webhooks"];

/// Config files searched when no explicit path is given, lowest priority first.
pub fn search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("/etc/area/area.toml")];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("area").join("area.toml"));
    }
    paths.push(PathBuf::from("area.toml"));
    paths
}

/// Build the default Figment over the search path hierarchy.
pub fn build_figment() -> Figment {
    let mut figment = Figment::new().merge(Serialized::defaults(AreaConfig::default()));
    for path in search_paths() {
        figment = figment.merge(Toml::file(path));
    }
    figment.merge(env_provider())
}

/// Load configuration from the search path hierarchy with env overrides.
pub fn load_config() -> Result<AreaConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from an inline TOML string, without env overrides.
pub fn load_config_from_str(toml_content: &str) -> Result<AreaConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(AreaConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from one explicit file, with env overrides.
pub fn load_config_from_path(path: &Path) -> Result<AreaConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(AreaConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Map `AREA_<SECTION>_<KEY>` onto `<section>.<key>`.
///
/// Only the first underscore after a known section name becomes a dot, so
/// `AREA_AUTH_JWT_SECRET` maps to `auth.jwt_secret`.
fn env_provider() -> Env {
    Env::prefixed("AREA_").map(|key| {
        let key_str = key.as_str();
        let mapped = ENV_SECTIONS
            .iter()
            .find_map(|section| {
                key_str
                    .strip_prefix(section)
                    .and_then(|rest| rest.strip_prefix('_'))
                    .map(|rest| format!("{section}.{rest}"))
            })
            .unwrap_or_else(|| key_str.to_string());
        mapped.into()
    })
}
