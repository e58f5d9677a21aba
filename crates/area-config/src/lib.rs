// SPDX-FileCopyrightText: 2026 Area Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for the Area automation broker.
//!
//! TOML files with strict key checking, `AREA_*` environment overrides, and
//! miette diagnostics with typo suggestions.
//!
//! ```no_run
//! use area_config::load_and_validate;
//!
//! let config = load_and_validate().expect("config errors");
//! println!("listening on {}:{}", config.server.host, config.server.port);
//! ```

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

use std::path::Path;

pub use diagnostic::{ConfigError, render_errors};
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::{
    AreaConfig, AuthConfig, EngineConfig, FlowConfig, OAuthConfig, ProviderConfig, ServerConfig,
    StorageConfig, VaultConfig, WebhookConfig,
};

/// Load from the search path hierarchy and validate.
pub fn load_and_validate() -> Result<AreaConfig, Vec<ConfigError>> {
    match loader::load_config() {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => {
            let sources = loader::search_paths()
                .into_iter()
                .filter_map(|path| read_source(&path))
                .collect::<Vec<_>>();
            Err(diagnostic::figment_to_config_errors(err, &sources))
        }
    }
}

/// Load one explicit file (plus env overrides) and validate.
pub fn load_and_validate_path(path: &Path) -> Result<AreaConfig, Vec<ConfigError>> {
    match loader::load_config_from_path(path) {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => {
            let sources: Vec<_> = read_source(path).into_iter().collect();
            Err(diagnostic::figment_to_config_errors(err, &sources))
        }
    }
}

/// Load an inline TOML string and validate. Used by tests.
pub fn load_and_validate_str(toml_content: &str) -> Result<AreaConfig, Vec<ConfigError>> {
    match loader::load_config_from_str(toml_content) {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => {
            let sources = vec![("<inline>".to_string(), toml_content.to_string())];
            Err(diagnostic::figment_to_config_errors(err, &sources))
        }
    }
}

/// Read a config file for span reporting, keyed the way figment names it.
fn read_source(path: &Path) -> Option<(String, String)> {
    let content = std::fs::read_to_string(path).ok()?;
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().ok()?.join(path)
    };
    Some((absolute.display().to_string(), content))
}
