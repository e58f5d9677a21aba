// SPDX-FileCopyrightText: 2026 Area Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation.
//!
//! Checks constraints serde cannot express. All problems are collected so the
//! operator can fix the file in one pass.

use crate::diagnostic::ConfigError;
use crate::model::{AreaConfig, FlowConfig};

const MIN_JWT_SECRET_LEN: usize = 16;

/// Validate a deserialized configuration.
pub fn validate_config(config: &AreaConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    validate_server(config, &mut errors);
    validate_secrets(config, &mut errors);
    validate_engine(config, &mut errors);
    validate_oauth(config, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_server(config: &AreaConfig, errors: &mut Vec<ConfigError>) {
    let host = config.server.host.trim();
    if host.is_empty() {
        errors.push(ConfigError::validation("server.host must not be empty"));
    } else if host.parse::<std::net::IpAddr>().is_err()
        && !host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
    {
        errors.push(ConfigError::validation(format!(
            "server.host `{host}` is not a valid IP address or hostname"
        )));
    }

    if config.server.port == 0 {
        errors.push(ConfigError::validation("server.port must not be 0"));
    }

    if !is_absolute_url(&config.server.public_url) {
        errors.push(ConfigError::validation(format!(
            "server.public_url `{}` must be an absolute http(s) URL",
            config.server.public_url
        )));
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::validation(
            "storage.database_path must not be empty",
        ));
    }
}

fn validate_secrets(config: &AreaConfig, errors: &mut Vec<ConfigError>) {
    match config.auth.jwt_secret.as_deref() {
        None => errors.push(ConfigError::MissingKey {
            key: "auth.jwt_secret".to_string(),
        }),
        Some(secret) if secret.len() < MIN_JWT_SECRET_LEN => {
            errors.push(ConfigError::validation(format!(
                "auth.jwt_secret must be at least {MIN_JWT_SECRET_LEN} characters"
            )));
        }
        Some(_) => {}
    }

    if config.auth.session_ttl_secs == 0 {
        errors.push(ConfigError::validation(
            "auth.session_ttl_secs must be greater than 0",
        ));
    }

    if config
        .auth
        .admin_token
        .as_deref()
        .is_some_and(|t| t.trim().is_empty())
    {
        errors.push(ConfigError::validation(
            "auth.admin_token must not be empty when set",
        ));
    }

    if config
        .webhooks
        .github_secret
        .as_deref()
        .is_some_and(|s| s.trim().is_empty())
    {
        errors.push(ConfigError::validation(
            "webhooks.github_secret must not be empty when set",
        ));
    }

    match config.vault.passphrase.as_deref() {
        None => errors.push(ConfigError::MissingKey {
            key: "vault.passphrase".to_string(),
        }),
        Some(p) if p.is_empty() => {
            errors.push(ConfigError::validation("vault.passphrase must not be empty"));
        }
        Some(_) => {}
    }

    if config.vault.kdf_memory_cost < 32_768 {
        errors.push(ConfigError::validation(format!(
            "vault.kdf_memory_cost must be at least 32768 (32 MiB), got {}",
            config.vault.kdf_memory_cost
        )));
    }
    if config.vault.kdf_iterations < 2 {
        errors.push(ConfigError::validation(format!(
            "vault.kdf_iterations must be at least 2, got {}",
            config.vault.kdf_iterations
        )));
    }
    if config.vault.kdf_parallelism < 1 {
        errors.push(ConfigError::validation(
            "vault.kdf_parallelism must be at least 1",
        ));
    }
}

fn validate_engine(config: &AreaConfig, errors: &mut Vec<ConfigError>) {
    let engine = &config.engine;

    for (name, value) in [
        ("engine.tick_secs", engine.tick_secs),
        ("engine.provider_timeout_secs", engine.provider_timeout_secs),
        ("engine.backoff_base_secs", engine.backoff_base_secs),
    ] {
        if value == 0 {
            errors.push(ConfigError::validation(format!(
                "{name} must be greater than 0"
            )));
        }
    }

    if engine.workers == 0 {
        errors.push(ConfigError::validation("engine.workers must be at least 1"));
    }
    if engine.queue_capacity == 0 {
        errors.push(ConfigError::validation(
            "engine.queue_capacity must be at least 1",
        ));
    }
    if engine.failure_threshold == 0 {
        errors.push(ConfigError::validation(
            "engine.failure_threshold must be at least 1",
        ));
    }
    if engine.max_delivery_attempts == 0 {
        errors.push(ConfigError::validation(
            "engine.max_delivery_attempts must be at least 1",
        ));
    }
    if engine.lease_ttl_secs <= engine.provider_timeout_secs {
        errors.push(ConfigError::validation(format!(
            "engine.lease_ttl_secs ({}) must exceed engine.provider_timeout_secs ({})",
            engine.lease_ttl_secs, engine.provider_timeout_secs
        )));
    }
    if engine.backoff_max_secs < engine.backoff_base_secs {
        errors.push(ConfigError::validation(
            "engine.backoff_max_secs must be at least engine.backoff_base_secs",
        ));
    }
    if engine.refresh_batch_size == 0 {
        errors.push(ConfigError::validation(
            "engine.refresh_batch_size must be at least 1",
        ));
    }
}

fn validate_oauth(config: &AreaConfig, errors: &mut Vec<ConfigError>) {
    if config.oauth.state_ttl_secs == 0 {
        errors.push(ConfigError::validation(
            "oauth.state_ttl_secs must be greater than 0",
        ));
    }

    for (key, provider) in &config.oauth.providers {
        let prefix = format!("oauth.providers.{key}");
        if provider.display_name.trim().is_empty() {
            errors.push(ConfigError::validation(format!(
                "{prefix}.display_name must not be empty"
            )));
        }
        for (field, url) in [
            ("auth_url", Some(&provider.auth_url)),
            ("token_url", Some(&provider.token_url)),
            ("userinfo_url", provider.userinfo_url.as_ref()),
        ] {
            if let Some(url) = url
                && !is_absolute_url(url)
            {
                errors.push(ConfigError::validation(format!(
                    "{prefix}.{field} `{url}` must be an absolute http(s) URL"
                )));
            }
        }
        if let Some(web) = &provider.web {
            validate_flow(&format!("{prefix}.web"), web, errors);
        }
        if let Some(mobile) = &provider.mobile {
            validate_flow(&format!("{prefix}.mobile"), mobile, errors);
        }
    }
}

fn validate_flow(prefix: &str, flow: &FlowConfig, errors: &mut Vec<ConfigError>) {
    if flow.client_id.trim().is_empty() {
        errors.push(ConfigError::validation(format!(
            "{prefix}.client_id must not be empty"
        )));
    }
    // Mobile apps use custom schemes (area://callback); require a scheme only.
    if !flow.redirect_uri.contains("://") {
        errors.push(ConfigError::validation(format!(
            "{prefix}.redirect_uri `{}` must be an absolute URI",
            flow.redirect_uri
        )));
    }
}

fn is_absolute_url(url: &str) -> bool {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"));
    rest.is_some_and(|r| !r.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> AreaConfig {
        let mut config = AreaConfig::default();
        config.auth.jwt_secret = Some("0123456789abcdef0123".into());
        config.vault.passphrase = Some("passphrase".into());
        config
    }

    #[test]
    fn defaults_with_secrets_pass() {
        assert!(validate_config(&valid()).is_ok());
    }

    #[test]
    fn missing_secrets_are_reported_together() {
        let errors = validate_config(&AreaConfig::default()).unwrap_err();
        let keys: Vec<String> = errors
            .iter()
            .filter_map(|e| match e {
                ConfigError::MissingKey { key } => Some(key.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(keys, vec!["auth.jwt_secret", "vault.passphrase"]);
    }

    #[test]
    fn blank_optional_secrets_are_rejected() {
        let mut config = valid();
        config.auth.admin_token = Some(" ".into());
        config.webhooks.github_secret = Some(String::new());
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().any(|e| e.to_string().contains("webhooks.github_secret")));
    }

    #[test]
    fn lease_must_outlive_provider_timeout() {
        let mut config = valid();
        config.engine.lease_ttl_secs = 10;
        config.engine.provider_timeout_secs = 10;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.to_string().contains("lease_ttl_secs")));
    }

    #[test]
    fn relative_urls_are_rejected() {
        assert!(is_absolute_url("https://github.com/login/oauth/authorize"));
        assert!(!is_absolute_url("/login/oauth/authorize"));
        assert!(!is_absolute_url("https://"));
    }
}
