// SPDX-FileCopyrightText: 2026 Area Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Area automation broker.
//!
//! All structs use `#[serde(deny_unknown_fields)]` so a typo in `area.toml`
//! fails at startup instead of silently falling back to a default.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Top-level broker configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AreaConfig {
    /// HTTP listener and logging.
    #[serde(default)]
    pub server: ServerConfig,

    /// SQLite location.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Session tokens and admin access.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Token vault encryption.
    #[serde(default)]
    pub vault: VaultConfig,

    /// Automation engine scheduling and retry policy.
    #[serde(default)]
    pub engine: EngineConfig,

    /// OAuth providers and state lifetime.
    #[serde(default)]
    pub oauth: OAuthConfig,

    /// Provider push notifications.
    #[serde(default)]
    pub webhooks: WebhookConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Listen address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Listen port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Externally reachable base URL, reported by `/about.json`.
    #[serde(default = "default_public_url")]
    pub public_url: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: default_public_url(),
            log_level: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_public_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_local_dir()
        .map(|d| d.join("area").join("area.db").display().to_string())
        .unwrap_or_else(|| "area.db".to_string())
}

/// Session and administrative authentication.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// HMAC secret for session JWTs. Required to serve.
    #[serde(default)]
    pub jwt_secret: Option<String>,

    /// Session token lifetime.
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,

    /// Static bearer token for `/admin` routes. `None` disables them.
    #[serde(default)]
    pub admin_token: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            session_ttl_secs: default_session_ttl_secs(),
            admin_token: None,
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &self.jwt_secret.as_ref().map(|_| "[redacted]"))
            .field("session_ttl_secs", &self.session_ttl_secs)
            .field("admin_token", &self.admin_token.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

fn default_session_ttl_secs() -> u64 {
    86_400
}

/// Credential vault configuration.
///
/// Argon2id parameters follow OWASP guidance; the passphrase wraps the
/// randomly generated master key that seals every stored token.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct VaultConfig {
    /// Passphrase protecting the master key. Required to serve.
    #[serde(default)]
    pub passphrase: Option<String>,

    /// Argon2id memory cost in KiB.
    #[serde(default = "default_kdf_memory_cost")]
    pub kdf_memory_cost: u32,

    #[serde(default = "default_kdf_iterations")]
    pub kdf_iterations: u32,

    #[serde(default = "default_kdf_parallelism")]
    pub kdf_parallelism: u32,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            passphrase: None,
            kdf_memory_cost: default_kdf_memory_cost(),
            kdf_iterations: default_kdf_iterations(),
            kdf_parallelism: default_kdf_parallelism(),
        }
    }
}

impl std::fmt::Debug for VaultConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultConfig")
            .field("passphrase", &self.passphrase.as_ref().map(|_| "[redacted]"))
            .field("kdf_memory_cost", &self.kdf_memory_cost)
            .field("kdf_iterations", &self.kdf_iterations)
            .field("kdf_parallelism", &self.kdf_parallelism)
            .finish()
    }
}

fn default_kdf_memory_cost() -> u32 {
    65_536
}

fn default_kdf_iterations() -> u32 {
    3
}

fn default_kdf_parallelism() -> u32 {
    4
}

/// Automation engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Seconds between scheduler sweeps.
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,

    /// Concurrent evaluation workers.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Capacity of the due-queue. Areas beyond it are deferred to the next tick.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Consecutive failures before an Area is suspended.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Per-Area lease lifetime. Must exceed `provider_timeout_secs`.
    #[serde(default = "default_lease_ttl_secs")]
    pub lease_ttl_secs: u64,

    /// Bound on every outbound provider call.
    #[serde(default = "default_provider_timeout_secs")]
    pub provider_timeout_secs: u64,

    /// Floor for the interval between evaluations of one Area.
    #[serde(default = "default_min_interval_secs")]
    pub min_interval_secs: u64,

    /// Attempts per reaction delivery before it is marked failed.
    #[serde(default = "default_max_delivery_attempts")]
    pub max_delivery_attempts: u32,

    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: u64,

    #[serde(default = "default_backoff_max_secs")]
    pub backoff_max_secs: u64,

    /// Tokens expiring within this window are refreshed by the background sweep.
    #[serde(default = "default_refresh_lookahead_secs")]
    pub refresh_lookahead_secs: u64,

    /// Upper bound on accounts refreshed per sweep.
    #[serde(default = "default_refresh_batch_size")]
    pub refresh_batch_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_tick_secs(),
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            failure_threshold: default_failure_threshold(),
            lease_ttl_secs: default_lease_ttl_secs(),
            provider_timeout_secs: default_provider_timeout_secs(),
            min_interval_secs: default_min_interval_secs(),
            max_delivery_attempts: default_max_delivery_attempts(),
            backoff_base_secs: default_backoff_base_secs(),
            backoff_max_secs: default_backoff_max_secs(),
            refresh_lookahead_secs: default_refresh_lookahead_secs(),
            refresh_batch_size: default_refresh_batch_size(),
        }
    }
}

fn default_tick_secs() -> u64 {
    60
}

fn default_workers() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    256
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_lease_ttl_secs() -> u64 {
    120
}

fn default_provider_timeout_secs() -> u64 {
    15
}

fn default_min_interval_secs() -> u64 {
    60
}

fn default_max_delivery_attempts() -> u32 {
    5
}

fn default_backoff_base_secs() -> u64 {
    30
}

fn default_backoff_max_secs() -> u64 {
    3600
}

fn default_refresh_lookahead_secs() -> u64 {
    300
}

fn default_refresh_batch_size() -> usize {
    100
}

/// OAuth configuration: state lifetime plus the provider table.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OAuthConfig {
    /// Lifetime of a pending authorization request.
    #[serde(default = "default_state_ttl_secs")]
    pub state_ttl_secs: u64,

    /// Providers keyed by provider id (`[oauth.providers.github]`).
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            state_ttl_secs: default_state_ttl_secs(),
            providers: BTreeMap::new(),
        }
    }
}

fn default_state_ttl_secs() -> u64 {
    600
}

/// Inbound provider webhooks.
#[derive(Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WebhookConfig {
    /// Shared secret GitHub signs deliveries with. `None` disables
    /// `POST /webhooks/github`.
    #[serde(default)]
    pub github_secret: Option<String>,
}

impl std::fmt::Debug for WebhookConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookConfig")
            .field("github_secret", &self.github_secret.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

/// One OAuth2 provider.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Name shown to users and in error details.
    pub display_name: String,

    /// Icon URL listed by `/services`.
    #[serde(default)]
    pub icon: Option<String>,

    /// Brand color listed by `/services`.
    #[serde(default)]
    pub color: Option<String>,

    /// Authorization endpoint users are redirected to.
    pub auth_url: String,

    /// Code exchange and refresh endpoint.
    pub token_url: String,

    /// Endpoint returning the account identity. Required for login flows.
    #[serde(default)]
    pub userinfo_url: Option<String>,

    /// Browser flow registration.
    #[serde(default)]
    pub web: Option<FlowConfig>,

    /// Native app flow registration.
    #[serde(default)]
    pub mobile: Option<FlowConfig>,
}

/// Client registration for one flow (web or mobile) of a provider.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FlowConfig {
    pub client_id: String,

    /// Mobile clients are usually public and carry no secret.
    #[serde(default)]
    pub client_secret: Option<String>,

    pub redirect_uri: String,

    #[serde(default)]
    pub scopes: Vec<String>,

    /// Use PKCE (S256) for this flow.
    #[serde(default)]
    pub pkce: bool,
}

impl std::fmt::Debug for FlowConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowConfig")
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[redacted]"),
            )
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .field("pkce", &self.pkce)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = AreaConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.engine.tick_secs, 60);
        assert_eq!(config.engine.failure_threshold, 5);
        assert_eq!(config.oauth.state_ttl_secs, 600);
        assert!(config.oauth.providers.is_empty());
    }

    #[test]
    fn secret_fields_are_redacted_in_debug() {
        let auth = AuthConfig {
            jwt_secret: Some("super-secret-signing-key".into()),
            ..Default::default()
        };
        let vault = VaultConfig {
            passphrase: Some("correct horse".into()),
            ..Default::default()
        };
        assert!(!format!("{auth:?}").contains("super-secret"));
        assert!(!format!("{vault:?}").contains("correct horse"));
    }
}
