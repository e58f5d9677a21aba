// SPDX-FileCopyrightText: 2026 Area Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configured OAuth providers and their public descriptors.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use area_config::{FlowConfig, OAuthConfig, ProviderConfig};
use area_core::{AreaError, AuthFlow, OAuthProvider};
use serde::Serialize;

use crate::client::HttpOAuthProvider;

/// Provider entry as shown to frontends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderDescriptor {
    pub id: String,
    pub name: String,
    pub icon: Option<String>,
    pub color: Option<String>,
    /// The requested flow has a client configured.
    pub available: bool,
    pub flows: FlowAvailability,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FlowAvailability {
    pub web: bool,
    pub mobile: bool,
}

/// Flow configuration safe to hand to a client: no secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicFlowConfig {
    pub provider: String,
    pub flow: AuthFlow,
    pub client_id: String,
    pub redirect_uri: String,
    pub auth_url: String,
    pub scopes: Vec<String>,
    pub pkce: bool,
}

/// Everything needed to build an authorization URL.
#[derive(Debug, Clone)]
pub struct AuthorizationTarget<'a> {
    pub auth_url: &'a str,
    pub flow: &'a FlowConfig,
}

struct Entry {
    config: ProviderConfig,
    client: Arc<dyn OAuthProvider>,
}

/// Immutable registry of OAuth providers, keyed by provider id.
pub struct ProviderRegistry {
    entries: BTreeMap<String, Entry>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn flow_of(config: &ProviderConfig, flow: AuthFlow) -> Option<&FlowConfig> {
    match flow {
        AuthFlow::Web => config.web.as_ref(),
        AuthFlow::Mobile => config.mobile.as_ref(),
    }
}

fn configured(flow: Option<&FlowConfig>) -> bool {
    flow.is_some_and(|f| !f.client_id.is_empty())
}

impl ProviderRegistry {
    /// Build HTTP clients for every configured provider.
    pub fn from_config(config: &OAuthConfig, timeout: Duration) -> Result<Self, AreaError> {
        let mut entries = BTreeMap::new();
        for (key, provider) in &config.providers {
            let client = HttpOAuthProvider::new(key, provider.clone(), timeout)?;
            entries.insert(
                key.clone(),
                Entry {
                    config: provider.clone(),
                    client: Arc::new(client),
                },
            );
        }
        Ok(Self { entries })
    }

    /// Replace the client behind a provider while keeping its configuration.
    pub fn with_client(mut self, key: &str, config: ProviderConfig, client: Arc<dyn OAuthProvider>) -> Self {
        self.entries.insert(key.to_string(), Entry { config, client });
        self
    }

    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<Arc<dyn OAuthProvider>> {
        self.entries.get(key).map(|e| e.client.clone())
    }

    /// Provider clients keyed by provider id, as the vault consumes them.
    pub fn clients(&self) -> HashMap<String, Arc<dyn OAuthProvider>> {
        self.entries
            .iter()
            .map(|(k, e)| (k.clone(), e.client.clone()))
            .collect()
    }

    /// Descriptors of every provider; `available` reflects `flow`.
    pub fn list_providers(&self, flow: AuthFlow) -> Vec<ProviderDescriptor> {
        self.entries
            .iter()
            .map(|(key, entry)| {
                let flows = FlowAvailability {
                    web: configured(entry.config.web.as_ref()),
                    mobile: configured(entry.config.mobile.as_ref()),
                };
                ProviderDescriptor {
                    id: key.clone(),
                    name: entry.config.display_name.clone(),
                    icon: entry.config.icon.clone(),
                    color: entry.config.color.clone(),
                    available: match flow {
                        AuthFlow::Web => flows.web,
                        AuthFlow::Mobile => flows.mobile,
                    },
                    flows,
                }
            })
            .collect()
    }

    /// Configuration of one flow, or `NotFound` when either is unknown.
    pub fn target(&self, key: &str, flow: AuthFlow) -> Result<AuthorizationTarget<'_>, AreaError> {
        let entry = self
            .entries
            .get(key)
            .ok_or_else(|| AreaError::NotFound(format!("Unknown OAuth provider `{key}`")))?;
        let flow_config = flow_of(&entry.config, flow)
            .filter(|f| !f.client_id.is_empty())
            .ok_or_else(|| AreaError::NotFound(format!("Provider `{key}` does not support the {flow} flow")))?;
        Ok(AuthorizationTarget {
            auth_url: &entry.config.auth_url,
            flow: flow_config,
        })
    }

    pub fn public_config(&self, key: &str, flow: AuthFlow) -> Result<PublicFlowConfig, AreaError> {
        let target = self.target(key, flow)?;
        Ok(PublicFlowConfig {
            provider: key.to_string(),
            flow,
            client_id: target.flow.client_id.clone(),
            redirect_uri: target.flow.redirect_uri.clone(),
            auth_url: target.auth_url.to_string(),
            scopes: target.flow.scopes.clone(),
            pkce: target.flow.pkce,
        })
    }
}

impl AuthorizationTarget<'_> {
    /// Provider authorization URL embedding `state` and, for PKCE flows, the challenge.
    pub fn url(&self, state: &str, code_challenge: Option<&str>) -> Result<String, AreaError> {
        let scope = self.flow.scopes.join(" ");
        let mut query = vec![
            ("client_id", self.flow.client_id.as_str()),
            ("redirect_uri", self.flow.redirect_uri.as_str()),
            ("response_type", "code"),
            ("scope", scope.as_str()),
            ("state", state),
        ];
        if let Some(challenge) = code_challenge {
            query.push(("code_challenge", challenge));
            query.push(("code_challenge_method", "S256"));
        }
        reqwest::Url::parse_with_params(self.auth_url, &query)
            .map(String::from)
            .map_err(|e| AreaError::Config(format!("invalid auth_url `{}`: {e}", self.auth_url)))
    }
}
