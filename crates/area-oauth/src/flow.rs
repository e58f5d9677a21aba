// SPDX-FileCopyrightText: 2026 Area Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Authorization-code flow: begin, then complete against a stored state.
//!
//! The state row carries the mode (login or connect), the flow, the redirect
//! target, the PKCE verifier, and for connect the user who started it. The
//! client never chooses the mode at completion time.

use std::sync::Arc;

use area_core::{AreaError, AuthFlow, ExchangeRequest, OAuthMode, RemoteIdentity, TokenSet};
use area_registry::{ServiceDef, ServiceRegistry};
use area_storage::queries::{accounts, states, users};
use area_storage::{AccountIdentity, Database, OAuthStateRecord, ServiceAccount, User};
use area_vault::CredentialVault;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::pkce;
use crate::providers::ProviderRegistry;

/// A started authorization.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationStart {
    pub authorization_url: String,
    pub state: String,
}

/// What a completed authorization did.
#[derive(Debug, Clone)]
pub enum AuthorizationOutcome {
    /// A user signed in. `account` is set when the provider backs a catalog service.
    Login {
        user: User,
        created: bool,
        account: Option<ServiceAccount>,
    },
    Connect { account: ServiceAccount },
}

/// Parameters of an authorization callback.
#[derive(Debug, Clone)]
pub struct Callback {
    pub provider: String,
    pub code: String,
    pub state: String,
    /// Flow the client believes it used. Must agree with the state when given.
    pub flow: Option<AuthFlow>,
    /// Authenticated caller, when the callback arrives with a session.
    pub caller: Option<i64>,
}

/// Drives OAuth login and service connection.
pub struct OAuthGateway {
    db: Database,
    providers: Arc<ProviderRegistry>,
    catalog: Arc<ServiceRegistry>,
    vault: Arc<CredentialVault>,
    state_ttl: Duration,
}

impl std::fmt::Debug for OAuthGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthGateway")
            .field("providers", &self.providers)
            .field("state_ttl", &self.state_ttl)
            .finish_non_exhaustive()
    }
}

impl OAuthGateway {
    pub fn new(
        db: Database,
        providers: Arc<ProviderRegistry>,
        catalog: Arc<ServiceRegistry>,
        vault: Arc<CredentialVault>,
        state_ttl: std::time::Duration,
    ) -> Self {
        Self {
            db,
            providers,
            catalog,
            vault,
            state_ttl: Duration::from_std(state_ttl).unwrap_or_else(|_| Duration::minutes(10)),
        }
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    /// The catalog service backed by an OAuth provider, if any.
    pub fn service_for_provider(&self, provider: &str) -> Option<&ServiceDef> {
        self.catalog
            .services()
            .iter()
            .find(|s| s.oauth_provider == Some(provider))
    }

    /// Record a state and return the provider URL embedding it.
    ///
    /// With a `caller` the state is for connecting a service account, without
    /// one it is for signing in.
    pub async fn begin_authorization(
        &self,
        provider: &str,
        flow: AuthFlow,
        caller: Option<i64>,
    ) -> Result<AuthorizationStart, AreaError> {
        let target = self.providers.target(provider, flow)?;
        let mode = match caller {
            Some(_) => {
                if self.service_for_provider(provider).is_none() {
                    return Err(AreaError::NotFound(format!(
                        "No service can be connected through `{provider}`"
                    )));
                }
                OAuthMode::Connect
            }
            None => OAuthMode::Login,
        };

        let state = pkce::new_state();
        let verifier = target.flow.pkce.then(pkce::new_verifier);
        let challenge = verifier.as_deref().map(pkce::challenge);
        let authorization_url = target.url(&state, challenge.as_deref())?;

        let now = Utc::now();
        states::insert_state(
            &self.db,
            &OAuthStateRecord {
                state: state.clone(),
                provider: provider.to_string(),
                mode,
                flow,
                user_id: caller,
                redirect_uri: target.flow.redirect_uri.clone(),
                code_verifier: verifier,
                created_at: now,
                expires_at: now + self.state_ttl,
            },
        )
        .await?;
        info!(provider, %flow, %mode, "authorization started");
        Ok(AuthorizationStart {
            authorization_url,
            state,
        })
    }

    /// Redeem a state, exchange the code, and sign in or connect per the state's mode.
    pub async fn complete_authorization(&self, callback: Callback) -> Result<AuthorizationOutcome, AreaError> {
        let now = Utc::now();
        let record = states::consume_state(&self.db, &callback.state, now)
            .await?
            .filter(|r| r.provider == callback.provider)
            .ok_or(AreaError::UnknownOrExpiredState)?;

        if let Some(flow) = callback.flow
            && flow != record.flow
        {
            return Err(AreaError::RedirectMismatch(format!(
                "state was issued for the {} flow",
                record.flow
            )));
        }
        let target = self.providers.target(&record.provider, record.flow)?;
        if target.flow.redirect_uri != record.redirect_uri {
            warn!(provider = %record.provider, "redirect target changed since the state was issued");
            return Err(AreaError::RedirectMismatch("redirect target no longer matches".into()));
        }
        match (record.mode, callback.caller) {
            (OAuthMode::Connect, Some(caller)) if record.user_id != Some(caller) => {
                return Err(AreaError::Unauthorized("OAuth state was issued to another user".into()));
            }
            (OAuthMode::Login, Some(_)) => {
                return Err(AreaError::BadRequest("OAuth state was not issued for connecting a service".into()));
            }
            _ => {}
        }

        let client = self
            .providers
            .get(&record.provider)
            .ok_or_else(|| AreaError::NotFound(format!("Unknown OAuth provider `{}`", record.provider)))?;
        let tokens = client
            .exchange_code(ExchangeRequest {
                code: callback.code,
                redirect_uri: record.redirect_uri.clone(),
                code_verifier: record.code_verifier.clone(),
                flow: record.flow,
            })
            .await?;
        let identity = client.fetch_identity(&tokens.access_token).await?;

        match record.mode {
            OAuthMode::Login => {
                let (user, created) = self.find_or_create_user(&record.provider, &identity).await?;
                let account = match self.service_for_provider(&record.provider) {
                    Some(service) => Some(self.connect(user.id, service.id, &identity, &tokens, now).await?),
                    None => None,
                };
                info!(provider = %record.provider, user_id = user.id, created, "oauth login completed");
                Ok(AuthorizationOutcome::Login { user, created, account })
            }
            OAuthMode::Connect => {
                let user_id = record
                    .user_id
                    .ok_or_else(|| AreaError::InvariantViolation("connect state without a user".into()))?;
                let service = self.service_for_provider(&record.provider).ok_or_else(|| {
                    AreaError::NotFound(format!("No service can be connected through `{}`", record.provider))
                })?;
                let account = self.connect(user_id, service.id, &identity, &tokens, now).await?;
                info!(
                    provider = %record.provider,
                    user_id,
                    service_account_id = account.id,
                    "service connected"
                );
                Ok(AuthorizationOutcome::Connect { account })
            }
        }
    }

    /// Delete states past their TTL.
    pub async fn purge_expired_states(&self, now: DateTime<Utc>) -> Result<usize, AreaError> {
        states::purge_expired_states(&self.db, now).await
    }

    async fn connect(
        &self,
        user_id: i64,
        service_id: i64,
        identity: &RemoteIdentity,
        tokens: &TokenSet,
        now: DateTime<Utc>,
    ) -> Result<ServiceAccount, AreaError> {
        let account = accounts::upsert_account(
            &self.db,
            user_id,
            service_id,
            &AccountIdentity {
                remote_account_id: Some(identity.id.clone()),
                remote_email: identity.email.clone(),
                remote_name: identity.name.clone(),
                granted_scopes: tokens.scope.clone(),
            },
        )
        .await?;
        self.vault.store_tokens(account.id, tokens, now).await?;
        Ok(account)
    }

    /// Resolve the local user for a provider identity: existing link, then
    /// matching email, then a new user. The link is recorded either way.
    async fn find_or_create_user(&self, provider: &str, identity: &RemoteIdentity) -> Result<(User, bool), AreaError> {
        if let Some(user) = users::find_user_by_link(&self.db, provider, &identity.id).await? {
            return Ok((user, false));
        }
        let email = identity
            .email
            .clone()
            .unwrap_or_else(|| format!("{}@{provider}.oauth", identity.id));

        let (user, created) = match users::get_user_by_email(&self.db, &email).await? {
            Some(user) => (user, false),
            None => match users::create_user(&self.db, &email, identity.name.as_deref(), None).await {
                Ok(user) => (user, true),
                // Lost a race with a concurrent login for the same email.
                Err(AreaError::Conflict(_)) => {
                    let user = users::get_user_by_email(&self.db, &email)
                        .await?
                        .ok_or_else(|| AreaError::InvariantViolation(format!("user `{email}` vanished")))?;
                    (user, false)
                }
                Err(e) => return Err(e),
            },
        };
        users::link_oauth(&self.db, user.id, provider, &identity.id).await?;
        Ok((user, created))
    }
}
