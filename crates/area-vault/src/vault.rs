// SPDX-FileCopyrightText: 2026 Area Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Token lifecycle per service account: store, classify, refresh.
//!
//! Refreshes are serialized per account. Callers that arrive while a refresh
//! is in flight wait for it and then reuse the token it stored, so a rotating
//! refresh token is presented to the provider exactly once.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use area_config::EngineConfig;
use area_core::{AreaError, OAuthProvider, TokenSet, TokenState};
use area_storage::queries::{accounts, credentials, services};
use area_storage::{CredentialRecord, Database, ServiceAccount};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use secrecy::SecretString;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::keyring::MasterKey;

/// Timing knobs for token handling.
#[derive(Debug, Clone, Copy)]
pub struct VaultSettings {
    /// Tokens with less remaining validity than this are refreshed before use.
    pub refresh_margin: Duration,
    /// Window used by the proactive sweep and the `Expiring` state.
    pub lookahead: Duration,
    /// Upper bound on accounts refreshed per sweep.
    pub batch_size: usize,
    /// Bound on each provider call.
    pub provider_timeout: Duration,
}

impl Default for VaultSettings {
    fn default() -> Self {
        Self {
            refresh_margin: Duration::from_secs(60),
            lookahead: Duration::from_secs(300),
            batch_size: 100,
            provider_timeout: Duration::from_secs(15),
        }
    }
}

impl From<&EngineConfig> for VaultSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            lookahead: Duration::from_secs(config.refresh_lookahead_secs),
            batch_size: config.refresh_batch_size.max(1),
            provider_timeout: Duration::from_secs(config.provider_timeout_secs),
            ..Self::default()
        }
    }
}

/// Outcome of a proactive refresh sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RefreshStats {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
}

/// Decrypted view of a credential row.
struct OpenedCredential {
    access: String,
    refresh: Option<String>,
    token_type: Option<String>,
    expires_at: Option<DateTime<Utc>>,
}

/// Sealed token storage with transparent refresh.
pub struct CredentialVault {
    db: Database,
    key: MasterKey,
    providers: HashMap<String, Arc<dyn OAuthProvider>>,
    refresh_locks: DashMap<i64, Arc<Mutex<()>>>,
    settings: VaultSettings,
}

impl std::fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialVault")
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

fn chrono_duration(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::days(36_500))
}

fn aad(kind: &str, account_id: i64) -> Vec<u8> {
    format!("{kind}:{account_id}").into_bytes()
}

impl CredentialVault {
    pub fn new(
        db: Database,
        key: MasterKey,
        providers: HashMap<String, Arc<dyn OAuthProvider>>,
        settings: VaultSettings,
    ) -> Self {
        Self {
            db,
            key,
            providers,
            refresh_locks: DashMap::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &VaultSettings {
        &self.settings
    }

    /// Seal and upsert the tokens of an account, and mark it used.
    ///
    /// Storing the same tokens twice leaves the same observable state.
    pub async fn store_tokens(
        &self,
        account_id: i64,
        tokens: &TokenSet,
        now: DateTime<Utc>,
    ) -> Result<(), AreaError> {
        let access = self.key.seal(&aad("access", account_id), tokens.access_token.as_bytes())?;
        let refresh = tokens
            .refresh_token
            .as_deref()
            .map(|token| self.key.seal(&aad("refresh", account_id), token.as_bytes()))
            .transpose()?;

        let record = CredentialRecord {
            service_account_id: account_id,
            access_ciphertext: access.ciphertext,
            access_nonce: access.nonce.to_vec(),
            refresh_nonce: refresh.as_ref().map(|s| s.nonce.to_vec()),
            refresh_ciphertext: refresh.map(|s| s.ciphertext),
            token_type: tokens.token_type.clone(),
            expires_at: tokens.expires_at(now),
        };
        credentials::upsert_credential(&self.db, &record).await?;
        accounts::touch_account(&self.db, account_id, now).await?;
        debug!(service_account_id = account_id, "tokens stored");
        Ok(())
    }

    /// Classify the stored token of an account at `now`.
    pub async fn token_state(&self, account_id: i64, now: DateTime<Utc>) -> Result<TokenState, AreaError> {
        let account = self.account(account_id).await?;
        if !account.is_active {
            return Ok(TokenState::ExpiredTerminal);
        }
        let Some(record) = credentials::get_credential(&self.db, account_id).await? else {
            return Ok(TokenState::ExpiredTerminal);
        };
        Ok(self.classify(&record, now))
    }

    fn classify(&self, record: &CredentialRecord, now: DateTime<Utc>) -> TokenState {
        let Some(expires_at) = record.expires_at else {
            return TokenState::Valid;
        };
        if expires_at > now + chrono_duration(self.settings.lookahead) {
            TokenState::Valid
        } else if expires_at > now + chrono_duration(self.settings.refresh_margin) {
            TokenState::Expiring
        } else if record.refresh_ciphertext.is_some() {
            TokenState::ExpiredRefreshable
        } else {
            TokenState::ExpiredTerminal
        }
    }

    /// A currently valid access token, refreshed first if it is inside the
    /// safety margin.
    pub async fn get_valid_token(&self, account_id: i64) -> Result<SecretString, AreaError> {
        self.get_valid_token_at(account_id, Utc::now()).await
    }

    /// [`CredentialVault::get_valid_token`] with an explicit clock.
    pub async fn get_valid_token_at(
        &self,
        account_id: i64,
        now: DateTime<Utc>,
    ) -> Result<SecretString, AreaError> {
        let account = self.active_account(account_id).await?;
        if let Some(token) = self.usable_token(account_id, now).await? {
            return Ok(token);
        }

        let lock = self.lock_for(account_id);
        let _guard = lock.lock().await;

        // Another caller may have refreshed while we waited.
        if let Some(token) = self.usable_token(account_id, now).await? {
            debug!(service_account_id = account_id, "reusing token refreshed by another caller");
            return Ok(token);
        }
        let access = self.refresh_locked(&account, now).await?;
        Ok(SecretString::from(access))
    }

    /// Force a refresh regardless of the stored expiry.
    pub async fn refresh_account(&self, account_id: i64, now: DateTime<Utc>) -> Result<(), AreaError> {
        let account = self.active_account(account_id).await?;
        let lock = self.lock_for(account_id);
        let _guard = lock.lock().await;
        self.refresh_locked(&account, now).await.map(|_| ())
    }

    /// Refresh every active account whose token expires within the lookahead.
    ///
    /// Failures are counted and logged; they never stop the batch.
    pub async fn batch_refresh_expired(&self, now: DateTime<Utc>) -> Result<RefreshStats, AreaError> {
        let horizon = now + chrono_duration(self.settings.lookahead);
        let due = credentials::list_expiring(&self.db, horizon, self.settings.batch_size).await?;

        let mut stats = RefreshStats {
            total: due.len(),
            ..Default::default()
        };
        for account_id in due {
            match self.refresh_account(account_id, now).await {
                Ok(()) => stats.success += 1,
                Err(e) => {
                    stats.failed += 1;
                    warn!(service_account_id = account_id, error = %e, "proactive refresh failed");
                }
            }
        }
        if stats.total > 0 {
            info!(total = stats.total, success = stats.success, failed = stats.failed, "token refresh sweep finished");
        }
        Ok(stats)
    }

    /// Mark an account unusable until the user reconnects.
    pub async fn deactivate(&self, account_id: i64, reason: &str) -> Result<(), AreaError> {
        accounts::deactivate_account(&self.db, account_id, reason).await?;
        warn!(service_account_id = account_id, reason, "service account deactivated");
        Ok(())
    }

    async fn account(&self, account_id: i64) -> Result<ServiceAccount, AreaError> {
        accounts::get_account(&self.db, account_id)
            .await?
            .ok_or_else(|| AreaError::NotFound("Service account not found".to_string()))
    }

    async fn active_account(&self, account_id: i64) -> Result<ServiceAccount, AreaError> {
        let account = self.account(account_id).await?;
        if account.is_active {
            Ok(account)
        } else {
            Err(AreaError::ServiceAccountNotConnected {
                service: self.service_name(account.service_id).await,
            })
        }
    }

    async fn service_name(&self, service_id: i64) -> String {
        match services::get_service(&self.db, service_id).await {
            Ok(Some(service)) => service.name,
            _ => format!("service {service_id}"),
        }
    }

    fn lock_for(&self, account_id: i64) -> Arc<Mutex<()>> {
        self.refresh_locks.entry(account_id).or_default().clone()
    }

    /// The stored access token if it stays valid past the safety margin.
    async fn usable_token(&self, account_id: i64, now: DateTime<Utc>) -> Result<Option<SecretString>, AreaError> {
        let Some(record) = credentials::get_credential(&self.db, account_id).await? else {
            return Err(AreaError::TokenExpiredNoRefresh);
        };
        match self.classify(&record, now) {
            TokenState::Valid | TokenState::Expiring => {
                let opened = self.open(&record)?;
                Ok(Some(SecretString::from(opened.access)))
            }
            TokenState::ExpiredRefreshable | TokenState::ExpiredTerminal => Ok(None),
        }
    }

    fn open(&self, record: &CredentialRecord) -> Result<OpenedCredential, AreaError> {
        let id = record.service_account_id;
        let access = self.key.open(&aad("access", id), &record.access_nonce, &record.access_ciphertext)?;
        let refresh = match (&record.refresh_ciphertext, &record.refresh_nonce) {
            (Some(ciphertext), Some(nonce)) => Some(self.key.open(&aad("refresh", id), nonce, ciphertext)?),
            _ => None,
        };
        let utf8 = |bytes: &[u8]| {
            String::from_utf8(bytes.to_vec())
                .map_err(|_| AreaError::Vault("stored token is not UTF-8".to_string()))
        };
        Ok(OpenedCredential {
            access: utf8(&access)?,
            refresh: refresh.as_deref().map(|b| utf8(b)).transpose()?,
            token_type: record.token_type.clone(),
            expires_at: record.expires_at,
        })
    }

    /// Refresh with the account's refresh lock held. Returns the new access token.
    async fn refresh_locked(&self, account: &ServiceAccount, now: DateTime<Utc>) -> Result<String, AreaError> {
        let account_id = account.id;
        let record = credentials::get_credential(&self.db, account_id)
            .await?
            .ok_or(AreaError::TokenExpiredNoRefresh)?;
        let current = self.open(&record)?;

        let Some(refresh_token) = current.refresh.clone() else {
            let expired = current.expires_at.is_some_and(|at| at <= now);
            if expired {
                self.deactivate(account_id, "access token expired and no refresh token is stored")
                    .await?;
            }
            return Err(AreaError::TokenExpiredNoRefresh);
        };

        let provider = self.provider_for(account).await?;
        let timeout = self.settings.provider_timeout;
        let refreshed = match tokio::time::timeout(timeout, provider.refresh_token(&refresh_token)).await {
            Ok(result) => result,
            Err(_) => Err(AreaError::Timeout { duration: timeout }),
        };

        match refreshed {
            Ok(mut tokens) => {
                if tokens.refresh_token.is_none() {
                    tokens.refresh_token = Some(refresh_token);
                }
                if tokens.token_type.is_none() {
                    tokens.token_type = current.token_type;
                }
                self.store_tokens(account_id, &tokens, now).await?;
                info!(service_account_id = account_id, provider = provider.key(), "access token refreshed");
                Ok(tokens.access_token)
            }
            Err(e) if e.is_terminal() => {
                self.deactivate(account_id, &e.to_string()).await?;
                Err(e)
            }
            Err(e) => {
                accounts::record_account_error(&self.db, account_id, &e.to_string()).await?;
                Err(e)
            }
        }
    }

    async fn provider_for(&self, account: &ServiceAccount) -> Result<Arc<dyn OAuthProvider>, AreaError> {
        let service = services::get_service(&self.db, account.service_id)
            .await?
            .ok_or_else(|| AreaError::NotFound("Service not found".to_string()))?;
        let key = service.oauth_provider.ok_or_else(|| {
            AreaError::Internal(format!("service `{}` has no OAuth provider", service.name))
        })?;
        self.providers
            .get(&key)
            .cloned()
            .ok_or_else(|| AreaError::Config(format!("OAuth provider `{key}` is not configured")))
    }
}
