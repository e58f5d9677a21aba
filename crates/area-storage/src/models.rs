// SPDX-FileCopyrightText: 2026 Area Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Row types for the broker's tables.

use area_core::{AreaStatus, AuthFlow, DeliveryStatus, OAuthMode, Params};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// A registered user.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub display_name: Option<String>,
    /// Argon2 PHC string; `None` for OAuth-only accounts.
    #[serde(skip)]
    pub password_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Reference row mirroring one catalog service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceRow {
    pub id: i64,
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub oauth_provider: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub category: Option<String>,
}

/// Credential binding between a user and a service.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceAccount {
    pub id: i64,
    pub user_id: i64,
    pub service_id: i64,
    pub remote_account_id: Option<String>,
    pub remote_email: Option<String>,
    pub remote_name: Option<String>,
    pub granted_scopes: Option<String>,
    pub is_active: bool,
    pub last_used_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub error_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields written when a connect flow completes.
#[derive(Debug, Clone, Default)]
pub struct AccountIdentity {
    pub remote_account_id: Option<String>,
    pub remote_email: Option<String>,
    pub remote_name: Option<String>,
    pub granted_scopes: Option<String>,
}

/// Sealed token material for one service account.
#[derive(Clone)]
pub struct CredentialRecord {
    pub service_account_id: i64,
    pub access_ciphertext: Vec<u8>,
    pub access_nonce: Vec<u8>,
    pub refresh_ciphertext: Option<Vec<u8>>,
    pub refresh_nonce: Option<Vec<u8>>,
    pub token_type: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("service_account_id", &self.service_account_id)
            .field("has_refresh", &self.refresh_ciphertext.is_some())
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// A pending authorization request.
#[derive(Debug, Clone)]
pub struct OAuthStateRecord {
    pub state: String,
    pub provider: String,
    pub mode: OAuthMode,
    pub flow: AuthFlow,
    pub user_id: Option<i64>,
    pub redirect_uri: String,
    pub code_verifier: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// A user-configured Action→Reaction link.
#[derive(Debug, Clone, Serialize)]
pub struct Area {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub action_service_id: i64,
    pub action_id: i64,
    pub params_action: Params,
    pub reaction_service_id: i64,
    pub reaction_id: i64,
    pub params_reaction: Params,
    pub is_active: bool,
    pub status: AreaStatus,
    pub failure_count: i64,
    pub last_error: Option<String>,
    #[serde(skip)]
    pub watermark: Option<String>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for inserting an Area.
#[derive(Debug, Clone)]
pub struct NewArea {
    pub user_id: i64,
    pub name: String,
    pub action_service_id: i64,
    pub action_id: i64,
    pub params_action: Params,
    pub reaction_service_id: i64,
    pub reaction_id: i64,
    pub params_reaction: Params,
    pub status: AreaStatus,
}

/// Partial update of an Area's user-editable fields.
#[derive(Debug, Clone, Default)]
pub struct AreaPatch {
    pub name: Option<String>,
    pub params_action: Option<Params>,
    pub params_reaction: Option<Params>,
}

/// A reaction invocation, retried until delivered or permanently failed.
#[derive(Debug, Clone, Serialize)]
pub struct Delivery {
    pub id: i64,
    pub area_id: i64,
    pub event_id: String,
    pub params: Params,
    pub status: DeliveryStatus,
    pub attempts: i64,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of one reaction invocation, to be recorded with the watermark.
#[derive(Debug, Clone)]
pub struct DeliveryRecord {
    pub event_id: String,
    pub params: Params,
    pub status: DeliveryStatus,
    pub attempts: i64,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}
