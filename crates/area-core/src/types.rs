// SPDX-FileCopyrightText: 2026 Area Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the vault, gateway, engine, and HTTP surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Bound parameter values of an action or reaction.
pub type Params = serde_json::Map<String, serde_json::Value>;

/// Client surface that started an OAuth flow. Selects the provider credentials.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AuthFlow {
    Web,
    Mobile,
}

/// What a completed authorization does: sign a user in, or attach a service account.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OAuthMode {
    Login,
    Connect,
}

/// Persistent scheduling state of an Area.
///
/// `Evaluating` is never stored; it is represented by a held lease.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AreaStatus {
    Inactive,
    Active,
    Suspended,
}

/// Lifecycle of one reaction invocation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    /// Waiting for a (re)try.
    Pending,
    Delivered,
    /// Attempts exhausted or a non-retryable error.
    Failed,
}

/// Freshness of a stored access token relative to now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum TokenState {
    /// Usable without refresh.
    Valid,
    /// Still usable but inside the refresh lookahead window.
    Expiring,
    /// Expired or inside the safety margin, and a refresh token exists.
    ExpiredRefreshable,
    /// Expired and unrecoverable without the user reconnecting.
    ExpiredTerminal,
}

/// Tokens returned by a provider's token endpoint.
#[derive(Clone, Default, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    /// Lifetime in seconds from issuance.
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Space- or comma-separated scopes granted by the user.
    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenSet {
    /// Absolute expiry computed from `expires_in`.
    pub fn expires_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.expires_in
            .filter(|secs| *secs > 0)
            .map(|secs| now + chrono::Duration::seconds(secs))
    }
}

impl std::fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Identity of the remote account as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteIdentity {
    pub id: String,
    pub email: Option<String>,
    pub name: Option<String>,
}

/// One upstream occurrence detected by an action poller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerEvent {
    /// Provider-scoped identifier used for de-duplication and logging.
    pub id: String,
    /// Data exposed to condition filters and reaction templates.
    pub data: serde_json::Value,
}

/// An event a provider pushed to us, addressed to one action.
#[derive(Debug, Clone, PartialEq)]
pub struct PushedEvent {
    /// Catalog id of the action the event belongs to.
    pub action_id: i64,
    /// Action parameters an Area must carry to receive the event, such as
    /// the repository. Strings compare case-insensitively.
    pub selector: Params,
    /// Uses the same id the action's poller would assign, so a pushed
    /// event and a later poll of it de-duplicate.
    pub event: TriggerEvent,
}

impl PushedEvent {
    /// Whether an Area with these action parameters receives the event.
    pub fn selects(&self, params: &Params) -> bool {
        self.selector.iter().all(|(key, wanted)| match (params.get(key), wanted) {
            (Some(serde_json::Value::String(have)), serde_json::Value::String(wanted)) => {
                have.eq_ignore_ascii_case(wanted)
            }
            (Some(have), wanted) => have == wanted,
            (None, _) => false,
        })
    }
}

/// Result of one poll: new events in upstream order and the cursor to persist.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollOutcome {
    pub events: Vec<TriggerEvent>,
    /// `None` keeps the stored watermark unchanged.
    pub watermark: Option<String>,
}

impl PollOutcome {
    /// A poll that saw nothing new but still establishes a cursor.
    pub fn quiet(watermark: Option<String>) -> Self {
        Self {
            events: Vec::new(),
            watermark,
        }
    }
}

/// Primitive types accepted in parameter schemas.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
}

impl ParamType {
    /// Whether a JSON value is acceptable for this type.
    pub fn accepts(&self, value: &serde_json::Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Number => value.is_number(),
            ParamType::Boolean => value.is_boolean(),
        }
    }
}
