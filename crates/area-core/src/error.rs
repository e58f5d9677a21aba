// SPDX-FileCopyrightText: 2026 Area Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Area automation broker.

use thiserror::Error;

/// Coarse classification used by the engine and the HTTP surface to decide
/// whether an error is retried, surfaced, or forces a deactivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Malformed or unauthorized request. Surfaced verbatim, never retried.
    Client,
    /// Network failure, timeout, or 5xx from a third party. Retried with backoff.
    TransientProvider,
    /// Revoked consent or invalid refresh token. Deactivates the service account.
    TerminalProvider,
    /// Broken invariant or local infrastructure failure. Logged, cycle aborted.
    Internal,
}

/// The primary error type used across all Area crates.
#[derive(Debug, Error)]
pub enum AreaError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Credential vault failures (sealing, unsealing, key handling).
    #[error("vault error: {0}")]
    Vault(String),

    /// Generic malformed request.
    #[error("{0}")]
    BadRequest(String),

    /// Action or reaction parameters do not satisfy the declared schema.
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    /// The caller holds no active service account for a required service.
    #[error("service account not connected for service `{service}`")]
    ServiceAccountNotConnected { service: String },

    /// Resource is absent or not visible to the caller.
    #[error("{0}")]
    NotFound(String),

    /// Missing or invalid credentials on an authenticated route.
    #[error("{0}")]
    Unauthorized(String),

    /// Uniqueness conflict, e.g. an email already registered.
    #[error("{0}")]
    Conflict(String),

    /// OAuth state is absent, already consumed, or past its TTL.
    #[error("unknown or expired OAuth state")]
    UnknownOrExpiredState,

    /// OAuth state was issued for a different redirect target or flow.
    #[error("OAuth redirect mismatch: {0}")]
    RedirectMismatch(String),

    /// Authorization code exchange rejected by the provider.
    #[error("provider token exchange failed: {0}")]
    ProviderExchangeFailed(String),

    /// Stored token is expired and no refresh token is available.
    #[error("token expired and no refresh token is available")]
    TokenExpiredNoRefresh,

    /// Provider invalidated the refresh token; the account must be reconnected.
    #[error("provider rejected token refresh: {0}")]
    ProviderRejectedRefresh(String),

    /// Network failure reaching the provider. Retryable.
    #[error("provider unreachable: {message}")]
    ProviderUnreachable {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Provider answered with a retryable status (5xx, 429).
    #[error("transient provider error: {0}")]
    TransientProvider(String),

    /// Provider answered with a non-retryable status (revoked, forbidden).
    #[error("terminal provider error: {0}")]
    TerminalProvider(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// An internal invariant was broken (double fire, lease conflict).
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AreaError {
    /// Wrap any storage-layer error.
    pub fn storage<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        AreaError::Storage {
            source: Box::new(err),
        }
    }

    /// Classify the error according to the broker's error taxonomy.
    pub fn classify(&self) -> ErrorClass {
        match self {
            AreaError::BadRequest(_)
            | AreaError::InvalidParameters(_)
            | AreaError::ServiceAccountNotConnected { .. }
            | AreaError::NotFound(_)
            | AreaError::Unauthorized(_)
            | AreaError::Conflict(_)
            | AreaError::UnknownOrExpiredState
            | AreaError::RedirectMismatch(_)
            | AreaError::ProviderExchangeFailed(_) => ErrorClass::Client,
            AreaError::ProviderUnreachable { .. }
            | AreaError::TransientProvider(_)
            | AreaError::Timeout { .. } => ErrorClass::TransientProvider,
            AreaError::TokenExpiredNoRefresh
            | AreaError::ProviderRejectedRefresh(_)
            | AreaError::TerminalProvider(_) => ErrorClass::TerminalProvider,
            AreaError::Config(_)
            | AreaError::Storage { .. }
            | AreaError::Vault(_)
            | AreaError::InvariantViolation(_)
            | AreaError::Internal(_) => ErrorClass::Internal,
        }
    }

    /// True when the engine should retry the failed operation on a later tick.
    pub fn is_retryable(&self) -> bool {
        self.classify() == ErrorClass::TransientProvider
    }

    /// True when the failure means the stored credentials are unusable.
    pub fn is_terminal(&self) -> bool {
        self.classify() == ErrorClass::TerminalProvider
    }
}
