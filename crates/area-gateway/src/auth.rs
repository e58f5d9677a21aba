// SPDX-FileCopyrightText: 2026 Area Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session tokens and authentication middleware.
//!
//! Sessions are HS256 JWTs whose subject is the user id. Authenticated routes
//! sit behind [`require_session`], which places a [`Session`] in the request
//! extensions. Admin routes compare a static bearer token and are rejected
//! when none is configured (fail-closed).

use std::time::Duration;

use area_core::AreaError;
use area_storage::User;
use area_storage::queries::users;
use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::server::GatewayState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

/// The authenticated caller of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    pub user_id: i64,
}

/// Issues and verifies session tokens.
#[derive(Clone)]
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_secs: i64,
}

impl std::fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKeys")
            .field("secret", &"[redacted]")
            .field("ttl_secs", &self.ttl_secs)
            .finish()
    }
}

impl SessionKeys {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl_secs: i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX),
        }
    }

    pub fn issue(&self, user: &User) -> Result<String, AreaError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            iat: now,
            exp: now.saturating_add(self.ttl_secs),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AreaError::Internal(format!("session signing failed: {e}")))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AreaError> {
        jsonwebtoken::decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "session token rejected");
                AreaError::Unauthorized("Invalid or expired token".to_string())
            })
    }
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer ").or_else(|| v.strip_prefix("bearer ")))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Resolve the caller from a bearer token, if one is present.
///
/// A present but invalid token is an error, never an anonymous request.
pub async fn authenticate(state: &GatewayState, headers: &HeaderMap) -> Result<Option<Session>, AreaError> {
    let Some(token) = bearer(headers) else {
        return Ok(None);
    };
    let claims = state.sessions.verify(token)?;
    let user_id = claims
        .sub
        .parse::<i64>()
        .map_err(|_| AreaError::Unauthorized("Invalid or expired token".to_string()))?;
    if users::get_user(&state.db, user_id).await?.is_none() {
        return Err(AreaError::Unauthorized("User no longer exists".to_string()));
    }
    Ok(Some(Session { user_id }))
}

/// Middleware that requires a valid session token.
pub async fn require_session(
    State(state): State<GatewayState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let session = authenticate(&state, request.headers())
        .await?
        .ok_or_else(|| AreaError::Unauthorized("Not authenticated".to_string()))?;
    request.extensions_mut().insert(session);
    Ok(next.run(request).await)
}

/// Middleware that requires the configured admin token.
pub async fn require_admin(
    State(state): State<GatewayState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = state.admin_token.as_deref() else {
        tracing::error!("admin route called but no admin token is configured -- rejecting request");
        return Err(AreaError::Unauthorized("Admin access is disabled".to_string()).into());
    };
    match bearer(request.headers()) {
        Some(token) if token == expected => Ok(next.run(request).await),
        _ => Err(AreaError::Unauthorized("Invalid admin token".to_string()).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            id: 7,
            email: "ada@example.com".to_string(),
            display_name: None,
            password_hash: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn issued_token_verifies() {
        let keys = SessionKeys::new(b"secret", Duration::from_secs(60));
        let token = keys.issue(&user()).unwrap();
        let claims = keys.verify(&token).unwrap();
        assert_eq!(claims.sub, "7");
        assert_eq!(claims.email, "ada@example.com");
    }

    #[test]
    fn wrong_secret_is_unauthorized() {
        let token = SessionKeys::new(b"one", Duration::from_secs(60)).issue(&user()).unwrap();
        let err = SessionKeys::new(b"two", Duration::from_secs(60)).verify(&token).unwrap_err();
        assert!(matches!(err, AreaError::Unauthorized(_)));
    }

    #[test]
    fn expired_token_is_rejected() {
        let keys = SessionKeys::new(b"secret", Duration::ZERO);
        let mut claims = Claims {
            sub: "7".into(),
            email: "ada@example.com".into(),
            iat: 0,
            exp: Utc::now().timestamp() - 3600,
        };
        claims.iat = claims.exp - 10;
        let token = jsonwebtoken::encode(&Header::default(), &claims, &keys.encoding).unwrap();
        assert!(keys.verify(&token).is_err());
    }

    #[test]
    fn bearer_header_is_parsed() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer(&headers), None);
        headers.insert(AUTHORIZATION, "Bearer abc".parse().unwrap());
        assert_eq!(bearer(&headers), Some("abc"));
        headers.insert(AUTHORIZATION, "Basic abc".parse().unwrap());
        assert_eq!(bearer(&headers), None);
    }

    #[test]
    fn debug_redacts_secret() {
        let keys = SessionKeys::new(b"super-secret", Duration::from_secs(60));
        assert!(!format!("{keys:?}").contains("super-secret"));
    }
}
