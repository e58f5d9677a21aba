// SPDX-FileCopyrightText: 2026 Area Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! GitHub webhook deliveries.
//!
//! A delivery is accepted only with a valid `X-Hub-Signature-256` over the
//! raw body, keyed by `webhooks.github_secret`. Recognized events go to the
//! engine, which fires matching Areas through the usual de-duplication path.

use area_core::AreaError;
use area_engine::DispatchReport;
use area_registry::builtin::github;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sha2::Sha256;
use tracing::{debug, warn};

use super::ApiResult;
use crate::extract::{Json, Query};
use crate::server::GatewayState;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_HEADER: &str = "x-hub-signature-256";
const EVENT_HEADER: &str = "x-github-event";

#[derive(Debug, Deserialize)]
pub struct ChallengeQuery {
    #[serde(default)]
    challenge: Option<String>,
}

/// Echo a verification challenge, if one is given.
pub async fn github_challenge(Query(query): Query<ChallengeQuery>) -> Json<Value> {
    match query.challenge {
        Some(challenge) => Json(json!({ "challenge": challenge })),
        None => Json(json!({ "status": "ok" })),
    }
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub status: &'static str,
    /// The `X-GitHub-Event` header as received.
    pub event: String,
    /// Active Areas the event was addressed to.
    pub matched: usize,
    pub fired: usize,
    /// Busy Areas left to their next poll.
    pub deferred: usize,
    pub failed: usize,
}

pub async fn github(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<WebhookResponse>> {
    let (Some(secret), Some(engine)) = (state.github_webhook_secret.as_deref(), state.engine.as_ref())
    else {
        warn!("github webhook received but no webhook secret is configured -- rejecting");
        return Err(AreaError::NotFound("Webhooks are not enabled".to_string()).into());
    };
    let signature = header(&headers, SIGNATURE_HEADER)
        .ok_or_else(|| AreaError::Unauthorized("Missing webhook signature".to_string()))?;
    verify_signature(secret.as_bytes(), &body, signature)?;

    let event = header(&headers, EVENT_HEADER).unwrap_or("unknown").to_string();
    let payload: Value = serde_json::from_slice(&body)
        .map_err(|e| AreaError::BadRequest(format!("Invalid webhook payload: {e}")))?;

    let report = match github::push_event(&event, &payload) {
        Some(pushed) => engine.dispatch(pushed).await?,
        None => {
            debug!(event = %event, "github webhook ignored");
            DispatchReport::default()
        }
    };
    Ok(Json(WebhookResponse {
        status: "ok",
        event,
        matched: report.matched,
        fired: report.fired,
        deferred: report.deferred,
        failed: report.failed,
    }))
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Check a `sha256=<hex>` signature in constant time.
fn verify_signature(secret: &[u8], body: &[u8], signature: &str) -> Result<(), AreaError> {
    let invalid = || AreaError::Unauthorized("Invalid webhook signature".to_string());
    let expected = signature
        .strip_prefix("sha256=")
        .and_then(|digest| hex::decode(digest).ok())
        .ok_or_else(invalid)?;
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| AreaError::Internal(format!("unusable webhook secret: {e}")))?;
    mac.update(body);
    mac.verify_slice(&expected).map_err(|_| invalid())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &[u8], body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret).unwrap();
        mac.update(body);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn signature_round_trip() {
        let body = br#"{"zen":"Design for failure."}"#;
        let signature = sign(b"hook-secret", body);
        verify_signature(b"hook-secret", body, &signature).unwrap();
    }

    #[test]
    fn tampered_or_malformed_signatures_are_rejected() {
        let body = br#"{"action":"opened"}"#;
        let signature = sign(b"hook-secret", body);

        let wrong_key = verify_signature(b"other-secret", body, &signature).unwrap_err();
        assert!(matches!(wrong_key, AreaError::Unauthorized(_)));
        let tampered = verify_signature(b"hook-secret", br#"{"action":"closed"}"#, &signature);
        assert!(tampered.is_err());
        assert!(verify_signature(b"hook-secret", body, signature.trim_start_matches("sha256=")).is_err());
        assert!(verify_signature(b"hook-secret", body, "sha256=not-hex").is_err());
    }
}
