// SPDX-FileCopyrightText: 2026 Area Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared HTTP plumbing for built-in pollers and executors.

use std::time::Duration;

use area_core::AreaError;
use reqwest::StatusCode;
use tracing::debug;

/// Endpoints and limits used by the built-in capabilities.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    /// Bound on every provider request.
    pub timeout: Duration,
    pub github_api: String,
    pub gmail_api: String,
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            github_api: "https://api.github.com".to_string(),
            gmail_api: "https://gmail.googleapis.com".to_string(),
            user_agent: concat!("area-broker/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Build the client shared by all built-in capabilities.
pub fn build_client(settings: &HttpSettings) -> Result<reqwest::Client, AreaError> {
    reqwest::Client::builder()
        .timeout(settings.timeout)
        .user_agent(settings.user_agent.clone())
        .build()
        .map_err(|e| AreaError::Internal(format!("failed to build HTTP client: {e}")))
}

/// Map a transport failure. Timeouts and connection errors are transient.
pub fn send_error(service: &str, timeout: Duration, err: reqwest::Error) -> AreaError {
    if err.is_timeout() {
        return AreaError::Timeout { duration: timeout };
    }
    AreaError::ProviderUnreachable {
        message: format!("{service}: {err}"),
        source: Some(Box::new(err)),
    }
}

/// Map a non-success status into the error taxonomy.
///
/// 401 means the grant is gone; 429 and 5xx are retried; any other 4xx is a
/// problem with the request itself.
pub fn status_error(service: &str, status: StatusCode, body: &str) -> AreaError {
    let body = body.chars().take(200).collect::<String>();
    debug!(service, %status, body, "provider returned an error status");
    if status == StatusCode::UNAUTHORIZED {
        AreaError::TerminalProvider(format!("{service} rejected the access token"))
    } else if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        AreaError::TransientProvider(format!("{service} returned {status}"))
    } else {
        AreaError::BadRequest(format!("{service} returned {status}: {body}"))
    }
}

/// Send a request and return the body of a successful response.
pub async fn send_json(
    service: &str,
    timeout: Duration,
    request: reqwest::RequestBuilder,
) -> Result<serde_json::Value, AreaError> {
    let response = request
        .send()
        .await
        .map_err(|e| send_error(service, timeout, e))?;
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| send_error(service, timeout, e))?;
    if !status.is_success() {
        return Err(status_error(service, status, &body));
    }
    if body.trim().is_empty() {
        return Ok(serde_json::Value::Null);
    }
    serde_json::from_str(&body)
        .map_err(|e| AreaError::TransientProvider(format!("{service} returned malformed JSON: {e}")))
}

/// The token a capability needs, or an error naming the service.
pub fn require_token<'a>(service: &str, token: Option<&'a str>) -> Result<&'a str, AreaError> {
    token.ok_or_else(|| AreaError::ServiceAccountNotConnected {
        service: service.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_follows_taxonomy() {
        assert!(status_error("github", StatusCode::UNAUTHORIZED, "").is_terminal());
        assert!(status_error("github", StatusCode::BAD_GATEWAY, "").is_retryable());
        assert!(status_error("github", StatusCode::TOO_MANY_REQUESTS, "").is_retryable());
        let not_found = status_error("github", StatusCode::NOT_FOUND, "Not Found");
        assert!(!not_found.is_retryable() && !not_found.is_terminal());
    }
}
