// SPDX-FileCopyrightText: 2026 Area Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Generic OAuth2 authorization-code client driven by configuration.

use std::time::Duration;

use area_config::{FlowConfig, ProviderConfig};
use area_core::{AreaError, AuthFlow, ExchangeRequest, OAuthProvider, RemoteIdentity, TokenSet};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, warn};

/// Which token-endpoint call failed. Decides how a rejection is reported.
#[derive(Debug, Clone, Copy)]
enum Grant {
    AuthorizationCode,
    Refresh,
}

/// An [`OAuthProvider`] speaking plain RFC 6749 against configured endpoints.
#[derive(Debug, Clone)]
pub struct HttpOAuthProvider {
    key: String,
    config: ProviderConfig,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpOAuthProvider {
    pub fn new(key: &str, config: ProviderConfig, timeout: Duration) -> Result<Self, AreaError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("area-broker/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AreaError::Internal(format!("failed to build OAuth client: {e}")))?;
        Ok(Self {
            key: key.to_string(),
            config,
            client,
            timeout,
        })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn flow(&self, flow: AuthFlow) -> Option<&FlowConfig> {
        match flow {
            AuthFlow::Web => self.config.web.as_ref(),
            AuthFlow::Mobile => self.config.mobile.as_ref(),
        }
    }

    /// Client used for refresh grants. Tokens are not tagged with the flow
    /// that issued them, so the confidential web client is preferred.
    fn refresh_client(&self) -> Result<&FlowConfig, AreaError> {
        self.config
            .web
            .as_ref()
            .or(self.config.mobile.as_ref())
            .ok_or_else(|| AreaError::Config(format!("provider `{}` has no client configured", self.key)))
    }

    fn transport_error(&self, err: reqwest::Error) -> AreaError {
        if err.is_timeout() {
            AreaError::Timeout {
                duration: self.timeout,
            }
        } else {
            AreaError::ProviderUnreachable {
                message: format!("{}: {err}", self.key),
                source: Some(Box::new(err)),
            }
        }
    }

    fn rejection(&self, grant: Grant, reason: String) -> AreaError {
        match grant {
            Grant::AuthorizationCode => AreaError::ProviderExchangeFailed(format!("{}: {reason}", self.key)),
            Grant::Refresh => AreaError::ProviderRejectedRefresh(format!("{}: {reason}", self.key)),
        }
    }

    async fn token_request(&self, grant: Grant, form: Vec<(&str, String)>) -> Result<TokenSet, AreaError> {
        let response = self
            .client
            .post(&self.config.token_url)
            .header("Accept", "application/json")
            .form(&form)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;
        let json: Option<Value> = serde_json::from_str(&body).ok();
        // Some providers answer 200 with an `error` member.
        let error_code = json
            .as_ref()
            .and_then(|v| v["error"].as_str())
            .map(str::to_string);

        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(AreaError::TransientProvider(format!("{} token endpoint returned {status}", self.key)));
        }
        if !status.is_success() || error_code.is_some() {
            let reason = error_code.unwrap_or_else(|| status.to_string());
            warn!(provider = %self.key, %status, reason, "token request rejected");
            return Err(self.rejection(grant, reason));
        }

        let tokens: TokenSet = json
            .and_then(|v| serde_json::from_value(v).ok())
            .ok_or_else(|| self.rejection(grant, "malformed token response".to_string()))?;
        if tokens.access_token.is_empty() {
            return Err(self.rejection(grant, "token response carried no access token".to_string()));
        }
        debug!(provider = %self.key, expires_in = ?tokens.expires_in, "token request succeeded");
        Ok(tokens)
    }
}

/// Pull the identity fields out of a userinfo document.
///
/// Accepts `id` or `sub` for the account id (numbers are stringified), and
/// `name` or `login` for the display name.
pub fn parse_identity(doc: &Value) -> Option<RemoteIdentity> {
    let id = ["id", "sub"].iter().find_map(|k| match &doc[*k] {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })?;
    let text = |k: &str| doc[k].as_str().filter(|s| !s.is_empty()).map(str::to_string);
    Some(RemoteIdentity {
        id,
        email: text("email"),
        name: text("name").or_else(|| text("login")),
    })
}

#[async_trait]
impl OAuthProvider for HttpOAuthProvider {
    fn key(&self) -> &str {
        &self.key
    }

    async fn exchange_code(&self, request: ExchangeRequest) -> Result<TokenSet, AreaError> {
        let flow = self.flow(request.flow).ok_or_else(|| {
            AreaError::BadRequest(format!("{} flow is not configured for `{}`", request.flow, self.key))
        })?;
        let mut form = vec![
            ("grant_type", "authorization_code".to_string()),
            ("code", request.code),
            ("redirect_uri", request.redirect_uri),
            ("client_id", flow.client_id.clone()),
        ];
        if let Some(secret) = &flow.client_secret {
            form.push(("client_secret", secret.clone()));
        }
        if let Some(verifier) = request.code_verifier {
            form.push(("code_verifier", verifier));
        }
        // Exchange failures are never retried: codes are single-use.
        self.token_request(Grant::AuthorizationCode, form)
            .await
            .map_err(|e| match e {
                AreaError::ProviderExchangeFailed(_) => e,
                other => AreaError::ProviderExchangeFailed(other.to_string()),
            })
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenSet, AreaError> {
        let client = self.refresh_client()?;
        let mut form = vec![
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", refresh_token.to_string()),
            ("client_id", client.client_id.clone()),
        ];
        if let Some(secret) = &client.client_secret {
            form.push(("client_secret", secret.clone()));
        }
        self.token_request(Grant::Refresh, form).await
    }

    async fn fetch_identity(&self, access_token: &str) -> Result<RemoteIdentity, AreaError> {
        let url = self
            .config
            .userinfo_url
            .as_deref()
            .ok_or_else(|| AreaError::Config(format!("provider `{}` has no userinfo_url", self.key)))?;
        let response = self
            .client
            .get(url)
            .bearer_auth(access_token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(AreaError::TerminalProvider(format!("{} rejected the access token", self.key)));
        }
        if !status.is_success() {
            return Err(AreaError::TransientProvider(format!("{} userinfo returned {status}", self.key)));
        }
        let doc: Value = response.json().await.map_err(|e| self.transport_error(e))?;
        parse_identity(&doc)
            .ok_or_else(|| AreaError::TransientProvider(format!("{} userinfo carried no account id", self.key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> HttpOAuthProvider {
        let config = ProviderConfig {
            display_name: "Example".into(),
            icon: None,
            color: None,
            auth_url: format!("{}/authorize", server.uri()),
            token_url: format!("{}/token", server.uri()),
            userinfo_url: Some(format!("{}/user", server.uri())),
            web: Some(FlowConfig {
                client_id: "web-id".into(),
                client_secret: Some("web-secret".into()),
                redirect_uri: "https://app.test/auth/callback/example".into(),
                scopes: vec!["read".into()],
                pkce: false,
            }),
            mobile: None,
        };
        HttpOAuthProvider::new("example", config, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn exchange_posts_form_and_parses_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(header("accept", "application/json"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code_verifier=v123"))
            .and(body_string_contains("client_secret=web-secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "at", "refresh_token": "rt", "expires_in": 3600, "token_type": "bearer"
            })))
            .mount(&server)
            .await;

        let tokens = provider(&server)
            .exchange_code(ExchangeRequest {
                code: "c0de".into(),
                redirect_uri: "https://app.test/auth/callback/example".into(),
                code_verifier: Some("v123".into()),
                flow: AuthFlow::Web,
            })
            .await
            .unwrap();
        assert_eq!(tokens.access_token, "at");
        assert_eq!(tokens.refresh_token.as_deref(), Some("rt"));
        assert_eq!(tokens.expires_in, Some(3600));
    }

    #[tokio::test]
    async fn error_member_in_ok_response_fails_exchange() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"error": "bad_verification_code"})))
            .mount(&server)
            .await;

        let err = provider(&server)
            .exchange_code(ExchangeRequest {
                code: "used".into(),
                redirect_uri: "https://app.test/auth/callback/example".into(),
                code_verifier: None,
                flow: AuthFlow::Web,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AreaError::ProviderExchangeFailed(ref m) if m.contains("bad_verification_code")));
    }

    #[tokio::test]
    async fn refresh_classifies_rejection_and_outage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("refresh_token=revoked"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_grant"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("refresh_token=flaky"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let provider = provider(&server);
        assert!(provider.refresh_token("revoked").await.unwrap_err().is_terminal());
        assert!(provider.refresh_token("flaky").await.unwrap_err().is_retryable());
    }

    #[tokio::test]
    async fn identity_accepts_numeric_id_and_login() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user"))
            .and(header("authorization", "Bearer at"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 583231, "login": "octocat", "email": "octo@github.test"
            })))
            .mount(&server)
            .await;

        let identity = provider(&server).fetch_identity("at").await.unwrap();
        assert_eq!(identity.id, "583231");
        assert_eq!(identity.name.as_deref(), Some("octocat"));
        assert_eq!(identity.email.as_deref(), Some("octo@github.test"));
    }

    #[test]
    fn identity_falls_back_to_sub() {
        let identity = parse_identity(&json!({"sub": "1090", "name": "Ada"})).unwrap();
        assert_eq!(identity.id, "1090");
        assert!(parse_identity(&json!({"email": "x@y"})).is_none());
    }
}
