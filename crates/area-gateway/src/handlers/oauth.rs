// SPDX-FileCopyrightText: 2026 Area Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! OAuth provider discovery, authorization, and callback.
//!
//! A bearer token on `/oauth/authorize` starts a connect flow for the caller;
//! without one the flow signs a user in. The mode is stored with the state,
//! so the callback cannot change it.

use area_core::{AreaError, AuthFlow};
use area_oauth::{AuthorizationOutcome, AuthorizationStart, Callback, ProviderDescriptor, PublicFlowConfig};
use axum::extract::State;
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};

use super::ApiResult;
use super::users::TokenResponse;
use crate::auth::authenticate;
use crate::extract::{Json, Path, Query};
use crate::server::GatewayState;

#[derive(Debug, Deserialize)]
pub struct FlowQuery {
    #[serde(default)]
    pub flow: Option<AuthFlow>,
}

pub async fn providers(
    State(state): State<GatewayState>,
    Query(query): Query<FlowQuery>,
) -> Json<Vec<ProviderDescriptor>> {
    Json(state.oauth.providers().list_providers(query.flow.unwrap_or(AuthFlow::Web)))
}

pub async fn authorize(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Path((provider, flow)): Path<(String, AuthFlow)>,
) -> ApiResult<Json<AuthorizationStart>> {
    let caller = authenticate(&state, &headers).await?;
    let start = state
        .oauth
        .begin_authorization(&provider, flow, caller.map(|s| s.user_id))
        .await?;
    Ok(Json(start))
}

pub async fn public_config(
    State(state): State<GatewayState>,
    Path((provider, flow)): Path<(String, AuthFlow)>,
) -> ApiResult<Json<PublicFlowConfig>> {
    Ok(Json(state.oauth.providers().public_config(&provider, flow)?))
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub flow: Option<AuthFlow>,
    /// Set by the provider when the user denied access.
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl CallbackQuery {
    /// Code and state, or why the provider did not send them.
    pub fn into_parts(self) -> Result<(String, String, Option<AuthFlow>), AreaError> {
        if let Some(error) = self.error {
            let reason = self.error_description.unwrap_or(error);
            return Err(AreaError::BadRequest(format!("Authorization was not granted: {reason}")));
        }
        let code = self
            .code
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AreaError::BadRequest("Missing authorization code".to_string()))?;
        let state = self
            .state
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AreaError::BadRequest("Missing OAuth state".to_string()))?;
        Ok((code, state, self.flow))
    }
}

#[derive(Debug, Serialize)]
pub struct ConnectedResponse {
    pub success: bool,
    pub service_account_id: i64,
    pub service_name: String,
    pub remote_email: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum CallbackResponse {
    Login {
        #[serde(flatten)]
        token: TokenResponse,
        created: bool,
    },
    Connected(ConnectedResponse),
}

pub(crate) fn connected(state: &GatewayState, account: area_storage::ServiceAccount) -> ConnectedResponse {
    let service_name = state
        .catalog
        .service(account.service_id)
        .map_or_else(|| account.service_id.to_string(), |s| s.display_name.to_string());
    ConnectedResponse {
        success: true,
        service_account_id: account.id,
        service_name,
        remote_email: account.remote_email,
    }
}

pub async fn callback(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Path(provider): Path<String>,
    Query(query): Query<CallbackQuery>,
) -> ApiResult<Json<CallbackResponse>> {
    let caller = authenticate(&state, &headers).await?;
    let (code, oauth_state, flow) = query.into_parts()?;
    let outcome = state
        .oauth
        .complete_authorization(Callback {
            provider,
            code,
            state: oauth_state,
            flow,
            caller: caller.map(|s| s.user_id),
        })
        .await?;
    let response = match outcome {
        AuthorizationOutcome::Login { user, created, .. } => CallbackResponse::Login {
            token: TokenResponse::issue(&state, &user)?,
            created,
        },
        AuthorizationOutcome::Connect { account } => CallbackResponse::Connected(connected(&state, account)),
    };
    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(code: Option<&str>, state: Option<&str>, error: Option<&str>) -> CallbackQuery {
        CallbackQuery {
            code: code.map(str::to_string),
            state: state.map(str::to_string),
            flow: None,
            error: error.map(str::to_string),
            error_description: None,
        }
    }

    #[test]
    fn provider_denial_is_reported() {
        let err = query(None, Some("s"), Some("access_denied")).into_parts().unwrap_err();
        assert!(err.to_string().contains("access_denied"));
    }

    #[test]
    fn code_and_state_are_required() {
        assert!(query(None, Some("s"), None).into_parts().is_err());
        assert!(query(Some("c"), None, None).into_parts().is_err());
        let (code, state, flow) = query(Some("c"), Some("s"), None).into_parts().unwrap();
        assert_eq!((code.as_str(), state.as_str(), flow), ("c", "s", None));
    }
}
