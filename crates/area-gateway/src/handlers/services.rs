// SPDX-FileCopyrightText: 2026 Area Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Service catalog and the caller's connected accounts.

use area_core::{AreaError, AuthFlow};
use area_oauth::Callback;
use area_registry::ServiceDef;
use area_storage::ServiceAccount;
use area_storage::queries::accounts;
use area_vault::RefreshStats;
use axum::Extension;
use axum::extract::State;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::ApiResult;
use super::oauth::{ConnectedResponse, connected};
use crate::auth::Session;
use crate::extract::{Json, Path, Query};
use crate::server::GatewayState;

pub async fn list(State(state): State<GatewayState>) -> Json<Vec<ServiceDef>> {
    Json(state.catalog.services().to_vec())
}

pub async fn capabilities(
    State(state): State<GatewayState>,
    Path(service_id): Path<i64>,
) -> ApiResult<Json<ServiceDef>> {
    let service = state
        .catalog
        .service(service_id)
        .copied()
        .ok_or_else(|| AreaError::NotFound("Service not found".to_string()))?;
    Ok(Json(service))
}

#[derive(Debug, Serialize)]
pub struct ServiceSummary {
    pub id: i64,
    pub name: &'static str,
    pub display_name: &'static str,
    pub icon: &'static str,
    pub color: &'static str,
}

impl From<&ServiceDef> for ServiceSummary {
    fn from(def: &ServiceDef) -> Self {
        Self {
            id: def.id,
            name: def.name,
            display_name: def.display_name,
            icon: def.icon,
            color: def.color,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ConnectedService {
    #[serde(flatten)]
    pub account: ServiceAccount,
    pub service: Option<ServiceSummary>,
}

/// Active accounts of the caller, each with its service.
pub async fn mine(
    State(state): State<GatewayState>,
    Extension(session): Extension<Session>,
) -> ApiResult<Json<Vec<ConnectedService>>> {
    let accounts = accounts::list_accounts_for_user(&state.db, session.user_id, true).await?;
    let connected = accounts
        .into_iter()
        .map(|account| ConnectedService {
            service: state.catalog.service(account.service_id).map(ServiceSummary::from),
            account,
        })
        .collect();
    Ok(Json(connected))
}

#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    pub code: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub flow: Option<AuthFlow>,
}

/// Complete a connect flow for the signed-in caller with a code the client
/// received on its own redirect URI.
pub async fn connect(
    State(state): State<GatewayState>,
    Extension(session): Extension<Session>,
    Path(service_name): Path<String>,
    Query(query): Query<ConnectQuery>,
) -> ApiResult<Json<ConnectedResponse>> {
    let service = state
        .catalog
        .service_by_name(&service_name)
        .copied()
        .ok_or_else(|| AreaError::NotFound("Service not found".to_string()))?;
    let provider = service
        .oauth_provider
        .ok_or_else(|| AreaError::BadRequest(format!("{} does not use OAuth", service.display_name)))?;
    let oauth_state = query
        .state
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AreaError::BadRequest("Missing OAuth state".to_string()))?;

    let outcome = state
        .oauth
        .complete_authorization(Callback {
            provider: provider.to_string(),
            code: query.code,
            state: oauth_state,
            flow: query.flow,
            caller: Some(session.user_id),
        })
        .await?;
    match outcome {
        area_oauth::AuthorizationOutcome::Connect { account } => Ok(Json(connected(&state, account))),
        area_oauth::AuthorizationOutcome::Login { .. } => {
            Err(AreaError::BadRequest("OAuth state was not issued for a connect flow".to_string()).into())
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Success {
    pub success: bool,
}

pub async fn disconnect(
    State(state): State<GatewayState>,
    Extension(session): Extension<Session>,
    Path(service_id): Path<i64>,
) -> ApiResult<Json<Success>> {
    let account = active_account(&state, session.user_id, service_id).await?;
    if !accounts::disconnect_account(&state.db, session.user_id, account.id).await? {
        return Err(not_connected().into());
    }
    info!(user_id = session.user_id, service_id, account_id = account.id, "service disconnected");
    Ok(Json(Success { success: true }))
}

#[derive(Debug, Serialize)]
pub struct Refreshed {
    pub success: bool,
    pub service_account_id: i64,
}

/// Force a token refresh for the caller's account on a service.
pub async fn refresh(
    State(state): State<GatewayState>,
    Extension(session): Extension<Session>,
    Path(service_id): Path<i64>,
) -> ApiResult<Json<Refreshed>> {
    let account = active_account(&state, session.user_id, service_id).await?;
    state.vault.refresh_account(account.id, Utc::now()).await?;
    Ok(Json(Refreshed {
        success: true,
        service_account_id: account.id,
    }))
}

/// Refresh every credential close to expiry.
pub async fn refresh_expired(State(state): State<GatewayState>) -> ApiResult<Json<RefreshStats>> {
    let stats = state.vault.batch_refresh_expired(Utc::now()).await?;
    info!(total = stats.total, success = stats.success, failed = stats.failed, "manual refresh sweep");
    Ok(Json(stats))
}

async fn active_account(
    state: &GatewayState,
    user_id: i64,
    service_id: i64,
) -> Result<ServiceAccount, AreaError> {
    if state.catalog.service(service_id).is_none() {
        return Err(AreaError::NotFound("Service not found".to_string()));
    }
    accounts::get_active_account(&state.db, user_id, service_id)
        .await?
        .ok_or_else(not_connected)
}

fn not_connected() -> AreaError {
    AreaError::NotFound("Service account not connected".to_string())
}
