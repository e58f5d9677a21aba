// SPDX-FileCopyrightText: 2026 Area Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Area CRUD for the signed-in user.
//!
//! Areas owned by someone else answer 404, the same as missing ones.

use area_core::{AreaError, AreaStatus, Params};
use area_registry::{CapabilityDef, ServiceDef};
use area_storage::queries::deliveries::list_deliveries;
use area_storage::queries::{accounts, areas};
use area_storage::{Area, AreaPatch, Delivery, NewArea};
use axum::Extension;
use axum::extract::State;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::ApiResult;
use crate::auth::Session;
use crate::extract::{Json, Path, Query};
use crate::server::GatewayState;

const DEFAULT_DELIVERY_LIMIT: usize = 50;
const MAX_DELIVERY_LIMIT: usize = 200;

#[derive(Debug, Serialize)]
pub struct CapabilityRef {
    pub service_id: i64,
    pub service: &'static str,
    pub id: i64,
    pub key: &'static str,
    pub name: &'static str,
}

impl CapabilityRef {
    fn new(service: &ServiceDef, capability: &CapabilityDef) -> Self {
        Self {
            service_id: service.id,
            service: service.name,
            id: capability.id,
            key: capability.key,
            name: capability.name,
        }
    }
}

/// An Area with the names of its action and reaction resolved.
#[derive(Debug, Serialize)]
pub struct AreaView {
    #[serde(flatten)]
    pub area: Area,
    pub action: Option<CapabilityRef>,
    pub reaction: Option<CapabilityRef>,
}

impl AreaView {
    fn new(state: &GatewayState, area: Area) -> Self {
        let action = state
            .catalog
            .action(area.action_id)
            .map(|(s, c)| CapabilityRef::new(s, c));
        let reaction = state
            .catalog
            .reaction(area.reaction_id)
            .map(|(s, c)| CapabilityRef::new(s, c));
        Self { area, action, reaction }
    }
}

fn area_not_found() -> AreaError {
    AreaError::NotFound("Area not found".to_string())
}

pub async fn list(
    State(state): State<GatewayState>,
    Extension(session): Extension<Session>,
) -> ApiResult<Json<Vec<AreaView>>> {
    let owned = areas::list_areas_for_user(&state.db, session.user_id).await?;
    Ok(Json(owned.into_iter().map(|a| AreaView::new(&state, a)).collect()))
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct CreateArea {
    #[serde(default)]
    pub name: Option<String>,
    pub action_service_id: i64,
    pub action_id: i64,
    pub reaction_service_id: i64,
    pub reaction_id: i64,
    #[serde(default)]
    pub action_parameters: Params,
    #[serde(default)]
    pub reaction_parameters: Params,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

/// The user must hold an active account on every service that needs one.
async fn require_account(state: &GatewayState, user_id: i64, service_id: i64) -> Result<(), AreaError> {
    let Some(service) = state.catalog.service(service_id) else {
        return Err(AreaError::BadRequest("Unknown service".to_string()));
    };
    if !service.requires_account() {
        return Ok(());
    }
    match accounts::get_active_account(&state.db, user_id, service_id).await? {
        Some(_) => Ok(()),
        None => Err(AreaError::ServiceAccountNotConnected {
            service: service.display_name.to_string(),
        }),
    }
}

pub async fn create(
    State(state): State<GatewayState>,
    Extension(session): Extension<Session>,
    Json(body): Json<CreateArea>,
) -> ApiResult<(StatusCode, Json<AreaView>)> {
    let action = *state
        .catalog
        .validate_action(body.action_service_id, body.action_id, &body.action_parameters)?;
    let reaction = *state.catalog.validate_reaction(
        body.reaction_service_id,
        body.reaction_id,
        &body.reaction_parameters,
    )?;
    require_account(&state, session.user_id, body.action_service_id).await?;
    require_account(&state, session.user_id, body.reaction_service_id).await?;

    let name = body
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| format!("{} → {}", action.name, reaction.name));
    let status = if body.is_active {
        AreaStatus::Active
    } else {
        AreaStatus::Inactive
    };
    let area = areas::create_area(
        &state.db,
        &NewArea {
            user_id: session.user_id,
            name,
            action_service_id: body.action_service_id,
            action_id: body.action_id,
            params_action: body.action_parameters,
            reaction_service_id: body.reaction_service_id,
            reaction_id: body.reaction_id,
            params_reaction: body.reaction_parameters,
            status,
        },
    )
    .await?;
    info!(user_id = session.user_id, area_id = area.id, "area created");
    Ok((StatusCode::CREATED, Json(AreaView::new(&state, area))))
}

pub async fn get(
    State(state): State<GatewayState>,
    Extension(session): Extension<Session>,
    Path(id): Path<i64>,
) -> ApiResult<Json<AreaView>> {
    let area = areas::get_area_for_user(&state.db, session.user_id, id)
        .await?
        .ok_or_else(area_not_found)?;
    Ok(Json(AreaView::new(&state, area)))
}

#[derive(Debug, Deserialize)]
pub struct UpdateArea {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub action_parameters: Option<Params>,
    #[serde(default)]
    pub reaction_parameters: Option<Params>,
}

/// Rename an Area or replace its parameters. The action and reaction
/// themselves cannot change; a new Area is needed for that.
pub async fn update(
    State(state): State<GatewayState>,
    Extension(session): Extension<Session>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateArea>,
) -> ApiResult<Json<AreaView>> {
    let current = areas::get_area_for_user(&state.db, session.user_id, id)
        .await?
        .ok_or_else(area_not_found)?;
    if let Some(params) = &body.action_parameters {
        state
            .catalog
            .validate_action(current.action_service_id, current.action_id, params)?;
    }
    if let Some(params) = &body.reaction_parameters {
        state
            .catalog
            .validate_reaction(current.reaction_service_id, current.reaction_id, params)?;
    }
    let name = match body.name.map(|n| n.trim().to_string()) {
        Some(n) if n.is_empty() => return Err(AreaError::BadRequest("Name cannot be empty".to_string()).into()),
        other => other,
    };
    let patch = AreaPatch {
        name,
        params_action: body.action_parameters,
        params_reaction: body.reaction_parameters,
    };
    let area = areas::update_area(&state.db, session.user_id, id, &patch)
        .await?
        .ok_or_else(area_not_found)?;
    Ok(Json(AreaView::new(&state, area)))
}

/// Flip between active and inactive. A suspended Area becomes active again
/// with its failure counter cleared. Activating requires every service the
/// Area uses to still be connected.
pub async fn toggle(
    State(state): State<GatewayState>,
    Extension(session): Extension<Session>,
    Path(id): Path<i64>,
) -> ApiResult<Json<AreaView>> {
    let current = areas::get_area_for_user(&state.db, session.user_id, id)
        .await?
        .ok_or_else(area_not_found)?;
    let next = match current.status {
        AreaStatus::Active => AreaStatus::Inactive,
        AreaStatus::Inactive | AreaStatus::Suspended => AreaStatus::Active,
    };
    if next == AreaStatus::Active {
        require_account(&state, session.user_id, current.action_service_id).await?;
        require_account(&state, session.user_id, current.reaction_service_id).await?;
    }
    let area = areas::set_area_status(&state.db, session.user_id, id, next)
        .await?
        .ok_or_else(area_not_found)?;
    info!(area_id = id, status = %next, "area toggled");
    Ok(Json(AreaView::new(&state, area)))
}

pub async fn delete(
    State(state): State<GatewayState>,
    Extension(session): Extension<Session>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    if !areas::delete_area(&state.db, session.user_id, id).await? {
        return Err(area_not_found().into());
    }
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct DeliveryQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

pub async fn deliveries(
    State(state): State<GatewayState>,
    Extension(session): Extension<Session>,
    Path(id): Path<i64>,
    Query(query): Query<DeliveryQuery>,
) -> ApiResult<Json<Vec<Delivery>>> {
    areas::get_area_for_user(&state.db, session.user_id, id)
        .await?
        .ok_or_else(area_not_found)?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_DELIVERY_LIMIT)
        .clamp(1, MAX_DELIVERY_LIMIT);
    Ok(Json(list_deliveries(&state.db, id, limit).await?))
}
