// SPDX-FileCopyrightText: 2026 Area Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Registration, password login, and the current user.

use area_core::AreaError;
use area_storage::User;
use area_storage::queries::users;
use axum::Extension;
use axum::extract::State;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use super::ApiResult;
use crate::auth::Session;
use crate::extract::{Form, Json};
use crate::password;
use crate::server::GatewayState;

/// Form body of register and login. `username` is the email address.
#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
}

impl TokenResponse {
    pub fn issue(state: &GatewayState, user: &User) -> Result<Self, AreaError> {
        Ok(Self {
            access_token: state.sessions.issue(user)?,
            token_type: "bearer",
        })
    }
}

fn normalize_email(raw: &str) -> Result<String, AreaError> {
    let email = raw.trim().to_lowercase();
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if valid {
        Ok(email)
    } else {
        Err(AreaError::BadRequest("A valid email address is required".to_string()))
    }
}

pub async fn register(
    State(state): State<GatewayState>,
    Form(form): Form<Credentials>,
) -> ApiResult<(StatusCode, Json<TokenResponse>)> {
    let email = normalize_email(&form.username)?;
    password::validate_password(&form.password)?;
    let hash = password::hash_password_blocking(form.password).await?;
    let name = form.name.as_deref().map(str::trim).filter(|n| !n.is_empty());
    let user = users::create_user(&state.db, &email, name, Some(&hash)).await?;
    tracing::info!(user_id = user.id, "user registered");
    Ok((StatusCode::CREATED, Json(TokenResponse::issue(&state, &user)?)))
}

pub async fn login(
    State(state): State<GatewayState>,
    Form(form): Form<Credentials>,
) -> ApiResult<Json<TokenResponse>> {
    let rejected = || AreaError::Unauthorized("Invalid email or password".to_string());
    let email = form.username.trim().to_lowercase();
    let user = users::get_user_by_email(&state.db, &email)
        .await?
        .ok_or_else(rejected)?;
    // Accounts created through OAuth have no password.
    let hash = user.password_hash.clone().ok_or_else(rejected)?;
    if !password::verify_password_blocking(form.password, hash).await? {
        tracing::debug!(user_id = user.id, "password login rejected");
        return Err(rejected().into());
    }
    Ok(Json(TokenResponse::issue(&state, &user)?))
}

pub async fn me(
    State(state): State<GatewayState>,
    Extension(session): Extension<Session>,
) -> ApiResult<Json<User>> {
    let user = users::get_user(&state.db, session.user_id)
        .await?
        .ok_or_else(|| AreaError::NotFound("User not found".to_string()))?;
    Ok(Json(user))
}

/// Delete the caller with their accounts, credentials, and Areas.
pub async fn delete_me(
    State(state): State<GatewayState>,
    Extension(session): Extension<Session>,
) -> ApiResult<StatusCode> {
    if !users::delete_user(&state.db, session.user_id).await? {
        return Err(AreaError::NotFound("User not found".to_string()).into());
    }
    tracing::info!(user_id = session.user_id, "user deleted");
    Ok(StatusCode::NO_CONTENT)
}
