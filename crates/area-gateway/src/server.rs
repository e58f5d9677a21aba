// SPDX-FileCopyrightText: 2026 Area Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state for the API.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use area_config::{AuthConfig, ServerConfig, WebhookConfig};
use area_core::AreaError;
use area_engine::Engine;
use area_oauth::OAuthGateway;
use area_registry::ServiceRegistry;
use area_storage::Database;
use area_vault::CredentialVault;
use axum::routing::{get, post};
use axum::{Router, middleware as axum_middleware};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{SessionKeys, require_admin, require_session};
use crate::handlers::{areas, meta, oauth, services, users, webhooks};

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub db: Database,
    pub catalog: Arc<ServiceRegistry>,
    pub oauth: Arc<OAuthGateway>,
    pub vault: Arc<CredentialVault>,
    pub sessions: SessionKeys,
    /// Bearer token for `/admin` routes. `None` rejects them.
    pub admin_token: Option<Arc<str>>,
    /// Receives pushed provider events. `None` rejects webhook deliveries.
    pub engine: Option<Arc<Engine>>,
    /// Key GitHub signs webhook deliveries with.
    pub github_webhook_secret: Option<Arc<str>>,
}

impl std::fmt::Debug for GatewayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayState")
            .field("catalog", &self.catalog)
            .field("sessions", &self.sessions)
            .field("admin_token", &self.admin_token.as_ref().map(|_| "[redacted]"))
            .field("engine", &self.engine)
            .field(
                "github_webhook_secret",
                &self.github_webhook_secret.as_ref().map(|_| "[redacted]"),
            )
            .finish_non_exhaustive()
    }
}

impl GatewayState {
    /// Assemble the state. Fails when no session secret is configured.
    pub fn new(
        db: Database,
        catalog: Arc<ServiceRegistry>,
        oauth: Arc<OAuthGateway>,
        vault: Arc<CredentialVault>,
        auth: &AuthConfig,
    ) -> Result<Self, AreaError> {
        let secret = auth
            .jwt_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AreaError::Config("auth.jwt_secret is required to serve".to_string()))?;
        Ok(Self {
            db,
            catalog,
            oauth,
            vault,
            sessions: SessionKeys::new(secret.as_bytes(), Duration::from_secs(auth.session_ttl_secs)),
            admin_token: auth.admin_token.as_deref().filter(|t| !t.is_empty()).map(Arc::from),
            engine: None,
            github_webhook_secret: None,
        })
    }

    /// Accept provider webhooks, routing their events through `engine`.
    pub fn with_webhooks(mut self, engine: Arc<Engine>, config: &WebhookConfig) -> Self {
        self.engine = Some(engine);
        self.github_webhook_secret = config
            .github_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(Arc::from);
        self
    }
}

/// All routes with their middleware.
pub fn router(state: GatewayState) -> Router {
    // Unauthenticated routes. The OAuth routes read an optional session themselves;
    // webhook deliveries are authenticated by their signature.
    let public_routes = Router::new()
        .route("/health", get(meta::health))
        .route("/about.json", get(meta::about))
        .route("/user/register", post(users::register))
        .route("/user/login", post(users::login))
        .route("/auth/providers", get(oauth::providers))
        .route("/auth/callback/{provider}", get(oauth::callback))
        .route("/oauth/authorize/{provider}/{flow}", get(oauth::authorize))
        .route("/oauth/config/{provider}/{flow}", get(oauth::public_config))
        .route("/services", get(services::list))
        .route("/services/", get(services::list))
        .route("/services/{service}/capabilities", get(services::capabilities))
        .route("/webhooks/github", get(webhooks::github_challenge).post(webhooks::github))
        .with_state(state.clone());

    // Routes requiring a session.
    let api_routes = Router::new()
        .route("/user/me", get(users::me).delete(users::delete_me))
        .route("/my/services", get(services::mine))
        .route("/services/{service}/connect", post(services::connect))
        .route("/services/{service}/disconnect", axum::routing::delete(services::disconnect))
        .route("/services/{service}/refresh", post(services::refresh))
        .route("/areas", get(areas::list).post(areas::create))
        .route("/areas/", get(areas::list).post(areas::create))
        .route(
            "/areas/{id}",
            get(areas::get).patch(areas::update).delete(areas::delete),
        )
        .route("/areas/{id}/toggle", post(areas::toggle))
        .route("/areas/{id}/deliveries", get(areas::deliveries))
        .route_layer(axum_middleware::from_fn_with_state(state.clone(), require_session))
        .with_state(state.clone());

    let admin_routes = Router::new()
        .route("/admin/refresh-expired-tokens", post(services::refresh_expired))
        .route_layer(axum_middleware::from_fn_with_state(state.clone(), require_admin))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .merge(admin_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Serve the API until `cancel` fires, then finish in-flight requests.
pub async fn start_server(
    config: &ServerConfig,
    state: GatewayState,
    cancel: CancellationToken,
) -> Result<(), AreaError> {
    let app = router(state);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AreaError::Config(format!("failed to bind API to {addr}: {e}")))?;

    tracing::info!("API server listening on {addr}");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .map_err(|e| AreaError::Internal(format!("API server error: {e}")))?;

    tracing::info!("API server stopped");
    Ok(())
}
