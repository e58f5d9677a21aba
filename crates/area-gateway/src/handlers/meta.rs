// SPDX-FileCopyrightText: 2026 Area Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! GET /health and GET /about.json.

use std::net::SocketAddr;

use area_registry::CapabilityDef;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::HOST;
use chrono::Utc;
use serde::Serialize;
use serde_json::{Value, json};

use crate::extract::Json;
use crate::server::GatewayState;

pub async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

#[derive(Debug, Serialize)]
pub struct About {
    pub client: AboutClient,
    pub server: AboutServer,
}

#[derive(Debug, Serialize)]
pub struct AboutClient {
    pub host: String,
}

#[derive(Debug, Serialize)]
pub struct AboutServer {
    pub current_time: i64,
    pub services: Vec<AboutService>,
}

#[derive(Debug, Serialize)]
pub struct AboutService {
    pub name: &'static str,
    pub actions: Vec<AboutCapability>,
    pub reactions: Vec<AboutCapability>,
}

#[derive(Debug, Serialize)]
pub struct AboutCapability {
    pub name: &'static str,
    pub description: &'static str,
}

fn capabilities(defs: &[CapabilityDef]) -> Vec<AboutCapability> {
    defs.iter()
        .map(|c| AboutCapability {
            name: c.key,
            description: c.description,
        })
        .collect()
}

/// The client address as seen by the server, then the Host header.
fn client_host(request: &Request) -> String {
    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip().to_string();
    }
    request
        .headers()
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

pub async fn about(State(state): State<GatewayState>, request: Request) -> Json<About> {
    let services = state
        .catalog
        .services()
        .iter()
        .map(|s| AboutService {
            name: s.name,
            actions: capabilities(s.actions),
            reactions: capabilities(s.reactions),
        })
        .collect();
    Json(About {
        client: AboutClient {
            host: client_host(&request),
        },
        server: AboutServer {
            current_time: Utc::now().timestamp(),
            services,
        },
    })
}
