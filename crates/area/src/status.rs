// SPDX-FileCopyrightText: 2026 Area Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `area status` command implementation.
//!
//! Calls the health endpoint of a running server. Reports "not running"
//! instead of failing when nothing answers.

use std::time::Duration;

use area_config::AreaConfig;
use area_core::AreaError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
}

/// Structured status output for `--json` mode.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub running: bool,
    pub status: String,
    pub endpoint: String,
}

pub async fn run_status(config: &AreaConfig, json: bool) -> Result<(), AreaError> {
    let endpoint = format!("http://{}:{}/health", config.server.host, config.server.port);
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(3))
        .build()
        .map_err(|e| AreaError::Internal(format!("failed to create HTTP client: {e}")))?;

    let response = match client.get(&endpoint).send().await {
        Ok(resp) if resp.status().is_success() => {
            let health: HealthResponse = resp
                .json()
                .await
                .map_err(|e| AreaError::Internal(format!("failed to parse health response: {e}")))?;
            StatusResponse {
                running: true,
                status: health.status,
                endpoint,
            }
        }
        _ => StatusResponse {
            running: false,
            status: "not running".to_string(),
            endpoint,
        },
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&response).unwrap_or_else(|_| "{}".to_string())
        );
    } else if response.running {
        println!("area: {} ({})", response.status, response.endpoint);
    } else {
        println!("area: not running ({})", response.endpoint);
        println!("Start with: area serve");
    }
    Ok(())
}
