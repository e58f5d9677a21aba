// SPDX-FileCopyrightText: 2026 Area Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `discord.send_webhook_message`. The webhook URL is the credential, so no
//! service account is involved.

use std::time::Duration;

use area_core::{AreaError, ReactionContext, ReactionExecutor};
use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::http::{self, HttpSettings};

const SERVICE: &str = "discord";
/// Discord rejects longer message content.
const MAX_CONTENT: usize = 2000;

#[derive(Debug, Clone)]
pub struct WebhookMessageExecutor {
    client: reqwest::Client,
    timeout: Duration,
}

impl WebhookMessageExecutor {
    pub fn new(client: reqwest::Client, settings: &HttpSettings) -> Self {
        Self {
            client,
            timeout: settings.timeout,
        }
    }
}

#[async_trait]
impl ReactionExecutor for WebhookMessageExecutor {
    async fn execute(&self, ctx: ReactionContext<'_>) -> Result<(), AreaError> {
        let url = ctx
            .params
            .get("webhook_url")
            .and_then(Value::as_str)
            .ok_or_else(|| AreaError::InvalidParameters("missing required parameter `webhook_url`".into()))?;

        let mut payload = Map::new();
        let content: String = ctx
            .params
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .chars()
            .take(MAX_CONTENT)
            .collect();
        payload.insert("content".into(), Value::String(content));
        for key in ["username", "avatar_url"] {
            if let Some(value) = ctx.params.get(key).and_then(Value::as_str).filter(|v| !v.is_empty()) {
                payload.insert(key.into(), Value::String(value.to_string()));
            }
        }

        http::send_json(SERVICE, self.timeout, self.client.post(url).json(&payload)).await?;
        Ok(())
    }
}
