// SPDX-FileCopyrightText: 2026 Area Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gmail capabilities.
//!
//! Message ids carry no order, so the new-email watermark is the highest
//! `internalDate` (epoch milliseconds) seen so far.

use std::time::Duration;

use area_core::{
    ActionPoller, AreaError, PollContext, PollOutcome, ReactionContext, ReactionExecutor,
    TriggerEvent,
};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::{Value, json};

use crate::http::{self, HttpSettings};

const SERVICE: &str = "google";
const PAGE_SIZE: &str = "20";

#[derive(Debug, Clone)]
pub struct GmailApi {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl GmailApi {
    pub fn new(client: reqwest::Client, settings: &HttpSettings) -> Self {
        Self {
            client,
            base_url: settings.gmail_api.trim_end_matches('/').to_string(),
            timeout: settings.timeout,
        }
    }

    async fn get(&self, path: &str, token: &str, query: &[(&str, &str)]) -> Result<Value, AreaError> {
        let request = self
            .client
            .get(format!("{}/gmail/v1/users/me{path}", self.base_url))
            .bearer_auth(token)
            .query(query);
        http::send_json(SERVICE, self.timeout, request).await
    }
}

fn header<'a>(message: &'a Value, name: &str) -> Option<&'a str> {
    message["payload"]["headers"]
        .as_array()?
        .iter()
        .find(|h| h["name"].as_str().is_some_and(|n| n.eq_ignore_ascii_case(name)))?["value"]
        .as_str()
}

fn internal_date(message: &Value) -> i64 {
    match &message["internalDate"] {
        Value::String(s) => s.parse().unwrap_or(0),
        other => other.as_i64().unwrap_or(0),
    }
}

/// `google.gmail_new_email`.
#[derive(Debug, Clone)]
pub struct NewEmailPoller {
    api: GmailApi,
}

impl NewEmailPoller {
    pub fn new(api: GmailApi) -> Self {
        Self { api }
    }
}

#[async_trait]
impl ActionPoller for NewEmailPoller {
    async fn poll(&self, ctx: PollContext<'_>) -> Result<PollOutcome, AreaError> {
        let token = http::require_token(SERVICE, ctx.access_token)?;
        let query = ctx.params.get("query").and_then(Value::as_str).unwrap_or("");
        let listing = self
            .api
            .get("/messages", token, &[("q", query), ("maxResults", PAGE_SIZE)])
            .await?;
        let ids: Vec<&str> = listing["messages"]
            .as_array()
            .map(|ms| ms.iter().filter_map(|m| m["id"].as_str()).collect())
            .unwrap_or_default();

        let cursor = match ctx.watermark {
            Some(raw) => raw
                .parse::<i64>()
                .map_err(|_| AreaError::InvariantViolation(format!("corrupt gmail watermark `{raw}`")))?,
            None => {
                // Listing is newest first; its head fixes the starting point.
                let newest = match ids.first() {
                    Some(id) => internal_date(&self.metadata(token, id).await?),
                    None => 0,
                };
                return Ok(PollOutcome::quiet(Some(newest.to_string())));
            }
        };

        let mut events = Vec::new();
        let mut highest = cursor;
        for id in ids {
            let message = self.metadata(token, id).await?;
            let received = internal_date(&message);
            if received <= cursor {
                break;
            }
            highest = highest.max(received);
            events.push(TriggerEvent {
                id: id.to_string(),
                data: json!({
                    "id": id,
                    "thread_id": message["threadId"],
                    "from": header(&message, "From"),
                    "to": header(&message, "To"),
                    "subject": header(&message, "Subject"),
                    "snippet": message["snippet"],
                    "received_at": received,
                }),
            });
        }
        events.reverse();
        Ok(PollOutcome {
            events,
            watermark: (highest > cursor).then(|| highest.to_string()),
        })
    }
}

impl NewEmailPoller {
    async fn metadata(&self, token: &str, id: &str) -> Result<Value, AreaError> {
        self.api
            .get(
                &format!("/messages/{id}"),
                token,
                &[
                    ("format", "metadata"),
                    ("metadataHeaders", "From"),
                    ("metadataHeaders", "To"),
                    ("metadataHeaders", "Subject"),
                ],
            )
            .await
    }
}

/// `google.gmail_send_email`.
#[derive(Debug, Clone)]
pub struct SendEmailExecutor {
    api: GmailApi,
}

impl SendEmailExecutor {
    pub fn new(api: GmailApi) -> Self {
        Self { api }
    }
}

/// Render a minimal RFC 5322 plain-text message.
fn rfc5322(to: &str, subject: &str, body: &str) -> String {
    format!(
        "To: {to}\r\nSubject: {subject}\r\nMIME-Version: 1.0\r\nContent-Type: text/plain; charset=\"UTF-8\"\r\n\r\n{body}"
    )
}

#[async_trait]
impl ReactionExecutor for SendEmailExecutor {
    async fn execute(&self, ctx: ReactionContext<'_>) -> Result<(), AreaError> {
        let token = http::require_token(SERVICE, ctx.access_token)?;
        let field = |name: &str| ctx.params.get(name).and_then(Value::as_str).unwrap_or("");
        let to = field("to");
        if to.is_empty() {
            return Err(AreaError::InvalidParameters("missing required parameter `to`".into()));
        }
        // Header injection guard: the subject is user-templated.
        let subject = field("subject").replace(['\r', '\n'], " ");
        let raw = URL_SAFE_NO_PAD.encode(rfc5322(to, &subject, field("body")));

        let request = self
            .api
            .client
            .post(format!("{}/gmail/v1/users/me/messages/send", self.api.base_url))
            .bearer_auth(token)
            .json(&json!({ "raw": raw }));
        http::send_json(SERVICE, self.api.timeout, request).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use area_core::Params;
    use chrono::Utc;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn api(server: &MockServer) -> GmailApi {
        let settings = HttpSettings {
            gmail_api: server.uri(),
            ..Default::default()
        };
        GmailApi::new(http::build_client(&settings).unwrap(), &settings)
    }

    async fn mount_message(server: &MockServer, id: &str, date: i64, subject: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/gmail/v1/users/me/messages/{id}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": id,
                "threadId": format!("t-{id}"),
                "internalDate": date.to_string(),
                "snippet": "hello",
                "payload": {"headers": [
                    {"name": "From", "value": "alice@example.com"},
                    {"name": "Subject", "value": subject}
                ]}
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn emails_newer_than_cursor_fire_oldest_first() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gmail/v1/users/me/messages"))
            .and(query_param("q", "from:alice"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "messages": [{"id": "c"}, {"id": "b"}, {"id": "a"}]
            })))
            .mount(&server)
            .await;
        mount_message(&server, "c", 3000, "third").await;
        mount_message(&server, "b", 2000, "second").await;
        mount_message(&server, "a", 1000, "first").await;

        let poller = NewEmailPoller::new(api(&server).await);
        let params: Params = json!({"query": "from:alice"}).as_object().cloned().unwrap();
        let ctx = |watermark| PollContext {
            access_token: Some("ya29.test"),
            params: &params,
            watermark,
            now: Utc::now(),
        };

        let initial = poller.poll(ctx(None)).await.unwrap();
        assert_eq!(initial, PollOutcome::quiet(Some("3000".into())));

        let outcome = poller.poll(ctx(Some("1000"))).await.unwrap();
        let ids: Vec<_> = outcome.events.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["b", "c"]);
        assert_eq!(outcome.events[1].data["subject"], json!("third"));
        assert_eq!(outcome.watermark.as_deref(), Some("3000"));
    }

    #[test]
    fn message_is_base64url_without_padding() {
        let raw = URL_SAFE_NO_PAD.encode(rfc5322("bob@example.com", "Hi", "Body"));
        assert!(!raw.contains('='));
        let decoded = String::from_utf8(URL_SAFE_NO_PAD.decode(raw).unwrap()).unwrap();
        assert!(decoded.starts_with("To: bob@example.com\r\nSubject: Hi\r\n"));
        assert!(decoded.ends_with("\r\n\r\nBody"));
    }
}
