// SPDX-FileCopyrightText: 2026 Area Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock action poller and reaction executor.

use std::collections::VecDeque;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use area_core::{
    ActionPoller, AreaError, Params, PollContext, PollOutcome, ReactionContext, ReactionExecutor,
    TriggerEvent,
};

/// An upstream feed of numbered events.
///
/// The watermark is the highest event number seen. Like a real poller, the
/// first poll only records the current position.
#[derive(Default)]
pub struct MockPoller {
    feed: Mutex<Vec<Value>>,
    failures: Mutex<VecDeque<AreaError>>,
    tokens: Mutex<Vec<Option<String>>>,
}

impl MockPoller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event upstream. Its id is its 1-based position.
    pub async fn push_event(&self, data: Value) -> String {
        let mut feed = self.feed.lock().await;
        feed.push(data);
        feed.len().to_string()
    }

    /// Make the next poll fail with `error`.
    pub async fn fail_next(&self, error: AreaError) {
        self.failures.lock().await.push_back(error);
    }

    /// Access tokens presented to each poll, in order.
    pub async fn tokens(&self) -> Vec<Option<String>> {
        self.tokens.lock().await.clone()
    }

    pub async fn polls(&self) -> usize {
        self.tokens.lock().await.len()
    }
}

#[async_trait]
impl ActionPoller for MockPoller {
    async fn poll(&self, ctx: PollContext<'_>) -> Result<PollOutcome, AreaError> {
        self.tokens.lock().await.push(ctx.access_token.map(str::to_string));
        if let Some(error) = self.failures.lock().await.pop_front() {
            return Err(error);
        }

        let feed = self.feed.lock().await;
        let head = feed.len();
        let Some(seen) = ctx.watermark.and_then(|w| w.parse::<usize>().ok()) else {
            return Ok(PollOutcome::quiet(Some(head.to_string())));
        };
        let events = feed
            .iter()
            .enumerate()
            .skip(seen)
            .map(|(index, data)| {
                let id = (index + 1).to_string();
                let mut data = data.clone();
                if let Value::Object(map) = &mut data {
                    map.entry("id").or_insert_with(|| Value::String(id.clone()));
                }
                TriggerEvent { id, data }
            })
            .collect();
        Ok(PollOutcome {
            events,
            watermark: Some(head.to_string()),
        })
    }

    fn min_interval_secs(&self) -> u64 {
        0
    }
}

/// Records every invocation; fails with scripted errors first.
#[derive(Default)]
pub struct MockExecutor {
    calls: Mutex<Vec<(Option<String>, Params)>>,
    failures: Mutex<VecDeque<AreaError>>,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next invocation fail with `error`.
    pub async fn fail_next(&self, error: AreaError) {
        self.failures.lock().await.push_back(error);
    }

    /// Expanded params of every invocation, including failed ones.
    pub async fn calls(&self) -> Vec<Params> {
        self.calls.lock().await.iter().map(|(_, p)| p.clone()).collect()
    }

    /// Access tokens presented to each invocation.
    pub async fn tokens(&self) -> Vec<Option<String>> {
        self.calls.lock().await.iter().map(|(t, _)| t.clone()).collect()
    }
}

#[async_trait]
impl ReactionExecutor for MockExecutor {
    async fn execute(&self, ctx: ReactionContext<'_>) -> Result<(), AreaError> {
        self.calls
            .lock()
            .await
            .push((ctx.access_token.map(str::to_string), ctx.params.clone()));
        match self.failures.lock().await.pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn ctx<'a>(params: &'a Params, watermark: Option<&'a str>) -> PollContext<'a> {
        PollContext {
            access_token: Some("token"),
            params,
            watermark,
            now: Utc::now(),
        }
    }

    #[tokio::test]
    async fn first_poll_only_records_position() {
        let poller = MockPoller::new();
        let params = Params::new();
        poller.push_event(json!({"title": "old"})).await;

        let first = poller.poll(ctx(&params, None)).await.unwrap();
        assert!(first.events.is_empty());
        assert_eq!(first.watermark.as_deref(), Some("1"));

        poller.push_event(json!({"title": "new"})).await;
        let second = poller.poll(ctx(&params, Some("1"))).await.unwrap();
        assert_eq!(second.events.len(), 1);
        assert_eq!(second.events[0].data["title"], json!("new"));
        assert_eq!(second.events[0].data["id"], json!("2"));

        // Same watermark, same answer.
        let again = poller.poll(ctx(&params, Some("1"))).await.unwrap();
        assert_eq!(again, second);
    }

    #[tokio::test]
    async fn executor_fails_then_succeeds() {
        let executor = MockExecutor::new();
        executor
            .fail_next(AreaError::TransientProvider("502".into()))
            .await;
        let params = Params::new();
        let ctx = ReactionContext {
            access_token: None,
            params: &params,
        };
        assert!(executor.execute(ctx).await.is_err());
        assert!(executor.execute(ctx).await.is_ok());
        assert_eq!(executor.calls().await.len(), 2);
    }
}
