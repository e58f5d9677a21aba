// SPDX-FileCopyrightText: 2026 Area Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock OAuth provider for deterministic testing.
//!
//! `MockOAuthProvider` implements [`OAuthProvider`] with scripted results,
//! call counters, and an optional delay, so refresh races and exchange
//! failures can be exercised without a network.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use area_core::{AreaError, ExchangeRequest, OAuthProvider, RemoteIdentity, TokenSet};

/// A mock provider that returns scripted results.
///
/// Results are popped from FIFO queues. When a queue is empty a fresh token
/// set numbered by the call count is returned.
pub struct MockOAuthProvider {
    key: String,
    exchanges: Mutex<VecDeque<Result<TokenSet, AreaError>>>,
    refreshes: Mutex<VecDeque<Result<TokenSet, AreaError>>>,
    identity: Mutex<RemoteIdentity>,
    delay: Duration,
    exchange_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
    seen_exchanges: Mutex<Vec<ExchangeRequest>>,
}

impl MockOAuthProvider {
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            exchanges: Mutex::new(VecDeque::new()),
            refreshes: Mutex::new(VecDeque::new()),
            identity: Mutex::new(RemoteIdentity {
                id: "remote-1".to_string(),
                email: Some(format!("user@{key}.test")),
                name: Some("Mock User".to_string()),
            }),
            delay: Duration::ZERO,
            exchange_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            seen_exchanges: Mutex::new(Vec::new()),
        }
    }

    /// Sleep this long inside every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub async fn set_identity(&self, identity: RemoteIdentity) {
        *self.identity.lock().await = identity;
    }

    pub async fn push_exchange(&self, result: Result<TokenSet, AreaError>) {
        self.exchanges.lock().await.push_back(result);
    }

    pub async fn push_refresh(&self, result: Result<TokenSet, AreaError>) {
        self.refreshes.lock().await.push_back(result);
    }

    pub fn exchange_calls(&self) -> usize {
        self.exchange_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// Exchange requests received so far.
    pub async fn seen_exchanges(&self) -> Vec<ExchangeRequest> {
        self.seen_exchanges.lock().await.clone()
    }

    async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

/// A token set that expires after an hour.
pub fn token_set(access: &str, refresh: Option<&str>) -> TokenSet {
    TokenSet {
        access_token: access.to_string(),
        refresh_token: refresh.map(str::to_string),
        token_type: Some("bearer".to_string()),
        expires_in: Some(3600),
        scope: None,
    }
}

#[async_trait]
impl OAuthProvider for MockOAuthProvider {
    fn key(&self) -> &str {
        &self.key
    }

    async fn exchange_code(&self, request: ExchangeRequest) -> Result<TokenSet, AreaError> {
        let n = self.exchange_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.seen_exchanges.lock().await.push(request);
        self.pause().await;
        self.exchanges.lock().await.pop_front().unwrap_or_else(|| {
            Ok(token_set(
                &format!("{}-access-{n}", self.key),
                Some(&format!("{}-refresh-{n}", self.key)),
            ))
        })
    }

    async fn refresh_token(&self, _refresh_token: &str) -> Result<TokenSet, AreaError> {
        let n = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.pause().await;
        self.refreshes
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Ok(token_set(&format!("{}-refreshed-{n}", self.key), None)))
    }

    async fn fetch_identity(&self, _access_token: &str) -> Result<RemoteIdentity, AreaError> {
        Ok(self.identity.lock().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use area_core::AuthFlow;

    fn request(code: &str) -> ExchangeRequest {
        ExchangeRequest {
            code: code.to_string(),
            redirect_uri: "https://app.test/cb".to_string(),
            code_verifier: None,
            flow: AuthFlow::Web,
        }
    }

    #[tokio::test]
    async fn scripted_results_come_first() {
        let provider = MockOAuthProvider::new("mock");
        provider
            .push_exchange(Err(AreaError::ProviderExchangeFailed("bad_code".into())))
            .await;

        assert!(provider.exchange_code(request("a")).await.is_err());
        let tokens = provider.exchange_code(request("b")).await.unwrap();
        assert_eq!(tokens.access_token, "mock-access-2");
        assert_eq!(provider.exchange_calls(), 2);
        assert_eq!(provider.seen_exchanges().await[1].code, "b");
    }

    #[tokio::test]
    async fn refreshes_are_counted() {
        let provider = MockOAuthProvider::new("mock");
        let first = provider.refresh_token("r").await.unwrap();
        assert_eq!(first.access_token, "mock-refreshed-1");
        assert!(first.refresh_token.is_none());
        assert_eq!(provider.refresh_calls(), 1);
    }
}
