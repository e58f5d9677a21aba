// SPDX-FileCopyrightText: 2026 Area Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Concurrent token access through the vault.

use std::time::Duration;

use area_core::{AreaError, TokenState};
use area_test_utils::{MOCK_SERVICE_ID, TestHarness, token_set};
use chrono::Utc;
use futures::future::join_all;
use secrecy::ExposeSecret;

#[tokio::test]
async fn concurrent_callers_share_one_refresh() {
    let h = TestHarness::builder()
        .with_provider_delay(Duration::from_millis(50))
        .build()
        .await
        .unwrap();
    let user = h.create_user("race@example.com").await.unwrap();
    let mut tokens = token_set("expired", Some("refresh"));
    tokens.expires_in = Some(0);
    let account = h.connect(user.id, MOCK_SERVICE_ID, &tokens).await.unwrap();

    let results = join_all((0..8).map(|_| h.vault.get_valid_token(account.id))).await;

    assert_eq!(h.provider.refresh_calls(), 1);
    for result in results {
        assert_eq!(result.unwrap().expose_secret(), "mock-refreshed-1");
    }
    let state = h.vault.token_state(account.id, Utc::now()).await.unwrap();
    assert_eq!(state, TokenState::Valid);
}

#[tokio::test]
async fn sweep_refreshes_expiring_tokens_and_counts_failures() {
    let h = TestHarness::builder().build().await.unwrap();
    let first = h.create_user("one@example.com").await.unwrap();
    let second = h.create_user("two@example.com").await.unwrap();
    let mut soon = token_set("soon", Some("refresh"));
    soon.expires_in = Some(30);
    h.connect(first.id, MOCK_SERVICE_ID, &soon).await.unwrap();
    h.connect(second.id, MOCK_SERVICE_ID, &soon).await.unwrap();
    h.provider
        .push_refresh(Err(AreaError::TransientProvider("503".into())))
        .await;

    let stats = h.vault.batch_refresh_expired(Utc::now()).await.unwrap();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.success, 1);
    assert_eq!(stats.failed, 1);
}
