// SPDX-FileCopyrightText: 2026 Area Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! OAuth login and connect through the mock provider.

use std::time::Duration;

use area_core::{AreaError, AuthFlow};
use area_oauth::{AuthorizationOutcome, Callback};
use area_storage::queries::users;
use area_test_utils::{MOCK_PROVIDER, MOCK_SERVICE_ID, TestHarness};
use secrecy::ExposeSecret;

fn callback(state: &str, flow: AuthFlow, caller: Option<i64>) -> Callback {
    Callback {
        provider: MOCK_PROVIDER.to_string(),
        code: "code-123".to_string(),
        state: state.to_string(),
        flow: Some(flow),
        caller,
    }
}

#[tokio::test]
async fn login_creates_user_and_connects_the_backing_service() {
    let h = TestHarness::builder().build().await.unwrap();
    let start = h.oauth.begin_authorization(MOCK_PROVIDER, AuthFlow::Web, None).await.unwrap();
    assert!(start.authorization_url.starts_with("https://mock.test/oauth/authorize?"));
    assert!(!start.authorization_url.contains("code_challenge"));

    let outcome = h
        .oauth
        .complete_authorization(callback(&start.state, AuthFlow::Web, None))
        .await
        .unwrap();
    let AuthorizationOutcome::Login { user, created, account } = outcome else {
        panic!("expected a login");
    };
    assert!(created);
    assert_eq!(user.email, "user@mock.test");
    let account = account.unwrap();
    assert_eq!(account.service_id, MOCK_SERVICE_ID);
    let token = h.vault.get_valid_token(account.id).await.unwrap();
    assert_eq!(token.expose_secret(), "mock-access-1");

    let linked = users::find_user_by_link(&h.db, MOCK_PROVIDER, "remote-1").await.unwrap();
    assert_eq!(linked.map(|u| u.id), Some(user.id));

    // A state is redeemable once.
    let replay = h
        .oauth
        .complete_authorization(callback(&start.state, AuthFlow::Web, None))
        .await
        .unwrap_err();
    assert!(matches!(replay, AreaError::UnknownOrExpiredState));
    assert_eq!(h.provider.exchange_calls(), 1);
}

#[tokio::test]
async fn expired_state_is_rejected_before_any_exchange() {
    let h = TestHarness::builder()
        .with_state_ttl(Duration::ZERO)
        .build()
        .await
        .unwrap();
    let start = h.oauth.begin_authorization(MOCK_PROVIDER, AuthFlow::Web, None).await.unwrap();

    let err = h
        .oauth
        .complete_authorization(callback(&start.state, AuthFlow::Web, None))
        .await
        .unwrap_err();
    assert!(matches!(err, AreaError::UnknownOrExpiredState), "{err}");
    assert_eq!(h.provider.exchange_calls(), 0);
    assert!(users::find_user_by_link(&h.db, MOCK_PROVIDER, "remote-1").await.unwrap().is_none());
}

#[tokio::test]
async fn second_login_reuses_the_linked_user() {
    let h = TestHarness::builder().build().await.unwrap();
    let mut ids = Vec::new();
    for _ in 0..2 {
        let start = h.oauth.begin_authorization(MOCK_PROVIDER, AuthFlow::Web, None).await.unwrap();
        match h
            .oauth
            .complete_authorization(callback(&start.state, AuthFlow::Web, None))
            .await
            .unwrap()
        {
            AuthorizationOutcome::Login { user, .. } => ids.push(user.id),
            other => panic!("expected a login, got {other:?}"),
        }
    }
    assert_eq!(ids[0], ids[1]);
}

#[tokio::test]
async fn mobile_connect_sends_the_pkce_verifier() {
    let h = TestHarness::builder().build().await.unwrap();
    let user = h.create_user("owner@example.com").await.unwrap();
    let start = h
        .oauth
        .begin_authorization(MOCK_PROVIDER, AuthFlow::Mobile, Some(user.id))
        .await
        .unwrap();
    assert!(start.authorization_url.contains("code_challenge_method=S256"));

    let outcome = h
        .oauth
        .complete_authorization(callback(&start.state, AuthFlow::Mobile, Some(user.id)))
        .await
        .unwrap();
    let AuthorizationOutcome::Connect { account } = outcome else {
        panic!("expected a connect");
    };
    assert_eq!(account.user_id, user.id);
    let seen = h.provider.seen_exchanges().await;
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].code_verifier.as_ref().map(String::len), Some(43));
    assert_eq!(seen[0].redirect_uri, "https://app.test/mobile/callback");
}

#[tokio::test]
async fn connect_state_cannot_be_redeemed_by_another_user() {
    let h = TestHarness::builder().build().await.unwrap();
    let owner = h.create_user("owner@example.com").await.unwrap();
    let intruder = h.create_user("intruder@example.com").await.unwrap();
    let start = h
        .oauth
        .begin_authorization(MOCK_PROVIDER, AuthFlow::Web, Some(owner.id))
        .await
        .unwrap();

    let err = h
        .oauth
        .complete_authorization(callback(&start.state, AuthFlow::Web, Some(intruder.id)))
        .await
        .unwrap_err();
    assert!(matches!(err, AreaError::Unauthorized(_)));
    assert_eq!(h.provider.exchange_calls(), 0);
}
