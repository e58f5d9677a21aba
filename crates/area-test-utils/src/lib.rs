// SPDX-FileCopyrightText: 2026 Area Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Area integration tests.
//!
//! Provides mock capabilities and a test harness for fast, deterministic
//! tests without provider APIs.
//!
//! # Components
//!
//! - [`MockOAuthProvider`] - Scripted OAuth provider with call counters
//! - [`MockPoller`] / [`MockExecutor`] - In-process action and reaction
//! - [`TestHarness`] - Temp database, vault, registry, OAuth gateway, evaluator

pub mod harness;
pub mod mock_capability;
pub mod mock_provider;

pub use harness::{
    MOCK_ACTION, MOCK_PROVIDER, MOCK_REACTION, MOCK_SERVICE, MOCK_SERVICE_ID, TestHarness,
    TestHarnessBuilder, mock_provider_config, params,
};
pub use mock_capability::{MockExecutor, MockPoller};
pub use mock_provider::{MockOAuthProvider, token_set};
