// SPDX-FileCopyrightText: 2026 Area Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Capability traits at the seams between the broker and third-party providers.
//!
//! All traits use `#[async_trait]` so implementations can be stored as
//! `Arc<dyn Trait>` in registries.

pub mod executor;
pub mod poller;
pub mod provider;

pub use executor::{ReactionContext, ReactionExecutor};
pub use poller::{ActionPoller, PollContext};
pub use provider::{ExchangeRequest, OAuthProvider};
