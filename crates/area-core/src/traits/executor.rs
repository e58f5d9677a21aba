// SPDX-FileCopyrightText: 2026 Area Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reaction invocation.

use async_trait::async_trait;

use crate::error::AreaError;
use crate::types::Params;

/// Inputs of one reaction invocation. Parameters are already template-expanded.
#[derive(Clone, Copy)]
pub struct ReactionContext<'a> {
    /// Token of the reaction's service account. `None` for services without OAuth.
    pub access_token: Option<&'a str>,
    pub params: &'a Params,
}

/// Performs the effect of a reaction against a provider.
#[async_trait]
pub trait ReactionExecutor: Send + Sync + 'static {
    async fn execute(&self, ctx: ReactionContext<'_>) -> Result<(), AreaError>;
}
