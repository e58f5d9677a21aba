// SPDX-FileCopyrightText: 2026 Area Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! OAuth2 support for the Area automation broker.
//!
//! [`ProviderRegistry`] turns the `[oauth.providers]` table into
//! [`OAuthProvider`](area_core::OAuthProvider) clients. [`OAuthGateway`]
//! runs the authorization-code flow for both signing in and connecting
//! service accounts.

pub mod client;
pub mod flow;
pub mod pkce;
pub mod providers;

pub use client::HttpOAuthProvider;
pub use flow::{AuthorizationOutcome, AuthorizationStart, Callback, OAuthGateway};
pub use providers::{FlowAvailability, ProviderDescriptor, ProviderRegistry, PublicFlowConfig};
