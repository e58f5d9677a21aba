// SPDX-FileCopyrightText: 2026 Area Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! OAuth2 provider capability interface.

use async_trait::async_trait;

use crate::error::AreaError;
use crate::types::{AuthFlow, RemoteIdentity, TokenSet};

/// Inputs for an authorization-code exchange.
#[derive(Debug, Clone)]
pub struct ExchangeRequest {
    pub code: String,
    pub redirect_uri: String,
    /// PKCE verifier recorded alongside the OAuth state, if the flow uses PKCE.
    pub code_verifier: Option<String>,
    pub flow: AuthFlow,
}

/// A provider that can exchange codes, refresh tokens, and describe the
/// account behind an access token.
///
/// The vault and the OAuth gateway depend only on this trait; all
/// provider-specific behavior lives in implementations.
#[async_trait]
pub trait OAuthProvider: Send + Sync + 'static {
    /// Provider key, e.g. `github`.
    fn key(&self) -> &str;

    /// Exchange an authorization code for tokens.
    ///
    /// Rejections map to [`AreaError::ProviderExchangeFailed`].
    async fn exchange_code(&self, request: ExchangeRequest) -> Result<TokenSet, AreaError>;

    /// Obtain a new access token with a refresh token.
    ///
    /// An invalidated refresh token maps to [`AreaError::ProviderRejectedRefresh`];
    /// network failures map to [`AreaError::ProviderUnreachable`].
    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenSet, AreaError>;

    /// Fetch the identity of the account that granted `access_token`.
    async fn fetch_identity(&self, access_token: &str) -> Result<RemoteIdentity, AreaError>;
}
