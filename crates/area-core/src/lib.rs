// SPDX-FileCopyrightText: 2026 Area Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Area automation broker.
//!
//! Holds the error taxonomy, the domain types shared by every crate, and the
//! provider capability traits that keep the vault, gateway, and engine free
//! of provider-specific branching.

pub mod error;
pub mod traits;
pub mod types;

pub use error::{AreaError, ErrorClass};
pub use traits::{
    ActionPoller, ExchangeRequest, OAuthProvider, PollContext, ReactionContext,
    ReactionExecutor,
};
pub use types::{
    AreaStatus, AuthFlow, DeliveryStatus, OAuthMode, ParamType, Params, PollOutcome,
    PushedEvent, RemoteIdentity, TokenSet, TokenState, TriggerEvent,
};
