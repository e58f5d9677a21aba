// SPDX-FileCopyrightText: 2026 Area Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP API of the Area automation broker.
//!
//! Users, sessions, OAuth login and service connection, the service catalog,
//! and Area management. Errors render as `{"detail": "..."}`.

pub mod auth;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod password;
pub mod server;

pub use auth::{Claims, Session, SessionKeys};
pub use error::ApiError;
pub use server::{GatewayState, router, start_server};
