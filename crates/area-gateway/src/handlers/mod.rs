// SPDX-FileCopyrightText: 2026 Area Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers, one module per resource.

pub mod areas;
pub mod meta;
pub mod oauth;
pub mod services;
pub mod users;
pub mod webhooks;

use crate::error::ApiError;

pub type ApiResult<T> = Result<T, ApiError>;
