// SPDX-FileCopyrightText: 2026 Area Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Action trigger evaluation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::AreaError;
use crate::types::{Params, PollOutcome};

/// Everything a poller needs for one evaluation of one Area.
#[derive(Clone, Copy)]
pub struct PollContext<'a> {
    /// Token of the action's service account. `None` for services without OAuth.
    pub access_token: Option<&'a str>,
    pub params: &'a Params,
    /// Cursor persisted after the previous successful evaluation.
    pub watermark: Option<&'a str>,
    pub now: DateTime<Utc>,
}

/// Checks whether an action fired since the stored watermark.
///
/// Implementations must be idempotent: polling twice with the same watermark
/// against unchanged upstream state yields the same events. The first poll of
/// an Area (no watermark) establishes a cursor and reports no events, so
/// history that predates the Area never fires.
#[async_trait]
pub trait ActionPoller: Send + Sync + 'static {
    async fn poll(&self, ctx: PollContext<'_>) -> Result<PollOutcome, AreaError>;

    /// Minimum seconds between two evaluations of the same Area.
    fn min_interval_secs(&self) -> u64 {
        60
    }
}
