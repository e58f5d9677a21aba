// SPDX-FileCopyrightText: 2026 Area Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `timer.every_interval`: fires once per elapsed interval.
//!
//! The watermark is the RFC 3339 time of the last fire. The event id is the
//! scheduled fire time, so re-polling the same watermark yields the same id.

use area_core::{ActionPoller, AreaError, PollContext, PollOutcome, TriggerEvent};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use serde_json::json;

#[derive(Debug, Default)]
pub struct EveryIntervalPoller;

fn every_minutes(ctx: &PollContext<'_>) -> Result<i64, AreaError> {
    ctx.params
        .get("every_minutes")
        .and_then(|v| v.as_i64())
        .filter(|m| *m >= 1)
        .ok_or_else(|| AreaError::InvalidParameters("`every_minutes` must be a positive integer".into()))
}

#[async_trait]
impl ActionPoller for EveryIntervalPoller {
    async fn poll(&self, ctx: PollContext<'_>) -> Result<PollOutcome, AreaError> {
        let minutes = every_minutes(&ctx)?;
        let stamp = |t: DateTime<Utc>| t.to_rfc3339_opts(SecondsFormat::Secs, true);

        let Some(raw) = ctx.watermark else {
            return Ok(PollOutcome::quiet(Some(stamp(ctx.now))));
        };
        let last = DateTime::parse_from_rfc3339(raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| AreaError::InvariantViolation(format!("corrupt timer watermark `{raw}`: {e}")))?;

        let due = TimeDelta::try_minutes(minutes)
            .and_then(|interval| last.checked_add_signed(interval))
            .ok_or_else(|| AreaError::InvalidParameters(format!("`every_minutes` of {minutes} is out of range")))?;
        if ctx.now < due {
            return Ok(PollOutcome::quiet(None));
        }
        Ok(PollOutcome {
            events: vec![TriggerEvent {
                id: stamp(due),
                data: json!({
                    "fired_at": stamp(ctx.now),
                    "scheduled_for": stamp(due),
                    "every_minutes": minutes,
                }),
            }],
            watermark: Some(stamp(ctx.now)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use area_core::Params;
    use chrono::TimeZone;

    fn params(minutes: i64) -> Params {
        json!({ "every_minutes": minutes }).as_object().cloned().unwrap()
    }

    async fn poll(watermark: Option<&str>, now: DateTime<Utc>) -> PollOutcome {
        let params = params(5);
        EveryIntervalPoller
            .poll(PollContext {
                access_token: None,
                params: &params,
                watermark,
                now,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn first_poll_only_sets_cursor() {
        let now = Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap();
        let outcome = poll(None, now).await;
        assert!(outcome.events.is_empty());
        assert_eq!(outcome.watermark.as_deref(), Some("2026-05-01T12:00:00Z"));
    }

    #[tokio::test]
    async fn fires_once_interval_elapsed() {
        let start = "2026-05-01T12:00:00Z";
        let early = Utc.with_ymd_and_hms(2026, 5, 1, 12, 4, 0).unwrap();
        assert_eq!(poll(Some(start), early).await, PollOutcome::quiet(None));

        let late = Utc.with_ymd_and_hms(2026, 5, 1, 12, 6, 30).unwrap();
        let first = poll(Some(start), late).await;
        let again = poll(Some(start), late).await;
        assert_eq!(first.events.len(), 1);
        assert_eq!(first.events[0].id, "2026-05-01T12:05:00Z");
        assert_eq!(first.events[0].id, again.events[0].id);
        assert_eq!(first.watermark.as_deref(), Some("2026-05-01T12:06:30Z"));
    }

    #[tokio::test]
    async fn out_of_range_interval_is_an_error() {
        let params = params(1_000_000_000_000);
        let err = EveryIntervalPoller
            .poll(PollContext {
                access_token: None,
                params: &params,
                watermark: Some("2026-05-01T12:00:00Z"),
                now: Utc::now(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AreaError::InvalidParameters(_)), "{err}");
    }

    #[tokio::test]
    async fn rejects_non_positive_interval() {
        let params = params(0);
        let err = EveryIntervalPoller
            .poll(PollContext {
                access_token: None,
                params: &params,
                watermark: None,
                now: Utc::now(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AreaError::InvalidParameters(_)));
    }
}
