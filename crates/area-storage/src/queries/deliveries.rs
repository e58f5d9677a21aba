// SPDX-FileCopyrightText: 2026 Area Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reaction delivery history and retry selection.

use std::collections::HashSet;

use area_core::{AreaError, DeliveryStatus};
use chrono::{DateTime, Utc};
use rusqlite::params;

use crate::database::Database;
use crate::models::{Delivery, DeliveryRecord};
use crate::queries::{enum_column, params_column, params_to_db};
use crate::time;

const DELIVERY_COLUMNS: &str = "d.id, d.area_id, d.event_id, d.params, d.status, d.attempts, \
     d.next_attempt_at, d.last_error, d.created_at, d.updated_at";

fn delivery_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Delivery> {
    Ok(Delivery {
        id: row.get(0)?,
        area_id: row.get(1)?,
        event_id: row.get(2)?,
        params: params_column(row, 3)?,
        status: enum_column(row, 4)?,
        attempts: row.get(5)?,
        next_attempt_at: time::column_opt(row, 6)?,
        last_error: row.get(7)?,
        created_at: time::column(row, 8)?,
        updated_at: time::column(row, 9)?,
    })
}

/// Most recent deliveries of an Area.
pub async fn list_deliveries(
    db: &Database,
    area_id: i64,
    limit: usize,
) -> Result<Vec<Delivery>, AreaError> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {DELIVERY_COLUMNS} FROM deliveries d
                 WHERE d.area_id = ?1 ORDER BY d.id DESC LIMIT ?2"
            ))?;
            let rows = stmt.query_map(params![area_id, limit], delivery_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// The subset of `event_ids` that already have a delivery row for this Area.
pub async fn existing_event_ids(
    db: &Database,
    area_id: i64,
    event_ids: Vec<String>,
) -> Result<HashSet<String>, AreaError> {
    if event_ids.is_empty() {
        return Ok(HashSet::new());
    }
    db.connection()
        .call(move |conn| {
            let mut stmt =
                conn.prepare("SELECT 1 FROM deliveries WHERE area_id = ?1 AND event_id = ?2")?;
            let mut seen = HashSet::new();
            for event_id in event_ids {
                if stmt.exists(params![area_id, event_id])? {
                    seen.insert(event_id);
                }
            }
            Ok(seen)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Persist deliveries whose reactions already ran, without touching the
/// Area or its lease.
///
/// Used when an evaluation aborts after firing, so the next evaluation sees
/// those events as seen. Rows already present are left alone. Returns how
/// many were inserted.
pub async fn record_fired(
    db: &Database,
    area_id: i64,
    records: Vec<DeliveryRecord>,
    now: DateTime<Utc>,
) -> Result<usize, AreaError> {
    if records.is_empty() {
        return Ok(0);
    }
    let now = time::to_db(now);
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let mut inserted = 0;
            {
                let mut stmt = tx.prepare(
                    "INSERT OR IGNORE INTO deliveries (area_id, event_id, params, status, attempts,
                                                       next_attempt_at, last_error, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
                )?;
                for record in &records {
                    inserted += stmt.execute(params![
                        area_id,
                        record.event_id,
                        params_to_db(&record.params),
                        record.status.to_string(),
                        record.attempts,
                        record.next_attempt_at.map(time::to_db),
                        record.last_error,
                        now,
                    ])?;
                }
            }
            tx.commit()?;
            Ok(inserted)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Pending deliveries whose retry time has come, for Areas that are still active.
pub async fn due_deliveries(
    db: &Database,
    now: DateTime<Utc>,
    limit: usize,
) -> Result<Vec<Delivery>, AreaError> {
    let now = time::to_db(now);
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {DELIVERY_COLUMNS} FROM deliveries d
                 JOIN areas a ON a.id = d.area_id
                 WHERE d.status = 'pending' AND a.status = 'active'
                   AND (d.next_attempt_at IS NULL OR d.next_attempt_at <= ?1)
                 ORDER BY d.next_attempt_at ASC, d.id ASC
                 LIMIT ?2"
            ))?;
            let rows = stmt.query_map(params![now, limit], delivery_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Record the outcome of a retry attempt. Only pending rows are updated, so a
/// delivery that already reached a final state stays there.
pub async fn record_attempt(
    db: &Database,
    id: i64,
    status: DeliveryStatus,
    next_attempt_at: Option<DateTime<Utc>>,
    last_error: Option<&str>,
    now: DateTime<Utc>,
) -> Result<bool, AreaError> {
    let next = next_attempt_at.map(time::to_db);
    let last_error = last_error.map(str::to_string);
    let now = time::to_db(now);
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE deliveries SET status = ?2, attempts = attempts + 1,
                    next_attempt_at = ?3, last_error = ?4, updated_at = ?5
                 WHERE id = ?1 AND status = 'pending'",
                params![id, status.to_string(), next, last_error, now],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DeliveryRecord, NewArea};
    use crate::queries::areas::{self, EvaluationCommit};
    use crate::queries::{services, users};
    use area_core::{AreaStatus, Params};
    use chrono::Duration;

    async fn area_with_deliveries(records: Vec<DeliveryRecord>) -> (Database, tempfile::TempDir, i64, i64) {
        let (db, dir) = crate::test_db().await;
        services::seed_services(&db, &[crate::test_service(1, "github")])
            .await
            .unwrap();
        let user = users::create_user(&db, "d@example.com", None, None)
            .await
            .unwrap();
        let area = areas::create_area(
            &db,
            &NewArea {
                user_id: user.id,
                name: "issues".into(),
                action_service_id: 1,
                action_id: 1,
                params_action: Params::new(),
                reaction_service_id: 1,
                reaction_id: 1,
                params_reaction: Params::new(),
                status: AreaStatus::Active,
            },
        )
        .await
        .unwrap();
        let now = Utc::now();
        areas::acquire_lease(&db, area.id, "w", now, now + Duration::minutes(1))
            .await
            .unwrap();
        areas::commit_evaluation(
            &db,
            area.id,
            "w",
            EvaluationCommit {
                watermark: None,
                checked_at: now,
                deliveries: records,
            },
        )
        .await
        .unwrap();
        (db, dir, user.id, area.id)
    }

    fn record(event_id: &str, status: DeliveryStatus, next: Option<DateTime<Utc>>) -> DeliveryRecord {
        DeliveryRecord {
            event_id: event_id.into(),
            params: Params::new(),
            status,
            attempts: 1,
            next_attempt_at: next,
            last_error: None,
        }
    }

    #[tokio::test]
    async fn retry_selection_honours_schedule_and_status() {
        let now = Utc::now();
        let (db, _dir, user_id, area_id) = area_with_deliveries(vec![
            record("ready", DeliveryStatus::Pending, Some(now - Duration::seconds(1))),
            record("later", DeliveryStatus::Pending, Some(now + Duration::minutes(5))),
            record("done", DeliveryStatus::Delivered, None),
        ])
        .await;

        let due = due_deliveries(&db, now, 10).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].event_id, "ready");

        areas::set_area_status(&db, user_id, area_id, AreaStatus::Inactive)
            .await
            .unwrap();
        assert!(due_deliveries(&db, now, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn final_states_are_sticky() {
        let now = Utc::now();
        let (db, _dir, _user, area_id) =
            area_with_deliveries(vec![record("e", DeliveryStatus::Pending, Some(now))]).await;
        let id = list_deliveries(&db, area_id, 10).await.unwrap()[0].id;

        assert!(record_attempt(&db, id, DeliveryStatus::Failed, None, Some("403"), now).await.unwrap());
        assert!(!record_attempt(&db, id, DeliveryStatus::Delivered, None, None, now).await.unwrap());

        let stored = &list_deliveries(&db, area_id, 10).await.unwrap()[0];
        assert_eq!(stored.status, DeliveryStatus::Failed);
        assert_eq!(stored.attempts, 2);
        assert_eq!(stored.last_error.as_deref(), Some("403"));
    }

    #[tokio::test]
    async fn fired_records_skip_existing_rows() {
        let (db, _dir, _user, area_id) =
            area_with_deliveries(vec![record("a", DeliveryStatus::Delivered, None)]).await;
        let inserted = record_fired(
            &db,
            area_id,
            vec![
                record("a", DeliveryStatus::Failed, None),
                record("b", DeliveryStatus::Delivered, None),
            ],
            Utc::now(),
        )
        .await
        .unwrap();
        assert_eq!(inserted, 1);

        let stored = list_deliveries(&db, area_id, 10).await.unwrap();
        assert_eq!(stored.len(), 2);
        let a = stored.iter().find(|d| d.event_id == "a").unwrap();
        assert_eq!(a.status, DeliveryStatus::Delivered);
    }

    #[tokio::test]
    async fn existing_ids_are_reported() {
        let (db, _dir, _user, area_id) =
            area_with_deliveries(vec![record("a", DeliveryStatus::Delivered, None)]).await;
        let seen = existing_event_ids(&db, area_id, vec!["a".into(), "b".into()])
            .await
            .unwrap();
        assert!(seen.contains("a"));
        assert!(!seen.contains("b"));
    }
}
