// SPDX-FileCopyrightText: 2026 Area Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Area persistence, scheduling selection, and per-Area leases.
//!
//! Ownership is enforced in SQL: every user-facing query filters on
//! `user_id`, so a foreign Area is indistinguishable from a missing one.

use area_core::{AreaError, AreaStatus};
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, is_unique_violation};
use crate::models::{Area, AreaPatch, DeliveryRecord, NewArea};
use crate::queries::{enum_column, params_column, params_to_db};
use crate::time;

const AREA_COLUMNS: &str = "id, user_id, name, action_service_id, action_id, action_params, \
     reaction_service_id, reaction_id, reaction_params, status, failure_count, last_error, \
     watermark, last_checked_at, last_triggered_at, created_at, updated_at";

fn area_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Area> {
    let status: AreaStatus = enum_column(row, 9)?;
    Ok(Area {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        action_service_id: row.get(3)?,
        action_id: row.get(4)?,
        params_action: params_column(row, 5)?,
        reaction_service_id: row.get(6)?,
        reaction_id: row.get(7)?,
        params_reaction: params_column(row, 8)?,
        is_active: status == AreaStatus::Active,
        status,
        failure_count: row.get(10)?,
        last_error: row.get(11)?,
        watermark: row.get(12)?,
        last_checked_at: time::column_opt(row, 13)?,
        last_triggered_at: time::column_opt(row, 14)?,
        created_at: time::column(row, 15)?,
        updated_at: time::column(row, 16)?,
    })
}

fn select_owned(conn: &rusqlite::Connection, user_id: i64, id: i64) -> rusqlite::Result<Option<Area>> {
    conn.query_row(
        &format!("SELECT {AREA_COLUMNS} FROM areas WHERE id = ?1 AND user_id = ?2"),
        params![id, user_id],
        area_from_row,
    )
    .optional()
}

/// Insert an Area and return the stored row.
pub async fn create_area(db: &Database, area: &NewArea) -> Result<Area, AreaError> {
    let area = area.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO areas (user_id, name, action_service_id, action_id, action_params,
                                    reaction_service_id, reaction_id, reaction_params, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    area.user_id,
                    area.name,
                    area.action_service_id,
                    area.action_id,
                    params_to_db(&area.params_action),
                    area.reaction_service_id,
                    area.reaction_id,
                    params_to_db(&area.params_reaction),
                    area.status.to_string(),
                ],
            )?;
            let id = conn.last_insert_rowid();
            conn.query_row(
                &format!("SELECT {AREA_COLUMNS} FROM areas WHERE id = ?1"),
                params![id],
                area_from_row,
            )
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Fetch an Area without an ownership check. For the engine only.
pub async fn get_area(db: &Database, id: i64) -> Result<Option<Area>, AreaError> {
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {AREA_COLUMNS} FROM areas WHERE id = ?1"),
                params![id],
                area_from_row,
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Fetch an Area owned by `user_id`.
pub async fn get_area_for_user(
    db: &Database,
    user_id: i64,
    id: i64,
) -> Result<Option<Area>, AreaError> {
    db.connection()
        .call(move |conn| select_owned(conn, user_id, id))
        .await
        .map_err(crate::database::map_tr_err)
}

/// All Areas of a user, newest first.
pub async fn list_areas_for_user(db: &Database, user_id: i64) -> Result<Vec<Area>, AreaError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {AREA_COLUMNS} FROM areas WHERE user_id = ?1 ORDER BY id DESC"
            ))?;
            let rows = stmt.query_map(params![user_id], area_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Apply a partial update. Returns `None` when the Area is not the caller's.
///
/// Changing the action parameters resets the watermark so the next poll
/// re-establishes a cursor for the new condition.
pub async fn update_area(
    db: &Database,
    user_id: i64,
    id: i64,
    patch: &AreaPatch,
) -> Result<Option<Area>, AreaError> {
    let name = patch.name.clone();
    let action = patch.params_action.as_ref().map(params_to_db);
    let reaction = patch.params_reaction.as_ref().map(params_to_db);
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE areas SET
                    name = COALESCE(?3, name),
                    action_params = COALESCE(?4, action_params),
                    watermark = CASE WHEN ?4 IS NULL THEN watermark ELSE NULL END,
                    reaction_params = COALESCE(?5, reaction_params),
                    updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1 AND user_id = ?2",
                params![id, user_id, name, action, reaction],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            select_owned(conn, user_id, id)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Move an owned Area to `status`.
///
/// Entering `Active` clears the failure counter and last error, which is how a
/// suspended Area recovers.
pub async fn set_area_status(
    db: &Database,
    user_id: i64,
    id: i64,
    status: AreaStatus,
) -> Result<Option<Area>, AreaError> {
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE areas SET
                    status = ?3,
                    failure_count = CASE WHEN ?3 = 'active' THEN 0 ELSE failure_count END,
                    last_error = CASE WHEN ?3 = 'active' THEN NULL ELSE last_error END,
                    updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1 AND user_id = ?2",
                params![id, user_id, status.to_string()],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            select_owned(conn, user_id, id)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Delete an owned Area and its deliveries.
pub async fn delete_area(db: &Database, user_id: i64, id: i64) -> Result<bool, AreaError> {
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "DELETE FROM areas WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Active, unleased Areas not checked within `min_interval_secs`.
///
/// Healthy Areas come first, then the longest-waiting ones.
pub async fn list_due_areas(
    db: &Database,
    now: DateTime<Utc>,
    min_interval_secs: u64,
    limit: usize,
) -> Result<Vec<Area>, AreaError> {
    let interval = i64::try_from(min_interval_secs).unwrap_or(i64::MAX);
    let cutoff = time::to_db(now - chrono::Duration::seconds(interval));
    let now = time::to_db(now);
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {AREA_COLUMNS} FROM areas
                 WHERE status = 'active'
                   AND (lease_until IS NULL OR lease_until <= ?1)
                   AND (last_checked_at IS NULL OR last_checked_at <= ?2)
                 ORDER BY failure_count ASC, last_checked_at ASC NULLS FIRST, id ASC
                 LIMIT ?3"
            ))?;
            let rows = stmt.query_map(params![now, cutoff, limit], area_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Active Areas built on `action_id`, oldest first. Used to route pushed
/// provider events.
pub async fn list_active_areas_for_action(db: &Database, action_id: i64) -> Result<Vec<Area>, AreaError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {AREA_COLUMNS} FROM areas
                 WHERE status = 'active' AND action_id = ?1
                 ORDER BY id ASC"
            ))?;
            let rows = stmt.query_map(params![action_id], area_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Take the evaluation lease of an active Area. Returns `false` if another
/// owner holds an unexpired lease or the Area is no longer active.
pub async fn acquire_lease(
    db: &Database,
    area_id: i64,
    owner: &str,
    now: DateTime<Utc>,
    until: DateTime<Utc>,
) -> Result<bool, AreaError> {
    let owner = owner.to_string();
    let now = time::to_db(now);
    let until = time::to_db(until);
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE areas SET lease_owner = ?2, lease_until = ?4
                 WHERE id = ?1 AND status = 'active'
                   AND (lease_owner IS NULL OR lease_until <= ?3 OR lease_owner = ?2)",
                params![area_id, owner, now, until],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Extend a held lease. Returns `false` if the lease was lost.
pub async fn renew_lease(
    db: &Database,
    area_id: i64,
    owner: &str,
    until: DateTime<Utc>,
) -> Result<bool, AreaError> {
    let owner = owner.to_string();
    let until = time::to_db(until);
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE areas SET lease_until = ?3 WHERE id = ?1 AND lease_owner = ?2",
                params![area_id, owner, until],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Drop a held lease without recording an outcome.
pub async fn release_lease(db: &Database, area_id: i64, owner: &str) -> Result<(), AreaError> {
    let owner = owner.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE areas SET lease_owner = NULL, lease_until = NULL
                 WHERE id = ?1 AND lease_owner = ?2",
                params![area_id, owner],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Record a failed evaluation and release the lease.
///
/// The Area is suspended once `failure_count` reaches `threshold`. Returns the
/// resulting status, or `None` if the Area vanished.
pub async fn record_area_failure(
    db: &Database,
    area_id: i64,
    owner: &str,
    error: &str,
    threshold: u32,
    now: DateTime<Utc>,
) -> Result<Option<AreaStatus>, AreaError> {
    let owner = owner.to_string();
    let error = error.to_string();
    let now = time::to_db(now);
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "UPDATE areas SET
                    failure_count = failure_count + 1,
                    last_error = ?3,
                    last_checked_at = ?5,
                    status = CASE WHEN status = 'active' AND failure_count + 1 >= ?4
                                  THEN 'suspended' ELSE status END,
                    lease_owner = NULL,
                    lease_until = NULL,
                    updated_at = ?5
                 WHERE id = ?1 AND (lease_owner IS NULL OR lease_owner = ?2)
                 RETURNING status",
                params![area_id, owner, error, threshold, now],
                |row| enum_column::<AreaStatus>(row, 0),
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Result of a successful evaluation, committed as one unit.
#[derive(Debug, Clone)]
pub struct EvaluationCommit {
    /// New watermark; `None` keeps the stored one.
    pub watermark: Option<String>,
    pub checked_at: DateTime<Utc>,
    /// Reaction invocations performed during this evaluation.
    pub deliveries: Vec<DeliveryRecord>,
}

/// Persist the watermark, timestamps, and delivery outcomes of an evaluation
/// in one transaction, then release the lease.
///
/// Fails with [`AreaError::InvariantViolation`] when the lease is no longer
/// held by `owner` or an event already has a delivery row (a double fire).
/// Nothing is written in either case.
pub async fn commit_evaluation(
    db: &Database,
    area_id: i64,
    owner: &str,
    commit: EvaluationCommit,
) -> Result<(), AreaError> {
    enum Outcome {
        Committed,
        LeaseLost,
        DuplicateEvent(String),
    }

    let owner_key = owner.to_string();
    let outcome = db
        .connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let holder: Option<Option<String>> = tx
                .query_row(
                    "SELECT lease_owner FROM areas WHERE id = ?1",
                    params![area_id],
                    |row| row.get(0),
                )
                .optional()?;
            if holder.flatten().as_deref() != Some(owner_key.as_str()) {
                return Ok(Outcome::LeaseLost);
            }

            let checked_at = time::to_db(commit.checked_at);
            for delivery in &commit.deliveries {
                let inserted = tx.execute(
                    "INSERT INTO deliveries (area_id, event_id, params, status, attempts,
                                             next_attempt_at, last_error, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
                    params![
                        area_id,
                        delivery.event_id,
                        params_to_db(&delivery.params),
                        delivery.status.to_string(),
                        delivery.attempts,
                        delivery.next_attempt_at.map(time::to_db),
                        delivery.last_error,
                        checked_at,
                    ],
                );
                match inserted {
                    Ok(_) => {}
                    Err(e) if is_unique_violation(&e) => {
                        return Ok(Outcome::DuplicateEvent(delivery.event_id.clone()));
                    }
                    Err(e) => return Err(e),
                }
            }

            let triggered = (!commit.deliveries.is_empty()).then(|| checked_at.clone());
            tx.execute(
                "UPDATE areas SET
                    watermark = COALESCE(?2, watermark),
                    last_checked_at = ?3,
                    last_triggered_at = COALESCE(?4, last_triggered_at),
                    failure_count = 0,
                    last_error = NULL,
                    lease_owner = NULL,
                    lease_until = NULL,
                    updated_at = ?3
                 WHERE id = ?1",
                params![area_id, commit.watermark, checked_at, triggered],
            )?;
            tx.commit()?;
            Ok(Outcome::Committed)
        })
        .await
        .map_err(crate::database::map_tr_err)?;

    match outcome {
        Outcome::Committed => Ok(()),
        Outcome::LeaseLost => Err(AreaError::InvariantViolation(format!(
            "lease on area {area_id} is no longer held by {owner}"
        ))),
        Outcome::DuplicateEvent(event_id) => Err(AreaError::InvariantViolation(format!(
            "event {event_id} already fired for area {area_id}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::{deliveries, services, users};
    use area_core::{DeliveryStatus, Params};
    use chrono::Duration;
    use serde_json::json;

    async fn fixture() -> (Database, tempfile::TempDir, i64) {
        let (db, dir) = crate::test_db().await;
        services::seed_services(
            &db,
            &[crate::test_service(1, "timer"), crate::test_service(2, "discord")],
        )
        .await
        .unwrap();
        let user = users::create_user(&db, "owner@example.com", None, None)
            .await
            .unwrap();
        (db, dir, user.id)
    }

    fn new_area(user_id: i64) -> NewArea {
        let mut params_action = Params::new();
        params_action.insert("every_minutes".into(), json!(5));
        let mut params_reaction = Params::new();
        params_reaction.insert("content".into(), json!("tick {{fired_at}}"));
        NewArea {
            user_id,
            name: "every five".into(),
            action_service_id: 1,
            action_id: 1,
            params_action,
            reaction_service_id: 2,
            reaction_id: 1,
            params_reaction,
            status: AreaStatus::Active,
        }
    }

    fn delivered(event_id: &str) -> DeliveryRecord {
        DeliveryRecord {
            event_id: event_id.into(),
            params: Params::new(),
            status: DeliveryStatus::Delivered,
            attempts: 1,
            next_attempt_at: None,
            last_error: None,
        }
    }

    #[tokio::test]
    async fn areas_are_invisible_to_other_users() {
        let (db, _dir, owner) = fixture().await;
        let stranger = users::create_user(&db, "stranger@example.com", None, None)
            .await
            .unwrap();
        let area = create_area(&db, &new_area(owner)).await.unwrap();
        assert_eq!(area.params_action.get("every_minutes"), Some(&json!(5)));

        assert!(get_area_for_user(&db, stranger.id, area.id).await.unwrap().is_none());
        assert!(
            update_area(&db, stranger.id, area.id, &AreaPatch::default())
                .await
                .unwrap()
                .is_none()
        );
        assert!(!delete_area(&db, stranger.id, area.id).await.unwrap());
        assert!(list_areas_for_user(&db, stranger.id).await.unwrap().is_empty());
        assert!(delete_area(&db, owner, area.id).await.unwrap());
    }

    #[tokio::test]
    async fn changing_action_params_resets_watermark() {
        let (db, _dir, owner) = fixture().await;
        let area = create_area(&db, &new_area(owner)).await.unwrap();
        let now = Utc::now();
        assert!(acquire_lease(&db, area.id, "w1", now, now + Duration::minutes(2)).await.unwrap());
        commit_evaluation(
            &db,
            area.id,
            "w1",
            EvaluationCommit {
                watermark: Some("cursor-1".into()),
                checked_at: now,
                deliveries: vec![],
            },
        )
        .await
        .unwrap();

        let renamed = update_area(
            &db,
            owner,
            area.id,
            &AreaPatch {
                name: Some("renamed".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(renamed.watermark.as_deref(), Some("cursor-1"));

        let mut params = Params::new();
        params.insert("every_minutes".into(), json!(10));
        let updated = update_area(
            &db,
            owner,
            area.id,
            &AreaPatch {
                params_action: Some(params),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(updated.name, "renamed");
        assert!(updated.watermark.is_none());
    }

    #[tokio::test]
    async fn lease_excludes_second_worker_until_expiry() {
        let (db, _dir, owner) = fixture().await;
        let area = create_area(&db, &new_area(owner)).await.unwrap();
        let now = Utc::now();
        let until = now + Duration::seconds(120);

        assert!(acquire_lease(&db, area.id, "w1", now, until).await.unwrap());
        assert!(!acquire_lease(&db, area.id, "w2", now, until).await.unwrap());
        assert!(list_due_areas(&db, now, 60, 10).await.unwrap().is_empty());
        assert!(renew_lease(&db, area.id, "w1", until + Duration::seconds(60)).await.unwrap());
        assert!(!renew_lease(&db, area.id, "w2", until).await.unwrap());

        let later = until + Duration::seconds(61);
        assert!(acquire_lease(&db, area.id, "w2", later, later + Duration::seconds(120)).await.unwrap());
        release_lease(&db, area.id, "w1").await.unwrap();
        assert!(!acquire_lease(&db, area.id, "w1", later, later).await.unwrap());
    }

    #[tokio::test]
    async fn failures_suspend_and_reactivation_resets() {
        let (db, _dir, owner) = fixture().await;
        let area = create_area(&db, &new_area(owner)).await.unwrap();
        let now = Utc::now();

        for attempt in 1..=5 {
            let status = record_area_failure(&db, area.id, "w1", "upstream 503", 5, now)
                .await
                .unwrap()
                .unwrap();
            let expected = if attempt < 5 { AreaStatus::Active } else { AreaStatus::Suspended };
            assert_eq!(status, expected, "after failure {attempt}");
        }
        assert!(list_due_areas(&db, now + Duration::hours(1), 60, 10).await.unwrap().is_empty());

        let resumed = set_area_status(&db, owner, area.id, AreaStatus::Active)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resumed.failure_count, 0);
        assert!(resumed.last_error.is_none());
        assert!(resumed.is_active);
    }

    #[tokio::test]
    async fn due_selection_respects_interval_and_health() {
        let (db, _dir, owner) = fixture().await;
        let healthy = create_area(&db, &new_area(owner)).await.unwrap();
        let flaky = create_area(&db, &new_area(owner)).await.unwrap();
        let now = Utc::now();
        record_area_failure(&db, flaky.id, "w", "boom", 5, now - Duration::minutes(10))
            .await
            .unwrap();

        let due = list_due_areas(&db, now, 60, 10).await.unwrap();
        let ids: Vec<i64> = due.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![healthy.id, flaky.id]);

        let due = list_due_areas(&db, now - Duration::minutes(10), 60, 10).await.unwrap();
        assert_eq!(due.iter().map(|a| a.id).collect::<Vec<_>>(), vec![healthy.id]);
    }

    #[tokio::test]
    async fn active_areas_are_listed_per_action() {
        let (db, _dir, owner) = fixture().await;
        let first = create_area(&db, &new_area(owner)).await.unwrap();
        let paused = create_area(&db, &new_area(owner)).await.unwrap();
        set_area_status(&db, owner, paused.id, AreaStatus::Inactive)
            .await
            .unwrap();
        let mut other = new_area(owner);
        other.action_id = 2;
        create_area(&db, &other).await.unwrap();

        let listed = list_active_areas_for_action(&db, 1).await.unwrap();
        assert_eq!(listed.iter().map(|a| a.id).collect::<Vec<_>>(), vec![first.id]);
    }

    #[tokio::test]
    async fn commit_rejects_double_fire_and_lost_lease() {
        let (db, _dir, owner) = fixture().await;
        let area = create_area(&db, &new_area(owner)).await.unwrap();
        let now = Utc::now();
        let lease = now + Duration::minutes(2);

        acquire_lease(&db, area.id, "w1", now, lease).await.unwrap();
        commit_evaluation(
            &db,
            area.id,
            "w1",
            EvaluationCommit {
                watermark: Some("e1".into()),
                checked_at: now,
                deliveries: vec![delivered("e1")],
            },
        )
        .await
        .unwrap();

        let stored = get_area(&db, area.id).await.unwrap().unwrap();
        assert_eq!(stored.watermark.as_deref(), Some("e1"));
        assert!(stored.last_triggered_at.is_some());

        let err = commit_evaluation(
            &db,
            area.id,
            "w1",
            EvaluationCommit {
                watermark: None,
                checked_at: now,
                deliveries: vec![],
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AreaError::InvariantViolation(_)));

        acquire_lease(&db, area.id, "w1", now, lease).await.unwrap();
        let err = commit_evaluation(
            &db,
            area.id,
            "w1",
            EvaluationCommit {
                watermark: Some("e2".into()),
                checked_at: now,
                deliveries: vec![delivered("e2"), delivered("e1")],
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AreaError::InvariantViolation(_)));

        let stored = get_area(&db, area.id).await.unwrap().unwrap();
        assert_eq!(stored.watermark.as_deref(), Some("e1"));
        assert_eq!(deliveries::list_deliveries(&db, area.id, 10).await.unwrap().len(), 1);
    }
}
