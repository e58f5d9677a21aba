// SPDX-FileCopyrightText: 2026 Area Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pending OAuth authorization states.

use area_core::AreaError;
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};

use crate::database::Database;
use crate::models::OAuthStateRecord;
use crate::queries::enum_column;
use crate::time;

/// Persist a freshly issued state.
pub async fn insert_state(db: &Database, record: &OAuthStateRecord) -> Result<(), AreaError> {
    let record = record.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO oauth_states (state, provider, mode, flow, user_id, redirect_uri,
                                           code_verifier, created_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    record.state,
                    record.provider,
                    record.mode.to_string(),
                    record.flow.to_string(),
                    record.user_id,
                    record.redirect_uri,
                    record.code_verifier,
                    time::to_db(record.created_at),
                    time::to_db(record.expires_at),
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Remove and return a state in one statement, so a state can be redeemed once.
///
/// Expired states are deleted but not returned.
pub async fn consume_state(
    db: &Database,
    state: &str,
    now: DateTime<Utc>,
) -> Result<Option<OAuthStateRecord>, AreaError> {
    let state = state.to_string();
    let record = db
        .connection()
        .call(move |conn| {
            conn.query_row(
                "DELETE FROM oauth_states WHERE state = ?1
                 RETURNING state, provider, mode, flow, user_id, redirect_uri, code_verifier,
                           created_at, expires_at",
                params![state],
                |row| {
                    Ok(OAuthStateRecord {
                        state: row.get(0)?,
                        provider: row.get(1)?,
                        mode: enum_column(row, 2)?,
                        flow: enum_column(row, 3)?,
                        user_id: row.get(4)?,
                        redirect_uri: row.get(5)?,
                        code_verifier: row.get(6)?,
                        created_at: time::column(row, 7)?,
                        expires_at: time::column(row, 8)?,
                    })
                },
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)?;

    Ok(record.filter(|r| r.expires_at > now))
}

/// Delete states that expired before `now`. Returns the number removed.
pub async fn purge_expired_states(db: &Database, now: DateTime<Utc>) -> Result<usize, AreaError> {
    let now = time::to_db(now);
    db.connection()
        .call(move |conn| conn.execute("DELETE FROM oauth_states WHERE expires_at <= ?1", params![now]))
        .await
        .map_err(crate::database::map_tr_err)
}
