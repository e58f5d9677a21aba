// SPDX-FileCopyrightText: 2026 Area Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Service account operations.

use area_core::AreaError;
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};

use crate::database::Database;
use crate::models::{AccountIdentity, ServiceAccount};
use crate::time;

const ACCOUNT_COLUMNS: &str = "id, user_id, service_id, remote_account_id, remote_email, \
     remote_name, granted_scopes, is_active, last_used_at, last_error, error_count, \
     created_at, updated_at";

fn account_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ServiceAccount> {
    Ok(ServiceAccount {
        id: row.get(0)?,
        user_id: row.get(1)?,
        service_id: row.get(2)?,
        remote_account_id: row.get(3)?,
        remote_email: row.get(4)?,
        remote_name: row.get(5)?,
        granted_scopes: row.get(6)?,
        is_active: row.get(7)?,
        last_used_at: time::column_opt(row, 8)?,
        last_error: row.get(9)?,
        error_count: row.get(10)?,
        created_at: time::column(row, 11)?,
        updated_at: time::column(row, 12)?,
    })
}

/// Create or reactivate the account for (user, service).
///
/// Reconnecting updates the existing row: identity fields only change when
/// the provider reported a value, and error state is cleared.
pub async fn upsert_account(
    db: &Database,
    user_id: i64,
    service_id: i64,
    identity: &AccountIdentity,
) -> Result<ServiceAccount, AreaError> {
    let identity = identity.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO service_accounts
                    (user_id, service_id, remote_account_id, remote_email, remote_name, granted_scopes)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(user_id, service_id) DO UPDATE SET
                    remote_account_id = COALESCE(excluded.remote_account_id, remote_account_id),
                    remote_email = COALESCE(excluded.remote_email, remote_email),
                    remote_name = COALESCE(excluded.remote_name, remote_name),
                    granted_scopes = COALESCE(excluded.granted_scopes, granted_scopes),
                    is_active = 1,
                    last_error = NULL,
                    error_count = 0,
                    updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                params![
                    user_id,
                    service_id,
                    identity.remote_account_id,
                    identity.remote_email,
                    identity.remote_name,
                    identity.granted_scopes,
                ],
            )?;
            conn.query_row(
                &format!(
                    "SELECT {ACCOUNT_COLUMNS} FROM service_accounts
                     WHERE user_id = ?1 AND service_id = ?2"
                ),
                params![user_id, service_id],
                account_from_row,
            )
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Fetch an account by id regardless of state.
pub async fn get_account(db: &Database, id: i64) -> Result<Option<ServiceAccount>, AreaError> {
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {ACCOUNT_COLUMNS} FROM service_accounts WHERE id = ?1"),
                params![id],
                account_from_row,
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// The caller's active account for a service, if any.
pub async fn get_active_account(
    db: &Database,
    user_id: i64,
    service_id: i64,
) -> Result<Option<ServiceAccount>, AreaError> {
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {ACCOUNT_COLUMNS} FROM service_accounts
                     WHERE user_id = ?1 AND service_id = ?2 AND is_active = 1"
                ),
                params![user_id, service_id],
                account_from_row,
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Accounts owned by a user, newest first.
pub async fn list_accounts_for_user(
    db: &Database,
    user_id: i64,
    active_only: bool,
) -> Result<Vec<ServiceAccount>, AreaError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ACCOUNT_COLUMNS} FROM service_accounts
                 WHERE user_id = ?1 AND (?2 = 0 OR is_active = 1)
                 ORDER BY id DESC"
            ))?;
            let rows = stmt.query_map(params![user_id, active_only], account_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Deactivate an account owned by `user_id`. Returns `false` when the account
/// does not exist, belongs to someone else, or is already inactive.
pub async fn disconnect_account(
    db: &Database,
    user_id: i64,
    account_id: i64,
) -> Result<bool, AreaError> {
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE service_accounts SET is_active = 0,
                    updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1 AND user_id = ?2 AND is_active = 1",
                params![account_id, user_id],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Deactivate an account after an unrecoverable credential failure.
pub async fn deactivate_account(db: &Database, id: i64, reason: &str) -> Result<(), AreaError> {
    let reason = reason.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE service_accounts SET is_active = 0, last_error = ?2,
                    error_count = error_count + 1,
                    updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1",
                params![id, reason],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Record a failed refresh without deactivating.
pub async fn record_account_error(db: &Database, id: i64, error: &str) -> Result<(), AreaError> {
    let error = error.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE service_accounts SET last_error = ?2, error_count = error_count + 1,
                    updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1",
                params![id, error],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Mark the account used now and clear transient error state.
pub async fn touch_account(db: &Database, id: i64, now: DateTime<Utc>) -> Result<(), AreaError> {
    let now = time::to_db(now);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE service_accounts SET last_used_at = ?2, last_error = NULL,
                    error_count = 0, updated_at = ?2
                 WHERE id = ?1",
                params![id, now],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}
