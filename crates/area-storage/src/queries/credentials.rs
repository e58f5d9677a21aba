// SPDX-FileCopyrightText: 2026 Area Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sealed credential rows. Encryption happens in the vault; this module only
//! moves ciphertext.

use area_core::AreaError;
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};

use crate::database::Database;
use crate::models::CredentialRecord;
use crate::time;

fn credential_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CredentialRecord> {
    Ok(CredentialRecord {
        service_account_id: row.get(0)?,
        access_ciphertext: row.get(1)?,
        access_nonce: row.get(2)?,
        refresh_ciphertext: row.get(3)?,
        refresh_nonce: row.get(4)?,
        token_type: row.get(5)?,
        expires_at: time::column_opt(row, 6)?,
    })
}

/// Replace the credential of a service account.
pub async fn upsert_credential(db: &Database, record: &CredentialRecord) -> Result<(), AreaError> {
    let record = record.clone();
    let expires_at = record.expires_at.map(time::to_db);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO credentials (service_account_id, access_ciphertext, access_nonce,
                                          refresh_ciphertext, refresh_nonce, token_type, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(service_account_id) DO UPDATE SET
                    access_ciphertext = excluded.access_ciphertext,
                    access_nonce = excluded.access_nonce,
                    refresh_ciphertext = excluded.refresh_ciphertext,
                    refresh_nonce = excluded.refresh_nonce,
                    token_type = excluded.token_type,
                    expires_at = excluded.expires_at,
                    updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                params![
                    record.service_account_id,
                    record.access_ciphertext,
                    record.access_nonce,
                    record.refresh_ciphertext,
                    record.refresh_nonce,
                    record.token_type,
                    expires_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Fetch the credential of a service account.
pub async fn get_credential(
    db: &Database,
    service_account_id: i64,
) -> Result<Option<CredentialRecord>, AreaError> {
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT service_account_id, access_ciphertext, access_nonce, refresh_ciphertext,
                        refresh_nonce, token_type, expires_at
                 FROM credentials WHERE service_account_id = ?1",
                params![service_account_id],
                credential_from_row,
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Active account ids whose access token expires before `before`, soonest first.
///
/// Only credentials holding a refresh token are returned; others cannot be renewed.
pub async fn list_expiring(
    db: &Database,
    before: DateTime<Utc>,
    limit: usize,
) -> Result<Vec<i64>, AreaError> {
    let before = time::to_db(before);
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT c.service_account_id FROM credentials c
                 JOIN service_accounts a ON a.id = c.service_account_id
                 WHERE a.is_active = 1
                   AND c.refresh_ciphertext IS NOT NULL
                   AND c.expires_at IS NOT NULL
                   AND c.expires_at < ?1
                 ORDER BY c.expires_at ASC
                 LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![before, limit], |row| row.get(0))?;
            rows.collect::<Result<Vec<i64>, _>>()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Read a vault metadata value.
pub async fn get_vault_meta(db: &Database, key: &str) -> Result<Option<Vec<u8>>, AreaError> {
    let key = key.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT value FROM vault_meta WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Write vault metadata values atomically.
pub async fn put_vault_meta(db: &Database, entries: Vec<(String, Vec<u8>)>) -> Result<(), AreaError> {
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            for (key, value) in &entries {
                tx.execute(
                    "INSERT OR REPLACE INTO vault_meta (key, value) VALUES (?1, ?2)",
                    params![key, value],
                )?;
            }
            tx.commit()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AccountIdentity;
    use crate::queries::{accounts, services, users};
    use chrono::Duration;

    async fn account(db: &Database, email: &str) -> i64 {
        let user = users::create_user(db, email, None, None).await.unwrap();
        accounts::upsert_account(db, user.id, 1, &AccountIdentity::default())
            .await
            .unwrap()
            .id
    }

    fn record(id: i64, refresh: bool, expires_at: Option<DateTime<Utc>>) -> CredentialRecord {
        CredentialRecord {
            service_account_id: id,
            access_ciphertext: vec![1, 2, 3],
            access_nonce: vec![0; 12],
            refresh_ciphertext: refresh.then(|| vec![4, 5]),
            refresh_nonce: refresh.then(|| vec![1; 12]),
            token_type: Some("bearer".into()),
            expires_at,
        }
    }

    #[tokio::test]
    async fn upsert_replaces_previous_material() {
        let (db, _dir) = crate::test_db().await;
        services::seed_services(&db, &[crate::test_service(1, "google")])
            .await
            .unwrap();
        let id = account(&db, "a@example.com").await;

        upsert_credential(&db, &record(id, true, None)).await.unwrap();
        let mut next = record(id, false, None);
        next.access_ciphertext = vec![9];
        upsert_credential(&db, &next).await.unwrap();

        let stored = get_credential(&db, id).await.unwrap().unwrap();
        assert_eq!(stored.access_ciphertext, vec![9]);
        assert!(stored.refresh_ciphertext.is_none());
    }

    #[tokio::test]
    async fn expiring_skips_unrefreshable_and_inactive() {
        let (db, _dir) = crate::test_db().await;
        services::seed_services(&db, &[crate::test_service(1, "google")])
            .await
            .unwrap();
        let now = Utc::now();
        let soon = account(&db, "soon@example.com").await;
        let later = account(&db, "later@example.com").await;
        let no_refresh = account(&db, "norefresh@example.com").await;
        let inactive = account(&db, "inactive@example.com").await;

        upsert_credential(&db, &record(soon, true, Some(now + Duration::minutes(1))))
            .await
            .unwrap();
        upsert_credential(&db, &record(later, true, Some(now + Duration::hours(2))))
            .await
            .unwrap();
        upsert_credential(&db, &record(no_refresh, false, Some(now)))
            .await
            .unwrap();
        upsert_credential(&db, &record(inactive, true, Some(now)))
            .await
            .unwrap();
        accounts::deactivate_account(&db, inactive, "revoked").await.unwrap();

        let due = list_expiring(&db, now + Duration::minutes(5), 10).await.unwrap();
        assert_eq!(due, vec![soon]);
    }

    #[tokio::test]
    async fn vault_meta_round_trip() {
        let (db, _dir) = crate::test_db().await;
        assert!(get_vault_meta(&db, "salt").await.unwrap().is_none());
        put_vault_meta(&db, vec![("salt".into(), vec![7; 16])]).await.unwrap();
        assert_eq!(get_vault_meta(&db, "salt").await.unwrap(), Some(vec![7; 16]));
    }
}
