// SPDX-FileCopyrightText: 2026 Area Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! User and OAuth login link operations.

use area_core::AreaError;
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, is_unique_violation};
use crate::models::User;
use crate::time;

const USER_COLUMNS: &str = "id, email, display_name, password_hash, created_at";

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        display_name: row.get(2)?,
        password_hash: row.get(3)?,
        created_at: time::column(row, 4)?,
    })
}

/// Insert a user. Email uniqueness is case-insensitive.
pub async fn create_user(
    db: &Database,
    email: &str,
    display_name: Option<&str>,
    password_hash: Option<&str>,
) -> Result<User, AreaError> {
    let email = email.trim().to_string();
    let display_name = display_name.map(str::to_string);
    let password_hash = password_hash.map(str::to_string);
    let created = db
        .connection()
        .call(move |conn| {
            match conn.execute(
                "INSERT INTO users (email, display_name, password_hash) VALUES (?1, ?2, ?3)",
                params![email, display_name, password_hash],
            ) {
                Ok(_) => {}
                Err(e) if is_unique_violation(&e) => return Ok(None),
                Err(e) => return Err(e),
            }
            let id = conn.last_insert_rowid();
            conn.query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id],
                user_from_row,
            )
            .map(Some)
        })
        .await
        .map_err(crate::database::map_tr_err)?;

    created.ok_or_else(|| AreaError::Conflict("Email already registered".to_string()))
}

/// Fetch a user by id.
pub async fn get_user(db: &Database, id: i64) -> Result<Option<User>, AreaError> {
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id],
                user_from_row,
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Fetch a user by email, ignoring case.
pub async fn get_user_by_email(db: &Database, email: &str) -> Result<Option<User>, AreaError> {
    let email = email.trim().to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
                params![email],
                user_from_row,
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Delete a user; areas, service accounts, and credentials cascade.
pub async fn delete_user(db: &Database, id: i64) -> Result<bool, AreaError> {
    db.connection()
        .call(move |conn| {
            let changed = conn.execute("DELETE FROM users WHERE id = ?1", params![id])?;
            Ok(changed > 0)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Find the user linked to a provider account.
pub async fn find_user_by_link(
    db: &Database,
    provider: &str,
    provider_user_id: &str,
) -> Result<Option<User>, AreaError> {
    let provider = provider.to_string();
    let provider_user_id = provider_user_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT u.id, u.email, u.display_name, u.password_hash, u.created_at
                 FROM users u JOIN oauth_links l ON l.user_id = u.id
                 WHERE l.provider = ?1 AND l.provider_user_id = ?2",
                params![provider, provider_user_id],
                user_from_row,
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Record that a provider account signs in as `user_id`. Existing links are kept.
pub async fn link_oauth(
    db: &Database,
    user_id: i64,
    provider: &str,
    provider_user_id: &str,
) -> Result<(), AreaError> {
    let provider = provider.to_string();
    let provider_user_id = provider_user_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO oauth_links (user_id, provider, provider_user_id)
                 VALUES (?1, ?2, ?3)",
                params![user_id, provider, provider_user_id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn email_is_unique_ignoring_case() {
        let (db, _dir) = crate::test_db().await;
        create_user(&db, "Ada@Example.com", Some("Ada"), Some("hash"))
            .await
            .unwrap();
        let err = create_user(&db, "ada@example.com", None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AreaError::Conflict(_)));

        let found = get_user_by_email(&db, "ADA@EXAMPLE.COM").await.unwrap();
        assert_eq!(found.unwrap().display_name.as_deref(), Some("Ada"));
    }

    #[tokio::test]
    async fn oauth_link_resolves_user() {
        let (db, _dir) = crate::test_db().await;
        let user = create_user(&db, "grace@example.com", None, None).await.unwrap();
        link_oauth(&db, user.id, "github", "1234").await.unwrap();
        link_oauth(&db, user.id, "github", "1234").await.unwrap();

        let linked = find_user_by_link(&db, "github", "1234").await.unwrap();
        assert_eq!(linked.map(|u| u.id), Some(user.id));
        assert!(find_user_by_link(&db, "google", "1234").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_user_reports_absence() {
        let (db, _dir) = crate::test_db().await;
        let user = create_user(&db, "x@example.com", None, None).await.unwrap();
        assert!(delete_user(&db, user.id).await.unwrap());
        assert!(!delete_user(&db, user.id).await.unwrap());
        assert!(get_user(&db, user.id).await.unwrap().is_none());
    }
}
