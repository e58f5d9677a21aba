// SPDX-FileCopyrightText: 2026 Area Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence for the Area automation broker.
//!
//! One WAL-mode database holds users, service accounts, sealed credentials,
//! pending OAuth states, Areas, and reaction deliveries. Every query is an
//! async free function over a [`Database`] handle.

pub mod database;
pub mod migrations;
pub mod models;
pub mod queries;
pub mod time;

pub use database::Database;
pub use models::*;

#[cfg(test)]
pub(crate) async fn test_db() -> (Database, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("test.db");
    let db = Database::open(path.to_str().unwrap()).await.unwrap();
    (db, dir)
}

#[cfg(test)]
pub(crate) fn test_service(id: i64, name: &str) -> ServiceRow {
    ServiceRow {
        id,
        name: name.to_string(),
        display_name: name.to_string(),
        description: String::new(),
        oauth_provider: Some(name.to_string()),
        icon: None,
        color: None,
        category: None,
    }
}
