// SPDX-FileCopyrightText: 2026 Area Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Service reference rows. The in-memory catalog is authoritative; these rows
//! exist so accounts and areas can hold foreign keys.

use area_core::AreaError;
use rusqlite::{OptionalExtension, params};

use crate::database::Database;
use crate::models::ServiceRow;

const SERVICE_COLUMNS: &str =
    "id, name, display_name, description, oauth_provider, icon, color, category";

fn service_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ServiceRow> {
    Ok(ServiceRow {
        id: row.get(0)?,
        name: row.get(1)?,
        display_name: row.get(2)?,
        description: row.get(3)?,
        oauth_provider: row.get(4)?,
        icon: row.get(5)?,
        color: row.get(6)?,
        category: row.get(7)?,
    })
}

/// Upsert every catalog service by id in one transaction.
///
/// Names are immutable: seeding a known id under a different name is rejected.
pub async fn seed_services(db: &Database, services: &[ServiceRow]) -> Result<(), AreaError> {
    let services = services.to_vec();
    let renamed = db
        .connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            for service in &services {
                let existing: Option<String> = tx
                    .query_row(
                        "SELECT name FROM services WHERE id = ?1",
                        params![service.id],
                        |row| row.get(0),
                    )
                    .optional()?;
                if let Some(name) = existing
                    && name != service.name
                {
                    return Ok(Some((service.id, name, service.name.clone())));
                }
                tx.execute(
                    "INSERT INTO services (id, name, display_name, description, oauth_provider,
                                           icon, color, category)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                     ON CONFLICT(id) DO UPDATE SET
                        display_name = excluded.display_name,
                        description = excluded.description,
                        oauth_provider = excluded.oauth_provider,
                        icon = excluded.icon,
                        color = excluded.color,
                        category = excluded.category",
                    params![
                        service.id,
                        service.name,
                        service.display_name,
                        service.description,
                        service.oauth_provider,
                        service.icon,
                        service.color,
                        service.category,
                    ],
                )?;
            }
            tx.commit()?;
            Ok(None)
        })
        .await
        .map_err(crate::database::map_tr_err)?;

    match renamed {
        Some((id, old, new)) => Err(AreaError::InvariantViolation(format!(
            "service {id} is stored as `{old}` but the catalog names it `{new}`"
        ))),
        None => Ok(()),
    }
}

/// All services ordered by id.
pub async fn list_services(db: &Database) -> Result<Vec<ServiceRow>, AreaError> {
    db.connection()
        .call(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {SERVICE_COLUMNS} FROM services ORDER BY id"))?;
            let rows = stmt.query_map([], service_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Fetch one service by id.
pub async fn get_service(db: &Database, id: i64) -> Result<Option<ServiceRow>, AreaError> {
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {SERVICE_COLUMNS} FROM services WHERE id = ?1"),
                params![id],
                service_from_row,
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}
