// SPDX-FileCopyrightText: 2026 Area Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query modules, one per table family.

pub mod accounts;
pub mod areas;
pub mod credentials;
pub mod deliveries;
pub mod services;
pub mod states;
pub mod users;

use area_core::Params;

/// Encode bound parameters as a JSON object string.
pub(crate) fn params_to_db(params: &Params) -> String {
    serde_json::Value::Object(params.clone()).to_string()
}

/// Decode a stored parameter object. Non-object JSON is a conversion failure.
pub(crate) fn params_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Params> {
    let raw: String = row.get(idx)?;
    let conversion = |e: Box<dyn std::error::Error + Send + Sync>| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e)
    };
    match serde_json::from_str::<serde_json::Value>(&raw).map_err(|e| conversion(Box::new(e)))? {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(conversion(
            format!("expected a JSON object, found {other}").into(),
        )),
    }
}

/// Decode a strum-backed enum column.
pub(crate) fn enum_column<T>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}
