//! Column encoding shared by the table modules

use chrono::DateTime;
use rusqlite::types::Type;
use rusqlite::Row;
use std::str::FromStr;
use tq_core::Timestamp;

pub(crate) fn micros(ts: Timestamp) -> i64 {
    ts.timestamp_micros()
}

pub(crate) fn opt_micros(ts: Option<Timestamp>) -> Option<i64> {
    ts.map(micros)
}

fn conversion_error(
    idx: usize,
    ty: Type,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, ty, Box::new(err))
}

#[derive(Debug, thiserror::Error)]
#[error("timestamp {0} out of range")]
struct TimestampRange(i64);

/// Read a microsecond timestamp column
pub(crate) fn ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<Timestamp> {
    let raw: i64 = row.get(idx)?;
    DateTime::from_timestamp_micros(raw).ok_or_else(|| conversion_error(idx, Type::Integer, TimestampRange(raw)))
}

/// Read a nullable microsecond timestamp column
pub(crate) fn opt_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Timestamp>> {
    let raw: Option<i64> = row.get(idx)?;
    raw.map(|v| {
        DateTime::from_timestamp_micros(v).ok_or_else(|| conversion_error(idx, Type::Integer, TimestampRange(v)))
    })
    .transpose()
}

/// Read a text column through `FromStr` (enums, ids)
pub(crate) fn parsed<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion_error(idx, Type::Text, e))
}

/// Nullable variant of [`parsed`]
pub(crate) fn opt_parsed<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: Option<String> = row.get(idx)?;
    raw.map(|v| v.parse().map_err(|e| conversion_error(idx, Type::Text, e)))
        .transpose()
}

/// Read a JSON text column
pub(crate) fn json<T: serde::de::DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_error(idx, Type::Text, e))
}
