//! `escalations` table
//!
//! A partial unique index allows one open row per scope. Inserting a second
//! one fails with [`StoreError::UniqueViolation`](crate::StoreError).

use crate::codec::{json, micros, opt_micros, opt_ts, parsed, ts};
use crate::error::StoreResult;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use tq_core::{ActorId, Escalation, EscalationFilter, EscalationId, EscalationStatus, Scope};

const COLUMNS: &str = "id, scope_type, scope_value, status, contributing_ticket_ids, threshold_used, \
    time_window_days, created_at, resolved_at, resolved_by, resolution_notes";

fn map_row(row: &Row<'_>) -> rusqlite::Result<Escalation> {
    Ok(Escalation {
        id: parsed(row, 0)?,
        scope_type: parsed(row, 1)?,
        scope_value: row.get(2)?,
        status: parsed(row, 3)?,
        contributing_ticket_ids: json(row, 4)?,
        threshold_used: row.get(5)?,
        time_window_days: row.get(6)?,
        created_at: ts(row, 7)?,
        resolved_at: opt_ts(row, 8)?,
        resolved_by: row.get::<_, Option<String>>(9)?.map(ActorId::new),
        resolution_notes: row.get(10)?,
    })
}

/// Insert a new escalation
pub fn insert(conn: &Connection, e: &Escalation) -> StoreResult<()> {
    conn.execute(
        &format!(
            "INSERT INTO escalations ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
        ),
        params![
            e.id.to_string(),
            e.scope_type.as_str(),
            e.scope_value,
            e.status.as_str(),
            serde_json::to_string(&e.contributing_ticket_ids)?,
            e.threshold_used,
            e.time_window_days,
            micros(e.created_at),
            opt_micros(e.resolved_at),
            e.resolved_by.as_ref().map(ActorId::as_str),
            e.resolution_notes,
        ],
    )?;
    Ok(())
}

/// Persist status, contributing tickets and resolution fields
pub fn update(conn: &Connection, e: &Escalation) -> StoreResult<bool> {
    let n = conn.execute(
        "UPDATE escalations
         SET status = ?2, contributing_ticket_ids = ?3, resolved_at = ?4,
             resolved_by = ?5, resolution_notes = ?6
         WHERE id = ?1",
        params![
            e.id.to_string(),
            e.status.as_str(),
            serde_json::to_string(&e.contributing_ticket_ids)?,
            opt_micros(e.resolved_at),
            e.resolved_by.as_ref().map(ActorId::as_str),
            e.resolution_notes,
        ],
    )?;
    Ok(n == 1)
}

/// Fetch by id
pub fn get(conn: &Connection, id: EscalationId) -> StoreResult<Option<Escalation>> {
    Ok(conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM escalations WHERE id = ?1"),
            params![id.to_string()],
            map_row,
        )
        .optional()?)
}

/// The open escalation for a scope, if any
pub fn find_open(conn: &Connection, scope: &Scope) -> StoreResult<Option<Escalation>> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT {COLUMNS} FROM escalations
                 WHERE scope_type = ?1 AND scope_value = ?2 AND status = ?3"
            ),
            params![
                scope.scope_type.as_str(),
                scope.scope_value,
                EscalationStatus::Open.as_str()
            ],
            map_row,
        )
        .optional()?)
}

/// List escalations, newest first
pub fn list(conn: &Connection, filter: &EscalationFilter) -> StoreResult<Vec<Escalation>> {
    let mut clauses: Vec<String> = Vec::new();
    let mut values: Vec<Value> = Vec::new();

    if let Some(scope_type) = filter.scope_type {
        values.push(Value::Text(scope_type.as_str().to_string()));
        clauses.push(format!("scope_type = ?{}", values.len()));
    }
    if let Some(scope_value) = &filter.scope_value {
        values.push(Value::Text(scope_value.clone()));
        clauses.push(format!("scope_value = ?{}", values.len()));
    }
    if let Some(status) = filter.status {
        values.push(Value::Text(status.as_str().to_string()));
        clauses.push(format!("status = ?{}", values.len()));
    }

    let mut sql = format!("SELECT {COLUMNS} FROM escalations");
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY created_at DESC, id");
    if let Some(limit) = filter.limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(values), map_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}
