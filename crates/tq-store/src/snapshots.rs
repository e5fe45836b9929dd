//! `handover_snapshots` table
//!
//! Insert-only. The payload is stored as the exact JSON text that was
//! digested, so reads return it byte for byte.

use crate::codec::{micros, parsed, ts};
use crate::error::StoreResult;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tq_core::{ActorId, HandoverSnapshot, SnapshotId, TicketId};

const COLUMNS: &str = "id, ticket_id, handover_type, handover_by, owner_before, owner_after, \
    snapshot_data, content_digest, locked, created_at";

fn map_row(row: &Row<'_>) -> rusqlite::Result<HandoverSnapshot> {
    let raw: String = row.get(6)?;
    let snapshot_data = serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?;
    Ok(HandoverSnapshot {
        id: parsed(row, 0)?,
        ticket_id: parsed(row, 1)?,
        handover_type: parsed(row, 2)?,
        handover_by: ActorId::new(row.get::<_, String>(3)?),
        owner_before: parsed(row, 4)?,
        owner_after: parsed(row, 5)?,
        snapshot_data,
        content_digest: row.get(7)?,
        locked: row.get(8)?,
        created_at: ts(row, 9)?,
    })
}

/// Insert a locked snapshot
pub fn insert(conn: &Connection, s: &HandoverSnapshot) -> StoreResult<()> {
    conn.execute(
        &format!("INSERT INTO handover_snapshots ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1, ?9)"),
        params![
            s.id.to_string(),
            s.ticket_id.to_string(),
            s.handover_type.as_str(),
            s.handover_by.as_str(),
            s.owner_before.as_str(),
            s.owner_after.as_str(),
            s.snapshot_data.to_string(),
            s.content_digest,
            micros(s.created_at),
        ],
    )?;
    Ok(())
}

/// Fetch by id
pub fn get(conn: &Connection, id: SnapshotId) -> StoreResult<Option<HandoverSnapshot>> {
    Ok(conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM handover_snapshots WHERE id = ?1"),
            params![id.to_string()],
            map_row,
        )
        .optional()?)
}

/// Raw stored payload text
pub fn raw_data(conn: &Connection, id: SnapshotId) -> StoreResult<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT snapshot_data FROM handover_snapshots WHERE id = ?1",
            params![id.to_string()],
            |row| row.get(0),
        )
        .optional()?)
}

/// Every snapshot for a ticket, oldest first
pub fn list_for_ticket(conn: &Connection, ticket_id: TicketId) -> StoreResult<Vec<HandoverSnapshot>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM handover_snapshots WHERE ticket_id = ?1 ORDER BY created_at, rowid"
    ))?;
    let rows = stmt.query_map(params![ticket_id.to_string()], map_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}
