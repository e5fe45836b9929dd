//! `history` table
//!
//! Appends extend the hash chain from the last stored entry. Callers append
//! inside their write transaction, so the chain head cannot move underneath
//! them.

use crate::codec::{micros, parsed, ts};
use crate::error::StoreResult;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tq_core::history::{verify_chain, GENESIS_HASH};
use tq_core::{ActorId, EntityType, HistoryEntry, HistoryRecord, IntegrityReport};

const COLUMNS: &str = "seq, entity_type, entity_id, action, field_changed, old_value, new_value, \
    changed_by, changed_at, change_reason, prev_hash, hash";

fn map_row(row: &Row<'_>) -> rusqlite::Result<HistoryEntry> {
    Ok(HistoryEntry {
        seq: row.get(0)?,
        record: HistoryRecord {
            entity_type: parsed(row, 1)?,
            entity_id: row.get(2)?,
            action: parsed(row, 3)?,
            field_changed: row.get(4)?,
            old_value: row.get(5)?,
            new_value: row.get(6)?,
            changed_by: ActorId::new(row.get::<_, String>(7)?),
            changed_at: ts(row, 8)?,
            change_reason: row.get(9)?,
        },
        prev_hash: row.get(10)?,
        hash: row.get(11)?,
    })
}

/// Append one record to the chain
pub fn append(conn: &Connection, record: HistoryRecord) -> StoreResult<HistoryEntry> {
    let head: Option<(i64, String)> = conn
        .query_row(
            "SELECT seq, hash FROM history ORDER BY seq DESC LIMIT 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    let (seq, prev_hash) = match head {
        Some((seq, hash)) => (seq + 1, hash),
        None => (1, GENESIS_HASH.to_string()),
    };
    let entry = HistoryEntry::seal(seq, record, prev_hash);
    let r = &entry.record;
    conn.execute(
        &format!(
            "INSERT INTO history ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
        ),
        params![
            entry.seq,
            r.entity_type.as_str(),
            r.entity_id,
            r.action.as_str(),
            r.field_changed,
            r.old_value,
            r.new_value,
            r.changed_by.as_str(),
            micros(r.changed_at),
            r.change_reason,
            entry.prev_hash,
            entry.hash,
        ],
    )?;
    Ok(entry)
}

/// Entries for one entity, in order
pub fn for_entity(
    conn: &Connection,
    entity_type: EntityType,
    entity_id: &str,
) -> StoreResult<Vec<HistoryEntry>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM history WHERE entity_type = ?1 AND entity_id = ?2 ORDER BY seq"
    ))?;
    let rows = stmt.query_map(params![entity_type.as_str(), entity_id], map_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Whole chain, in order
pub fn all(conn: &Connection) -> StoreResult<Vec<HistoryEntry>> {
    let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM history ORDER BY seq"))?;
    let rows = stmt.query_map([], map_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Walk the stored chain
pub fn verify(conn: &Connection) -> StoreResult<IntegrityReport> {
    Ok(verify_chain(&all(conn)?))
}
