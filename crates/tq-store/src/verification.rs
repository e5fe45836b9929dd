//! `verification_steps` table

use crate::codec::{opt_micros, opt_ts, parsed};
use crate::error::StoreResult;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tq_core::{ActorId, TicketId, VerificationStep};

const COLUMNS: &str = "ticket_id, step_number, step_label, step_description, photo_required, \
    completed, completed_by, completed_at, photo_url, photo_verified, notes";

fn map_row(row: &Row<'_>) -> rusqlite::Result<VerificationStep> {
    Ok(VerificationStep {
        ticket_id: parsed(row, 0)?,
        step_number: row.get(1)?,
        step_label: row.get(2)?,
        step_description: row.get(3)?,
        photo_required: row.get(4)?,
        completed: row.get(5)?,
        completed_by: row.get::<_, Option<String>>(6)?.map(ActorId::new),
        completed_at: opt_ts(row, 7)?,
        photo_url: row.get(8)?,
        photo_verified: row.get(9)?,
        notes: row.get(10)?,
    })
}

/// Insert a ticket's full checklist
pub fn insert_all(conn: &Connection, steps: &[VerificationStep]) -> StoreResult<()> {
    let mut stmt = conn.prepare(&format!(
        "INSERT INTO verification_steps ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
    ))?;
    for s in steps {
        stmt.execute(params![
            s.ticket_id.to_string(),
            s.step_number,
            s.step_label,
            s.step_description,
            s.photo_required,
            s.completed,
            s.completed_by.as_ref().map(ActorId::as_str),
            opt_micros(s.completed_at),
            s.photo_url,
            s.photo_verified,
            s.notes,
        ])?;
    }
    Ok(())
}

/// All steps for a ticket, ordered by step number
pub fn list(conn: &Connection, ticket_id: TicketId) -> StoreResult<Vec<VerificationStep>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM verification_steps WHERE ticket_id = ?1 ORDER BY step_number"
    ))?;
    let rows = stmt.query_map(params![ticket_id.to_string()], map_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// One step
pub fn get(
    conn: &Connection,
    ticket_id: TicketId,
    step_number: u32,
) -> StoreResult<Option<VerificationStep>> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT {COLUMNS} FROM verification_steps WHERE ticket_id = ?1 AND step_number = ?2"
            ),
            params![ticket_id.to_string(), step_number],
            map_row,
        )
        .optional()?)
}

/// Persist the mutable fields of a step
pub fn update(conn: &Connection, s: &VerificationStep) -> StoreResult<bool> {
    let n = conn.execute(
        "UPDATE verification_steps
         SET completed = ?3, completed_by = ?4, completed_at = ?5,
             photo_url = ?6, photo_verified = ?7, notes = ?8
         WHERE ticket_id = ?1 AND step_number = ?2",
        params![
            s.ticket_id.to_string(),
            s.step_number,
            s.completed,
            s.completed_by.as_ref().map(ActorId::as_str),
            opt_micros(s.completed_at),
            s.photo_url,
            s.photo_verified,
            s.notes,
        ],
    )?;
    Ok(n == 1)
}

/// Completed step count for a ticket
pub fn completed_count(conn: &Connection, ticket_id: TicketId) -> StoreResult<u32> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM verification_steps WHERE ticket_id = ?1 AND completed = 1",
        params![ticket_id.to_string()],
        |row| row.get(0),
    )?)
}
