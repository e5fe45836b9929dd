//! `edit_locks` table

use crate::codec::{micros, parsed, ts};
use crate::error::StoreResult;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tq_core::{ActorId, TicketId, Timestamp};

/// Advisory edit lock on a ticket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditLock {
    /// Locked ticket
    pub ticket_id: TicketId,
    /// Current holder
    pub holder: ActorId,
    /// When the holder first took it
    pub acquired_at: Timestamp,
    /// When it lapses unless refreshed
    pub expires_at: Timestamp,
}

impl EditLock {
    /// Lapsed at `now`
    #[must_use]
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at <= now
    }
}

/// Current row for a ticket, expired or not
pub fn get(conn: &Connection, ticket_id: TicketId) -> StoreResult<Option<EditLock>> {
    Ok(conn
        .query_row(
            "SELECT ticket_id, holder, acquired_at, expires_at FROM edit_locks WHERE ticket_id = ?1",
            params![ticket_id.to_string()],
            |row| {
                Ok(EditLock {
                    ticket_id: parsed(row, 0)?,
                    holder: ActorId::new(row.get::<_, String>(1)?),
                    acquired_at: ts(row, 2)?,
                    expires_at: ts(row, 3)?,
                })
            },
        )
        .optional()?)
}

/// Insert or replace the lock row
pub fn put(conn: &Connection, lock: &EditLock) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO edit_locks (ticket_id, holder, acquired_at, expires_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(ticket_id) DO UPDATE SET
            holder = excluded.holder,
            acquired_at = excluded.acquired_at,
            expires_at = excluded.expires_at",
        params![
            lock.ticket_id.to_string(),
            lock.holder.as_str(),
            micros(lock.acquired_at),
            micros(lock.expires_at),
        ],
    )?;
    Ok(())
}

/// Remove the lock row
pub fn delete(conn: &Connection, ticket_id: TicketId) -> StoreResult<bool> {
    let n = conn.execute(
        "DELETE FROM edit_locks WHERE ticket_id = ?1",
        params![ticket_id.to_string()],
    )?;
    Ok(n == 1)
}
