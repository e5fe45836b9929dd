//! Schema bootstrap
//!
//! All statements are idempotent. Timestamps are INTEGER microseconds since
//! the Unix epoch; enums are stored by their snake_case names.

use crate::error::StoreResult;
use rusqlite::Connection;

/// Bumped whenever a statement below changes shape
pub const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS tickets (
    id                        TEXT PRIMARY KEY,
    ticket_uid                TEXT NOT NULL UNIQUE,
    title                     TEXT NOT NULL,
    description               TEXT,
    ticket_type               TEXT NOT NULL,
    status                    TEXT NOT NULL,
    priority                  TEXT NOT NULL,
    source                    TEXT NOT NULL,
    billing_type              TEXT NOT NULL,
    requires_billing_approval INTEGER NOT NULL DEFAULT 0,
    billing_amount_cents      INTEGER,
    billing_currency          TEXT,
    billing_note              TEXT,
    assigned_to               TEXT,
    owner                     TEXT NOT NULL,
    fault_cause               TEXT,
    fault_cause_details       TEXT,
    pole_number               TEXT,
    pon                       TEXT,
    zone_id                   TEXT,
    dr_number                 TEXT,
    qa_ready                  INTEGER NOT NULL DEFAULT 0,
    sla_due_at                INTEGER,
    sla_paused_at             INTEGER,
    sla_pause_reason          TEXT,
    sla_paused_minutes        INTEGER NOT NULL DEFAULT 0,
    resume_status             TEXT,
    created_by                TEXT NOT NULL,
    created_at                INTEGER NOT NULL,
    updated_at                INTEGER NOT NULL,
    CHECK ((status = 'blocked') = (sla_paused_at IS NOT NULL)),
    CHECK ((status IN ('blocked', 'pending_approval')) = (resume_status IS NOT NULL))
);

CREATE INDEX IF NOT EXISTS idx_tickets_pole ON tickets(pole_number, created_at);
CREATE INDEX IF NOT EXISTS idx_tickets_pon ON tickets(pon, created_at);
CREATE INDEX IF NOT EXISTS idx_tickets_zone ON tickets(zone_id, created_at);
CREATE INDEX IF NOT EXISTS idx_tickets_dr ON tickets(dr_number, created_at);
CREATE INDEX IF NOT EXISTS idx_tickets_status ON tickets(status);

CREATE TABLE IF NOT EXISTS verification_steps (
    ticket_id        TEXT NOT NULL REFERENCES tickets(id),
    step_number      INTEGER NOT NULL CHECK (step_number BETWEEN 1 AND 12),
    step_label       TEXT NOT NULL,
    step_description TEXT NOT NULL,
    photo_required   INTEGER NOT NULL,
    completed        INTEGER NOT NULL DEFAULT 0,
    completed_by     TEXT,
    completed_at     INTEGER,
    photo_url        TEXT,
    photo_verified   INTEGER NOT NULL DEFAULT 0,
    notes            TEXT,
    PRIMARY KEY (ticket_id, step_number),
    CHECK (completed = (completed_at IS NOT NULL)),
    CHECK (photo_verified = 0 OR photo_url IS NOT NULL)
);

CREATE TRIGGER IF NOT EXISTS verification_steps_no_delete
BEFORE DELETE ON verification_steps
BEGIN
    SELECT RAISE(ABORT, 'verification steps are never deleted');
END;

CREATE TABLE IF NOT EXISTS handover_snapshots (
    id             TEXT PRIMARY KEY,
    ticket_id      TEXT NOT NULL REFERENCES tickets(id),
    handover_type  TEXT NOT NULL,
    handover_by    TEXT NOT NULL,
    owner_before   TEXT NOT NULL,
    owner_after    TEXT NOT NULL,
    snapshot_data  TEXT NOT NULL,
    content_digest TEXT NOT NULL,
    locked         INTEGER NOT NULL DEFAULT 1 CHECK (locked = 1),
    created_at     INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_snapshots_ticket ON handover_snapshots(ticket_id, created_at);

CREATE TRIGGER IF NOT EXISTS handover_snapshots_no_update
BEFORE UPDATE ON handover_snapshots
BEGIN
    SELECT RAISE(ABORT, 'handover snapshots are immutable');
END;

CREATE TRIGGER IF NOT EXISTS handover_snapshots_no_delete
BEFORE DELETE ON handover_snapshots
BEGIN
    SELECT RAISE(ABORT, 'handover snapshots are immutable');
END;

CREATE TABLE IF NOT EXISTS escalations (
    id                      TEXT PRIMARY KEY,
    scope_type              TEXT NOT NULL,
    scope_value             TEXT NOT NULL,
    status                  TEXT NOT NULL,
    contributing_ticket_ids TEXT NOT NULL,
    threshold_used          INTEGER NOT NULL,
    time_window_days        INTEGER NOT NULL,
    created_at              INTEGER NOT NULL,
    resolved_at             INTEGER,
    resolved_by             TEXT,
    resolution_notes        TEXT
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_escalations_one_open
    ON escalations(scope_type, scope_value) WHERE status = 'open';

CREATE TABLE IF NOT EXISTS history (
    seq            INTEGER PRIMARY KEY,
    entity_type    TEXT NOT NULL,
    entity_id      TEXT NOT NULL,
    action         TEXT NOT NULL,
    field_changed  TEXT,
    old_value      TEXT,
    new_value      TEXT,
    changed_by     TEXT NOT NULL,
    changed_at     INTEGER NOT NULL,
    change_reason  TEXT,
    prev_hash      TEXT NOT NULL,
    hash           TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_history_entity ON history(entity_type, entity_id, seq);

CREATE TRIGGER IF NOT EXISTS history_no_update
BEFORE UPDATE ON history
BEGIN
    SELECT RAISE(ABORT, 'history is append-only');
END;

CREATE TRIGGER IF NOT EXISTS history_no_delete
BEFORE DELETE ON history
BEGIN
    SELECT RAISE(ABORT, 'history is append-only');
END;

CREATE TABLE IF NOT EXISTS edit_locks (
    ticket_id   TEXT PRIMARY KEY REFERENCES tickets(id),
    holder      TEXT NOT NULL,
    acquired_at INTEGER NOT NULL,
    expires_at  INTEGER NOT NULL
);
";

/// Create every table, index and trigger that does not exist yet
pub fn bootstrap(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(SCHEMA)?;
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    Ok(())
}

/// Version recorded in the database header
pub fn schema_version(conn: &Connection) -> StoreResult<i64> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}
