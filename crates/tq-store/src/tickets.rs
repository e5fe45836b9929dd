//! `tickets` table

use crate::codec::{micros, opt_micros, opt_parsed, opt_ts, parsed, ts};
use crate::error::StoreResult;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use tq_core::{
    ActorId, BillingCost, ScopeFields, ScopeType, Ticket, TicketFilter, TicketId, Timestamp,
};

const COLUMNS: &str = "id, ticket_uid, title, description, ticket_type, status, priority, source, \
    billing_type, requires_billing_approval, billing_amount_cents, billing_currency, billing_note, \
    assigned_to, owner, fault_cause, fault_cause_details, pole_number, pon, zone_id, dr_number, \
    qa_ready, sla_due_at, sla_paused_at, sla_pause_reason, sla_paused_minutes, resume_status, \
    created_by, created_at, updated_at";

fn scope_column(scope_type: ScopeType) -> &'static str {
    match scope_type {
        ScopeType::Pole => "pole_number",
        ScopeType::Pon => "pon",
        ScopeType::Zone => "zone_id",
        ScopeType::Dr => "dr_number",
    }
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<Ticket> {
    let amount: Option<i64> = row.get(10)?;
    let currency: Option<String> = row.get(11)?;
    let billing_cost = match (amount, currency) {
        (Some(amount_cents), Some(currency)) => Some(BillingCost {
            amount_cents,
            currency,
            note: row.get(12)?,
        }),
        _ => None,
    };
    Ok(Ticket {
        id: parsed(row, 0)?,
        ticket_uid: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        ticket_type: parsed(row, 4)?,
        status: parsed(row, 5)?,
        priority: parsed(row, 6)?,
        source: parsed(row, 7)?,
        billing_type: parsed(row, 8)?,
        requires_billing_approval: row.get(9)?,
        billing_cost,
        assigned_to: row.get::<_, Option<String>>(13)?.map(ActorId::new),
        owner: parsed(row, 14)?,
        fault_cause: opt_parsed(row, 15)?,
        fault_cause_details: row.get(16)?,
        scope: ScopeFields {
            pole_number: row.get(17)?,
            pon: row.get(18)?,
            zone_id: row.get(19)?,
            dr_number: row.get(20)?,
        },
        qa_ready: row.get(21)?,
        sla_due_at: opt_ts(row, 22)?,
        sla_paused_at: opt_ts(row, 23)?,
        sla_pause_reason: row.get(24)?,
        sla_paused_minutes: row.get(25)?,
        resume_status: opt_parsed(row, 26)?,
        created_by: ActorId::new(row.get::<_, String>(27)?),
        created_at: ts(row, 28)?,
        updated_at: ts(row, 29)?,
    })
}

/// Insert a new ticket
pub fn insert(conn: &Connection, t: &Ticket) -> StoreResult<()> {
    conn.execute(
        &format!(
            "INSERT INTO tickets ({COLUMNS}) VALUES \
             (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, \
              ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29, ?30)"
        ),
        params![
            t.id.to_string(),
            t.ticket_uid,
            t.title,
            t.description,
            t.ticket_type.as_str(),
            t.status.as_str(),
            t.priority.as_str(),
            t.source.as_str(),
            t.billing_type.as_str(),
            t.requires_billing_approval,
            t.billing_cost.as_ref().map(|c| c.amount_cents),
            t.billing_cost.as_ref().map(|c| c.currency.clone()),
            t.billing_cost.as_ref().and_then(|c| c.note.clone()),
            t.assigned_to.as_ref().map(ActorId::as_str),
            t.owner.as_str(),
            t.fault_cause.map(|c| c.as_str()),
            t.fault_cause_details,
            t.scope.pole_number,
            t.scope.pon,
            t.scope.zone_id,
            t.scope.dr_number,
            t.qa_ready,
            opt_micros(t.sla_due_at),
            opt_micros(t.sla_paused_at),
            t.sla_pause_reason,
            t.sla_paused_minutes,
            t.resume_status.map(|s| s.as_str()),
            t.created_by.as_str(),
            micros(t.created_at),
            micros(t.updated_at),
        ],
    )?;
    Ok(())
}

/// Overwrite every mutable column of an existing ticket.
///
/// Returns false when no row has the ticket's id.
pub fn update(conn: &Connection, t: &Ticket) -> StoreResult<bool> {
    let n = conn.execute(
        "UPDATE tickets SET
            title = ?2, description = ?3, ticket_type = ?4, status = ?5, priority = ?6,
            billing_type = ?7, requires_billing_approval = ?8, billing_amount_cents = ?9,
            billing_currency = ?10, billing_note = ?11, assigned_to = ?12, owner = ?13,
            fault_cause = ?14, fault_cause_details = ?15, pole_number = ?16, pon = ?17,
            zone_id = ?18, dr_number = ?19, qa_ready = ?20, sla_due_at = ?21,
            sla_paused_at = ?22, sla_pause_reason = ?23, sla_paused_minutes = ?24,
            resume_status = ?25, updated_at = ?26
         WHERE id = ?1",
        params![
            t.id.to_string(),
            t.title,
            t.description,
            t.ticket_type.as_str(),
            t.status.as_str(),
            t.priority.as_str(),
            t.billing_type.as_str(),
            t.requires_billing_approval,
            t.billing_cost.as_ref().map(|c| c.amount_cents),
            t.billing_cost.as_ref().map(|c| c.currency.clone()),
            t.billing_cost.as_ref().and_then(|c| c.note.clone()),
            t.assigned_to.as_ref().map(ActorId::as_str),
            t.owner.as_str(),
            t.fault_cause.map(|c| c.as_str()),
            t.fault_cause_details,
            t.scope.pole_number,
            t.scope.pon,
            t.scope.zone_id,
            t.scope.dr_number,
            t.qa_ready,
            opt_micros(t.sla_due_at),
            opt_micros(t.sla_paused_at),
            t.sla_pause_reason,
            t.sla_paused_minutes,
            t.resume_status.map(|s| s.as_str()),
            micros(t.updated_at),
        ],
    )?;
    Ok(n == 1)
}

/// Fetch by id
pub fn get(conn: &Connection, id: TicketId) -> StoreResult<Option<Ticket>> {
    Ok(conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM tickets WHERE id = ?1"),
            params![id.to_string()],
            map_row,
        )
        .optional()?)
}

/// Fetch by human-facing code
pub fn get_by_uid(conn: &Connection, ticket_uid: &str) -> StoreResult<Option<Ticket>> {
    Ok(conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM tickets WHERE ticket_uid = ?1"),
            params![ticket_uid],
            map_row,
        )
        .optional()?)
}

/// Whether a human-facing code is taken
pub fn uid_exists(conn: &Connection, ticket_uid: &str) -> StoreResult<bool> {
    Ok(conn
        .query_row(
            "SELECT 1 FROM tickets WHERE ticket_uid = ?1",
            params![ticket_uid],
            |_| Ok(()),
        )
        .optional()?
        .is_some())
}

/// List tickets matching a filter, newest first
pub fn list(conn: &Connection, filter: &TicketFilter) -> StoreResult<Vec<Ticket>> {
    let mut clauses: Vec<String> = Vec::new();
    let mut values: Vec<Value> = Vec::new();

    if let Some(status) = filter.status {
        values.push(Value::Text(status.as_str().to_string()));
        clauses.push(format!("status = ?{}", values.len()));
    }
    if let Some(scope) = &filter.scope {
        values.push(Value::Text(scope.scope_value.trim().to_string()));
        clauses.push(format!("{} = ?{}", scope_column(scope.scope_type), values.len()));
    }
    if let Some(assignee) = &filter.assigned_to {
        values.push(Value::Text(assignee.as_str().to_string()));
        clauses.push(format!("assigned_to = ?{}", values.len()));
    }
    if let Some(after) = filter.created_after {
        values.push(Value::Integer(micros(after)));
        clauses.push(format!("created_at >= ?{}", values.len()));
    }
    if let Some(before) = filter.created_before {
        values.push(Value::Integer(micros(before)));
        clauses.push(format!("created_at <= ?{}", values.len()));
    }

    let mut sql = format!("SELECT {COLUMNS} FROM tickets");
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

/// Tickets on one scope created inside `[from, to]`, oldest first
pub fn in_window(
    conn: &Connection,
    scope_type: ScopeType,
    scope_value: &str,
    from: Timestamp,
    to: Timestamp,
) -> StoreResult<Vec<(TicketId, Timestamp)>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id, created_at FROM tickets
         WHERE {} = ?1 AND created_at >= ?2 AND created_at <= ?3
         ORDER BY created_at ASC, id ASC",
        scope_column(scope_type)
    ))?;
    let rows = stmt.query_map(params![scope_value, micros(from), micros(to)], |row| {
        Ok((parsed(row, 0)?, ts(row, 1)?))
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Distinct non-blank values of one scope column among tickets created at or after `since`
pub fn distinct_scope_values(
    conn: &Connection,
    scope_type: ScopeType,
    since: Timestamp,
) -> StoreResult<Vec<String>> {
    let column = scope_column(scope_type);
    let mut stmt = conn.prepare(&format!(
        "SELECT DISTINCT {column} FROM tickets
         WHERE {column} IS NOT NULL AND TRIM({column}) <> '' AND created_at >= ?1
         ORDER BY {column}"
    ))?;
    let rows = stmt.query_map(params![micros(since)], |row| row.get(0))?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}
