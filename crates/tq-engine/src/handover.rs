//! Handover gate and snapshot service
//!
//! `create_handover` evaluates the gate and, when nothing blocks, writes the
//! snapshot, moves ownership and records history in one transaction.

use crate::context::{Clock, RequestContext};
use crate::error::{EngineError, EngineResult};
use crate::notify::{dispatch, Notifier};
use crate::tickets::load_ticket;
use std::sync::Arc;
use tq_core::handover::content_digest;
use tq_core::{
    GateEvaluation, HandoverHistory, HandoverSnapshot, HandoverType, HistoryAction, HistoryRecord,
    Notification, SnapshotId, TicketId,
};
use tq_store::{history, snapshots, tickets, verification, Connection, Store};
use tracing::{debug, info, warn};

fn evaluate(conn: &Connection, ticket_id: TicketId, handover_type: HandoverType) -> EngineResult<GateEvaluation> {
    let ticket = load_ticket(conn, ticket_id)?;
    let steps = verification::list(conn, ticket_id)?;
    Ok(GateEvaluation::evaluate(&ticket, &steps, handover_type))
}

/// Handover operations
pub struct HandoverService {
    store: Arc<Store>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
}

impl HandoverService {
    /// Create the service over a shared store
    pub fn new(store: Arc<Store>, clock: Arc<dyn Clock>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            clock,
            notifier,
        }
    }

    /// Evaluate the gate without changing anything
    pub fn validate_gate(
        &self,
        ticket_id: TicketId,
        handover_type: HandoverType,
    ) -> EngineResult<GateEvaluation> {
        let eval = self
            .store
            .read(|conn| evaluate(conn, ticket_id, handover_type))?;
        debug!(
            ticket = %ticket_id,
            %handover_type,
            can_handover = eval.can_handover,
            blocking = eval.blocking_issues.len(),
            warnings = eval.warnings.len(),
            "gate evaluated"
        );
        Ok(eval)
    }

    /// Hand the ticket to the next team
    pub fn create_handover(
        &self,
        ctx: &RequestContext,
        ticket_id: TicketId,
        handover_type: HandoverType,
    ) -> EngineResult<HandoverSnapshot> {
        let now = self.clock.now();
        let result = self.store.write(ctx.deadline, |tx| -> EngineResult<_> {
            let eval = evaluate(tx, ticket_id, handover_type)?;
            if !eval.can_handover {
                return Err(EngineError::HandoverGateFailed(Box::new(eval)));
            }
            let mut ticket = load_ticket(tx, ticket_id)?;
            let steps = verification::list(tx, ticket_id)?;
            let snapshot = HandoverSnapshot::new(&ticket, &steps, handover_type, ctx.actor.clone(), now)?;
            snapshots::insert(tx, &snapshot)?;

            ticket.owner = snapshot.owner_after;
            ticket.updated_at = now;
            tickets::update(tx, &ticket)?;
            history::append(
                tx,
                HistoryRecord::ticket(ticket_id, HistoryAction::Handover, ctx.actor.clone(), now)
                    .field(
                        "owner",
                        Some(snapshot.owner_before.to_string()),
                        Some(snapshot.owner_after.to_string()),
                    )
                    .reason(Some(handover_type.as_str())),
            )?;
            Ok((ticket, snapshot))
        });

        let (ticket, snapshot) = match result {
            Ok(done) => done,
            Err(EngineError::HandoverGateFailed(eval)) => {
                warn!(
                    ticket = %ticket_id,
                    %handover_type,
                    blocking = eval.blocking_issues.len(),
                    "handover rejected by gate"
                );
                return Err(EngineError::HandoverGateFailed(eval));
            }
            Err(e) => return Err(e),
        };

        info!(
            ticket = %ticket.ticket_uid,
            snapshot = %snapshot.id,
            from = %snapshot.owner_before,
            to = %snapshot.owner_after,
            actor = %ctx.actor,
            "handover complete"
        );
        dispatch(
            self.notifier.as_ref(),
            &[Notification::handover_complete(&ticket, &snapshot)],
        );
        Ok(snapshot)
    }

    /// Current owner and every snapshot, oldest first
    pub fn handover_history(&self, ticket_id: TicketId) -> EngineResult<HandoverHistory> {
        self.store.read(|conn| -> EngineResult<_> {
            let ticket = load_ticket(conn, ticket_id)?;
            Ok(HandoverHistory {
                ticket_id,
                current_owner: ticket.owner,
                handovers: snapshots::list_for_ticket(conn, ticket_id)?,
            })
        })
    }

    /// Fetch one snapshot
    pub fn get_snapshot(&self, id: SnapshotId) -> EngineResult<HandoverSnapshot> {
        self.store.read(|conn| -> EngineResult<_> {
            snapshots::get(conn, id)?.ok_or_else(|| EngineError::not_found("handover snapshot", id))
        })
    }

    /// Recompute the digest over the stored payload text
    pub fn verify_snapshot(&self, id: SnapshotId) -> EngineResult<bool> {
        self.store.read(|conn| -> EngineResult<_> {
            let snapshot =
                snapshots::get(conn, id)?.ok_or_else(|| EngineError::not_found("handover snapshot", id))?;
            let raw = snapshots::raw_data(conn, id)?.unwrap_or_default();
            let reparsed: serde_json::Value = serde_json::from_str(&raw)
                .map_err(|e| EngineError::validation(format!("snapshot {id} payload unreadable: {e}")))?;
            Ok(raw == reparsed.to_string() && content_digest(&reparsed) == snapshot.content_digest)
        })
    }
}
