//! Verification tracker service

use crate::context::{Clock, RequestContext};
use crate::error::{EngineError, EngineResult};
use crate::tickets::load_ticket;
use std::sync::Arc;
use tq_core::verification::step_index;
use tq_core::{HistoryAction, HistoryRecord, StepUpdate, TicketId, VerificationProgress, VerificationStep};
use tq_store::{history, verification, Store};
use tracing::{debug, info};

fn state_label(step: &VerificationStep) -> String {
    let state = if step.completed { "completed" } else { "pending" };
    match (&step.photo_url, step.photo_verified) {
        (None, _) => state.to_string(),
        (Some(_), false) => format!("{state}, photo attached"),
        (Some(_), true) => format!("{state}, photo verified"),
    }
}

/// Checklist operations
pub struct VerificationService {
    store: Arc<Store>,
    clock: Arc<dyn Clock>,
}

impl VerificationService {
    /// Create the service over a shared store
    pub fn new(store: Arc<Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// All 12 steps, ordered by step number
    pub fn list(&self, ticket_id: TicketId) -> EngineResult<Vec<VerificationStep>> {
        self.store.read(|conn| -> EngineResult<_> {
            load_ticket(conn, ticket_id)?;
            Ok(verification::list(conn, ticket_id)?)
        })
    }

    /// Apply a partial update to one step.
    ///
    /// An update that changes nothing returns the step as stored and writes
    /// no history.
    pub fn update(
        &self,
        ctx: &RequestContext,
        ticket_id: TicketId,
        step_number: u32,
        update: StepUpdate,
    ) -> EngineResult<VerificationStep> {
        step_index(step_number)?;
        let now = self.clock.now();
        let (step, changed) = self.store.write(ctx.deadline, |tx| -> EngineResult<_> {
            load_ticket(tx, ticket_id)?;
            let mut step = verification::get(tx, ticket_id, step_number)?.ok_or_else(|| {
                EngineError::not_found("verification step", format!("{ticket_id}#{step_number}"))
            })?;
            let before = state_label(&step);
            if !step.apply(&update, &ctx.actor, now)? {
                return Ok((step, false));
            }
            verification::update(tx, &step)?;
            history::append(
                tx,
                HistoryRecord::ticket(ticket_id, HistoryAction::VerificationUpdate, ctx.actor.clone(), now)
                    .field(
                        format!("step_{step_number}"),
                        Some(before),
                        Some(state_label(&step)),
                    )
                    .reason(update.notes.as_deref()),
            )?;
            Ok((step, true))
        })?;
        if changed {
            info!(
                ticket = %ticket_id,
                step = step_number,
                completed = step.completed,
                photo = step.photo_url.is_some(),
                actor = %ctx.actor,
                "verification step updated"
            );
        }
        Ok(step)
    }

    /// Aggregate completion; never mutates the ticket
    pub fn progress(&self, ticket_id: TicketId) -> EngineResult<VerificationProgress> {
        debug!(ticket = %ticket_id, "verification progress");
        self.store.read(|conn| -> EngineResult<_> {
            load_ticket(conn, ticket_id)?;
            Ok(VerificationProgress::from_count(verification::completed_count(conn, ticket_id)?))
        })
    }
}
