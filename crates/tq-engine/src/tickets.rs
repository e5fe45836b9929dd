//! Ticket lifecycle service
//!
//! Owns ticket records: creation (with the checklist), status transitions,
//! assignment, billing approval, fault attribution and QA readiness.

use crate::context::{Clock, RequestContext};
use crate::error::{EngineError, EngineResult};
use crate::notify::{dispatch, Notifier};
use rand::Rng;
use std::sync::Arc;
use tq_core::state_machine::{apply_transition, available_transitions, validate_transition};
use tq_core::{
    ActorId, BillingCost, EntityType, FaultCause, HistoryAction, HistoryEntry, HistoryRecord,
    NewTicket, Notification, Ticket, TicketFilter, TicketId, TicketStatus, TransitionKind,
    VerificationProgress, VerificationStep,
};
use tq_store::{history, tickets, verification, Connection, Store};
use tracing::{debug, info};

const UID_ATTEMPTS: usize = 32;

/// Load a ticket or fail with `NotFound`
pub(crate) fn load_ticket(conn: &Connection, id: TicketId) -> EngineResult<Ticket> {
    tickets::get(conn, id)?.ok_or_else(|| EngineError::not_found("ticket", id))
}

fn generate_uid(conn: &Connection) -> EngineResult<String> {
    let mut rng = rand::thread_rng();
    for _ in 0..UID_ATTEMPTS {
        let candidate = format!("FT{:06}", rng.gen_range(0..1_000_000u32));
        if !tickets::uid_exists(conn, &candidate)? {
            return Ok(candidate);
        }
    }
    Err(EngineError::ConcurrencyConflict(
        "could not allocate a free ticket uid".into(),
    ))
}

fn describe_cost(cost: &BillingCost) -> String {
    let units = cost.amount_cents / 100;
    let cents = (cost.amount_cents % 100).abs();
    format!("{units}.{cents:02} {}", cost.currency)
}

/// Ticket lifecycle operations
pub struct TicketService {
    store: Arc<Store>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
}

impl TicketService {
    /// Create the service over a shared store
    pub fn new(store: Arc<Store>, clock: Arc<dyn Clock>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            clock,
            notifier,
        }
    }

    /// Create a ticket and its 12 pending checklist steps in one transaction
    pub fn create_ticket(&self, ctx: &RequestContext, new: NewTicket) -> EngineResult<Ticket> {
        new.validate()?;
        let now = self.clock.now();
        let ticket = self.store.write(ctx.deadline, |tx| -> EngineResult<Ticket> {
            let uid = generate_uid(tx)?;
            let ticket = Ticket::from_new(TicketId::new(), uid, new, ctx.actor.clone(), now);
            tickets::insert(tx, &ticket)?;
            verification::insert_all(tx, &VerificationStep::materialize(ticket.id))?;
            history::append(
                tx,
                HistoryRecord::ticket(ticket.id, HistoryAction::Created, ctx.actor.clone(), now)
                    .field("status", None, Some(ticket.status.to_string())),
            )?;
            Ok(ticket)
        })?;

        info!(ticket = %ticket.ticket_uid, id = %ticket.id, actor = %ctx.actor, "ticket created");
        if let Some(assignee) = &ticket.assigned_to {
            dispatch(
                self.notifier.as_ref(),
                &[Notification::ticket_assigned(&ticket, assignee)],
            );
        }
        Ok(ticket)
    }

    /// Fetch a ticket
    pub fn get_ticket(&self, id: TicketId) -> EngineResult<Ticket> {
        debug!(%id, "get ticket");
        self.store.read(|conn| load_ticket(conn, id))
    }

    /// Fetch a ticket by its `FT` code
    pub fn get_ticket_by_uid(&self, ticket_uid: &str) -> EngineResult<Ticket> {
        self.store.read(|conn| -> EngineResult<_> {
            tickets::get_by_uid(conn, ticket_uid)?
                .ok_or_else(|| EngineError::not_found("ticket", ticket_uid))
        })
    }

    /// List tickets, newest first
    pub fn list_tickets(&self, filter: &TicketFilter) -> EngineResult<Vec<Ticket>> {
        self.store
            .read(|conn| -> EngineResult<_> { Ok(tickets::list(conn, filter)?) })
    }

    /// Statuses the ticket may move to now
    pub fn available_transitions(&self, id: TicketId) -> EngineResult<Vec<TicketStatus>> {
        let ticket = self.get_ticket(id)?;
        Ok(available_transitions(&ticket))
    }

    /// Move a ticket to a new status
    pub fn transition_status(
        &self,
        ctx: &RequestContext,
        id: TicketId,
        to: TicketStatus,
        reason: Option<&str>,
    ) -> EngineResult<Ticket> {
        self.transition_with(ctx, id, reason, |t| {
            let kind = validate_transition(t, to)?;
            Ok((kind, to))
        })
    }

    /// Approve billing on a ticket pending approval; it returns to its prior status
    pub fn approve_billing(
        &self,
        ctx: &RequestContext,
        id: TicketId,
        note: Option<&str>,
    ) -> EngineResult<Ticket> {
        self.transition_with(ctx, id, Some(note.unwrap_or("billing approved")), |t| {
            let to = match (t.status, t.resume_status) {
                (TicketStatus::PendingApproval, Some(resume)) => resume,
                (from, _) => {
                    return Err(EngineError::InvalidTransition {
                        from,
                        to: from,
                        reason: "ticket is not pending billing approval".into(),
                    })
                }
            };
            let kind = validate_transition(t, to)?;
            Ok((kind, to))
        })
    }

    /// Reject billing on a ticket pending approval; it is cancelled
    pub fn reject_billing(
        &self,
        ctx: &RequestContext,
        id: TicketId,
        reason: &str,
    ) -> EngineResult<Ticket> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(EngineError::validation("a rejection reason is required"));
        }
        self.transition_with(ctx, id, Some(reason), |t| {
            if t.status != TicketStatus::PendingApproval {
                return Err(EngineError::InvalidTransition {
                    from: t.status,
                    to: TicketStatus::Cancelled,
                    reason: "ticket is not pending billing approval".into(),
                });
            }
            let kind = validate_transition(t, TicketStatus::Cancelled)?;
            debug_assert_eq!(kind, TransitionKind::Reject);
            Ok((kind, TicketStatus::Cancelled))
        })
    }

    fn transition_with<F>(
        &self,
        ctx: &RequestContext,
        id: TicketId,
        reason: Option<&str>,
        pick: F,
    ) -> EngineResult<Ticket>
    where
        F: FnOnce(&Ticket) -> EngineResult<(TransitionKind, TicketStatus)>,
    {
        let now = self.clock.now();
        let (ticket, from) = self.store.write(ctx.deadline, |tx| -> EngineResult<_> {
            let mut ticket = load_ticket(tx, id)?;
            let from = ticket.status;
            let (kind, to) = pick(&ticket)?;
            apply_transition(&mut ticket, kind, to, now, reason);
            tickets::update(tx, &ticket)?;
            history::append(
                tx,
                HistoryRecord::ticket(id, HistoryAction::StatusChange, ctx.actor.clone(), now)
                    .field("status", Some(from.to_string()), Some(to.to_string()))
                    .reason(reason),
            )?;
            Ok((ticket, from))
        })?;
        info!(
            ticket = %ticket.ticket_uid,
            %from,
            to = %ticket.status,
            actor = %ctx.actor,
            "status changed"
        );
        Ok(ticket)
    }

    /// Change the assignee
    pub fn assign(
        &self,
        ctx: &RequestContext,
        id: TicketId,
        assignee: ActorId,
        reason: Option<&str>,
    ) -> EngineResult<Ticket> {
        if assignee.as_str().trim().is_empty() {
            return Err(EngineError::validation("assignee must not be blank"));
        }
        let now = self.clock.now();
        let ticket = self.store.write(ctx.deadline, |tx| -> EngineResult<_> {
            let mut ticket = load_ticket(tx, id)?;
            if ticket.assigned_to.as_ref() == Some(&assignee) {
                return Err(EngineError::NoOpAssignment(assignee.clone()));
            }
            let previous = ticket.assigned_to.replace(assignee.clone());
            ticket.updated_at = now;
            tickets::update(tx, &ticket)?;
            history::append(
                tx,
                HistoryRecord::ticket(id, HistoryAction::Assignment, ctx.actor.clone(), now)
                    .field(
                        "assigned_to",
                        previous.map(|p| p.to_string()),
                        Some(assignee.to_string()),
                    )
                    .reason(reason),
            )?;
            Ok(ticket)
        })?;
        info!(ticket = %ticket.ticket_uid, assignee = %assignee, actor = %ctx.actor, "ticket assigned");
        dispatch(
            self.notifier.as_ref(),
            &[Notification::ticket_assigned(&ticket, &assignee)],
        );
        Ok(ticket)
    }

    /// Attach or replace billing cost data
    pub fn attach_billing_cost(
        &self,
        ctx: &RequestContext,
        id: TicketId,
        cost: BillingCost,
    ) -> EngineResult<Ticket> {
        cost.validate()?;
        let now = self.clock.now();
        self.store.write(ctx.deadline, |tx| -> EngineResult<_> {
            let mut ticket = load_ticket(tx, id)?;
            if ticket.status.is_terminal() {
                return Err(EngineError::validation(format!(
                    "ticket {} is {}; billing data is frozen",
                    ticket.ticket_uid, ticket.status
                )));
            }
            let old = ticket.billing_cost.as_ref().map(describe_cost);
            let new = describe_cost(&cost);
            ticket.billing_cost = Some(cost);
            ticket.updated_at = now;
            tickets::update(tx, &ticket)?;
            history::append(
                tx,
                HistoryRecord::ticket(id, HistoryAction::FieldUpdate, ctx.actor.clone(), now)
                    .field("billing_cost", old, Some(new)),
            )?;
            Ok(ticket)
        })
    }

    /// Attribute the fault cause, optionally with supporting detail
    pub fn set_fault_cause(
        &self,
        ctx: &RequestContext,
        id: TicketId,
        cause: FaultCause,
        details: Option<&str>,
    ) -> EngineResult<Ticket> {
        let details = details.map(str::trim).filter(|d| !d.is_empty());
        let now = self.clock.now();
        self.store.write(ctx.deadline, |tx| -> EngineResult<_> {
            let mut ticket = load_ticket(tx, id)?;
            let mut changed = false;
            if ticket.fault_cause != Some(cause) {
                history::append(
                    tx,
                    HistoryRecord::ticket(id, HistoryAction::FieldUpdate, ctx.actor.clone(), now)
                        .field(
                            "fault_cause",
                            ticket.fault_cause.map(|c| c.to_string()),
                            Some(cause.to_string()),
                        ),
                )?;
                ticket.fault_cause = Some(cause);
                changed = true;
            }
            if let Some(details) = details {
                if ticket.fault_cause_details.as_deref() != Some(details) {
                    history::append(
                        tx,
                        HistoryRecord::ticket(id, HistoryAction::FieldUpdate, ctx.actor.clone(), now)
                            .field(
                                "fault_cause_details",
                                ticket.fault_cause_details.clone(),
                                Some(details.to_string()),
                            ),
                    )?;
                    ticket.fault_cause_details = Some(details.to_string());
                    changed = true;
                }
            }
            if changed {
                ticket.updated_at = now;
                tickets::update(tx, &ticket)?;
            }
            Ok(ticket)
        })
    }

    /// Recompute `qa_ready` from the checklist
    pub fn refresh_qa_readiness(&self, ctx: &RequestContext, id: TicketId) -> EngineResult<Ticket> {
        let now = self.clock.now();
        self.store.write(ctx.deadline, |tx| -> EngineResult<_> {
            let mut ticket = load_ticket(tx, id)?;
            let progress = VerificationProgress::from_count(verification::completed_count(tx, id)?);
            if ticket.qa_ready != progress.all_complete {
                history::append(
                    tx,
                    HistoryRecord::ticket(id, HistoryAction::FieldUpdate, ctx.actor.clone(), now)
                        .field(
                            "qa_ready",
                            Some(ticket.qa_ready.to_string()),
                            Some(progress.all_complete.to_string()),
                        ),
                )?;
                ticket.qa_ready = progress.all_complete;
                ticket.updated_at = now;
                tickets::update(tx, &ticket)?;
                info!(ticket = %ticket.ticket_uid, qa_ready = ticket.qa_ready, "qa readiness changed");
            }
            Ok(ticket)
        })
    }

    /// History entries for a ticket, oldest first
    pub fn ticket_history(&self, id: TicketId) -> EngineResult<Vec<HistoryEntry>> {
        self.store.read(|conn| -> EngineResult<_> {
            load_ticket(conn, id)?;
            Ok(history::for_entity(conn, EntityType::Ticket, &id.to_string())?)
        })
    }
}
