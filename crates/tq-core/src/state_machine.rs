//! Ticket status state machine
//!
//! Static edges live in [`allowed_transitions`]. Two states are *parking*
//! states whose exit depends on where the ticket came from:
//!
//! - `blocked` pauses any in-flight ticket and may only return to the
//!   recorded prior status (or be cancelled). The SLA clock stops while
//!   blocked.
//! - `pending_approval` waits for billing sign-off. Approval returns to the
//!   recorded prior status; rejection cancels. Nothing else leaves it.

use crate::error::CoreError;
use crate::ticket::{Ticket, TicketStatus};
use crate::types::Timestamp;
use serde::{Deserialize, Serialize};

/// How a validated transition must be applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionKind {
    /// Ordinary edge
    Advance,
    /// Enter `blocked`, remembering the current status
    Pause,
    /// Leave `blocked` for the remembered status
    Resume,
    /// Enter `pending_approval`, remembering the current status
    SubmitForApproval,
    /// Billing approved; return to the remembered status
    Approve,
    /// Billing rejected; cancel
    Reject,
}

/// Edges that do not depend on ticket history.
///
/// Exits from `blocked` and `pending_approval` back to the remembered status
/// are added by [`available_transitions`].
pub fn allowed_transitions(from: TicketStatus) -> Vec<TicketStatus> {
    use TicketStatus::*;
    match from {
        New => vec![Triaged, Assigned, Cancelled, Blocked],
        Triaged => vec![Assigned, Cancelled, Blocked],
        Assigned => vec![InProgress, Triaged, Cancelled, Blocked, PendingApproval],
        InProgress => vec![Resolved, Assigned, Cancelled, Blocked, PendingApproval],
        Resolved => vec![Closed, InProgress, Blocked, PendingApproval],
        Blocked => vec![Cancelled],
        PendingApproval => vec![Cancelled],
        Closed | Cancelled => vec![],
    }
}

/// Every status the given ticket may move to right now
pub fn available_transitions(ticket: &Ticket) -> Vec<TicketStatus> {
    let mut targets = allowed_transitions(ticket.status);
    if matches!(
        ticket.status,
        TicketStatus::Blocked | TicketStatus::PendingApproval
    ) {
        if let Some(resume) = ticket.resume_status {
            targets.insert(0, resume);
        }
    }
    if !ticket.billing_ready() {
        targets.retain(|s| *s != TicketStatus::PendingApproval);
    }
    targets
}

/// Validate a requested transition against the ticket's current state.
pub fn validate_transition(ticket: &Ticket, to: TicketStatus) -> Result<TransitionKind, CoreError> {
    let from = ticket.status;
    if from == to {
        return Err(CoreError::NoOpTransition(from));
    }
    if from.is_terminal() {
        return Err(CoreError::invalid_transition(from, to, "ticket is in a terminal state"));
    }

    match from {
        TicketStatus::Blocked => match to {
            _ if Some(to) == ticket.resume_status => Ok(TransitionKind::Resume),
            TicketStatus::Cancelled => Ok(TransitionKind::Advance),
            _ => Err(CoreError::invalid_transition(
                from,
                to,
                "a blocked ticket may only return to its prior status or be cancelled",
            )),
        },
        TicketStatus::PendingApproval => match to {
            _ if Some(to) == ticket.resume_status => Ok(TransitionKind::Approve),
            TicketStatus::Cancelled => Ok(TransitionKind::Reject),
            _ => Err(CoreError::invalid_transition(
                from,
                to,
                "pending approval may only be approved or rejected",
            )),
        },
        _ if !allowed_transitions(from).contains(&to) => {
            Err(CoreError::invalid_transition(from, to, "edge not permitted"))
        }
        _ => match to {
            TicketStatus::Blocked => Ok(TransitionKind::Pause),
            TicketStatus::PendingApproval if !ticket.requires_billing_approval => {
                Err(CoreError::invalid_transition(
                    from,
                    to,
                    "ticket does not require billing approval",
                ))
            }
            TicketStatus::PendingApproval if ticket.billing_cost.is_none() => {
                Err(CoreError::invalid_transition(
                    from,
                    to,
                    "billing cost data must be attached first",
                ))
            }
            TicketStatus::PendingApproval => Ok(TransitionKind::SubmitForApproval),
            _ => Ok(TransitionKind::Advance),
        },
    }
}

/// Apply a transition previously accepted by [`validate_transition`].
///
/// Maintains the pause bookkeeping: entering `blocked` stamps
/// `sla_paused_at`; leaving it clears the stamp, accumulates the paused
/// minutes and pushes `sla_due_at` out by the pause duration.
pub fn apply_transition(
    ticket: &mut Ticket,
    kind: TransitionKind,
    to: TicketStatus,
    now: Timestamp,
    reason: Option<&str>,
) {
    let from = ticket.status;

    if from == TicketStatus::Blocked {
        if let Some(paused_at) = ticket.sla_paused_at.take() {
            let paused = now.signed_duration_since(paused_at);
            if paused > chrono::Duration::zero() {
                ticket.sla_paused_minutes += paused.num_minutes();
                ticket.sla_due_at = ticket.sla_due_at.map(|due| due + paused);
            }
        }
        ticket.sla_pause_reason = None;
    }

    match kind {
        TransitionKind::Pause => {
            ticket.resume_status = Some(from);
            ticket.sla_paused_at = Some(now);
            ticket.sla_pause_reason = reason.map(str::to_string);
        }
        TransitionKind::SubmitForApproval => {
            ticket.resume_status = Some(from);
        }
        TransitionKind::Resume
        | TransitionKind::Approve
        | TransitionKind::Reject
        | TransitionKind::Advance => {
            ticket.resume_status = None;
        }
    }

    ticket.status = to;
    ticket.updated_at = now;
}
