//! Domain rule violations
//!
//! These errors are raised by the pure rules in this crate. They carry
//! enough context to be surfaced verbatim to a caller; `tq-engine` lifts
//! them into its own error type without rewording.

use crate::escalation::EscalationStatus;
use crate::ticket::TicketStatus;
use crate::types::EscalationId;

/// Errors produced by domain rules
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// Malformed or missing input
    #[error("validation failed: {0}")]
    Validation(String),

    /// Transition along an edge the state machine does not permit
    #[error("invalid transition from {from} to {to}: {reason}")]
    InvalidTransition {
        /// Current status
        from: TicketStatus,
        /// Requested status
        to: TicketStatus,
        /// Which rule rejected the edge
        reason: String,
    },

    /// Transition to the status the ticket already has
    #[error("ticket is already {0}")]
    NoOpTransition(TicketStatus),

    /// Verification step number outside 1..=12
    #[error("invalid verification step {0}: expected 1..=12")]
    InvalidStep(u32),

    /// Mutation attempted on an escalation that is no longer open
    #[error("escalation {id} is {status}, not open")]
    EscalationNotOpen {
        /// Escalation identifier
        id: EscalationId,
        /// Its terminal status
        status: EscalationStatus,
    },

    /// Unrecognised enum value at a parsing boundary
    #[error("unknown {kind} value: '{value}'")]
    UnknownVariant {
        /// Enum type name
        kind: &'static str,
        /// Offending input
        value: String,
    },
}

impl CoreError {
    /// Create a validation error
    #[inline]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create an invalid transition error
    #[inline]
    pub fn invalid_transition(
        from: TicketStatus,
        to: TicketStatus,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidTransition {
            from,
            to,
            reason: reason.into(),
        }
    }
}
