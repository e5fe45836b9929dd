//! Engine error type
//!
//! Every public operation returns [`EngineError`]. Domain rule violations
//! from `tq-core` and storage failures from `tq-store` are lifted into it
//! without losing their kind.

use tq_core::{
    ActorId, CoreError, EscalationId, EscalationStatus, GateEvaluation, TicketId, TicketStatus,
    Timestamp,
};
use tq_store::StoreError;

/// Main engine error type
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Malformed or missing input
    #[error("validation failed: {0}")]
    Validation(String),

    /// Referenced record does not exist
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Record kind
        entity: &'static str,
        /// Identifier as given
        id: String,
    },

    /// Edge not permitted by the state machine
    #[error("invalid transition from {from} to {to}: {reason}")]
    InvalidTransition {
        /// Current status
        from: TicketStatus,
        /// Requested status
        to: TicketStatus,
        /// Rule that rejected it
        reason: String,
    },

    /// Ticket already has the requested status
    #[error("ticket is already {0}")]
    NoOpTransition(TicketStatus),

    /// Ticket already assigned to the requested actor
    #[error("ticket is already assigned to {0}")]
    NoOpAssignment(ActorId),

    /// Step number outside 1..=12
    #[error("invalid verification step {0}: expected 1..=12")]
    InvalidStep(u32),

    /// Required handover gates failed
    #[error("handover gate failed: {} blocking issue(s)", .0.blocking_issues.len())]
    HandoverGateFailed(Box<GateEvaluation>),

    /// Escalation already closed
    #[error("escalation {id} is {status}, not open")]
    EscalationNotOpen {
        /// Escalation
        id: EscalationId,
        /// Its status
        status: EscalationStatus,
    },

    /// Another actor holds an unexpired edit lock
    #[error("ticket {ticket_id} is locked by {holder} until {expires_at}")]
    LockHeld {
        /// Ticket
        ticket_id: TicketId,
        /// Current holder
        holder: ActorId,
        /// Lock expiry
        expires_at: Timestamp,
    },

    /// Caller does not hold the edit lock
    #[error("edit lock on ticket {0} is not held by the caller")]
    LockNotHeld(TicketId),

    /// Lock wait exceeded the busy timeout
    #[error("concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    /// Request deadline passed; nothing was committed
    #[error("deadline exceeded: {0}")]
    DeadlineExceeded(String),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage failure
    #[error("storage error: {0}")]
    Storage(StoreError),
}

impl EngineError {
    /// Construct a not-found error
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Construct a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Retrying the same request later may succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConcurrencyConflict(_) | Self::DeadlineExceeded(_) | Self::Storage(_)
        )
    }
}

impl From<CoreError> for EngineError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(msg) => Self::Validation(msg),
            CoreError::InvalidTransition { from, to, reason } => {
                Self::InvalidTransition { from, to, reason }
            }
            CoreError::NoOpTransition(status) => Self::NoOpTransition(status),
            CoreError::InvalidStep(n) => Self::InvalidStep(n),
            CoreError::EscalationNotOpen { id, status } => Self::EscalationNotOpen { id, status },
            other @ CoreError::UnknownVariant { .. } => Self::Validation(other.to_string()),
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Busy(msg) => Self::ConcurrencyConflict(msg),
            StoreError::DeadlineExceeded(stage) => {
                Self::DeadlineExceeded(format!("request deadline passed before {stage}"))
            }
            other => Self::Storage(other),
        }
    }
}

/// Result alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds() {
        assert!(EngineError::from(StoreError::Busy("x".into())).is_retryable());
        assert!(EngineError::from(StoreError::DeadlineExceeded("commit")).is_retryable());
        assert!(!EngineError::validation("bad").is_retryable());
        assert!(!EngineError::NoOpTransition(TicketStatus::New).is_retryable());
    }

    #[test]
    fn core_errors_keep_their_kind() {
        let e: EngineError = CoreError::InvalidStep(13).into();
        assert!(matches!(e, EngineError::InvalidStep(13)));
        let e: EngineError = CoreError::NoOpTransition(TicketStatus::Closed).into();
        assert!(matches!(e, EngineError::NoOpTransition(TicketStatus::Closed)));
    }
}
