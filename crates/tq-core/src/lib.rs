//! TQ Core - ticket lifecycle domain model
//!
//! Pure, storage-agnostic rules for the ticket quality engine:
//! - Ticket records and the status state machine
//! - The fixed 12-step verification checklist
//! - Handover gate evaluation and snapshot payloads
//! - Repeat-fault escalation policy
//! - Hash-chained history records
//! - Notification templates
//!
//! Nothing in this crate performs IO. `tq-store` persists these types and
//! `tq-engine` composes them into transactional operations.

#![warn(unreachable_pub)]

#[macro_use]
mod macros;

pub mod error;
pub mod escalation;
pub mod handover;
pub mod history;
pub mod notification;
pub mod scope;
pub mod state_machine;
pub mod ticket;
pub mod types;
pub mod verification;

pub use error::CoreError;
pub use escalation::{
    Escalation, EscalationFilter, EscalationPolicy, EscalationStatus, FaultPatternDetection,
    ScopeThreshold,
};
pub use handover::{
    BlockingIssue, GateCheck, GateEvaluation, GateName, HandoverHistory, HandoverSnapshot,
    HandoverType, Severity, SnapshotData,
};
pub use history::{EntityType, HistoryAction, HistoryEntry, HistoryRecord, IntegrityReport};
pub use notification::{Notification, NotificationKind, Recipient};
pub use scope::{Scope, ScopeFields, ScopeType};
pub use state_machine::TransitionKind;
pub use ticket::{
    BillingCost, BillingType, FaultCause, NewTicket, OwnerTeam, Priority, Ticket, TicketFilter,
    TicketSource, TicketStatus, TicketType,
};
pub use types::{ActorId, EscalationId, SnapshotId, TicketId, Timestamp};
pub use verification::{
    StepCategory, StepUpdate, VerificationProgress, VerificationStep, STEP_CATALOGUE, TOTAL_STEPS,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
