//! TQ Engine - ticket lifecycle and quality/escalation services
//!
//! Transactional operations over [`tq_store::Store`]:
//! - [`TicketService`] status workflow, assignment, billing approval
//! - [`VerificationService`] the 12-step checklist
//! - [`HandoverService`] gated ownership transfer with locked snapshots
//! - [`EscalationService`] windowed repeat-fault detection
//! - [`EditLockService`] advisory TTL edit locks
//!
//! [`Engine`] wires them together over one store. Every operation is a
//! single short transaction; history rows commit with the change they
//! describe and notifications go out only after commit.

#![warn(unreachable_pub)]

pub mod api;
pub mod config;
pub mod context;
pub mod edit_lock;
pub mod engine;
pub mod error;
pub mod escalation;
pub mod handover;
pub mod notify;
pub mod tickets;
pub mod verification;

pub use api::{EscalationDetector, HandoverGate, TicketLifecycle, VerificationTracker};
pub use config::EngineConfig;
pub use context::{Clock, RequestContext, SystemClock};
pub use edit_lock::EditLockService;
pub use engine::Engine;
pub use error::{EngineError, EngineResult};
pub use escalation::EscalationService;
pub use handover::HandoverService;
pub use notify::{NoopNotifier, Notifier, NotifyError, TracingNotifier};
pub use tickets::TicketService;
pub use verification::VerificationService;
