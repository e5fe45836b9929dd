//! Engine facade
//!
//! Wires one shared [`Store`] into every service and exposes the full
//! operation surface from a single handle.

use crate::api::{EscalationDetector, HandoverGate, TicketLifecycle, VerificationTracker};
use crate::config::EngineConfig;
use crate::context::{Clock, RequestContext, SystemClock};
use crate::edit_lock::EditLockService;
use crate::error::EngineResult;
use crate::escalation::EscalationService;
use crate::handover::HandoverService;
use crate::notify::{Notifier, TracingNotifier};
use crate::tickets::TicketService;
use crate::verification::VerificationService;
use std::sync::Arc;
use tq_core::{
    ActorId, Escalation, EscalationId, EscalationStatus, FaultPatternDetection, GateEvaluation,
    HandoverHistory, HandoverSnapshot, HandoverType, IntegrityReport, Recipient, Scope,
    StepUpdate, Ticket, TicketId, TicketStatus, VerificationProgress, VerificationStep,
};
use tq_store::{history, Store};
use tracing::{info, warn};

/// Handle to every engine service
pub struct Engine {
    store: Arc<Store>,
    config: EngineConfig,
    tickets: TicketService,
    verification: VerificationService,
    handover: HandoverService,
    escalation: EscalationService,
    locks: EditLockService,
}

impl Engine {
    /// Assemble services over an opened store
    pub fn new(
        store: Arc<Store>,
        config: EngineConfig,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
    ) -> EngineResult<Self> {
        config.validate()?;
        let recipient = Recipient::Channel(config.notifications.escalation_recipient.clone());
        Ok(Self {
            tickets: TicketService::new(Arc::clone(&store), Arc::clone(&clock), Arc::clone(&notifier)),
            verification: VerificationService::new(Arc::clone(&store), Arc::clone(&clock)),
            handover: HandoverService::new(Arc::clone(&store), Arc::clone(&clock), Arc::clone(&notifier)),
            escalation: EscalationService::new(
                Arc::clone(&store),
                Arc::clone(&clock),
                notifier,
                config.escalation,
                recipient,
            ),
            locks: EditLockService::new(Arc::clone(&store), clock, config.locks.ttl_minutes),
            store,
            config,
        })
    }

    /// Open the configured database with the wall clock and log-only notifications
    pub fn open(config: EngineConfig) -> EngineResult<Self> {
        let store = Store::open(&config.store.path, config.store.options())?;
        info!(path = %config.store.path.display(), "engine opened");
        Self::new(
            Arc::new(store),
            config,
            Arc::new(SystemClock),
            Arc::new(TracingNotifier),
        )
    }

    /// Private in-memory engine
    pub fn in_memory(config: EngineConfig) -> EngineResult<Self> {
        Self::new(
            Arc::new(Store::in_memory()?),
            config,
            Arc::new(SystemClock),
            Arc::new(TracingNotifier),
        )
    }

    /// Active configuration
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Shared store
    #[must_use]
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Ticket service
    #[must_use]
    pub fn tickets(&self) -> &TicketService {
        &self.tickets
    }

    /// Verification service
    #[must_use]
    pub fn verification(&self) -> &VerificationService {
        &self.verification
    }

    /// Handover service
    #[must_use]
    pub fn handover(&self) -> &HandoverService {
        &self.handover
    }

    /// Escalation service
    #[must_use]
    pub fn escalation(&self) -> &EscalationService {
        &self.escalation
    }

    /// Edit lock service
    #[must_use]
    pub fn locks(&self) -> &EditLockService {
        &self.locks
    }

    /// Walk the whole history chain
    pub fn verify_history(&self) -> EngineResult<IntegrityReport> {
        let report = self
            .store
            .read(|conn| -> EngineResult<_> { Ok(history::verify(conn)?) })?;
        if report.valid {
            info!(entries = report.entries_checked, "history chain intact");
        } else {
            warn!(
                entries = report.entries_checked,
                first_broken = ?report.first_broken_seq,
                detail = ?report.detail,
                "history chain broken"
            );
        }
        Ok(report)
    }

    /// Periodic multi-scope detection
    pub fn scan(&self, ctx: &RequestContext) -> EngineResult<Vec<FaultPatternDetection>> {
        self.escalation.scan(ctx)
    }
}

impl TicketLifecycle for Engine {
    fn transition_status(
        &self,
        ctx: &RequestContext,
        ticket_id: TicketId,
        new_status: TicketStatus,
        reason: Option<&str>,
    ) -> EngineResult<Ticket> {
        self.tickets.transition_status(ctx, ticket_id, new_status, reason)
    }

    fn assign(
        &self,
        ctx: &RequestContext,
        ticket_id: TicketId,
        assignee: ActorId,
        reason: Option<&str>,
    ) -> EngineResult<Ticket> {
        self.tickets.assign(ctx, ticket_id, assignee, reason)
    }
}

impl VerificationTracker for Engine {
    fn update_verification_step(
        &self,
        ctx: &RequestContext,
        ticket_id: TicketId,
        step_number: u32,
        update: StepUpdate,
    ) -> EngineResult<VerificationStep> {
        self.verification.update(ctx, ticket_id, step_number, update)
    }

    fn verification_progress(&self, ticket_id: TicketId) -> EngineResult<VerificationProgress> {
        self.verification.progress(ticket_id)
    }
}

impl HandoverGate for Engine {
    fn validate_handover_gate(
        &self,
        ticket_id: TicketId,
        handover_type: HandoverType,
    ) -> EngineResult<GateEvaluation> {
        self.handover.validate_gate(ticket_id, handover_type)
    }

    fn create_handover(
        &self,
        ctx: &RequestContext,
        ticket_id: TicketId,
        handover_type: HandoverType,
    ) -> EngineResult<HandoverSnapshot> {
        self.handover.create_handover(ctx, ticket_id, handover_type)
    }

    fn handover_history(&self, ticket_id: TicketId) -> EngineResult<HandoverHistory> {
        self.handover.handover_history(ticket_id)
    }
}

impl EscalationDetector for Engine {
    fn detect_fault_pattern(
        &self,
        ctx: &RequestContext,
        scope: &Scope,
        threshold: Option<u32>,
        window_days: Option<u32>,
    ) -> EngineResult<FaultPatternDetection> {
        self.escalation.detect(ctx, scope, threshold, window_days)
    }

    fn resolve_escalation(
        &self,
        ctx: &RequestContext,
        escalation_id: EscalationId,
        status: EscalationStatus,
        notes: &str,
    ) -> EngineResult<Escalation> {
        self.escalation.resolve(ctx, escalation_id, status, notes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NoopNotifier;
    use tq_core::{NewTicket, ScopeFields, TicketSource, TicketType};

    #[test]
    fn in_memory_engine_round_trips_a_ticket() {
        let engine = Engine::in_memory(EngineConfig::default()).unwrap();
        let ctx = RequestContext::new("ops");
        let ticket = engine
            .tickets()
            .create_ticket(
                &ctx,
                NewTicket::new(
                    "Drop cable down",
                    TicketType::Maintenance,
                    TicketSource::Manual,
                    ScopeFields {
                        zone_id: Some("Z1".into()),
                        ..ScopeFields::default()
                    },
                ),
            )
            .unwrap();
        let moved = engine
            .transition_status(&ctx, ticket.id, TicketStatus::Triaged, None)
            .unwrap();
        assert_eq!(moved.status, TicketStatus::Triaged);
        assert!(engine.verify_history().unwrap().valid);
    }

    #[test]
    fn invalid_config_is_refused() {
        let store = Arc::new(Store::in_memory().unwrap());
        let result = Engine::new(
            store,
            EngineConfig::default().with_lock_ttl(0),
            Arc::new(SystemClock),
            Arc::new(NoopNotifier),
        );
        assert!(matches!(result, Err(crate::EngineError::Config(_))));
    }

    #[test]
    fn escalation_alerts_go_to_the_configured_channel() {
        let engine = Engine::in_memory(
            EngineConfig::default().with_escalation_recipient("noc-alerts"),
        )
        .unwrap();
        assert_eq!(engine.config().notifications.escalation_recipient, "noc-alerts");
        assert_eq!(engine.escalation().policy().pole.threshold, 3);
    }
}
