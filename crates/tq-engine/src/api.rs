//! Public operation traits
//!
//! Each trait groups the operations one component exposes. The services
//! implement their own trait; [`Engine`](crate::Engine) implements all of
//! them by delegation.

use crate::context::RequestContext;
use crate::error::EngineResult;
use tq_core::{
    ActorId, Escalation, EscalationId, EscalationStatus, FaultPatternDetection, GateEvaluation,
    HandoverHistory, HandoverSnapshot, HandoverType, Scope, StepUpdate, Ticket, TicketId,
    TicketStatus, VerificationProgress, VerificationStep,
};

/// Status workflow and assignment
pub trait TicketLifecycle {
    /// Move a ticket along the state machine
    fn transition_status(
        &self,
        ctx: &RequestContext,
        ticket_id: TicketId,
        new_status: TicketStatus,
        reason: Option<&str>,
    ) -> EngineResult<Ticket>;

    /// Change the assignee
    fn assign(
        &self,
        ctx: &RequestContext,
        ticket_id: TicketId,
        assignee: ActorId,
        reason: Option<&str>,
    ) -> EngineResult<Ticket>;
}

/// Checklist updates and progress
pub trait VerificationTracker {
    /// Partially update one step
    fn update_verification_step(
        &self,
        ctx: &RequestContext,
        ticket_id: TicketId,
        step_number: u32,
        update: StepUpdate,
    ) -> EngineResult<VerificationStep>;

    /// Aggregate completion
    fn verification_progress(&self, ticket_id: TicketId) -> EngineResult<VerificationProgress>;
}

/// Gated ownership transfer
pub trait HandoverGate {
    /// Evaluate without side effects
    fn validate_handover_gate(
        &self,
        ticket_id: TicketId,
        handover_type: HandoverType,
    ) -> EngineResult<GateEvaluation>;

    /// Evaluate and, if accepted, snapshot and transfer
    fn create_handover(
        &self,
        ctx: &RequestContext,
        ticket_id: TicketId,
        handover_type: HandoverType,
    ) -> EngineResult<HandoverSnapshot>;

    /// Current owner plus all snapshots
    fn handover_history(&self, ticket_id: TicketId) -> EngineResult<HandoverHistory>;
}

/// Repeat-fault detection and escalation lifecycle
pub trait EscalationDetector {
    /// Count recent tickets on a scope and escalate past the threshold
    fn detect_fault_pattern(
        &self,
        ctx: &RequestContext,
        scope: &Scope,
        threshold: Option<u32>,
        window_days: Option<u32>,
    ) -> EngineResult<FaultPatternDetection>;

    /// Close an open escalation
    fn resolve_escalation(
        &self,
        ctx: &RequestContext,
        escalation_id: EscalationId,
        status: EscalationStatus,
        notes: &str,
    ) -> EngineResult<Escalation>;
}

impl TicketLifecycle for crate::tickets::TicketService {
    fn transition_status(
        &self,
        ctx: &RequestContext,
        ticket_id: TicketId,
        new_status: TicketStatus,
        reason: Option<&str>,
    ) -> EngineResult<Ticket> {
        Self::transition_status(self, ctx, ticket_id, new_status, reason)
    }

    fn assign(
        &self,
        ctx: &RequestContext,
        ticket_id: TicketId,
        assignee: ActorId,
        reason: Option<&str>,
    ) -> EngineResult<Ticket> {
        Self::assign(self, ctx, ticket_id, assignee, reason)
    }
}

impl VerificationTracker for crate::verification::VerificationService {
    fn update_verification_step(
        &self,
        ctx: &RequestContext,
        ticket_id: TicketId,
        step_number: u32,
        update: StepUpdate,
    ) -> EngineResult<VerificationStep> {
        self.update(ctx, ticket_id, step_number, update)
    }

    fn verification_progress(&self, ticket_id: TicketId) -> EngineResult<VerificationProgress> {
        self.progress(ticket_id)
    }
}

impl HandoverGate for crate::handover::HandoverService {
    fn validate_handover_gate(
        &self,
        ticket_id: TicketId,
        handover_type: HandoverType,
    ) -> EngineResult<GateEvaluation> {
        self.validate_gate(ticket_id, handover_type)
    }

    fn create_handover(
        &self,
        ctx: &RequestContext,
        ticket_id: TicketId,
        handover_type: HandoverType,
    ) -> EngineResult<HandoverSnapshot> {
        Self::create_handover(self, ctx, ticket_id, handover_type)
    }

    fn handover_history(&self, ticket_id: TicketId) -> EngineResult<HandoverHistory> {
        Self::handover_history(self, ticket_id)
    }
}

impl EscalationDetector for crate::escalation::EscalationService {
    fn detect_fault_pattern(
        &self,
        ctx: &RequestContext,
        scope: &Scope,
        threshold: Option<u32>,
        window_days: Option<u32>,
    ) -> EngineResult<FaultPatternDetection> {
        self.detect(ctx, scope, threshold, window_days)
    }

    fn resolve_escalation(
        &self,
        ctx: &RequestContext,
        escalation_id: EscalationId,
        status: EscalationStatus,
        notes: &str,
    ) -> EngineResult<Escalation> {
        self.resolve(ctx, escalation_id, status, notes)
    }
}
