//! Repeat-fault escalation service
//!
//! Detection counts tickets on a scope inside a trailing window. Crossing
//! the threshold opens an escalation unless one is already open; the
//! partial unique index on open escalations settles races between writers.

use crate::context::{Clock, RequestContext};
use crate::error::{EngineError, EngineResult};
use crate::notify::{dispatch, Notifier};
use crate::tickets::load_ticket;
use chrono::Duration;
use std::sync::Arc;
use tq_core::escalation::recommendation;
use tq_core::{
    EntityType, Escalation, EscalationFilter, EscalationId, EscalationPolicy, EscalationStatus,
    FaultPatternDetection, HistoryAction, HistoryEntry, HistoryRecord, Notification, Recipient,
    Scope, ScopeThreshold, ScopeType, TicketId,
};
use tq_store::{escalations, history, tickets, Connection, Store, StoreError};
use tracing::{debug, info, warn};

/// Escalation operations
pub struct EscalationService {
    store: Arc<Store>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    policy: EscalationPolicy,
    recipient: Recipient,
}

fn load_escalation(conn: &Connection, id: EscalationId) -> EngineResult<Escalation> {
    escalations::get(conn, id)?.ok_or_else(|| EngineError::not_found("escalation", id))
}

impl EscalationService {
    /// Create the service over a shared store
    pub fn new(
        store: Arc<Store>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
        policy: EscalationPolicy,
        recipient: Recipient,
    ) -> Self {
        Self {
            store,
            clock,
            notifier,
            policy,
            recipient,
        }
    }

    /// Default threshold and window for a scope kind
    #[must_use]
    pub fn policy(&self) -> &EscalationPolicy {
        &self.policy
    }

    /// Count tickets on a scope and open an escalation when the threshold is reached
    pub fn detect(
        &self,
        ctx: &RequestContext,
        scope: &Scope,
        threshold: Option<u32>,
        window_days: Option<u32>,
    ) -> EngineResult<FaultPatternDetection> {
        let scope = Scope::new(scope.scope_type, scope.scope_value.trim());
        if scope.scope_value.is_empty() {
            return Err(EngineError::validation("scope value is required"));
        }
        let defaults = self.policy.for_scope(scope.scope_type);
        let limits = ScopeThreshold::new(
            threshold.unwrap_or(defaults.threshold),
            window_days.unwrap_or(defaults.time_window_days),
        );
        limits.validate(scope.scope_type)?;

        let now = self.clock.now();
        let from = now - Duration::days(i64::from(limits.time_window_days));

        let detection = self.store.write(ctx.deadline, |tx| -> EngineResult<_> {
            let found = tickets::in_window(tx, scope.scope_type, &scope.scope_value, from, now)?;
            let ids: Vec<TicketId> = found.into_iter().map(|(id, _)| id).collect();
            let fault_count = u32::try_from(ids.len()).unwrap_or(u32::MAX);
            let pattern_detected = fault_count >= limits.threshold;

            let mut detection = FaultPatternDetection {
                scope: scope.clone(),
                fault_count,
                threshold: limits.threshold,
                time_window_days: limits.time_window_days,
                pattern_detected,
                contributing_ticket_ids: ids.clone(),
                escalation: None,
                created: false,
                recommendation: String::new(),
            };

            if pattern_detected {
                let (escalation, created) = match escalations::find_open(tx, &scope)? {
                    Some(existing) => (existing, false),
                    None => {
                        let candidate = Escalation::open(&scope, ids, limits, now);
                        match escalations::insert(tx, &candidate) {
                            Ok(()) => {
                                history::append(
                                    tx,
                                    HistoryRecord::escalation(
                                        candidate.id,
                                        HistoryAction::EscalationOpened,
                                        ctx.actor.clone(),
                                        now,
                                    )
                                    .field("scope", None, Some(scope.to_string()))
                                    .reason(Some(
                                        format!(
                                            "{fault_count} tickets in {} days (threshold {})",
                                            limits.time_window_days, limits.threshold
                                        )
                                        .as_str(),
                                    )),
                                )?;
                                (candidate, true)
                            }
                            Err(StoreError::UniqueViolation(_)) => {
                                let winner = escalations::find_open(tx, &scope)?.ok_or_else(|| {
                                    EngineError::ConcurrencyConflict(format!(
                                        "open escalation for {scope} vanished"
                                    ))
                                })?;
                                (winner, false)
                            }
                            Err(e) => return Err(e.into()),
                        }
                    }
                };
                detection.escalation = Some(escalation);
                detection.created = created;
            }

            detection.recommendation = recommendation(
                &scope,
                fault_count,
                limits.threshold,
                pattern_detected,
                pattern_detected && !detection.created,
            );
            Ok(detection)
        })?;

        if detection.created {
            if let Some(e) = &detection.escalation {
                info!(escalation = %e.id, %scope, count = detection.fault_count, actor = %ctx.actor, "escalation opened");
                dispatch(
                    self.notifier.as_ref(),
                    &[Notification::escalation_created(e, self.recipient.clone())],
                );
            }
        } else {
            debug!(%scope, count = detection.fault_count, detected = detection.pattern_detected, "fault pattern checked");
        }
        Ok(detection)
    }

    /// Run detection for every populated scope of a ticket and keep the hits
    pub fn check_ticket_scopes(
        &self,
        ctx: &RequestContext,
        ticket_id: TicketId,
    ) -> EngineResult<Vec<FaultPatternDetection>> {
        let ticket = self.store.read(|conn| load_ticket(conn, ticket_id))?;
        let mut hits = Vec::new();
        for scope in ticket.scope.populated() {
            let detection = self.detect(ctx, &scope, None, None)?;
            if detection.pattern_detected {
                hits.push(detection);
            }
        }
        Ok(hits)
    }

    /// Run detection for every scope value seen within its window
    pub fn scan(&self, ctx: &RequestContext) -> EngineResult<Vec<FaultPatternDetection>> {
        let now = self.clock.now();
        let mut hits = Vec::new();
        for &scope_type in ScopeType::ALL {
            let window = self.policy.for_scope(scope_type).time_window_days;
            let since = now - Duration::days(i64::from(window));
            let values = self
                .store
                .read(|conn| -> EngineResult<_> { Ok(tickets::distinct_scope_values(conn, scope_type, since)?) })?;
            for value in values {
                let detection = self.detect(ctx, &Scope::new(scope_type, value), None, None)?;
                if detection.pattern_detected {
                    hits.push(detection);
                }
            }
        }
        info!(patterns = hits.len(), "escalation scan complete");
        Ok(hits)
    }

    /// Close an open escalation
    pub fn resolve(
        &self,
        ctx: &RequestContext,
        id: EscalationId,
        status: EscalationStatus,
        notes: &str,
    ) -> EngineResult<Escalation> {
        let now = self.clock.now();
        let escalation = self.store.write(ctx.deadline, |tx| -> EngineResult<_> {
            let mut escalation = load_escalation(tx, id)?;
            escalation.resolve(status, notes, ctx.actor.clone(), now)?;
            escalations::update(tx, &escalation)?;
            history::append(
                tx,
                HistoryRecord::escalation(id, HistoryAction::EscalationResolved, ctx.actor.clone(), now)
                    .field(
                        "status",
                        Some(EscalationStatus::Open.to_string()),
                        Some(status.to_string()),
                    )
                    .reason(escalation.resolution_notes.as_deref()),
            )?;
            Ok(escalation)
        });
        match escalation {
            Ok(e) => {
                info!(escalation = %id, %status, actor = %ctx.actor, "escalation resolved");
                Ok(e)
            }
            Err(err @ EngineError::EscalationNotOpen { .. }) => {
                warn!(escalation = %id, "resolve attempted on closed escalation");
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Attach more tickets to an open escalation
    pub fn link_tickets(
        &self,
        ctx: &RequestContext,
        id: EscalationId,
        ticket_ids: &[TicketId],
    ) -> EngineResult<Escalation> {
        let now = self.clock.now();
        self.store.write(ctx.deadline, |tx| -> EngineResult<_> {
            let mut escalation = load_escalation(tx, id)?;
            for &ticket_id in ticket_ids {
                load_ticket(tx, ticket_id)?;
            }
            let added = escalation.link(ticket_ids.iter().copied())?;
            if added.is_empty() {
                return Ok(escalation);
            }
            escalations::update(tx, &escalation)?;
            let listed: Vec<String> = added.iter().map(ToString::to_string).collect();
            history::append(
                tx,
                HistoryRecord::escalation(id, HistoryAction::EscalationLinked, ctx.actor.clone(), now)
                    .field("contributing_ticket_ids", None, Some(listed.join(","))),
            )?;
            info!(escalation = %id, added = added.len(), "tickets linked to escalation");
            Ok(escalation)
        })
    }

    /// Fetch one escalation
    pub fn get(&self, id: EscalationId) -> EngineResult<Escalation> {
        self.store.read(|conn| load_escalation(conn, id))
    }

    /// List escalations, newest first
    pub fn list(&self, filter: &EscalationFilter) -> EngineResult<Vec<Escalation>> {
        self.store
            .read(|conn| -> EngineResult<_> { Ok(escalations::list(conn, filter)?) })
    }

    /// History entries for an escalation
    pub fn history(&self, id: EscalationId) -> EngineResult<Vec<HistoryEntry>> {
        self.store.read(|conn| -> EngineResult<_> {
            load_escalation(conn, id)?;
            Ok(history::for_entity(conn, EntityType::Escalation, &id.to_string())?)
        })
    }
}
