//! Repeat-fault escalation
//!
//! When too many tickets land on the same network location within a
//! trailing window, an escalation is opened for that location. At most one
//! escalation per scope is open at a time; later detections attach to it.

use crate::error::CoreError;
use crate::scope::{Scope, ScopeType};
use crate::types::{ActorId, EscalationId, TicketId, Timestamp};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

str_enum! {
    /// Escalation lifecycle
    pub enum EscalationStatus {
        /// Under investigation; accepts more contributing tickets
        Open => "open",
        /// Root cause addressed
        Resolved => "resolved",
        /// Closed without action
        NoAction => "no_action",
    }
}

impl EscalationStatus {
    /// Resolved and no-action are final
    #[inline]
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Open)
    }
}

/// Threshold and window for one scope kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeThreshold {
    /// Ticket count at which a pattern is declared
    pub threshold: u32,
    /// Trailing window in days
    pub time_window_days: u32,
}

impl ScopeThreshold {
    /// Create a threshold
    #[inline]
    #[must_use]
    pub const fn new(threshold: u32, time_window_days: u32) -> Self {
        Self {
            threshold,
            time_window_days,
        }
    }

    /// Zero thresholds and empty windows are meaningless
    pub fn validate(&self, scope_type: ScopeType) -> Result<(), CoreError> {
        if self.threshold == 0 {
            return Err(CoreError::validation(format!(
                "{scope_type} threshold must be at least 1"
            )));
        }
        if self.time_window_days == 0 {
            return Err(CoreError::validation(format!(
                "{scope_type} time window must be at least 1 day"
            )));
        }
        Ok(())
    }
}

/// Default thresholds per scope kind
///
/// Deserializing merges over the defaults field by field, so a document
/// may set only `pole.threshold` and keep every other value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EscalationPolicy {
    /// Pole
    pub pole: ScopeThreshold,
    /// PON
    pub pon: ScopeThreshold,
    /// Zone
    pub zone: ScopeThreshold,
    /// Drop
    pub dr: ScopeThreshold,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self {
            pole: ScopeThreshold::new(3, 30),
            pon: ScopeThreshold::new(5, 30),
            zone: ScopeThreshold::new(10, 30),
            dr: ScopeThreshold::new(2, 30),
        }
    }
}

impl EscalationPolicy {
    /// Threshold for one scope kind
    #[must_use]
    pub const fn for_scope(&self, scope_type: ScopeType) -> ScopeThreshold {
        match scope_type {
            ScopeType::Pole => self.pole,
            ScopeType::Pon => self.pon,
            ScopeType::Zone => self.zone,
            ScopeType::Dr => self.dr,
        }
    }

    /// Check every entry
    pub fn validate(&self) -> Result<(), CoreError> {
        for &t in ScopeType::ALL {
            self.for_scope(t).validate(t)?;
        }
        Ok(())
    }
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct PartialThreshold {
    threshold: Option<u32>,
    time_window_days: Option<u32>,
}

impl PartialThreshold {
    fn over(self, base: ScopeThreshold) -> ScopeThreshold {
        ScopeThreshold {
            threshold: self.threshold.unwrap_or(base.threshold),
            time_window_days: self.time_window_days.unwrap_or(base.time_window_days),
        }
    }
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct PartialPolicy {
    pole: PartialThreshold,
    pon: PartialThreshold,
    zone: PartialThreshold,
    dr: PartialThreshold,
}

impl<'de> Deserialize<'de> for EscalationPolicy {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let partial = PartialPolicy::deserialize(deserializer)?;
        let base = Self::default();
        Ok(Self {
            pole: partial.pole.over(base.pole),
            pon: partial.pon.over(base.pon),
            zone: partial.zone.over(base.zone),
            dr: partial.dr.over(base.dr),
        })
    }
}

/// A repeat-fault escalation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Escalation {
    /// Identifier
    pub id: EscalationId,
    /// Scope kind
    pub scope_type: ScopeType,
    /// Scope value
    pub scope_value: String,
    /// Lifecycle status
    pub status: EscalationStatus,
    /// Tickets that form the pattern, oldest first, no duplicates
    pub contributing_ticket_ids: IndexSet<TicketId>,
    /// Threshold applied when opened
    pub threshold_used: u32,
    /// Window applied when opened
    pub time_window_days: u32,
    /// Opened at
    pub created_at: Timestamp,
    /// Closed at
    pub resolved_at: Option<Timestamp>,
    /// Closed by
    pub resolved_by: Option<ActorId>,
    /// Closing notes
    pub resolution_notes: Option<String>,
}

impl Escalation {
    /// Open a new escalation
    pub fn open(
        scope: &Scope,
        contributing: impl IntoIterator<Item = TicketId>,
        limits: ScopeThreshold,
        now: Timestamp,
    ) -> Self {
        Self {
            id: EscalationId::new(),
            scope_type: scope.scope_type,
            scope_value: scope.scope_value.clone(),
            status: EscalationStatus::Open,
            contributing_ticket_ids: contributing.into_iter().collect(),
            threshold_used: limits.threshold,
            time_window_days: limits.time_window_days,
            created_at: now,
            resolved_at: None,
            resolved_by: None,
            resolution_notes: None,
        }
    }

    /// Location this escalation is about
    #[must_use]
    pub fn scope(&self) -> Scope {
        Scope::new(self.scope_type, self.scope_value.clone())
    }

    fn ensure_open(&self) -> Result<(), CoreError> {
        if self.status == EscalationStatus::Open {
            Ok(())
        } else {
            Err(CoreError::EscalationNotOpen {
                id: self.id,
                status: self.status,
            })
        }
    }

    /// Append contributing tickets, skipping ones already present.
    ///
    /// Returns the ids actually added, in order.
    pub fn link(
        &mut self,
        ticket_ids: impl IntoIterator<Item = TicketId>,
    ) -> Result<Vec<TicketId>, CoreError> {
        self.ensure_open()?;
        Ok(ticket_ids
            .into_iter()
            .filter(|id| self.contributing_ticket_ids.insert(*id))
            .collect())
    }

    /// Close the escalation
    pub fn resolve(
        &mut self,
        status: EscalationStatus,
        notes: &str,
        by: ActorId,
        now: Timestamp,
    ) -> Result<(), CoreError> {
        let notes = notes.trim();
        if notes.is_empty() {
            return Err(CoreError::validation("resolution notes are required"));
        }
        if !status.is_terminal() {
            return Err(CoreError::validation(format!(
                "escalations can only be resolved to resolved or no_action, not {status}"
            )));
        }
        self.ensure_open()?;
        self.status = status;
        self.resolved_at = Some(now);
        self.resolved_by = Some(by);
        self.resolution_notes = Some(notes.to_string());
        Ok(())
    }
}

/// Criteria for listing escalations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EscalationFilter {
    /// Scope kind
    pub scope_type: Option<ScopeType>,
    /// Scope value (only meaningful with `scope_type`)
    pub scope_value: Option<String>,
    /// Status
    pub status: Option<EscalationStatus>,
    /// Maximum rows
    pub limit: Option<u32>,
}

/// Result of one pattern-detection run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultPatternDetection {
    /// Scope examined
    pub scope: Scope,
    /// Tickets found in the window
    pub fault_count: u32,
    /// Threshold applied
    pub threshold: u32,
    /// Window applied
    pub time_window_days: u32,
    /// `fault_count >= threshold`
    pub pattern_detected: bool,
    /// Tickets found, oldest first
    pub contributing_ticket_ids: Vec<TicketId>,
    /// Open escalation for the scope, when a pattern was detected
    pub escalation: Option<Escalation>,
    /// Whether this run opened the escalation
    pub created: bool,
    /// Operator guidance
    pub recommendation: String,
}

/// Human guidance for a detection outcome
#[must_use]
pub fn recommendation(
    scope: &Scope,
    fault_count: u32,
    threshold: u32,
    pattern_detected: bool,
    already_open: bool,
) -> String {
    let value = &scope.scope_value;
    if !pattern_detected {
        return format!(
            "Monitor: {fault_count} fault(s) on {} {value} (threshold: {threshold}). Continue monitoring.",
            scope.scope_type
        );
    }
    if already_open {
        return format!(
            "Pattern detected: {fault_count} fault(s) on {} {value}, but an active escalation already exists. Update the existing escalation.",
            scope.scope_type
        );
    }
    match scope.scope_type {
        ScopeType::Pole => format!(
            "ESCALATE: {fault_count} faults detected on pole {value} (threshold: {threshold}). Investigate pole stability and replace if necessary."
        ),
        ScopeType::Pon => format!(
            "ESCALATE: {fault_count} faults detected on PON {value} (threshold: {threshold}). Check splitter, fiber path and OLT port."
        ),
        ScopeType::Zone => format!(
            "ESCALATE: {fault_count} faults detected in zone {value} (threshold: {threshold}). Trigger a zone-wide inspection for systemic issues."
        ),
        ScopeType::Dr => format!(
            "ESCALATE: {fault_count} faults detected on DR {value} (threshold: {threshold}). Investigate equipment and installation quality at the drop."
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn open_pole() -> Escalation {
        Escalation::open(
            &Scope::new(ScopeType::Pole, "P100"),
            [TicketId::new(), TicketId::new(), TicketId::new()],
            ScopeThreshold::new(3, 30),
            Utc::now(),
        )
    }

    #[test]
    fn default_policy_matches_operations_guidance() {
        let p = EscalationPolicy::default();
        assert_eq!(p.for_scope(ScopeType::Pole).threshold, 3);
        assert_eq!(p.for_scope(ScopeType::Pon).threshold, 5);
        assert_eq!(p.for_scope(ScopeType::Zone).threshold, 10);
        assert_eq!(p.for_scope(ScopeType::Dr).threshold, 2);
        assert!(ScopeType::ALL.iter().all(|&t| p.for_scope(t).time_window_days == 30));
        assert!(p.validate().is_ok());
    }

    #[test]
    fn partial_policy_merges_over_defaults() {
        let p: EscalationPolicy =
            serde_json::from_str(r#"{"zone": {"threshold": 12}, "pon": {}}"#).unwrap();
        assert_eq!(p.zone, ScopeThreshold::new(12, 30));
        assert_eq!(p.pon, EscalationPolicy::default().pon);
        assert_eq!(p.pole, EscalationPolicy::default().pole);
    }

    #[test]
    fn link_dedups_and_preserves_order() {
        let mut e = open_pole();
        let existing = *e.contributing_ticket_ids.first().unwrap();
        let fresh = TicketId::new();
        let added = e.link([existing, fresh, fresh]).unwrap();
        assert_eq!(added, vec![fresh]);
        assert_eq!(e.contributing_ticket_ids.len(), 4);
        assert_eq!(e.contributing_ticket_ids.last(), Some(&fresh));
    }

    #[test]
    fn resolve_requires_notes_and_terminal_target() {
        let mut e = open_pole();
        let by = ActorId::from("supervisor");
        assert!(matches!(
            e.resolve(EscalationStatus::Resolved, "   ", by.clone(), Utc::now()),
            Err(CoreError::Validation(_))
        ));
        assert!(matches!(
            e.resolve(EscalationStatus::Open, "done", by.clone(), Utc::now()),
            Err(CoreError::Validation(_))
        ));

        e.resolve(EscalationStatus::Resolved, " pole replaced ", by.clone(), Utc::now())
            .unwrap();
        assert_eq!(e.resolution_notes.as_deref(), Some("pole replaced"));

        assert!(matches!(
            e.resolve(EscalationStatus::NoAction, "again", by, Utc::now()),
            Err(CoreError::EscalationNotOpen { .. })
        ));
        assert!(e.link([TicketId::new()]).is_err());
    }

    #[test]
    fn recommendation_names_the_scope() {
        let scope = Scope::new(ScopeType::Pon, "PON-12");
        assert!(recommendation(&scope, 2, 5, false, false).starts_with("Monitor"));
        assert!(recommendation(&scope, 6, 5, true, false).contains("PON PON-12"));
        assert!(recommendation(&scope, 6, 5, true, true).contains("already exists"));
    }
}
