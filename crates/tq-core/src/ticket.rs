//! Ticket records
//!
//! The canonical typed ticket. Storage maps rows into [`Ticket`] once; every
//! other component works with this struct.

use crate::error::CoreError;
use crate::scope::{Scope, ScopeFields};
use crate::types::{ActorId, TicketId, Timestamp};
use serde::{Deserialize, Serialize};

str_enum! {
    /// Workflow status
    pub enum TicketStatus {
        /// Logged, not yet looked at
        New => "new",
        /// Classified and prioritised
        Triaged => "triaged",
        /// Has an assignee
        Assigned => "assigned",
        /// Work under way
        InProgress => "in_progress",
        /// Paused; SLA clock stopped
        Blocked => "blocked",
        /// Work done, awaiting closure
        Resolved => "resolved",
        /// Finished
        Closed => "closed",
        /// Abandoned or rejected
        Cancelled => "cancelled",
        /// Waiting for billing sign-off
        PendingApproval => "pending_approval",
    }
}

impl TicketStatus {
    /// Closed and cancelled tickets accept no further transitions
    #[inline]
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Cancelled)
    }

    /// States from which a ticket may be paused
    #[inline]
    #[must_use]
    pub const fn is_in_flight(self) -> bool {
        matches!(
            self,
            Self::New | Self::Triaged | Self::Assigned | Self::InProgress | Self::Resolved
        )
    }
}

str_enum! {
    /// Ticket priority
    pub enum Priority {
        /// Low
        Low => "low",
        /// Normal
        Normal => "normal",
        /// High
        High => "high",
        /// Urgent
        Urgent => "urgent",
        /// Critical
        Critical => "critical",
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::Normal
    }
}

str_enum! {
    /// Where the ticket originated
    pub enum TicketSource {
        /// Imported from the call-centre system
        CallCenterImport => "call_center_import",
        /// Entered by hand
        Manual => "manual",
        /// Raised by network monitoring
        Monitoring => "monitoring",
    }
}

str_enum! {
    /// Work classification
    pub enum TicketType {
        /// Fault on existing infrastructure
        Maintenance => "maintenance",
        /// New customer connection
        NewInstallation => "new_installation",
        /// Change to an existing installation
        Modification => "modification",
        /// ONT replacement
        OntSwap => "ont_swap",
        /// Outage or incident
        Incident => "incident",
    }
}

str_enum! {
    /// Who pays for the work
    pub enum BillingType {
        /// Covered by the installation guarantee
        Guarantee => "guarantee",
        /// Billable to the client
        Billable => "billable",
        /// Not yet classified
        PendingClassification => "pending_classification",
    }
}

impl Default for BillingType {
    fn default() -> Self {
        Self::PendingClassification
    }
}

str_enum! {
    /// Attributed root cause of a fault
    pub enum FaultCause {
        /// Poor installation work
        Workmanship => "workmanship",
        /// Defective component
        MaterialFailure => "material_failure",
        /// Damage by the client
        ClientDamage => "client_damage",
        /// Damage by another party
        ThirdParty => "third_party",
        /// Weather, animals, ground movement
        Environmental => "environmental",
        /// Deliberate damage
        Vandalism => "vandalism",
        /// Investigated, cause not determined
        Unknown => "unknown",
    }
}

str_enum! {
    /// Team currently owning a ticket
    pub enum OwnerTeam {
        /// Construction / installation crews
        Build => "build",
        /// Quality assurance
        Qa => "qa",
        /// Operations and maintenance
        Maintenance => "maintenance",
    }
}

/// Cost data that must be attached before billing approval is requested
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingCost {
    /// Amount in minor currency units
    pub amount_cents: i64,
    /// ISO-4217 currency code
    pub currency: String,
    /// Free-form justification
    pub note: Option<String>,
}

impl BillingCost {
    /// Reject negative amounts and malformed currency codes
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.amount_cents < 0 {
            return Err(CoreError::validation("billing amount must not be negative"));
        }
        let code = self.currency.trim();
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(CoreError::validation(format!(
                "currency must be a 3-letter code, got '{}'",
                self.currency
            )));
        }
        Ok(())
    }
}

/// A ticket as persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Internal identifier
    pub id: TicketId,
    /// Human-facing code, e.g. `FT406824`
    pub ticket_uid: String,
    /// Short summary
    pub title: String,
    /// Longer description
    pub description: Option<String>,
    /// Work classification
    pub ticket_type: TicketType,
    /// Workflow status
    pub status: TicketStatus,
    /// Priority
    pub priority: Priority,
    /// Origin
    pub source: TicketSource,
    /// Billing classification
    pub billing_type: BillingType,
    /// Whether billing sign-off is needed before work can complete
    pub requires_billing_approval: bool,
    /// Attached cost data
    pub billing_cost: Option<BillingCost>,
    /// Current assignee
    pub assigned_to: Option<ActorId>,
    /// Current owning team
    pub owner: OwnerTeam,
    /// Attributed fault cause
    pub fault_cause: Option<FaultCause>,
    /// Detail supporting the fault cause
    pub fault_cause_details: Option<String>,
    /// Network location
    #[serde(flatten)]
    pub scope: ScopeFields,
    /// All verification steps complete, as last recorded
    pub qa_ready: bool,
    /// SLA deadline
    pub sla_due_at: Option<Timestamp>,
    /// Set while blocked
    pub sla_paused_at: Option<Timestamp>,
    /// Why the ticket is blocked
    pub sla_pause_reason: Option<String>,
    /// Total minutes spent blocked
    pub sla_paused_minutes: i64,
    /// Status to return to from blocked or pending approval
    pub resume_status: Option<TicketStatus>,
    /// Creator
    pub created_by: ActorId,
    /// Creation time
    pub created_at: Timestamp,
    /// Last mutation time
    pub updated_at: Timestamp,
}

impl Ticket {
    /// Build a fresh ticket from a validated creation request
    #[must_use]
    pub fn from_new(
        id: TicketId,
        ticket_uid: String,
        new: NewTicket,
        created_by: ActorId,
        now: Timestamp,
    ) -> Self {
        Self {
            id,
            ticket_uid,
            title: new.title.trim().to_string(),
            description: new.description,
            ticket_type: new.ticket_type,
            status: TicketStatus::New,
            priority: new.priority.unwrap_or_default(),
            source: new.source,
            billing_type: new.billing_type.unwrap_or_default(),
            requires_billing_approval: new.requires_billing_approval,
            billing_cost: None,
            assigned_to: new.assigned_to,
            owner: OwnerTeam::Build,
            fault_cause: new.fault_cause,
            fault_cause_details: None,
            scope: new.scope.normalized(),
            qa_ready: false,
            sla_due_at: new.sla_due_at,
            sla_paused_at: None,
            sla_pause_reason: None,
            sla_paused_minutes: 0,
            resume_status: None,
            created_by,
            created_at: now,
            updated_at: now,
        }
    }

    /// Billing approval may be requested
    #[inline]
    #[must_use]
    pub fn billing_ready(&self) -> bool {
        self.requires_billing_approval && self.billing_cost.is_some()
    }

    /// Check the structural invariants that must hold for every stored ticket
    pub fn check_invariants(&self) -> Result<(), CoreError> {
        let blocked = self.status == TicketStatus::Blocked;
        if blocked != self.sla_paused_at.is_some() {
            return Err(CoreError::validation(format!(
                "ticket {}: sla_paused_at must be set iff blocked (status {})",
                self.ticket_uid, self.status
            )));
        }
        let parked = matches!(
            self.status,
            TicketStatus::Blocked | TicketStatus::PendingApproval
        );
        if parked != self.resume_status.is_some() {
            return Err(CoreError::validation(format!(
                "ticket {}: resume status must be set iff blocked or pending approval",
                self.ticket_uid
            )));
        }
        if self.scope.is_empty() {
            return Err(CoreError::validation(format!(
                "ticket {}: at least one scope field is required",
                self.ticket_uid
            )));
        }
        Ok(())
    }
}

/// Ticket creation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTicket {
    /// Short summary (required, non-blank)
    pub title: String,
    /// Longer description
    #[serde(default)]
    pub description: Option<String>,
    /// Work classification
    pub ticket_type: TicketType,
    /// Priority, defaults to normal
    #[serde(default)]
    pub priority: Option<Priority>,
    /// Origin
    pub source: TicketSource,
    /// Billing classification, defaults to pending classification
    #[serde(default)]
    pub billing_type: Option<BillingType>,
    /// Whether billing sign-off is required
    #[serde(default)]
    pub requires_billing_approval: bool,
    /// Initial assignee
    #[serde(default)]
    pub assigned_to: Option<ActorId>,
    /// Known fault cause at intake
    #[serde(default)]
    pub fault_cause: Option<FaultCause>,
    /// SLA deadline
    #[serde(default)]
    pub sla_due_at: Option<Timestamp>,
    /// Network location; at least one field required
    #[serde(flatten)]
    pub scope: ScopeFields,
}

impl NewTicket {
    /// Minimal creation request
    pub fn new(
        title: impl Into<String>,
        ticket_type: TicketType,
        source: TicketSource,
        scope: ScopeFields,
    ) -> Self {
        Self {
            title: title.into(),
            description: None,
            ticket_type,
            priority: None,
            source,
            billing_type: None,
            requires_billing_approval: false,
            assigned_to: None,
            fault_cause: None,
            sla_due_at: None,
            scope,
        }
    }

    /// With priority
    #[inline]
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// With billing approval requirement
    #[inline]
    #[must_use]
    pub fn with_billing_approval(mut self, billing_type: BillingType) -> Self {
        self.billing_type = Some(billing_type);
        self.requires_billing_approval = true;
        self
    }

    /// With initial assignee
    #[inline]
    #[must_use]
    pub fn with_assignee(mut self, assignee: ActorId) -> Self {
        self.assigned_to = Some(assignee);
        self
    }

    /// With SLA deadline
    #[inline]
    #[must_use]
    pub fn with_sla_due(mut self, due: Timestamp) -> Self {
        self.sla_due_at = Some(due);
        self
    }

    /// Validate the request before anything is written
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.title.trim().is_empty() {
            return Err(CoreError::validation("title is required"));
        }
        if self.scope.is_empty() {
            return Err(CoreError::validation(
                "at least one of pole_number, pon, zone_id, dr_number is required",
            ));
        }
        if let Some(assignee) = &self.assigned_to {
            if assignee.as_str().trim().is_empty() {
                return Err(CoreError::validation("assigned_to must not be blank"));
            }
        }
        Ok(())
    }
}

/// Criteria for listing tickets; unset fields do not filter
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TicketFilter {
    /// Exact status
    pub status: Option<TicketStatus>,
    /// Exact scope match
    pub scope: Option<Scope>,
    /// Exact assignee
    pub assigned_to: Option<ActorId>,
    /// Created at or after
    pub created_after: Option<Timestamp>,
    /// Created at or before
    pub created_before: Option<Timestamp>,
    /// Maximum rows returned
    pub limit: Option<u32>,
}
