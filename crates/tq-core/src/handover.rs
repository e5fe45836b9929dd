//! Handover gating and snapshots
//!
//! A handover moves ticket ownership from one team to the next. It is
//! accepted only when every required gate passes, and each accepted
//! handover leaves behind an immutable [`HandoverSnapshot`] of the ticket and
//! its checklist as they were at that moment.

use crate::error::CoreError;
use crate::ticket::{OwnerTeam, Ticket};
use crate::types::{ActorId, SnapshotId, TicketId, Timestamp};
use crate::verification::{VerificationProgress, VerificationStep};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

str_enum! {
    /// Direction of an ownership transfer
    pub enum HandoverType {
        /// Construction hands over to QA
        BuildToQa => "build_to_qa",
        /// QA hands over to maintenance
        QaToMaintenance => "qa_to_maintenance",
    }
}

impl HandoverType {
    /// Team expected to own the ticket before the handover
    #[inline]
    #[must_use]
    pub const fn origin(self) -> OwnerTeam {
        match self {
            Self::BuildToQa => OwnerTeam::Build,
            Self::QaToMaintenance => OwnerTeam::Qa,
        }
    }

    /// Team owning the ticket after the handover
    #[inline]
    #[must_use]
    pub const fn target(self) -> OwnerTeam {
        match self {
            Self::BuildToQa => OwnerTeam::Qa,
            Self::QaToMaintenance => OwnerTeam::Maintenance,
        }
    }
}

str_enum! {
    /// Individual gate checks
    pub enum GateName {
        /// All 12 verification steps complete
        VerificationComplete => "verification_complete",
        /// Fault cause attributed
        FaultCauseAttributed => "fault_cause_attributed",
        /// All four scope fields populated
        AsBuiltComplete => "as_built_complete",
        /// Someone is assigned
        AssigneePresent => "assignee_present",
        /// Current owner is the handover's origin team
        OwnerMatchesOrigin => "owner_matches_origin",
        /// Fault cause details written down
        FaultCauseDetailsRecorded => "fault_cause_details_recorded",
        /// Every step that needs a photo has one
        PhotosArchived => "photos_archived",
    }
}

str_enum! {
    /// How serious a failed check is
    pub enum Severity {
        /// Blocks the handover
        Critical => "critical",
        /// Should be fixed soon
        High => "high",
        /// Worth noting
        Medium => "medium",
    }
}

/// Outcome of one gate check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateCheck {
    /// Which check
    pub gate: GateName,
    /// Whether a failure blocks the handover
    pub required: bool,
    /// Pass or fail
    pub passed: bool,
    /// Human-readable result
    pub message: String,
}

/// A failed check, with a hint on how to clear it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockingIssue {
    /// Which check
    pub gate: GateName,
    /// Seriousness
    pub severity: Severity,
    /// What is wrong
    pub message: String,
    /// How to fix it
    pub resolution_hint: String,
}

/// Full result of evaluating the gate for one handover
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateEvaluation {
    /// Ticket evaluated
    pub ticket_id: TicketId,
    /// Handover evaluated
    pub handover_type: HandoverType,
    /// No blocking issues
    pub can_handover: bool,
    /// Failed required checks
    pub blocking_issues: Vec<BlockingIssue>,
    /// Failed advisory checks
    pub warnings: Vec<BlockingIssue>,
    /// Every check that passed
    pub gates_passed: Vec<GateCheck>,
    /// Every check that failed
    pub gates_failed: Vec<GateCheck>,
}

impl GateEvaluation {
    /// Evaluate the gate checklist. Pure: reads nothing but its arguments.
    #[must_use]
    pub fn evaluate(
        ticket: &Ticket,
        steps: &[VerificationStep],
        handover_type: HandoverType,
    ) -> Self {
        let progress = VerificationProgress::of(steps);
        let mut eval = Self {
            ticket_id: ticket.id,
            handover_type,
            can_handover: true,
            blocking_issues: Vec::new(),
            warnings: Vec::new(),
            gates_passed: Vec::new(),
            gates_failed: Vec::new(),
        };

        eval.record(
            GateName::VerificationComplete,
            true,
            progress.all_complete,
            format!(
                "{}/{} verification steps complete",
                progress.completed_count, progress.total
            ),
            "Complete all 12 verification steps",
        );

        if handover_type == HandoverType::QaToMaintenance {
            eval.record(
                GateName::FaultCauseAttributed,
                true,
                ticket.fault_cause.is_some(),
                match ticket.fault_cause {
                    Some(cause) => format!("fault cause attributed: {cause}"),
                    None => "fault cause has not been attributed".to_string(),
                },
                "Set the fault cause before handing over to maintenance",
            );
        }

        let missing = ticket.scope.missing();
        eval.record(
            GateName::AsBuiltComplete,
            false,
            missing.is_empty(),
            if missing.is_empty() {
                "as-built data complete".to_string()
            } else {
                let names: Vec<&str> = missing.iter().map(|s| s.as_str()).collect();
                format!("as-built data missing: {}", names.join(", "))
            },
            "Update ticket with pole, PON, zone and DR",
        );

        eval.record(
            GateName::AssigneePresent,
            false,
            ticket.assigned_to.is_some(),
            match &ticket.assigned_to {
                Some(who) => format!("assigned to {who}"),
                None => "no assignee".to_string(),
            },
            "Assign the ticket before handover",
        );

        let origin = handover_type.origin();
        eval.record(
            GateName::OwnerMatchesOrigin,
            true,
            ticket.owner == origin,
            format!("current owner {}, expected {origin}", ticket.owner),
            "Check the handover direction against the current owner",
        );

        let unphotographed: Vec<String> = steps
            .iter()
            .filter(|s| s.missing_photo())
            .map(|s| s.step_number.to_string())
            .collect();
        eval.record(
            GateName::PhotosArchived,
            false,
            unphotographed.is_empty(),
            if unphotographed.is_empty() {
                "photo evidence archived".to_string()
            } else {
                format!("photo missing for steps {}", unphotographed.join(", "))
            },
            "Upload photo evidence for every step that requires it",
        );

        if handover_type == HandoverType::QaToMaintenance {
            let has_details = ticket
                .fault_cause_details
                .as_deref()
                .is_some_and(|d| !d.trim().is_empty());
            eval.record(
                GateName::FaultCauseDetailsRecorded,
                false,
                has_details,
                if has_details {
                    "fault cause details recorded".to_string()
                } else {
                    "fault cause details missing".to_string()
                },
                "Describe the fault cause for the maintenance team",
            );
        }

        eval.can_handover = eval.blocking_issues.is_empty();
        eval
    }

    fn record(
        &mut self,
        gate: GateName,
        required: bool,
        passed: bool,
        message: String,
        hint: &str,
    ) {
        let check = GateCheck {
            gate,
            required,
            passed,
            message: message.clone(),
        };
        if passed {
            self.gates_passed.push(check);
            return;
        }
        self.gates_failed.push(check);
        let issue = BlockingIssue {
            gate,
            severity: if required {
                Severity::Critical
            } else {
                Severity::Medium
            },
            message,
            resolution_hint: hint.to_string(),
        };
        if required {
            self.blocking_issues.push(issue);
        } else {
            self.warnings.push(issue);
        }
    }
}

/// Everything captured at handover time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotData {
    /// Ticket as it was
    pub ticket: Ticket,
    /// All 12 steps as they were
    pub verification_steps: Vec<VerificationStep>,
    /// Progress at capture
    pub progress: VerificationProgress,
}

impl SnapshotData {
    /// Deep-copy the ticket and its checklist
    #[must_use]
    pub fn capture(ticket: &Ticket, steps: &[VerificationStep]) -> Self {
        Self {
            ticket: ticket.clone(),
            verification_steps: steps.to_vec(),
            progress: VerificationProgress::of(steps),
        }
    }

    /// JSON form as stored
    pub fn to_value(&self) -> Result<serde_json::Value, CoreError> {
        serde_json::to_value(self)
            .map_err(|e| CoreError::validation(format!("snapshot encoding failed: {e}")))
    }
}

/// SHA-256 hex digest of a snapshot payload
#[must_use]
pub fn content_digest(data: &serde_json::Value) -> String {
    let canonical = data.to_string();
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

/// Immutable record of one accepted handover
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoverSnapshot {
    /// Snapshot identifier
    pub id: SnapshotId,
    /// Ticket handed over
    pub ticket_id: TicketId,
    /// Direction
    pub handover_type: HandoverType,
    /// Who performed the handover
    pub handover_by: ActorId,
    /// Owner before
    pub owner_before: OwnerTeam,
    /// Owner after
    pub owner_after: OwnerTeam,
    /// Captured ticket, steps and progress
    pub snapshot_data: serde_json::Value,
    /// SHA-256 hex of `snapshot_data`
    pub content_digest: String,
    /// Always true once stored
    pub locked: bool,
    /// Capture time
    pub created_at: Timestamp,
}

impl HandoverSnapshot {
    /// Build a locked snapshot for an accepted handover
    pub fn new(
        ticket: &Ticket,
        steps: &[VerificationStep],
        handover_type: HandoverType,
        handover_by: ActorId,
        now: Timestamp,
    ) -> Result<Self, CoreError> {
        let snapshot_data = SnapshotData::capture(ticket, steps).to_value()?;
        Ok(Self {
            id: SnapshotId::new(),
            ticket_id: ticket.id,
            handover_type,
            handover_by,
            owner_before: ticket.owner,
            owner_after: handover_type.target(),
            content_digest: content_digest(&snapshot_data),
            snapshot_data,
            locked: true,
            created_at: now,
        })
    }

    /// Recompute the digest and compare with the stored one
    #[must_use]
    pub fn verify_digest(&self) -> bool {
        content_digest(&self.snapshot_data) == self.content_digest
    }

    /// Decode the captured payload
    pub fn data(&self) -> Result<SnapshotData, CoreError> {
        serde_json::from_value(self.snapshot_data.clone())
            .map_err(|e| CoreError::validation(format!("snapshot {} is malformed: {e}", self.id)))
    }
}

/// Current owner plus every snapshot in creation order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoverHistory {
    /// Ticket
    pub ticket_id: TicketId,
    /// Owner now
    pub current_owner: OwnerTeam,
    /// Snapshots, oldest first
    pub handovers: Vec<HandoverSnapshot>,
}
