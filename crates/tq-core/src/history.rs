//! Append-only audit history
//!
//! Every mutation writes one entry in the same transaction as the change it
//! describes. Entries form a single SHA-256 hash chain across all entities:
//! each entry commits to its own content and to the previous entry's hash,
//! so any edit or deletion breaks verification from that point on.

use crate::types::{ActorId, EscalationId, TicketId, Timestamp};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Hash preceding the first entry
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

str_enum! {
    /// Kind of record an entry refers to
    pub enum EntityType {
        /// Ticket
        Ticket => "ticket",
        /// Escalation
        Escalation => "escalation",
    }
}

str_enum! {
    /// What happened
    pub enum HistoryAction {
        /// Ticket created
        Created => "created",
        /// Status transition
        StatusChange => "status_change",
        /// Assignee changed
        Assignment => "assignment",
        /// Some other field changed
        FieldUpdate => "field_update",
        /// Checklist step changed
        VerificationUpdate => "verification_update",
        /// Ownership transferred
        Handover => "handover",
        /// Escalation opened
        EscalationOpened => "escalation_opened",
        /// Tickets attached to an escalation
        EscalationLinked => "escalation_linked",
        /// Escalation closed
        EscalationResolved => "escalation_resolved",
    }
}

/// Entry content as supplied by the writer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Entity kind
    pub entity_type: EntityType,
    /// Entity identifier
    pub entity_id: String,
    /// Action
    pub action: HistoryAction,
    /// Field touched, if a single one
    pub field_changed: Option<String>,
    /// Previous value
    pub old_value: Option<String>,
    /// New value
    pub new_value: Option<String>,
    /// Actor
    pub changed_by: ActorId,
    /// When
    pub changed_at: Timestamp,
    /// Why
    pub change_reason: Option<String>,
}

impl HistoryRecord {
    fn new(
        entity_type: EntityType,
        entity_id: String,
        action: HistoryAction,
        changed_by: ActorId,
        changed_at: Timestamp,
    ) -> Self {
        Self {
            entity_type,
            entity_id,
            action,
            field_changed: None,
            old_value: None,
            new_value: None,
            changed_by,
            changed_at,
            change_reason: None,
        }
    }

    /// Entry about a ticket
    #[must_use]
    pub fn ticket(
        id: TicketId,
        action: HistoryAction,
        changed_by: ActorId,
        changed_at: Timestamp,
    ) -> Self {
        Self::new(EntityType::Ticket, id.to_string(), action, changed_by, changed_at)
    }

    /// Entry about an escalation
    #[must_use]
    pub fn escalation(
        id: EscalationId,
        action: HistoryAction,
        changed_by: ActorId,
        changed_at: Timestamp,
    ) -> Self {
        Self::new(EntityType::Escalation, id.to_string(), action, changed_by, changed_at)
    }

    /// With field change
    #[must_use]
    pub fn field(
        mut self,
        name: impl Into<String>,
        old: Option<String>,
        new: Option<String>,
    ) -> Self {
        self.field_changed = Some(name.into());
        self.old_value = old;
        self.new_value = new;
        self
    }

    /// With reason
    #[must_use]
    pub fn reason(mut self, reason: Option<&str>) -> Self {
        self.change_reason = reason.map(str::to_string);
        self
    }
}

/// A stored history entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Position in the chain, starting at 1
    pub seq: i64,
    /// Content
    #[serde(flatten)]
    pub record: HistoryRecord,
    /// Hash of the previous entry
    pub prev_hash: String,
    /// Hash of this entry
    pub hash: String,
}

impl HistoryEntry {
    /// Seal a record onto the chain
    #[must_use]
    pub fn seal(seq: i64, record: HistoryRecord, prev_hash: String) -> Self {
        let hash = compute_hash(seq, &record, &prev_hash);
        Self {
            seq,
            record,
            prev_hash,
            hash,
        }
    }
}

fn put_opt(hasher: &mut Sha256, value: Option<&str>) {
    match value {
        Some(v) => {
            hasher.update([1]);
            hasher.update(v.as_bytes());
        }
        None => hasher.update([0]),
    }
    hasher.update([0]);
}

/// Hash of an entry's content and its predecessor's hash
#[must_use]
pub fn compute_hash(seq: i64, record: &HistoryRecord, prev_hash: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(seq.to_le_bytes());
    hasher.update(record.entity_type.as_str().as_bytes());
    hasher.update([0]);
    hasher.update(record.entity_id.as_bytes());
    hasher.update([0]);
    hasher.update(record.action.as_str().as_bytes());
    hasher.update([0]);
    put_opt(&mut hasher, record.field_changed.as_deref());
    put_opt(&mut hasher, record.old_value.as_deref());
    put_opt(&mut hasher, record.new_value.as_deref());
    hasher.update(record.changed_by.as_str().as_bytes());
    hasher.update([0]);
    hasher.update(record.changed_at.timestamp_micros().to_le_bytes());
    put_opt(&mut hasher, record.change_reason.as_deref());
    hasher.update(prev_hash.as_bytes());
    hex::encode(hasher.finalize())
}

/// Outcome of walking the history chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    /// Entries examined
    pub entries_checked: u64,
    /// Chain intact
    pub valid: bool,
    /// Sequence number of the first bad entry
    pub first_broken_seq: Option<i64>,
    /// What was wrong with it
    pub detail: Option<String>,
}

/// Verify a chain given in sequence order
pub fn verify_chain<'a>(entries: impl IntoIterator<Item = &'a HistoryEntry>) -> IntegrityReport {
    let mut prev = GENESIS_HASH.to_string();
    let mut expected_seq = 1;
    let mut checked = 0;
    for e in entries {
        checked += 1;
        let problem = if e.seq != expected_seq {
            Some(format!("expected seq {expected_seq}, found {}", e.seq))
        } else if e.prev_hash != prev {
            Some("prev_hash does not match preceding entry".to_string())
        } else if e.hash != compute_hash(e.seq, &e.record, &e.prev_hash) {
            Some("content hash mismatch".to_string())
        } else {
            None
        };
        if let Some(detail) = problem {
            return IntegrityReport {
                entries_checked: checked,
                valid: false,
                first_broken_seq: Some(e.seq),
                detail: Some(detail),
            };
        }
        prev.clone_from(&e.hash);
        expected_seq += 1;
    }
    IntegrityReport {
        entries_checked: checked,
        valid: true,
        first_broken_seq: None,
        detail: None,
    }
}
