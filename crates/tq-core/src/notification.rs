//! Outbound notification messages
//!
//! Messages are rendered from fixed templates with `{{name}}` placeholders.
//! Delivery belongs to whoever implements the engine's notifier.

use crate::escalation::Escalation;
use crate::handover::HandoverSnapshot;
use crate::ticket::{OwnerTeam, Ticket};
use crate::types::ActorId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Who a message is for
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Recipient {
    /// A single person
    Actor(ActorId),
    /// Everyone on a team
    Team(OwnerTeam),
    /// A named channel, e.g. an operations group
    Channel(String),
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Actor(a) => write!(f, "actor:{a}"),
            Self::Team(t) => write!(f, "team:{t}"),
            Self::Channel(c) => write!(f, "channel:{c}"),
        }
    }
}

str_enum! {
    /// Message template
    pub enum NotificationKind {
        /// A ticket was assigned to someone
        TicketAssigned => "ticket_assigned",
        /// Ownership moved to a new team
        HandoverComplete => "handover_complete",
        /// A repeat-fault escalation opened
        EscalationCreated => "escalation_created",
    }
}

impl NotificationKind {
    /// Subject and body templates
    #[must_use]
    pub const fn template(self) -> (&'static str, &'static str) {
        match self {
            Self::TicketAssigned => (
                "Ticket {{ticket_uid}} assigned",
                "Ticket {{ticket_uid}} ({{title}}) has been assigned to you. Priority: {{priority}}.",
            ),
            Self::HandoverComplete => (
                "Ticket {{ticket_uid}} handed over to {{owner_after}}",
                "Ticket {{ticket_uid}} was handed over from {{owner_before}} to {{owner_after}} by {{handover_by}}.",
            ),
            Self::EscalationCreated => (
                "Repeat faults on {{scope_type}} {{scope_value}}",
                "{{fault_count}} tickets on {{scope_type}} {{scope_value}} within {{time_window_days}} days (threshold {{threshold}}). Escalation {{escalation_id}} opened.",
            ),
        }
    }
}

/// Substitute `{{name}}` placeholders. Unknown placeholders are left as-is.
#[must_use]
pub fn render(template: &str, vars: &BTreeMap<&str, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let name = after[..end].trim();
                match vars.get(name) {
                    Some(value) => out.push_str(value),
                    None => out.push_str(&rest[start..start + 2 + end + 2]),
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// A rendered message ready to hand to a notifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Template used
    pub kind: NotificationKind,
    /// Addressee
    pub recipient: Recipient,
    /// Subject line
    pub subject: String,
    /// Body
    pub body: String,
}

impl Notification {
    fn build(kind: NotificationKind, recipient: Recipient, vars: &BTreeMap<&str, String>) -> Self {
        let (subject, body) = kind.template();
        Self {
            kind,
            recipient,
            subject: render(subject, vars),
            body: render(body, vars),
        }
    }

    /// Tell an assignee about a new ticket
    #[must_use]
    pub fn ticket_assigned(ticket: &Ticket, assignee: &ActorId) -> Self {
        let vars = BTreeMap::from([
            ("ticket_uid", ticket.ticket_uid.clone()),
            ("title", ticket.title.clone()),
            ("priority", ticket.priority.to_string()),
        ]);
        Self::build(
            NotificationKind::TicketAssigned,
            Recipient::Actor(assignee.clone()),
            &vars,
        )
    }

    /// Tell the receiving team about a handover
    #[must_use]
    pub fn handover_complete(ticket: &Ticket, snapshot: &HandoverSnapshot) -> Self {
        let vars = BTreeMap::from([
            ("ticket_uid", ticket.ticket_uid.clone()),
            ("owner_before", snapshot.owner_before.to_string()),
            ("owner_after", snapshot.owner_after.to_string()),
            ("handover_by", snapshot.handover_by.to_string()),
        ]);
        Self::build(
            NotificationKind::HandoverComplete,
            Recipient::Team(snapshot.owner_after),
            &vars,
        )
    }

    /// Announce a newly opened escalation
    #[must_use]
    pub fn escalation_created(escalation: &Escalation, recipient: Recipient) -> Self {
        let vars = BTreeMap::from([
            ("scope_type", escalation.scope_type.to_string()),
            ("scope_value", escalation.scope_value.clone()),
            ("fault_count", escalation.contributing_ticket_ids.len().to_string()),
            ("time_window_days", escalation.time_window_days.to_string()),
            ("threshold", escalation.threshold_used.to_string()),
            ("escalation_id", escalation.id.to_string()),
        ]);
        Self::build(NotificationKind::EscalationCreated, recipient, &vars)
    }

    /// Single-line form handed to the notifier
    #[must_use]
    pub fn message(&self) -> String {
        format!("{}: {}", self.subject, self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_substitutes_known_and_keeps_unknown() {
        let vars = BTreeMap::from([("name", "P100".to_string())]);
        assert_eq!(render("pole {{name}} / {{ name }}", &vars), "pole P100 / P100");
        assert_eq!(render("{{missing}} here", &vars), "{{missing}} here");
        assert_eq!(render("unterminated {{name", &vars), "unterminated {{name");
        assert_eq!(render("no placeholders", &vars), "no placeholders");
    }

    #[test]
    fn recipient_display_is_prefixed() {
        assert_eq!(Recipient::Team(OwnerTeam::Qa).to_string(), "team:qa");
        assert_eq!(Recipient::Channel("ops".into()).to_string(), "channel:ops");
    }
}
