use chrono::Duration;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::time::Instant;
use tq_core::{
    BillingCost, BillingType, HistoryAction, Recipient, ScopeFields, TicketFilter, TicketStatus,
};
use tq_engine::{EngineError, TicketLifecycle};
use tq_test_utils::{actor, create, ctx, ctx_as, pole_ticket, test_engine};

#[test]
fn created_ticket_starts_new_with_pending_checklist() {
    let t = test_engine();
    let ticket = create(&t, pole_ticket("P1"));

    assert_eq!(ticket.status, TicketStatus::New);
    assert_eq!(ticket.owner.as_str(), "build");
    assert!(ticket.ticket_uid.starts_with("FT"));
    assert_eq!(ticket.ticket_uid.len(), 8);
    assert!(!ticket.qa_ready);

    let steps = t.verification().list(ticket.id).unwrap();
    assert_eq!(steps.len(), 12);
    assert!(steps.iter().all(|s| !s.completed && s.completed_at.is_none()));

    let history = t.tickets().ticket_history(ticket.id).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].record.action, HistoryAction::Created);
    assert_eq!(history[0].record.changed_by, actor("tester"));

    assert_eq!(t.tickets().get_ticket_by_uid(&ticket.ticket_uid).unwrap(), ticket);
}

#[test]
fn creation_requires_title_and_scope() {
    let t = test_engine();

    let mut blank = pole_ticket("P1");
    blank.title = "   ".into();
    assert!(matches!(
        t.tickets().create_ticket(&ctx(), blank),
        Err(EngineError::Validation(_))
    ));

    let mut unscoped = pole_ticket("P1");
    unscoped.scope = ScopeFields::default();
    assert!(matches!(
        t.tickets().create_ticket(&ctx(), unscoped),
        Err(EngineError::Validation(_))
    ));

    assert!(t.tickets().list_tickets(&TicketFilter::default()).unwrap().is_empty());
}

#[test]
fn same_status_transition_is_rejected_without_history() {
    let t = test_engine();
    let ticket = create(&t, pole_ticket("P1"));

    let err = t
        .transition_status(&ctx(), ticket.id, TicketStatus::New, None)
        .unwrap_err();
    assert!(matches!(err, EngineError::NoOpTransition(TicketStatus::New)));
    assert_eq!(t.tickets().ticket_history(ticket.id).unwrap().len(), 1);
}

#[test]
fn edges_outside_the_machine_are_rejected() {
    let t = test_engine();
    let ticket = create(&t, pole_ticket("P1"));

    let err = t
        .transition_status(&ctx(), ticket.id, TicketStatus::Closed, None)
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::InvalidTransition {
            from: TicketStatus::New,
            to: TicketStatus::Closed,
            ..
        }
    ));
}

#[test]
fn terminal_tickets_do_not_move() {
    let t = test_engine();
    let ticket = create(&t, pole_ticket("P1"));
    t.transition_status(&ctx(), ticket.id, TicketStatus::Cancelled, Some("duplicate"))
        .unwrap();

    for &to in TicketStatus::ALL {
        if to == TicketStatus::Cancelled {
            continue;
        }
        assert!(matches!(
            t.transition_status(&ctx(), ticket.id, to, None),
            Err(EngineError::InvalidTransition { .. })
        ));
    }
    assert!(t.tickets().available_transitions(ticket.id).unwrap().is_empty());
}

#[test]
fn blocking_pauses_and_resuming_shifts_the_sla() {
    let t = test_engine();
    let due = t.clock.now_plus(Duration::hours(8));
    let ticket = create(&t, pole_ticket("P1").with_sla_due(due));

    t.transition_status(&ctx(), ticket.id, TicketStatus::Assigned, None)
        .unwrap();
    let blocked = t
        .transition_status(&ctx(), ticket.id, TicketStatus::Blocked, Some("waiting on permit"))
        .unwrap();
    assert_eq!(blocked.sla_paused_at, Some(t.clock.current()));
    assert_eq!(blocked.sla_pause_reason.as_deref(), Some("waiting on permit"));
    assert_eq!(blocked.resume_status, Some(TicketStatus::Assigned));

    let err = t
        .transition_status(&ctx(), ticket.id, TicketStatus::InProgress, None)
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition { .. }));

    t.clock.advance(Duration::minutes(90));
    let resumed = t
        .transition_status(&ctx(), ticket.id, TicketStatus::Assigned, None)
        .unwrap();
    assert_eq!(resumed.sla_paused_at, None);
    assert_eq!(resumed.sla_pause_reason, None);
    assert_eq!(resumed.resume_status, None);
    assert_eq!(resumed.sla_paused_minutes, 90);
    assert_eq!(resumed.sla_due_at, Some(due + Duration::minutes(90)));
}

#[test]
fn blocked_tickets_may_be_cancelled() {
    let t = test_engine();
    let ticket = create(&t, pole_ticket("P1"));
    t.transition_status(&ctx(), ticket.id, TicketStatus::Blocked, None)
        .unwrap();
    let cancelled = t
        .transition_status(&ctx(), ticket.id, TicketStatus::Cancelled, None)
        .unwrap();
    assert_eq!(cancelled.sla_paused_at, None);
    assert_eq!(cancelled.resume_status, None);
}

#[test]
fn assignment_records_history_and_notifies_the_assignee() {
    let t = test_engine();
    let ticket = create(&t, pole_ticket("P1"));

    let assigned = t
        .assign(&ctx(), ticket.id, actor("tech-7"), Some("nearest crew"))
        .unwrap();
    assert_eq!(assigned.assigned_to, Some(actor("tech-7")));

    let err = t.assign(&ctx(), ticket.id, actor("tech-7"), None).unwrap_err();
    assert!(matches!(err, EngineError::NoOpAssignment(_)));

    let history = t.tickets().ticket_history(ticket.id).unwrap();
    let last = history.last().unwrap();
    assert_eq!(last.record.action, HistoryAction::Assignment);
    assert_eq!(last.record.new_value.as_deref(), Some("tech-7"));
    assert_eq!(last.record.change_reason.as_deref(), Some("nearest crew"));

    let sent = t.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, Recipient::Actor(actor("tech-7")));
    assert!(sent[0].1.contains(&ticket.ticket_uid));
}

#[test]
fn failed_notification_does_not_undo_the_assignment() {
    let t = test_engine();
    let ticket = create(&t, pole_ticket("P1"));
    t.notifier.fail_deliveries(true);

    t.assign(&ctx(), ticket.id, actor("tech-1"), None).unwrap();
    assert_eq!(t.notifier.count(), 0);
    assert_eq!(
        t.tickets().get_ticket(ticket.id).unwrap().assigned_to,
        Some(actor("tech-1"))
    );
}

#[test]
fn billing_approval_round_trip() {
    let t = test_engine();
    let ticket = create(
        &t,
        pole_ticket("P1").with_billing_approval(BillingType::Billable),
    );
    t.transition_status(&ctx(), ticket.id, TicketStatus::Assigned, None)
        .unwrap();

    let err = t
        .transition_status(&ctx(), ticket.id, TicketStatus::PendingApproval, None)
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition { .. }));

    let bad_cost = BillingCost {
        amount_cents: 1000,
        currency: "rands".into(),
        note: None,
    };
    assert!(matches!(
        t.tickets().attach_billing_cost(&ctx(), ticket.id, bad_cost),
        Err(EngineError::Validation(_))
    ));

    let cost = BillingCost {
        amount_cents: 125_050,
        currency: "ZAR".into(),
        note: Some("replacement drop cable".into()),
    };
    t.tickets().attach_billing_cost(&ctx(), ticket.id, cost).unwrap();
    let pending = t
        .transition_status(&ctx(), ticket.id, TicketStatus::PendingApproval, None)
        .unwrap();
    assert_eq!(pending.resume_status, Some(TicketStatus::Assigned));

    assert!(matches!(
        t.tickets().reject_billing(&ctx(), ticket.id, "  "),
        Err(EngineError::Validation(_))
    ));

    let approved = t
        .tickets()
        .approve_billing(&ctx_as("finance"), ticket.id, None)
        .unwrap();
    assert_eq!(approved.status, TicketStatus::Assigned);
    assert_eq!(approved.resume_status, None);

    assert!(matches!(
        t.tickets().approve_billing(&ctx(), ticket.id, None),
        Err(EngineError::InvalidTransition { .. })
    ));
}

#[test]
fn rejected_billing_cancels_the_ticket() {
    let t = test_engine();
    let ticket = create(
        &t,
        pole_ticket("P1").with_billing_approval(BillingType::Billable),
    );
    t.tickets()
        .attach_billing_cost(
            &ctx(),
            ticket.id,
            BillingCost {
                amount_cents: 900,
                currency: "ZAR".into(),
                note: None,
            },
        )
        .unwrap();
    t.transition_status(&ctx(), ticket.id, TicketStatus::Assigned, None)
        .unwrap();
    t.transition_status(&ctx(), ticket.id, TicketStatus::PendingApproval, None)
        .unwrap();

    let rejected = t
        .tickets()
        .reject_billing(&ctx_as("finance"), ticket.id, "covered by guarantee")
        .unwrap();
    assert_eq!(rejected.status, TicketStatus::Cancelled);

    let history = t.tickets().ticket_history(ticket.id).unwrap();
    assert_eq!(
        history.last().unwrap().record.change_reason.as_deref(),
        Some("covered by guarantee")
    );
    assert!(matches!(
        t.tickets().attach_billing_cost(
            &ctx(),
            ticket.id,
            BillingCost {
                amount_cents: 1,
                currency: "ZAR".into(),
                note: None,
            },
        ),
        Err(EngineError::Validation(_))
    ));
}

#[test]
fn expired_deadline_commits_nothing() {
    let t = test_engine();
    let ticket = create(&t, pole_ticket("P1"));

    let late = ctx().with_deadline(Instant::now());
    let err = t
        .transition_status(&late, ticket.id, TicketStatus::Triaged, None)
        .unwrap_err();
    assert!(matches!(err, EngineError::DeadlineExceeded(_)));
    assert!(err.is_retryable());

    assert_eq!(t.tickets().get_ticket(ticket.id).unwrap().status, TicketStatus::New);
    assert_eq!(t.tickets().ticket_history(ticket.id).unwrap().len(), 1);
}

#[test]
fn missing_ticket_is_not_found() {
    let t = test_engine();
    let err = t
        .transition_status(&ctx(), tq_core::TicketId::new(), TicketStatus::Triaged, None)
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound { entity: "ticket", .. }));
}

#[test]
fn list_filters_by_status_and_scope() {
    let t = test_engine();
    let a = create(&t, pole_ticket("P1"));
    t.clock.advance(Duration::minutes(1));
    let b = create(&t, pole_ticket("P2"));
    t.transition_status(&ctx(), b.id, TicketStatus::Triaged, None)
        .unwrap();

    let all = t.tickets().list_tickets(&TicketFilter::default()).unwrap();
    assert_eq!(all.iter().map(|x| x.id).collect::<Vec<_>>(), vec![b.id, a.id]);

    let triaged = t
        .tickets()
        .list_tickets(&TicketFilter {
            status: Some(TicketStatus::Triaged),
            ..TicketFilter::default()
        })
        .unwrap();
    assert_eq!(triaged.len(), 1);
    assert_eq!(triaged[0].id, b.id);

    let on_p1 = t
        .tickets()
        .list_tickets(&TicketFilter {
            scope: Some(tq_core::Scope::new(tq_core::ScopeType::Pole, "P1")),
            ..TicketFilter::default()
        })
        .unwrap();
    assert_eq!(on_p1.len(), 1);
    assert_eq!(on_p1[0].id, a.id);
}

#[test]
fn history_chain_stays_valid_across_operations() {
    let t = test_engine();
    let ticket = create(&t, pole_ticket("P1"));
    t.assign(&ctx(), ticket.id, actor("tech"), None).unwrap();
    t.transition_status(&ctx(), ticket.id, TicketStatus::Assigned, None)
        .unwrap();
    t.transition_status(&ctx(), ticket.id, TicketStatus::InProgress, None)
        .unwrap();

    let report = t.verify_history().unwrap();
    assert!(report.valid);
    assert_eq!(report.entries_checked, 4);
    assert_eq!(report.first_broken_seq, None);
}

const STATUSES: &[TicketStatus] = &[
    TicketStatus::New,
    TicketStatus::Triaged,
    TicketStatus::Assigned,
    TicketStatus::InProgress,
    TicketStatus::Blocked,
    TicketStatus::Resolved,
    TicketStatus::Closed,
    TicketStatus::Cancelled,
];

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Whatever sequence is requested, stored tickets keep their invariants
    /// and every accepted change lands in a valid history chain.
    #[test]
    fn random_requests_preserve_stored_invariants(
        picks in prop::collection::vec(0..STATUSES.len(), 1..24),
        minutes in prop::collection::vec(0i64..120, 24),
    ) {
        let t = test_engine();
        let ticket = create(&t, pole_ticket("P9"));
        let mut accepted = 0u64;

        for (i, pick) in picks.into_iter().enumerate() {
            t.clock.advance(Duration::minutes(minutes[i]));
            let to = STATUSES[pick];
            let before = t.tickets().get_ticket(ticket.id).unwrap();
            match t.transition_status(&ctx(), ticket.id, to, None) {
                Ok(after) => {
                    accepted += 1;
                    prop_assert_eq!(after.status, to);
                    prop_assert!(after.sla_paused_minutes >= before.sla_paused_minutes);
                }
                Err(EngineError::NoOpTransition(s)) => prop_assert_eq!(s, before.status),
                Err(EngineError::InvalidTransition { .. }) => {
                    prop_assert_eq!(t.tickets().get_ticket(ticket.id).unwrap(), before);
                }
                Err(e) => prop_assert!(false, "unexpected error {}", e),
            }
            let stored = t.tickets().get_ticket(ticket.id).unwrap();
            prop_assert!(stored.check_invariants().is_ok());
            prop_assert_eq!(
                stored.status == TicketStatus::Blocked,
                stored.sla_paused_at.is_some()
            );
        }

        let report = t.verify_history().unwrap();
        prop_assert!(report.valid);
        prop_assert_eq!(report.entries_checked, accepted + 1);
    }
}
