use chrono::Duration;
use pretty_assertions::assert_eq;
use tq_core::{
    EscalationFilter, EscalationStatus, HistoryAction, Recipient, Scope, ScopeFields,
    ScopeThreshold, ScopeType, TicketSource, TicketType,
};
use tq_engine::{EngineConfig, EngineError, EscalationDetector};
use tq_test_utils::{create, ctx, pole_ticket, test_engine, test_engine_with, TestEngine};

fn pole(value: &str) -> Scope {
    Scope::new(ScopeType::Pole, value)
}

/// Tickets on one pole, an hour apart
fn seed(t: &TestEngine, value: &str, n: usize) -> Vec<tq_core::TicketId> {
    (0..n)
        .map(|_| {
            let id = create(t, pole_ticket(value)).id;
            t.clock.advance(Duration::hours(1));
            id
        })
        .collect()
}

#[test]
fn third_ticket_on_p100_opens_an_escalation() {
    let t = test_engine();
    let prior = seed(&t, "P100", 2);

    let below = t.detect_fault_pattern(&ctx(), &pole("P100"), Some(3), Some(30)).unwrap();
    assert!(!below.pattern_detected);
    assert!(below.escalation.is_none());
    assert!(below.recommendation.starts_with("Monitor"));

    let third = create(&t, pole_ticket("P100")).id;
    let detection = t
        .detect_fault_pattern(&ctx(), &pole("P100"), Some(3), Some(30))
        .unwrap();

    assert!(detection.pattern_detected);
    assert!(detection.created);
    assert_eq!(detection.fault_count, 3);
    assert_eq!(detection.contributing_ticket_ids, vec![prior[0], prior[1], third]);

    let escalation = detection.escalation.unwrap();
    assert_eq!(escalation.status, EscalationStatus::Open);
    assert_eq!(escalation.threshold_used, 3);
    assert_eq!(escalation.time_window_days, 30);
    assert_eq!(
        escalation.contributing_ticket_ids.iter().copied().collect::<Vec<_>>(),
        vec![prior[0], prior[1], third]
    );
    assert!(detection.recommendation.contains("pole P100"));
}

#[test]
fn repeated_detection_keeps_one_open_escalation() {
    let t = test_engine();
    seed(&t, "P7", 4);

    let first = t.detect_fault_pattern(&ctx(), &pole("P7"), None, None).unwrap();
    let second = t.detect_fault_pattern(&ctx(), &pole("P7"), None, None).unwrap();

    assert!(first.created);
    assert!(!second.created);
    assert_eq!(
        first.escalation.as_ref().map(|e| e.id),
        second.escalation.as_ref().map(|e| e.id)
    );
    assert!(second.recommendation.contains("already exists"));

    let open = t
        .escalation()
        .list(&EscalationFilter {
            status: Some(EscalationStatus::Open),
            ..EscalationFilter::default()
        })
        .unwrap();
    assert_eq!(open.len(), 1);
}

#[test]
fn tickets_outside_the_window_do_not_count() {
    let t = test_engine();
    seed(&t, "P5", 2);
    t.clock.advance_days(31);
    create(&t, pole_ticket("P5"));

    let detection = t.detect_fault_pattern(&ctx(), &pole("P5"), None, None).unwrap();
    assert_eq!(detection.fault_count, 1);
    assert!(!detection.pattern_detected);
}

#[test]
fn configured_defaults_apply_per_scope() {
    let config = EngineConfig::default().with_threshold(ScopeType::Dr, ScopeThreshold::new(4, 7));
    let t = test_engine_with(config);
    for _ in 0..3 {
        t.tickets()
            .create_ticket(
                &ctx(),
                tq_core::NewTicket::new(
                    "No light at premises",
                    TicketType::Incident,
                    TicketSource::CallCenterImport,
                    ScopeFields {
                        dr_number: Some("DR-88".into()),
                        ..ScopeFields::default()
                    },
                ),
            )
            .unwrap();
    }
    let scope = Scope::new(ScopeType::Dr, "DR-88");
    let detection = t.detect_fault_pattern(&ctx(), &scope, None, None).unwrap();
    assert_eq!(detection.threshold, 4);
    assert_eq!(detection.time_window_days, 7);
    assert!(!detection.pattern_detected);

    let explicit = t.detect_fault_pattern(&ctx(), &scope, Some(3), None).unwrap();
    assert!(explicit.pattern_detected);
    assert_eq!(explicit.escalation.unwrap().threshold_used, 3);
}

#[test]
fn detection_input_is_validated() {
    let t = test_engine();
    assert!(matches!(
        t.detect_fault_pattern(&ctx(), &pole("  "), None, None),
        Err(EngineError::Validation(_))
    ));
    assert!(matches!(
        t.detect_fault_pattern(&ctx(), &pole("P1"), Some(0), None),
        Err(EngineError::Validation(_))
    ));
    assert!(matches!(
        t.detect_fault_pattern(&ctx(), &pole("P1"), None, Some(0)),
        Err(EngineError::Validation(_))
    ));
}

#[test]
fn new_escalation_notifies_operations_after_commit() {
    let t = test_engine();
    seed(&t, "P3", 3);
    t.notifier.clear();

    let detection = t.detect_fault_pattern(&ctx(), &pole("P3"), None, None).unwrap();
    let sent = t.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, Recipient::Channel("operations".into()));
    assert!(sent[0].1.contains("P3"));
    assert!(sent[0].1.contains(&detection.escalation.unwrap().id.to_string()));

    t.detect_fault_pattern(&ctx(), &pole("P3"), None, None).unwrap();
    assert_eq!(t.notifier.count(), 1);
}

#[test]
fn notifier_failure_keeps_the_escalation() {
    let t = test_engine();
    seed(&t, "P4", 3);
    t.notifier.fail_deliveries(true);

    let detection = t.detect_fault_pattern(&ctx(), &pole("P4"), None, None).unwrap();
    let id = detection.escalation.unwrap().id;
    assert_eq!(t.escalation().get(id).unwrap().status, EscalationStatus::Open);
}

#[test]
fn resolution_rules() {
    let t = test_engine();
    seed(&t, "P8", 3);
    let id = t
        .detect_fault_pattern(&ctx(), &pole("P8"), None, None)
        .unwrap()
        .escalation
        .unwrap()
        .id;

    assert!(matches!(
        t.resolve_escalation(&ctx(), id, EscalationStatus::Resolved, "   "),
        Err(EngineError::Validation(_))
    ));
    assert!(matches!(
        t.resolve_escalation(&ctx(), id, EscalationStatus::Open, "still looking"),
        Err(EngineError::Validation(_))
    ));

    let resolved = t
        .resolve_escalation(&ctx(), id, EscalationStatus::Resolved, "  pole replaced ")
        .unwrap();
    assert_eq!(resolved.status, EscalationStatus::Resolved);
    assert_eq!(resolved.resolution_notes.as_deref(), Some("pole replaced"));
    assert_eq!(resolved.resolved_at, Some(t.clock.current()));

    assert!(matches!(
        t.resolve_escalation(&ctx(), id, EscalationStatus::NoAction, "again"),
        Err(EngineError::EscalationNotOpen {
            status: EscalationStatus::Resolved,
            ..
        })
    ));

    let history = t.escalation().history(id).unwrap();
    let actions: Vec<HistoryAction> = history.iter().map(|h| h.record.action).collect();
    assert_eq!(
        actions,
        vec![HistoryAction::EscalationOpened, HistoryAction::EscalationResolved]
    );

    // a closed escalation frees the scope for a new one
    let again = t.detect_fault_pattern(&ctx(), &pole("P8"), None, None).unwrap();
    assert!(again.created);
    assert_ne!(again.escalation.unwrap().id, id);
}

#[test]
fn unknown_escalation_is_not_found() {
    let t = test_engine();
    assert!(matches!(
        t.resolve_escalation(
            &ctx(),
            tq_core::EscalationId::new(),
            EscalationStatus::Resolved,
            "done"
        ),
        Err(EngineError::NotFound { entity: "escalation", .. })
    ));
}

#[test]
fn linking_appends_new_tickets_only() {
    let t = test_engine();
    let ids = seed(&t, "P2", 3);
    let escalation = t
        .detect_fault_pattern(&ctx(), &pole("P2"), None, None)
        .unwrap()
        .escalation
        .unwrap();
    let late = create(&t, pole_ticket("P2")).id;

    let linked = t
        .escalation()
        .link_tickets(&ctx(), escalation.id, &[ids[0], late, late])
        .unwrap();
    assert_eq!(
        linked.contributing_ticket_ids.iter().copied().collect::<Vec<_>>(),
        vec![ids[0], ids[1], ids[2], late]
    );

    t.resolve_escalation(&ctx(), escalation.id, EscalationStatus::NoAction, "weather")
        .unwrap();
    assert!(matches!(
        t.escalation().link_tickets(&ctx(), escalation.id, &[late]),
        Err(EngineError::EscalationNotOpen { .. })
    ));
}

#[test]
fn ticket_scopes_are_checked_together() {
    let t = test_engine();
    let mut last = None;
    for _ in 0..2 {
        let ticket = t
            .tickets()
            .create_ticket(
                &ctx(),
                tq_core::NewTicket::new(
                    "Intermittent service",
                    TicketType::Maintenance,
                    TicketSource::Monitoring,
                    ScopeFields {
                        pole_number: Some("P60".into()),
                        dr_number: Some("DR-60".into()),
                        ..ScopeFields::default()
                    },
                ),
            )
            .unwrap();
        last = Some(ticket.id);
    }

    // dr threshold is 2, pole threshold is 3
    let hits = t.escalation().check_ticket_scopes(&ctx(), last.unwrap()).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].scope, Scope::new(ScopeType::Dr, "DR-60"));
    assert!(hits[0].created);
}

#[test]
fn padded_scope_values_are_stored_trimmed_and_counted() {
    let t = test_engine();
    let ids = seed(&t, "P100 ", 3);
    let stored = t.tickets().get_ticket(ids[0]).unwrap();
    assert_eq!(stored.scope.pole_number.as_deref(), Some("P100"));

    let detection = t
        .detect_fault_pattern(&ctx(), &pole(" P100 "), Some(3), Some(30))
        .unwrap();
    assert_eq!(detection.fault_count, 3);
    assert!(detection.pattern_detected);
    assert_eq!(detection.scope.scope_value, "P100");

    let hits = t.scan(&ctx()).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].fault_count, 3);
}

#[test]
fn scan_covers_every_recent_scope_value() {
    let t = test_engine();
    seed(&t, "P10", 3);
    seed(&t, "P11", 1);
    seed(&t, "P12", 3);

    let hits = t.scan(&ctx()).unwrap();
    let mut hit_values: Vec<&str> = hits.iter().map(|d| d.scope.scope_value.as_str()).collect();
    hit_values.sort_unstable();
    assert_eq!(hit_values, vec!["P10", "P12"]);

    let again = t.scan(&ctx()).unwrap();
    assert!(again.iter().all(|d| !d.created));
    assert_eq!(
        t.escalation().list(&EscalationFilter::default()).unwrap().len(),
        2
    );
}
