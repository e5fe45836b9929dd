use chrono::{Duration, TimeZone, Utc};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::thread;
use tq_core::history::HistoryRecord;
use tq_core::{
    ActorId, Escalation, EscalationFilter, EscalationStatus, HandoverSnapshot, HandoverType,
    HistoryAction, NewTicket, Scope, ScopeFields, ScopeThreshold, ScopeType, Ticket, TicketFilter,
    TicketId, TicketSource, TicketStatus, TicketType, Timestamp, VerificationStep,
};
use tq_store::{escalations, history, snapshots, tickets, verification};
use tq_store::{Store, StoreError, StoreOptions};

fn at(minutes: i64) -> Timestamp {
    Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap() + Duration::minutes(minutes)
}

fn ticket(pole: &str, created: Timestamp) -> Ticket {
    let id = TicketId::new();
    Ticket::from_new(
        id,
        format!("FT{:06}", id.0.as_u128() % 1_000_000),
        NewTicket::new(
            "Fibre break",
            TicketType::Maintenance,
            TicketSource::Manual,
            ScopeFields {
                pole_number: Some(pole.into()),
                zone_id: Some("Z1".into()),
                ..Default::default()
            },
        ),
        ActorId::from("ops"),
        created,
    )
}

fn insert_with_steps(store: &Store, t: &Ticket) {
    store
        .write(None, |tx| -> Result<(), StoreError> {
            tickets::insert(tx, t)?;
            verification::insert_all(tx, &VerificationStep::materialize(t.id))?;
            Ok(())
        })
        .unwrap();
}

#[test]
fn ticket_round_trips_through_storage() {
    let store = Store::in_memory().unwrap();
    let mut t = ticket("P1", at(0));
    t.sla_due_at = Some(at(600));
    insert_with_steps(&store, &t);

    let loaded = store.read(|c| tickets::get(c, t.id)).unwrap().unwrap();
    assert_eq!(loaded, t);
    let by_uid = store.read(|c| tickets::get_by_uid(c, &t.ticket_uid)).unwrap();
    assert_eq!(by_uid.map(|x| x.id), Some(t.id));

    let steps = store.read(|c| verification::list(c, t.id)).unwrap();
    assert_eq!(steps.len(), 12);
    assert!(steps.windows(2).all(|w| w[0].step_number < w[1].step_number));
}

#[test]
fn blocked_without_pause_stamp_is_rejected_by_schema() {
    let store = Store::in_memory().unwrap();
    let mut t = ticket("P1", at(0));
    insert_with_steps(&store, &t);

    t.status = TicketStatus::Blocked;
    let res = store.write(None, |tx| tickets::update(tx, &t));
    assert!(matches!(res, Err(StoreError::Constraint(_))));
}

#[test]
fn window_query_is_inclusive_and_ordered() {
    let store = Store::in_memory().unwrap();
    let a = ticket("P100", at(0));
    let b = ticket("P100", at(10));
    let c = ticket("P100", at(20));
    let other = ticket("P200", at(5));
    for t in [&c, &a, &other, &b] {
        insert_with_steps(&store, t);
    }
    let found = store
        .read(|conn| tickets::in_window(conn, ScopeType::Pole, "P100", at(0), at(10)))
        .unwrap();
    let ids: Vec<TicketId> = found.into_iter().map(|(id, _)| id).collect();
    assert_eq!(ids, vec![a.id, b.id]);

    let listed = store
        .read(|conn| {
            tickets::list(
                conn,
                &TicketFilter {
                    scope: Some(Scope::new(ScopeType::Zone, "Z1")),
                    limit: Some(2),
                    ..Default::default()
                },
            )
        })
        .unwrap();
    assert_eq!(listed.iter().map(|t| t.id).collect::<Vec<_>>(), vec![c.id, b.id]);
}

#[test]
fn snapshots_cannot_be_changed_or_removed() {
    let store = Store::in_memory().unwrap();
    let t = ticket("P1", at(0));
    insert_with_steps(&store, &t);
    let steps = store.read(|c| verification::list(c, t.id)).unwrap();
    let snap = HandoverSnapshot::new(&t, &steps, HandoverType::BuildToQa, ActorId::from("lead"), at(1)).unwrap();
    store.write(None, |tx| snapshots::insert(tx, &snap)).unwrap();

    let upd = store.write(None, |tx| {
        tx.execute("UPDATE handover_snapshots SET handover_by = 'x'", [])
            .map_err(StoreError::from)
    });
    assert!(matches!(upd, Err(StoreError::Constraint(_))));
    let del = store.write(None, |tx| {
        tx.execute("DELETE FROM handover_snapshots", []).map_err(StoreError::from)
    });
    assert!(matches!(del, Err(StoreError::Constraint(_))));

    let loaded = store.read(|c| snapshots::get(c, snap.id)).unwrap().unwrap();
    assert_eq!(loaded, snap);
    assert!(loaded.verify_digest());
}

#[test]
fn second_open_escalation_for_scope_is_a_unique_violation() {
    let store = Store::in_memory().unwrap();
    let scope = Scope::new(ScopeType::Pole, "P100");
    let first = Escalation::open(&scope, [TicketId::new()], ScopeThreshold::new(3, 30), at(0));
    let second = Escalation::open(&scope, [TicketId::new()], ScopeThreshold::new(3, 30), at(1));

    store.write(None, |tx| escalations::insert(tx, &first)).unwrap();
    let dup = store.write(None, |tx| escalations::insert(tx, &second));
    assert!(matches!(dup, Err(StoreError::UniqueViolation(_))));

    // Once resolved, a new one may open
    let mut resolved = first.clone();
    resolved
        .resolve(EscalationStatus::Resolved, "pole replaced", ActorId::from("sup"), at(2))
        .unwrap();
    store.write(None, |tx| escalations::update(tx, &resolved)).unwrap();
    store.write(None, |tx| escalations::insert(tx, &second)).unwrap();

    let open = store.read(|c| escalations::find_open(c, &scope)).unwrap().unwrap();
    assert_eq!(open.id, second.id);
    let all = store
        .read(|c| escalations::list(c, &EscalationFilter::default()))
        .unwrap();
    assert_eq!(all.len(), 2);
}

#[test]
fn history_rejects_edits_and_verifies() {
    let store = Store::in_memory().unwrap();
    let id = TicketId::new();
    for i in 0..3 {
        store
            .write(None, |tx| {
                history::append(
                    tx,
                    HistoryRecord::ticket(id, HistoryAction::FieldUpdate, ActorId::from("a"), at(i)),
                )
            })
            .unwrap();
    }
    let report = store.read(|c| history::verify(c)).unwrap();
    assert!(report.valid);
    assert_eq!(report.entries_checked, 3);

    let upd = store.write(None, |tx| {
        tx.execute("UPDATE history SET changed_by = 'mallory' WHERE seq = 2", [])
            .map_err(StoreError::from)
    });
    assert!(matches!(upd, Err(StoreError::Constraint(_))));
}

#[test]
fn simultaneous_opens_of_a_fresh_file_all_succeed() {
    let dir = tempfile::tempdir().unwrap();
    let path = Arc::new(dir.path().join("fresh.db"));
    let barrier = Arc::new(std::sync::Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let path = Arc::clone(&path);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                Store::open(path.as_path(), StoreOptions::default())
            })
        })
        .collect();
    for h in handles {
        let store = h.join().unwrap().unwrap();
        assert_eq!(store.schema_version().unwrap(), tq_store::schema::SCHEMA_VERSION);
    }
}

#[test]
fn photo_evidence_is_persisted() {
    let store = Store::in_memory().unwrap();
    let t = ticket("P9", at(0));
    insert_with_steps(&store, &t);

    let mut step = store
        .read(|c| verification::get(c, t.id, 3))
        .unwrap()
        .unwrap();
    step.photo_url = Some("https://photos.example/splice.jpg".into());
    step.photo_verified = true;
    store
        .write(None, |tx| verification::update(tx, &step))
        .unwrap();

    let stored = store.read(|c| verification::list(c, t.id)).unwrap();
    assert_eq!(stored[2], step);
    assert_eq!(stored[3].photo_url, None);
    assert!(!stored[3].photo_verified);
}

#[test]
fn verified_photo_without_url_is_rejected_by_schema() {
    let store = Store::in_memory().unwrap();
    let t = ticket("P9", at(0));
    insert_with_steps(&store, &t);

    let mut step = store
        .read(|c| verification::get(c, t.id, 1))
        .unwrap()
        .unwrap();
    step.photo_verified = true;
    assert!(store
        .write(None, |tx| verification::update(tx, &step))
        .is_err());
}

#[test]
fn concurrent_writers_on_one_file_keep_the_chain_intact() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tq.db");
    let options = StoreOptions::default();
    let stores: Vec<Arc<Store>> = (0..4)
        .map(|_| Arc::new(Store::open(&path, options).unwrap()))
        .collect();

    let handles: Vec<_> = stores
        .iter()
        .cloned()
        .enumerate()
        .map(|(n, store)| {
            thread::spawn(move || {
                let id = TicketId::new();
                for i in 0..25 {
                    store
                        .write(None, |tx| {
                            history::append(
                                tx,
                                HistoryRecord::ticket(
                                    id,
                                    HistoryAction::FieldUpdate,
                                    ActorId::new(format!("writer-{n}")),
                                    at(i),
                                ),
                            )
                        })
                        .unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let report = stores[0].read(|c| history::verify(c)).unwrap();
    assert!(report.valid, "{report:?}");
    assert_eq!(report.entries_checked, 100);
}
