//! Testing utilities for TQ workspace
//!
//! Shared fixtures: a controllable clock, a notifier that records what it
//! was asked to send, and an in-memory engine wired to both.

#![allow(missing_docs)]

use chrono::{Duration, TimeZone, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use tq_core::types::truncate_micros;
use tq_core::{
    ActorId, NewTicket, Recipient, ScopeFields, StepUpdate, Ticket, TicketSource, TicketType,
    Timestamp, TOTAL_STEPS,
};
use tq_engine::{
    Clock, Engine, EngineConfig, Notifier, NotifyError, RequestContext, VerificationTracker,
};
use tq_store::Store;

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Timestamp>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Mutex::new(truncate_micros(start)),
        }
    }

    /// 2024-06-01T08:00:00Z
    pub fn fixed() -> Self {
        Self::new(Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap())
    }

    pub fn current(&self) -> Timestamp {
        *self.now.lock()
    }

    pub fn now_plus(&self, by: Duration) -> Timestamp {
        self.current() + by
    }

    pub fn set(&self, to: Timestamp) {
        *self.now.lock() = truncate_micros(to);
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now = truncate_micros(*now + by);
    }

    pub fn advance_days(&self, days: i64) {
        self.advance(Duration::days(days));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.current()
    }
}

/// Keeps every delivered message; can be told to fail
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(Recipient, String)>>,
    fail: Mutex<bool>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_deliveries(&self, fail: bool) {
        *self.fail.lock() = fail;
    }

    pub fn sent(&self) -> Vec<(Recipient, String)> {
        self.sent.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, recipient: &Recipient, message: &str) -> Result<(), NotifyError> {
        if *self.fail.lock() {
            return Err(NotifyError {
                recipient: recipient.to_string(),
                reason: "delivery disabled".into(),
            });
        }
        self.sent.lock().push((recipient.clone(), message.to_string()));
        Ok(())
    }
}

/// In-memory engine with its clock and notifier exposed
pub struct TestEngine {
    pub engine: Engine,
    pub clock: Arc<ManualClock>,
    pub notifier: Arc<RecordingNotifier>,
}

impl std::ops::Deref for TestEngine {
    type Target = Engine;

    fn deref(&self) -> &Engine {
        &self.engine
    }
}

pub fn test_engine() -> TestEngine {
    test_engine_with(EngineConfig::default())
}

pub fn test_engine_with(config: EngineConfig) -> TestEngine {
    let store = Arc::new(Store::in_memory().unwrap());
    engine_over(store, config)
}

/// Engine over an existing store, e.g. a file shared by several engines
pub fn engine_over(store: Arc<Store>, config: EngineConfig) -> TestEngine {
    let clock = Arc::new(ManualClock::fixed());
    let notifier = Arc::new(RecordingNotifier::new());
    let engine = Engine::new(store, config, clock.clone(), notifier.clone()).unwrap();
    TestEngine {
        engine,
        clock,
        notifier,
    }
}

pub fn ctx() -> RequestContext {
    RequestContext::new("tester")
}

pub fn ctx_as(actor: &str) -> RequestContext {
    RequestContext::new(actor)
}

pub fn actor(name: &str) -> ActorId {
    ActorId::new(name)
}

pub fn pole_ticket(pole: &str) -> NewTicket {
    NewTicket::new(
        format!("Fault on pole {pole}"),
        TicketType::Maintenance,
        TicketSource::Manual,
        ScopeFields {
            pole_number: Some(pole.to_string()),
            ..ScopeFields::default()
        },
    )
}

/// Every scope field populated, so advisory as-built checks pass
pub fn full_scope_ticket(pole: &str) -> NewTicket {
    NewTicket::new(
        format!("Install at pole {pole}"),
        TicketType::NewInstallation,
        TicketSource::Manual,
        ScopeFields {
            pole_number: Some(pole.to_string()),
            pon: Some("PON-7".into()),
            zone_id: Some("Z3".into()),
            dr_number: Some("DR-1001".into()),
        },
    )
}

pub fn create(t: &TestEngine, new: NewTicket) -> Ticket {
    t.tickets().create_ticket(&ctx(), new).unwrap()
}

/// Complete steps `1..=n`
pub fn complete_steps(t: &TestEngine, ticket: &Ticket, n: u32) {
    assert!(n <= TOTAL_STEPS);
    for step in 1..=n {
        t.update_verification_step(&ctx(), ticket.id, step, StepUpdate::complete())
            .unwrap();
    }
}
