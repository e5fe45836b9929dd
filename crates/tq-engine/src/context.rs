//! Per-request context and time source

use chrono::Utc;
use std::time::{Duration, Instant};
use tq_core::types::truncate_micros;
use tq_core::{ActorId, Timestamp};

/// Source of "now" for every rule that depends on time
pub trait Clock: Send + Sync {
    /// Current instant, microsecond precision
    fn now(&self) -> Timestamp;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        truncate_micros(Utc::now())
    }
}

/// Who is acting, and how long they are willing to wait
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Acting actor; stamped on history and defaults
    pub actor: ActorId,
    /// Work not committed by this instant is rolled back
    pub deadline: Option<Instant>,
    timeout: Option<Duration>,
}

impl RequestContext {
    /// Context without a deadline
    pub fn new(actor: impl Into<String>) -> Self {
        Self {
            actor: ActorId::new(actor),
            deadline: None,
            timeout: None,
        }
    }

    /// With absolute deadline
    #[inline]
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self.timeout = None;
        self
    }

    /// With deadline relative to now
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self.timeout = Some(timeout);
        self
    }

    /// Same actor, with a relative timeout restarted from now.
    ///
    /// Absolute deadlines are kept as they are.
    #[must_use]
    pub fn renewed(&self) -> Self {
        match self.timeout {
            Some(timeout) => self.clone().with_timeout(timeout),
            None => self.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renewing_restarts_a_relative_timeout() {
        let ctx = RequestContext::new("scanner").with_timeout(Duration::from_millis(50));
        let first = ctx.deadline.unwrap();
        std::thread::sleep(Duration::from_millis(60));
        assert!(Instant::now() > first);

        let next = ctx.renewed();
        assert_eq!(next.actor, ctx.actor);
        assert!(next.deadline.unwrap() > Instant::now());
        assert!(next.renewed().deadline.unwrap() >= next.deadline.unwrap());
    }

    #[test]
    fn renewing_keeps_an_absolute_deadline() {
        let at = Instant::now() + Duration::from_secs(5);
        let ctx = RequestContext::new("scanner").with_deadline(at);
        assert_eq!(ctx.renewed().deadline, Some(at));
        assert_eq!(RequestContext::new("scanner").renewed().deadline, None);
    }
}
