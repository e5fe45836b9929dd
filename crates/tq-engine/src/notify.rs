//! Notification delivery seam
//!
//! Messages are sent only after the transaction that caused them has
//! committed. A failed delivery is logged and otherwise ignored.

use tq_core::{Notification, Recipient};
use tracing::{info, warn};

/// Delivery failure reported by a notifier
#[derive(Debug, Clone, thiserror::Error)]
#[error("delivery to {recipient} failed: {reason}")]
pub struct NotifyError {
    /// Addressee
    pub recipient: String,
    /// Transport-specific reason
    pub reason: String,
}

/// Outbound message sink
#[cfg_attr(test, mockall::automock)]
pub trait Notifier: Send + Sync {
    /// Deliver one rendered message
    fn notify(&self, recipient: &Recipient, message: &str) -> Result<(), NotifyError>;
}

/// Writes every message to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, recipient: &Recipient, message: &str) -> Result<(), NotifyError> {
        info!(%recipient, message, "notification");
        Ok(())
    }
}

/// Discards every message
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _recipient: &Recipient, _message: &str) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Send each message, logging failures
pub(crate) fn dispatch(notifier: &dyn Notifier, notifications: &[Notification]) {
    for n in notifications {
        if let Err(e) = notifier.notify(&n.recipient, &n.message()) {
            warn!(kind = %n.kind, error = %e, "notification delivery failed");
        }
    }
}
