//! TQ Store - SQLite persistence for the ticket quality engine
//!
//! - [`Store`] owns the connection and defines transaction boundaries
//! - One module per table with free functions over `&Connection`, so the
//!   same code runs inside a read or a write unit of work
//!
//! Schema-level guarantees:
//! - history and handover snapshots reject UPDATE and DELETE
//! - at most one open escalation per scope (partial unique index)
//! - `sla_paused_at` set iff blocked, `resume_status` set iff parked

#![warn(unreachable_pub)]

mod codec;
pub mod error;
pub mod escalations;
pub mod history;
pub mod locks;
pub mod schema;
pub mod snapshots;
pub mod store;
pub mod tickets;
pub mod verification;

pub use error::{StoreError, StoreResult};
pub use locks::EditLock;
pub use store::{Store, StoreOptions, DEFAULT_BUSY_TIMEOUT};

/// Re-exported so callers can name the transaction type
pub use rusqlite::{Connection, Transaction};
