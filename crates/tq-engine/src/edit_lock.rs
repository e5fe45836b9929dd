//! Advisory TTL edit locks
//!
//! A lock tells other editors that someone is working on a ticket. It does
//! not gate any other operation. Expired locks are free to take.

use crate::context::{Clock, RequestContext};
use crate::error::{EngineError, EngineResult};
use crate::tickets::load_ticket;
use chrono::Duration;
use std::sync::Arc;
use tq_core::TicketId;
use tq_store::{locks, EditLock, Store};
use tracing::{debug, info};

/// Edit lock operations
pub struct EditLockService {
    store: Arc<Store>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl EditLockService {
    /// Create the service; `ttl_minutes` is the unrefreshed lifetime
    pub fn new(store: Arc<Store>, clock: Arc<dyn Clock>, ttl_minutes: u32) -> Self {
        Self {
            store,
            clock,
            ttl: Duration::minutes(i64::from(ttl_minutes)),
        }
    }

    /// Take the lock, or extend it if the caller already holds it
    pub fn acquire(&self, ctx: &RequestContext, ticket_id: TicketId) -> EngineResult<EditLock> {
        let now = self.clock.now();
        let lock = self.store.write(ctx.deadline, |tx| -> EngineResult<_> {
            load_ticket(tx, ticket_id)?;
            let acquired_at = match locks::get(tx, ticket_id)? {
                Some(existing) if !existing.is_expired(now) && existing.holder != ctx.actor => {
                    return Err(EngineError::LockHeld {
                        ticket_id,
                        holder: existing.holder,
                        expires_at: existing.expires_at,
                    });
                }
                Some(existing) if !existing.is_expired(now) => existing.acquired_at,
                _ => now,
            };
            let lock = EditLock {
                ticket_id,
                holder: ctx.actor.clone(),
                acquired_at,
                expires_at: now + self.ttl,
            };
            locks::put(tx, &lock)?;
            Ok(lock)
        })?;
        info!(ticket = %ticket_id, holder = %lock.holder, expires_at = %lock.expires_at, "edit lock acquired");
        Ok(lock)
    }

    /// Extend a lock the caller holds
    pub fn refresh(&self, ctx: &RequestContext, ticket_id: TicketId) -> EngineResult<EditLock> {
        let now = self.clock.now();
        self.store.write(ctx.deadline, |tx| -> EngineResult<_> {
            let mut lock = match locks::get(tx, ticket_id)? {
                Some(l) if l.holder == ctx.actor && !l.is_expired(now) => l,
                _ => return Err(EngineError::LockNotHeld(ticket_id)),
            };
            lock.expires_at = now + self.ttl;
            locks::put(tx, &lock)?;
            debug!(ticket = %ticket_id, expires_at = %lock.expires_at, "edit lock refreshed");
            Ok(lock)
        })
    }

    /// Give the lock up
    pub fn release(&self, ctx: &RequestContext, ticket_id: TicketId) -> EngineResult<()> {
        self.store.write(ctx.deadline, |tx| -> EngineResult<_> {
            match locks::get(tx, ticket_id)? {
                Some(l) if l.holder == ctx.actor => {
                    locks::delete(tx, ticket_id)?;
                    Ok(())
                }
                _ => Err(EngineError::LockNotHeld(ticket_id)),
            }
        })?;
        info!(ticket = %ticket_id, holder = %ctx.actor, "edit lock released");
        Ok(())
    }

    /// Unexpired lock on a ticket, if any
    pub fn current(&self, ticket_id: TicketId) -> EngineResult<Option<EditLock>> {
        let now = self.clock.now();
        let lock = self
            .store
            .read(|conn| -> EngineResult<_> { Ok(locks::get(conn, ticket_id)?) })?;
        Ok(lock.filter(|l| !l.is_expired(now)))
    }
}
