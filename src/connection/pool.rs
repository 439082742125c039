//! Fixed-capacity pool of reusable connection handles.
//!
//! All slots are allocated up front. [`acquire`](ConnectionPool::acquire)
//! scans them in order and claims the first free one; when none is free it
//! fails at once with [`PoolExhausted`] instead of waiting or growing. The
//! scan is O(capacity), which is fine for tens to low hundreds of slots.
//!
//! The slot array is guarded by a `parking_lot` mutex that is never held
//! across an `.await`. Claiming flips each handle's atomic in-use flag, so a
//! free slot is found even while something else holds its locks; the
//! transport is bound after the pool lock is dropped.

use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

use super::ConnectionHandle;
use crate::error::{Result, RpcError};
use crate::transport::Transport;

/// Every slot is in use.
///
/// Carries the rejected transport so the caller can close it cleanly.
#[derive(Error)]
#[error("connection pool exhausted: all {capacity} slots in use")]
pub struct PoolExhausted {
    capacity: usize,
    transport: Transport,
}

impl PoolExhausted {
    /// Capacity of the pool that refused the connection.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Take back the transport that could not be placed.
    pub fn into_transport(self) -> Transport {
        self.transport
    }
}

impl std::fmt::Debug for PoolExhausted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolExhausted")
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

/// Pool of connection handle slots.
pub struct ConnectionPool {
    slots: Mutex<Vec<Option<Arc<ConnectionHandle>>>>,
}

impl ConnectionPool {
    /// Create a pool with `capacity` free, unbound slots.
    pub fn new(capacity: usize) -> Self {
        let slots = (0..capacity)
            .map(|_| Some(Arc::new(ConnectionHandle::empty())))
            .collect();
        Self {
            slots: Mutex::new(slots),
        }
    }

    /// Number of slots, occupied or empty.
    pub fn capacity(&self) -> usize {
        self.slots.lock().len()
    }

    /// Bind `transport` to the first free slot.
    pub async fn acquire(
        &self,
        transport: Transport,
    ) -> std::result::Result<Arc<ConnectionHandle>, PoolExhausted> {
        let (claimed, capacity) = {
            let slots = self.slots.lock();
            let claimed = slots.iter().flatten().find(|h| h.try_claim()).cloned();
            (claimed, slots.len())
        };

        match claimed {
            Some(handle) => {
                handle.rebind(transport).await;
                tracing::trace!(connection = handle.id(), "acquired pool slot");
                Ok(handle)
            }
            None => Err(PoolExhausted {
                capacity,
                transport,
            }),
        }
    }

    /// Return `handle` to the pool.
    ///
    /// Closes its transport and marks it free. A handle the pool does not
    /// own is left untouched.
    pub async fn release(&self, handle: &Arc<ConnectionHandle>) {
        if !self.owns(handle) {
            tracing::debug!(connection = handle.id(), "release of foreign handle ignored");
            return;
        }
        handle.unbind().await;
        tracing::trace!(connection = handle.id(), "released pool slot");
    }

    /// Place `handle` in the first empty slot.
    pub fn add(&self, handle: Arc<ConnectionHandle>) -> Result<()> {
        let mut slots = self.slots.lock();
        match slots.iter_mut().find(|slot| slot.is_none()) {
            Some(slot) => {
                *slot = Some(handle);
                Ok(())
            }
            None => Err(RpcError::PoolFull),
        }
    }

    /// Empty the slot holding `handle`, if any. Returns whether it was found.
    pub fn remove(&self, handle: &Arc<ConnectionHandle>) -> bool {
        let mut slots = self.slots.lock();
        for slot in slots.iter_mut() {
            if slot.as_ref().is_some_and(|h| Arc::ptr_eq(h, handle)) {
                *slot = None;
                return true;
            }
        }
        false
    }

    /// Whether `handle` occupies one of the slots.
    pub fn owns(&self, handle: &Arc<ConnectionHandle>) -> bool {
        self.slots
            .lock()
            .iter()
            .flatten()
            .any(|h| Arc::ptr_eq(h, handle))
    }

    /// Number of slots currently marked in use.
    pub async fn in_use(&self) -> usize {
        let handles: Vec<Arc<ConnectionHandle>> =
            self.slots.lock().iter().flatten().cloned().collect();

        let mut count = 0;
        for handle in handles {
            if !handle.is_available().await {
                count += 1;
            }
        }
        count
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("capacity", &self.capacity())
            .finish()
    }
}
