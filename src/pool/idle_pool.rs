//
// Copyright 2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Per-destination idle connection pool with time-based eviction.
//!
//! The pool tracks every connection it has admitted by an opaque id, so a
//! return can be validated against concurrent eviction: a connection the
//! sweep already dropped is handed back to the caller to close instead of
//! re-entering the pool.
//!
//! Eviction runs on a background sweep timer. The timer is armed only
//! while more than one connection sits idle; a single idle connection is
//! cheap to keep and is validated against the clocks when taken anyway.
//! Errors hit while closing evictees on the timer path are parked and
//! re-raised from the next pool operation, exactly once.

use crate::connection::ConnectionError;
use crate::pool::{PoolConfig, PoolError};
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// A connection that can live in a pool.
#[async_trait::async_trait]
pub trait PooledConnection: Send + 'static {
    /// Gracefully closes the connection within `timeout`.
    async fn close(&mut self, timeout: Duration) -> Result<(), ConnectionError>;

    /// Tears the connection down immediately.
    fn abort(&mut self);
}

/// A checked-out pool member.
///
/// Carries the identity and creation stamp the pool needs to validate the
/// eventual return. Dropping a handle without returning it leaks the
/// pool's tracking entry for the connection; always hand it back via
/// [`IdleConnectionPool::return_item`] or [`IdleConnectionPool::discard`].
#[derive(Debug)]
pub struct PooledHandle<T> {
    item: T,
    id: u64,
    created_at: Instant,
}

impl<T> PooledHandle<T> {
    /// Returns the pooled connection.
    pub fn item(&self) -> &T {
        &self.item
    }

    /// Returns the pooled connection mutably.
    pub fn item_mut(&mut self) -> &mut T {
        &mut self.item
    }

    /// Consumes the handle, yielding the connection.
    ///
    /// Only for handles the pool has already untracked (a `should_close`
    /// take or a rejected return).
    pub fn into_inner(self) -> T {
        self.item
    }

    /// When this connection was created.
    pub fn created_at(&self) -> Instant {
        self.created_at
    }
}

struct IdleEntry<T> {
    item: T,
    id: u64,
    created_at: Instant,
    last_used_at: Instant,
}

struct PoolInner<T> {
    idle: VecDeque<IdleEntry<T>>,
    tracked: HashSet<u64>,
    next_id: u64,
    pending_error: Option<ConnectionError>,
    timer_armed: bool,
    timer_generation: u64,
    closed: bool,
}

impl<T> PoolInner<T> {
    fn take_pending(&mut self) -> Result<(), PoolError> {
        match self.pending_error.take() {
            Some(source) => Err(PoolError::SweepFailed { source }),
            None => Ok(()),
        }
    }
}

/// Idle pool for one destination.
///
/// Connections are taken warmest-first (LIFO) so the coldest ones age out
/// under the idle clock.
pub struct IdleConnectionPool<T> {
    inner: Arc<Mutex<PoolInner<T>>>,
    config: PoolConfig,
}

impl<T: PooledConnection> IdleConnectionPool<T> {
    /// Creates a pool with the given configuration.
    ///
    /// # Errors
    ///
    /// [`PoolError::InvalidConfiguration`] if the configuration fails
    /// validation.
    pub fn new(config: PoolConfig) -> Result<Self, PoolError> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(Mutex::new(PoolInner {
                idle: VecDeque::new(),
                tracked: HashSet::new(),
                next_id: 0,
                pending_error: None,
                timer_armed: false,
                timer_generation: 0,
                closed: false,
            })),
            config,
        })
    }

    /// Number of connections currently idle.
    pub fn idle_count(&self) -> usize {
        self.inner.lock().idle.len()
    }

    /// Registers a brand-new connection as checked out.
    ///
    /// Used when a caller creates a connection under a pool capacity
    /// permit; the handle returns to the pool via
    /// [`return_item`](Self::return_item) once the caller is done.
    pub fn admit(&self, item: T) -> Result<PooledHandle<T>, PoolError> {
        let mut inner = self.inner.lock();
        inner.take_pending()?;
        if inner.closed {
            return Err(PoolError::Closed);
        }
        let id = inner.next_id;
        inner.next_id += 1;
        inner.tracked.insert(id);
        Ok(PooledHandle {
            item,
            id,
            created_at: Instant::now(),
        })
    }

    /// Inserts a connection directly into the idle set.
    pub fn add(&self, item: T) -> Result<(), PoolError> {
        let mut inner = self.inner.lock();
        inner.take_pending()?;
        if inner.closed {
            return Err(PoolError::Closed);
        }
        let id = inner.next_id;
        inner.next_id += 1;
        inner.tracked.insert(id);
        let now = Instant::now();
        inner.idle.push_back(IdleEntry {
            item,
            id,
            created_at: now,
            last_used_at: now,
        });
        if inner.idle.len() > 1 {
            self.arm_timer(&mut inner);
        }
        Ok(())
    }

    /// Takes the warmest idle connection, if any.
    ///
    /// The boolean is `true` when the connection is already past one of
    /// the eviction clocks: the pool has untracked it and the caller must
    /// close it instead of using it, then take again.
    pub fn take(&self) -> Result<Option<(PooledHandle<T>, bool)>, PoolError> {
        let mut inner = self.inner.lock();
        inner.take_pending()?;
        if inner.closed {
            return Err(PoolError::Closed);
        }
        let Some(entry) = inner.idle.pop_back() else {
            return Ok(None);
        };
        let now = Instant::now();
        let should_close = self
            .config
            .expired(entry.created_at, entry.last_used_at, now);
        if should_close {
            inner.tracked.remove(&entry.id);
            debug!(id = entry.id, "taken connection is past its clock");
        }
        Ok(Some((
            PooledHandle {
                item: entry.item,
                id: entry.id,
                created_at: entry.created_at,
            },
            should_close,
        )))
    }

    /// Returns a checked-out connection to the idle set.
    ///
    /// `Ok(Some(item))` means the pool refused it (closed pool, expired
    /// lease, or a sweep already untracked it); the caller owns the item
    /// again and must close it.
    pub fn return_item(&self, handle: PooledHandle<T>) -> Result<Option<T>, PoolError> {
        let mut inner = self.inner.lock();
        inner.take_pending()?;
        let now = Instant::now();
        if inner.closed
            || !inner.tracked.contains(&handle.id)
            || self.config.lease_expired(handle.created_at, now)
        {
            inner.tracked.remove(&handle.id);
            return Ok(Some(handle.item));
        }
        inner.idle.push_back(IdleEntry {
            item: handle.item,
            id: handle.id,
            created_at: handle.created_at,
            last_used_at: now,
        });
        if inner.idle.len() > 1 {
            self.arm_timer(&mut inner);
        }
        Ok(None)
    }

    /// Forgets a checked-out connection, yielding it to the caller.
    pub fn discard(&self, handle: PooledHandle<T>) -> T {
        self.inner.lock().tracked.remove(&handle.id);
        handle.item
    }

    /// Evicts expired idle connections now, propagating close errors.
    pub async fn prune(&self) -> Result<(), PoolError> {
        match Self::sweep(&self.inner, &self.config, None).await {
            Some(source) => Err(PoolError::SweepFailed { source }),
            None => Ok(()),
        }
    }

    /// Closes every idle connection and marks the pool closed.
    ///
    /// Connections checked out at close time are refused on return; their
    /// holders close them.
    pub async fn close(&self, timeout: Duration) -> Result<(), PoolError> {
        let evictees = {
            let mut inner = self.inner.lock();
            inner.closed = true;
            inner.timer_generation = inner.timer_generation.wrapping_add(1);
            inner.timer_armed = false;
            let drained: Vec<_> = inner.idle.drain(..).collect();
            for entry in &drained {
                inner.tracked.remove(&entry.id);
            }
            drained
        };

        let deadline = Instant::now() + timeout;
        let mut first_error = None;
        for mut entry in evictees {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if let Err(error) = entry.item.close(remaining).await {
                warn!(%error, id = entry.id, "closing pooled connection failed");
                first_error.get_or_insert(error);
            }
        }
        match first_error {
            Some(source) => Err(PoolError::CloseFailed { source }),
            None => Ok(()),
        }
    }

    /// Aborts every idle connection and marks the pool closed.
    pub fn abort(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        inner.timer_generation = inner.timer_generation.wrapping_add(1);
        inner.timer_armed = false;
        for entry in inner.idle.iter_mut() {
            entry.item.abort();
        }
        inner.idle.clear();
        inner.tracked.clear();
    }

    fn arm_timer(&self, inner: &mut PoolInner<T>) {
        Self::arm_timer_locked(&self.inner, inner, &self.config);
    }

    fn arm_timer_locked(
        inner_arc: &Arc<Mutex<PoolInner<T>>>,
        inner: &mut PoolInner<T>,
        config: &PoolConfig,
    ) {
        if inner.timer_armed {
            return;
        }
        let Some(interval) = config.sweep_interval() else {
            return;
        };
        inner.timer_armed = true;
        inner.timer_generation = inner.timer_generation.wrapping_add(1);
        let generation = inner.timer_generation;

        // Weak so an abandoned pool does not keep a timer task alive.
        let weak = Arc::downgrade(inner_arc);
        let config = *config;
        tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            let Some(inner_arc) = weak.upgrade() else {
                return;
            };
            if let Some(error) = Self::sweep(&inner_arc, &config, Some(generation)).await {
                warn!(%error, "sweep failed on the timer path; parking error");
                // Timer stays cancelled until a caller observes the error.
                inner_arc.lock().pending_error = Some(error);
            }
        });
    }

    /// Drains the idle set, re-inserts survivors, closes evictees outside
    /// the lock. Returns the first close error, if any.
    async fn sweep(
        inner_arc: &Arc<Mutex<PoolInner<T>>>,
        config: &PoolConfig,
        timer_generation: Option<u64>,
    ) -> Option<ConnectionError> {
        let evictees = {
            let mut inner = inner_arc.lock();
            if let Some(generation) = timer_generation {
                if inner.timer_generation != generation {
                    return None;
                }
                inner.timer_armed = false;
            }
            if inner.closed {
                return None;
            }
            let now = Instant::now();
            let mut keep = VecDeque::with_capacity(inner.idle.len());
            let mut evict = Vec::new();
            while let Some(entry) = inner.idle.pop_front() {
                if config.expired(entry.created_at, entry.last_used_at, now) {
                    inner.tracked.remove(&entry.id);
                    evict.push(entry);
                } else {
                    keep.push_back(entry);
                }
            }
            inner.idle = keep;
            if !evict.is_empty() {
                debug!(
                    evicted = evict.len(),
                    remaining = inner.idle.len(),
                    "sweeping idle connections"
                );
            }
            evict
        };

        let budget = config.close_budget();
        let mut first_error = None;
        for mut entry in evictees {
            if let Err(error) = entry.item.close(budget).await {
                warn!(%error, id = entry.id, "closing evicted connection failed");
                first_error.get_or_insert(error);
            }
        }
        if first_error.is_some() {
            return first_error;
        }

        if timer_generation.is_some() {
            let mut inner = inner_arc.lock();
            if !inner.closed && inner.idle.len() > 1 {
                Self::arm_timer_locked(inner_arc, &mut inner, config);
            }
        }
        None
    }
}
