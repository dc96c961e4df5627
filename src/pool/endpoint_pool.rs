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

//! Keyed connection pooling with capacity accounting.
//!
//! An [`EndpointPool`] maps destination keys to per-destination idle
//! pools and enforces `idle + checked_out <= max_pool_size` for each key.
//! Checked-out connections count against the owning pool's
//! [`LifetimeManager`], so a graceful pool close waits for every
//! connection to come home before tearing the idle sets down.
//!
//! The pool never performs connection I/O on the caller's behalf except
//! when closing idle sets: stale connections discovered during a take are
//! handed back in [`Take::stale`] for the caller to close, keeping the
//! take path lock-cheap and non-blocking.

use crate::lifetime::{LifetimeManager, LifetimeState, ABORT_DRAIN_TIMEOUT};
use crate::pool::{IdleConnectionPool, PoolConfig, PoolError, PooledConnection, PooledHandle};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Outcome of a capacity decision in [`EndpointPool::take`].
pub enum TakeResult<T> {
    /// An idle connection was available; use it and return it.
    Reuse(PooledHandle<T>),
    /// Under capacity with nothing idle: the caller should create a
    /// connection and register it with
    /// [`EndpointPool::register_created`] (or release the permit with
    /// [`EndpointPool::create_failed`]).
    Create,
    /// The destination is at `max_pool_size`; the caller must wait or
    /// fail the request.
    AtCapacity,
}

/// Result of [`EndpointPool::take`].
///
/// `stale` holds connections that were idle past an eviction clock and
/// were removed while searching; the caller closes them.
pub struct Take<T> {
    /// The capacity decision.
    pub result: TakeResult<T>,
    /// Expired connections to close, already untracked.
    pub stale: Vec<T>,
}

type ClosingHook<T> = Box<dyn Fn(&T) + Send + Sync>;

struct PerKey<T> {
    idle: Arc<IdleConnectionPool<T>>,
    checked_out: usize,
}

/// Connection pool keyed by destination.
///
/// # Examples
///
/// ```rust,no_run
/// use sessionwire::pool::{EndpointPool, PoolConfig, TakeResult};
/// # use sessionwire::pool::PooledConnection;
/// # use sessionwire::connection::ConnectionError;
/// # use std::time::Duration;
/// # struct MyConn;
/// # #[async_trait::async_trait]
/// # impl PooledConnection for MyConn {
/// #     async fn close(&mut self, _t: Duration) -> Result<(), ConnectionError> { Ok(()) }
/// #     fn abort(&mut self) {}
/// # }
/// # async fn connect() -> MyConn { MyConn }
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool: EndpointPool<String, MyConn> = EndpointPool::new(PoolConfig::default())?;
/// let key = "net.tcp://host/svc".to_string();
///
/// let take = pool.take(&key)?;
/// let handle = match take.result {
///     TakeResult::Reuse(handle) => handle,
///     TakeResult::Create => pool.register_created(&key, connect().await)?,
///     TakeResult::AtCapacity => return Err("destination saturated".into()),
/// };
///
/// // ... use the connection ...
/// if let Some(mut dead) = pool.return_to_pool(&key, handle, true)? {
///     dead.close(Duration::from_secs(1)).await.ok();
/// }
/// # Ok(())
/// # }
/// ```
pub struct EndpointPool<K, T> {
    pools: Mutex<HashMap<K, PerKey<T>>>,
    config: PoolConfig,
    lifetime: LifetimeManager,
    on_item_closing: Mutex<Option<ClosingHook<T>>>,
}

impl<K, T> EndpointPool<K, T>
where
    K: Eq + Hash + Clone,
    T: PooledConnection,
{
    /// Creates a pool with the given configuration.
    ///
    /// # Errors
    ///
    /// [`PoolError::InvalidConfiguration`] if the configuration fails
    /// validation.
    pub fn new(config: PoolConfig) -> Result<Self, PoolError> {
        config.validate()?;
        Ok(Self {
            pools: Mutex::new(HashMap::new()),
            config,
            lifetime: LifetimeManager::new(),
            on_item_closing: Mutex::new(None),
        })
    }

    /// Installs a hook invoked just before the pool stops tracking a
    /// connection (stale take, refused return, failed return).
    pub fn set_on_item_closing(&self, hook: impl Fn(&T) + Send + Sync + 'static) {
        *self.on_item_closing.lock() = Some(Box::new(hook));
    }

    /// Connections checked out across all destinations.
    pub fn checked_out_count(&self) -> usize {
        self.pools.lock().values().map(|p| p.checked_out).sum()
    }

    /// Idle connections for one destination.
    pub fn idle_count(&self, key: &K) -> usize {
        self.pools
            .lock()
            .get(key)
            .map_or(0, |per_key| per_key.idle.idle_count())
    }

    fn notify_closing(&self, item: &T) {
        if let Some(hook) = self.on_item_closing.lock().as_ref() {
            hook(item);
        }
    }

    /// Takes a connection for `key`, or a permit to create one.
    ///
    /// On `Reuse` and `Create` the connection is counted as checked out
    /// until [`return_to_pool`](Self::return_to_pool) (or
    /// [`create_failed`](Self::create_failed)) balances it.
    ///
    /// # Errors
    ///
    /// [`PoolError::Lifetime`] once the pool is closing, or a parked sweep
    /// error from the destination's idle pool.
    pub fn take(&self, key: &K) -> Result<Take<T>, PoolError> {
        self.lifetime.increment_busy()?;

        let idle = self.per_key_idle(key)?;
        let mut stale = Vec::new();
        loop {
            match idle.take() {
                Ok(Some((handle, should_close))) => {
                    if should_close {
                        let item = handle.into_inner();
                        self.notify_closing(&item);
                        stale.push(item);
                        continue;
                    }
                    // Reused connections count against capacity too.
                    if let Some(per_key) = self.pools.lock().get_mut(key) {
                        per_key.checked_out += 1;
                    }
                    return Ok(Take {
                        result: TakeResult::Reuse(handle),
                        stale,
                    });
                }
                Ok(None) => break,
                Err(error) => {
                    self.lifetime.decrement_busy();
                    return Err(error);
                }
            }
        }

        let mut pools = self.pools.lock();
        let Some(per_key) = pools.get_mut(key) else {
            drop(pools);
            self.lifetime.decrement_busy();
            return Err(PoolError::Closed);
        };
        if per_key.checked_out + per_key.idle.idle_count() >= self.config.max_pool_size {
            drop(pools);
            self.lifetime.decrement_busy();
            return Ok(Take {
                result: TakeResult::AtCapacity,
                stale,
            });
        }
        per_key.checked_out += 1;
        Ok(Take {
            result: TakeResult::Create,
            stale,
        })
    }

    /// Registers a connection created under a `Create` permit.
    pub fn register_created(&self, key: &K, item: T) -> Result<PooledHandle<T>, PoolError> {
        let idle = self.per_key_idle(key)?;
        match idle.admit(item) {
            Ok(handle) => Ok(handle),
            Err(error) => {
                self.release_checked_out(key);
                self.lifetime.decrement_busy();
                Err(error)
            }
        }
    }

    /// Releases a `Create` permit after connection establishment failed.
    pub fn create_failed(&self, key: &K) {
        self.release_checked_out(key);
        self.lifetime.decrement_busy();
    }

    /// Returns a connection to its destination's idle set.
    ///
    /// `ok = false` marks the connection as having hit an I/O error; it is
    /// not pooled. `Ok(Some(item))` hands the connection back for the
    /// caller to close (error path, expired lease, pool closing, or a
    /// sweep got there first).
    pub fn return_to_pool(
        &self,
        key: &K,
        handle: PooledHandle<T>,
        ok: bool,
    ) -> Result<Option<T>, PoolError> {
        if self.lifetime.state() != LifetimeState::Opened {
            // The pool is shutting down; the connection goes back to the
            // caller to close. The busy decrement lets a graceful close
            // finish its quiescence wait.
            self.release_checked_out(key);
            if self.lifetime.busy_count() > 0 {
                self.lifetime.decrement_busy();
            }
            let item = handle.into_inner();
            self.notify_closing(&item);
            return Ok(Some(item));
        }

        let idle = self.per_key_idle(key)?;
        self.release_checked_out(key);
        self.lifetime.decrement_busy();

        if !ok {
            let item = idle.discard(handle);
            self.notify_closing(&item);
            return Ok(Some(item));
        }
        match idle.return_item(handle)? {
            Some(item) => {
                debug!("pool refused returned connection");
                self.notify_closing(&item);
                Ok(Some(item))
            }
            None => Ok(None),
        }
    }

    /// Gracefully closes: waits for checked-out connections to return,
    /// then closes every idle set within the remaining timeout.
    pub async fn close(&self, timeout: Duration) -> Result<(), PoolError> {
        let deadline = Instant::now() + timeout;
        self.lifetime.close(timeout).await?;

        let idle_pools: Vec<_> = {
            let mut pools = self.pools.lock();
            pools.drain().map(|(_, per_key)| per_key.idle).collect()
        };
        let mut first_error = None;
        for idle in idle_pools {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if let Err(error) = idle.close(remaining).await {
                first_error.get_or_insert(error);
            }
        }
        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Aborts: tears down idle connections immediately.
    ///
    /// Checked-out connections are their holders' problem; returns after
    /// the abort are refused.
    pub fn abort(&self) {
        self.lifetime.abort();
        let idle_pools: Vec<_> = {
            let mut pools = self.pools.lock();
            pools.drain().map(|(_, per_key)| per_key.idle).collect()
        };
        for idle in idle_pools {
            idle.abort();
        }
    }

    /// Grace period holders get to drain after an [`abort`](Self::abort).
    pub fn abort_drain_timeout(&self) -> Duration {
        ABORT_DRAIN_TIMEOUT
    }

    fn per_key_idle(&self, key: &K) -> Result<Arc<IdleConnectionPool<T>>, PoolError> {
        if self.lifetime.state() != LifetimeState::Opened {
            return Err(PoolError::Closed);
        }
        let mut pools = self.pools.lock();
        if let Some(per_key) = pools.get(key) {
            return Ok(Arc::clone(&per_key.idle));
        }
        let idle = Arc::new(IdleConnectionPool::new(self.config)?);
        pools.insert(
            key.clone(),
            PerKey {
                idle: Arc::clone(&idle),
                checked_out: 0,
            },
        );
        Ok(idle)
    }

    fn release_checked_out(&self, key: &K) {
        let mut pools = self.pools.lock();
        if let Some(per_key) = pools.get_mut(key) {
            debug_assert!(per_key.checked_out > 0);
            per_key.checked_out = per_key.checked_out.saturating_sub(1);
        }
    }
}
