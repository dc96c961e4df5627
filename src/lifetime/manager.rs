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

//! Graceful-shutdown lifetime tracking.
//!
//! A [`LifetimeManager`] guards a shared resource (an endpoint's pool, a
//! listener, a session table) through the `Opened -> Closing -> Closed`
//! progression. Operations register themselves with
//! [`increment_busy`](LifetimeManager::increment_busy) /
//! [`decrement_busy`](LifetimeManager::decrement_busy); `close` waits for
//! the busy count to quiesce before completing, and `abort` cuts the wait
//! short.
//!
//! The aborted flag is orthogonal to the state: an abort during `Closing`
//! leaves the state progression intact but changes what waiters observe.

use crate::lifetime::waiter::{CloseWaiter, WaitOutcome, WaiterFlags};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::debug;

/// Grace period for draining in-flight work when an abort tears a
/// resource down.
pub const ABORT_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Lifecycle states of a managed resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifetimeState {
    /// Accepting new operations.
    Opened,
    /// Close requested; draining in-flight operations.
    Closing,
    /// Fully closed.
    Closed,
}

/// Errors from lifetime transitions.
#[derive(Debug, Error)]
pub enum LifetimeError {
    /// An operation was attempted against a resource that is closing or
    /// closed.
    #[error("resource is not open")]
    NotOpen,

    /// `close` was called while another close is already in progress.
    #[error("close already in progress")]
    AlreadyClosing,

    /// The resource was aborted.
    #[error("resource was aborted")]
    Aborted,

    /// In-flight operations did not quiesce within the close timeout.
    #[error("close timed out after {duration:?} with operations still in flight")]
    CloseTimeout {
        /// The timeout that elapsed
        duration: Duration,
    },
}

type EmptyHook = Box<dyn Fn() + Send + Sync>;

struct State {
    lifetime: LifetimeState,
    aborted: bool,
    busy_count: usize,
    on_empty: Option<EmptyHook>,
}

/// Tracks busy operations and sequences graceful shutdown.
///
/// # Examples
///
/// ```rust
/// use sessionwire::lifetime::{LifetimeManager, LifetimeState};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let lifetime = LifetimeManager::new();
/// lifetime.increment_busy()?;
///
/// // ... operation runs ...
/// lifetime.decrement_busy();
///
/// lifetime.close(Duration::from_secs(5)).await?;
/// assert_eq!(lifetime.state(), LifetimeState::Closed);
/// # Ok(())
/// # }
/// ```
pub struct LifetimeManager {
    state: Arc<Mutex<State>>,
    tx: watch::Sender<WaiterFlags>,
}

impl LifetimeManager {
    /// Creates a manager in the `Opened` state.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(WaiterFlags::default());
        Self {
            state: Arc::new(Mutex::new(State {
                lifetime: LifetimeState::Opened,
                aborted: false,
                busy_count: 0,
                on_empty: None,
            })),
            tx,
        }
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> LifetimeState {
        self.state.lock().lifetime
    }

    /// Returns `true` once `abort` has been called.
    pub fn is_aborted(&self) -> bool {
        self.state.lock().aborted
    }

    /// Returns the number of operations currently in flight.
    pub fn busy_count(&self) -> usize {
        self.state.lock().busy_count
    }

    /// Installs a hook invoked (outside the lock) whenever the busy count
    /// returns to zero.
    pub fn set_on_empty(&self, hook: impl Fn() + Send + Sync + 'static) {
        self.state.lock().on_empty = Some(Box::new(hook));
    }

    /// Registers an in-flight operation.
    ///
    /// # Errors
    ///
    /// [`LifetimeError::Aborted`] after an abort, [`LifetimeError::NotOpen`]
    /// once close has begun.
    pub fn increment_busy(&self) -> Result<(), LifetimeError> {
        let mut state = self.state.lock();
        if state.aborted {
            return Err(LifetimeError::Aborted);
        }
        if state.lifetime != LifetimeState::Opened {
            return Err(LifetimeError::NotOpen);
        }
        state.busy_count += 1;
        Ok(())
    }

    /// Unregisters an in-flight operation.
    ///
    /// # Panics
    ///
    /// Panics if the busy count is already zero; increments and decrements
    /// must be paired.
    pub fn decrement_busy(&self) {
        let hook_holder;
        {
            let mut state = self.state.lock();
            assert!(state.busy_count > 0, "decrement_busy without increment");
            state.busy_count -= 1;
            if state.busy_count > 0 {
                return;
            }
            // Quiescence only matters to waiters, which exist only while
            // closing; broadcasting it while open would let a later close
            // observe a stale signal.
            if state.lifetime == LifetimeState::Closing {
                self.tx.send_modify(|flags| flags.quiesced = true);
            }
            // The hook reschedules work (idle timers) and only makes sense
            // while the resource still accepts operations.
            hook_holder = if state.lifetime == LifetimeState::Opened {
                state.on_empty.take()
            } else {
                None
            };
        }
        if let Some(hook) = &hook_holder {
            hook();
        }
        // Reinstall so the hook fires on the next empty transition too.
        if let Some(hook) = hook_holder {
            let mut state = self.state.lock();
            if state.on_empty.is_none() {
                state.on_empty = Some(hook);
            }
        }
    }

    /// Gracefully closes: stops new operations, waits for in-flight ones.
    ///
    /// Idempotent once closed cleanly. After an abort, close always
    /// reports the abort instead.
    ///
    /// # Errors
    ///
    /// - [`LifetimeError::AlreadyClosing`] if a close is racing this one
    /// - [`LifetimeError::CloseTimeout`] if quiescence is not reached
    /// - [`LifetimeError::Aborted`] if the resource was aborted, whether
    ///   before this call or during the wait
    pub async fn close(&self, timeout: Duration) -> Result<(), LifetimeError> {
        let waiter = {
            let mut state = self.state.lock();
            if state.aborted {
                return Err(LifetimeError::Aborted);
            }
            match state.lifetime {
                LifetimeState::Closed => return Ok(()),
                LifetimeState::Closing => return Err(LifetimeError::AlreadyClosing),
                LifetimeState::Opened => {}
            }
            state.lifetime = LifetimeState::Closing;
            if state.busy_count == 0 {
                state.lifetime = LifetimeState::Closed;
                debug!("lifetime closed without in-flight operations");
                return Ok(());
            }
            debug!(busy = state.busy_count, "waiting for in-flight operations");
            CloseWaiter::new(self.tx.subscribe())
        };

        match waiter.wait(timeout).await {
            WaitOutcome::Signaled => {
                self.state.lock().lifetime = LifetimeState::Closed;
                Ok(())
            }
            WaitOutcome::Expired => {
                // The resource stays in Closing; the caller decides whether
                // to abort.
                Err(LifetimeError::CloseTimeout { duration: timeout })
            }
            WaitOutcome::Aborted => {
                self.state.lock().lifetime = LifetimeState::Closed;
                Err(LifetimeError::Aborted)
            }
        }
    }

    /// Aborts: rejects new operations immediately and wakes waiters.
    ///
    /// With no work in flight the state moves straight to `Closed`.
    /// Otherwise it moves to `Closing` and a background task grants the
    /// in-flight operations up to [`ABORT_DRAIN_TIMEOUT`] to finish before
    /// marking the resource `Closed`.
    ///
    /// Idempotent; never blocks the caller. Must run inside a tokio
    /// runtime when operations are in flight.
    pub fn abort(&self) {
        let drain = {
            let mut state = self.state.lock();
            if state.aborted {
                return;
            }
            state.aborted = true;
            if state.busy_count == 0 {
                state.lifetime = LifetimeState::Closed;
                None
            } else {
                state.lifetime = LifetimeState::Closing;
                Some(self.tx.subscribe())
            }
        };
        self.tx.send_modify(|flags| flags.aborted = true);
        let Some(mut rx) = drain else {
            return;
        };
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            let deadline = tokio::time::Instant::now() + ABORT_DRAIN_TIMEOUT;
            loop {
                if rx.borrow_and_update().quiesced {
                    break;
                }
                match tokio::time::timeout_at(deadline, rx.changed()).await {
                    Ok(Ok(())) => continue,
                    // Sender dropped or grace period elapsed; stop waiting.
                    Ok(Err(_)) | Err(_) => break,
                }
            }
            let mut state = state.lock();
            state.lifetime = LifetimeState::Closed;
            debug!(busy = state.busy_count, "abort drain finished");
        });
    }
}

impl Default for LifetimeManager {
    fn default() -> Self {
        Self::new()
    }
}
