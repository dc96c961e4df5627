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

use std::time::Duration;
use tokio::sync::watch;

/// Flags broadcast to close waiters.
///
/// `aborted` dominates `quiesced`: a waiter that observes both reports
/// the abort, because the quiescence it waited for no longer means the
/// resource drained cleanly.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct WaiterFlags {
    pub(crate) quiesced: bool,
    pub(crate) aborted: bool,
}

/// How a [`CloseWaiter`] wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Quiescence was reached within the timeout.
    Signaled,
    /// The timeout elapsed first.
    Expired,
    /// The resource was aborted while waiting.
    Aborted,
}

/// A single-use handle that waits for a lifetime to quiesce.
///
/// Produced internally by
/// [`LifetimeManager::close`](super::LifetimeManager::close); the type and
/// its [`WaitOutcome`] are public so callers can name them.
#[derive(Debug)]
pub struct CloseWaiter {
    rx: watch::Receiver<WaiterFlags>,
}

impl CloseWaiter {
    pub(crate) fn new(rx: watch::Receiver<WaiterFlags>) -> Self {
        Self { rx }
    }

    /// Waits until quiescence, abort, or timeout, whichever comes first.
    pub async fn wait(mut self, timeout: Duration) -> WaitOutcome {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            {
                let flags = *self.rx.borrow_and_update();
                if flags.aborted {
                    return WaitOutcome::Aborted;
                }
                if flags.quiesced {
                    return WaitOutcome::Signaled;
                }
            }
            match tokio::time::timeout_at(deadline, self.rx.changed()).await {
                Ok(Ok(())) => continue,
                // Sender gone means the manager was dropped mid-close.
                Ok(Err(_)) => return WaitOutcome::Aborted,
                Err(_) => return WaitOutcome::Expired,
            }
        }
    }
}
