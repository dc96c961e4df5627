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

use crate::lifetime::ABORT_DRAIN_TIMEOUT;
use crate::pool::PoolError;
use std::time::Duration;
use tokio::time::Instant;

/// Configuration for connection pooling.
///
/// Two independent eviction clocks govern pooled connections:
///
/// - **idle**: measured from the moment a connection was last returned to
///   the pool. An idle connection past this timeout is evicted.
/// - **lease**: measured from the moment the connection was created. A
///   connection past its lease is never handed out again and is closed on
///   return, regardless of how recently it was used.
///
/// `None` disables that clock. With both clocks disabled the pool reuses
/// connections without ever evicting them.
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    /// Maximum connections (idle plus checked out) per destination.
    pub max_pool_size: usize,
    /// Idle eviction clock; `None` disables idle eviction.
    pub idle_timeout: Option<Duration>,
    /// Lease eviction clock; `None` disables lease eviction.
    pub lease_timeout: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_pool_size: 10,
            idle_timeout: Some(Duration::from_secs(2 * 60)),
            lease_timeout: Some(Duration::from_secs(5 * 60)),
        }
    }
}

impl PoolConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// [`PoolError::InvalidConfiguration`] for a zero `max_pool_size` or a
    /// zero-duration timeout.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.max_pool_size == 0 {
            return Err(PoolError::InvalidConfiguration {
                reason: "max_pool_size must be at least 1",
            });
        }
        if self.idle_timeout == Some(Duration::ZERO) {
            return Err(PoolError::InvalidConfiguration {
                reason: "idle_timeout must be non-zero (use None to disable)",
            });
        }
        if self.lease_timeout == Some(Duration::ZERO) {
            return Err(PoolError::InvalidConfiguration {
                reason: "lease_timeout must be non-zero (use None to disable)",
            });
        }
        Ok(())
    }

    /// Interval between sweep timer firings: the shorter enabled clock.
    pub(crate) fn sweep_interval(&self) -> Option<Duration> {
        match (self.idle_timeout, self.lease_timeout) {
            (Some(idle), Some(lease)) => Some(idle.min(lease)),
            (Some(idle), None) => Some(idle),
            (None, Some(lease)) => Some(lease),
            (None, None) => None,
        }
    }

    /// Per-item budget for closing an evicted connection.
    ///
    /// Half the idle timeout, so a sweep closing several evictees cannot
    /// stall longer than the eviction clock that produced them.
    pub(crate) fn close_budget(&self) -> Duration {
        match self.idle_timeout {
            Some(idle) => idle / 2,
            None => ABORT_DRAIN_TIMEOUT,
        }
    }

    pub(crate) fn idle_expired(&self, last_used_at: Instant, now: Instant) -> bool {
        match self.idle_timeout {
            Some(idle) => now.saturating_duration_since(last_used_at) >= idle,
            None => false,
        }
    }

    pub(crate) fn lease_expired(&self, created_at: Instant, now: Instant) -> bool {
        match self.lease_timeout {
            Some(lease) => now.saturating_duration_since(created_at) >= lease,
            None => false,
        }
    }

    pub(crate) fn expired(&self, created_at: Instant, last_used_at: Instant, now: Instant) -> bool {
        self.idle_expired(last_used_at, now) || self.lease_expired(created_at, now)
    }
}
