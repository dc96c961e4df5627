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

//! Pool layer error types.

use crate::connection::ConnectionError;
use crate::lifetime::LifetimeError;
use thiserror::Error;

/// Errors that can occur while pooling connections.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The pool has been closed or aborted.
    #[error("pool is closed")]
    Closed,

    /// The pool was configured with invalid parameters.
    ///
    /// Not recoverable; indicates a programming error.
    #[error("invalid pool configuration: {reason}")]
    InvalidConfiguration {
        /// Description of the configuration error
        reason: &'static str,
    },

    /// A background sweep failed to close an evicted connection.
    ///
    /// Raised once, on the first pool operation after the failed sweep;
    /// the eviction itself already happened.
    #[error("background eviction failed: {source}")]
    SweepFailed {
        /// The error the eviction close hit
        #[source]
        source: ConnectionError,
    },

    /// Closing pooled connections during pool shutdown failed.
    #[error("closing pooled connections failed: {source}")]
    CloseFailed {
        /// The first close error encountered
        #[source]
        source: ConnectionError,
    },

    /// A lifetime transition failed.
    #[error(transparent)]
    Lifetime(#[from] LifetimeError),
}

impl PoolError {
    /// Returns `true` if the pool itself is gone and callers should stop
    /// using it.
    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            PoolError::Closed
                | PoolError::Lifetime(LifetimeError::NotOpen)
                | PoolError::Lifetime(LifetimeError::Aborted)
        )
    }
}
