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

//! Top-level error type composing the layer errors.
//!
//! Each layer owns its error enum and its handling strategy:
//!
//! - **Framing errors** fault the session when
//!   [`should_fault_session`](crate::framing::FramingError::should_fault_session)
//!   says so; the connection cannot be trusted past a corrupt record.
//! - **Connection errors** make the connection unusable (timeouts
//!   excepted) but say nothing about other connections to the same
//!   destination.
//! - **Pool and lifetime errors** concern shared shutdown state, not any
//!   single byte stream.
//!
//! [`SessionWireError`] composes the layers for callers that drive the
//! whole stack through one `Result` type.

use crate::connection::ConnectionError;
use crate::framing::FramingError;
use crate::lifetime::LifetimeError;
use crate::pool::PoolError;
use thiserror::Error;

/// Unified error type for the transport stack.
#[derive(Debug, Error)]
pub enum SessionWireError {
    /// A framing-layer error occurred.
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),

    /// A connection-layer error occurred.
    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// A pool-layer error occurred.
    #[error("pool error: {0}")]
    Pool(#[from] PoolError),

    /// A lifetime transition failed.
    #[error("lifetime error: {0}")]
    Lifetime(#[from] LifetimeError),
}

impl SessionWireError {
    /// Returns `true` if the session carrying this error must be faulted.
    ///
    /// Connection errors always fault (the stream is gone or its position
    /// unknown); framing errors consult the framing classifier; pool and
    /// lifetime errors never implicate a live session.
    #[must_use]
    pub fn should_fault_session(&self) -> bool {
        match self {
            Self::Framing(e) => e.should_fault_session(),
            Self::Connection(_) => true,
            Self::Pool(_) | Self::Lifetime(_) => false,
        }
    }

    /// Returns `true` if retrying the operation may succeed.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Framing(_) => false,
            Self::Connection(e) => e.is_recoverable(),
            Self::Pool(e) => !e.is_closed(),
            Self::Lifetime(e) => matches!(e, LifetimeError::CloseTimeout { .. }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_framing_error_faults_per_classifier() {
        let corrupt: SessionWireError = FramingError::InvalidUtf8.into();
        assert!(corrupt.should_fault_session());

        let sizing: SessionWireError = FramingError::InsufficientBuffer {
            needed: 4,
            available: 1,
        }
        .into();
        assert!(!sizing.should_fault_session());
    }

    #[test]
    fn test_connection_error_always_faults() {
        let error: SessionWireError = ConnectionError::Closed.into();
        assert!(error.should_fault_session());
        assert!(!error.is_recoverable());
    }

    #[test]
    fn test_timeout_is_recoverable() {
        let error: SessionWireError = ConnectionError::Timeout {
            duration: Duration::from_secs(1),
        }
        .into();
        assert!(error.is_recoverable());
    }

    #[test]
    fn test_pool_error_does_not_fault() {
        let error: SessionWireError = PoolError::Closed.into();
        assert!(!error.should_fault_session());
        assert!(!error.is_recoverable());
    }
}
