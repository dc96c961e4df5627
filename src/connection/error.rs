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

//! Connection layer error types.
//!
//! Connection errors sit below framing in the error hierarchy and describe
//! failures of the byte stream itself. A connection error generally makes
//! the connection unusable; [`ConnectionError::is_timeout`] picks out the
//! one class of failure that callers sometimes absorb (best-effort drains,
//! close deadlines falling back to abort).

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur on a connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Failed to read from the connection.
    #[error("read failed: {source}")]
    ReadFailed {
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Failed to write to the connection.
    #[error("write failed: {source}")]
    WriteFailed {
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// The operation exceeded its timeout.
    #[error("operation timed out after {duration:?}")]
    Timeout {
        /// The duration that was exceeded
        duration: Duration,
    },

    /// The connection was closed by a previous `close` or by the peer.
    #[error("connection is closed")]
    Closed,

    /// The connection was torn down ungracefully by `abort`.
    #[error("connection was aborted")]
    Aborted,

    /// A background flush failed after the write that buffered the bytes
    /// already returned success.
    ///
    /// Raised on the next operation touching the connection. The caller's
    /// data never reached the wire.
    #[error("a previously buffered write failed: {source}")]
    PendingWriteFailed {
        /// The error the background flush hit
        #[source]
        source: Box<ConnectionError>,
    },

    /// An unexpected I/O error occurred.
    #[error("I/O error: {source}")]
    Io {
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },
}

impl ConnectionError {
    /// Returns `true` if this error is a timeout.
    ///
    /// Timeouts are the one error class that best-effort paths (drains,
    /// graceful-close deadlines) absorb instead of propagating.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ConnectionError::Timeout { .. })
    }

    /// Returns `true` if the connection may still be usable after this
    /// error.
    ///
    /// Only timeouts qualify. Everything else either closed the stream or
    /// left its position unknowable.
    pub fn is_recoverable(&self) -> bool {
        match self {
            ConnectionError::Timeout { .. } => true,
            ConnectionError::ReadFailed { source } | ConnectionError::WriteFailed { source } => {
                matches!(source.kind(), io::ErrorKind::Interrupted)
            }
            ConnectionError::Closed
            | ConnectionError::Aborted
            | ConnectionError::PendingWriteFailed { .. }
            | ConnectionError::Io { .. } => false,
        }
    }
}

impl From<io::Error> for ConnectionError {
    fn from(error: io::Error) -> Self {
        ConnectionError::Io { source: error }
    }
}
