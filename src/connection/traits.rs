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

use crate::connection::ConnectionError;
use std::time::Duration;

/// Core abstraction for a connected, bi-directional byte stream.
///
/// Every operation carries an explicit timeout; there is no implicit
/// default. Implementations map timeout expiry to
/// [`ConnectionError::Timeout`].
///
/// # The `immediate` flag
///
/// `write` takes an `immediate` flag that separates latency-sensitive
/// writes from throughput writes. Decorators that coalesce small writes
/// (see [`BufferedConnection`](crate::connection::BufferedConnection))
/// flush on `immediate = true` and may hold bytes back otherwise. Base
/// transports deliver every write directly and ignore the flag.
///
/// # Shutdown vs close vs abort
///
/// - [`shutdown_writes`](Connection::shutdown_writes) half-closes: no more
///   writes, reads still allowed. Used for end-of-session drains where the
///   peer's close must be observed.
/// - [`close`](Connection::close) gracefully tears down the whole
///   connection within the timeout.
/// - [`abort`](Connection::abort) tears down immediately, without I/O and
///   without waiting. It is synchronous so it can run from `Drop` and from
///   error paths that cannot await.
#[async_trait::async_trait]
pub trait Connection: Send {
    /// Writes all of `buf`, or fails.
    ///
    /// With `immediate = false` a coalescing decorator may buffer the
    /// bytes and report success before they reach the wire; a later flush
    /// failure surfaces as [`ConnectionError::PendingWriteFailed`] on the
    /// next operation.
    async fn write(
        &mut self,
        buf: &[u8],
        immediate: bool,
        timeout: Duration,
    ) -> Result<(), ConnectionError>;

    /// Reads up to `buf.len()` bytes, returning the count. `Ok(0)` means
    /// the peer half-closed its send side.
    async fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, ConnectionError>;

    /// Flushes buffered bytes and half-closes the write side.
    async fn shutdown_writes(&mut self, timeout: Duration) -> Result<(), ConnectionError>;

    /// Gracefully closes the connection within `timeout`.
    async fn close(&mut self, timeout: Duration) -> Result<(), ConnectionError>;

    /// Tears the connection down immediately. Idempotent; never blocks.
    fn abort(&mut self);
}
