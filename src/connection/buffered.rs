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

//! Write-coalescing connection decorator.
//!
//! [`BufferedConnection`] wraps any [`Connection`] and batches small,
//! non-immediate writes into a single buffer that is flushed when it
//! fills, when an immediate write arrives, or when a background timer
//! expires. Many small protocol records (frame headers, ack markers,
//! chunk prefixes) then reach the underlying connection as one write.
//!
//! Reads pass straight through; only the write side is decorated.
//!
//! # Deferred write failures
//!
//! A buffered write reports success before its bytes reach the wire. If
//! the timer flush later fails, the error is parked and rethrown as
//! [`ConnectionError::PendingWriteFailed`] from the next write-side
//! operation. The error surfaces exactly once.
//!
//! # Flush skew
//!
//! The timer fires slightly early, by `min(delay / 10, 100ms)`, so a
//! write that lands just after a nominal deadline still joins the batch
//! in flight instead of starting a new delay period.

use crate::connection::{Connection, ConnectionError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Default coalescing buffer size in bytes.
pub const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Default delay before buffered bytes are flushed by the timer.
pub const DEFAULT_FLUSH_DELAY: Duration = Duration::from_millis(200);

/// Upper bound on the early-fire skew of the flush timer.
const MAX_FLUSH_SKEW: Duration = Duration::from_millis(100);

struct Inner<C> {
    conn: C,
    buffer: Vec<u8>,
    // Longest timeout among the writes currently buffered; governs the
    // flush that carries them.
    pending_timeout: Duration,
    pending_error: Option<ConnectionError>,
    // Bumped on every flush; a timer that wakes to a newer generation
    // arrived late and must not flush.
    timer_generation: u64,
    timer_armed: bool,
}

impl<C: Connection> Inner<C> {
    async fn flush(&mut self) -> Result<(), ConnectionError> {
        self.timer_generation = self.timer_generation.wrapping_add(1);
        self.timer_armed = false;
        if self.buffer.is_empty() {
            return Ok(());
        }
        let timeout = std::mem::replace(&mut self.pending_timeout, Duration::ZERO);
        let Inner { conn, buffer, .. } = self;
        debug!(bytes = buffer.len(), "flushing coalesced writes");
        let result = conn.write(buffer, true, timeout).await;
        buffer.clear();
        result
    }

    fn take_pending(&mut self) -> Result<(), ConnectionError> {
        match self.pending_error.take() {
            Some(error) => Err(ConnectionError::PendingWriteFailed {
                source: Box::new(error),
            }),
            None => Ok(()),
        }
    }
}

/// Connection decorator that coalesces small writes.
///
/// # Examples
///
/// ```rust
/// use sessionwire::connection::{BufferedConnection, Connection, MemoryConnection};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (client, _server) = MemoryConnection::pair();
/// let mut buffered = BufferedConnection::new(client);
/// let timeout = Duration::from_secs(1);
///
/// // Held in the buffer until the flush timer fires...
/// buffered.write(b"frame header", false, timeout).await?;
/// // ...unless an immediate write pushes everything out now.
/// buffered.write(b"payload", true, timeout).await?;
/// # Ok(())
/// # }
/// ```
pub struct BufferedConnection<C> {
    inner: Arc<Mutex<Inner<C>>>,
    aborted: Arc<AtomicBool>,
    buffer_size: usize,
    flush_delay: Duration,
}

impl<C: Connection + 'static> BufferedConnection<C> {
    /// Wraps `conn` with the default buffer size and flush delay.
    pub fn new(conn: C) -> Self {
        Self::with_limits(conn, DEFAULT_BUFFER_SIZE, DEFAULT_FLUSH_DELAY)
    }

    /// Wraps `conn` with an explicit buffer size and flush delay.
    pub fn with_limits(conn: C, buffer_size: usize, flush_delay: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                conn,
                buffer: Vec::with_capacity(buffer_size),
                pending_timeout: Duration::ZERO,
                pending_error: None,
                timer_generation: 0,
                timer_armed: false,
            })),
            aborted: Arc::new(AtomicBool::new(false)),
            buffer_size,
            flush_delay,
        }
    }

    /// Flushes any buffered bytes now.
    pub async fn flush(&mut self, timeout: Duration) -> Result<(), ConnectionError> {
        let mut inner = self.lock_usable().await?;
        inner.take_pending()?;
        inner.pending_timeout = inner.pending_timeout.max(timeout);
        inner.flush().await
    }

    async fn lock_usable(&self) -> Result<tokio::sync::MutexGuard<'_, Inner<C>>, ConnectionError> {
        let mut inner = self.inner.lock().await;
        if self.aborted.load(Ordering::SeqCst) {
            inner.conn.abort();
            return Err(ConnectionError::Aborted);
        }
        Ok(inner)
    }

    fn arm_timer(&self, inner: &mut Inner<C>) {
        if inner.timer_armed {
            return;
        }
        inner.timer_armed = true;
        let generation = inner.timer_generation;

        let skew = (self.flush_delay / 10).min(MAX_FLUSH_SKEW);
        let delay = self.flush_delay.saturating_sub(skew);
        let shared = Arc::clone(&self.inner);
        let aborted = Arc::clone(&self.aborted);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut inner = shared.lock().await;
            if inner.timer_generation != generation {
                return;
            }
            if aborted.load(Ordering::SeqCst) {
                inner.conn.abort();
                return;
            }
            if let Err(error) = inner.flush().await {
                warn!(%error, "background flush failed; parking error for next write");
                inner.pending_error = Some(error);
            }
        });
    }
}

#[async_trait::async_trait]
impl<C: Connection + 'static> Connection for BufferedConnection<C> {
    async fn write(
        &mut self,
        buf: &[u8],
        immediate: bool,
        timeout: Duration,
    ) -> Result<(), ConnectionError> {
        let mut inner = self.lock_usable().await?;
        inner.take_pending()?;

        // A zero flush delay disables coalescing entirely.
        if immediate || self.flush_delay.is_zero() || buf.len() >= self.buffer_size {
            inner.pending_timeout = inner.pending_timeout.max(timeout);
            inner.flush().await?;
            return inner.conn.write(buf, immediate, timeout).await;
        }

        if inner.buffer.len() + buf.len() > self.buffer_size {
            inner.pending_timeout = inner.pending_timeout.max(timeout);
            inner.flush().await?;
        }
        inner.buffer.extend_from_slice(buf);
        inner.pending_timeout = inner.pending_timeout.max(timeout);
        if inner.buffer.len() == self.buffer_size {
            // Exactly full; waiting for the timer would only add latency.
            return inner.flush().await;
        }
        self.arm_timer(&mut inner);
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, ConnectionError> {
        let mut inner = self.lock_usable().await?;
        inner.conn.read(buf, timeout).await
    }

    async fn shutdown_writes(&mut self, timeout: Duration) -> Result<(), ConnectionError> {
        let mut inner = self.lock_usable().await?;
        inner.take_pending()?;
        inner.pending_timeout = inner.pending_timeout.max(timeout);
        inner.flush().await?;
        inner.conn.shutdown_writes(timeout).await
    }

    async fn close(&mut self, timeout: Duration) -> Result<(), ConnectionError> {
        let mut inner = self.lock_usable().await?;
        if let Err(error) = inner.take_pending() {
            // The caller's data never made it out; a graceful close would
            // misrepresent the stream state.
            inner.conn.abort();
            return Err(error);
        }
        inner.pending_timeout = inner.pending_timeout.max(timeout);
        inner.flush().await?;
        inner.conn.close(timeout).await
    }

    fn abort(&mut self) {
        self.aborted.store(true, Ordering::SeqCst);
        if let Ok(mut inner) = self.inner.try_lock() {
            inner.buffer.clear();
            inner.timer_generation = inner.timer_generation.wrapping_add(1);
            inner.conn.abort();
        }
        // A held lock means a writer or the timer owns the connection;
        // whoever acquires it next observes the flag and aborts.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::MemoryConnection;
    use std::io;

    const TIMEOUT: Duration = Duration::from_secs(1);

    fn buffered_pair(
        buffer_size: usize,
        delay: Duration,
    ) -> (
        BufferedConnection<MemoryConnection>,
        MemoryConnection,
        crate::connection::MemoryControls,
    ) {
        let (client, server) = MemoryConnection::pair();
        let controls = client.controls();
        (
            BufferedConnection::with_limits(client, buffer_size, delay),
            server,
            controls,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_small_writes_coalesce_into_one_call() {
        let (mut buffered, mut server, controls) =
            buffered_pair(1024, Duration::from_millis(200));

        buffered.write(b"aaa", false, TIMEOUT).await.unwrap();
        buffered.write(b"bbb", false, TIMEOUT).await.unwrap();
        assert_eq!(controls.write_call_count(), 0);

        // Past the (skew-adjusted) flush deadline.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(controls.write_call_count(), 1);
        assert_eq!(controls.write_calls()[0].len, 6);

        let mut buf = [0u8; 16];
        let n = server.read(&mut buf, TIMEOUT).await.unwrap();
        assert_eq!(&buf[..n], b"aaabbb");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_early_by_skew() {
        // delay 200ms, skew 20ms: the flush lands at 180ms.
        let (mut buffered, _server, controls) = buffered_pair(1024, Duration::from_millis(200));
        buffered.write(b"x", false, TIMEOUT).await.unwrap();

        tokio::time::sleep(Duration::from_millis(179)).await;
        assert_eq!(controls.write_call_count(), 0);
        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(controls.write_call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_write_flushes_buffer_first() {
        let (mut buffered, mut server, controls) =
            buffered_pair(1024, Duration::from_millis(200));

        buffered.write(b"header", false, TIMEOUT).await.unwrap();
        buffered.write(b"payload", true, TIMEOUT).await.unwrap();

        // Flush of the buffer, then the immediate write itself.
        assert_eq!(controls.write_call_count(), 2);
        assert_eq!(controls.write_calls()[0].len, 6);
        assert_eq!(controls.write_calls()[1].len, 7);

        let mut buf = [0u8; 32];
        let mut received = Vec::new();
        while received.len() < 13 {
            let n = server.read(&mut buf, TIMEOUT).await.unwrap();
            received.extend_from_slice(&buf[..n]);
        }
        assert_eq!(&received, b"headerpayload");
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_write_bypasses_buffer() {
        let (mut buffered, _server, controls) = buffered_pair(8, Duration::from_millis(200));
        buffered.write(&[0u8; 16], false, TIMEOUT).await.unwrap();
        assert_eq!(controls.write_call_count(), 1);
        assert_eq!(controls.write_calls()[0].len, 16);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exact_fill_flushes_without_timer() {
        let (mut buffered, mut server, controls) = buffered_pair(8, Duration::from_millis(200));
        buffered.write(b"aaaa", false, TIMEOUT).await.unwrap();
        assert_eq!(controls.write_call_count(), 0);

        // The second write fills the buffer exactly; no timer wait.
        buffered.write(b"bbbb", false, TIMEOUT).await.unwrap();
        assert_eq!(controls.write_call_count(), 1);
        assert_eq!(controls.write_calls()[0].len, 8);

        let mut buf = [0u8; 16];
        let n = server.read(&mut buf, TIMEOUT).await.unwrap();
        assert_eq!(&buf[..n], b"aaaabbbb");
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_flush_delay_disables_coalescing() {
        let (mut buffered, mut server, controls) = buffered_pair(1024, Duration::ZERO);

        buffered.write(b"one", false, TIMEOUT).await.unwrap();
        buffered.write(b"two", false, TIMEOUT).await.unwrap();
        assert_eq!(controls.write_call_count(), 2);

        let mut buf = [0u8; 8];
        let n = server.read(&mut buf, TIMEOUT).await.unwrap();
        assert_eq!(&buf[..n], b"one");
    }

    #[tokio::test(start_paused = true)]
    async fn test_buffer_overflow_flushes_then_buffers() {
        let (mut buffered, _server, controls) = buffered_pair(8, Duration::from_millis(200));
        buffered.write(b"aaaaaa", false, TIMEOUT).await.unwrap();
        // 6 + 5 > 8: the first batch goes out, the new bytes stay buffered.
        buffered.write(b"bbbbb", false, TIMEOUT).await.unwrap();
        assert_eq!(controls.write_call_count(), 1);
        assert_eq!(controls.write_calls()[0].len, 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_flush_failure_surfaces_once() {
        let (mut buffered, _server, controls) = buffered_pair(1024, Duration::from_millis(200));

        buffered.write(b"doomed", false, TIMEOUT).await.unwrap();
        controls.inject_write_error(io::ErrorKind::BrokenPipe);
        tokio::time::sleep(Duration::from_millis(200)).await;

        let result = buffered.write(b"next", false, TIMEOUT).await;
        assert!(matches!(
            result,
            Err(ConnectionError::PendingWriteFailed { .. })
        ));

        // Rethrown exactly once.
        buffered.write(b"after", false, TIMEOUT).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_timer_does_not_reflush() {
        let (mut buffered, _server, controls) = buffered_pair(1024, Duration::from_millis(200));

        buffered.write(b"aaa", false, TIMEOUT).await.unwrap();
        // Explicit flush bumps the generation; the armed timer is stale.
        buffered.flush(TIMEOUT).await.unwrap();
        assert_eq!(controls.write_call_count(), 1);

        buffered.write(b"bbb", false, TIMEOUT).await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(controls.write_call_count(), 2);
        assert_eq!(controls.write_calls()[1].len, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_flushes_buffered_bytes() {
        let (mut buffered, mut server, controls) =
            buffered_pair(1024, Duration::from_millis(200));

        buffered.write(b"tail", false, TIMEOUT).await.unwrap();
        buffered.close(TIMEOUT).await.unwrap();
        assert_eq!(controls.write_call_count(), 1);

        let mut buf = [0u8; 8];
        let n = server.read(&mut buf, TIMEOUT).await.unwrap();
        assert_eq!(&buf[..n], b"tail");
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_discards_buffer_and_poisons() {
        let (mut buffered, _server, controls) = buffered_pair(1024, Duration::from_millis(200));

        buffered.write(b"never sent", false, TIMEOUT).await.unwrap();
        buffered.abort();

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(controls.write_call_count(), 0);

        let result = buffered.write(b"more", false, TIMEOUT).await;
        assert!(matches!(result, Err(ConnectionError::Aborted)));
    }
}
