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

//! In-memory connection implementation for testing.
//!
//! This module provides an in-memory connection that uses Tokio channels
//! for communication. It's primarily useful for testing framing, write
//! coalescing, and pooling behavior without network I/O.
//!
//! Each connection exposes a [`MemoryControls`] handle that records every
//! write call (byte count and `immediate` flag) and can inject a failure
//! into the next write. Coalescing tests use the call log to prove that
//! buffered writes reached the underlying connection as one call.

use crate::connection::{Connection, ConnectionError};
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Buffer size (in chunks) for memory connection channels.
const CHANNEL_DEPTH: usize = 64;

/// One recorded call to [`Connection::write`] on a memory connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteCall {
    /// Bytes passed to the call.
    pub len: usize,
    /// The `immediate` flag the caller passed.
    pub immediate: bool,
}

#[derive(Debug, Default)]
struct ControlState {
    write_calls: Vec<WriteCall>,
    next_write_error: Option<io::ErrorKind>,
}

/// Shared observation and fault-injection handle for a [`MemoryConnection`].
///
/// Cloning the handle observes the same connection.
#[derive(Debug, Clone, Default)]
pub struct MemoryControls {
    state: Arc<Mutex<ControlState>>,
}

impl MemoryControls {
    /// Returns every write call made so far, in order.
    pub fn write_calls(&self) -> Vec<WriteCall> {
        self.state.lock().write_calls.clone()
    }

    /// Returns the number of write calls made so far.
    pub fn write_call_count(&self) -> usize {
        self.state.lock().write_calls.len()
    }

    /// Makes the next write fail with `kind` instead of delivering.
    pub fn inject_write_error(&self, kind: io::ErrorKind) {
        self.state.lock().next_write_error = Some(kind);
    }

    fn record_write(&self, len: usize, immediate: bool) -> Result<(), ConnectionError> {
        let mut state = self.state.lock();
        state.write_calls.push(WriteCall { len, immediate });
        if let Some(kind) = state.next_write_error.take() {
            return Err(ConnectionError::WriteFailed {
                source: io::Error::new(kind, "injected write error"),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnState {
    Open,
    WritesShutdown,
    Closed,
    Aborted,
}

/// In-memory connection backed by Tokio channels.
///
/// # Examples
///
/// ```rust
/// use sessionwire::connection::{Connection, MemoryConnection};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (mut client, mut server) = MemoryConnection::pair();
/// let timeout = Duration::from_secs(1);
///
/// client.write(b"hello", true, timeout).await?;
///
/// let mut buf = [0u8; 16];
/// let n = server.read(&mut buf, timeout).await?;
/// assert_eq!(&buf[..n], b"hello");
/// # Ok(())
/// # }
/// ```
pub struct MemoryConnection {
    tx: Option<mpsc::Sender<Vec<u8>>>,
    rx: mpsc::Receiver<Vec<u8>>,
    current_chunk: Option<Vec<u8>>,
    chunk_offset: usize,
    state: ConnState,
    controls: MemoryControls,
}

impl MemoryConnection {
    /// Creates a pair of connected memory connections.
    ///
    /// Data written to one side is read from the other, and vice versa.
    pub fn pair() -> (Self, Self) {
        let (a_tx, a_rx) = mpsc::channel(CHANNEL_DEPTH);
        let (b_tx, b_rx) = mpsc::channel(CHANNEL_DEPTH);
        (Self::new(a_tx, b_rx), Self::new(b_tx, a_rx))
    }

    fn new(tx: mpsc::Sender<Vec<u8>>, rx: mpsc::Receiver<Vec<u8>>) -> Self {
        Self {
            tx: Some(tx),
            rx,
            current_chunk: None,
            chunk_offset: 0,
            state: ConnState::Open,
            controls: MemoryControls::default(),
        }
    }

    /// Returns the observation handle for this connection.
    pub fn controls(&self) -> MemoryControls {
        self.controls.clone()
    }

    fn check_usable(&self) -> Result<(), ConnectionError> {
        match self.state {
            ConnState::Open | ConnState::WritesShutdown => Ok(()),
            ConnState::Closed => Err(ConnectionError::Closed),
            ConnState::Aborted => Err(ConnectionError::Aborted),
        }
    }

    fn copy_from_chunk(&mut self, buf: &mut [u8]) -> Option<usize> {
        let chunk = self.current_chunk.as_ref()?;
        let remaining = &chunk[self.chunk_offset..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.chunk_offset += n;
        if self.chunk_offset == chunk.len() {
            self.current_chunk = None;
            self.chunk_offset = 0;
        }
        Some(n)
    }
}

#[async_trait::async_trait]
impl Connection for MemoryConnection {
    async fn write(
        &mut self,
        buf: &[u8],
        immediate: bool,
        timeout: Duration,
    ) -> Result<(), ConnectionError> {
        self.check_usable()?;
        if self.state == ConnState::WritesShutdown {
            return Err(ConnectionError::Closed);
        }
        self.controls.record_write(buf.len(), immediate)?;

        let tx = self.tx.as_ref().ok_or(ConnectionError::Closed)?;
        match tokio::time::timeout(timeout, tx.send(buf.to_vec())).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(ConnectionError::WriteFailed {
                source: io::Error::new(io::ErrorKind::BrokenPipe, "peer closed"),
            }),
            Err(_) => Err(ConnectionError::Timeout { duration: timeout }),
        }
    }

    async fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, ConnectionError> {
        self.check_usable()?;
        if buf.is_empty() {
            return Ok(0);
        }
        if let Some(n) = self.copy_from_chunk(buf) {
            return Ok(n);
        }

        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(chunk)) => {
                self.current_chunk = Some(chunk);
                self.chunk_offset = 0;
                Ok(self.copy_from_chunk(buf).unwrap_or(0))
            }
            Ok(None) => Ok(0),
            Err(_) => Err(ConnectionError::Timeout { duration: timeout }),
        }
    }

    async fn shutdown_writes(&mut self, _timeout: Duration) -> Result<(), ConnectionError> {
        self.check_usable()?;
        // Dropping the sender delivers EOF to the peer's reads.
        self.tx = None;
        self.state = ConnState::WritesShutdown;
        Ok(())
    }

    async fn close(&mut self, _timeout: Duration) -> Result<(), ConnectionError> {
        if self.state == ConnState::Aborted {
            return Err(ConnectionError::Aborted);
        }
        self.tx = None;
        self.rx.close();
        self.state = ConnState::Closed;
        Ok(())
    }

    fn abort(&mut self) {
        self.tx = None;
        self.rx.close();
        self.state = ConnState::Aborted;
    }
}
