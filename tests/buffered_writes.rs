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

//! Write-coalescing behavior of the buffered connection decorator.

use sessionwire::connection::{
    BufferedConnection, Connection, ConnectionError, MemoryConnection,
};
use sessionwire::framing::{encode_chunk_header, envelope_start_bytes};
use std::io;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(5);
const FLUSH_DELAY: Duration = Duration::from_millis(200);

#[tokio::test(start_paused = true)]
async fn test_protocol_records_coalesce_to_one_wire_write() {
    let (client, mut server) = MemoryConnection::pair();
    let controls = client.controls();
    let mut buffered = BufferedConnection::with_limits(client, 8192, FLUSH_DELAY);

    // A streamed body start: marker, chunk header, chunk. Three protocol
    // writes, one wire write.
    buffered
        .write(&envelope_start_bytes(), false, TIMEOUT)
        .await
        .unwrap();
    let header = encode_chunk_header(5).unwrap();
    buffered
        .write(header.as_slice(), false, TIMEOUT)
        .await
        .unwrap();
    buffered.write(b"hello", false, TIMEOUT).await.unwrap();
    assert_eq!(controls.write_call_count(), 0);

    tokio::time::sleep(FLUSH_DELAY).await;
    assert_eq!(controls.write_call_count(), 1);

    let mut buf = [0u8; 16];
    let n = server.read(&mut buf, TIMEOUT).await.unwrap();
    assert_eq!(&buf[..n], &[0x05, 0x05, b'h', b'e', b'l', b'l', b'o']);
}

#[tokio::test(start_paused = true)]
async fn test_immediate_write_pushes_batch_out_now() {
    let (client, mut server) = MemoryConnection::pair();
    let controls = client.controls();
    let mut buffered = BufferedConnection::with_limits(client, 8192, FLUSH_DELAY);

    buffered.write(b"header", false, TIMEOUT).await.unwrap();
    buffered.write(b"payload", true, TIMEOUT).await.unwrap();

    // No waiting on the timer: the flush and the immediate write both
    // happened synchronously.
    assert_eq!(controls.write_call_count(), 2);

    let mut received = Vec::new();
    let mut buf = [0u8; 32];
    while received.len() < 13 {
        let n = server.read(&mut buf, TIMEOUT).await.unwrap();
        received.extend_from_slice(&buf[..n]);
    }
    assert_eq!(&received, b"headerpayload");
}

#[tokio::test(start_paused = true)]
async fn test_flush_failure_is_deferred_to_next_write() {
    let (client, _server) = MemoryConnection::pair();
    let controls = client.controls();
    let mut buffered = BufferedConnection::with_limits(client, 8192, FLUSH_DELAY);

    buffered.write(b"lost bytes", false, TIMEOUT).await.unwrap();
    controls.inject_write_error(io::ErrorKind::BrokenPipe);
    tokio::time::sleep(FLUSH_DELAY).await;

    // The buffered write already reported success; the failure surfaces
    // here, once.
    let result = buffered.write(b"next", false, TIMEOUT).await;
    assert!(matches!(
        result,
        Err(ConnectionError::PendingWriteFailed { .. })
    ));
    buffered.write(b"after", false, TIMEOUT).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_writes_flushes_tail_bytes() {
    let (client, mut server) = MemoryConnection::pair();
    let mut buffered = BufferedConnection::with_limits(client, 8192, FLUSH_DELAY);

    buffered.write(b"tail", false, TIMEOUT).await.unwrap();
    buffered.shutdown_writes(TIMEOUT).await.unwrap();

    let mut buf = [0u8; 8];
    let n = server.read(&mut buf, TIMEOUT).await.unwrap();
    assert_eq!(&buf[..n], b"tail");
    // EOF follows the flushed bytes.
    assert_eq!(server.read(&mut buf, TIMEOUT).await.unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_reads_pass_through_undecorated() {
    let (client, mut server) = MemoryConnection::pair();
    let mut buffered = BufferedConnection::with_limits(client, 8192, FLUSH_DELAY);

    server.write(b"inbound", true, TIMEOUT).await.unwrap();
    let mut buf = [0u8; 16];
    let n = buffered.read(&mut buf, TIMEOUT).await.unwrap();
    assert_eq!(&buf[..n], b"inbound");
}

#[tokio::test(start_paused = true)]
async fn test_interleaved_batches_preserve_byte_order() {
    let (client, mut server) = MemoryConnection::pair();
    let mut buffered = BufferedConnection::with_limits(client, 8192, FLUSH_DELAY);

    buffered.write(b"one ", false, TIMEOUT).await.unwrap();
    tokio::time::sleep(FLUSH_DELAY).await;
    buffered.write(b"two ", false, TIMEOUT).await.unwrap();
    buffered.write(b"three", true, TIMEOUT).await.unwrap();

    let mut received = Vec::new();
    let mut buf = [0u8; 32];
    while received.len() < 13 {
        let n = server.read(&mut buf, TIMEOUT).await.unwrap();
        received.extend_from_slice(&buf[..n]);
    }
    assert_eq!(&received, b"one two three");
}
