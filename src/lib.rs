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

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

//! # SessionWire - Connection-Oriented Session Transport
//!
//! SessionWire is the connection-oriented transport layer of an RPC and
//! messaging stack. It provides:
//!
//! - **Binary session framing**: versioned preamble negotiation, typed
//!   control records, varint-length message frames
//! - **Four session modes**: duplex and simplex message-framed sessions,
//!   streamed and sized one-shot singleton sessions
//! - **Write coalescing**: small protocol writes batched behind a flush
//!   timer so they hit the wire as one call
//! - **Connection pooling**: per-destination idle pools with independent
//!   idle and lease eviction clocks
//! - **Graceful shutdown**: busy-count lifetime tracking with quiescent
//!   close and immediate abort
//!
//! ## Architecture
//!
//! The crate is organized bottom-up:
//!
//! - **[`framing`]**: wire vocabulary (varints, records, preambles); no I/O
//! - **[`connection`]**: the [`Connection`](connection::Connection) byte
//!   stream seam and the coalescing decorator
//! - **[`lifetime`]**: busy counting and quiescent close for shared
//!   resources
//! - **[`pool`]**: keyed connection pooling built on the layers below
//!
//! ## Quick Start
//!
//! Framing a duplex session over an in-memory connection pair:
//!
//! ```rust
//! use sessionwire::connection::{Connection, MemoryConnection};
//! use sessionwire::framing::{
//!     EncodedRecord, PreambleDecoder, PreambleOutcome, PreambleQuotas, SessionMode,
//! };
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (mut client, mut server) = MemoryConnection::pair();
//! let timeout = Duration::from_secs(5);
//!
//! // Client opens the session.
//! let via = EncodedRecord::via("net.tcp://host/svc")?;
//! let content_type = EncodedRecord::content_type("application/soap+msbinsession1")?;
//! let preamble = SessionMode::Duplex.encode_preamble(&via, &content_type);
//! client.write(&preamble, true, timeout).await?;
//!
//! // Server decodes and accepts it.
//! let mut decoder = PreambleDecoder::new(PreambleQuotas::default());
//! let mut buf = [0u8; 256];
//! let n = server.read(&mut buf, timeout).await?;
//! let (_, outcome) = decoder.feed(&buf[..n])?;
//! let Some(PreambleOutcome::Accepted(preamble)) = outcome else {
//!     return Err("handshake failed".into());
//! };
//! assert_eq!(preamble.mode, SessionMode::Duplex);
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod framing;
pub mod lifetime;
pub mod pool;

mod error;

pub use error::SessionWireError;
