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

//! Binary session framing.
//!
//! This module owns the wire vocabulary of the transport: varint-encoded
//! lengths, typed control records, the per-mode preamble and message
//! framing, and the server-side preamble handshake decoder. Nothing here
//! performs I/O; every function works on byte slices so the connection
//! layer can decide how bytes move.
//!
//! # Organization
//!
//! - [`varint`] - variable-length integer encode/decode
//! - [`record`] - record types, known encodings, pre-encoded string records
//! - [`session`] - session modes, preamble and message-frame encoding
//! - [`preamble`] - incremental server preamble decoding and rejection
//! - [`error`] - [`FramingError`]

pub mod error;
pub mod preamble;
pub mod record;
pub mod session;
pub mod varint;

pub use error::FramingError;
pub use preamble::{
    send_fault_and_drain, PreambleContentType, PreambleDecoder, PreambleOutcome, PreambleQuotas,
    ServerPreamble, DEFAULT_DRAIN_QUOTA,
};
pub use record::{decode_string_record, EncodedRecord, FramingRecordType, KnownEncoding};
pub use session::{
    decode_mode_bytes, encode_chunk_header, encode_message_frame, encode_sized_envelope_start,
    end_bytes, envelope_start_bytes, frame_header_size, preamble_ack_bytes,
    singleton_terminator_bytes, upgrade_response_bytes, ChunkHeader, SessionMode, PROTOCOL_VERSION,
};
pub use varint::VarintDecoder;
