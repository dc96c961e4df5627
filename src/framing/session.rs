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

//! Per-mode session encoding: preamble, message framing, termination.
//!
//! A session opens with a fixed five-byte mode announcement (version record
//! plus mode record), a `Via` record, a content-type record, and a
//! `PreambleEnd` marker. How message bodies travel afterwards depends on
//! the negotiated [`SessionMode`]:
//!
//! - **Duplex / Simplex**: every message is one
//!   `[SizedEnvelope][varint(len)][payload]` frame.
//! - **Singleton**: one `[UnsizedEnvelope]` marker, then a stream of
//!   `[varint(chunk len)][chunk]` pieces terminated by a zero-length chunk.
//! - **SingletonSized**: one `[SizedEnvelope][varint(total len)]` header,
//!   then the raw body.
//!
//! All modes end the session with a single `End` record.
//!
//! The mode differences are data, not a type hierarchy: one enum plus a
//! handful of framing functions covers all four variants.
//!
//! Message-frame headers are inserted *in place*, into slack space the
//! caller reserves ahead of the payload, so the payload buffer is never
//! copied. See [`encode_message_frame`].

use crate::framing::record::record_type_name;
use crate::framing::{varint, EncodedRecord, FramingError, FramingRecordType};
use bytes::Bytes;

/// Framing protocol version announced in every preamble (1.0).
pub const PROTOCOL_VERSION: (u8, u8) = (1, 0);

/// Session modes negotiated at connection open.
///
/// The mode is fixed for the lifetime of a connection once negotiated; it
/// determines the preamble trailer and the message-frame encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SessionMode {
    /// One unsized, streamed message per connection.
    Singleton = 0x01,
    /// Bi-directional session of length-prefixed messages.
    Duplex = 0x02,
    /// One-way session of length-prefixed messages.
    Simplex = 0x03,
    /// One length-prefixed message per connection.
    SingletonSized = 0x04,
}

impl SessionMode {
    /// Returns the wire byte for this mode.
    #[must_use]
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Parses a mode byte, returning `None` for unassigned values.
    #[must_use]
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::Singleton),
            0x02 => Some(Self::Duplex),
            0x03 => Some(Self::Simplex),
            0x04 => Some(Self::SingletonSized),
            _ => None,
        }
    }

    /// Returns `true` for modes that length-prefix every message.
    #[must_use]
    pub fn is_message_framed(self) -> bool {
        matches!(self, Self::Duplex | Self::Simplex)
    }

    /// Returns the fixed five-byte mode announcement.
    ///
    /// Layout: `[Version][major][minor][Mode][mode]`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sessionwire::framing::SessionMode;
    ///
    /// assert_eq!(SessionMode::Duplex.mode_bytes(), [0x00, 0x01, 0x00, 0x01, 0x02]);
    /// ```
    #[must_use]
    pub fn mode_bytes(self) -> [u8; 5] {
        [
            FramingRecordType::Version.as_byte(),
            PROTOCOL_VERSION.0,
            PROTOCOL_VERSION.1,
            FramingRecordType::Mode.as_byte(),
            self.as_byte(),
        ]
    }

    /// Encodes the complete session preamble.
    ///
    /// Mode bytes, then the `Via` and content-type records, then the
    /// `PreambleEnd` marker. The record arguments are pre-encoded so
    /// repeated opens to the same destination reuse their byte forms.
    #[must_use]
    pub fn encode_preamble(self, via: &EncodedRecord, content_type: &EncodedRecord) -> Bytes {
        let mut out = Vec::with_capacity(5 + via.encoded_len() + content_type.encoded_len() + 1);
        out.extend_from_slice(&self.mode_bytes());
        out.extend_from_slice(via.as_bytes());
        out.extend_from_slice(content_type.as_bytes());
        out.push(FramingRecordType::PreambleEnd.as_byte());
        Bytes::from(out)
    }
}

/// Returns the slack a message-frame header needs ahead of a payload of
/// `payload_len` bytes: one record-type byte plus the varint length.
pub fn frame_header_size(payload_len: usize) -> Result<usize, FramingError> {
    Ok(1 + varint::encoded_size(payload_len as u64)?)
}

/// Inserts a `[SizedEnvelope][varint(len)]` header into the slack space
/// before a payload already resident in `buf`, without moving the payload.
///
/// The payload occupies `buf[payload_offset..payload_offset + payload_len]`
/// and the caller must have reserved at least
/// [`frame_header_size`]`(payload_len)` bytes ahead of it. Returns the
/// offset where the contiguous frame now starts.
///
/// # Errors
///
/// [`FramingError::InsufficientHeaderRoom`] when the slack is too small;
/// the buffer is untouched in that case.
///
/// # Examples
///
/// ```rust
/// use sessionwire::framing::session::encode_message_frame;
///
/// let mut buf = vec![0u8; 2 + 5];
/// buf[2..].copy_from_slice(b"hello");
/// let start = encode_message_frame(&mut buf, 2, 5).unwrap();
/// assert_eq!(start, 0);
/// assert_eq!(&buf, &[0x06, 0x05, b'h', b'e', b'l', b'l', b'o']);
/// ```
pub fn encode_message_frame(
    buf: &mut [u8],
    payload_offset: usize,
    payload_len: usize,
) -> Result<usize, FramingError> {
    let needed = frame_header_size(payload_len)?;
    if payload_offset < needed {
        return Err(FramingError::InsufficientHeaderRoom {
            needed,
            available: payload_offset,
        });
    }
    debug_assert!(payload_offset + payload_len <= buf.len());

    let start = payload_offset - needed;
    buf[start] = FramingRecordType::SizedEnvelope.as_byte();
    varint::encode(payload_len as u32, buf, start + 1)?;
    Ok(start)
}

/// Returns the one-byte `UnsizedEnvelope` marker opening a singleton body.
#[must_use]
pub fn envelope_start_bytes() -> [u8; 1] {
    [FramingRecordType::UnsizedEnvelope.as_byte()]
}

/// Encodes the varint size prefix for one chunk of a streamed singleton
/// body.
///
/// A zero-length chunk is the body terminator; see
/// [`singleton_terminator_bytes`].
pub fn encode_chunk_header(chunk_len: usize) -> Result<ChunkHeader, FramingError> {
    let mut buf = [0u8; varint::MAX_ENCODED_SIZE];
    let len = varint::encode(
        u32::try_from(chunk_len).map_err(|_| FramingError::ValueTooLarge {
            value: chunk_len as u64,
        })?,
        &mut buf,
        0,
    )?;
    Ok(ChunkHeader { buf, len })
}

/// A stack-allocated chunk size prefix.
#[derive(Debug, Clone, Copy)]
pub struct ChunkHeader {
    buf: [u8; varint::MAX_ENCODED_SIZE],
    len: usize,
}

impl ChunkHeader {
    /// Returns the encoded prefix bytes.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

/// Returns the zero-length-chunk terminator closing a streamed singleton
/// body.
#[must_use]
pub fn singleton_terminator_bytes() -> [u8; 1] {
    [0x00]
}

/// Encodes the `[SizedEnvelope][varint(total len)]` header opening a sized
/// singleton body.
pub fn encode_sized_envelope_start(body_len: usize) -> Result<Bytes, FramingError> {
    let len = u32::try_from(body_len).map_err(|_| FramingError::ValueTooLarge {
        value: body_len as u64,
    })?;
    let mut out = vec![0u8; 1 + varint::encoded_size(body_len as u64)?];
    out[0] = FramingRecordType::SizedEnvelope.as_byte();
    varint::encode(len, &mut out, 1)?;
    Ok(Bytes::from(out))
}

/// Returns the one-byte `End` record terminating a session (all modes).
#[must_use]
pub fn end_bytes() -> [u8; 1] {
    [FramingRecordType::End.as_byte()]
}

/// Returns the one-byte `PreambleAck` a listener sends to accept a
/// preamble.
#[must_use]
pub fn preamble_ack_bytes() -> [u8; 1] {
    [FramingRecordType::PreambleAck.as_byte()]
}

/// Returns the one-byte `UpgradeResponse` a listener sends to accept a
/// stream upgrade.
#[must_use]
pub fn upgrade_response_bytes() -> [u8; 1] {
    [FramingRecordType::UpgradeResponse.as_byte()]
}

/// Decodes a five-byte mode announcement, returning the session mode.
///
/// # Errors
///
/// - [`FramingError::UnexpectedRecord`] on a wrong record-type byte
/// - [`FramingError::UnsupportedVersion`] on a major version other than 1
/// - [`FramingError::UnknownMode`] on an unassigned mode byte
pub fn decode_mode_bytes(buf: &[u8]) -> Result<SessionMode, FramingError> {
    if buf.len() < 5 {
        return Err(FramingError::InsufficientBuffer {
            needed: 5,
            available: buf.len(),
        });
    }
    if buf[0] != FramingRecordType::Version.as_byte() {
        return Err(FramingError::UnexpectedRecord {
            expected: record_type_name(FramingRecordType::Version),
            found: buf[0],
        });
    }
    if buf[1] != PROTOCOL_VERSION.0 {
        return Err(FramingError::UnsupportedVersion {
            major: buf[1],
            minor: buf[2],
        });
    }
    if buf[3] != FramingRecordType::Mode.as_byte() {
        return Err(FramingError::UnexpectedRecord {
            expected: record_type_name(FramingRecordType::Mode),
            found: buf[3],
        });
    }
    SessionMode::from_byte(buf[4]).ok_or(FramingError::UnknownMode { value: buf[4] })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_byte_values() {
        assert_eq!(SessionMode::Singleton.as_byte(), 0x01);
        assert_eq!(SessionMode::Duplex.as_byte(), 0x02);
        assert_eq!(SessionMode::Simplex.as_byte(), 0x03);
        assert_eq!(SessionMode::SingletonSized.as_byte(), 0x04);
        assert!(SessionMode::from_byte(0x00).is_none());
        assert!(SessionMode::from_byte(0x05).is_none());
    }

    #[test]
    fn test_mode_bytes_layout() {
        let bytes = SessionMode::Simplex.mode_bytes();
        assert_eq!(bytes, [0x00, 0x01, 0x00, 0x01, 0x03]);
        assert_eq!(decode_mode_bytes(&bytes).unwrap(), SessionMode::Simplex);
    }

    #[test]
    fn test_decode_mode_bytes_rejects_wrong_version() {
        let buf = [0x00, 0x02, 0x00, 0x01, 0x02];
        assert!(matches!(
            decode_mode_bytes(&buf),
            Err(FramingError::UnsupportedVersion { major: 2, minor: 0 })
        ));
    }

    #[test]
    fn test_decode_mode_bytes_rejects_unknown_mode() {
        let buf = [0x00, 0x01, 0x00, 0x01, 0x09];
        assert!(matches!(
            decode_mode_bytes(&buf),
            Err(FramingError::UnknownMode { value: 0x09 })
        ));
    }

    #[test]
    fn test_preamble_layout() {
        let via = EncodedRecord::via("net.tcp://host/svc").unwrap();
        let content_type = EncodedRecord::content_type("application/soap+msbinsession1").unwrap();
        let preamble = SessionMode::Duplex.encode_preamble(&via, &content_type);

        let mut expected = Vec::new();
        expected.extend_from_slice(&[0x00, 0x01, 0x00, 0x01, 0x02]);
        expected.extend_from_slice(via.as_bytes());
        expected.extend_from_slice(&[0x03, 0x08]);
        expected.push(0x0C);
        assert_eq!(&preamble[..], &expected[..]);
    }

    #[test]
    fn test_frame_header_size_tracks_varint_width() {
        assert_eq!(frame_header_size(0).unwrap(), 2);
        assert_eq!(frame_header_size(127).unwrap(), 2);
        assert_eq!(frame_header_size(128).unwrap(), 3);
        assert_eq!(frame_header_size(16_384).unwrap(), 4);
    }

    #[test]
    fn test_message_frame_insertion_exact_slack() {
        let payload = b"payload bytes";
        let slack = frame_header_size(payload.len()).unwrap();
        let mut buf = vec![0xAAu8; slack + payload.len()];
        buf[slack..].copy_from_slice(payload);

        let start = encode_message_frame(&mut buf, slack, payload.len()).unwrap();
        assert_eq!(start, 0);
        assert_eq!(buf[0], 0x06);
        assert_eq!(buf[1], payload.len() as u8);
        assert_eq!(&buf[2..], payload);
    }

    #[test]
    fn test_message_frame_insertion_extra_slack() {
        let payload = b"abc";
        let mut buf = vec![0x55u8; 10 + payload.len()];
        buf[10..].copy_from_slice(payload);

        let start = encode_message_frame(&mut buf, 10, payload.len()).unwrap();
        assert_eq!(start, 8);
        // Slack ahead of the frame is untouched.
        assert_eq!(&buf[..8], &[0x55; 8]);
        assert_eq!(&buf[8..], &[0x06, 0x03, b'a', b'b', b'c']);
    }

    #[test]
    fn test_message_frame_insufficient_room_leaves_buffer_untouched() {
        let mut buf = vec![0x77u8; 1 + 4];
        buf[1..].copy_from_slice(b"data");
        let before = buf.clone();

        let err = encode_message_frame(&mut buf, 1, 4).unwrap_err();
        assert!(matches!(
            err,
            FramingError::InsufficientHeaderRoom {
                needed: 2,
                available: 1
            }
        ));
        assert_eq!(buf, before);
    }

    #[test]
    fn test_singleton_chunk_framing() {
        assert_eq!(envelope_start_bytes(), [0x05]);
        assert_eq!(encode_chunk_header(5).unwrap().as_slice(), &[0x05]);
        assert_eq!(encode_chunk_header(300).unwrap().as_slice(), &[0xAC, 0x02]);
        assert_eq!(singleton_terminator_bytes(), [0x00]);
        assert_eq!(end_bytes(), [0x07]);
    }

    #[test]
    fn test_sized_envelope_start() {
        let header = encode_sized_envelope_start(300).unwrap();
        assert_eq!(&header[..], &[0x06, 0xAC, 0x02]);
    }

    #[test]
    fn test_is_message_framed() {
        assert!(SessionMode::Duplex.is_message_framed());
        assert!(SessionMode::Simplex.is_message_framed());
        assert!(!SessionMode::Singleton.is_message_framed());
        assert!(!SessionMode::SingletonSized.is_message_framed());
    }
}
