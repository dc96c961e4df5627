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

//! Framing records: the binary control vocabulary of the session protocol.
//!
//! Every unit on the wire is a record. Marker records are a single
//! record-type byte; string records carry a UTF-8 payload as
//! `[type][varint(byte length)][utf8 bytes]`; the known-encoding record
//! compresses nine well-known content-type strings to a single byte.
//!
//! Record-type byte values are a wire contract shared with deployed peers
//! and must never be renumbered.
//!
//! String records are encoded once at construction and reused; equality and
//! hashing of [`EncodedRecord`]s are defined over the encoded bytes only,
//! which lets content-type tables compare pre-encoded records without
//! string comparison.

use crate::framing::{varint, FramingError};
use bytes::Bytes;
use std::hash::{Hash, Hasher};

/// Record-type bytes of the framing protocol.
///
/// The numeric values are fixed wire constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FramingRecordType {
    /// Protocol version announcement: `[0x00][major][minor]`
    Version = 0x00,
    /// Session mode announcement: `[0x01][mode]`
    Mode = 0x01,
    /// Destination URI string record
    Via = 0x02,
    /// Well-known content type: `[0x03][encoding]`
    KnownEncoding = 0x03,
    /// Arbitrary content-type string record
    ExtensibleEncoding = 0x04,
    /// Start of a streamed (unsized) message body
    UnsizedEnvelope = 0x05,
    /// Start of a length-prefixed message body
    SizedEnvelope = 0x06,
    /// End of session
    End = 0x07,
    /// Fault string record sent when a preamble is rejected
    Fault = 0x08,
    /// Stream-upgrade request string record
    UpgradeRequest = 0x09,
    /// Stream-upgrade acceptance marker
    UpgradeResponse = 0x0A,
    /// Preamble acceptance marker sent by the listener
    PreambleAck = 0x0B,
    /// End-of-preamble marker sent by the initiator
    PreambleEnd = 0x0C,
}

impl FramingRecordType {
    /// Returns the wire byte for this record type.
    #[must_use]
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Parses a record-type byte, returning `None` for unassigned values.
    #[must_use]
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Version),
            0x01 => Some(Self::Mode),
            0x02 => Some(Self::Via),
            0x03 => Some(Self::KnownEncoding),
            0x04 => Some(Self::ExtensibleEncoding),
            0x05 => Some(Self::UnsizedEnvelope),
            0x06 => Some(Self::SizedEnvelope),
            0x07 => Some(Self::End),
            0x08 => Some(Self::Fault),
            0x09 => Some(Self::UpgradeRequest),
            0x0A => Some(Self::UpgradeResponse),
            0x0B => Some(Self::PreambleAck),
            0x0C => Some(Self::PreambleEnd),
            _ => None,
        }
    }
}

/// The nine well-known content types with single-byte encodings.
///
/// Any other content-type string travels as an
/// [`ExtensibleEncoding`](FramingRecordType::ExtensibleEncoding) record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum KnownEncoding {
    /// `text/xml; charset=utf-8`
    Soap11Utf8 = 0x00,
    /// `text/xml; charset=utf-16`
    Soap11Utf16 = 0x01,
    /// `text/xml; charset=unicodeFFFE`
    Soap11Utf16Le = 0x02,
    /// `application/soap+xml; charset=utf-8`
    Soap12Utf8 = 0x03,
    /// `application/soap+xml; charset=utf-16`
    Soap12Utf16 = 0x04,
    /// `application/soap+xml; charset=unicodeFFFE`
    Soap12Utf16Le = 0x05,
    /// `multipart/related`
    Mtom = 0x06,
    /// `application/soap+msbin1`
    Binary = 0x07,
    /// `application/soap+msbinsession1`
    BinarySession = 0x08,
}

impl KnownEncoding {
    /// Returns the wire byte for this encoding.
    #[must_use]
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Parses an encoding byte, returning `None` for unassigned values.
    #[must_use]
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Soap11Utf8),
            0x01 => Some(Self::Soap11Utf16),
            0x02 => Some(Self::Soap11Utf16Le),
            0x03 => Some(Self::Soap12Utf8),
            0x04 => Some(Self::Soap12Utf16),
            0x05 => Some(Self::Soap12Utf16Le),
            0x06 => Some(Self::Mtom),
            0x07 => Some(Self::Binary),
            0x08 => Some(Self::BinarySession),
            _ => None,
        }
    }

    /// Returns the MIME-like string this byte stands for.
    #[must_use]
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Soap11Utf8 => "text/xml; charset=utf-8",
            Self::Soap11Utf16 => "text/xml; charset=utf-16",
            Self::Soap11Utf16Le => "text/xml; charset=unicodeFFFE",
            Self::Soap12Utf8 => "application/soap+xml; charset=utf-8",
            Self::Soap12Utf16 => "application/soap+xml; charset=utf-16",
            Self::Soap12Utf16Le => "application/soap+xml; charset=unicodeFFFE",
            Self::Mtom => "multipart/related",
            Self::Binary => "application/soap+msbin1",
            Self::BinarySession => "application/soap+msbinsession1",
        }
    }

    /// Looks up the single-byte form of a content-type string.
    ///
    /// Unrecognized strings return `None`; they are not an error, the
    /// caller falls back to an extensible string record.
    #[must_use]
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        match content_type {
            "text/xml; charset=utf-8" => Some(Self::Soap11Utf8),
            "text/xml; charset=utf-16" => Some(Self::Soap11Utf16),
            "text/xml; charset=unicodeFFFE" => Some(Self::Soap11Utf16Le),
            "application/soap+xml; charset=utf-8" => Some(Self::Soap12Utf8),
            "application/soap+xml; charset=utf-16" => Some(Self::Soap12Utf16),
            "application/soap+xml; charset=unicodeFFFE" => Some(Self::Soap12Utf16Le),
            "multipart/related" => Some(Self::Mtom),
            "application/soap+msbin1" => Some(Self::Binary),
            "application/soap+msbinsession1" => Some(Self::BinarySession),
            _ => None,
        }
    }
}

/// An immutable, pre-encoded framing record.
///
/// Records are encoded once at construction and the byte form is reused for
/// every send (encode-once, reuse-many). Equality is byte-for-byte over the
/// encoded form; the hash folds the first, middle, and last encoded bytes.
/// That hash is intentionally shallow: it matches the lookup behavior of
/// deployed peers, so tables of pre-encoded known content types can be
/// probed without string comparison.
///
/// # Examples
///
/// ```rust
/// use sessionwire::framing::EncodedRecord;
///
/// let a = EncodedRecord::content_type("application/soap+msbin1").unwrap();
/// let b = EncodedRecord::content_type("application/soap+msbin1").unwrap();
/// let c = EncodedRecord::content_type("application/soap+msbinsession1").unwrap();
/// assert_eq!(a, b);
/// assert_ne!(a, c);
/// ```
#[derive(Debug, Clone)]
pub struct EncodedRecord {
    record_type: FramingRecordType,
    bytes: Bytes,
}

impl EncodedRecord {
    /// Builds a generic string record: `[type][varint len][utf8]`.
    ///
    /// # Errors
    ///
    /// [`FramingError::ValueTooLarge`] if the UTF-8 byte length exceeds
    /// 2^31-1.
    pub fn string_record(
        record_type: FramingRecordType,
        value: &str,
    ) -> Result<Self, FramingError> {
        let payload = value.as_bytes();
        let len_size = varint::encoded_size(payload.len() as u64)?;

        let mut encoded = Vec::with_capacity(1 + len_size + payload.len());
        encoded.push(record_type.as_byte());
        encoded.resize(1 + len_size, 0);
        varint::encode(payload.len() as u32, &mut encoded, 1)?;
        encoded.extend_from_slice(payload);

        Ok(Self {
            record_type,
            bytes: Bytes::from(encoded),
        })
    }

    /// Builds a `Via` record carrying the destination URI.
    pub fn via(uri: &str) -> Result<Self, FramingError> {
        Self::string_record(FramingRecordType::Via, uri)
    }

    /// Builds an `UpgradeRequest` record naming the upgrade protocol.
    pub fn upgrade_request(protocol: &str) -> Result<Self, FramingError> {
        Self::string_record(FramingRecordType::UpgradeRequest, protocol)
    }

    /// Builds a `Fault` record carrying the fault code string.
    pub fn fault(code: &str) -> Result<Self, FramingError> {
        Self::string_record(FramingRecordType::Fault, code)
    }

    /// Builds the record for a content-type string.
    ///
    /// The nine well-known strings compress to a two-byte
    /// `KnownEncoding` record; everything else becomes an
    /// `ExtensibleEncoding` string record. Unrecognized input is never an
    /// error.
    pub fn content_type(content_type: &str) -> Result<Self, FramingError> {
        match KnownEncoding::from_content_type(content_type) {
            Some(encoding) => Ok(Self::known_encoding(encoding)),
            None => Self::string_record(FramingRecordType::ExtensibleEncoding, content_type),
        }
    }

    /// Builds a two-byte `KnownEncoding` record.
    #[must_use]
    pub fn known_encoding(encoding: KnownEncoding) -> Self {
        Self {
            record_type: FramingRecordType::KnownEncoding,
            bytes: Bytes::copy_from_slice(&[
                FramingRecordType::KnownEncoding.as_byte(),
                encoding.as_byte(),
            ]),
        }
    }

    /// Returns the record type this record encodes.
    #[must_use]
    pub fn record_type(&self) -> FramingRecordType {
        self.record_type
    }

    /// Returns the full encoded byte form, including the type byte.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Returns the encoded length in bytes.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        self.bytes.len()
    }
}

impl PartialEq for EncodedRecord {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for EncodedRecord {}

impl Hash for EncodedRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // First, middle, and last encoded byte only. This mirrors the
        // deployed lookup tables of pre-encoded content types; the encoded
        // forms it distinguishes are the ones that matter there.
        let bytes = &self.bytes;
        if let (Some(first), Some(last)) = (bytes.first(), bytes.last()) {
            state.write_u8(*first);
            state.write_u8(bytes[bytes.len() / 2]);
            state.write_u8(*last);
        }
    }
}

/// Decodes one string record of the expected type from the front of `buf`.
///
/// Returns the decoded string and the number of bytes consumed.
///
/// # Errors
///
/// - [`FramingError::UnexpectedRecord`] if the type byte differs from
///   `expected`
/// - [`FramingError::InvalidVarint`] / [`FramingError::InvalidUtf8`] on a
///   corrupt payload
/// - [`FramingError::InsufficientBuffer`] if the record is truncated
pub fn decode_string_record(
    buf: &[u8],
    expected: FramingRecordType,
) -> Result<(String, usize), FramingError> {
    let type_byte = *buf.first().ok_or(FramingError::InsufficientBuffer {
        needed: 1,
        available: 0,
    })?;
    if type_byte != expected.as_byte() {
        return Err(FramingError::UnexpectedRecord {
            expected: record_type_name(expected),
            found: type_byte,
        });
    }

    let (len, len_size) = varint::decode(&buf[1..])?;
    let start = 1 + len_size;
    let end = start + len as usize;
    if buf.len() < end {
        return Err(FramingError::InsufficientBuffer {
            needed: end,
            available: buf.len(),
        });
    }

    let value = std::str::from_utf8(&buf[start..end])
        .map_err(|_| FramingError::InvalidUtf8)?
        .to_owned();
    Ok((value, end))
}

pub(crate) fn record_type_name(record_type: FramingRecordType) -> &'static str {
    match record_type {
        FramingRecordType::Version => "Version",
        FramingRecordType::Mode => "Mode",
        FramingRecordType::Via => "Via",
        FramingRecordType::KnownEncoding => "KnownEncoding",
        FramingRecordType::ExtensibleEncoding => "ExtensibleEncoding",
        FramingRecordType::UnsizedEnvelope => "UnsizedEnvelope",
        FramingRecordType::SizedEnvelope => "SizedEnvelope",
        FramingRecordType::End => "End",
        FramingRecordType::Fault => "Fault",
        FramingRecordType::UpgradeRequest => "UpgradeRequest",
        FramingRecordType::UpgradeResponse => "UpgradeResponse",
        FramingRecordType::PreambleAck => "PreambleAck",
        FramingRecordType::PreambleEnd => "PreambleEnd",
    }
}
