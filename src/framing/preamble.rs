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

//! Server-side preamble handshake decoding.
//!
//! A listener reads `Version → Mode → Via → ContentType` and then either a
//! `PreambleEnd` (accept the session) or an `UpgradeRequest` (hand the
//! stream to a security/stream upgrade; the upgrade itself happens a layer
//! above this one). Any other record, a bad version, or a string record
//! over quota faults the handshake.
//!
//! The decoder is push-based and performs no I/O: feed it whatever bytes
//! arrived and it consumes up to the preamble boundary, leaving any message
//! bytes that followed unconsumed for the caller.
//!
//! When a listener rejects a preamble it must not simply close: it writes a
//! `Fault` record and then drains the remaining inbound bytes up to a
//! quota before closing, so the peer reads the fault instead of a
//! connection reset mid-handshake. See [`send_fault_and_drain`].

use crate::connection::{Connection, ConnectionError};
use crate::framing::record::record_type_name;
use crate::framing::{
    EncodedRecord, FramingError, FramingRecordType, KnownEncoding, SessionMode, VarintDecoder,
    PROTOCOL_VERSION,
};
use std::time::Duration;
use tracing::debug;

/// Size quotas applied to preamble string records.
///
/// Quotas bound the memory a malicious or broken peer can demand before
/// the session is even accepted.
#[derive(Debug, Clone, Copy)]
pub struct PreambleQuotas {
    /// Maximum encoded byte length of the `Via` URI.
    pub max_via_size: usize,
    /// Maximum encoded byte length of an extensible content-type string.
    pub max_content_type_size: usize,
}

impl Default for PreambleQuotas {
    fn default() -> Self {
        Self {
            max_via_size: 2048,
            max_content_type_size: 256,
        }
    }
}

/// Default byte quota for [`send_fault_and_drain`] (64 KiB).
pub const DEFAULT_DRAIN_QUOTA: usize = 64 * 1024;

/// Content type negotiated by a preamble.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreambleContentType {
    /// One of the nine well-known encodings.
    Known(KnownEncoding),
    /// An arbitrary content-type string.
    Extensible(String),
}

impl PreambleContentType {
    /// Returns the content-type string, resolving known encodings.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Known(encoding) => encoding.content_type(),
            Self::Extensible(value) => value,
        }
    }
}

/// A fully decoded session preamble.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerPreamble {
    /// Negotiated session mode.
    pub mode: SessionMode,
    /// Destination URI from the `Via` record.
    pub via: String,
    /// Negotiated content type.
    pub content_type: PreambleContentType,
}

/// Terminal outcome of a preamble decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreambleOutcome {
    /// `PreambleEnd` was read; the session is ready for message frames
    /// once the listener answers with `PreambleAck`.
    Accepted(ServerPreamble),
    /// An `UpgradeRequest` was read; the layer above performs the upgrade
    /// and resumes the handshake afterwards.
    UpgradeRequested {
        /// The preamble decoded so far.
        preamble: ServerPreamble,
        /// The requested upgrade protocol.
        protocol: String,
    },
}

#[derive(Debug)]
enum DecodeState {
    VersionRecordType,
    VersionMajor,
    VersionMinor { major: u8 },
    ModeRecordType,
    ModeValue,
    ViaRecordType,
    ViaLength,
    ViaBytes { remaining: usize },
    ContentTypeRecordType,
    KnownEncodingValue,
    ExtensibleLength,
    ExtensibleBytes { remaining: usize },
    Trailer,
    UpgradeLength,
    UpgradeBytes { remaining: usize },
    Done,
    Faulted,
}

/// Incremental decoder for the server preamble handshake.
///
/// # Examples
///
/// ```rust
/// use sessionwire::framing::{
///     EncodedRecord, PreambleDecoder, PreambleOutcome, PreambleQuotas, SessionMode,
/// };
///
/// let via = EncodedRecord::via("net.tcp://host/svc").unwrap();
/// let ct = EncodedRecord::content_type("application/soap+msbin1").unwrap();
/// let wire = SessionMode::Duplex.encode_preamble(&via, &ct);
///
/// let mut decoder = PreambleDecoder::new(PreambleQuotas::default());
/// let (consumed, outcome) = decoder.feed(&wire).unwrap();
/// assert_eq!(consumed, wire.len());
/// let Some(PreambleOutcome::Accepted(preamble)) = outcome else { panic!() };
/// assert_eq!(preamble.mode, SessionMode::Duplex);
/// assert_eq!(preamble.via, "net.tcp://host/svc");
/// ```
#[derive(Debug)]
pub struct PreambleDecoder {
    state: DecodeState,
    quotas: PreambleQuotas,
    varint: VarintDecoder,
    string_buf: Vec<u8>,
    mode: Option<SessionMode>,
    via: Option<String>,
    content_type: Option<PreambleContentType>,
}

impl PreambleDecoder {
    /// Creates a decoder enforcing the given quotas.
    #[must_use]
    pub fn new(quotas: PreambleQuotas) -> Self {
        Self {
            state: DecodeState::VersionRecordType,
            quotas,
            varint: VarintDecoder::new(),
            string_buf: Vec::new(),
            mode: None,
            via: None,
            content_type: None,
        }
    }

    /// Feeds inbound bytes, returning how many were consumed and the
    /// outcome once the preamble boundary is reached.
    ///
    /// Bytes past the boundary are left unconsumed. A decoder that has
    /// yielded an outcome or faulted rejects further input.
    ///
    /// # Errors
    ///
    /// Any [`FramingError`] faults the handshake; the connection should be
    /// rejected with a `Fault` record and drained.
    pub fn feed(&mut self, input: &[u8]) -> Result<(usize, Option<PreambleOutcome>), FramingError> {
        let mut consumed = 0;
        for &byte in input {
            if matches!(self.state, DecodeState::Done) {
                break;
            }
            match self.push_byte(byte) {
                Ok(outcome) => {
                    consumed += 1;
                    if outcome.is_some() {
                        return Ok((consumed, outcome));
                    }
                }
                Err(error) => {
                    self.state = DecodeState::Faulted;
                    return Err(error);
                }
            }
        }
        Ok((consumed, None))
    }

    fn push_byte(&mut self, byte: u8) -> Result<Option<PreambleOutcome>, FramingError> {
        match self.state {
            DecodeState::VersionRecordType => {
                expect_record(byte, FramingRecordType::Version)?;
                self.state = DecodeState::VersionMajor;
            }
            DecodeState::VersionMajor => {
                self.state = DecodeState::VersionMinor { major: byte };
            }
            DecodeState::VersionMinor { major } => {
                // Minor-version differences are tolerated; the major must
                // match exactly.
                if major != PROTOCOL_VERSION.0 {
                    return Err(FramingError::UnsupportedVersion { major, minor: byte });
                }
                self.state = DecodeState::ModeRecordType;
            }
            DecodeState::ModeRecordType => {
                expect_record(byte, FramingRecordType::Mode)?;
                self.state = DecodeState::ModeValue;
            }
            DecodeState::ModeValue => {
                let mode =
                    SessionMode::from_byte(byte).ok_or(FramingError::UnknownMode { value: byte })?;
                self.mode = Some(mode);
                self.state = DecodeState::ViaRecordType;
            }
            DecodeState::ViaRecordType => {
                expect_record(byte, FramingRecordType::Via)?;
                self.varint.reset();
                self.state = DecodeState::ViaLength;
            }
            DecodeState::ViaLength => {
                if let Some(len) = self.varint.push(byte)? {
                    let len = len as usize;
                    if len > self.quotas.max_via_size {
                        return Err(FramingError::QuotaExceeded {
                            kind: "via",
                            quota: self.quotas.max_via_size,
                            actual: len,
                        });
                    }
                    self.begin_string(len);
                    if len == 0 {
                        self.via = Some(String::new());
                        self.state = DecodeState::ContentTypeRecordType;
                    } else {
                        self.state = DecodeState::ViaBytes { remaining: len };
                    }
                }
            }
            DecodeState::ViaBytes { remaining } => {
                self.string_buf.push(byte);
                if remaining == 1 {
                    self.via = Some(self.take_string()?);
                    self.state = DecodeState::ContentTypeRecordType;
                } else {
                    self.state = DecodeState::ViaBytes {
                        remaining: remaining - 1,
                    };
                }
            }
            DecodeState::ContentTypeRecordType => match FramingRecordType::from_byte(byte) {
                Some(FramingRecordType::KnownEncoding) => {
                    self.state = DecodeState::KnownEncodingValue;
                }
                Some(FramingRecordType::ExtensibleEncoding) => {
                    self.varint.reset();
                    self.state = DecodeState::ExtensibleLength;
                }
                _ => {
                    return Err(FramingError::UnexpectedRecord {
                        expected: "KnownEncoding or ExtensibleEncoding",
                        found: byte,
                    });
                }
            },
            DecodeState::KnownEncodingValue => {
                let encoding = KnownEncoding::from_byte(byte)
                    .ok_or(FramingError::UnknownEncoding { value: byte })?;
                self.content_type = Some(PreambleContentType::Known(encoding));
                self.state = DecodeState::Trailer;
            }
            DecodeState::ExtensibleLength => {
                if let Some(len) = self.varint.push(byte)? {
                    let len = len as usize;
                    if len > self.quotas.max_content_type_size {
                        return Err(FramingError::QuotaExceeded {
                            kind: "content-type",
                            quota: self.quotas.max_content_type_size,
                            actual: len,
                        });
                    }
                    self.begin_string(len);
                    if len == 0 {
                        self.content_type = Some(PreambleContentType::Extensible(String::new()));
                        self.state = DecodeState::Trailer;
                    } else {
                        self.state = DecodeState::ExtensibleBytes { remaining: len };
                    }
                }
            }
            DecodeState::ExtensibleBytes { remaining } => {
                self.string_buf.push(byte);
                if remaining == 1 {
                    let value = self.take_string()?;
                    self.content_type = Some(PreambleContentType::Extensible(value));
                    self.state = DecodeState::Trailer;
                } else {
                    self.state = DecodeState::ExtensibleBytes {
                        remaining: remaining - 1,
                    };
                }
            }
            DecodeState::Trailer => match FramingRecordType::from_byte(byte) {
                Some(FramingRecordType::PreambleEnd) => {
                    self.state = DecodeState::Done;
                    return Ok(Some(PreambleOutcome::Accepted(self.finish())));
                }
                Some(FramingRecordType::UpgradeRequest) => {
                    self.varint.reset();
                    self.state = DecodeState::UpgradeLength;
                }
                _ => {
                    return Err(FramingError::UnexpectedRecord {
                        expected: "PreambleEnd or UpgradeRequest",
                        found: byte,
                    });
                }
            },
            DecodeState::UpgradeLength => {
                if let Some(len) = self.varint.push(byte)? {
                    let len = len as usize;
                    if len > self.quotas.max_content_type_size {
                        return Err(FramingError::QuotaExceeded {
                            kind: "upgrade",
                            quota: self.quotas.max_content_type_size,
                            actual: len,
                        });
                    }
                    self.begin_string(len);
                    if len == 0 {
                        self.state = DecodeState::Done;
                        return Ok(Some(PreambleOutcome::UpgradeRequested {
                            preamble: self.finish(),
                            protocol: String::new(),
                        }));
                    }
                    self.state = DecodeState::UpgradeBytes { remaining: len };
                }
            }
            DecodeState::UpgradeBytes { remaining } => {
                self.string_buf.push(byte);
                if remaining == 1 {
                    let protocol = self.take_string()?;
                    self.state = DecodeState::Done;
                    return Ok(Some(PreambleOutcome::UpgradeRequested {
                        preamble: self.finish(),
                        protocol,
                    }));
                }
                self.state = DecodeState::UpgradeBytes {
                    remaining: remaining - 1,
                };
            }
            DecodeState::Done | DecodeState::Faulted => {
                return Err(FramingError::UnexpectedRecord {
                    expected: "no further preamble input",
                    found: byte,
                });
            }
        }
        Ok(None)
    }

    fn begin_string(&mut self, len: usize) {
        self.string_buf.clear();
        self.string_buf.reserve(len);
    }

    fn take_string(&mut self) -> Result<String, FramingError> {
        String::from_utf8(std::mem::take(&mut self.string_buf))
            .map_err(|_| FramingError::InvalidUtf8)
    }

    fn finish(&self) -> ServerPreamble {
        // All three fields are set before any terminal transition.
        ServerPreamble {
            mode: self.mode.expect("mode decoded"),
            via: self.via.clone().expect("via decoded"),
            content_type: self.content_type.clone().expect("content type decoded"),
        }
    }
}

fn expect_record(byte: u8, expected: FramingRecordType) -> Result<(), FramingError> {
    if byte == expected.as_byte() {
        Ok(())
    } else {
        Err(FramingError::UnexpectedRecord {
            expected: record_type_name(expected),
            found: byte,
        })
    }
}

/// Rejects a preamble: writes `fault` and drains inbound bytes before the
/// caller closes the connection.
///
/// The drain reads and discards up to `drain_quota` bytes, stopping early
/// on EOF or a read timeout. Draining lets the peer's pending preamble
/// bytes leave its send buffer so it observes the fault record rather than
/// a reset. The fault write and the whole drain share `timeout`.
///
/// # Errors
///
/// Write failures propagate; read timeouts during the drain do not (the
/// drain is best-effort by design).
pub async fn send_fault_and_drain<C: Connection>(
    conn: &mut C,
    fault: &EncodedRecord,
    drain_quota: usize,
    timeout: Duration,
) -> Result<(), ConnectionError> {
    debug_assert_eq!(fault.record_type(), FramingRecordType::Fault);
    conn.write(fault.as_bytes(), true, timeout).await?;

    let mut scratch = [0u8; 256];
    let mut drained = 0;
    while drained < drain_quota {
        let want = scratch.len().min(drain_quota - drained);
        match conn.read(&mut scratch[..want], timeout).await {
            Ok(0) => break,
            Ok(n) => drained += n,
            Err(error) if error.is_timeout() => break,
            Err(error) => return Err(error),
        }
    }
    debug!(drained, quota = drain_quota, "drained rejected preamble");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::EncodedRecord;

    fn duplex_preamble_bytes(via: &str, content_type: &str) -> Vec<u8> {
        let via = EncodedRecord::via(via).unwrap();
        let ct = EncodedRecord::content_type(content_type).unwrap();
        SessionMode::Duplex.encode_preamble(&via, &ct).to_vec()
    }

    #[test]
    fn test_accept_path() {
        let wire = duplex_preamble_bytes("net.tcp://host/svc", "application/soap+msbinsession1");
        let mut decoder = PreambleDecoder::new(PreambleQuotas::default());
        let (consumed, outcome) = decoder.feed(&wire).unwrap();
        assert_eq!(consumed, wire.len());

        let Some(PreambleOutcome::Accepted(preamble)) = outcome else {
            panic!("expected accepted preamble, got {outcome:?}");
        };
        assert_eq!(preamble.mode, SessionMode::Duplex);
        assert_eq!(preamble.via, "net.tcp://host/svc");
        assert_eq!(
            preamble.content_type,
            PreambleContentType::Known(KnownEncoding::BinarySession)
        );
    }

    #[test]
    fn test_accept_path_byte_at_a_time() {
        let wire = duplex_preamble_bytes("net.tcp://host/svc", "application/x-custom");
        let mut decoder = PreambleDecoder::new(PreambleQuotas::default());

        let mut outcome = None;
        for &byte in &wire {
            let (consumed, result) = decoder.feed(&[byte]).unwrap();
            assert_eq!(consumed, 1);
            if result.is_some() {
                outcome = result;
            }
        }
        let Some(PreambleOutcome::Accepted(preamble)) = outcome else {
            panic!("expected accepted preamble");
        };
        assert_eq!(
            preamble.content_type,
            PreambleContentType::Extensible("application/x-custom".to_string())
        );
    }

    #[test]
    fn test_trailing_bytes_left_unconsumed() {
        let mut wire = duplex_preamble_bytes("net.tcp://host/svc", "application/soap+msbin1");
        let preamble_len = wire.len();
        wire.extend_from_slice(&[0x06, 0x03, 1, 2, 3]); // first message frame

        let mut decoder = PreambleDecoder::new(PreambleQuotas::default());
        let (consumed, outcome) = decoder.feed(&wire).unwrap();
        assert_eq!(consumed, preamble_len);
        assert!(matches!(outcome, Some(PreambleOutcome::Accepted(_))));
    }

    #[test]
    fn test_upgrade_path() {
        let via = EncodedRecord::via("net.tcp://host/svc").unwrap();
        let ct = EncodedRecord::content_type("application/soap+msbin1").unwrap();
        let upgrade = EncodedRecord::upgrade_request("application/negotiate").unwrap();

        let mut wire = Vec::new();
        wire.extend_from_slice(&SessionMode::Duplex.mode_bytes());
        wire.extend_from_slice(via.as_bytes());
        wire.extend_from_slice(ct.as_bytes());
        wire.extend_from_slice(upgrade.as_bytes());

        let mut decoder = PreambleDecoder::new(PreambleQuotas::default());
        let (consumed, outcome) = decoder.feed(&wire).unwrap();
        assert_eq!(consumed, wire.len());

        let Some(PreambleOutcome::UpgradeRequested { preamble, protocol }) = outcome else {
            panic!("expected upgrade request");
        };
        assert_eq!(protocol, "application/negotiate");
        assert_eq!(preamble.via, "net.tcp://host/svc");
    }

    #[test]
    fn test_wrong_version_faults() {
        let mut wire = duplex_preamble_bytes("net.tcp://h/s", "application/soap+msbin1");
        wire[1] = 0x02;
        let mut decoder = PreambleDecoder::new(PreambleQuotas::default());
        assert!(matches!(
            decoder.feed(&wire),
            Err(FramingError::UnsupportedVersion { major: 2, .. })
        ));

        // A faulted decoder refuses further input.
        assert!(decoder.feed(&[0x00]).is_err());
    }

    #[test]
    fn test_out_of_order_record_faults() {
        // Mode record where the Via record belongs.
        let mut wire = Vec::new();
        wire.extend_from_slice(&SessionMode::Duplex.mode_bytes());
        wire.push(0x01);
        let mut decoder = PreambleDecoder::new(PreambleQuotas::default());
        assert!(matches!(
            decoder.feed(&wire),
            Err(FramingError::UnexpectedRecord { found: 0x01, .. })
        ));
    }

    #[test]
    fn test_via_quota_enforced() {
        let long_via = format!("net.tcp://host/{}", "x".repeat(64));
        let wire = duplex_preamble_bytes(&long_via, "application/soap+msbin1");
        let quotas = PreambleQuotas {
            max_via_size: 32,
            max_content_type_size: 256,
        };
        let mut decoder = PreambleDecoder::new(quotas);
        assert!(matches!(
            decoder.feed(&wire),
            Err(FramingError::QuotaExceeded { kind: "via", .. })
        ));
    }

    #[test]
    fn test_unknown_encoding_byte_faults() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&SessionMode::Simplex.mode_bytes());
        wire.extend_from_slice(EncodedRecord::via("net.tcp://h/s").unwrap().as_bytes());
        wire.extend_from_slice(&[0x03, 0x30]);
        let mut decoder = PreambleDecoder::new(PreambleQuotas::default());
        assert!(matches!(
            decoder.feed(&wire),
            Err(FramingError::UnknownEncoding { value: 0x30 })
        ));
    }
}
