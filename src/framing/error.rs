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

//! Framing layer error types.
//!
//! Framing errors fall into two categories with very different consequences:
//!
//! - **Protocol violations** (malformed varint, out-of-order record,
//!   unsupported version): the byte stream is corrupt or the peer is not
//!   speaking this protocol. The session must be faulted; retrying on the
//!   same connection is never valid.
//! - **Caller contract violations** (undersized buffer, insufficient header
//!   slack, over-range length): programmer errors surfaced as descriptive
//!   range errors. They say nothing about the connection itself.
//!
//! [`FramingError::should_fault_session`] distinguishes the two.

use thiserror::Error;

/// Errors produced while encoding or decoding framing records.
#[derive(Debug, Error)]
pub enum FramingError {
    /// A varint on the wire was malformed.
    ///
    /// Either a sixth continuation byte was seen, or the decoded value
    /// exceeded the protocol's 2^31-1 ceiling. The stream is corrupt.
    #[error("malformed varint: {reason}")]
    InvalidVarint {
        /// Description of the violation
        reason: &'static str,
    },

    /// A length or value was too large to encode.
    ///
    /// The framing protocol caps all encoded integers at 2^31-1. This is a
    /// caller error, not a wire error.
    #[error("value {value} exceeds the maximum encodable size of 2^31-1")]
    ValueTooLarge {
        /// The offending value
        value: u64,
    },

    /// The destination buffer was too small for the requested encode.
    #[error("buffer too small: needed {needed} bytes, only {available} available")]
    InsufficientBuffer {
        /// Bytes the encode requires
        needed: usize,
        /// Bytes the caller provided
        available: usize,
    },

    /// Not enough slack before the payload to insert a message-frame header.
    ///
    /// Callers of in-place frame insertion must reserve
    /// `1 + varint::encoded_size(payload_len)` bytes ahead of the payload.
    #[error("insufficient header room for frame insertion: needed {needed} bytes before the payload, only {available} available")]
    InsufficientHeaderRoom {
        /// Bytes of slack the frame header requires
        needed: usize,
        /// Bytes of slack actually present
        available: usize,
    },

    /// A record type appeared where the protocol does not allow it.
    #[error("unexpected record 0x{found:02X} while expecting {expected}")]
    UnexpectedRecord {
        /// What the decoder was waiting for
        expected: &'static str,
        /// The record-type byte actually read
        found: u8,
    },

    /// The peer announced a framing version this implementation cannot speak.
    #[error("unsupported framing version {major}.{minor}")]
    UnsupportedVersion {
        /// Major version from the wire
        major: u8,
        /// Minor version from the wire
        minor: u8,
    },

    /// The mode byte named no known session mode.
    #[error("unknown session mode 0x{value:02X}")]
    UnknownMode {
        /// The mode byte actually read
        value: u8,
    },

    /// The known-encoding byte named no known content type.
    #[error("unknown content-type encoding 0x{value:02X}")]
    UnknownEncoding {
        /// The encoding byte actually read
        value: u8,
    },

    /// A string record exceeded its negotiated size quota.
    #[error("{kind} record of {actual} bytes exceeds the quota of {quota} bytes")]
    QuotaExceeded {
        /// Which record kind hit the quota
        kind: &'static str,
        /// The configured quota
        quota: usize,
        /// The announced size
        actual: usize,
    },

    /// A string record payload was not valid UTF-8.
    #[error("string record payload is not valid UTF-8")]
    InvalidUtf8,
}

impl FramingError {
    /// Returns `true` if this error means the session is unrecoverable.
    ///
    /// Protocol violations fault the session: the stream position is lost
    /// and no further records can be trusted. Caller contract violations
    /// (`ValueTooLarge`, `InsufficientBuffer`, `InsufficientHeaderRoom`)
    /// never touched the wire and leave the session intact.
    pub fn should_fault_session(&self) -> bool {
        !matches!(
            self,
            FramingError::ValueTooLarge { .. }
                | FramingError::InsufficientBuffer { .. }
                | FramingError::InsufficientHeaderRoom { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_violations_fault_session() {
        assert!(FramingError::InvalidVarint { reason: "x" }.should_fault_session());
        assert!(FramingError::UnexpectedRecord {
            expected: "Via",
            found: 0x42
        }
        .should_fault_session());
        assert!(FramingError::UnsupportedVersion { major: 2, minor: 0 }.should_fault_session());
        assert!(FramingError::UnknownMode { value: 0x09 }.should_fault_session());
        assert!(FramingError::InvalidUtf8.should_fault_session());
        assert!(FramingError::QuotaExceeded {
            kind: "via",
            quota: 10,
            actual: 11
        }
        .should_fault_session());
    }

    #[test]
    fn test_contract_violations_do_not_fault_session() {
        assert!(!FramingError::ValueTooLarge { value: u64::MAX }.should_fault_session());
        assert!(!FramingError::InsufficientBuffer {
            needed: 5,
            available: 2
        }
        .should_fault_session());
        assert!(!FramingError::InsufficientHeaderRoom {
            needed: 3,
            available: 0
        }
        .should_fault_session());
    }
}
