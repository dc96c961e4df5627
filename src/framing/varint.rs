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

//! Variable-length integer encoding used throughout the framing protocol.
//!
//! Non-negative integers up to 2^31-1 are encoded in 1-5 bytes. Byte `i`
//! carries the low 7 bits of `value >> (7 * i)`; bit 7 (the continuation
//! bit) is set on every byte except the last.
//!
//! ```text
//! 0          -> 00
//! 127        -> 7F
//! 128        -> 80 01
//! 16384      -> 80 80 01
//! 2^31-1     -> FF FF FF FF 07
//! ```
//!
//! The encoding is a wire contract: decoders must stop at the first byte
//! without the continuation bit and must treat a sixth continuation byte as
//! a protocol violation.
//!
//! # Examples
//!
//! ```rust
//! use sessionwire::framing::varint;
//!
//! let mut buf = [0u8; varint::MAX_ENCODED_SIZE];
//! let written = varint::encode(300, &mut buf, 0).unwrap();
//! assert_eq!(&buf[..written], &[0xAC, 0x02]);
//!
//! let (value, consumed) = varint::decode(&buf[..written]).unwrap();
//! assert_eq!(value, 300);
//! assert_eq!(consumed, 2);
//! ```

use crate::framing::FramingError;

/// Maximum number of bytes a single varint may occupy.
pub const MAX_ENCODED_SIZE: usize = 5;

/// Largest encodable value (2^31-1).
pub const MAX_VALUE: u32 = i32::MAX as u32;

/// Returns the number of bytes `value` occupies when encoded.
///
/// Values above [`MAX_VALUE`] are rejected with
/// [`FramingError::ValueTooLarge`] rather than silently clamped.
pub fn encoded_size(value: u64) -> Result<usize, FramingError> {
    if value > MAX_VALUE as u64 {
        return Err(FramingError::ValueTooLarge { value });
    }
    let mut value = value as u32;
    let mut size = 1;
    while value >= 0x80 {
        value >>= 7;
        size += 1;
    }
    Ok(size)
}

/// Encodes `value` into `buf` starting at `offset`, returning bytes written.
///
/// Callers should pre-size the destination using [`encoded_size`].
///
/// # Errors
///
/// - [`FramingError::ValueTooLarge`] if `value` exceeds [`MAX_VALUE`]
/// - [`FramingError::InsufficientBuffer`] if the slice past `offset` cannot
///   hold the encoded form
pub fn encode(value: u32, buf: &mut [u8], offset: usize) -> Result<usize, FramingError> {
    let needed = encoded_size(value as u64)?;
    let available = buf.len().saturating_sub(offset);
    if available < needed {
        return Err(FramingError::InsufficientBuffer { needed, available });
    }

    let mut remaining = value;
    let mut cursor = offset;
    loop {
        let group = (remaining & 0x7F) as u8;
        remaining >>= 7;
        if remaining == 0 {
            buf[cursor] = group;
            cursor += 1;
            break;
        }
        buf[cursor] = group | 0x80;
        cursor += 1;
    }
    debug_assert_eq!(cursor - offset, needed);
    Ok(cursor - offset)
}

/// Decodes one varint from the front of `buf`.
///
/// Returns the value and the number of bytes consumed. Decoding stops at
/// the first byte without the continuation bit.
///
/// # Errors
///
/// [`FramingError::InvalidVarint`] if the input ends mid-varint, carries a
/// sixth continuation byte, or decodes above [`MAX_VALUE`].
pub fn decode(buf: &[u8]) -> Result<(u32, usize), FramingError> {
    let mut decoder = VarintDecoder::new();
    for (index, byte) in buf.iter().enumerate() {
        if let Some(value) = decoder.push(*byte)? {
            return Ok((value, index + 1));
        }
    }
    Err(FramingError::InvalidVarint {
        reason: "input ended before the final varint byte",
    })
}

/// Incremental varint decoder for push-based record readers.
///
/// Feed bytes one at a time with [`push`](VarintDecoder::push); the decoder
/// yields the value on the byte that clears the continuation bit. After
/// yielding, the decoder resets itself and can decode the next varint.
#[derive(Debug, Default)]
pub struct VarintDecoder {
    value: u32,
    bytes_seen: usize,
}

impl VarintDecoder {
    /// Creates a fresh decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes one byte, returning `Some(value)` when the varint completes.
    ///
    /// # Errors
    ///
    /// [`FramingError::InvalidVarint`] on a sixth continuation byte or a
    /// value above [`MAX_VALUE`]. The decoder is poisoned after an error;
    /// call [`reset`](VarintDecoder::reset) before reuse.
    pub fn push(&mut self, byte: u8) -> Result<Option<u32>, FramingError> {
        if self.bytes_seen >= MAX_ENCODED_SIZE {
            return Err(FramingError::InvalidVarint {
                reason: "more than 5 continuation bytes",
            });
        }

        let group = (byte & 0x7F) as u32;
        let shift = 7 * self.bytes_seen as u32;
        // The fifth byte may only contribute 3 bits (7 * 4 + 3 = 31).
        if shift >= 32 || (group.checked_shl(shift).is_none()) {
            return Err(FramingError::InvalidVarint {
                reason: "value exceeds 2^31-1",
            });
        }
        let contribution = group << shift;
        let value = self.value | contribution;
        if value > MAX_VALUE || (shift > 0 && contribution >> shift != group) {
            return Err(FramingError::InvalidVarint {
                reason: "value exceeds 2^31-1",
            });
        }

        self.value = value;
        self.bytes_seen += 1;

        if byte & 0x80 == 0 {
            let finished = self.value;
            self.reset();
            Ok(Some(finished))
        } else {
            Ok(None)
        }
    }

    /// Discards any partial state.
    pub fn reset(&mut self) {
        self.value = 0;
        self.bytes_seen = 0;
    }
}
