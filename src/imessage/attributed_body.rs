//! Text recovery from `attributedBody` payloads.
//!
//! The column holds a typedstream-serialized `NSAttributedString`. We do not
//! parse the object graph; the string content is found with a byte scan:
//!
//! ```text
//! ... "NSString" <class bookkeeping> 0x2B <len> <utf-8 bytes> ...
//!
//! <len> = 0x00..=0x7F          length in one byte
//!       | 0x81 <lo> <hi>       length as little-endian u16
//! ```
//!
//! Older payloads omit the `0x2B` control byte and put the length directly
//! after the marker; that layout is tried only if the primary scan fails.

use thiserror::Error;

/// Marker preceding the string field.
const STRING_MARKER: &[u8] = b"NSString";

/// Control byte that precedes the length field in current payloads.
const LENGTH_CONTROL: u8 = 0x2B;

/// Length prefix signalling a 2-byte little-endian length.
const WIDE_LENGTH: u8 = 0x81;

/// Why a payload yielded no text
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("payload is empty")]
    Empty,
    #[error("no NSString marker in payload")]
    MarkerNotFound,
    #[error("no length control byte after marker")]
    ControlByteNotFound,
    #[error("unsupported length prefix 0x{0:02x}")]
    UnsupportedLength(u8),
    #[error("declared length is zero")]
    ZeroLength,
    #[error("payload truncated: declared {declared} bytes, {available} available")]
    Truncated { declared: usize, available: usize },
    #[error("string bytes are not valid UTF-8")]
    InvalidUtf8,
}

/// Recover the message text from an `attributedBody` blob.
pub fn decode(blob: &[u8]) -> Result<String, DecodeError> {
    if blob.is_empty() {
        return Err(DecodeError::Empty);
    }
    let marker_end =
        find(blob, STRING_MARKER).ok_or(DecodeError::MarkerNotFound)? + STRING_MARKER.len();
    let content = &blob[marker_end..];

    decode_after_control(content).or_else(|primary| {
        tracing::debug!(
            "attributedBody primary scan failed ({}), trying legacy layout",
            primary
        );
        read_prefixed_string(content).map_err(|_| primary)
    })
}

/// Primary layout: skip to the first control byte, then read the string.
fn decode_after_control(content: &[u8]) -> Result<String, DecodeError> {
    let control = content
        .iter()
        .position(|&b| b == LENGTH_CONTROL)
        .ok_or(DecodeError::ControlByteNotFound)?;
    read_prefixed_string(&content[control + 1..])
}

/// Read a length-prefixed UTF-8 string starting at `data[0]`.
fn read_prefixed_string(data: &[u8]) -> Result<String, DecodeError> {
    let (len, start) = read_length(data)?;
    if len == 0 {
        return Err(DecodeError::ZeroLength);
    }
    let available = data.len() - start;
    if len > available {
        return Err(DecodeError::Truncated {
            declared: len,
            available,
        });
    }
    std::str::from_utf8(&data[start..start + len])
        .map(str::to_string)
        .map_err(|_| DecodeError::InvalidUtf8)
}

/// Decode the variable-width length. Returns `(length, offset of first
/// string byte)`.
fn read_length(data: &[u8]) -> Result<(usize, usize), DecodeError> {
    match data.first() {
        None => Err(DecodeError::Truncated {
            declared: 1,
            available: 0,
        }),
        Some(&b) if b < 0x80 => Ok((b as usize, 1)),
        Some(&WIDE_LENGTH) => match data.get(1..3) {
            Some(&[lo, hi]) => Ok((u16::from_le_bytes([lo, hi]) as usize, 3)),
            _ => Err(DecodeError::Truncated {
                declared: 2,
                available: data.len() - 1,
            }),
        },
        Some(&b) => Err(DecodeError::UnsupportedLength(b)),
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
