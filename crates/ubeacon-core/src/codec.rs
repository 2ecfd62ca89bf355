//! Stateless conversions used by the wire protocol.
//!
//! The uBeacon UART protocol carries almost every binary value as lower-case
//! hex text. These helpers convert between bytes, hex, ASCII and packed BCD,
//! and compare the dotted `major.minor.patch` protocol versions reported by
//! the device.

use crate::error::{Error, Result};

/// Decode a packed-BCD byte sequence into an integer.
///
/// Each byte holds two decimal digits, tens in the high nibble. The byte at
/// position `i` counted from the least significant (last) end contributes
/// `digits * 100^i`.
pub fn bcd_to_number(bcd: &[u8]) -> u64 {
    let mut n = 0u64;
    let mut m = 1u64;
    for byte in bcd.iter().rev() {
        n += u64::from(byte & 0x0F) * m;
        n += u64::from((byte >> 4) & 0x0F) * m * 10;
        m *= 100;
    }
    n
}

/// Encode a value in `0..=99` as one packed-BCD byte.
pub fn number_to_bcd(n: u8) -> u8 {
    ((n / 10) << 4) | (n % 10)
}

/// Encode a value in `0..=99` as packed BCD, formatted as two hex characters.
pub fn number_to_bcd_hex(n: u8) -> String {
    uint8_to_hex(number_to_bcd(n))
}

/// Format a byte as exactly two lower-case hex characters.
pub fn uint8_to_hex(value: u8) -> String {
    format!("{value:02x}")
}

/// Parse up to two hex characters into a byte.
pub fn hex_to_uint8(hex: &str) -> Result<u8> {
    u8::from_str_radix(hex, 16).map_err(|e| Error::Decode(format!("invalid hex byte {hex:?}: {e}")))
}

/// Format a 16-bit value as four big-endian lower-case hex characters.
pub fn u16_to_hex(value: u16) -> String {
    format!("{value:04x}")
}

/// Parse up to four hex characters into a 16-bit value.
pub fn hex_to_u16(hex: &str) -> Result<u16> {
    u16::from_str_radix(hex, 16)
        .map_err(|e| Error::Decode(format!("invalid hex value {hex:?}: {e}")))
}

/// Hex-encode the bytes of a string (two characters per byte).
pub fn string_to_hex_string(s: &str) -> String {
    bytes_to_hex_string(s.as_bytes())
}

/// Hex-encode a byte slice (two lower-case characters per byte).
pub fn bytes_to_hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| uint8_to_hex(*b)).collect()
}

/// Decode a hex string into raw bytes.
///
/// Fails on odd length or non-hex characters.
pub fn hex_string_to_bytes(hex: &str) -> Result<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return Err(Error::Decode(format!(
            "hex string has odd length {}: {hex:?}",
            hex.len()
        )));
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| {
            hex.get(i..i + 2)
                .ok_or_else(|| Error::Decode(format!("non-ASCII hex string: {hex:?}")))
                .and_then(hex_to_uint8)
        })
        .collect()
}

/// Decode a hex string into text, one character per byte.
pub fn hex_string_to_string(hex: &str) -> Result<String> {
    let bytes = hex_string_to_bytes(hex)?;
    Ok(bytes.into_iter().map(char::from).collect())
}

/// Left-pad the textual form of `value` with `'0'` to at least `width` chars.
///
/// Never truncates: values already at least `width` long are returned as is.
pub fn zero_pad(value: impl std::fmt::Display, width: usize) -> String {
    format!("{value:0>width$}")
}

/// A dotted `major.minor.patch` version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Version {
    major: u32,
    minor: u32,
    patch: u32,
}

fn parse_version(s: &str) -> Option<Version> {
    let mut parts = s.trim().split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next().unwrap_or("0").parse().ok()?;
    let patch = parts.next().unwrap_or("0").parse().ok()?;
    Some(Version {
        major,
        minor,
        patch,
    })
}

/// Return `true` if `input` is at least `compare`.
///
/// Returns `false` if either version is absent or cannot be parsed. Missing
/// minor or patch components count as zero.
pub fn version_greater_than_or_equal(input: Option<&str>, compare: Option<&str>) -> bool {
    match (input.and_then(parse_version), compare.and_then(parse_version)) {
        (Some(a), Some(b)) => a >= b,
        _ => false,
    }
}
