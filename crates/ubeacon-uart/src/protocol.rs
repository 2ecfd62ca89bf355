//! uBeacon UART line protocol: frame encode/decode.
//!
//! Host frames are `[type]:[opcode][payload]\r\n` where `type` is `g` for a
//! getter and `s` for a setter. Device frames are `r:[opcode][payload]\r\n`.
//! The device sometimes prints boot chatter or a garbled preamble in front
//! of a response, so only the text from the first `r:` to the end of the
//! line is treated as a frame.

use bytes::{BufMut, Bytes, BytesMut};

/// Prefix byte of a getter frame.
pub const GET_PREFIX: u8 = b'g';
/// Prefix byte of a setter frame.
pub const SET_PREFIX: u8 = b's';
/// Prefix byte of every device frame.
pub const RESPONSE_PREFIX: u8 = b'r';
/// Separator between the frame type and the opcode.
pub const DELIMITER: u8 = b':';
/// Line terminator in both directions.
pub const LINE_END: &[u8] = b"\r\n";

/// Shortest meaningful device frame: `r:` plus an opcode.
const MIN_FRAME_LEN: usize = 3;

/// Direction of a host request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandType {
    Get,
    Set,
}

impl CommandType {
    pub fn prefix(self) -> u8 {
        match self {
            CommandType::Get => GET_PREFIX,
            CommandType::Set => SET_PREFIX,
        }
    }
}

/// Build a host frame.
///
/// ```
/// use ubeacon_uart::protocol::{encode_command, CommandType};
///
/// assert_eq!(&encode_command(CommandType::Get, b'h', None)[..], b"g:h\r\n");
/// assert_eq!(&encode_command(CommandType::Set, b'h', Some(b"01".as_slice()))[..], b"s:h01\r\n");
/// ```
pub fn encode_command(kind: CommandType, opcode: u8, payload: Option<&[u8]>) -> Bytes {
    let payload = payload.unwrap_or_default();
    let mut buf = BytesMut::with_capacity(3 + payload.len() + LINE_END.len());
    buf.put_u8(kind.prefix());
    buf.put_u8(DELIMITER);
    buf.put_u8(opcode);
    buf.put_slice(payload);
    buf.put_slice(LINE_END);
    buf.freeze()
}

/// A device frame extracted from one inbound line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub opcode: u8,
    /// Everything after the opcode, up to the line terminator.
    pub payload: String,
}

/// Result of attempting to take one line from a byte buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeResult {
    /// A complete line held a device frame.
    Frame {
        frame: Frame,
        /// The whole line as received, preamble included.
        line: String,
        consumed: usize,
    },

    /// A complete line held no device frame.
    Discarded { line: String, consumed: usize },

    /// No line terminator yet.
    Incomplete,
}

/// Locate the device frame inside one line (terminator already removed).
///
/// Returns the bytes from the first `r:` to the end of the line, or `None` if
/// the line has no `r:` or the frame is too short to carry an opcode.
pub fn extract_frame(line: &[u8]) -> Option<&[u8]> {
    let start = line
        .windows(2)
        .position(|w| w == [RESPONSE_PREFIX, DELIMITER])?;
    let frame = &line[start..];
    (frame.len() >= MIN_FRAME_LEN).then_some(frame)
}

/// Split an extracted frame into opcode and payload.
///
/// The opcode is the raw byte after `r:`; only the payload is read as text.
pub fn parse_frame(frame: &[u8]) -> Option<Frame> {
    match frame {
        [RESPONSE_PREFIX, DELIMITER, opcode, payload @ ..] => Some(Frame {
            opcode: *opcode,
            payload: String::from_utf8_lossy(payload).into_owned(),
        }),
        _ => None,
    }
}

/// Take the first complete line from `buf` and decode it.
///
/// Lines end in `\r\n`; a bare `\n` is accepted too. Invalid UTF-8 in the
/// preamble or payload is replaced, never fatal.
pub fn decode_line(buf: &[u8]) -> DecodeResult {
    let Some(nl) = buf.iter().position(|&b| b == b'\n') else {
        return DecodeResult::Incomplete;
    };
    let consumed = nl + 1;
    let body = match buf[..nl].last() {
        Some(b'\r') => &buf[..nl - 1],
        _ => &buf[..nl],
    };
    let line = String::from_utf8_lossy(body).into_owned();

    match extract_frame(body).and_then(parse_frame) {
        Some(frame) => DecodeResult::Frame {
            frame,
            line,
            consumed,
        },
        None => DecodeResult::Discarded { line, consumed },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_get_without_payload() {
        assert_eq!(
            &encode_command(CommandType::Get, 0x30, None)[..],
            &[0x67, 0x3A, 0x30, 0x0D, 0x0A]
        );
    }

    #[test]
    fn encode_set_with_payload() {
        assert_eq!(
            &encode_command(CommandType::Set, b'f', Some(b"0102".as_slice()))[..],
            b"s:f0102\r\n"
        );
    }

    #[test]
    fn decode_simple_response() {
        match decode_line(b"r:12.2.0\r\n") {
            DecodeResult::Frame {
                frame, consumed, ..
            } => {
                assert_eq!(frame.opcode, b'1');
                assert_eq!(frame.payload, "2.2.0");
                assert_eq!(consumed, 10);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn decode_discards_garbled_preamble() {
        match decode_line(b"\x00\xffboot...r:h01\r\nr:") {
            DecodeResult::Frame {
                frame, consumed, ..
            } => {
                assert_eq!(frame.opcode, b'h');
                assert_eq!(frame.payload, "01");
                assert_eq!(consumed, 16);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn decode_line_without_frame() {
        assert_eq!(
            decode_line(b"uBeacon booting\r\n"),
            DecodeResult::Discarded {
                line: "uBeacon booting".into(),
                consumed: 17
            }
        );
    }

    #[test]
    fn decode_too_short_frame_is_discarded() {
        assert!(matches!(
            decode_line(b"r:\r\n"),
            DecodeResult::Discarded { consumed: 4, .. }
        ));
    }

    #[test]
    fn decode_incomplete() {
        assert_eq!(decode_line(b"r:1 2.2"), DecodeResult::Incomplete);
        assert_eq!(decode_line(b""), DecodeResult::Incomplete);
    }

    #[test]
    fn decode_bare_newline() {
        assert!(matches!(
            decode_line(b"r:!01\n"),
            DecodeResult::Frame { consumed: 6, .. }
        ));
    }

    #[test]
    fn extract_frame_takes_first_marker() {
        assert_eq!(extract_frame(b"xxr:ar:b"), Some(b"r:ar:b".as_slice()));
        assert_eq!(extract_frame(b"no frame here"), None);
    }

    #[test]
    fn decode_keeps_non_ascii_opcode_byte() {
        match decode_line(b"\xffr:\xfe01\r\n") {
            DecodeResult::Frame {
                frame, consumed, ..
            } => {
                assert_eq!(frame.opcode, 0xfe);
                assert_eq!(frame.payload, "01");
                assert_eq!(consumed, 8);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            parse_frame(b"r:\x80"),
            Some(Frame {
                opcode: 0x80,
                payload: String::new()
            })
        );
    }
}
