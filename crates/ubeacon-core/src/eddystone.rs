//! Eddystone-URL compression.
//!
//! An Eddystone-URL frame carries a URL as one scheme byte followed by the
//! remaining characters, where common top-level-domain suffixes collapse into
//! single code bytes. The device stores the compressed form; this module
//! converts between it and plain URL strings.
//!
//! The empty URL is the device's "cleared" state and maps to zero bytes in
//! both directions.

/// Scheme prefixes, indexed by their code byte.
const SCHEMES: [&str; 4] = ["http://www.", "https://www.", "http://", "https://"];

/// Suffix expansions, indexed by their code byte (`0x00..=0x0d`).
const SUFFIXES: [&str; 14] = [
    ".com/", ".org/", ".edu/", ".net/", ".info/", ".biz/", ".gov/", ".com", ".org", ".edu",
    ".net", ".info", ".biz", ".gov",
];

/// Longest encoded URL (scheme byte included) the advertising frame can hold.
pub const MAX_ENCODED_LEN: usize = 18;

/// Errors from encoding or decoding an Eddystone URL.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EddystoneError {
    /// The URL does not start with `http://` or `https://`.
    #[error(r#"Only "http://" and "https://" URLs can be encoded"#)]
    UnsupportedScheme,

    /// The compressed URL does not fit the advertising frame.
    #[error("encoded URL is too long (max {MAX_ENCODED_LEN} bytes): {len} bytes")]
    TooLong {
        /// Length of the compressed form.
        len: usize,
    },

    /// The URL contains a character outside printable ASCII.
    #[error("URL contains a non-encodable character {0:?}")]
    InvalidCharacter(char),

    /// The first encoded byte is not a known scheme code.
    #[error("unknown Eddystone-URL scheme code 0x{0:02x}")]
    InvalidSchemeCode(u8),

    /// The encoded body holds a byte that is neither a suffix code nor printable ASCII.
    #[error("invalid byte 0x{0:02x} in encoded Eddystone URL")]
    InvalidByte(u8),
}

/// Compress a URL into its Eddystone-URL byte form.
pub fn encode(url: &str) -> Result<Vec<u8>, EddystoneError> {
    if url.is_empty() {
        return Ok(Vec::new());
    }

    let (scheme_code, scheme) = SCHEMES
        .iter()
        .enumerate()
        .find(|(_, prefix)| url.starts_with(*prefix))
        .ok_or(EddystoneError::UnsupportedScheme)?;

    let mut out = vec![scheme_code as u8];
    let mut rest = &url[scheme.len()..];

    'outer: while let Some(c) = rest.chars().next() {
        for (code, suffix) in SUFFIXES.iter().enumerate() {
            if rest.starts_with(suffix) {
                out.push(code as u8);
                rest = &rest[suffix.len()..];
                continue 'outer;
            }
        }
        if !is_printable(c) {
            return Err(EddystoneError::InvalidCharacter(c));
        }
        out.push(c as u8);
        rest = &rest[c.len_utf8()..];
    }

    if out.len() > MAX_ENCODED_LEN {
        return Err(EddystoneError::TooLong { len: out.len() });
    }
    Ok(out)
}

/// Expand an Eddystone-URL byte form back into a URL string.
pub fn decode(bytes: &[u8]) -> Result<String, EddystoneError> {
    let Some((&scheme_code, body)) = bytes.split_first() else {
        return Ok(String::new());
    };

    let scheme = SCHEMES
        .get(usize::from(scheme_code))
        .ok_or(EddystoneError::InvalidSchemeCode(scheme_code))?;

    let mut url = String::from(*scheme);
    for &b in body {
        if let Some(suffix) = SUFFIXES.get(usize::from(b)) {
            url.push_str(suffix);
        } else if is_printable(char::from(b)) {
            url.push(char::from(b));
        } else {
            return Err(EddystoneError::InvalidByte(b));
        }
    }
    Ok(url)
}

fn is_printable(c: char) -> bool {
    c.is_ascii_graphic()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_plain_http() {
        assert_eq!(
            encode("http://google.com").unwrap(),
            [&[0x02][..], b"google", &[0x07]].concat()
        );
    }

    #[test]
    fn encode_picks_www_scheme() {
        let bytes = encode("https://www.ubudu.com/").unwrap();
        assert_eq!(bytes[0], 0x01);
        assert_eq!(&bytes[1..6], b"ubudu");
        assert_eq!(bytes[6], 0x00);
        assert_eq!(bytes.len(), 7);
    }

    #[test]
    fn encode_suffix_in_middle() {
        let bytes = encode("http://a.com/b").unwrap();
        assert_eq!(bytes, vec![0x02, b'a', 0x00, b'b']);
    }

    #[test]
    fn encode_rejects_other_schemes() {
        let err = encode("ftp://v3i").unwrap_err();
        assert_eq!(err, EddystoneError::UnsupportedScheme);
        assert_eq!(
            err.to_string(),
            r#"Only "http://" and "https://" URLs can be encoded"#
        );
        assert_eq!(encode("google.com"), Err(EddystoneError::UnsupportedScheme));
    }

    #[test]
    fn encode_rejects_too_long() {
        let err = encode("http://abcdefghijklmnopqrstuvwxyz.com").unwrap_err();
        assert!(matches!(err, EddystoneError::TooLong { len } if len > MAX_ENCODED_LEN));
    }

    #[test]
    fn encode_rejects_non_ascii() {
        assert_eq!(
            encode("http://é.fr"),
            Err(EddystoneError::InvalidCharacter('é'))
        );
        assert_eq!(
            encode("http://a b"),
            Err(EddystoneError::InvalidCharacter(' '))
        );
    }

    #[test]
    fn empty_url_is_cleared_state() {
        assert_eq!(encode("").unwrap(), Vec::<u8>::new());
        assert_eq!(decode(&[]).unwrap(), "");
    }

    #[test]
    fn decode_known_urls() {
        assert_eq!(
            decode(&[0x02, b'g', b'o', b'o', b'g', b'l', b'e', 0x07]).unwrap(),
            "http://google.com"
        );
        assert_eq!(decode(&[0x03, b'x', 0x0d]).unwrap(), "https://x.gov");
        assert_eq!(decode(&[0x00, b'u', 0x01]).unwrap(), "http://www.u.org/");
    }

    #[test]
    fn decode_rejects_bad_scheme_and_bytes() {
        assert_eq!(decode(&[0x09, b'a']), Err(EddystoneError::InvalidSchemeCode(0x09)));
        assert_eq!(decode(&[0x02, 0x1f]), Err(EddystoneError::InvalidByte(0x1f)));
        assert_eq!(decode(&[0x02, 0xff]), Err(EddystoneError::InvalidByte(0xff)));
    }

    #[test]
    fn encode_decode_preserves_url() {
        for url in [
            "http://ubudu.com",
            "https://www.rust-lang.org/",
            "http://example.info/x",
            "https://go.gov",
        ] {
            assert_eq!(decode(&encode(url).unwrap()).unwrap(), url);
        }
    }
}
