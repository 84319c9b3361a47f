//! Text and byte codecs used at the sandbox boundary.
//!
//! These are the only conversions allowed to cross the boundary. They are
//! pure, so they need no cleanup and cannot leak sandbox memory.

use crate::error::{SluiceError, SluiceResult};
use base64::Engine as _;
use base64::alphabet;
use base64::engine::DecodePaddingMode;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};

/// Line width of wrapped base64 output
pub const BASE64_LINE_WIDTH: usize = 76;

/// Padding is stripped before decoding, and non-canonical trailing bits are
/// tolerated so that hand-edited input still decodes.
const PERMISSIVE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::RequireNone)
        .with_decode_allow_trailing_bits(true),
);

/// Encode text as its UTF-8 byte sequence
#[must_use]
pub fn string_to_bytes(s: &str) -> Vec<u8> {
    s.as_bytes().to_vec()
}

/// Lower-case hex encoding
#[must_use]
pub fn to_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Decode hex text (either case)
///
/// The empty string decodes to an empty byte sequence.
///
/// # Errors
///
/// Returns `Format` if the input has odd length or a non-hex character
pub fn from_hex(s: &str) -> SluiceResult<Vec<u8>> {
    hex::decode(s).map_err(|e| match e {
        hex::FromHexError::OddLength => SluiceError::format("hex", "odd number of digits"),
        hex::FromHexError::InvalidHexCharacter { c, index } => {
            SluiceError::format("hex", format!("invalid character {c:?} at position {index}"))
        }
        other => SluiceError::format("hex", other.to_string()),
    })
}

/// True iff `from_hex` accepts the input
#[must_use]
pub fn is_hex(s: &str) -> bool {
    s.len() % 2 == 0 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Standard base64 with padding
///
/// A `\r\n` line break follows every 76 output characters unless
/// `no_newline` is set. No break is emitted after the final line.
#[must_use]
pub fn to_base64(bytes: &[u8], no_newline: bool) -> String {
    let encoded = STANDARD.encode(bytes);
    if no_newline || encoded.len() <= BASE64_LINE_WIDTH {
        return encoded;
    }

    let mut wrapped = String::with_capacity(encoded.len() + encoded.len() / BASE64_LINE_WIDTH * 2);
    let mut start = 0;
    while start < encoded.len() {
        // base64 output is ASCII, so any offset is a char boundary
        let end = (start + BASE64_LINE_WIDTH).min(encoded.len());
        if start > 0 {
            wrapped.push_str("\r\n");
        }
        wrapped.push_str(&encoded[start..end]);
        start = end;
    }
    wrapped
}

/// Decode base64 text permissively
///
/// Every character outside `[A-Za-z0-9+/]` is discarded before decoding,
/// including padding, whitespace and line breaks. Garbage is therefore
/// ignored rather than rejected.
///
/// # Errors
///
/// Returns `Format` when the remaining symbols leave a dangling single
/// sextet, which cannot encode a whole byte
pub fn from_base64(s: &str) -> SluiceResult<Vec<u8>> {
    let filtered: String = s
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '+' || *c == '/')
        .collect();

    if filtered.len() % 4 == 1 {
        return Err(SluiceError::format(
            "base64",
            format!("{} symbols leave an incomplete byte", filtered.len()),
        ));
    }

    PERMISSIVE
        .decode(filtered.as_bytes())
        .map_err(|e| SluiceError::format("base64", e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_to_bytes_utf8() {
        assert_eq!(string_to_bytes("héllo"), vec![0x68, 0xc3, 0xa9, 0x6c, 0x6c, 0x6f]);
        assert!(string_to_bytes("").is_empty());
    }

    #[test]
    fn test_hex_lowercase() {
        assert_eq!(to_hex(&[0x00, 0xab, 0xff]), "00abff");
    }

    #[test]
    fn test_from_hex_mixed_case() {
        assert_eq!(from_hex("00AbFf").unwrap(), vec![0x00, 0xab, 0xff]);
    }

    #[test]
    fn test_from_hex_odd_length() {
        let err = from_hex("abc").unwrap_err();
        assert_eq!(err.kind(), "FormatError");
    }

    #[test]
    fn test_from_hex_bad_char() {
        let err = from_hex("zz").unwrap_err();
        assert!(err.to_string().contains("invalid character"));
    }

    #[test]
    fn test_is_hex() {
        assert!(is_hex("deadBEEF"));
        assert!(is_hex(""));
        assert!(!is_hex("dead0"));
        assert!(!is_hex("0x00"));
    }

    #[test]
    fn test_base64_known_vectors() {
        assert_eq!(to_base64(b"", true), "");
        assert_eq!(to_base64(b"f", true), "Zg==");
        assert_eq!(to_base64(b"fo", true), "Zm8=");
        assert_eq!(to_base64(b"foo", true), "Zm9v");
        assert_eq!(from_base64("Zm9vYg==").unwrap(), b"foob");
    }

    #[test]
    fn test_base64_line_breaks() {
        let data = vec![0x5au8; 120];
        let wrapped = to_base64(&data, false);
        let lines: Vec<&str> = wrapped.split("\r\n").collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].len(), 76);
        assert_eq!(lines[1].len(), 76);
        assert!(!wrapped.ends_with("\r\n"));
        assert_eq!(from_base64(&wrapped).unwrap(), data);
    }

    #[test]
    fn test_base64_exact_line_has_no_break() {
        // 57 input bytes encode to exactly one 76 character line
        let wrapped = to_base64(&[1u8; 57], false);
        assert_eq!(wrapped.len(), 76);
        assert!(!wrapped.contains('\n'));
    }

    #[test]
    fn test_base64_decode_ignores_garbage() {
        assert_eq!(from_base64("Zm9v\r\n Y!g=*=").unwrap(), b"foob");
    }

    #[test]
    fn test_base64_decode_dangling_symbol() {
        let err = from_base64("Zm9vY").unwrap_err();
        assert_eq!(err.kind(), "FormatError");
    }

    proptest::proptest! {
        #[test]
        fn prop_hex_roundtrip(bytes: Vec<u8>) {
            let encoded = to_hex(&bytes);
            proptest::prop_assert!(is_hex(&encoded));
            proptest::prop_assert_eq!(from_hex(&encoded).unwrap(), bytes);
        }

        #[test]
        fn prop_base64_roundtrip(bytes: Vec<u8>, no_newline: bool) {
            let encoded = to_base64(&bytes, no_newline);
            proptest::prop_assert_eq!(from_base64(&encoded).unwrap(), bytes);
        }
    }
}
