//! Stateless packet transforms: hex, binary escaping, checksums and framing.

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

/// Byte that introduces an escaped character inside a packet body.
pub const ESCAPE: u8 = b'}';

/// Byte that introduces a run-length repeat inside a packet body.
pub const RUN_LENGTH: u8 = b'*';

/// Value XORed into an escaped byte.
pub const ESCAPE_XOR: u8 = 0x20;

/// Value of a single ASCII hex digit, or `None` if `byte` is not one.
#[must_use]
pub const fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

/// Lowercase ASCII hex digit for the low nybble of `value`.
#[must_use]
pub const fn hex_digit(value: u8) -> u8 {
    HEX_DIGITS[(value & 0xf) as usize]
}

/// Encode `bytes` as lowercase hex, high nybble first.
#[must_use]
pub fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for &byte in bytes {
        out.push(char::from(hex_digit(byte >> 4)));
        out.push(char::from(hex_digit(byte)));
    }
    out
}

/// Decode `len` bytes from hex text.
///
/// Characters outside `0-9a-fA-F`, and digits missing past the end of
/// `ascii`, decode as zero nybbles.
#[must_use]
pub fn hex_decode(ascii: &[u8], len: usize) -> Vec<u8> {
    let nybble = |i: usize| ascii.get(i).copied().and_then(hex_value).unwrap_or(0);
    (0..len)
        .map(|i| (nybble(2 * i) << 4) | nybble(2 * i + 1))
        .collect()
}

/// Escape `bytes` for a binary (`x`-style) reply.
///
/// `#`, `$`, `*` and `}` become `}` followed by the byte XOR `0x20`.
#[must_use]
pub fn escape_binary(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    for &byte in bytes {
        match byte {
            b'#' | b'$' | RUN_LENGTH | ESCAPE => {
                out.push(ESCAPE);
                out.push(byte ^ ESCAPE_XOR);
            }
            _ => out.push(byte),
        }
    }
    out
}

/// Additive checksum of `bytes`, modulo 256.
#[must_use]
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |sum, &b| sum.wrapping_add(b))
}

/// Wrap `payload` as `$<payload>#<cc>`.
#[must_use]
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let sum = checksum(payload);
    let mut frame = Vec::with_capacity(payload.len() + 4);
    frame.push(b'$');
    frame.extend_from_slice(payload);
    frame.push(b'#');
    frame.push(hex_digit(sum >> 4));
    frame.push(hex_digit(sum));
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_encode() {
        assert_eq!(hex_encode(&[]), "");
        assert_eq!(hex_encode(&[0xde, 0xad, 0xbe, 0xef]), "deadbeef");
        assert_eq!(hex_encode(&[0x00, 0x0f, 0xf0]), "000ff0");
    }

    #[test]
    fn test_hex_decode() {
        assert_eq!(hex_decode(b"DEADbeef", 4), vec![0xde, 0xad, 0xbe, 0xef]);
        // Invalid digits decode as zero
        assert_eq!(hex_decode(b"zz1g", 2), vec![0x00, 0x10]);
        // Short input is zero-padded
        assert_eq!(hex_decode(b"a", 2), vec![0xa0, 0x00]);
    }

    #[test]
    fn test_hex_round_trip() {
        let bytes: Vec<u8> = (0..=255).collect();
        let text = hex_encode(&bytes);
        assert_eq!(text.len(), 512);
        assert_eq!(hex_decode(text.as_bytes(), bytes.len()), bytes);
    }

    #[test]
    fn test_escape_binary() {
        assert_eq!(escape_binary(b"abc"), b"abc");
        assert_eq!(escape_binary(b"#"), b"}\x03");
        assert_eq!(escape_binary(b"$"), b"}\x04");
        assert_eq!(escape_binary(b"*"), b"}\x0a");
        assert_eq!(escape_binary(b"}"), b"}]");
        assert_eq!(escape_binary(b"a}b"), b"a}]b");
    }

    #[test]
    fn test_checksum() {
        assert_eq!(checksum(b""), 0);
        assert_eq!(checksum(b"?"), 0x3f);
        assert_eq!(checksum(b"OK"), 0x9a);
        // Wraps modulo 256
        assert_eq!(checksum(&[0xff, 0x02]), 0x01);
    }

    #[test]
    fn test_encode_frame() {
        assert_eq!(encode_frame(b"OK"), b"$OK#9a");
        assert_eq!(encode_frame(b""), b"$#00");
        assert_eq!(encode_frame(b"?"), b"$?#3f");
    }

    #[test]
    fn test_hex_value() {
        assert_eq!(hex_value(b'0'), Some(0));
        assert_eq!(hex_value(b'F'), Some(15));
        assert_eq!(hex_value(b'f'), Some(15));
        assert_eq!(hex_value(b'g'), None);
        assert_eq!(hex_value(b'#'), None);
    }
}
