/// Byte-level helpers for composing derivation messages and encoding
/// stored secrets.
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::error::{MpwError, Result};

/// Append a big-endian u32 length or counter frame.
pub fn push_u32be(value: u32, out: &mut Vec<u8>) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// Append the UTF-8 bytes of a string.
pub fn push_str(value: &str, out: &mut Vec<u8>) {
    out.extend_from_slice(value.as_bytes());
}

/// Standard-alphabet base64, padded, no line wrapping.
pub fn b64_encode(data: &[u8]) -> String {
    BASE64.encode(data)
}

pub fn b64_decode(data: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(data)
        .map_err(|e| MpwError::Format(format!("invalid base64: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_u32be() {
        let mut buf = Vec::new();
        push_u32be(0x01020304, &mut buf);
        assert_eq!(buf, [0x01, 0x02, 0x03, 0x04]);

        buf.clear();
        push_u32be(1, &mut buf);
        assert_eq!(buf, [0, 0, 0, 1]);
    }

    #[test]
    fn test_push_str_is_utf8_bytes() {
        let mut buf = Vec::new();
        push_str("héllo", &mut buf);
        assert_eq!(buf, "héllo".as_bytes());
        assert_eq!(buf.len(), 6);
    }

    #[test]
    fn test_b64_roundtrip() {
        let data = b"\x00\x01\xfe\xff";
        let encoded = b64_encode(data);
        assert_eq!(b64_decode(&encoded).unwrap(), data);
    }

    #[test]
    fn test_b64_rejects_garbage() {
        assert!(b64_decode("not*base64!").is_err());
    }
}
