/// SHA-256 and HMAC-SHA256 primitives.
///
/// HMAC-SHA256 is used for:
/// - Site-key derivation (keyed by the master key)
/// - The identicon seed (keyed by the master password)
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::{MpwError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Hash arbitrary data with SHA-256.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Keyed MAC over a message.
pub fn hmac_sha256(key: &[u8], message: &[u8]) -> Result<[u8; 32]> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| MpwError::Crypto(format!("HMAC key setup failed: {e}")))?;
    mac.update(message);
    Ok(mac.finalize().into_bytes().into())
}

/// Timing-independent equality for secret-derived byte strings.
///
/// Returns false for inputs of differing length.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        // SHA-256 of the empty string.
        assert_eq!(
            hex::encode(sha256(b"")),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_hmac_known_vector() {
        // RFC 4231 test case 2.
        let mac = hmac_sha256(b"Jefe", b"what do ya want for nothing?").unwrap();
        assert_eq!(
            hex::encode(mac),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_hmac_deterministic() {
        let m1 = hmac_sha256(b"key", b"message").unwrap();
        let m2 = hmac_sha256(b"key", b"message").unwrap();
        assert_eq!(m1, m2);
        assert_ne!(m1, hmac_sha256(b"other", b"message").unwrap());
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }
}
