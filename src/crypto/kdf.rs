/// scrypt key stretching for the master-key derivation.
///
/// Parameters: N=32768, r=8, p=2, dkLen=64.
/// The parameters are part of the derivation contract: changing any of them
/// changes every credential ever derived.
use scrypt::{scrypt, Params};

use crate::crypto::sensitive::MasterKey;
use crate::error::{MpwError, Result};

const SCRYPT_LOG_N: u8 = 15; // N = 32768
const SCRYPT_R: u32 = 8;
const SCRYPT_P: u32 = 2;

/// Length of the stretched master key in bytes.
pub const MASTER_KEY_LEN: usize = 64;

/// Stretch a master password and salt into the 64-byte master key.
pub fn stretch(password: &[u8], salt: &[u8]) -> Result<MasterKey> {
    let params = Params::new(SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P, MASTER_KEY_LEN)
        .map_err(|e| MpwError::Crypto(format!("invalid scrypt parameters: {e}")))?;

    let mut output = [0u8; MASTER_KEY_LEN];
    scrypt(password, salt, &params, &mut output)
        .map_err(|e| MpwError::Crypto(format!("scrypt failed: {e}")))?;

    Ok(MasterKey::new(output))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stretch_deterministic() {
        let k1 = stretch(b"my passphrase", b"salt").unwrap();
        let k2 = stretch(b"my passphrase", b"salt").unwrap();
        assert_eq!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn test_stretch_different_password() {
        let k1 = stretch(b"passphrase1", b"salt").unwrap();
        let k2 = stretch(b"passphrase2", b"salt").unwrap();
        assert_ne!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn test_stretch_different_salt() {
        let k1 = stretch(b"passphrase", b"salt1").unwrap();
        let k2 = stretch(b"passphrase", b"salt2").unwrap();
        assert_ne!(k1.as_bytes(), k2.as_bytes());
    }
}
