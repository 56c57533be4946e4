/// AES-256-CTR encryption for stored site secrets.
///
/// The IV is all zeros. Invariant: a site key encrypts exactly one
/// plaintext — it is derived per (site, counter, purpose) and the stored
/// secret is the only thing it ever protects, so the keystream is never
/// reused.
use aes::Aes256;
use ctr::cipher::{KeyIvInit, StreamCipher};
use ctr::Ctr128BE;

use crate::crypto::sensitive::{SensitiveVec, SiteKey};
use crate::error::{MpwError, Result};

type Aes256Ctr = Ctr128BE<Aes256>;

/// Encrypt site content under its site key. Returns raw ciphertext.
pub fn encrypt(key: &SiteKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let mut data = plaintext.to_vec();
    apply_keystream(key, &mut data)?;
    Ok(data)
}

/// Decrypt stored site content under its site key.
pub fn decrypt(key: &SiteKey, ciphertext: &[u8]) -> Result<SensitiveVec> {
    let mut data = ciphertext.to_vec();
    apply_keystream(key, &mut data)?;
    Ok(SensitiveVec::new(data))
}

fn apply_keystream(key: &SiteKey, data: &mut [u8]) -> Result<()> {
    let mut cipher = Aes256Ctr::new_from_slices(key.as_bytes(), &[0u8; 16])
        .map_err(|e| MpwError::Crypto(format!("AES-CTR setup failed: {e}")))?;
    cipher.apply_keystream(data);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = SiteKey::new([0x42; 32]);
        let plaintext = b"personal password";

        let ciphertext = encrypt(&key, plaintext).unwrap();
        assert_ne!(&ciphertext[..], &plaintext[..]);

        let decrypted = decrypt(&key, &ciphertext).unwrap();
        assert_eq!(decrypted.as_bytes(), plaintext);
    }

    #[test]
    fn test_encrypt_is_deterministic() {
        let key = SiteKey::new([0x42; 32]);
        let c1 = encrypt(&key, b"secret").unwrap();
        let c2 = encrypt(&key, b"secret").unwrap();
        assert_eq!(c1, c2);
    }

    #[test]
    fn test_wrong_key_garbles() {
        let c = encrypt(&SiteKey::new([0x01; 32]), b"secret").unwrap();
        let p = decrypt(&SiteKey::new([0x02; 32]), &c).unwrap();
        assert_ne!(p.as_bytes(), b"secret");
    }

    #[test]
    fn test_empty_plaintext() {
        let key = SiteKey::new([0x42; 32]);
        let c = encrypt(&key, b"").unwrap();
        assert!(c.is_empty());
    }
}
