/// The derivation engine: master key → site key → rendered result.
///
/// Everything here is deterministic: the same inputs produce bit-identical
/// output across runs, platforms and releases. Version-specific encoding
/// differences (V0..V3) are dispatched inside this module and nowhere else.
///
/// - The site-key message frames strings by code-point count through V1
///   and by byte count from V2; the master-key salt counts code points
///   through V2 and bytes from V3.
/// - V0 reduces each template selector byte as a signed value; V1 and later
///   as unsigned. Legacy profiles depend on this.
use tracing::trace;

use crate::bytes::{b64_decode, b64_encode, push_str, push_u32be};
use crate::crypto::{cipher, hash, kdf};
use crate::crypto::sensitive::{MasterKey, SiteKey};
use crate::error::{MpwError, Result};
use crate::types::{class_characters, AlgorithmVersion, KeyPurpose, ResultType, SiteCounter};

/// The full-name length frame in the master-key salt: code points through
/// V2, bytes from V3.
fn master_frame_len(value: &str, algorithm: AlgorithmVersion) -> u32 {
    if algorithm >= AlgorithmVersion::V3 {
        value.len() as u32
    } else {
        value.chars().count() as u32
    }
}

/// The string-length frame in the site-key message: code points through
/// V1, bytes from V2.
fn site_frame_len(value: &str, algorithm: AlgorithmVersion) -> u32 {
    if algorithm >= AlgorithmVersion::V2 {
        value.len() as u32
    } else {
        value.chars().count() as u32
    }
}

/// Derive the 64-byte master key from the user's full name and master
/// password.
pub fn master_key(
    full_name: &str,
    master_password: &str,
    algorithm: AlgorithmVersion,
) -> Result<MasterKey> {
    if full_name.is_empty() {
        return Err(MpwError::MissingInput("full name".to_string()));
    }
    if master_password.is_empty() {
        return Err(MpwError::MissingInput("master password".to_string()));
    }

    trace!(%algorithm, "deriving master key");
    let scope = KeyPurpose::Authentication.scope();
    let mut salt = Vec::with_capacity(scope.len() + 4 + full_name.len());
    push_str(scope, &mut salt);
    push_u32be(master_frame_len(full_name, algorithm), &mut salt);
    push_str(full_name, &mut salt);

    kdf::stretch(master_password.as_bytes(), &salt)
}

/// The hex fingerprint identifying a master key, stored in profiles to
/// recognize the master password without retaining it.
pub fn key_id(master_key: &MasterKey) -> String {
    hex::encode_upper(hash::sha256(master_key.as_bytes()))
}

/// Derive the 32-byte site key for one (site, counter, purpose, context)
/// tuple.
pub fn site_key(
    master_key: &MasterKey,
    site_name: &str,
    counter: SiteCounter,
    purpose: KeyPurpose,
    key_context: Option<&str>,
    algorithm: AlgorithmVersion,
) -> Result<SiteKey> {
    if site_name.is_empty() {
        return Err(MpwError::MissingInput("site name".to_string()));
    }

    trace!(site = site_name, %counter, %purpose, "deriving site key");
    let scope = purpose.scope();
    let mut message = Vec::with_capacity(scope.len() + 12 + site_name.len());
    push_str(scope, &mut message);
    push_u32be(site_frame_len(site_name, algorithm), &mut message);
    push_str(site_name, &mut message);
    push_u32be(counter.value(), &mut message);
    // A present-but-empty context still contributes its length frame; an
    // absent one contributes nothing.
    if let Some(context) = key_context {
        push_u32be(site_frame_len(context, algorithm), &mut message);
        push_str(context, &mut message);
    }

    let mac = hash::hmac_sha256(master_key.as_bytes(), &message)?;
    Ok(SiteKey::new(mac))
}

/// Derive and render the site result: a templated password, the decrypted
/// stored secret, or a derived raw key.
pub fn site_result(
    master_key: &MasterKey,
    site_name: &str,
    counter: SiteCounter,
    purpose: KeyPurpose,
    key_context: Option<&str>,
    result_type: ResultType,
    result_param: Option<&str>,
    algorithm: AlgorithmVersion,
) -> Result<String> {
    if result_type.is_template() {
        let key = site_key(master_key, site_name, counter, purpose, key_context, algorithm)?;
        password_from_template(&key, result_type, algorithm)
    } else if result_type.is_stateful() {
        let state = result_param
            .ok_or_else(|| MpwError::MissingInput("stored content for stateful type".to_string()))?;
        let key = site_key(master_key, site_name, counter, purpose, key_context, algorithm)?;
        decrypt_state(&key, state)
    } else if result_type.is_derive() {
        derive_key(master_key, site_name, counter, purpose, key_context, result_param, algorithm)
    } else {
        Err(MpwError::Usage(format!("cannot render result type: {result_type}")))
    }
}

/// Encrypt content for storage under a stateful result type. Returns the
/// base64 storage form.
pub fn site_state(
    master_key: &MasterKey,
    site_name: &str,
    counter: SiteCounter,
    purpose: KeyPurpose,
    key_context: Option<&str>,
    result_type: ResultType,
    content: &str,
    algorithm: AlgorithmVersion,
) -> Result<String> {
    if !result_type.is_stateful() {
        return Err(MpwError::Usage(format!("cannot save content for result type: {result_type}")));
    }

    let key = site_key(master_key, site_name, counter, purpose, key_context, algorithm)?;
    let ciphertext = cipher::encrypt(&key, content.as_bytes())?;
    Ok(b64_encode(&ciphertext))
}

fn decrypt_state(key: &SiteKey, state: &str) -> Result<String> {
    let ciphertext = b64_decode(state)?;
    let plaintext = cipher::decrypt(key, &ciphertext)?;
    String::from_utf8(plaintext.as_bytes().to_vec())
        .map_err(|_| MpwError::Format("stored content is not valid UTF-8".to_string()))
}

fn password_from_template(
    site_key: &SiteKey,
    result_type: ResultType,
    algorithm: AlgorithmVersion,
) -> Result<String> {
    let templates = result_type
        .templates()
        .ok_or_else(|| MpwError::Usage(format!("not a template type: {result_type}")))?;

    let seed = site_key.as_bytes();
    let template = templates[seed[0] as usize % templates.len()];

    let mut password = String::with_capacity(template.len());
    for (i, class) in template.chars().enumerate() {
        let alphabet = class_characters(class)?;
        let index = match algorithm {
            // V0 reduced the selector byte as a signed value; preserved for
            // compatibility with legacy profiles.
            AlgorithmVersion::V0 => {
                (seed[i + 1] as i8 as i32).rem_euclid(alphabet.len() as i32) as usize
            }
            _ => seed[i + 1] as usize % alphabet.len(),
        };
        password.push(alphabet.as_bytes()[index] as char);
    }
    Ok(password)
}

fn derive_key(
    master_key: &MasterKey,
    site_name: &str,
    counter: SiteCounter,
    purpose: KeyPurpose,
    key_context: Option<&str>,
    result_param: Option<&str>,
    algorithm: AlgorithmVersion,
) -> Result<String> {
    let bits: u32 = match result_param {
        None => 512,
        Some(param) => param
            .parse()
            .map_err(|_| MpwError::Usage(format!("invalid key size: {param}")))?,
    };

    let key = site_key(master_key, site_name, counter, purpose, key_context, algorithm)?;
    match bits {
        128 | 256 => Ok(hex::encode(&key.as_bytes()[..bits as usize / 8])),
        512 => {
            // A second site key at the next counter supplies the tail half.
            let tail = site_key(master_key, site_name, counter.next(), purpose, key_context, algorithm)?;
            let mut out = String::with_capacity(128);
            out.push_str(&hex::encode(key.as_bytes()));
            out.push_str(&hex::encode(tail.as_bytes()));
            Ok(out)
        }
        _ => Err(MpwError::Usage(format!("invalid key size: {bits} (use 128, 256 or 512)"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::OnceLock;

    const FULL_NAME: &str = "Robert Lee Mitchell";
    const MASTER_PASSWORD: &str = "banana colored duckling";
    const SITE: &str = "masterpasswordapp.com";

    /// The V3 master key shared by most tests; stretched once.
    fn v3_key() -> &'static MasterKey {
        static KEY: OnceLock<MasterKey> = OnceLock::new();
        KEY.get_or_init(|| {
            master_key(FULL_NAME, MASTER_PASSWORD, AlgorithmVersion::V3).unwrap()
        })
    }

    fn v3_password(counter: u32, result_type: ResultType) -> String {
        site_result(
            v3_key(),
            SITE,
            SiteCounter::new(counter),
            KeyPurpose::Authentication,
            None,
            result_type,
            None,
            AlgorithmVersion::V3,
        )
        .unwrap()
    }

    #[test]
    fn test_acceptance_vector_long() {
        assert_eq!(v3_password(1, ResultType::Long), "Jejr5[RepuSosp");
    }

    #[test]
    fn test_acceptance_vector_maximum() {
        assert_eq!(v3_password(1, ResultType::Maximum), "W6@692^B1#&@gVdSdLZ@");
    }

    #[test]
    fn test_acceptance_vector_pin() {
        assert_eq!(v3_password(1, ResultType::Pin), "7662");
    }

    #[test]
    fn test_acceptance_vector_medium_basic_short() {
        assert_eq!(v3_password(1, ResultType::Medium), "Jej2$Quv");
        assert_eq!(v3_password(1, ResultType::Basic), "WAo2xIg6");
        assert_eq!(v3_password(1, ResultType::Short), "Jej2");
    }

    #[test]
    fn test_counter_changes_result() {
        assert_ne!(v3_password(2, ResultType::Long), v3_password(1, ResultType::Long));
    }

    #[test]
    fn test_counter_extreme_derives() {
        let password = v3_password(u32::MAX, ResultType::Long);
        assert_eq!(password.len(), 14);
    }

    #[test]
    fn test_purpose_changes_result() {
        let auth = v3_password(1, ResultType::Long);
        let ident = site_result(
            v3_key(),
            SITE,
            SiteCounter::INITIAL,
            KeyPurpose::Identification,
            None,
            ResultType::Long,
            None,
            AlgorithmVersion::V3,
        )
        .unwrap();
        assert_ne!(auth, ident);
    }

    #[test]
    fn test_identification_login_is_deterministic() {
        let derive = || {
            site_result(
                v3_key(),
                SITE,
                SiteCounter::INITIAL,
                KeyPurpose::Identification,
                None,
                ResultType::Name,
                None,
                AlgorithmVersion::V3,
            )
            .unwrap()
        };
        let login = derive();
        assert_eq!(login, derive());
        assert_eq!(login.len(), 9);
        assert!(login.chars().all(|c| c.is_ascii_lowercase()));
    }

    #[test]
    fn test_recovery_phrase_uses_context() {
        let answer = |context: Option<&str>| {
            site_result(
                v3_key(),
                SITE,
                SiteCounter::INITIAL,
                KeyPurpose::Recovery,
                context,
                ResultType::Phrase,
                None,
                AlgorithmVersion::V3,
            )
            .unwrap()
        };
        assert_eq!(answer(Some("question")), answer(Some("question")));
        assert_ne!(answer(Some("question")), answer(None));
        assert!(answer(Some("question")).contains(' '));
    }

    fn versioned_password(full_name: &str, site: &str, algorithm: AlgorithmVersion) -> String {
        let key = master_key(full_name, MASTER_PASSWORD, algorithm).unwrap();
        site_result(
            &key,
            site,
            SiteCounter::INITIAL,
            KeyPurpose::Authentication,
            None,
            ResultType::Long,
            None,
            algorithm,
        )
        .unwrap()
    }

    #[test]
    fn test_algorithm_isolation() {
        // Multi-byte names and sites exercise every version-specific
        // encoding difference; all four versions must disagree.
        let v = |algorithm| versioned_password("Ünicöde Üser", "exämple.com", algorithm);
        assert_eq!(v(AlgorithmVersion::V0), "YocaKiqu1$Hips");
        assert_eq!(v(AlgorithmVersion::V1), "YucaPiva1$Mops");
        assert_eq!(v(AlgorithmVersion::V2), "MepoQaxuGesj4]");
        assert_eq!(v(AlgorithmVersion::V3), "JeqoFugsDuzi1+");
    }

    #[test]
    fn test_ascii_inputs_collapse_later_versions() {
        // With single-byte names the frame lengths coincide, so V1..V3
        // reproduce each other; V0's signed reduction still differs.
        assert_eq!(versioned_password(FULL_NAME, SITE, AlgorithmVersion::V0), "Jadm9[MapuNosk");
        assert_eq!(versioned_password(FULL_NAME, SITE, AlgorithmVersion::V1), "Jejr5[RepuSosp");
        assert_eq!(versioned_password(FULL_NAME, SITE, AlgorithmVersion::V2), "Jejr5[RepuSosp");
    }

    #[test]
    fn test_template_conformance() {
        // Every character of every produced password belongs to the class
        // at its position in one of the type's patterns.
        for result_type in crate::types::ALL_RESULT_TYPES {
            let Some(templates) = result_type.templates() else { continue };
            let password = v3_password(1, result_type);
            let conforms = templates.iter().any(|template| {
                template.len() == password.len()
                    && template.chars().zip(password.chars()).all(|(class, c)| {
                        class_characters(class).unwrap().contains(c)
                    })
            });
            assert!(conforms, "{result_type}: {password:?} matches no pattern");
        }
    }

    #[test]
    fn test_key_id_consistency() {
        let id = key_id(v3_key());
        assert_eq!(id.len(), 64);
        assert_eq!(id, hex::encode_upper(hash::sha256(v3_key().as_bytes())));
    }

    #[test]
    fn test_unicode_name_framing_splits_at_v3() {
        // A multi-byte name makes the code-point and byte frames disagree;
        // the master-key salt switches to byte counting at V3.
        let v2 = master_key("Ünicode Üser", MASTER_PASSWORD, AlgorithmVersion::V2).unwrap();
        let v3 = master_key("Ünicode Üser", MASTER_PASSWORD, AlgorithmVersion::V3).unwrap();
        assert_ne!(v2.as_bytes(), v3.as_bytes());

        let v1 = master_key("Ünicode Üser", MASTER_PASSWORD, AlgorithmVersion::V1).unwrap();
        assert_eq!(v1.as_bytes(), v2.as_bytes());
    }

    #[test]
    fn test_derive_key_sizes() {
        let derive = |param: Option<&str>| {
            site_result(
                v3_key(),
                SITE,
                SiteCounter::INITIAL,
                KeyPurpose::Authentication,
                None,
                ResultType::Key,
                param,
                AlgorithmVersion::V3,
            )
        };
        assert_eq!(derive(Some("128")).unwrap().len(), 32);
        assert_eq!(derive(Some("256")).unwrap().len(), 64);
        assert_eq!(derive(Some("512")).unwrap().len(), 128);
        assert_eq!(derive(None).unwrap().len(), 128);
        // The 512-bit key extends the 256-bit key.
        assert!(derive(Some("512")).unwrap().starts_with(&derive(Some("256")).unwrap()));
        assert!(derive(Some("192")).is_err());
        assert!(derive(Some("banana")).is_err());
    }

    #[test]
    fn test_state_roundtrip() {
        let state = site_state(
            v3_key(),
            SITE,
            SiteCounter::INITIAL,
            KeyPurpose::Authentication,
            None,
            ResultType::Personal,
            "my stored secret",
            AlgorithmVersion::V3,
        )
        .unwrap();
        // Storage form is base64 ciphertext, not the secret.
        assert!(!state.contains("stored secret"));

        let restored = site_result(
            v3_key(),
            SITE,
            SiteCounter::INITIAL,
            KeyPurpose::Authentication,
            None,
            ResultType::Personal,
            Some(&state),
            AlgorithmVersion::V3,
        )
        .unwrap();
        assert_eq!(restored, "my stored secret");
    }

    #[test]
    fn test_empty_inputs_rejected() {
        assert!(master_key("", MASTER_PASSWORD, AlgorithmVersion::V3).is_err());
        assert!(master_key(FULL_NAME, "", AlgorithmVersion::V3).is_err());
        assert!(site_key(
            v3_key(),
            "",
            SiteCounter::INITIAL,
            KeyPurpose::Authentication,
            None,
            AlgorithmVersion::V3
        )
        .is_err());
    }
}
