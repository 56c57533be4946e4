/// Profile marshalling: the user/site/question model and the read/write
/// entry points for the flat and json on-disk formats.
///
/// Reading authenticates the master password against the stored key ID
/// before anything else; a wrong password never reaches decryption or
/// rendering. Writing honors the profile's redaction mode: with
/// `redacted` set, stateful content is written as ciphertext and template
/// content is omitted entirely.
pub mod flat;
pub mod json;

use chrono::{DateTime, Utc};

use crate::algorithm;
use crate::crypto::hash;
use crate::crypto::sensitive::{MasterKey, SensitiveString};
use crate::error::{MpwError, Result};
use crate::types::{AlgorithmVersion, KeyPurpose, MarshalFormat, ResultType, SiteCounter};

/// A recovery question attached to a site. An empty keyword is the
/// site's default question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub keyword: String,
    pub result_type: ResultType,
    pub content: Option<String>,
}

impl Question {
    pub fn new(keyword: &str) -> Self {
        Self {
            keyword: keyword.to_string(),
            result_type: ResultType::Phrase,
            content: None,
        }
    }
}

/// One site record in a user's profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Site {
    pub name: String,
    pub result_type: ResultType,
    pub counter: SiteCounter,
    pub algorithm: AlgorithmVersion,
    pub login_name: Option<String>,
    pub login_generated: bool,
    /// Cleartext in memory; stateful types persist it encrypted when the
    /// profile is redacted.
    pub content: Option<String>,
    pub url: Option<String>,
    pub uses: u32,
    pub last_used: DateTime<Utc>,
    pub questions: Vec<Question>,
}

impl Site {
    pub fn new(
        name: &str,
        result_type: ResultType,
        counter: SiteCounter,
        algorithm: AlgorithmVersion,
    ) -> Self {
        Self {
            name: name.to_string(),
            result_type,
            counter,
            algorithm,
            login_name: None,
            login_generated: false,
            content: None,
            url: None,
            uses: 0,
            last_used: Utc::now(),
            questions: Vec::new(),
        }
    }
}

/// A user profile: derivation defaults plus the ordered site list.
///
/// The master password is retained in memory for the session only and is
/// never serialized.
#[derive(Debug, Clone)]
pub struct User {
    pub avatar: u32,
    pub full_name: String,
    pub master_password: SensitiveString,
    pub key_id: Option<String>,
    pub algorithm: AlgorithmVersion,
    pub default_type: ResultType,
    pub redacted: bool,
    pub last_used: DateTime<Utc>,
    pub sites: Vec<Site>,
}

impl User {
    pub fn new(full_name: &str, master_password: &str) -> Self {
        Self {
            avatar: 0,
            full_name: full_name.to_string(),
            master_password: SensitiveString::from(master_password),
            key_id: None,
            algorithm: AlgorithmVersion::CURRENT,
            default_type: ResultType::Long,
            redacted: true,
            last_used: Utc::now(),
            sites: Vec::new(),
        }
    }

    pub fn find_site(&self, name: &str) -> Option<&Site> {
        self.sites.iter().find(|s| s.name == name)
    }

    pub fn find_site_mut(&mut self, name: &str) -> Option<&mut Site> {
        self.sites.iter_mut().find(|s| s.name == name)
    }

    /// Append a new site record and return it.
    pub fn add_site(
        &mut self,
        name: &str,
        result_type: ResultType,
        counter: SiteCounter,
        algorithm: AlgorithmVersion,
    ) -> &mut Site {
        self.sites.push(Site::new(name, result_type, counter, algorithm));
        let index = self.sites.len() - 1;
        &mut self.sites[index]
    }
}

/// Pre-authentication profile metadata, extractable without the master
/// password.
#[derive(Debug, Clone)]
pub struct MarshalInfo {
    pub format: MarshalFormat,
    pub full_name: Option<String>,
    pub algorithm: AlgorithmVersion,
    pub key_id: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub redacted: bool,
}

/// Detect the format of profile data and extract its metadata.
///
/// Json profiles open with `{`; flat profiles with `#`.
pub fn read_info(input: &str) -> Result<MarshalInfo> {
    match input.trim_start().chars().next() {
        Some('{') => json::read_info(input),
        Some('#') => flat::read_info(input),
        _ => Err(MpwError::Format("unrecognized profile format".to_string())),
    }
}

/// Parse a profile, authenticate the master password against the stored
/// key ID, and decrypt stored site content.
pub fn read(input: &str, format: MarshalFormat, master_password: &str) -> Result<User> {
    let mut user = match format {
        MarshalFormat::Flat => flat::parse(input)?,
        MarshalFormat::Json => json::parse(input)?,
        MarshalFormat::None => {
            return Err(MpwError::Format("no profile format to read".to_string()))
        }
    };
    user.master_password = SensitiveString::from(master_password);
    authenticate(&mut user)?;
    Ok(user)
}

/// Serialize a profile in the given format, honoring its redaction mode.
pub fn write(user: &User, format: MarshalFormat) -> Result<String> {
    match format {
        MarshalFormat::Flat => flat::emit(user),
        MarshalFormat::Json => json::emit(user),
        MarshalFormat::None => Err(MpwError::Format("no profile format to write".to_string())),
    }
}

/// Master keys by algorithm version, derived at most once each.
pub(crate) struct MasterKeyCache {
    full_name: String,
    master_password: SensitiveString,
    keys: [Option<MasterKey>; 4],
}

impl MasterKeyCache {
    pub fn new(full_name: &str, master_password: &str) -> Self {
        Self {
            full_name: full_name.to_string(),
            master_password: SensitiveString::from(master_password),
            keys: [None, None, None, None],
        }
    }

    pub fn get(&mut self, algorithm: AlgorithmVersion) -> Result<MasterKey> {
        let index = algorithm.as_u32() as usize;
        match &self.keys[index] {
            Some(key) => Ok(key.clone()),
            None => {
                let key = algorithm::master_key(
                    &self.full_name,
                    self.master_password.as_str(),
                    algorithm,
                )?;
                self.keys[index] = Some(key.clone());
                Ok(key)
            }
        }
    }
}

/// The single authentication point for a profile: the derived key's ID
/// must match the stored one. Then rehydrate site content — stateful
/// ciphertext is decrypted, template content is discarded so it is always
/// regenerated rather than trusted.
fn authenticate(user: &mut User) -> Result<()> {
    let mut cache = MasterKeyCache::new(&user.full_name, user.master_password.as_str());

    let key = cache.get(user.algorithm)?;
    if let Some(stored) = &user.key_id {
        let stored_bytes = hex::decode(stored)
            .map_err(|e| MpwError::Format(format!("invalid key ID: {e}")))?;
        let derived = hash::sha256(key.as_bytes());
        if !hash::constant_time_eq(&derived, &stored_bytes) {
            return Err(MpwError::MasterPassword);
        }
    }
    user.key_id = Some(algorithm::key_id(&key));

    for site in &mut user.sites {
        if site.result_type.is_stateful() {
            if user.redacted {
                if let Some(state) = site.content.take() {
                    let master = cache.get(site.algorithm)?;
                    site.content = Some(algorithm::site_result(
                        &master,
                        &site.name,
                        site.counter,
                        KeyPurpose::Authentication,
                        None,
                        site.result_type,
                        Some(&state),
                        site.algorithm,
                    )?);
                }
            }
        } else {
            site.content = None;
        }
        for question in &mut site.questions {
            question.content = None;
        }
    }
    Ok(())
}

/// The on-disk form of a site's content under the profile's redaction
/// mode.
pub(crate) fn export_content(
    user: &User,
    site: &Site,
    cache: &mut MasterKeyCache,
) -> Result<Option<String>> {
    if user.redacted {
        if site.result_type.is_stateful() {
            if let Some(content) = &site.content {
                let master = cache.get(site.algorithm)?;
                return algorithm::site_state(
                    &master,
                    &site.name,
                    site.counter,
                    KeyPurpose::Authentication,
                    None,
                    site.result_type,
                    content,
                    site.algorithm,
                )
                .map(Some);
            }
        }
        Ok(None)
    } else if site.result_type.is_template() {
        let master = cache.get(site.algorithm)?;
        algorithm::site_result(
            &master,
            &site.name,
            site.counter,
            KeyPurpose::Authentication,
            None,
            site.result_type,
            None,
            site.algorithm,
        )
        .map(Some)
    } else {
        Ok(site.content.clone())
    }
}

/// The on-disk form of a question's answer: omitted when redacted,
/// regenerated otherwise.
pub(crate) fn export_answer(
    user: &User,
    site: &Site,
    question: &Question,
    cache: &mut MasterKeyCache,
) -> Result<Option<String>> {
    if user.redacted {
        return Ok(None);
    }
    let master = cache.get(site.algorithm)?;
    algorithm::site_result(
        &master,
        &site.name,
        SiteCounter::INITIAL,
        KeyPurpose::Recovery,
        Some(&question.keyword),
        question.result_type,
        None,
        site.algorithm,
    )
    .map(Some)
}

/// The key ID to serialize: the stored one, or derived on demand.
pub(crate) fn export_key_id(user: &User, cache: &mut MasterKeyCache) -> Result<String> {
    match &user.key_id {
        Some(id) => Ok(id.clone()),
        None => Ok(algorithm::key_id(&cache.get(user.algorithm)?)),
    }
}

pub(crate) const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

pub(crate) fn parse_date(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| MpwError::Format(format!("invalid date {value:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const FULL_NAME: &str = "Robert Lee Mitchell";
    const MASTER_PASSWORD: &str = "banana colored duckling";

    fn fixed_date() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2018, 4, 26, 19, 20, 21).unwrap()
    }

    fn sample_user(redacted: bool) -> User {
        let mut user = User::new(FULL_NAME, MASTER_PASSWORD);
        user.redacted = redacted;
        user.last_used = fixed_date();

        let site = user.add_site(
            "masterpasswordapp.com",
            ResultType::Long,
            SiteCounter::INITIAL,
            AlgorithmVersion::V3,
        );
        site.uses = 3;
        site.last_used = fixed_date();
        site.url = Some("https://masterpasswordapp.com".to_string());
        site.questions.push(Question::new(""));
        site.questions.push(Question::new("maiden name"));

        let stateful = user.add_site(
            "vault.example",
            ResultType::Personal,
            SiteCounter::INITIAL,
            AlgorithmVersion::V3,
        );
        stateful.content = Some("my stored secret".to_string());
        stateful.login_name = Some("robert".to_string());
        stateful.last_used = fixed_date();
        user
    }

    #[test]
    fn test_json_roundtrip() {
        let user = sample_user(true);
        let serialized = write(&user, MarshalFormat::Json).unwrap();
        let restored = read(&serialized, MarshalFormat::Json, MASTER_PASSWORD).unwrap();

        assert_eq!(restored.full_name, user.full_name);
        assert_eq!(restored.algorithm, user.algorithm);
        assert_eq!(restored.default_type, user.default_type);
        assert!(restored.redacted);
        assert_eq!(restored.sites.len(), 2);

        let site = restored.find_site("masterpasswordapp.com").unwrap();
        assert_eq!(site.result_type, ResultType::Long);
        assert_eq!(site.counter, SiteCounter::INITIAL);
        assert_eq!(site.uses, 3);
        assert_eq!(site.last_used, fixed_date());
        assert_eq!(site.url.as_deref(), Some("https://masterpasswordapp.com"));
        assert_eq!(site.questions.len(), 2);
        assert_eq!(site.questions[1].keyword, "maiden name");

        // Stateful content decrypts back to the stored secret.
        let stateful = restored.find_site("vault.example").unwrap();
        assert_eq!(stateful.content.as_deref(), Some("my stored secret"));
        assert_eq!(stateful.login_name.as_deref(), Some("robert"));
    }

    #[test]
    fn test_flat_roundtrip() {
        let user = sample_user(true);
        let serialized = write(&user, MarshalFormat::Flat).unwrap();
        let restored = read(&serialized, MarshalFormat::Flat, MASTER_PASSWORD).unwrap();

        assert_eq!(restored.full_name, user.full_name);
        assert_eq!(restored.sites.len(), 2);

        let site = restored.find_site("masterpasswordapp.com").unwrap();
        assert_eq!(site.result_type, ResultType::Long);
        assert_eq!(site.algorithm, AlgorithmVersion::V3);
        assert_eq!(site.uses, 3);

        let stateful = restored.find_site("vault.example").unwrap();
        assert_eq!(stateful.content.as_deref(), Some("my stored secret"));
    }

    #[test]
    fn test_redacted_serialization_has_no_plaintext() {
        let user = sample_user(true);
        for format in [MarshalFormat::Json, MarshalFormat::Flat] {
            let serialized = write(&user, format).unwrap();
            assert!(!serialized.contains("my stored secret"), "{format}: plaintext leaked");
            // The template credential is recomputable, so it is omitted too.
            assert!(!serialized.contains("Jejr5[RepuSosp"), "{format}: credential leaked");
        }
    }

    #[test]
    fn test_unredacted_serialization_contains_credentials() {
        let user = sample_user(false);
        let serialized = write(&user, MarshalFormat::Json).unwrap();
        assert!(serialized.contains("Jejr5[RepuSosp"));
        assert!(serialized.contains("my stored secret"));
    }

    #[test]
    fn test_wrong_master_password_is_rejected() {
        let user = sample_user(true);
        let serialized = write(&user, MarshalFormat::Json).unwrap();
        let result = read(&serialized, MarshalFormat::Json, "wrong password");
        assert!(matches!(result, Err(MpwError::MasterPassword)));
    }

    #[test]
    fn test_read_info_detects_format() {
        let user = sample_user(true);

        let json = write(&user, MarshalFormat::Json).unwrap();
        let info = read_info(&json).unwrap();
        assert_eq!(info.format, MarshalFormat::Json);
        assert_eq!(info.full_name.as_deref(), Some(FULL_NAME));
        assert_eq!(info.algorithm, AlgorithmVersion::V3);
        assert!(info.redacted);
        assert!(info.key_id.is_some());

        let flat = write(&user, MarshalFormat::Flat).unwrap();
        let info = read_info(&flat).unwrap();
        assert_eq!(info.format, MarshalFormat::Flat);
        assert_eq!(info.full_name.as_deref(), Some(FULL_NAME));

        assert!(read_info("gibberish").is_err());
    }

    #[test]
    fn test_template_content_is_never_trusted() {
        // An unredacted profile carries a stale credential; reading must
        // discard it so it is regenerated from parameters.
        let user = sample_user(false);
        let serialized = write(&user, MarshalFormat::Json).unwrap();
        let tampered = serialized.replace("Jejr5[RepuSosp", "AttackerChosen");
        let restored = read(&tampered, MarshalFormat::Json, MASTER_PASSWORD).unwrap();
        let site = restored.find_site("masterpasswordapp.com").unwrap();
        assert_eq!(site.content, None);
    }
}
