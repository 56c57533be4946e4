/// Enumerations and lookup tables for the credential pipeline.
///
/// The integer codes, template pattern lists and class alphabets are the
/// compatibility surface shared with every other implementation: profiles
/// on disk reference the codes, and generated passwords depend on the
/// exact content and order of the tables. Do not edit them.
use std::fmt;

use crate::error::{MpwError, Result};

// Result-type class and feature bits.
const CLASS_TEMPLATE: u32 = 1 << 4;
const CLASS_STATEFUL: u32 = 1 << 5;
const CLASS_DERIVE: u32 = 1 << 6;
const FEATURE_EXPORT_CONTENT: u32 = 1 << 10;
const FEATURE_DEVICE_PRIVATE: u32 = 1 << 11;
const FEATURE_ALTERNATIVE: u32 = 1 << 12;

/// The shape of a derived credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultType {
    /// 20 characters, contains symbols.
    Maximum,
    /// Copy-friendly, 14 characters, symbols.
    Long,
    /// Copy-friendly, 8 characters, symbols.
    Medium,
    /// 8 characters, no symbols.
    Basic,
    /// Copy-friendly, 4 characters, no symbols.
    Short,
    /// 4 numbers.
    Pin,
    /// 9 letter name.
    Name,
    /// 20 character sentence.
    Phrase,
    /// Saved personal password, encrypted in the profile.
    Personal,
    /// Saved device-private password, encrypted in the profile.
    Device,
    /// Derived encryption key of a requested bit size.
    Key,
}

pub const ALL_RESULT_TYPES: [ResultType; 11] = [
    ResultType::Maximum,
    ResultType::Long,
    ResultType::Medium,
    ResultType::Basic,
    ResultType::Short,
    ResultType::Pin,
    ResultType::Name,
    ResultType::Phrase,
    ResultType::Personal,
    ResultType::Device,
    ResultType::Key,
];

impl ResultType {
    /// The published integer code, as serialized in profiles.
    pub fn code(self) -> u32 {
        match self {
            ResultType::Maximum => CLASS_TEMPLATE,
            ResultType::Long => 0x1 | CLASS_TEMPLATE,
            ResultType::Medium => 0x2 | CLASS_TEMPLATE,
            ResultType::Basic => 0x3 | CLASS_TEMPLATE,
            ResultType::Short => 0x4 | CLASS_TEMPLATE,
            ResultType::Pin => 0x5 | CLASS_TEMPLATE,
            ResultType::Name => 0xE | CLASS_TEMPLATE,
            ResultType::Phrase => 0xF | CLASS_TEMPLATE,
            ResultType::Personal => CLASS_STATEFUL | FEATURE_EXPORT_CONTENT,
            ResultType::Device => 0x1 | CLASS_STATEFUL | FEATURE_DEVICE_PRIVATE,
            ResultType::Key => CLASS_DERIVE | FEATURE_ALTERNATIVE,
        }
    }

    pub fn from_code(code: u32) -> Result<Self> {
        ALL_RESULT_TYPES
            .into_iter()
            .find(|t| t.code() == code)
            .ok_or_else(|| MpwError::Format(format!("unknown result type code: {code}")))
    }

    /// Look a type up by its one-letter short name or its long name.
    pub fn from_name(name: &str) -> Result<Self> {
        let mut chars = name.chars();
        if let (Some(short), None) = (chars.next(), chars.next()) {
            return ALL_RESULT_TYPES
                .into_iter()
                .find(|t| t.short_name() == short)
                .ok_or_else(|| MpwError::Usage(format!("unknown result type: {name}")));
        }
        ALL_RESULT_TYPES
            .into_iter()
            .find(|t| t.long_name().eq_ignore_ascii_case(name))
            .ok_or_else(|| MpwError::Usage(format!("unknown result type: {name}")))
    }

    pub fn short_name(self) -> char {
        match self {
            ResultType::Maximum => 'x',
            ResultType::Long => 'l',
            ResultType::Medium => 'm',
            ResultType::Basic => 'b',
            ResultType::Short => 's',
            ResultType::Pin => 'i',
            ResultType::Name => 'n',
            ResultType::Phrase => 'p',
            ResultType::Personal => 'P',
            ResultType::Device => 'D',
            ResultType::Key => 'K',
        }
    }

    pub fn long_name(self) -> &'static str {
        match self {
            ResultType::Maximum => "maximum",
            ResultType::Long => "long",
            ResultType::Medium => "medium",
            ResultType::Basic => "basic",
            ResultType::Short => "short",
            ResultType::Pin => "pin",
            ResultType::Name => "name",
            ResultType::Phrase => "phrase",
            ResultType::Personal => "personal",
            ResultType::Device => "device",
            ResultType::Key => "key",
        }
    }

    pub fn is_template(self) -> bool {
        self.code() & CLASS_TEMPLATE != 0
    }

    pub fn is_stateful(self) -> bool {
        self.code() & CLASS_STATEFUL != 0
    }

    pub fn is_derive(self) -> bool {
        self.code() & CLASS_DERIVE != 0
    }

    /// Whether this type stands outside the site's main credential
    /// (derived keys do not update the site record).
    pub fn is_alternative(self) -> bool {
        self.code() & FEATURE_ALTERNATIVE != 0
    }

    /// The candidate pattern strings for a template type.
    pub fn templates(self) -> Option<&'static [&'static str]> {
        match self {
            ResultType::Maximum => Some(TEMPLATES_MAXIMUM),
            ResultType::Long => Some(TEMPLATES_LONG),
            ResultType::Medium => Some(TEMPLATES_MEDIUM),
            ResultType::Basic => Some(TEMPLATES_BASIC),
            ResultType::Short => Some(TEMPLATES_SHORT),
            ResultType::Pin => Some(TEMPLATES_PIN),
            ResultType::Name => Some(TEMPLATES_NAME),
            ResultType::Phrase => Some(TEMPLATES_PHRASE),
            _ => None,
        }
    }
}

impl Default for ResultType {
    fn default() -> Self {
        ResultType::Long
    }
}

impl fmt::Display for ResultType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.long_name())
    }
}

static TEMPLATES_MAXIMUM: &[&str] = &["anoxxxxxxxxxxxxxxxxx", "axxxxxxxxxxxxxxxxxno"];
static TEMPLATES_LONG: &[&str] = &[
    "CvcvnoCvcvCvcv",
    "CvcvCvcvnoCvcv",
    "CvcvCvcvCvcvno",
    "CvccnoCvcvCvcv",
    "CvccCvcvnoCvcv",
    "CvccCvcvCvcvno",
    "CvcvnoCvccCvcv",
    "CvcvCvccnoCvcv",
    "CvcvCvccCvcvno",
    "CvcvnoCvcvCvcc",
    "CvcvCvcvnoCvcc",
    "CvcvCvcvCvccno",
    "CvccnoCvccCvcv",
    "CvccCvccnoCvcv",
    "CvccCvccCvcvno",
    "CvcvnoCvccCvcc",
    "CvcvCvccnoCvcc",
    "CvcvCvccCvccno",
    "CvccnoCvcvCvcc",
    "CvccCvcvnoCvcc",
    "CvccCvcvCvccno",
];
static TEMPLATES_MEDIUM: &[&str] = &["CvcnoCvc", "CvcCvcno"];
static TEMPLATES_BASIC: &[&str] = &["aaanaaan", "aannaaan", "aaannaaa"];
static TEMPLATES_SHORT: &[&str] = &["Cvcn"];
static TEMPLATES_PIN: &[&str] = &["nnnn"];
static TEMPLATES_NAME: &[&str] = &["cvccvcvcv"];
static TEMPLATES_PHRASE: &[&str] = &["cvcc cvc cvccvcv cvc", "cvc cvccvcvcv cvcv", "cv cvccv cvc cvcvccv"];

/// The ordered alphabet for a template class character.
pub fn class_characters(class: char) -> Result<&'static str> {
    match class {
        'V' => Ok("AEIOU"),
        'C' => Ok("BCDFGHJKLMNPQRSTVWXYZ"),
        'v' => Ok("aeiou"),
        'c' => Ok("bcdfghjklmnpqrstvwxyz"),
        'A' => Ok("AEIOUBCDFGHJKLMNPQRSTVWXYZ"),
        'a' => Ok("AEIOUaeiouBCDFGHJKLMNPQRSTVWXYZbcdfghjklmnpqrstvwxyz"),
        'n' => Ok("0123456789"),
        'o' => Ok("@&%?,=[]_:-+*$#!'^~;()/."),
        'x' => Ok("AEIOUaeiouBCDFGHJKLMNPQRSTVWXYZbcdfghjklmnpqrstvwxyz0123456789!@#$%^&*()"),
        ' ' => Ok(" "),
        _ => Err(MpwError::Format(format!("unknown template class: {class:?}"))),
    }
}

/// What the derived token is for; selects the derivation scope and the
/// default template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyPurpose {
    /// An authentication token such as a password.
    #[default]
    Authentication,
    /// An identification token such as a username.
    Identification,
    /// A recovery token such as a security answer.
    Recovery,
}

impl KeyPurpose {
    /// The scope string prefixed to this purpose's derivation messages.
    pub fn scope(self) -> &'static str {
        match self {
            KeyPurpose::Authentication => "com.lyndir.masterpassword",
            KeyPurpose::Identification => "com.lyndir.masterpassword.login",
            KeyPurpose::Recovery => "com.lyndir.masterpassword.answer",
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "a" | "auth" | "authentication" => Ok(KeyPurpose::Authentication),
            "i" | "ident" | "identification" => Ok(KeyPurpose::Identification),
            "r" | "rec" | "recovery" => Ok(KeyPurpose::Recovery),
            _ => Err(MpwError::Usage(format!("unknown purpose: {name}"))),
        }
    }

    pub fn long_name(self) -> &'static str {
        match self {
            KeyPurpose::Authentication => "authentication",
            KeyPurpose::Identification => "identification",
            KeyPurpose::Recovery => "recovery",
        }
    }

    /// The template used for this purpose when none is specified.
    pub fn default_result_type(self) -> ResultType {
        match self {
            KeyPurpose::Authentication => ResultType::Long,
            KeyPurpose::Identification => ResultType::Name,
            KeyPurpose::Recovery => ResultType::Phrase,
        }
    }
}

impl fmt::Display for KeyPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.long_name())
    }
}

/// The site counter. 1 is the initial value; 0 selects the stored login
/// for identification instead of deriving one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SiteCounter(u32);

impl SiteCounter {
    pub const INITIAL: SiteCounter = SiteCounter(1);

    pub fn new(value: u32) -> Self {
        Self(value)
    }

    pub fn value(self) -> u32 {
        self.0
    }

    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl Default for SiteCounter {
    fn default() -> Self {
        Self::INITIAL
    }
}

impl std::str::FromStr for SiteCounter {
    type Err = MpwError;

    fn from_str(s: &str) -> Result<Self> {
        s.parse::<u32>()
            .map(SiteCounter)
            .map_err(|_| MpwError::Usage(format!("invalid site counter: {s}")))
    }
}

impl fmt::Display for SiteCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The derivation algorithm version. Every version remains reproducible
/// forever; new profiles use the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AlgorithmVersion {
    V0,
    V1,
    V2,
    V3,
}

impl AlgorithmVersion {
    pub const FIRST: AlgorithmVersion = AlgorithmVersion::V0;
    pub const LAST: AlgorithmVersion = AlgorithmVersion::V3;
    pub const CURRENT: AlgorithmVersion = AlgorithmVersion::V3;

    pub fn as_u32(self) -> u32 {
        match self {
            AlgorithmVersion::V0 => 0,
            AlgorithmVersion::V1 => 1,
            AlgorithmVersion::V2 => 2,
            AlgorithmVersion::V3 => 3,
        }
    }

    pub fn from_u32(value: u32) -> Result<Self> {
        match value {
            0 => Ok(AlgorithmVersion::V0),
            1 => Ok(AlgorithmVersion::V1),
            2 => Ok(AlgorithmVersion::V2),
            3 => Ok(AlgorithmVersion::V3),
            _ => Err(MpwError::Usage(format!("unknown algorithm version: {value}"))),
        }
    }
}

impl Default for AlgorithmVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

impl fmt::Display for AlgorithmVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u32())
    }
}

/// On-disk profile format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MarshalFormat {
    /// No profile file.
    None,
    /// Line-oriented ASCII export.
    Flat,
    /// JSON export.
    #[default]
    Json,
}

impl MarshalFormat {
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "n" | "none" => Ok(MarshalFormat::None),
            "f" | "flat" => Ok(MarshalFormat::Flat),
            "j" | "json" => Ok(MarshalFormat::Json),
            _ => Err(MpwError::Usage(format!("unknown format: {name}"))),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            MarshalFormat::None => "none",
            MarshalFormat::Flat => "flat",
            MarshalFormat::Json => "json",
        }
    }

    /// The profile file extension for this format.
    pub fn extension(self) -> Option<&'static str> {
        match self {
            MarshalFormat::None => None,
            MarshalFormat::Flat => Some("mpsites"),
            MarshalFormat::Json => Some("mpsites.json"),
        }
    }
}

impl fmt::Display for MarshalFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
