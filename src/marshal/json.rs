/// The json profile format: an `export` section with format metadata, a
/// `user` section with the envelope fields, and a `sites` object keyed by
/// site name in insertion order.
///
/// Unknown fields are dropped with a warning rather than round-tripped.
use serde_json::{json, Map, Value};
use tracing::warn;

use crate::error::{MpwError, Result};
use crate::marshal::{
    export_answer, export_content, export_key_id, parse_date, MarshalInfo, MasterKeyCache,
    Question, Site, User, DATE_FORMAT,
};
use crate::types::{AlgorithmVersion, MarshalFormat, ResultType, SiteCounter};

const EXPORT_KEYS: &[&str] = &["format", "redacted", "date"];
const USER_KEYS: &[&str] = &["avatar", "full_name", "last_used", "key_id", "algorithm", "default_type"];
const SITE_KEYS: &[&str] = &[
    "type",
    "counter",
    "algorithm",
    "password",
    "login_name",
    "login_generated",
    "uses",
    "last_used",
    "questions",
    "_ext_mpw",
];

fn object<'a>(value: &'a Value, what: &str) -> Result<&'a Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| MpwError::Format(format!("{what} is not a json object")))
}

fn get_str(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key).and_then(Value::as_str).map(str::to_string)
}

fn get_u32(map: &Map<String, Value>, key: &str) -> Result<Option<u32>> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| MpwError::Format(format!("invalid numeric field {key}: {value}"))),
    }
}

fn warn_unknown(map: &Map<String, Value>, known: &[&str], context: &str) {
    for key in map.keys() {
        if !known.contains(&key.as_str()) {
            warn!("dropping unknown {context} field: {key}");
        }
    }
}

pub(super) fn read_info(input: &str) -> Result<MarshalInfo> {
    let root: Value = serde_json::from_str(input)
        .map_err(|e| MpwError::Format(format!("invalid json profile: {e}")))?;
    let root = object(&root, "profile")?;
    let export = root
        .get("export")
        .map(|v| object(v, "export section"))
        .transpose()?;
    let user = root
        .get("user")
        .map(|v| object(v, "user section"))
        .transpose()?;

    let redacted = export
        .and_then(|e| e.get("redacted"))
        .and_then(Value::as_bool)
        .unwrap_or(true);
    let date = export
        .and_then(|e| get_str(e, "date"))
        .map(|d| parse_date(&d))
        .transpose()?;
    let algorithm = user
        .map(|u| get_u32(u, "algorithm"))
        .transpose()?
        .flatten()
        .map(AlgorithmVersion::from_u32)
        .transpose()
        .map_err(|e| MpwError::Format(e.to_string()))?
        .unwrap_or_default();

    Ok(MarshalInfo {
        format: MarshalFormat::Json,
        full_name: user.and_then(|u| get_str(u, "full_name")),
        algorithm,
        key_id: user.and_then(|u| get_str(u, "key_id")),
        date,
        redacted,
    })
}

pub(super) fn parse(input: &str) -> Result<User> {
    let root: Value = serde_json::from_str(input)
        .map_err(|e| MpwError::Format(format!("invalid json profile: {e}")))?;
    let root = object(&root, "profile")?;

    let export = root
        .get("export")
        .ok_or_else(|| MpwError::Format("profile is missing the export section".to_string()))?;
    let export = object(export, "export section")?;
    warn_unknown(export, EXPORT_KEYS, "export");
    match get_u32(export, "format")? {
        Some(1) => {}
        other => {
            return Err(MpwError::Format(format!(
                "unsupported json format version: {other:?}"
            )))
        }
    }
    let redacted = export.get("redacted").and_then(Value::as_bool).unwrap_or(true);
    let export_date = get_str(export, "date").map(|d| parse_date(&d)).transpose()?;

    let user_map = root
        .get("user")
        .ok_or_else(|| MpwError::Format("profile is missing the user section".to_string()))?;
    let user_map = object(user_map, "user section")?;
    warn_unknown(user_map, USER_KEYS, "user");
    let full_name = get_str(user_map, "full_name")
        .ok_or_else(|| MpwError::Format("profile is missing the full name".to_string()))?;

    let mut user = User::new(&full_name, "");
    user.avatar = get_u32(user_map, "avatar")?.unwrap_or(0);
    user.key_id = get_str(user_map, "key_id");
    user.algorithm = get_u32(user_map, "algorithm")?
        .map(AlgorithmVersion::from_u32)
        .transpose()
        .map_err(|e| MpwError::Format(e.to_string()))?
        .unwrap_or_default();
    user.default_type = get_u32(user_map, "default_type")?
        .map(ResultType::from_code)
        .transpose()?
        .unwrap_or(ResultType::Long);
    user.redacted = redacted;
    if let Some(date) = get_str(user_map, "last_used").map(|d| parse_date(&d)).transpose()? {
        user.last_used = date;
    } else if let Some(date) = export_date {
        user.last_used = date;
    }

    if let Some(sites) = root.get("sites") {
        let sites = object(sites, "sites section")?;
        for (name, value) in sites {
            let site = parse_site(name, value, user.default_type, user.algorithm)?;
            user.sites.push(site);
        }
    }
    Ok(user)
}

fn parse_site(
    name: &str,
    value: &Value,
    default_type: ResultType,
    user_algorithm: AlgorithmVersion,
) -> Result<Site> {
    let map = object(value, "site")?;
    warn_unknown(map, SITE_KEYS, "site");

    let result_type = get_u32(map, "type")?
        .map(ResultType::from_code)
        .transpose()?
        .unwrap_or(default_type);
    let counter = SiteCounter::new(get_u32(map, "counter")?.unwrap_or(1));
    let algorithm = get_u32(map, "algorithm")?
        .map(AlgorithmVersion::from_u32)
        .transpose()
        .map_err(|e| MpwError::Format(e.to_string()))?
        .unwrap_or(user_algorithm);

    let mut site = Site::new(name, result_type, counter, algorithm);
    site.content = get_str(map, "password");
    site.login_name = get_str(map, "login_name");
    site.login_generated = map
        .get("login_generated")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    site.uses = get_u32(map, "uses")?.unwrap_or(0);
    if let Some(date) = get_str(map, "last_used").map(|d| parse_date(&d)).transpose()? {
        site.last_used = date;
    }

    if let Some(questions) = map.get("questions") {
        let questions = object(questions, "questions section")?;
        for (keyword, question_value) in questions {
            let question_map = object(question_value, "question")?;
            warn_unknown(question_map, &["answer", "type"], "question");
            let mut question = Question::new(keyword);
            question.result_type = get_u32(question_map, "type")?
                .map(ResultType::from_code)
                .transpose()?
                .unwrap_or(ResultType::Phrase);
            question.content = get_str(question_map, "answer");
            site.questions.push(question);
        }
    }

    if let Some(ext) = map.get("_ext_mpw") {
        let ext = object(ext, "site extension")?;
        warn_unknown(ext, &["url"], "site extension");
        site.url = get_str(ext, "url");
    }
    Ok(site)
}

pub(super) fn emit(user: &User) -> Result<String> {
    let mut cache = MasterKeyCache::new(&user.full_name, user.master_password.as_str());
    let key_id = export_key_id(user, &mut cache)?;

    let mut sites = Map::new();
    for site in &user.sites {
        let mut entry = Map::new();
        entry.insert("type".to_string(), json!(site.result_type.code()));
        entry.insert("counter".to_string(), json!(site.counter.value()));
        entry.insert("algorithm".to_string(), json!(site.algorithm.as_u32()));
        if let Some(content) = export_content(user, site, &mut cache)? {
            entry.insert("password".to_string(), json!(content));
        }
        if let Some(login) = &site.login_name {
            entry.insert("login_name".to_string(), json!(login));
        }
        entry.insert("login_generated".to_string(), json!(site.login_generated));
        entry.insert("uses".to_string(), json!(site.uses));
        entry.insert(
            "last_used".to_string(),
            json!(site.last_used.format(DATE_FORMAT).to_string()),
        );

        let mut questions = Map::new();
        for question in &site.questions {
            let mut question_entry = Map::new();
            if let Some(answer) = export_answer(user, site, question, &mut cache)? {
                question_entry.insert("answer".to_string(), json!(answer));
            }
            questions.insert(question.keyword.clone(), Value::Object(question_entry));
        }
        entry.insert("questions".to_string(), Value::Object(questions));

        if let Some(url) = &site.url {
            entry.insert("_ext_mpw".to_string(), json!({ "url": url }));
        }
        sites.insert(site.name.clone(), Value::Object(entry));
    }

    let root = json!({
        "export": {
            "format": 1,
            "redacted": user.redacted,
            "date": user.last_used.format(DATE_FORMAT).to_string(),
        },
        "user": {
            "avatar": user.avatar,
            "full_name": user.full_name,
            "last_used": user.last_used.format(DATE_FORMAT).to_string(),
            "key_id": key_id,
            "algorithm": user.algorithm.as_u32(),
            "default_type": user.default_type.code(),
        },
        "sites": sites,
    });
    serde_json::to_string_pretty(&root)
        .map_err(|e| MpwError::Format(format!("could not encode profile: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_profile() {
        let input = r#"{
            "export": { "format": 1, "redacted": true, "date": "2018-04-26T19:20:21Z" },
            "user": { "full_name": "Robert Lee Mitchell", "algorithm": 3, "default_type": 17 },
            "sites": {}
        }"#;
        let user = parse(input).unwrap();
        assert_eq!(user.full_name, "Robert Lee Mitchell");
        assert_eq!(user.algorithm, AlgorithmVersion::V3);
        assert!(user.redacted);
        assert!(user.sites.is_empty());
    }

    #[test]
    fn test_parse_rejects_unsupported_format_version() {
        let input = r#"{
            "export": { "format": 2 },
            "user": { "full_name": "x" }
        }"#;
        assert!(parse(input).is_err());
    }

    #[test]
    fn test_parse_site_defaults_from_user() {
        let input = r#"{
            "export": { "format": 1 },
            "user": { "full_name": "x", "algorithm": 2, "default_type": 18 },
            "sites": { "example.com": {} }
        }"#;
        let user = parse(input).unwrap();
        let site = &user.sites[0];
        assert_eq!(site.result_type, ResultType::Medium);
        assert_eq!(site.algorithm, AlgorithmVersion::V2);
        assert_eq!(site.counter.value(), 1);
    }

    #[test]
    fn test_parse_preserves_site_order() {
        let input = r#"{
            "export": { "format": 1 },
            "user": { "full_name": "x" },
            "sites": { "zebra.com": {}, "apple.com": {}, "mango.com": {} }
        }"#;
        let user = parse(input).unwrap();
        let names: Vec<_> = user.sites.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["zebra.com", "apple.com", "mango.com"]);
    }

    #[test]
    fn test_parse_questions_and_url() {
        let input = r#"{
            "export": { "format": 1 },
            "user": { "full_name": "x" },
            "sites": {
                "example.com": {
                    "type": 17,
                    "questions": { "": {}, "maiden name": { "answer": "xyz" } },
                    "_ext_mpw": { "url": "https://example.com" }
                }
            }
        }"#;
        let user = parse(input).unwrap();
        let site = &user.sites[0];
        assert_eq!(site.questions.len(), 2);
        assert_eq!(site.questions[0].keyword, "");
        assert_eq!(site.questions[1].content.as_deref(), Some("xyz"));
        assert_eq!(site.url.as_deref(), Some("https://example.com"));
    }

    #[test]
    fn test_read_info_without_master_password() {
        let input = r#"{
            "export": { "format": 1, "redacted": false, "date": "2018-04-26T19:20:21Z" },
            "user": { "full_name": "Robert Lee Mitchell", "key_id": "ABCD", "algorithm": 1 }
        }"#;
        let info = read_info(input).unwrap();
        assert_eq!(info.format, MarshalFormat::Json);
        assert_eq!(info.full_name.as_deref(), Some("Robert Lee Mitchell"));
        assert_eq!(info.key_id.as_deref(), Some("ABCD"));
        assert_eq!(info.algorithm, AlgorithmVersion::V1);
        assert!(!info.redacted);
    }
}
