/// The flat profile format: an ASCII header block of `# key: value`
/// lines between `##` markers, then one line per site.
///
/// Two header dialects exist. `Format: 1` carries `Algorithm` and
/// `Default Type` lines and frames the site type field as
/// `type:algorithm:counter`; the legacy `Format: 0` dialect lacks both
/// lines, implies algorithm V0 and frames the type field as
/// `type:counter`.
use chrono::{DateTime, Utc};

use crate::error::{MpwError, Result};
use crate::marshal::{
    export_content, export_key_id, parse_date, MarshalInfo, MasterKeyCache, Site, User,
    DATE_FORMAT,
};
use crate::types::{AlgorithmVersion, MarshalFormat, ResultType, SiteCounter};

/// Every flat profile begins with this line.
pub const MAGIC: &str = "# Master Password site export";

struct Header {
    format_version: u32,
    date: Option<DateTime<Utc>>,
    full_name: Option<String>,
    key_id: Option<String>,
    algorithm: Option<AlgorithmVersion>,
    default_type: Option<ResultType>,
    redacted: bool,
    avatar: u32,
}

/// Split the input into its parsed header and the raw site lines.
fn scan(input: &str) -> Result<(Header, Vec<&str>)> {
    let mut lines = input.lines();
    match lines.next() {
        Some(first) if first.starts_with(MAGIC) => {}
        _ => return Err(MpwError::Format("missing flat profile magic".to_string())),
    }

    let mut header = Header {
        format_version: 0,
        date: None,
        full_name: None,
        key_id: None,
        algorithm: None,
        default_type: None,
        redacted: true,
        avatar: 0,
    };
    let mut in_header = false;
    let mut header_done = false;
    let mut site_lines = Vec::new();

    for line in lines {
        if !header_done {
            if line.trim_end() == "##" {
                if in_header {
                    header_done = true;
                } else {
                    in_header = true;
                }
                continue;
            }
            if !in_header {
                continue;
            }
            let Some(entry) = line.strip_prefix('#') else { continue };
            let Some((key, value)) = entry.split_once(':') else { continue };
            let (key, value) = (key.trim(), value.trim());
            if value.is_empty() {
                continue;
            }
            match key {
                "Format" => {
                    header.format_version = value
                        .parse()
                        .map_err(|_| MpwError::Format(format!("invalid format version: {value}")))?;
                    if header.format_version > 1 {
                        return Err(MpwError::Format(format!(
                            "unsupported flat format version: {value}"
                        )));
                    }
                }
                "Date" => header.date = Some(parse_date(value)?),
                "Full Name" | "User Name" => {
                    if header.full_name.is_none() {
                        header.full_name = Some(value.to_string());
                    }
                }
                "Avatar" => header.avatar = value.parse().unwrap_or(0),
                "Key ID" => header.key_id = Some(value.to_string()),
                "Algorithm" => {
                    let version: u32 = value.parse().map_err(|_| {
                        MpwError::Format(format!("invalid algorithm version: {value}"))
                    })?;
                    header.algorithm = Some(
                        AlgorithmVersion::from_u32(version)
                            .map_err(|e| MpwError::Format(e.to_string()))?,
                    );
                }
                "Default Type" => {
                    let code: u32 = value
                        .parse()
                        .map_err(|_| MpwError::Format(format!("invalid default type: {value}")))?;
                    header.default_type = Some(ResultType::from_code(code)?);
                }
                "Passwords" => header.redacted = value != "VISIBLE",
                _ => {}
            }
            continue;
        }

        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        site_lines.push(line);
    }

    Ok((header, site_lines))
}

pub(super) fn read_info(input: &str) -> Result<MarshalInfo> {
    let (header, _) = scan(input)?;
    let algorithm = header
        .algorithm
        .unwrap_or(default_algorithm(header.format_version));
    Ok(MarshalInfo {
        format: MarshalFormat::Flat,
        full_name: header.full_name,
        algorithm,
        key_id: header.key_id,
        date: header.date,
        redacted: header.redacted,
    })
}

fn default_algorithm(format_version: u32) -> AlgorithmVersion {
    if format_version == 0 {
        AlgorithmVersion::V0
    } else {
        AlgorithmVersion::CURRENT
    }
}

pub(super) fn parse(input: &str) -> Result<User> {
    let (header, site_lines) = scan(input)?;

    let full_name = header
        .full_name
        .clone()
        .ok_or_else(|| MpwError::Format("profile is missing the full name".to_string()))?;
    let algorithm = header
        .algorithm
        .unwrap_or(default_algorithm(header.format_version));

    let mut user = User::new(&full_name, "");
    user.avatar = header.avatar;
    user.key_id = header.key_id.clone();
    user.algorithm = algorithm;
    user.default_type = header.default_type.unwrap_or(ResultType::Long);
    user.redacted = header.redacted;
    if let Some(date) = header.date {
        user.last_used = date;
    }

    for line in site_lines {
        user.sites.push(parse_site(line, header.format_version, algorithm)?);
    }
    Ok(user)
}

/// Take one field, skipping the space padding the writer aligns with.
fn take_token<'a>(rest: &mut &'a str, delimiters: &[char]) -> Option<&'a str> {
    let s = rest.trim_start_matches(' ');
    if s.is_empty() {
        *rest = s;
        return None;
    }
    match s.find(|c| delimiters.contains(&c)) {
        Some(index) => {
            let token = &s[..index];
            *rest = &s[index + 1..];
            Some(token)
        }
        None => {
            *rest = "";
            Some(s)
        }
    }
}

fn parse_site(line: &str, format_version: u32, user_algorithm: AlgorithmVersion) -> Result<Site> {
    let mut rest = line;
    // The first three fields split on whitespace runs; login, name and
    // content split on tabs, and content runs to the end of the line.
    let whitespace: &[char] = &[' ', '\t'];
    let last_used = take_token(&mut rest, whitespace)
        .ok_or_else(|| MpwError::Format(format!("truncated site line: {line:?}")))?;
    let uses = take_token(&mut rest, whitespace)
        .ok_or_else(|| MpwError::Format(format!("truncated site line: {line:?}")))?;
    let type_field = take_token(&mut rest, whitespace)
        .ok_or_else(|| MpwError::Format(format!("truncated site line: {line:?}")))?;
    let login = take_token(&mut rest, &['\t']).unwrap_or("");
    let name = take_token(&mut rest, &['\t'])
        .ok_or_else(|| MpwError::Format(format!("site line is missing a site name: {line:?}")))?;
    let content = rest.trim_start_matches(' ');

    let parse_u32 = |value: &str, what: &str| -> Result<u32> {
        value
            .parse()
            .map_err(|_| MpwError::Format(format!("invalid site {what}: {value}")))
    };

    let mut fields = type_field.split(':');
    let type_code = fields
        .next()
        .ok_or_else(|| MpwError::Format(format!("invalid site type field: {type_field}")))?;
    let result_type = ResultType::from_code(parse_u32(type_code, "type")?)?;
    let (algorithm, counter) = if format_version == 0 {
        let counter = fields.next().map(|c| parse_u32(c, "counter")).transpose()?;
        (user_algorithm, counter.unwrap_or(1))
    } else {
        let version = fields
            .next()
            .ok_or_else(|| MpwError::Format(format!("site type field is missing the algorithm: {type_field}")))?;
        let counter = fields
            .next()
            .ok_or_else(|| MpwError::Format(format!("site type field is missing the counter: {type_field}")))?;
        let algorithm = AlgorithmVersion::from_u32(parse_u32(version, "algorithm")?)
            .map_err(|e| MpwError::Format(e.to_string()))?;
        (algorithm, parse_u32(counter, "counter")?)
    };

    let mut site = Site::new(name, result_type, SiteCounter::new(counter), algorithm);
    site.last_used = parse_date(last_used)?;
    site.uses = uses.parse().unwrap_or(0);
    site.login_name = (!login.is_empty()).then(|| login.to_string());
    site.content = (!content.is_empty()).then(|| content.to_string());
    Ok(site)
}

pub(super) fn emit(user: &User) -> Result<String> {
    let mut cache = MasterKeyCache::new(&user.full_name, user.master_password.as_str());
    let key_id = export_key_id(user, &mut cache)?;

    let mut out = String::new();
    out.push_str(MAGIC);
    out.push('\n');
    out.push_str(if user.redacted {
        "#     Export of site names and stored passwords (unless device-private) encrypted with the master key.\n"
    } else {
        "#     Export of site names and passwords in clear-text.\n"
    });
    out.push_str("# \n##\n");
    out.push_str("# Format: 1\n");
    out.push_str(&format!("# Date: {}\n", user.last_used.format(DATE_FORMAT)));
    out.push_str(&format!("# User Name: {}\n", user.full_name));
    out.push_str(&format!("# Full Name: {}\n", user.full_name));
    out.push_str(&format!("# Avatar: {}\n", user.avatar));
    out.push_str(&format!("# Key ID: {key_id}\n"));
    out.push_str(&format!("# Algorithm: {}\n", user.algorithm));
    out.push_str(&format!("# Default Type: {}\n", user.default_type.code()));
    out.push_str(&format!(
        "# Passwords: {}\n",
        if user.redacted { "PROTECTED" } else { "VISIBLE" }
    ));
    out.push_str("##\n#\n");
    out.push_str("#               Last     Times  Password                      Login\t                     Site\t                     Site\n");
    out.push_str("#               used      used      type                       name\t                     name\t                 password\n");

    for site in &user.sites {
        let content = export_content(user, site, &mut cache)?;
        let type_field = format!("{}:{}:{}", site.result_type.code(), site.algorithm, site.counter);
        out.push_str(&format!(
            "{}  {:>8}  {:>8}  {:>25}\t{:>25}\t{}\n",
            site.last_used.format(DATE_FORMAT),
            site.uses,
            type_field,
            site.login_name.as_deref().unwrap_or(""),
            site.name,
            content.as_deref().unwrap_or(""),
        ));
    }
    Ok(out)
}
