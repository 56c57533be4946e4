use std::fs;
use std::io::{BufRead, IsTerminal};
use std::path::PathBuf;
use std::process;

use chrono::Utc;
use clap::Parser;
use tracing::{debug, warn};
use tracing_subscriber::filter::LevelFilter;

use mpw::algorithm;
use mpw::crypto::sensitive::SensitiveString;
use mpw::error::{MpwError, Result};
use mpw::identicon::Identicon;
use mpw::marshal::{self, User};
use mpw::types::{AlgorithmVersion, KeyPurpose, MarshalFormat, ResultType, SiteCounter};

const ENV_FULL_NAME: &str = "MP_FULLNAME";
const ENV_ALGORITHM: &str = "MP_ALGORITHM";
const ENV_FORMAT: &str = "MP_FORMAT";

#[derive(Parser)]
#[command(name = "mpw")]
#[command(about = "Stateless deterministic password generator")]
#[command(version)]
struct Cli {
    /// Full name of the user; checks the master password against the profile.
    /// Defaults to MP_FULLNAME in the environment, or prompts.
    #[arg(short = 'u', value_name = "full-name")]
    user_name: Option<String>,

    /// Full name of the user; permits updating the profile to a new master
    /// password.
    #[arg(short = 'U', value_name = "full-name")]
    update_user_name: Option<String>,

    /// Master password on the command line. Insecure; testing only.
    #[arg(short = 'M', value_name = "master-password")]
    master_password: Option<String>,

    /// Result template or type, by short or long name:
    /// x/maximum, l/long, m/medium, b/basic, s/short, i/pin, n/name,
    /// p/phrase, P/personal, D/device, K/key.
    #[arg(short = 't', value_name = "type")]
    result_type: Option<String>,

    /// Result parameter: the content to save for a stateful type, or the
    /// key size in bits for key derivation.
    #[arg(short = 'P', value_name = "param")]
    result_param: Option<String>,

    /// Site counter. Defaults to 1.
    #[arg(short = 'c', value_name = "counter")]
    counter: Option<String>,

    /// Algorithm version, 0-3. Defaults to MP_ALGORITHM in the environment.
    #[arg(short = 'a', value_name = "version")]
    algorithm: Option<String>,

    /// Key purpose: a/auth, i/ident or r/rec.
    #[arg(short = 'p', value_name = "purpose")]
    purpose: Option<String>,

    /// Purpose-specific context; for recovery, the most significant word
    /// of the security question.
    #[arg(short = 'C', value_name = "context")]
    context: Option<String>,

    /// Profile format, allowing migration: n/none, f/flat or j/json.
    /// Defaults to MP_FORMAT in the environment.
    #[arg(short = 'f', value_name = "format")]
    format: Option<String>,

    /// Profile format, fixed: no fallback or migration.
    #[arg(short = 'F', value_name = "format")]
    format_fixed: Option<String>,

    /// Save the profile redacted (1) or with recoverable content (0).
    #[arg(short = 'R', value_name = "redacted")]
    redacted: Option<String>,

    /// Increase output verbosity (can be repeated).
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease output verbosity (can be repeated).
    #[arg(short = 'q', action = clap::ArgAction::Count)]
    quiet: u8,

    /// The site to derive a credential for.
    #[arg(value_name = "site-name")]
    site_name: Option<String>,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() { 64 } else { 0 };
            let _ = e.print();
            process::exit(code);
        }
    };

    init_logging(cli.verbose, cli.quiet);

    if let Err(e) = run(cli) {
        eprintln!("mpw: {e}");
        process::exit(e.exit_code());
    }
}

fn init_logging(verbose: u8, quiet: u8) {
    let level = match 2 + verbose as i16 - quiet as i16 {
        i16::MIN..=0 => LevelFilter::OFF,
        1 => LevelFilter::ERROR,
        2 => LevelFilter::WARN,
        3 => LevelFilter::INFO,
        4 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    // Resolve the primary inputs: flags first, then environment, then
    // prompts.
    let allow_password_update = cli.update_user_name.is_some();
    let mut full_name = cli
        .update_user_name
        .or(cli.user_name)
        .or_else(|| env_nonempty(ENV_FULL_NAME))
        .or_else(|| prompt_line("Your full name:"))
        .ok_or_else(|| MpwError::MissingInput("full name".to_string()))?;
    let site_name = cli
        .site_name
        .or_else(|| prompt_line("Site name:"))
        .ok_or_else(|| MpwError::MissingInput("site name".to_string()))?;
    let master_password = match cli.master_password.filter(|p| !p.is_empty()) {
        Some(password) => SensitiveString::new(password),
        None => prompt_password("Your master password: ")?,
    };

    let (format_name, format_fixed) = match (cli.format_fixed, cli.format) {
        (Some(name), _) => (Some(name), true),
        (None, Some(name)) => (Some(name), false),
        (None, None) => (env_nonempty(ENV_FORMAT), false),
    };
    let format_arg_given = format_name.is_some();
    let mut format = match &format_name {
        Some(name) => MarshalFormat::from_name(name)?,
        None => MarshalFormat::default(),
    };

    // Locate and load the user's profile, falling back to the flat file
    // when the format is not fixed.
    let mut profile_data: Option<String> = None;
    if format != MarshalFormat::None {
        if let Some(path) = sites_path(&full_name, format) {
            match fs::read_to_string(&path) {
                Ok(data) => profile_data = Some(data),
                Err(e) => {
                    debug!("couldn't open profile {}: {e}", path.display());
                    if !format_fixed && format != MarshalFormat::Flat {
                        if let Some(flat_path) = sites_path(&full_name, MarshalFormat::Flat) {
                            if let Ok(data) = fs::read_to_string(&flat_path) {
                                format = MarshalFormat::Flat;
                                profile_data = Some(data);
                            }
                        }
                    }
                }
            }
        }
    }

    let mut user: Option<User> = None;
    let mut read_format: Option<MarshalFormat> = None;
    if let Some(data) = &profile_data {
        match marshal::read_info(data) {
            Err(e) => warn!("couldn't parse profile: {e}"),
            Ok(info) => {
                let input_format = if format_arg_given { format } else { info.format };
                match marshal::read(data, input_format, master_password.as_str()) {
                    Ok(parsed) => {
                        user = Some(parsed);
                        read_format = Some(input_format);
                    }
                    Err(MpwError::MasterPassword) if allow_password_update => {
                        user = reauthenticate(data, input_format, &master_password)?;
                        if user.is_some() {
                            read_format = Some(input_format);
                        }
                    }
                    Err(MpwError::MasterPassword) => return Err(MpwError::MasterPassword),
                    Err(e) => warn!("couldn't parse profile: {e}"),
                }
            }
        }
    }

    // Profile defaults override the built-ins; flags override both.
    let mut algorithm_version = AlgorithmVersion::default();
    let mut result_type = ResultType::default();
    let mut counter = SiteCounter::default();
    let mut redacted = true;
    let mut stored_content: Option<String> = None;
    let mut stored_login: Option<String> = None;
    let mut stored_login_generated = false;
    let mut site_url: Option<String> = None;
    if let Some(user) = &user {
        full_name = user.full_name.clone();
        algorithm_version = user.algorithm;
        result_type = user.default_type;
        redacted = user.redacted;
        if !user.redacted && cli.redacted.is_none() {
            warn!("Profile is not redacted. Use -R 1 to change this.");
        }
        if let Some(site) = user.find_site(&site_name) {
            result_type = site.result_type;
            counter = site.counter;
            algorithm_version = site.algorithm;
            stored_content = site.content.clone();
            stored_login = site.login_name.clone();
            stored_login_generated = site.login_generated;
            site_url = site.url.clone();
        }
    }

    if let Some(value) = &cli.redacted {
        redacted = value == "1";
    }
    if let Some(value) = &cli.counter {
        counter = value.parse()?;
    }
    if let Some(value) = cli.algorithm.or_else(|| env_nonempty(ENV_ALGORITHM)) {
        let version: u32 = value
            .parse()
            .map_err(|_| MpwError::Usage(format!("invalid algorithm version: {value}")))?;
        algorithm_version = AlgorithmVersion::from_u32(version)?;
    }
    let purpose = match &cli.purpose {
        Some(name) => KeyPurpose::from_name(name)?,
        None => KeyPurpose::Authentication,
    };
    let purpose_result = match purpose {
        KeyPurpose::Authentication => "password",
        KeyPurpose::Identification => {
            result_type = ResultType::Name;
            "login"
        }
        KeyPurpose::Recovery => {
            result_type = ResultType::Phrase;
            "answer"
        }
    };
    if let Some(name) = &cli.result_type {
        result_type = ResultType::from_name(name)?;
    }
    let result_param = cli.result_param.filter(|p| !p.is_empty());
    let key_context = cli.context.filter(|c| !c.is_empty());

    debug!(
        user = %full_name,
        site = %site_name,
        %counter,
        result = %result_type,
        %purpose,
        context = key_context.as_deref().unwrap_or("-"),
        algorithm = %algorithm_version,
        format = %format,
        "derivation parameters"
    );

    // The identicon lets the user spot a mistyped master password.
    let identicon = Identicon::from_credentials(&full_name, master_password.as_str())?;
    let glyphs = if std::io::stderr().is_terminal() {
        identicon.colored()
    } else {
        identicon.plain()
    };
    eprint!("{full_name}'s {purpose_result} for {site_name}:\n[ {glyphs} ]: ");

    let master_key = algorithm::master_key(&full_name, master_password.as_str(), algorithm_version)?;

    // Render the result.
    let mut saved_content: Option<String> = None;
    if purpose == KeyPurpose::Identification && !stored_login_generated && stored_login.is_some() {
        println!("{}", stored_login.as_deref().unwrap_or_default());
    } else if result_type.is_stateful() && result_param.is_some() {
        let content = result_param.clone().unwrap_or_default();
        // Surface crypto failures now rather than at save time.
        algorithm::site_state(
            &master_key,
            &site_name,
            counter,
            purpose,
            key_context.as_deref(),
            result_type,
            &content,
            algorithm_version,
        )?;
        saved_content = Some(content);
        eprintln!("saved.");
    } else if result_type.is_stateful() {
        let content = stored_content
            .clone()
            .ok_or_else(|| MpwError::MissingInput("stored content for this site".to_string()))?;
        println!("{content}");
    } else {
        let result = algorithm::site_result(
            &master_key,
            &site_name,
            counter,
            purpose,
            key_context.as_deref(),
            result_type,
            result_param.as_deref(),
            algorithm_version,
        )?;
        println!("{result}");
    }
    if let Some(url) = &site_url {
        eprintln!("See: {url}");
    }

    // Update and rewrite the profile.
    if format != MarshalFormat::None {
        let mut user = user.unwrap_or_else(|| User::new(&full_name, master_password.as_str()));
        user.master_password = master_password.clone();
        user.redacted = redacted;

        match purpose {
            KeyPurpose::Authentication if !result_type.is_alternative() => {
                match user.find_site_mut(&site_name) {
                    Some(site) => {
                        site.result_type = result_type;
                        site.counter = counter;
                        site.algorithm = algorithm_version;
                    }
                    None => {
                        user.add_site(&site_name, result_type, counter, algorithm_version);
                    }
                }
            }
            KeyPurpose::Identification => {
                if let Some(site) = user.find_site_mut(&site_name) {
                    if result_type.is_template() {
                        site.login_generated = true;
                    }
                }
            }
            KeyPurpose::Recovery => {
                if let Some(context) = &key_context {
                    if let Some(site) = user.find_site_mut(&site_name) {
                        if !site.questions.iter().any(|q| &q.keyword == context) {
                            site.questions.push(marshal::Question::new(context));
                        }
                    }
                }
            }
            _ => {}
        }

        let now = Utc::now();
        if let Some(site) = user.find_site_mut(&site_name) {
            if let Some(content) = saved_content {
                site.content = Some(content);
            }
            site.last_used = now;
            site.uses += 1;
            user.last_used = now;
        }

        let out_format = if format_fixed {
            format
        } else {
            read_format.unwrap_or_default()
        };
        save_profile(&user, out_format);
    }

    Ok(())
}

/// The master password did not match the profile. Confirm the old master
/// password, then adopt the new one: the key ID and stored content are
/// re-derived under it when the profile is next written.
fn reauthenticate(
    data: &str,
    format: MarshalFormat,
    new_password: &SensitiveString,
) -> Result<Option<User>> {
    loop {
        eprintln!("Given master password does not match the profile.");
        eprintln!("To update the profile with this new master password, first confirm the old master password.");
        let old_password = prompt_password("Old master password: ")?;
        match marshal::read(data, format, old_password.as_str()) {
            Ok(mut user) => {
                user.master_password = new_password.clone();
                user.key_id = None;
                return Ok(Some(user));
            }
            Err(MpwError::MasterPassword) => continue,
            Err(e) => {
                warn!("couldn't parse profile: {e}");
                return Ok(None);
            }
        }
    }
}

fn save_profile(user: &User, format: MarshalFormat) {
    let Some(path) = sites_path(&user.full_name, format) else {
        warn!("no profile path for format {format}");
        return;
    };
    debug!("updating profile: {} ({format})", path.display());

    let data = match marshal::write(user, format) {
        Ok(data) => data,
        Err(e) => {
            // Leave the existing profile untouched.
            warn!("couldn't encode profile: {e}");
            return;
        }
    };
    if let Some(parent) = path.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            warn!("couldn't create {}: {e}", parent.display());
            return;
        }
    }
    if let Err(e) = fs::write(&path, data) {
        warn!("couldn't save profile {}: {e}", path.display());
    }
}

fn sites_path(full_name: &str, format: MarshalFormat) -> Option<PathBuf> {
    let extension = format.extension()?;
    let home = dirs::home_dir().or_else(|| env_nonempty("HOME").map(PathBuf::from))?;
    let file_name = format!("{}.{extension}", full_name.replace('/', "_"));
    Some(home.join(".mpw.d").join(file_name))
}

fn env_nonempty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

fn prompt_line(prompt: &str) -> Option<String> {
    eprint!("{prompt} ");
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line).ok()?;
    let line = line.trim_end_matches(['\n', '\r']).to_string();
    (!line.is_empty()).then_some(line)
}

/// Read the master password from the controlling terminal, or from stdin
/// when running non-interactively.
fn prompt_password(prompt: &str) -> Result<SensitiveString> {
    if std::io::stdin().is_terminal() {
        loop {
            eprint!("{prompt}");
            let password = rpassword::read_password()?;
            if !password.is_empty() {
                return Ok(SensitiveString::new(password));
            }
        }
    }

    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    let line = line.trim_end_matches(['\n', '\r']).to_string();
    if line.is_empty() {
        return Err(MpwError::MissingInput("master password".to_string()));
    }
    Ok(SensitiveString::new(line))
}
