use regex::Regex;
use serde::Deserialize;
use serde::de::{self, Deserializer, Visitor};
use std::fmt;

use crate::error::ConfigError;

fn default_addr() -> String {
    "127.0.0.1:8080".into()
}

fn default_db_path() -> String {
    "sqlite:///var/lib/formrelay/forms.db".into()
}

fn default_site_url() -> String {
    "http://localhost:8080".into()
}

fn default_namespace() -> String {
    "formrelay/v1".into()
}

fn default_log_format() -> String {
    "fmt".into()
}

fn default_max_fields() -> usize {
    50
}

fn default_max_data_bytes() -> u64 {
    100_000
}

fn default_max_body_bytes() -> u64 {
    64 * 1024 * 1024
}

fn default_rate_limit_secs() -> u64 {
    10
}

fn default_marker_ttl_secs() -> u64 {
    15
}

fn default_honeypot_field() -> String {
    "fr_hp".into()
}

fn default_cache_ttl_secs() -> u64 {
    3600
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_smtp_address() -> String {
    "127.0.0.1:25".into()
}

fn default_smtp_from() -> String {
    "formrelay@localhost".into()
}

fn default_helo_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".into())
}

fn default_telegram_api_base() -> String {
    "https://api.telegram.org".into()
}

fn default_sheets_token_url() -> String {
    "https://oauth2.googleapis.com/token".into()
}

fn default_sheets_api_base() -> String {
    "https://sheets.googleapis.com".into()
}

fn default_upload_dir() -> String {
    "/var/lib/formrelay/uploads".into()
}

fn default_upload_base_url() -> String {
    "http://localhost:8080/uploads".into()
}

fn expand_placeholders(text: &str) -> Result<String, ConfigError> {
    let env_re = Regex::new(r"\$ENV\{([^}]+)\}").map_err(|e| ConfigError::Invalid(e.to_string()))?;
    let file_re =
        Regex::new(r"\$FILE\{([^}]+)\}").map_err(|e| ConfigError::Invalid(e.to_string()))?;
    let mut out = String::new();
    let mut last = 0;
    for caps in env_re.captures_iter(text) {
        let Some(m) = caps.get(0) else { continue };
        out.push_str(&text[last..m.start()]);
        let var = std::env::var(&caps[1]).map_err(|_| ConfigError::Placeholder(caps[1].to_string()))?;
        out.push_str(&var);
        last = m.end();
    }
    out.push_str(&text[last..]);
    let text = out;
    let mut out = String::new();
    let mut last = 0;
    for caps in file_re.captures_iter(&text) {
        let Some(m) = caps.get(0) else { continue };
        out.push_str(&text[last..m.start()]);
        let contents = std::fs::read_to_string(&caps[1])?;
        out.push_str(contents.trim_end());
        last = m.end();
    }
    out.push_str(&text[last..]);
    Ok(out)
}

fn parse_size(input: &str) -> Option<u64> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    let (digits, factor) = match trimmed.chars().last()? {
        'K' | 'k' => (&trimmed[..trimmed.len() - 1], 1024u64),
        'M' | 'm' => (&trimmed[..trimmed.len() - 1], 1024u64 * 1024),
        'G' | 'g' => (&trimmed[..trimmed.len() - 1], 1024u64 * 1024 * 1024),
        '0'..='9' => (trimmed, 1u64),
        _ => return None,
    };
    digits
        .trim()
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(factor))
}

fn deserialize_size<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    struct SizeVisitor;

    impl Visitor<'_> for SizeVisitor {
        type Value = u64;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("an integer or string with optional K, M, G suffix")
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
            Ok(v)
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            u64::try_from(v).map_err(|_| de::Error::custom("size must be positive"))
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            parse_size(v).ok_or_else(|| de::Error::custom(format!("invalid size: {v}")))
        }
    }

    deserializer.deserialize_any(SizeVisitor)
}

#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct Config {
    pub addr: String,
    pub db_path: String,
    /// Public base URL, used for `submit_url` and to absolutize relative referers
    pub site_url: String,
    pub namespace: String,
    pub log_format: String,
    /// Take the requester IP from `X-Forwarded-For` when behind a proxy
    pub trust_forwarded_for: bool,
    pub limits: LimitsConfig,
    pub cache: CacheConfig,
    pub smtp: SmtpConfig,
    pub telegram: TelegramConfig,
    pub sheets: SheetsConfig,
    pub uploads: UploadConfig,
    pub allowed_fields: Vec<AllowedFieldsRule>,
    pub guards: Vec<FilterConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            db_path: default_db_path(),
            site_url: default_site_url(),
            namespace: default_namespace(),
            log_format: default_log_format(),
            trust_forwarded_for: false,
            limits: LimitsConfig::default(),
            cache: CacheConfig::default(),
            smtp: SmtpConfig::default(),
            telegram: TelegramConfig::default(),
            sheets: SheetsConfig::default(),
            uploads: UploadConfig::default(),
            allowed_fields: Vec::new(),
            guards: Vec::new(),
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_fields: usize,
    #[serde(deserialize_with = "deserialize_size")]
    pub max_data_bytes: u64,
    #[serde(deserialize_with = "deserialize_size")]
    pub max_body_bytes: u64,
    pub rate_limit_secs: u64,
    pub marker_ttl_secs: u64,
    pub honeypot_field: String,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_fields: default_max_fields(),
            max_data_bytes: default_max_data_bytes(),
            max_body_bytes: default_max_body_bytes(),
            rate_limit_secs: default_rate_limit_secs(),
            marker_ttl_secs: default_marker_ttl_secs(),
            honeypot_field: default_honeypot_field(),
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct CacheConfig {
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl_secs(),
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct SmtpConfig {
    /// Relay address as `host:port`
    pub address: String,
    pub from: String,
    pub helo_name: String,
    pub timeout_secs: u64,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            address: default_smtp_address(),
            from: default_smtp_from(),
            helo_name: default_helo_name(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct TelegramConfig {
    pub api_base: String,
    pub timeout_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_base: default_telegram_api_base(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct SheetsConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub refresh_token: Option<String>,
    pub token_url: String,
    pub api_base: String,
    pub timeout_secs: u64,
}

impl Default for SheetsConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            refresh_token: None,
            token_url: default_sheets_token_url(),
            api_base: default_sheets_api_base(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct UploadConfig {
    pub directory: String,
    pub base_url: String,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            directory: default_upload_dir(),
            base_url: default_upload_base_url(),
        }
    }
}

/// Extra field names accepted for a form on top of its schema.
///
/// `form = "*"` applies to every form; a field name of `"*"` accepts any field.
#[derive(Deserialize, Clone, Debug)]
pub struct AllowedFieldsRule {
    pub form: String,
    #[serde(default)]
    pub fields: Vec<String>,
}

/// One entry of the pre-pipeline guard chain
#[derive(Deserialize, Clone, Debug)]
pub struct FilterConfig {
    pub name: String,
    #[serde(flatten)]
    pub parameters: serde_json::Map<String, serde_json::Value>,
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or a placeholder
    /// cannot be resolved.
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Parse configuration text after placeholder expansion.
    ///
    /// # Errors
    ///
    /// Returns an error if a placeholder cannot be resolved or the TOML is invalid.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let text = expand_placeholders(text)?;
        let cfg: Config = toml::from_str(&text)?;
        if cfg.limits.max_fields == 0 {
            return Err(ConfigError::Invalid("limits.max_fields must be positive".into()));
        }
        Ok(cfg)
    }

    /// Extra field names allowed for a form, by slug.
    #[must_use]
    pub fn extra_allowed_fields(&self, slug: &str) -> Vec<String> {
        self.allowed_fields
            .iter()
            .filter(|r| r.form == "*" || r.form == slug)
            .flat_map(|r| r.fields.iter().cloned())
            .collect()
    }

    /// Base path of the REST routes, with a leading slash and no trailing one.
    #[must_use]
    pub fn route_prefix(&self) -> String {
        format!("/{}", self.namespace.trim_matches('/'))
    }

    /// Absolute URL a client posts submissions for `slug` to.
    #[must_use]
    pub fn submit_url(&self, slug: &str) -> String {
        format!(
            "{}{}/forms/{slug}/submit",
            self.site_url.trim_end_matches('/'),
            self.route_prefix()
        )
    }
}
