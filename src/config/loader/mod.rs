use crate::config::schema::{Config, EventMode};
use crate::errors::RelayError;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::debug;

/// Required settings and what they configure.
pub const REQUIRED_ENV_VARS: &[(&str, &str)] = &[
    ("LARK_APP_ID", "Feishu/Lark application id"),
    ("LARK_APP_SECRET", "Feishu/Lark application secret"),
    ("OPENCODE_HOST", "OpenCode server base URL"),
    ("DATA_PATH", "directory holding sessions.json"),
];

/// Optional settings, listed by `larkbridge check`.
pub const OPTIONAL_ENV_VARS: &[&str] = &[
    "LARK_ENCRYPT_KEY",
    "LARK_VERIFICATION_TOKEN",
    "LARK_DOMAIN",
    "LARK_EVENT_MODE",
    "PORT",
    "OPENCODE_TIMEOUT",
    "OPENCODE_SERVER_USERNAME",
    "OPENCODE_SERVER_PASSWORD",
    "SESSION_RETENTION_DAYS",
    "SESSION_CLEANUP_INTERVAL_HOURS",
    "MAX_PROCESSED_EVENTS",
];

/// Load configuration from the process environment and validate it.
pub fn load_config() -> Result<Config, RelayError> {
    let config = load_config_from(|key| std::env::var(key).ok())?;
    config.validate()?;
    Ok(config)
}

/// Build a `Config` from an arbitrary key lookup. Empty values count as unset.
///
/// Does not validate; callers decide whether missing required values are fatal.
pub fn load_config_from<F>(lookup: F) -> Result<Config, RelayError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
    let mut config = Config::default();

    if let Some(v) = get("LARK_APP_ID") {
        config.lark.app_id = v;
    }
    if let Some(v) = get("LARK_APP_SECRET") {
        config.lark.app_secret = v;
    }
    config.lark.encrypt_key = get("LARK_ENCRYPT_KEY");
    config.lark.verification_token = get("LARK_VERIFICATION_TOKEN");
    if let Some(v) = get("LARK_DOMAIN") {
        config.lark.domain = v.trim_end_matches('/').to_string();
    }
    if let Some(v) = get("LARK_EVENT_MODE") {
        config.lark.event_mode = EventMode::from_str(&v)?;
    }

    if let Some(v) = get("OPENCODE_HOST") {
        config.opencode.host = v.trim_end_matches('/').to_string();
    }
    if let Some(v) = get("OPENCODE_TIMEOUT") {
        config.opencode.timeout_ms = parse_number("OPENCODE_TIMEOUT", &v)?;
    }
    config.opencode.username = get("OPENCODE_SERVER_USERNAME");
    config.opencode.password = get("OPENCODE_SERVER_PASSWORD");

    if let Some(v) = get("DATA_PATH") {
        config.storage.data_path = PathBuf::from(v);
    }
    if let Some(v) = get("SESSION_RETENTION_DAYS") {
        config.storage.session_retention_days = parse_number("SESSION_RETENTION_DAYS", &v)?;
    }
    if let Some(v) = get("SESSION_CLEANUP_INTERVAL_HOURS") {
        config.storage.cleanup_interval_hours =
            parse_number("SESSION_CLEANUP_INTERVAL_HOURS", &v)?;
    }

    if let Some(v) = get("PORT") {
        config.server.port = parse_number("PORT", &v)?;
    }
    if let Some(v) = get("MAX_PROCESSED_EVENTS") {
        config.relay.max_processed_events = parse_number("MAX_PROCESSED_EVENTS", &v)?;
    }

    debug!("configuration loaded: {:?}", config);
    Ok(config)
}

/// Names of required settings that are unset or empty.
pub fn missing_required<F>(lookup: F) -> Vec<&'static str>
where
    F: Fn(&str) -> Option<String>,
{
    REQUIRED_ENV_VARS
        .iter()
        .filter(|(key, _)| lookup(key).is_none_or(|v| v.trim().is_empty()))
        .map(|(key, _)| *key)
        .collect()
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T, RelayError> {
    value.trim().parse::<T>().map_err(|_| {
        RelayError::Config(format!("{} must be a non-negative integer, got '{}'", key, value))
    })
}
