use crate::errors::RelayError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Generates a `Debug` impl that redacts secret fields.
///
/// Field specifiers:
/// - `field_name`: printed normally via `&self.field_name`
/// - `redact(field_name)`: `String` field: shows `[empty]` or `[REDACTED]`
/// - `redact_option(field_name)`: `Option<String>` field: shows `None` or `Some("[REDACTED]")`
macro_rules! redact_debug {
    // Internal: emit a single .field() call
    (@field $builder:ident, $self:ident, redact($field:ident)) => {
        $builder.field(
            stringify!($field),
            &if $self.$field.is_empty() {
                "[empty]"
            } else {
                "[REDACTED]"
            },
        );
    };
    (@field $builder:ident, $self:ident, redact_option($field:ident)) => {
        $builder.field(
            stringify!($field),
            &$self.$field.as_ref().map(|_| "[REDACTED]"),
        );
    };
    (@field $builder:ident, $self:ident, $field:ident) => {
        $builder.field(stringify!($field), &$self.$field);
    };

    // Internal: recursive TT muncher
    (@fields $builder:ident, $self:ident,) => {};
    (@fields $builder:ident, $self:ident, redact($field:ident), $($rest:tt)*) => {
        redact_debug!(@field $builder, $self, redact($field));
        redact_debug!(@fields $builder, $self, $($rest)*);
    };
    (@fields $builder:ident, $self:ident, redact_option($field:ident), $($rest:tt)*) => {
        redact_debug!(@field $builder, $self, redact_option($field));
        redact_debug!(@fields $builder, $self, $($rest)*);
    };
    (@fields $builder:ident, $self:ident, $field:ident, $($rest:tt)*) => {
        redact_debug!(@field $builder, $self, $field);
        redact_debug!(@fields $builder, $self, $($rest)*);
    };

    // Entry point
    ($struct_name:ident, $($fields:tt)*) => {
        impl std::fmt::Debug for $struct_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                let mut builder = f.debug_struct(stringify!($struct_name));
                redact_debug!(@fields builder, self, $($fields)*);
                builder.finish()
            }
        }
    };
}

pub const DEFAULT_LARK_DOMAIN: &str = "https://open.feishu.cn";
pub const DEFAULT_OPENCODE_USERNAME: &str = "opencode";
/// Upper bound for `SESSION_RETENTION_DAYS` (100 years).
pub const MAX_RETENTION_DAYS: u32 = 36_500;

// ---------------------------------------------------------------------------
// Lark / Feishu
// ---------------------------------------------------------------------------

/// How inbound platform events reach the process.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventMode {
    /// HTTP callbacks posted to `/webhook/event`.
    Webhook,
    /// Outbound WebSocket opened by the bot; no public endpoint required.
    #[default]
    LongConnection,
}

impl std::fmt::Display for EventMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Webhook => write!(f, "webhook"),
            Self::LongConnection => write!(f, "long-connection"),
        }
    }
}

impl std::str::FromStr for EventMode {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "webhook" => Ok(Self::Webhook),
            "long-connection" | "websocket" | "ws" => Ok(Self::LongConnection),
            other => Err(RelayError::Config(format!(
                "LARK_EVENT_MODE must be 'webhook' or 'long-connection', got '{}'",
                other
            ))),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct LarkConfig {
    pub app_id: String,
    pub app_secret: String,
    #[serde(default)]
    pub encrypt_key: Option<String>,
    #[serde(default)]
    pub verification_token: Option<String>,
    #[serde(default = "default_lark_domain")]
    pub domain: String,
    #[serde(default)]
    pub event_mode: EventMode,
}

impl Default for LarkConfig {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            app_secret: String::new(),
            encrypt_key: None,
            verification_token: None,
            domain: default_lark_domain(),
            event_mode: EventMode::default(),
        }
    }
}

redact_debug!(
    LarkConfig,
    app_id,
    redact(app_secret),
    redact_option(encrypt_key),
    redact_option(verification_token),
    domain,
    event_mode,
);

fn default_lark_domain() -> String {
    DEFAULT_LARK_DOMAIN.to_string()
}

// ---------------------------------------------------------------------------
// OpenCode backend
// ---------------------------------------------------------------------------

#[derive(Clone, Serialize, Deserialize)]
pub struct OpencodeConfig {
    pub host: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl Default for OpencodeConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            timeout_ms: default_timeout_ms(),
            username: None,
            password: None,
        }
    }
}

redact_debug!(
    OpencodeConfig,
    host,
    timeout_ms,
    username,
    redact_option(password),
);

impl OpencodeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Basic-auth credentials, present only when a password is configured.
    pub fn basic_auth(&self) -> Option<(String, String)> {
        self.password.as_ref().map(|password| {
            let username = self
                .username
                .clone()
                .filter(|u| !u.is_empty())
                .unwrap_or_else(|| DEFAULT_OPENCODE_USERNAME.to_string());
            (username, password.clone())
        })
    }
}

fn default_timeout_ms() -> u64 {
    60_000
}

// ---------------------------------------------------------------------------
// Storage, server and relay tuning
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_path: PathBuf,
    #[serde(default = "default_retention_days")]
    pub session_retention_days: u32,
    #[serde(default = "default_cleanup_interval_hours")]
    pub cleanup_interval_hours: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::new(),
            session_retention_days: default_retention_days(),
            cleanup_interval_hours: default_cleanup_interval_hours(),
        }
    }
}

impl StorageConfig {
    pub fn sessions_file(&self) -> PathBuf {
        self.data_path.join("sessions.json")
    }
}

fn default_retention_days() -> u32 {
    30
}

fn default_cleanup_interval_hours() -> u64 {
    24
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_max_processed_events")]
    pub max_processed_events: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_processed_events: default_max_processed_events(),
        }
    }
}

fn default_max_processed_events() -> usize {
    10_000
}

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub lark: LarkConfig,
    #[serde(default)]
    pub opencode: OpencodeConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub relay: RelayConfig,
}

impl Config {
    pub fn validate(&self) -> Result<(), RelayError> {
        self.validate_lark()?;
        self.validate_opencode()?;
        self.validate_storage()?;
        self.validate_server()?;
        if self.relay.max_processed_events == 0 {
            return Err(RelayError::Config("MAX_PROCESSED_EVENTS must be > 0".into()));
        }
        Ok(())
    }

    fn validate_lark(&self) -> Result<(), RelayError> {
        if self.lark.app_id.trim().is_empty() {
            return Err(RelayError::Config(
                "Missing required environment variable: LARK_APP_ID".into(),
            ));
        }
        if self.lark.app_secret.trim().is_empty() {
            return Err(RelayError::Config(
                "Missing required environment variable: LARK_APP_SECRET".into(),
            ));
        }
        url::Url::parse(&self.lark.domain).map_err(|e| {
            RelayError::Config(format!("LARK_DOMAIN is not a valid URL: {}", e))
        })?;
        Ok(())
    }

    fn validate_opencode(&self) -> Result<(), RelayError> {
        if self.opencode.host.trim().is_empty() {
            return Err(RelayError::Config(
                "Missing required environment variable: OPENCODE_HOST".into(),
            ));
        }
        let url = url::Url::parse(&self.opencode.host).map_err(|e| {
            RelayError::Config(format!("OPENCODE_HOST is not a valid URL: {}", e))
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(RelayError::Config(format!(
                "OPENCODE_HOST must use http or https, got '{}'",
                url.scheme()
            )));
        }
        if self.opencode.timeout_ms == 0 {
            return Err(RelayError::Config("OPENCODE_TIMEOUT must be > 0".into()));
        }
        Ok(())
    }

    fn validate_storage(&self) -> Result<(), RelayError> {
        if self.storage.data_path.as_os_str().is_empty() {
            return Err(RelayError::Config(
                "Missing required environment variable: DATA_PATH".into(),
            ));
        }
        if self.storage.session_retention_days == 0 {
            return Err(RelayError::Config(
                "SESSION_RETENTION_DAYS must be > 0".into(),
            ));
        }
        if self.storage.session_retention_days > MAX_RETENTION_DAYS {
            return Err(RelayError::Config(format!(
                "SESSION_RETENTION_DAYS must be <= {}",
                MAX_RETENTION_DAYS
            )));
        }
        Ok(())
    }

    fn validate_server(&self) -> Result<(), RelayError> {
        if self.lark.event_mode == EventMode::Webhook && self.server.port == 0 {
            return Err(RelayError::Config(
                "PORT must be > 0 in webhook mode".into(),
            ));
        }
        Ok(())
    }
}
