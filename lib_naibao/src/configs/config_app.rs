use crate::core::{HubConfig, SessionConfig};
use crate::models::UserId;
use crate::utils::{CivilClock, CivilTimeError};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

const DEFAULT_CONFIG_FILE: &str = "naibao.conf";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid command line: {0}")]
    Cli(#[from] clap::Error),

    #[error(transparent)]
    Timezone(#[from] CivilTimeError),

    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{field} is out of range: {reason}")]
    OutOfRange { field: &'static str, reason: String },
}

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[clap(name = "naibao_server", about = "Infant feeding tracker backend", version)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[clap(long, env = "NAIBAO_PORT", help = "Port to listen on.")]
    pub port: Option<u16>,

    #[clap(long, env = "NAIBAO_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "DATABASE_URL", help = "Postgres connection URL. In-memory storage when absent.")]
    pub database_url: Option<String>,

    #[clap(long, env = "NAIBAO_DB_MAX_CONNECTIONS", help = "Upper bound of the database pool.")]
    pub db_max_connections: Option<u32>,

    #[clap(long, env = "JWT_SECRET", help = "HS256 secret for bearer tokens.")]
    pub jwt_secret: Option<String>,

    #[clap(long, env = "NAIBAO_TOKEN_TTL_HOURS", help = "Lifetime of issued tokens in hours.")]
    pub token_ttl_hours: Option<i64>,

    #[clap(long, env = "NAIBAO_TIMEZONE", help = "IANA zone used for feeding days.")]
    pub civil_timezone: Option<String>,

    #[clap(long, env = "NAIBAO_LOG_DIR", help = "Directory for rolling log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "NAIBAO_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "NAIBAO_LOG_JSON", help = "Emit JSON log lines.")]
    pub log_json: Option<bool>,

    #[clap(long, env = "NAIBAO_LOG_KEEP_FILES", help = "Rolled log files kept on startup.")]
    pub log_keep_files: Option<usize>,

    #[clap(long, env = "NAIBAO_ADMIN_USER_IDS", value_delimiter = ',', help = "Users allowed to administer reference standards.")]
    pub admin_user_ids: Option<Vec<UserId>>,

    #[clap(long, env = "NAIBAO_HUB_COMMAND_CAPACITY", help = "Pending hub commands before callers wait.")]
    pub hub_command_capacity: Option<usize>,

    #[clap(long, env = "NAIBAO_SESSION_QUEUE_CAPACITY", help = "Outbound messages buffered per connection.")]
    pub session_queue_capacity: Option<usize>,

    #[clap(long, env = "NAIBAO_WRITE_WAIT_SECONDS", help = "Timeout for one websocket write.")]
    pub write_wait_seconds: Option<u64>,

    #[clap(long, env = "NAIBAO_PONG_WAIT_SECONDS", help = "Read deadline refreshed by each pong.")]
    pub pong_wait_seconds: Option<u64>,

    #[clap(long, env = "NAIBAO_MAX_MESSAGE_SIZE", help = "Largest accepted inbound websocket message in bytes.")]
    pub max_message_size: Option<usize>,
}

impl AppConfig {
    /// Built-in values used when no other source sets a field.
    pub fn defaults() -> Self {
        let hub = HubConfig::default();
        let session = SessionConfig::default();
        AppConfig {
            port: Some(8080),
            db_max_connections: Some(10),
            token_ttl_hours: Some(24),
            civil_timezone: Some("Asia/Shanghai".to_string()),
            log_level: Some("info".to_string()),
            log_json: Some(false),
            log_keep_files: Some(7),
            admin_user_ids: Some(Vec::new()),
            hub_command_capacity: Some(hub.command_capacity),
            session_queue_capacity: Some(hub.session_queue_capacity),
            write_wait_seconds: Some(session.write_wait.as_secs()),
            pong_wait_seconds: Some(session.pong_wait.as_secs()),
            max_message_size: Some(session.max_message_size),
            ..Default::default()
        }
    }

    // 'other' wins for every field it sets
    fn merge(self, other: AppConfig) -> AppConfig {
        AppConfig {
            port: other.port.or(self.port),
            config_path: other.config_path.or(self.config_path),
            database_url: other.database_url.or(self.database_url),
            db_max_connections: other.db_max_connections.or(self.db_max_connections),
            jwt_secret: other.jwt_secret.or(self.jwt_secret),
            token_ttl_hours: other.token_ttl_hours.or(self.token_ttl_hours),
            civil_timezone: other.civil_timezone.or(self.civil_timezone),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            log_json: other.log_json.or(self.log_json),
            log_keep_files: other.log_keep_files.or(self.log_keep_files),
            admin_user_ids: other.admin_user_ids.or(self.admin_user_ids),
            hub_command_capacity: other.hub_command_capacity.or(self.hub_command_capacity),
            session_queue_capacity: other.session_queue_capacity.or(self.session_queue_capacity),
            write_wait_seconds: other.write_wait_seconds.or(self.write_wait_seconds),
            pong_wait_seconds: other.pong_wait_seconds.or(self.pong_wait_seconds),
            max_message_size: other.max_message_size.or(self.max_message_size),
        }
    }

    /// Reads a JSON config file.
    pub fn from_file(path: &Path) -> Result<AppConfig, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Layers defaults, the config file and the given arguments.
    ///
    /// The file is taken from `--config-path` when given, otherwise
    /// `naibao.conf` in the working directory is used if it exists.
    pub fn from_args<I, T>(args: I) -> Result<AppConfig, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let cli = AppConfig::try_parse_from(args)?;
        let mut current = AppConfig::defaults();

        match cli.config_path.clone() {
            Some(path) => current = current.merge(AppConfig::from_file(&path)?),
            None => {
                let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
                if fallback.exists() {
                    current = current.merge(AppConfig::from_file(&fallback)?);
                } else {
                    info!("Config file not found at {}. Using defaults and environment/CLI values.", fallback.display());
                }
            }
        }

        let resolved = current.merge(cli);
        resolved.validate()?;
        Ok(resolved)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.pong_wait_seconds.unwrap_or(0) == 0 {
            return Err(ConfigError::OutOfRange {
                field: "pong_wait_seconds",
                reason: "must be positive".to_string(),
            });
        }
        if self.write_wait_seconds.unwrap_or(0) == 0 {
            return Err(ConfigError::OutOfRange {
                field: "write_wait_seconds",
                reason: "must be positive".to_string(),
            });
        }
        for (field, value) in [
            ("hub_command_capacity", self.hub_command_capacity),
            ("session_queue_capacity", self.session_queue_capacity),
        ] {
            if value.unwrap_or(0) == 0 {
                return Err(ConfigError::OutOfRange {
                    field,
                    reason: "channel capacity must be at least 1".to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(8080)
    }

    pub fn hub_config(&self) -> HubConfig {
        let defaults = HubConfig::default();
        HubConfig {
            command_capacity: self.hub_command_capacity.unwrap_or(defaults.command_capacity),
            session_queue_capacity: self.session_queue_capacity.unwrap_or(defaults.session_queue_capacity),
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        let defaults = SessionConfig::default();
        SessionConfig::new(
            self.write_wait_seconds.map(Duration::from_secs).unwrap_or(defaults.write_wait),
            self.pong_wait_seconds.map(Duration::from_secs).unwrap_or(defaults.pong_wait),
            self.max_message_size.unwrap_or(defaults.max_message_size),
        )
    }

    pub fn civil_clock(&self) -> Result<CivilClock, ConfigError> {
        match self.civil_timezone.as_deref() {
            Some(name) => Ok(CivilClock::from_name(name)?),
            None => Ok(CivilClock::default()),
        }
    }

    pub fn admin_ids(&self) -> HashSet<UserId> {
        self.admin_user_ids.iter().flatten().copied().collect()
    }

    pub fn jwt_secret(&self) -> Result<&str, ConfigError> {
        match self.jwt_secret.as_deref() {
            Some(secret) if !secret.is_empty() => Ok(secret),
            _ => Err(ConfigError::Missing("jwt_secret")),
        }
    }
}

/// Loads `.env`, then resolves the process arguments over defaults and the config file.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    match dotenvy::dotenv() {
        Ok(path) => info!("Loaded environment from {}", path.display()),
        Err(e) if e.not_found() => {}
        Err(e) => warn!("Failed to load .env file: {}", e),
    }
    AppConfig::from_args(std::env::args_os())
}
