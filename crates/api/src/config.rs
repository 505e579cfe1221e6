use domain::models::AlertSeverity;
use domain::services::AlertEngineConfig;
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub realtime: RealtimeConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

impl From<&DatabaseConfig> for persistence::db::DatabaseConfig {
    fn from(config: &DatabaseConfig) -> Self {
        Self {
            url: config.url.clone(),
            max_connections: config.max_connections,
            min_connections: config.min_connections,
            connect_timeout_secs: config.connect_timeout_secs,
            idle_timeout_secs: config.idle_timeout_secs,
        }
    }
}

/// Where messages, rules and alerts live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Postgres,
    /// Process-local storage, lost on restart. For development and tests.
    Memory,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SecurityConfig {
    /// Allowed CORS origins. Empty allows any origin.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

/// Push channel settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RealtimeConfig {
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// Upper bound on a single write to a connection.
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,

    /// Frames buffered per connection.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Dispatches waiting for the delivery loop.
    #[serde(default = "default_dispatch_queue_capacity")]
    pub dispatch_queue_capacity: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: default_heartbeat_interval(),
            write_timeout_ms: default_write_timeout_ms(),
            channel_capacity: default_channel_capacity(),
            dispatch_queue_capacity: default_dispatch_queue_capacity(),
        }
    }
}

impl RealtimeConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

/// Alert evaluation settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AlertsConfig {
    /// How often the scheduler looks for due rules. `0` disables it.
    #[serde(default = "default_check_interval_minutes")]
    pub check_interval_minutes: u64,

    /// Sender of the direct messages accompanying severe alerts.
    #[serde(default = "Uuid::nil")]
    pub system_sender_id: Uuid,

    #[serde(default = "default_direct_message_min_severity")]
    pub direct_message_min_severity: AlertSeverity,

    #[serde(default = "default_recent_critical_limit")]
    pub recent_critical_limit: usize,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            check_interval_minutes: default_check_interval_minutes(),
            system_sender_id: Uuid::nil(),
            direct_message_min_severity: default_direct_message_min_severity(),
            recent_critical_limit: default_recent_critical_limit(),
        }
    }
}

impl AlertsConfig {
    pub fn engine_config(&self) -> AlertEngineConfig {
        AlertEngineConfig {
            system_sender_id: self.system_sender_id,
            direct_message_min_severity: self.direct_message_min_severity,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_request_timeout() -> u64 {
    30
}
fn default_max_connections() -> u32 {
    20
}
fn default_min_connections() -> u32 {
    2
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_idle_timeout() -> u64 {
    600
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "json".to_string()
}
fn default_heartbeat_interval() -> u64 {
    30
}
fn default_write_timeout_ms() -> u64 {
    5000
}
fn default_channel_capacity() -> usize {
    64
}
fn default_dispatch_queue_capacity() -> usize {
    1024
}
fn default_check_interval_minutes() -> u64 {
    60
}
fn default_direct_message_min_severity() -> AlertSeverity {
    AlertSeverity::Critical
}
fn default_recent_critical_limit() -> usize {
    10
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Loading order (later sources override earlier):
    /// 1. config/default.toml - base configuration with defaults
    /// 2. config/local.toml - local overrides (optional, not in git)
    /// 3. Environment variables with SL__ prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("SL").separator("__"))
            .build()?;

        let cfg: Self = config.try_deserialize()?;
        cfg.validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(cfg)
    }

    /// Load configuration from embedded defaults plus `overrides`.
    ///
    /// Reads no files and skips validation, so integration tests can build
    /// partial configs. The storage backend defaults to `memory`.
    pub fn load_for_test(overrides: &[(&str, &str)]) -> Result<Self, config::ConfigError> {
        let defaults = r#"
            [server]
            host = "127.0.0.1"
            port = 8080
            request_timeout_secs = 30

            [database]
            url = ""
            max_connections = 5
            min_connections = 1
            connect_timeout_secs = 5
            idle_timeout_secs = 600

            [storage]
            backend = "memory"

            [logging]
            level = "info"
            format = "json"

            [security]
            cors_origins = []

            [realtime]
            heartbeat_interval_secs = 30
            write_timeout_ms = 5000
            channel_capacity = 64
            dispatch_queue_capacity = 1024

            [alerts]
            check_interval_minutes = 0
            system_sender_id = "00000000-0000-0000-0000-000000000000"
            direct_message_min_severity = "critical"
            recent_critical_limit = 10
        "#;

        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(defaults, config::FileFormat::Toml));

        for (key, value) in overrides {
            builder = builder.set_override(*key, *value)?;
        }

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.storage.backend == StorageBackend::Postgres && self.database.url.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "SL__DATABASE__URL environment variable must be set".to_string(),
            ));
        }

        if self.server.port == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "Server port cannot be 0".to_string(),
            ));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigValidationError::InvalidValue(
                "min_connections cannot exceed max_connections".to_string(),
            ));
        }

        if self.realtime.heartbeat_interval_secs == 0 || self.realtime.write_timeout_ms == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "realtime heartbeat and write timeout must be positive".to_string(),
            ));
        }

        if self.realtime.channel_capacity == 0 || self.realtime.dispatch_queue_capacity == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "realtime channel capacities must be positive".to_string(),
            ));
        }

        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.server.host, self.server.port).parse()
    }
}
