//! Application configuration.

use serde::Deserialize;
use std::path::Path;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Redis configuration. Required when the interaction guard runs on Redis.
    #[serde(default)]
    pub redis: Option<RedisConfig>,
    /// SMTP configuration. Email delivery is log-only when absent.
    #[serde(default)]
    pub email: Option<EmailConfig>,
    /// Interaction guard configuration.
    #[serde(default)]
    pub interactions: InteractionConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind to.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Public URL of this instance, used for links in emails.
    pub url: String,
}

/// Database connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// `PostgreSQL` connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Redis configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL.
    pub url: String,
    /// Key prefix for all Redis keys.
    #[serde(default = "default_redis_prefix")]
    pub prefix: String,
}

/// SMTP configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    /// Whether outgoing email is enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// SMTP server host.
    pub smtp_host: String,
    /// SMTP server port.
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    /// SMTP username.
    #[serde(default)]
    pub smtp_username: Option<String>,
    /// SMTP password.
    #[serde(default)]
    pub smtp_password: Option<String>,
    /// Sender address.
    pub from_address: String,
    /// Sender display name.
    #[serde(default = "default_from_name")]
    pub from_name: String,
}

/// Backend used for toggle cooldowns and view deduplication.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuardBackend {
    /// Process-local maps. Correct for a single instance only.
    #[default]
    Memory,
    /// Shared TTL keys in Redis.
    Redis,
}

/// Interaction guard configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct InteractionConfig {
    /// Guard backend.
    #[serde(default)]
    pub guard_backend: GuardBackend,
    /// How often the in-memory guard drops expired entries.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            guard_backend: GuardBackend::default(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    3000
}

const fn default_max_connections() -> u32 {
    100
}

const fn default_min_connections() -> u32 {
    5
}

fn default_redis_prefix() -> String {
    "quill".to_string()
}

const fn default_smtp_port() -> u16 {
    587
}

fn default_from_name() -> String {
    "Quill".to_string()
}

const fn default_sweep_interval() -> u64 {
    60
}

const fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `.env` (if present)
    /// 2. `config/default.toml`
    /// 3. `config/{environment}.toml` (based on `QUILL_ENV`)
    /// 4. Environment variables with `QUILL__` prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();
        let env = std::env::var("QUILL_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("QUILL")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("QUILL")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> Config {
        config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .and_then(config::Config::try_deserialize)
            .unwrap_or_else(|e| panic!("config should parse: {e}"))
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse(
            r#"
            [server]
            url = "http://localhost:3000"

            [database]
            url = "postgres://localhost/quill"
            "#,
        );

        assert_eq!(config.server.port, 3000);
        assert_eq!(config.database.max_connections, 100);
        assert!(config.redis.is_none());
        assert!(config.email.is_none());
        assert_eq!(config.interactions.guard_backend, GuardBackend::Memory);
        assert_eq!(config.interactions.sweep_interval_secs, 60);
        assert!(!config.logging.json);
    }

    #[test]
    fn test_redis_guard_backend() {
        let config = parse(
            r#"
            [server]
            url = "http://localhost:3000"

            [database]
            url = "postgres://localhost/quill"

            [redis]
            url = "redis://localhost:6379"

            [interactions]
            guard_backend = "redis"
            "#,
        );

        assert_eq!(config.interactions.guard_backend, GuardBackend::Redis);
        assert_eq!(config.redis.map(|r| r.prefix).as_deref(), Some("quill"));
    }
}
