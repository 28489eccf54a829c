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
    /// Instance metadata.
    pub instance: InstanceConfig,
    /// Web Push (VAPID) settings.
    #[serde(default)]
    pub push: PushSettings,
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
    /// Public URL of this instance.
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

/// Instance metadata shown in the meta endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct InstanceConfig {
    /// Instance name.
    #[serde(default = "default_instance_name")]
    pub name: String,
    /// Instance description.
    #[serde(default)]
    pub description: Option<String>,
}

/// Raw Web Push (VAPID) settings as loaded from configuration.
///
/// All fields are optional: when any of them is missing or malformed the
/// push channel is disabled and every send operation fails fast instead of
/// attempting delivery. Validation lives in the core push service.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PushSettings {
    /// Contact email for the VAPID subject claim.
    #[serde(default)]
    pub subject_email: Option<String>,
    /// VAPID public key (base64 URL-safe, 87 characters).
    #[serde(default)]
    pub public_key: Option<String>,
    /// VAPID private key (base64 URL-safe, 43 characters).
    #[serde(default)]
    pub private_key: Option<String>,
    /// Interval in seconds between expired-subscription cleanup runs.
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
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

fn default_instance_name() -> String {
    "GradeBook".to_string()
}

const fn default_cleanup_interval_secs() -> u64 {
    3600
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `config/default.toml`
    /// 2. `config/{environment}.toml` (based on `GRADEBOOK_ENV`)
    /// 3. Environment variables with `GRADEBOOK_` prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let env = std::env::var("GRADEBOOK_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("GRADEBOOK")
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
                config::Environment::with_prefix("GRADEBOOK")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
