use carshare_core::RetryPolicy;
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub kafka: Option<KafkaConfig>,
    #[serde(default)]
    pub rules: RulesConfig,
    #[serde(default = "RetrySettings::transactions")]
    pub transactions: RetrySettings,
    #[serde(default = "RetrySettings::notifications")]
    pub notifications: RetrySettings,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_max_connections() -> u32 { 5 }

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
    #[serde(default = "default_email_topic")]
    pub email_topic: String,
    #[serde(default = "default_push_topic")]
    pub push_topic: String,
}

fn default_email_topic() -> String { "notifications.email".to_string() }
fn default_push_topic() -> String { "notifications.push".to_string() }

#[derive(Debug, Deserialize, Clone)]
pub struct RulesConfig {
    #[serde(default = "default_max_seats")]
    pub max_seats_per_ride: u32,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self { max_seats_per_ride: default_max_seats() }
    }
}

fn default_max_seats() -> u32 { 8 }

/// Backoff settings as they appear in config files
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl RetrySettings {
    fn transactions() -> Self {
        Self { max_attempts: 5, base_delay_ms: 25, max_delay_ms: 1_000 }
    }

    fn notifications() -> Self {
        Self { max_attempts: 3, base_delay_ms: 200, max_delay_ms: 5_000 }
    }

    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. `CARSHARE__STORE__BACKEND=postgres`
            .add_source(config::Environment::with_prefix("CARSHARE").separator("__"))
            .build()?;

        s.try_deserialize()
    }

    /// Parse a single TOML document; unset sections take their defaults
    pub fn from_toml(source: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }
}
