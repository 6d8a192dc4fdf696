// Configuration management with layered configuration (file, env)

use crate::schedule::{daily_cron_expression, parse_timezone};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main settings structure containing all configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub database: DatabaseConfig,
    pub push: PushConfig,
    pub scheduler: SchedulerConfig,
    pub poller: PollerConfig,
    pub digest: DigestConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_seconds: u64,
}

/// Push delivery service used by the notification gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    pub endpoint: String,
    pub server_key: String,
    #[serde(default = "default_push_timeout")]
    pub timeout_seconds: u64,
}

fn default_push_timeout() -> u64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// How often the run loop looks for due jobs
    pub tick_interval_millis: u64,
    /// Re-arm pending repeating tasks at startup
    #[serde(default = "default_true")]
    pub rehydrate_on_startup: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    pub five_minute_period_seconds: u64,
    pub thirty_minute_period_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigestConfig {
    /// Local time of day (`HH:MM`) the daily digest fires
    pub daily_at: String,
    /// IANA timezone the daily digest and "today" window are evaluated in
    pub timezone: String,
    pub six_hour_interval_hours: u64,
    /// How far ahead the six-hour digest looks
    pub due_soon_window_hours: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub metrics_port: u16,
    pub tracing_endpoint: Option<String>,
}

impl Settings {
    /// Load configuration with layered precedence: defaults → file → env
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("config")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Not committed to git
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), String> {
        if self.database.url.is_empty() {
            return Err("Database URL cannot be empty".to_string());
        }
        if self.database.max_connections == 0 {
            return Err("Database max_connections must be greater than 0".to_string());
        }

        if self.push.endpoint.is_empty() {
            return Err("Push endpoint cannot be empty".to_string());
        }

        if self.scheduler.tick_interval_millis == 0 {
            return Err("Scheduler tick_interval_millis must be greater than 0".to_string());
        }

        if self.poller.five_minute_period_seconds == 0
            || self.poller.thirty_minute_period_seconds == 0
        {
            return Err("Poller periods must be greater than 0".to_string());
        }

        if self.digest.six_hour_interval_hours == 0 {
            return Err("Digest six_hour_interval_hours must be greater than 0".to_string());
        }
        if self.digest.due_soon_window_hours == 0 {
            return Err("Digest due_soon_window_hours must be greater than 0".to_string());
        }
        daily_cron_expression(&self.digest.daily_at).map_err(|e| e.to_string())?;
        parse_timezone(&self.digest.timezone).map_err(|e| e.to_string())?;

        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "postgresql://localhost/todo_assistant".to_string(),
                max_connections: 10,
                min_connections: 2,
                connect_timeout_seconds: 30,
            },
            push: PushConfig {
                endpoint: "https://fcm.googleapis.com/fcm/send".to_string(),
                server_key: String::new(),
                timeout_seconds: default_push_timeout(),
            },
            scheduler: SchedulerConfig {
                tick_interval_millis: 1000,
                rehydrate_on_startup: true,
            },
            poller: PollerConfig {
                five_minute_period_seconds: 60,
                thirty_minute_period_seconds: 300,
            },
            digest: DigestConfig {
                daily_at: "00:00".to_string(),
                timezone: "Africa/Lagos".to_string(),
                six_hour_interval_hours: 6,
                due_soon_window_hours: 6,
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                metrics_port: 9090,
                tracing_endpoint: None,
            },
        }
    }
}
