/// Configuration management for ingest-service
///
/// Loaded once from environment variables (after `.env`) and passed into
/// constructors explicitly.
use db_pool::env_utils::{env_string_or, parse_env_list, parse_env_or};
use db_pool::DbConfig;
use resilience::RetryConfig;
use std::time::Duration;

use crate::error::{AppError, Result};

pub const SERVICE_NAME: &str = "ingest-service";

#[derive(Clone, Debug)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DbConfig,
    pub kafka: KafkaConfig,
    pub app: AppConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub http_port: u16,
}

#[derive(Clone, Debug)]
pub struct KafkaConfig {
    pub brokers: Vec<String>,
    pub topic: String,
    pub group_id: String,
    pub min_fetch_bytes: u32,
    pub max_fetch_bytes: u32,
    pub fetch_error_backoff_ms: u64,
}

impl KafkaConfig {
    /// Broker list in the comma separated form librdkafka expects
    pub fn bootstrap_servers(&self) -> String {
        self.brokers.join(",")
    }
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: vec!["localhost:9092".to_string()],
            topic: "events".to_string(),
            group_id: "event-ingest".to_string(),
            min_fetch_bytes: 10_000,
            max_fetch_bytes: 10_000_000,
            fetch_error_backoff_ms: 500,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub worker_count: usize,
    pub environment: String,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    /// Accepted for compatibility; offsets are committed per message.
    pub batch_size: usize,
    /// Accepted for compatibility; offsets are committed per message.
    pub commit_interval_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            environment: "development".to_string(),
            max_retries: 3,
            retry_delay_ms: 1000,
            batch_size: 100,
            commit_interval_ms: 1000,
        }
    }
}

impl AppConfig {
    /// How long shutdown waits for workers to drain before forcing them down
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms.saturating_mul(2))
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::new(self.max_retries, self.retry_delay_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let database = DbConfig::from_env(SERVICE_NAME).map_err(AppError::Config)?;

        Ok(Config {
            server: ServerConfig::from_env()?,
            database,
            kafka: KafkaConfig::from_env()?,
            app: AppConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
        })
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            host: env_string_or("HTTP_HOST", "0.0.0.0"),
            http_port: parse_env_or("HTTP_PORT", 3000).map_err(AppError::Config)?,
        })
    }
}

impl KafkaConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let brokers = parse_env_list("KAFKA_BROKERS", &defaults.bootstrap_servers());
        if brokers.is_empty() {
            return Err(AppError::Config("KAFKA_BROKERS must not be empty".into()));
        }

        let config = Self {
            brokers,
            topic: env_string_or("KAFKA_TOPIC", &defaults.topic),
            group_id: env_string_or("KAFKA_GROUP_ID", &defaults.group_id),
            min_fetch_bytes: parse_env_or("KAFKA_MIN_FETCH_BYTES", defaults.min_fetch_bytes)
                .map_err(AppError::Config)?,
            max_fetch_bytes: parse_env_or("KAFKA_MAX_FETCH_BYTES", defaults.max_fetch_bytes)
                .map_err(AppError::Config)?,
            fetch_error_backoff_ms: parse_env_or(
                "KAFKA_FETCH_ERROR_BACKOFF_MS",
                defaults.fetch_error_backoff_ms,
            )
            .map_err(AppError::Config)?,
        };

        if config.min_fetch_bytes > config.max_fetch_bytes {
            return Err(AppError::Config(format!(
                "KAFKA_MIN_FETCH_BYTES ({}) exceeds KAFKA_MAX_FETCH_BYTES ({})",
                config.min_fetch_bytes, config.max_fetch_bytes
            )));
        }

        Ok(config)
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            worker_count: parse_env_or("APP_WORKER_COUNT", defaults.worker_count)
                .map_err(AppError::Config)?,
            environment: env_string_or("APP_ENV", &defaults.environment),
            max_retries: parse_env_or("APP_MAX_RETRIES", defaults.max_retries)
                .map_err(AppError::Config)?,
            retry_delay_ms: parse_env_or("APP_RETRY_DELAY_MS", defaults.retry_delay_ms)
                .map_err(AppError::Config)?,
            batch_size: parse_env_or("APP_BATCH_SIZE", defaults.batch_size)
                .map_err(AppError::Config)?,
            commit_interval_ms: parse_env_or("APP_COMMIT_INTERVAL_MS", defaults.commit_interval_ms)
                .map_err(AppError::Config)?,
        };

        if config.worker_count == 0 {
            return Err(AppError::Config("APP_WORKER_COUNT must be at least 1".into()));
        }

        Ok(config)
    }
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self> {
        let format = match env_string_or("LOG_FORMAT", "text").to_lowercase().as_str() {
            "json" => LogFormat::Json,
            "text" | "pretty" => LogFormat::Text,
            other => {
                return Err(AppError::Config(format!(
                    "LOG_FORMAT must be 'json' or 'text', got {:?}",
                    other
                )))
            }
        };

        Ok(Self {
            level: env_string_or("LOG_LEVEL", "info"),
            format,
        })
    }
}
