//! Configuration module for order-ingest
//!
//! This module handles loading and validating configuration from environment
//! variables. The resulting `Config` is built once in `main`, never mutated,
//! and handed to component constructors.

use envconfig::Envconfig;
use serde::{Deserialize, Serialize};

use crate::db::InsertMode;
use crate::error::{Error, Result};
use crate::kafka::{KafkaConfig, MalformedPolicy};

/// Main configuration structure for order-ingest
#[derive(Debug, Clone, Deserialize, Serialize, Envconfig)]
pub struct Config {
    /// Logging configuration
    #[serde(flatten)]
    #[envconfig(nested = true)]
    pub logging: LoggingConfig,

    /// Kafka configuration
    #[serde(flatten)]
    #[envconfig(nested = true)]
    pub kafka: KafkaConfig,

    /// ClickHouse configuration
    #[serde(flatten)]
    #[envconfig(nested = true)]
    pub clickhouse: ClickHouseConfig,

    /// Processing configuration
    #[serde(flatten)]
    #[envconfig(nested = true)]
    pub processing: ProcessingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize, Envconfig)]
pub struct LoggingConfig {
    /// Log level
    #[envconfig(from = "LOG_LEVEL", default = "info")]
    pub log_level: String,

    /// Environment (development, staging, production)
    #[envconfig(from = "ENVIRONMENT", default = "development")]
    pub environment: String,
}

impl LoggingConfig {
    /// Check if running in production mode
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

/// ClickHouse configuration
#[derive(Debug, Clone, Deserialize, Serialize, Envconfig)]
pub struct ClickHouseConfig {
    /// Host name, optionally with an http:// or https:// scheme
    #[envconfig(from = "CLICKHOUSE_HOST", default = "localhost")]
    pub host: String,

    /// HTTP interface port
    #[envconfig(from = "CLICKHOUSE_PORT", default = "8123")]
    pub port: u16,

    /// Database name
    #[envconfig(from = "CLICKHOUSE_DATABASE", default = "default")]
    pub database: String,

    /// User name
    #[envconfig(from = "CLICKHOUSE_USER", default = "default")]
    pub user: String,

    /// Password
    #[serde(skip_serializing)]
    #[envconfig(from = "CLICKHOUSE_PASSWORD", default = "")]
    pub password: String,

    /// Destination table
    #[envconfig(from = "CLICKHOUSE_TABLE", default = "order_analytics")]
    pub table: String,

    /// append or skip_existing
    #[envconfig(from = "CLICKHOUSE_INSERT_MODE", default = "append")]
    pub insert_mode: InsertMode,
}

impl ClickHouseConfig {
    /// HTTP endpoint for the client
    pub fn url(&self) -> String {
        if self.host.starts_with("http://") || self.host.starts_with("https://") {
            format!("{}:{}", self.host, self.port)
        } else {
            format!("http://{}:{}", self.host, self.port)
        }
    }

    /// Password masked for logging
    pub fn masked_password(&self) -> &'static str {
        if self.password.is_empty() {
            "<empty>"
        } else {
            "***"
        }
    }
}

/// Processing configuration
#[derive(Debug, Clone, Deserialize, Serialize, Envconfig)]
pub struct ProcessingConfig {
    /// What to do with payloads that fail to decode (skip, halt)
    #[envconfig(from = "MALFORMED_MESSAGE_POLICY", default = "skip")]
    pub malformed_policy: MalformedPolicy,

    /// First redelivery delay in milliseconds
    #[envconfig(from = "RETRY_INITIAL_MS", default = "100")]
    pub retry_initial_ms: u64,

    /// Maximum redelivery delay in milliseconds
    #[envconfig(from = "RETRY_MAX_MS", default = "30000")]
    pub retry_max_ms: u64,

    /// Backoff multiplier
    #[envconfig(from = "RETRY_MULTIPLIER", default = "2.0")]
    pub retry_multiplier: f64,

    /// Randomization factor applied to each delay, 0.0 to 1.0
    #[envconfig(from = "RETRY_JITTER", default = "0.2")]
    pub retry_jitter: f64,

    /// Give up on a message after this many failed writes; unset retries forever
    #[envconfig(from = "RETRY_MAX_ATTEMPTS")]
    pub retry_max_attempts: Option<u32>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists (for local development)
        dotenv::dotenv().ok();

        Config::init_from_env().map_err(Error::from)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.kafka.brokers_list().is_empty() {
            return Err(Error::config("Kafka brokers cannot be empty"));
        }

        if self.kafka.topic.trim().is_empty() {
            return Err(Error::config("Kafka topic cannot be empty"));
        }

        if self.kafka.group_id.trim().is_empty() {
            return Err(Error::config("Kafka consumer group cannot be empty"));
        }

        if self.clickhouse.host.trim().is_empty() {
            return Err(Error::config("ClickHouse host cannot be empty"));
        }

        if self.clickhouse.port == 0 {
            return Err(Error::config("ClickHouse port cannot be 0"));
        }

        if self.clickhouse.table.trim().is_empty() {
            return Err(Error::config("ClickHouse table cannot be empty"));
        }

        if self.processing.retry_multiplier < 1.0 {
            return Err(Error::config("Retry multiplier must be at least 1.0"));
        }

        if !(0.0..=1.0).contains(&self.processing.retry_jitter) {
            return Err(Error::config("Retry jitter must be between 0.0 and 1.0"));
        }

        if self.processing.retry_initial_ms > self.processing.retry_max_ms {
            return Err(Error::config(
                "Initial retry delay cannot exceed the maximum retry delay",
            ));
        }

        if self.processing.retry_max_attempts == Some(0) {
            return Err(Error::config("Retry max attempts must be at least 1"));
        }

        Ok(())
    }

    /// Log configuration (with sensitive data masked)
    pub fn log_config(&self) {
        tracing::info!(
            environment = %self.logging.environment,
            log_level = %self.logging.log_level,
            "Logging configuration"
        );

        tracing::info!(
            brokers = %self.kafka.brokers,
            group_id = %self.kafka.group_id,
            topic = %self.kafka.topic,
            auto_offset_reset = %self.kafka.auto_offset_reset,
            "Kafka configuration"
        );

        tracing::info!(
            url = %self.clickhouse.url(),
            database = %self.clickhouse.database,
            user = %self.clickhouse.user,
            password = %self.clickhouse.masked_password(),
            table = %self.clickhouse.table,
            insert_mode = %self.clickhouse.insert_mode,
            "ClickHouse configuration"
        );

        tracing::info!(
            malformed_policy = %self.processing.malformed_policy,
            retry_initial_ms = self.processing.retry_initial_ms,
            retry_max_ms = self.processing.retry_max_ms,
            retry_max_attempts = ?self.processing.retry_max_attempts,
            "Processing configuration"
        );
    }
}
