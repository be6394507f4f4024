//! Error handling module for order-ingest
//!
//! This module defines the top-level error type used by the pipeline and its
//! startup path. Decode and write failures stay inside the consume-commit
//! loop as `ProcessingOutcome`s; client-level `KafkaIntegrationError`s convert
//! into `Error::Kafka` when they stop the loop.

use thiserror::Error;

use crate::kafka::KafkaIntegrationError;

/// Result type alias for order-ingest operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for order-ingest
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Kafka client errors (consumer creation, subscription, seek)
    #[error("Kafka error: {0}")]
    Kafka(String),

    /// ClickHouse connectivity errors
    #[error("ClickHouse error: {0}")]
    ClickHouse(String),

    /// A malformed message stopped the pipeline under the `halt` policy
    #[error("Malformed message at partition {partition} offset {offset}: {reason}")]
    MalformedMessage {
        partition: i32,
        offset: i64,
        reason: String,
    },

    /// The retry policy gave up on a message
    #[error("Gave up on partition {partition} offset {offset} after {attempts} failed writes")]
    RetriesExhausted {
        partition: i32,
        offset: i64,
        attempts: u32,
    },

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    /// Create a Kafka error
    pub fn kafka<S: Into<String>>(msg: S) -> Self {
        Error::Kafka(msg.into())
    }

    /// Create a ClickHouse error
    pub fn clickhouse<S: Into<String>>(msg: S) -> Self {
        Error::ClickHouse(msg.into())
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Error::Internal(msg.into())
    }

    /// Check if this error stops the pipeline for good
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Config(_) | Error::MalformedMessage { .. } | Error::RetriesExhausted { .. }
        )
    }
}

impl From<KafkaIntegrationError> for Error {
    fn from(err: KafkaIntegrationError) -> Self {
        Error::Kafka(err.to_string())
    }
}

/// Convert from anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Internal(err.to_string())
    }
}

/// Convert from envconfig::Error to our Error type
impl From<envconfig::Error> for Error {
    fn from(err: envconfig::Error) -> Self {
        Error::Config(err.to_string())
    }
}
