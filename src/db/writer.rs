//! Analytics writer abstraction for order-ingest
//!
//! The writer contract is deliberately small: an insert either succeeds
//! durably or fails with an explicit error. Callers treat every failure as
//! retriable because an error says nothing about whether the row landed.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::models::OrderCreatedEvent;

/// Result type for writer operations
pub type WriteResult<T> = Result<T, WriteError>;

/// Writer error types
#[derive(Error, Debug, Clone)]
pub enum WriteError {
    /// Store unreachable
    #[error("Analytics store connection error: {0}")]
    Connection(String),

    /// Store did not answer in time
    #[error("Analytics store timed out: {0}")]
    Timeout(String),

    /// Store answered and refused the row
    #[error("Analytics store rejected insert: {0}")]
    Rejected(String),

    /// Any other client-side failure
    #[error("Analytics client error: {0}")]
    Client(String),
}

impl WriteError {
    /// Check if the failure is likely to clear up on its own
    pub fn is_retryable(&self) -> bool {
        matches!(self, WriteError::Connection(_) | WriteError::Timeout(_))
    }
}

impl From<clickhouse::error::Error> for WriteError {
    fn from(err: clickhouse::error::Error) -> Self {
        match err {
            clickhouse::error::Error::TimedOut => WriteError::Timeout(err.to_string()),
            clickhouse::error::Error::Network(_) => WriteError::Connection(err.to_string()),
            clickhouse::error::Error::BadResponse(msg) => WriteError::Rejected(msg),
            other => WriteError::Client(other.to_string()),
        }
    }
}

/// What the store did with an accepted event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertAck {
    /// A new row was appended
    Inserted,
    /// A row for this order id already existed; nothing was written
    AlreadyPresent,
}

/// How inserts treat an order id that is already stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsertMode {
    /// Plain append; redelivery produces duplicate rows
    #[default]
    Append,
    /// Look up the order id first and skip the insert if it exists
    SkipExisting,
}

impl FromStr for InsertMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "append" => Ok(InsertMode::Append),
            "skip_existing" => Ok(InsertMode::SkipExisting),
            other => Err(format!(
                "Unknown insert mode '{}' (expected append or skip_existing)",
                other
            )),
        }
    }
}

impl fmt::Display for InsertMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InsertMode::Append => write!(f, "append"),
            InsertMode::SkipExisting => write!(f, "skip_existing"),
        }
    }
}

/// Destination for decoded order events
#[async_trait]
pub trait AnalyticsWriter: Send + Sync {
    /// Insert one event
    async fn insert(&self, event: &OrderCreatedEvent) -> WriteResult<InsertAck>;

    /// Health check for the store connection
    async fn health_check(&self) -> WriteResult<()>;
}
