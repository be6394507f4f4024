//! Kafka integration module for order ingestion
//!
//! This module provides:
//! - The `MessageLog` seam over the partitioned log (fetch, commit, rewind)
//! - An rdkafka-backed implementation with manual offset management
//! - The consume-commit loop that drives decode and write per message
//! - The retry policy applied to redelivered messages

mod config;
mod consumer;
mod message_log;
mod retry;

pub use config::KafkaConfig;
pub use consumer::OrderConsumer;
pub use message_log::KafkaMessageLog;
pub use retry::{RetryDecision, RetryPolicy, RetryTracker};

use async_trait::async_trait;
use rdkafka::error::KafkaError;
use rdkafka::message::Message;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::db::WriteError;
use crate::models::{DecodeError, OrderCreatedEvent};

/// Kafka-specific error types
#[derive(Debug, Error)]
pub enum KafkaIntegrationError {
    #[error("Kafka connection error: {0}")]
    ConnectionError(#[from] KafkaError),

    #[error("Offset commit failed: {0}")]
    OffsetCommitError(String),

    #[error("Seek failed: {0}")]
    SeekError(String),
}

/// A message taken off the log, detached from the client's buffers
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub timestamp: Option<i64>,
    pub key: Option<Vec<u8>>,
    /// Message body; an absent payload is represented as empty
    pub payload: Vec<u8>,
}

impl FetchedMessage {
    /// Copy an rdkafka message into an owned value
    pub fn from_message<M: Message>(message: &M) -> Self {
        Self {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
            timestamp: message.timestamp().to_millis(),
            key: message.key().map(|k| k.to_vec()),
            payload: message.payload().map(|p| p.to_vec()).unwrap_or_default(),
        }
    }
}

/// The partitioned log the pipeline reads from
///
/// Offsets are owned by the implementation. The pipeline only ever asks to
/// advance past a message it has persisted, or to see a message again.
#[async_trait]
pub trait MessageLog: Send + Sync {
    /// Wait for the next message assigned to this consumer
    async fn fetch(&self) -> Result<FetchedMessage, KafkaIntegrationError>;

    /// Durably record that `message` has been consumed
    fn commit(&self, message: &FetchedMessage) -> Result<(), KafkaIntegrationError>;

    /// Make the next fetch on this partition return `message` again
    fn rewind(&self, message: &FetchedMessage) -> Result<(), KafkaIntegrationError>;
}

/// Handling of payloads that fail to decode
///
/// Neither policy commits the malformed message itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedPolicy {
    /// Log and move on. The client's fetch position has already passed the
    /// message, and the next commit on the partition covers it.
    #[default]
    Skip,
    /// Stop the pipeline so an operator can deal with the message. It stays
    /// uncommitted and is fetched again on restart.
    Halt,
}

impl FromStr for MalformedPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "skip" => Ok(MalformedPolicy::Skip),
            "halt" => Ok(MalformedPolicy::Halt),
            other => Err(format!(
                "Unknown malformed message policy '{}' (expected skip or halt)",
                other
            )),
        }
    }
}

impl fmt::Display for MalformedPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MalformedPolicy::Skip => write!(f, "skip"),
            MalformedPolicy::Halt => write!(f, "halt"),
        }
    }
}

/// Processing result for a single message
#[derive(Debug)]
pub enum ProcessingOutcome {
    /// Written and committed
    Committed(OrderCreatedEvent),

    /// Written, but the commit call failed
    CommitFailed(OrderCreatedEvent, KafkaIntegrationError),

    /// Payload could not be decoded; nothing was written or committed
    DecodeFailed(DecodeError),

    /// Write failed; nothing was committed
    WriteFailed(OrderCreatedEvent, WriteError),
}

impl ProcessingOutcome {
    /// Whether the event reached the analytics store
    pub fn is_written(&self) -> bool {
        matches!(
            self,
            ProcessingOutcome::Committed(_) | ProcessingOutcome::CommitFailed(..)
        )
    }
}

/// Counters kept by the consume-commit loop
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub fetched: u64,
    pub written: u64,
    pub committed: u64,
    pub decode_failures: u64,
    pub write_failures: u64,
    pub commit_failures: u64,
    pub fetch_errors: u64,
}
