//! order-ingest library
//!
//! Consumes order-created events from Kafka and appends them to a ClickHouse
//! analytics table, committing each offset only after its row was written.
//! The modules are exposed for the binary and for integration tests.

pub mod config;
pub mod db;
pub mod error;
pub mod kafka;
pub mod logging;
pub mod models;
pub mod shutdown;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// Re-export commonly used types at the crate root
pub use config::Config;
pub use error::{Error, Result};

pub use db::{AnalyticsWriter, ClickHouseWriter, InsertAck, InsertMode, WriteError};
pub use kafka::{
    FetchedMessage, KafkaMessageLog, MalformedPolicy, MessageLog, OrderConsumer, PipelineStats,
    ProcessingOutcome, RetryPolicy,
};
pub use models::{decode, DecodeError, DecodeErrorKind, OrderCreatedEvent};
pub use shutdown::{ShutdownSignal, ShutdownTrigger};
