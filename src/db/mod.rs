//! Analytics store module for order-ingest
//!
//! This module provides the writer contract the pipeline depends on and the
//! ClickHouse implementation used in production.

pub mod clickhouse;
pub mod writer;

// Re-export commonly used types
pub use self::clickhouse::ClickHouseWriter;
pub use writer::{AnalyticsWriter, InsertAck, InsertMode, WriteError, WriteResult};
