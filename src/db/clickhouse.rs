//! ClickHouse implementation of the analytics writer
//!
//! Each event becomes a single-row insert into the configured table. The
//! table itself is managed outside this service.

use async_trait::async_trait;
use clickhouse::{sql::Identifier, Client, Row};
use serde::Deserialize;
use std::time::Duration;

use crate::{
    config::ClickHouseConfig,
    db::writer::{AnalyticsWriter, InsertAck, InsertMode, WriteResult},
    error::{Error, Result},
    logging::Timer,
    models::OrderCreatedEvent,
};

#[derive(Debug, Deserialize, Row)]
struct OrderCount {
    count: u64,
}

/// Writer backed by a ClickHouse HTTP client
#[derive(Clone)]
pub struct ClickHouseWriter {
    client: Client,
    table: String,
    insert_mode: InsertMode,
}

impl ClickHouseWriter {
    /// Build a writer without touching the network
    pub fn new(config: &ClickHouseConfig) -> Self {
        let client = Client::default()
            .with_url(config.url())
            .with_user(&config.user)
            .with_password(&config.password)
            .with_database(&config.database)
            .with_compression(clickhouse::Compression::Lz4);

        Self {
            client,
            table: config.table.clone(),
            insert_mode: config.insert_mode,
        }
    }

    /// Build a writer and verify the store answers
    ///
    /// Used at startup, where an unreachable store is fatal.
    pub async fn connect(config: &ClickHouseConfig) -> Result<Self> {
        let writer = Self::new(config);

        writer.health_check().await.map_err(|e| {
            Error::clickhouse(format!(
                "Failed to reach ClickHouse at {}: {}",
                config.url(),
                e
            ))
        })?;

        tracing::info!(
            url = %config.url(),
            database = %config.database,
            table = %writer.table,
            insert_mode = %writer.insert_mode,
            "ClickHouse writer ready"
        );

        Ok(writer)
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn insert_mode(&self) -> InsertMode {
        self.insert_mode
    }

    async fn order_exists(&self, order_id: i64) -> WriteResult<bool> {
        let row = self
            .client
            .query("SELECT count() AS count FROM ? WHERE order_id = ?")
            .bind(Identifier(self.table.as_str()))
            .bind(order_id)
            .fetch_one::<OrderCount>()
            .await?;

        Ok(row.count > 0)
    }

    async fn append(&self, event: &OrderCreatedEvent) -> WriteResult<()> {
        let mut insert = self.client.insert(&self.table)?;
        insert.write(event).await?;
        insert.end().await?;
        Ok(())
    }
}

#[async_trait]
impl AnalyticsWriter for ClickHouseWriter {
    async fn insert(&self, event: &OrderCreatedEvent) -> WriteResult<InsertAck> {
        let timer = Timer::start("clickhouse_insert");

        if self.insert_mode == InsertMode::SkipExisting && self.order_exists(event.order_id).await? {
            tracing::debug!(
                order_id = event.order_id,
                "Order already stored, skipping insert"
            );
            timer.stop();
            return Ok(InsertAck::AlreadyPresent);
        }

        self.append(event).await?;
        timer.stop();

        Ok(InsertAck::Inserted)
    }

    async fn health_check(&self) -> WriteResult<()> {
        let start = std::time::Instant::now();

        self.client.query("SELECT 1").execute().await?;

        let elapsed = start.elapsed();
        if elapsed > Duration::from_secs(1) {
            tracing::warn!(
                elapsed_ms = elapsed.as_millis() as u64,
                "ClickHouse health check slow"
            );
        }

        Ok(())
    }
}
