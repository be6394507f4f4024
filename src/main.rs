//! order-ingest - order events from Kafka into ClickHouse
//!
//! Consumes order-created events, appends each to the analytics table and
//! commits its offset once the row is written. Runs until SIGINT/SIGTERM.

use std::sync::Arc;

use order_ingest::config::Config;
use order_ingest::db::ClickHouseWriter;
use order_ingest::error::Result;
use order_ingest::kafka::{KafkaMessageLog, OrderConsumer};
use order_ingest::{logging, shutdown};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration from environment
    let config = Config::from_env()?;

    // Validate configuration
    config.validate()?;

    // Initialize logging/tracing
    logging::init_tracing(&config.logging)?;

    // Log configuration (with sensitive data masked)
    config.log_config();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting order-ingest");

    // Both ends must be reachable before the first fetch
    let writer = ClickHouseWriter::connect(&config.clickhouse).await?;
    let log = KafkaMessageLog::connect(&config.kafka).await?;

    let (trigger, signal) = shutdown::channel();
    let coordinator = shutdown::spawn_coordinator(trigger);

    let consumer = OrderConsumer::from_config(
        Arc::new(log),
        Arc::new(writer),
        signal,
        &config.processing,
    );

    let result = consumer.run().await;
    coordinator.abort();

    match result {
        Ok(stats) => {
            tracing::info!(
                fetched = stats.fetched,
                committed = stats.committed,
                "order-ingest shutdown complete"
            );
            Ok(())
        },
        Err(e) => {
            tracing::error!(error = %e, fatal = e.is_fatal(), "order-ingest stopped");
            Err(e)
        },
    }
}
