//! Logging module for order-ingest
//!
//! This module configures structured logging using the tracing crate,
//! providing JSON output for production and pretty formatting for development.

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Registry,
};

use crate::config::LoggingConfig;
use crate::error::{Error, Result};

/// Initialize the logging system
///
/// Configures tracing based on the environment:
/// - Production: JSON formatted logs
/// - Development: Pretty formatted logs with colors
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    // RUST_LOG wins over the configured level
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(&config.log_level)));

    if config.is_production() {
        let formatting_layer = fmt::layer()
            .json()
            .with_file(true)
            .with_line_number(true)
            .with_thread_ids(true)
            .with_target(true)
            .with_current_span(true);

        Registry::default()
            .with(env_filter)
            .with(formatting_layer)
            .try_init()
            .map_err(|e| Error::internal(format!("Failed to initialize tracing: {}", e)))?;
    } else {
        let formatting_layer = fmt::layer()
            .pretty()
            .with_file(true)
            .with_line_number(true)
            .with_thread_ids(false)
            .with_target(true)
            .with_span_events(FmtSpan::NONE);

        Registry::default()
            .with(env_filter)
            .with(formatting_layer)
            .try_init()
            .map_err(|e| Error::internal(format!("Failed to initialize tracing: {}", e)))?;
    }

    tracing::info!(
        environment = %config.environment,
        log_level = %config.log_level,
        "Logging initialized"
    );

    Ok(())
}

fn default_directives(log_level: &str) -> String {
    format!("order_ingest={},rdkafka=warn", log_level)
}

/// Create a span for Kafka message processing
#[macro_export]
macro_rules! kafka_span {
    ($partition:expr, $offset:expr) => {
        tracing::info_span!(
            "kafka_message",
            partition = $partition,
            offset = $offset,
            order_id = tracing::field::Empty,
            processing_time_ms = tracing::field::Empty,
        )
    };
}

/// Helper for timing operations
pub struct Timer {
    start: std::time::Instant,
    operation: &'static str,
}

impl Timer {
    /// Start a new timer
    pub fn start(operation: &'static str) -> Self {
        Timer {
            start: std::time::Instant::now(),
            operation,
        }
    }

    /// Stop the timer and log the duration
    pub fn stop(self) -> std::time::Duration {
        let duration = self.start.elapsed();
        tracing::debug!(
            operation = self.operation,
            duration_ms = duration.as_millis() as u64,
            "Operation completed"
        );
        duration
    }
}
