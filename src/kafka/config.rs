//! Kafka configuration module

use envconfig::Envconfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Kafka configuration settings
#[derive(Debug, Clone, Deserialize, Serialize, Envconfig)]
pub struct KafkaConfig {
    /// Kafka broker addresses (comma-separated)
    #[serde(default = "default_brokers")]
    #[envconfig(from = "KAFKA_BROKERS", default = "localhost:9092")]
    pub brokers: String,

    /// Consumer group ID
    #[serde(default = "default_group_id")]
    #[envconfig(from = "KAFKA_GROUP_ID", default = "order-analytics")]
    pub group_id: String,

    /// Topic carrying order-created events
    #[serde(default = "default_topic")]
    #[envconfig(from = "KAFKA_TOPIC_ORDERS", default = "orders.created")]
    pub topic: String,

    /// Where to start when the group has no committed offset (earliest, latest)
    #[serde(default = "default_auto_offset_reset")]
    #[envconfig(from = "KAFKA_AUTO_OFFSET_RESET", default = "earliest")]
    pub auto_offset_reset: String,

    /// Session timeout in milliseconds
    #[serde(default = "default_session_timeout")]
    #[envconfig(from = "KAFKA_SESSION_TIMEOUT_MS", default = "30000")]
    pub session_timeout_ms: u32,

    /// Maximum poll interval in milliseconds
    #[serde(default = "default_max_poll_interval")]
    #[envconfig(from = "KAFKA_MAX_POLL_INTERVAL_MS", default = "300000")]
    pub max_poll_interval_ms: u32,

    /// Timeout for seeks and the startup metadata probe, in milliseconds
    #[serde(default = "default_request_timeout")]
    #[envconfig(from = "KAFKA_REQUEST_TIMEOUT_MS", default = "10000")]
    pub request_timeout_ms: u64,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: default_brokers(),
            group_id: default_group_id(),
            topic: default_topic(),
            auto_offset_reset: default_auto_offset_reset(),
            session_timeout_ms: default_session_timeout(),
            max_poll_interval_ms: default_max_poll_interval(),
            request_timeout_ms: default_request_timeout(),
        }
    }
}

impl KafkaConfig {
    /// Get brokers as a vector, dropping empty entries
    pub fn brokers_list(&self) -> Vec<String> {
        self.brokers
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Build rdkafka consumer configuration
    ///
    /// Offsets are only ever committed explicitly, after a successful write.
    pub fn build_consumer_config(&self) -> rdkafka::ClientConfig {
        let mut config = rdkafka::ClientConfig::new();

        config
            .set("bootstrap.servers", self.brokers_list().join(","))
            .set("group.id", &self.group_id)
            .set("enable.auto.commit", "false")
            .set("enable.auto.offset.store", "false")
            .set("session.timeout.ms", self.session_timeout_ms.to_string())
            .set(
                "max.poll.interval.ms",
                self.max_poll_interval_ms.to_string(),
            )
            .set("enable.partition.eof", "false")
            .set("auto.offset.reset", &self.auto_offset_reset)
            .set("isolation.level", "read_committed");

        config
    }
}

// Default value functions
fn default_brokers() -> String {
    "localhost:9092".to_string()
}

fn default_group_id() -> String {
    "order-analytics".to_string()
}

fn default_topic() -> String {
    "orders.created".to_string()
}

fn default_auto_offset_reset() -> String {
    "earliest".to_string()
}

fn default_session_timeout() -> u32 {
    30000 // 30 seconds
}

fn default_max_poll_interval() -> u32 {
    300000 // 5 minutes
}

fn default_request_timeout() -> u64 {
    10000
}
