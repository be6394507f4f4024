//! rdkafka-backed message log with manual offset management

use anyhow::anyhow;
use async_trait::async_trait;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::topic_partition_list::TopicPartitionList;
use rdkafka::Offset;
use std::time::Duration;
use tracing::{debug, info};

use super::{FetchedMessage, KafkaConfig, KafkaIntegrationError, MessageLog};
use crate::error::{Error, Result};

/// Kafka consumer subscribed to the orders topic
pub struct KafkaMessageLog {
    consumer: StreamConsumer,
    topic: String,
    request_timeout: Duration,
}

impl KafkaMessageLog {
    /// Create the consumer and subscribe to the configured topic
    pub fn new(config: &KafkaConfig) -> Result<Self> {
        let consumer: StreamConsumer = config
            .build_consumer_config()
            .create()
            .map_err(|e| anyhow!("Failed to create Kafka consumer: {}", e))?;

        consumer
            .subscribe(&[config.topic.as_str()])
            .map_err(|e| anyhow!("Failed to subscribe to topic '{}': {}", config.topic, e))?;

        Ok(Self {
            consumer,
            topic: config.topic.clone(),
            request_timeout: config.request_timeout(),
        })
    }

    /// Create the consumer and confirm the brokers answer
    ///
    /// Creating an rdkafka consumer never talks to the cluster, so startup
    /// probes topic metadata to fail fast on an unreachable broker.
    pub async fn connect(config: &KafkaConfig) -> Result<Self> {
        let log = Self::new(config)?;

        let metadata = tokio::task::block_in_place(|| {
            log.consumer
                .fetch_metadata(Some(log.topic.as_str()), log.request_timeout)
        })
        .map_err(|e| Error::kafka(format!("Failed to reach Kafka brokers: {}", e)))?;

        let partitions = metadata
            .topics()
            .iter()
            .find(|t| t.name() == log.topic)
            .map(|t| t.partitions().len())
            .unwrap_or(0);

        info!(
            topic = %log.topic,
            group_id = %config.group_id,
            partitions = partitions,
            "Kafka consumer subscribed"
        );

        Ok(log)
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

#[async_trait]
impl MessageLog for KafkaMessageLog {
    async fn fetch(&self) -> std::result::Result<FetchedMessage, KafkaIntegrationError> {
        let message = self.consumer.recv().await?;
        Ok(FetchedMessage::from_message(&message))
    }

    fn commit(&self, message: &FetchedMessage) -> std::result::Result<(), KafkaIntegrationError> {
        // The committed offset is the next one to read.
        let mut offsets = TopicPartitionList::new();
        offsets
            .add_partition_offset(
                &message.topic,
                message.partition,
                Offset::Offset(message.offset + 1),
            )
            .map_err(|e| KafkaIntegrationError::OffsetCommitError(e.to_string()))?;

        self.consumer
            .commit(&offsets, CommitMode::Sync)
            .map_err(|e| KafkaIntegrationError::OffsetCommitError(e.to_string()))?;

        debug!(
            partition = message.partition,
            offset = message.offset,
            "Offset committed"
        );
        Ok(())
    }

    fn rewind(&self, message: &FetchedMessage) -> std::result::Result<(), KafkaIntegrationError> {
        self.consumer
            .seek(
                &message.topic,
                message.partition,
                Offset::Offset(message.offset),
                self.request_timeout,
            )
            .map_err(|e| KafkaIntegrationError::SeekError(e.to_string()))?;

        debug!(
            partition = message.partition,
            offset = message.offset,
            "Partition rewound for redelivery"
        );
        Ok(())
    }
}
