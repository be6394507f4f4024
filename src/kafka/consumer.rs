//! Consume-commit loop for order events
//!
//! One message at a time: fetch, decode, write, commit. The offset of a
//! message is committed only after its write succeeded, so every committed
//! message has been written. Failed writes are redelivered by rewinding the
//! partition; malformed payloads are handled by the configured
//! `MalformedPolicy`.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn, Instrument};

use super::{
    FetchedMessage, MalformedPolicy, MessageLog, PipelineStats, ProcessingOutcome,
    RetryDecision, RetryPolicy, RetryTracker,
};
use crate::config::ProcessingConfig;
use crate::db::{AnalyticsWriter, InsertAck};
use crate::error::{Error, Result};
use crate::logging::Timer;
use crate::models::decode;
use crate::shutdown::ShutdownSignal;

/// Drives order events from the log into the analytics store
pub struct OrderConsumer {
    /// Partitioned log the events come from
    log: Arc<dyn MessageLog>,

    /// Analytics store the events go to
    writer: Arc<dyn AnalyticsWriter>,

    /// Cancellation, observed between messages only
    shutdown: ShutdownSignal,

    /// Handling of payloads that fail to decode
    malformed_policy: MalformedPolicy,

    /// Redelivery bookkeeping for failed writes
    retries: RetryTracker,

    stats: PipelineStats,
}

impl OrderConsumer {
    /// Create a new order consumer
    pub fn new(
        log: Arc<dyn MessageLog>,
        writer: Arc<dyn AnalyticsWriter>,
        shutdown: ShutdownSignal,
        malformed_policy: MalformedPolicy,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            log,
            writer,
            shutdown,
            malformed_policy,
            retries: RetryTracker::new(retry_policy),
            stats: PipelineStats::default(),
        }
    }

    /// Create a consumer with policies taken from processing configuration
    pub fn from_config(
        log: Arc<dyn MessageLog>,
        writer: Arc<dyn AnalyticsWriter>,
        shutdown: ShutdownSignal,
        config: &ProcessingConfig,
    ) -> Self {
        Self::new(
            log,
            writer,
            shutdown,
            config.malformed_policy,
            RetryPolicy::from_config(config),
        )
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    /// Run until shutdown is requested or a fatal condition stops the loop
    ///
    /// Returns the final counters on graceful shutdown.
    pub async fn run(mut self) -> Result<PipelineStats> {
        info!(
            malformed_policy = %self.malformed_policy,
            max_attempts = ?self.retries.policy().max_attempts,
            "Starting order consumer"
        );

        let mut shutdown = self.shutdown.clone();

        loop {
            let fetched = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested, stopping order consumer");
                    break;
                }
                fetched = self.log.fetch() => fetched,
            };

            let message = match fetched {
                Ok(message) => message,
                Err(e) => {
                    self.stats.fetch_errors += 1;
                    error!(error = %e, "Kafka consumer error");
                    let delay = Duration::from_millis(self.retries.policy().initial_backoff_ms);
                    if !Self::pause(&mut shutdown, delay).await {
                        break;
                    }
                    continue;
                },
            };

            self.stats.fetched += 1;

            match self.process_message(&message).await {
                outcome if outcome.is_written() => {
                    self.retries.record_success(message.partition);
                },
                ProcessingOutcome::DecodeFailed(e) => {
                    if self.malformed_policy == MalformedPolicy::Halt {
                        error!(
                            partition = message.partition,
                            offset = message.offset,
                            "Halting on malformed message"
                        );
                        return Err(Error::MalformedMessage {
                            partition: message.partition,
                            offset: message.offset,
                            reason: e.to_string(),
                        });
                    }
                },
                ProcessingOutcome::WriteFailed(..) => {
                    let delay = self.schedule_redelivery(&message)?;
                    if !Self::pause(&mut shutdown, delay).await {
                        break;
                    }
                },
                ProcessingOutcome::Committed(_) | ProcessingOutcome::CommitFailed(..) => {},
            }
        }

        info!(
            fetched = self.stats.fetched,
            committed = self.stats.committed,
            decode_failures = self.stats.decode_failures,
            write_failures = self.stats.write_failures,
            commit_failures = self.stats.commit_failures,
            "Order consumer stopped"
        );

        Ok(self.stats)
    }

    /// Decode, write and commit one message
    ///
    /// The offset is committed only when the write returned success. A failed
    /// commit is logged and otherwise ignored; the write stands.
    pub async fn process_message(&mut self, message: &FetchedMessage) -> ProcessingOutcome {
        let span = crate::kafka_span!(message.partition, message.offset);
        let timer = Timer::start("process_message");

        let outcome = async {
            let event = match decode(&message.payload) {
                Ok(event) => event,
                Err(e) => {
                    self.stats.decode_failures += 1;
                    warn!(error = %e, "Invalid message, not committing");
                    return ProcessingOutcome::DecodeFailed(e);
                },
            };

            tracing::Span::current().record("order_id", event.order_id);

            match self.writer.insert(&event).await {
                Ok(InsertAck::Inserted) => {},
                Ok(InsertAck::AlreadyPresent) => {
                    debug!(order_id = event.order_id, "Order was already stored");
                },
                Err(e) => {
                    self.stats.write_failures += 1;
                    error!(
                        order_id = event.order_id,
                        retryable = e.is_retryable(),
                        error = %e,
                        "Failed to insert order, offset not committed"
                    );
                    return ProcessingOutcome::WriteFailed(event, e);
                },
            }
            self.stats.written += 1;

            let outcome = match self.log.commit(message) {
                Ok(()) => {
                    self.stats.committed += 1;
                    ProcessingOutcome::Committed(event)
                },
                Err(e) => {
                    self.stats.commit_failures += 1;
                    error!(
                        order_id = event.order_id,
                        error = %e,
                        "Commit failed, order may be redelivered"
                    );
                    ProcessingOutcome::CommitFailed(event, e)
                },
            };

            if let ProcessingOutcome::Committed(event) | ProcessingOutcome::CommitFailed(event, _) =
                &outcome
            {
                info!(
                    order_id = event.order_id,
                    user_id = event.user_id,
                    total = event.total,
                    "Order {} created by user {}, total {:.2}",
                    event.order_id,
                    event.user_id,
                    event.total
                );
            }

            outcome
        }
        .instrument(span.clone())
        .await;

        span.record("processing_time_ms", timer.stop().as_millis() as u64);
        outcome
    }

    /// Arrange for a message whose write failed to be fetched again
    ///
    /// A partition that cannot be rewound would let later commits skip past
    /// the unwritten message, so that is fatal.
    fn schedule_redelivery(&mut self, message: &FetchedMessage) -> Result<Duration> {
        let (attempt, delay) = match self.retries.record_failure(message.partition, message.offset)
        {
            RetryDecision::Retry { attempt, delay } => (attempt, delay),
            RetryDecision::Exhausted { attempts } => {
                error!(
                    partition = message.partition,
                    offset = message.offset,
                    attempts = attempts,
                    "Retry budget exhausted, stopping without commit"
                );
                return Err(Error::RetriesExhausted {
                    partition: message.partition,
                    offset: message.offset,
                    attempts,
                });
            },
        };

        self.log.rewind(message).map_err(|e| {
            error!(
                partition = message.partition,
                offset = message.offset,
                error = %e,
                "Could not rewind partition for redelivery"
            );
            Error::from(e)
        })?;

        warn!(
            partition = message.partition,
            offset = message.offset,
            attempt = attempt,
            delay_ms = delay.as_millis() as u64,
            "Message will be redelivered"
        );

        Ok(delay)
    }

    /// Sleep unless shutdown arrives first; returns false on shutdown
    async fn pause(shutdown: &mut ShutdownSignal, delay: Duration) -> bool {
        if delay.is_zero() {
            return !shutdown.is_cancelled();
        }

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}
