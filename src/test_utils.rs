//! Test utilities for order-ingest
//!
//! In-memory stand-ins for the message log and the analytics store, with
//! knobs for scripting failures. Both are cheap to clone and share state
//! between clones, so a test keeps one handle while the pipeline owns another.

use async_trait::async_trait;
use rdkafka::error::KafkaError;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

use crate::db::{AnalyticsWriter, InsertAck, InsertMode, WriteError, WriteResult};
use crate::kafka::{FetchedMessage, KafkaIntegrationError, MessageLog};
use crate::models::OrderCreatedEvent;
use crate::shutdown::ShutdownTrigger;

/// Topic used for messages built by the helpers below
pub const TEST_TOPIC: &str = "orders.created";

#[derive(Default)]
struct LogState {
    queue: VecDeque<FetchedMessage>,
    fetched: Vec<(i32, i64)>,
    committed: Vec<(i32, i64)>,
    rewinds: usize,
    fetch_failures: usize,
    commit_failures: usize,
    fail_rewinds: bool,
    on_drained: Option<ShutdownTrigger>,
}

/// Mock message log backed by a queue
///
/// `fetch` pops from the front and waits when the queue is empty. `rewind`
/// puts the message back at the front, which is what a seek does to the
/// partition's fetch position.
#[derive(Clone, Default)]
pub struct MockMessageLog {
    state: Arc<Mutex<LogState>>,
    notify: Arc<Notify>,
}

impl MockMessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a log preloaded with messages
    pub fn with_messages(messages: impl IntoIterator<Item = FetchedMessage>) -> Self {
        let log = Self::new();
        for message in messages {
            log.push(message);
        }
        log
    }

    /// Append a message to the end of the queue
    pub fn push(&self, message: FetchedMessage) {
        self.state.lock().unwrap().queue.push_back(message);
        self.notify.notify_one();
    }

    /// Fire `trigger` the first time a fetch finds the queue empty
    pub fn trigger_when_drained(&self, trigger: ShutdownTrigger) {
        self.state.lock().unwrap().on_drained = Some(trigger);
    }

    /// Make the next `count` fetches fail
    pub fn fail_next_fetches(&self, count: usize) {
        self.state.lock().unwrap().fetch_failures = count;
    }

    /// Make the next commit fail
    pub fn fail_next_commit(&self) {
        self.state.lock().unwrap().commit_failures += 1;
    }

    /// Make every rewind fail
    pub fn fail_rewinds(&self) {
        self.state.lock().unwrap().fail_rewinds = true;
    }

    /// Committed (partition, offset) pairs, in commit order
    pub fn committed(&self) -> Vec<(i32, i64)> {
        self.state.lock().unwrap().committed.clone()
    }

    /// Fetched (partition, offset) pairs, in fetch order
    pub fn fetched(&self) -> Vec<(i32, i64)> {
        self.state.lock().unwrap().fetched.clone()
    }

    pub fn rewinds(&self) -> usize {
        self.state.lock().unwrap().rewinds
    }

    pub fn pending(&self) -> usize {
        self.state.lock().unwrap().queue.len()
    }
}

#[async_trait]
impl MessageLog for MockMessageLog {
    async fn fetch(&self) -> Result<FetchedMessage, KafkaIntegrationError> {
        loop {
            {
                let mut state = self.state.lock().unwrap();

                if state.fetch_failures > 0 {
                    state.fetch_failures -= 1;
                    return Err(KafkaIntegrationError::ConnectionError(
                        KafkaError::NoMessageReceived,
                    ));
                }

                if let Some(message) = state.queue.pop_front() {
                    state.fetched.push((message.partition, message.offset));
                    return Ok(message);
                }

                if let Some(trigger) = state.on_drained.take() {
                    trigger.trigger();
                }
            }

            self.notify.notified().await;
        }
    }

    fn commit(&self, message: &FetchedMessage) -> Result<(), KafkaIntegrationError> {
        let mut state = self.state.lock().unwrap();
        if state.commit_failures > 0 {
            state.commit_failures -= 1;
            return Err(KafkaIntegrationError::OffsetCommitError(
                "Mock commit failure".to_string(),
            ));
        }
        state.committed.push((message.partition, message.offset));
        Ok(())
    }

    fn rewind(&self, message: &FetchedMessage) -> Result<(), KafkaIntegrationError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_rewinds {
            return Err(KafkaIntegrationError::SeekError(
                "Mock seek failure".to_string(),
            ));
        }
        state.rewinds += 1;
        state.queue.push_front(message.clone());
        drop(state);
        self.notify.notify_one();
        Ok(())
    }
}

#[derive(Default)]
struct WriterState {
    rows: Vec<OrderCreatedEvent>,
    attempts: Vec<(i64, bool)>,
    failures: VecDeque<WriteError>,
    unhealthy: bool,
    on_insert: Option<ShutdownTrigger>,
}

/// Mock analytics writer that stores rows in memory
#[derive(Clone, Default)]
pub struct MockAnalyticsWriter {
    state: Arc<Mutex<WriterState>>,
    insert_mode: InsertMode,
    delay: Option<Duration>,
}

impl MockAnalyticsWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the given duplicate handling
    pub fn with_insert_mode(mut self, mode: InsertMode) -> Self {
        self.insert_mode = mode;
        self
    }

    /// Make every insert take at least `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail the next `count` inserts with `error`
    pub fn fail_next(&self, count: usize, error: WriteError) {
        let mut state = self.state.lock().unwrap();
        for _ in 0..count {
            state.failures.push_back(error.clone());
        }
    }

    /// Make health checks fail
    pub fn set_unhealthy(&self) {
        self.state.lock().unwrap().unhealthy = true;
    }

    /// Fire `trigger` when the next insert starts
    pub fn trigger_on_insert(&self, trigger: ShutdownTrigger) {
        self.state.lock().unwrap().on_insert = Some(trigger);
    }

    /// Rows written so far
    pub fn rows(&self) -> Vec<OrderCreatedEvent> {
        self.state.lock().unwrap().rows.clone()
    }

    /// Every insert call as (order_id, succeeded)
    pub fn attempts(&self) -> Vec<(i64, bool)> {
        self.state.lock().unwrap().attempts.clone()
    }
}

#[async_trait]
impl AnalyticsWriter for MockAnalyticsWriter {
    async fn insert(&self, event: &OrderCreatedEvent) -> WriteResult<InsertAck> {
        if let Some(trigger) = self.state.lock().unwrap().on_insert.take() {
            trigger.trigger();
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        if let Some(error) = state.failures.pop_front() {
            state.attempts.push((event.order_id, false));
            return Err(error);
        }

        state.attempts.push((event.order_id, true));

        if self.insert_mode == InsertMode::SkipExisting
            && state.rows.iter().any(|r| r.order_id == event.order_id)
        {
            return Ok(InsertAck::AlreadyPresent);
        }

        state.rows.push(event.clone());
        Ok(InsertAck::Inserted)
    }

    async fn health_check(&self) -> WriteResult<()> {
        if self.state.lock().unwrap().unhealthy {
            return Err(WriteError::Connection("Mock store unreachable".to_string()));
        }
        Ok(())
    }
}

/// JSON payload for an order event
pub fn order_payload(order_id: i64, user_id: i64, total: f64) -> String {
    format!(
        r#"{{"order_id":{},"user_id":{},"total":{}}}"#,
        order_id, user_id, total
    )
}

/// Build a fetched message on the test topic
pub fn order_message(partition: i32, offset: i64, payload: &str) -> FetchedMessage {
    FetchedMessage {
        topic: TEST_TOPIC.to_string(),
        partition,
        offset,
        timestamp: None,
        key: None,
        payload: payload.as_bytes().to_vec(),
    }
}

/// Build `count` valid order messages on one partition, starting at offset 0
pub fn order_messages(partition: i32, count: usize) -> Vec<FetchedMessage> {
    (0..count)
        .map(|i| {
            let id = i as i64 + 1;
            order_message(partition, i as i64, &order_payload(id, 100 + id, 10.0 * id as f64))
        })
        .collect()
}
