//! End-to-end tests for the consume-commit loop
//!
//! The loop runs against the in-memory log and writer from `test_utils`.
//! Most tests let the log fire shutdown once it runs dry, so `run` returns
//! after every queued message has been handled.

use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::fmt::MakeWriter;

use order_ingest::db::{InsertMode, WriteError};
use order_ingest::kafka::{MalformedPolicy, OrderConsumer, PipelineStats, RetryPolicy};
use order_ingest::models::OrderCreatedEvent;
use order_ingest::shutdown::{self, ShutdownSignal};
use order_ingest::test_utils::{
    order_message, order_messages, order_payload, MockAnalyticsWriter, MockMessageLog,
};
use order_ingest::Error;

/// Formatted log output shared with the subscriber
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    /// Route events on this thread here until the guard drops
    fn install(&self) -> tracing::subscriber::DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.0.lock().unwrap())
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Index of the first line containing every needle
    fn position(&self, needles: &[&str]) -> Option<usize> {
        self.lines()
            .iter()
            .position(|line| needles.iter().all(|n| line.contains(n)))
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn pipeline(
    log: &MockMessageLog,
    writer: &MockAnalyticsWriter,
    signal: ShutdownSignal,
    malformed_policy: MalformedPolicy,
    retry_policy: RetryPolicy,
) -> OrderConsumer {
    OrderConsumer::new(
        Arc::new(log.clone()),
        Arc::new(writer.clone()),
        signal,
        malformed_policy,
        retry_policy,
    )
}

/// Run until the log is drained
async fn run_to_drain(
    log: &MockMessageLog,
    writer: &MockAnalyticsWriter,
    malformed_policy: MalformedPolicy,
    retry_policy: RetryPolicy,
) -> order_ingest::Result<PipelineStats> {
    let (trigger, signal) = shutdown::channel();
    log.trigger_when_drained(trigger);

    let consumer = pipeline(log, writer, signal, malformed_policy, retry_policy);
    tokio::time::timeout(Duration::from_secs(5), consumer.run())
        .await
        .expect("pipeline should stop once the log is drained")
}

#[tokio::test]
async fn test_scenario_a_valid_order_is_written_then_committed() {
    let log = MockMessageLog::with_messages(vec![order_message(
        0,
        0,
        r#"{"order_id":1,"user_id":7,"total":19.99}"#,
    )]);
    let writer = MockAnalyticsWriter::new();

    let stats = run_to_drain(&log, &writer, MalformedPolicy::Skip, RetryPolicy::immediate())
        .await
        .unwrap();

    assert_eq!(writer.rows(), vec![OrderCreatedEvent::new(1, 7, 19.99)]);
    assert_eq!(log.committed(), vec![(0, 0)]);
    assert_eq!(stats.fetched, 1);
    assert_eq!(stats.written, 1);
    assert_eq!(stats.committed, 1);
}

#[tokio::test]
async fn test_scenario_b_missing_fields_are_neither_written_nor_committed() {
    let log = MockMessageLog::with_messages(vec![order_message(0, 0, r#"{"order_id":2}"#)]);
    let writer = MockAnalyticsWriter::new();

    let stats = run_to_drain(&log, &writer, MalformedPolicy::Skip, RetryPolicy::immediate())
        .await
        .unwrap();

    assert!(writer.attempts().is_empty());
    assert!(log.committed().is_empty());
    assert_eq!(stats.decode_failures, 1);
}

#[tokio::test]
async fn test_scenario_c_failed_write_is_redelivered_once() {
    let log = MockMessageLog::with_messages(vec![order_message(0, 0, &order_payload(1, 7, 19.99))]);
    let writer = MockAnalyticsWriter::new();
    writer.fail_next(1, WriteError::Connection("connection refused".to_string()));

    let stats = run_to_drain(&log, &writer, MalformedPolicy::Skip, RetryPolicy::immediate())
        .await
        .unwrap();

    assert_eq!(writer.attempts(), vec![(1, false), (1, true)]);
    assert_eq!(writer.rows().len(), 1);
    assert_eq!(log.committed(), vec![(0, 0)]);
    assert_eq!(log.fetched(), vec![(0, 0), (0, 0)]);
    assert_eq!(log.rewinds(), 1);
    assert_eq!(stats.write_failures, 1);
}

#[tokio::test]
async fn test_scenario_a_logs_success_trace() {
    let logs = CapturedLogs::default();
    let _guard = logs.install();

    let log = MockMessageLog::with_messages(vec![order_message(
        0,
        0,
        r#"{"order_id":1,"user_id":7,"total":19.99}"#,
    )]);
    let writer = MockAnalyticsWriter::new();

    run_to_drain(&log, &writer, MalformedPolicy::Skip, RetryPolicy::immediate())
        .await
        .unwrap();

    assert_eq!(log.committed(), vec![(0, 0)]);
    let success: Vec<String> = logs
        .lines()
        .into_iter()
        .filter(|line| line.contains("Order 1 created by user 7, total 19.99"))
        .collect();
    assert_eq!(success.len(), 1, "logs: {:#?}", logs.lines());
    assert!(logs.position(&["Failed to insert order"]).is_none());
}

#[tokio::test]
async fn test_scenario_c_logs_failure_before_success() {
    let logs = CapturedLogs::default();
    let _guard = logs.install();

    let log = MockMessageLog::with_messages(vec![order_message(0, 0, &order_payload(1, 7, 19.99))]);
    let writer = MockAnalyticsWriter::new();
    writer.fail_next(1, WriteError::Connection("connection refused".to_string()));

    run_to_drain(&log, &writer, MalformedPolicy::Skip, RetryPolicy::immediate())
        .await
        .unwrap();

    let failure = logs
        .position(&["Failed to insert order", "order_id=1"])
        .expect("write failure should be logged");
    let success = logs
        .position(&["Order 1 created by user 7, total 19.99", "order_id=1"])
        .expect("success trace should be logged");
    assert!(failure < success, "logs: {:#?}", logs.lines());

    let failures = logs
        .lines()
        .iter()
        .filter(|line| line.contains("Failed to insert order"))
        .count();
    assert_eq!(failures, 1);
}

#[tokio::test]
async fn test_decode_failure_is_logged_without_success_trace() {
    let logs = CapturedLogs::default();
    let _guard = logs.install();

    let log = MockMessageLog::with_messages(vec![order_message(0, 0, r#"{"order_id":2}"#)]);
    let writer = MockAnalyticsWriter::new();

    run_to_drain(&log, &writer, MalformedPolicy::Skip, RetryPolicy::immediate())
        .await
        .unwrap();

    assert!(logs.position(&["Invalid message, not committing"]).is_some());
    assert!(logs.position(&["created by user"]).is_none());
}

#[tokio::test]
async fn test_consecutive_failures_then_success_commit_once() {
    let log = MockMessageLog::with_messages(order_messages(0, 1));
    let writer = MockAnalyticsWriter::new();
    writer.fail_next(4, WriteError::Timeout("insert".to_string()));

    let stats = run_to_drain(&log, &writer, MalformedPolicy::Skip, RetryPolicy::immediate())
        .await
        .unwrap();

    assert_eq!(writer.attempts().len(), 5);
    assert_eq!(writer.rows().len(), 1);
    assert_eq!(log.committed(), vec![(0, 0)]);
    assert_eq!(stats.committed, 1);
    assert_eq!(stats.write_failures, 4);
}

#[tokio::test]
async fn test_every_commit_follows_a_successful_write() {
    let log = MockMessageLog::with_messages(vec![
        order_message(0, 0, &order_payload(1, 1, 1.0)),
        order_message(0, 1, "not json"),
        order_message(0, 2, &order_payload(3, 1, 3.0)),
        order_message(0, 3, r#"{"order_id":4,"user_id":1,"total":-4.0}"#),
        order_message(0, 4, &order_payload(5, 1, 5.0)),
    ]);
    let writer = MockAnalyticsWriter::new();
    writer.fail_next(2, WriteError::Rejected("too many parts".to_string()));

    run_to_drain(&log, &writer, MalformedPolicy::Skip, RetryPolicy::immediate())
        .await
        .unwrap();

    let written: Vec<i64> = writer.rows().iter().map(|r| r.order_id).collect();
    assert_eq!(written, vec![1, 3, 5]);
    assert_eq!(log.committed(), vec![(0, 0), (0, 2), (0, 4)]);
}

#[tokio::test]
async fn test_commits_follow_fetch_order_per_partition() {
    let log = MockMessageLog::with_messages(vec![
        order_message(0, 10, &order_payload(1, 1, 1.0)),
        order_message(1, 20, &order_payload(2, 1, 2.0)),
        order_message(0, 11, &order_payload(3, 1, 3.0)),
        order_message(1, 21, &order_payload(4, 1, 4.0)),
    ]);
    let writer = MockAnalyticsWriter::new();

    run_to_drain(&log, &writer, MalformedPolicy::Skip, RetryPolicy::immediate())
        .await
        .unwrap();

    assert_eq!(log.committed(), vec![(0, 10), (1, 20), (0, 11), (1, 21)]);
}

#[tokio::test]
async fn test_commit_failure_does_not_stop_the_pipeline() {
    let log = MockMessageLog::with_messages(order_messages(0, 2));
    log.fail_next_commit();
    let writer = MockAnalyticsWriter::new();

    let stats = run_to_drain(&log, &writer, MalformedPolicy::Skip, RetryPolicy::immediate())
        .await
        .unwrap();

    assert_eq!(writer.rows().len(), 2);
    assert_eq!(log.committed(), vec![(0, 1)]);
    assert_eq!(stats.commit_failures, 1);
    assert_eq!(stats.written, 2);
}

#[tokio::test]
async fn test_fetch_errors_are_counted_and_survived() {
    let log = MockMessageLog::with_messages(order_messages(0, 1));
    log.fail_next_fetches(2);
    let writer = MockAnalyticsWriter::new();

    let stats = run_to_drain(&log, &writer, MalformedPolicy::Skip, RetryPolicy::immediate())
        .await
        .unwrap();

    assert_eq!(stats.fetch_errors, 2);
    assert_eq!(log.committed(), vec![(0, 0)]);
}

#[tokio::test]
async fn test_halt_policy_stops_on_malformed_message() {
    let log = MockMessageLog::with_messages(vec![
        order_message(2, 7, r#"{"order_id":"x","user_id":1,"total":1}"#),
        order_message(2, 8, &order_payload(9, 1, 1.0)),
    ]);
    let writer = MockAnalyticsWriter::new();

    let result = run_to_drain(&log, &writer, MalformedPolicy::Halt, RetryPolicy::immediate()).await;

    match result {
        Err(Error::MalformedMessage {
            partition, offset, ..
        }) => {
            assert_eq!((partition, offset), (2, 7));
        },
        other => panic!("expected MalformedMessage, got {:?}", other),
    }
    assert!(writer.attempts().is_empty());
    assert!(log.committed().is_empty());
    assert_eq!(log.pending(), 1);
}

#[tokio::test]
async fn test_retries_exhausted_stops_without_commit() {
    let log = MockMessageLog::with_messages(order_messages(0, 2));
    let writer = MockAnalyticsWriter::new();
    writer.fail_next(5, WriteError::Connection("down".to_string()));

    let result = run_to_drain(
        &log,
        &writer,
        MalformedPolicy::Skip,
        RetryPolicy::immediate().with_max_attempts(Some(3)),
    )
    .await;

    assert!(matches!(
        result,
        Err(Error::RetriesExhausted {
            partition: 0,
            offset: 0,
            attempts: 3
        })
    ));
    assert_eq!(writer.attempts(), vec![(1, false), (1, false), (1, false)]);
    assert!(log.committed().is_empty());
}

#[tokio::test]
async fn test_skip_existing_absorbs_duplicate_delivery() {
    let payload = order_payload(42, 7, 12.5);
    let log = MockMessageLog::with_messages(vec![
        order_message(0, 0, &payload),
        order_message(0, 1, &payload),
    ]);
    let writer = MockAnalyticsWriter::new().with_insert_mode(InsertMode::SkipExisting);

    let stats = run_to_drain(&log, &writer, MalformedPolicy::Skip, RetryPolicy::immediate())
        .await
        .unwrap();

    assert_eq!(writer.rows().len(), 1);
    assert_eq!(log.committed(), vec![(0, 0), (0, 1)]);
    assert_eq!(stats.committed, 2);
}

#[tokio::test]
async fn test_cancellation_while_waiting_for_a_message() {
    let log = MockMessageLog::new();
    let writer = MockAnalyticsWriter::new();
    let (trigger, signal) = shutdown::channel();

    let consumer = pipeline(
        &log,
        &writer,
        signal,
        MalformedPolicy::Skip,
        RetryPolicy::immediate(),
    );
    let handle = tokio::spawn(consumer.run());

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(trigger.trigger());

    let stats = tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("loop should stop on cancellation")
        .unwrap()
        .unwrap();

    assert_eq!(stats, PipelineStats::default());

    // Nothing arriving after shutdown is touched
    log.push(order_message(0, 0, &order_payload(1, 1, 1.0)));
    assert!(log.fetched().is_empty());
    assert!(writer.attempts().is_empty());
}

#[tokio::test]
async fn test_cancellation_mid_write_completes_the_write() {
    let log = MockMessageLog::with_messages(order_messages(0, 2));
    let writer = MockAnalyticsWriter::new().with_delay(Duration::from_millis(50));
    let (trigger, signal) = shutdown::channel();
    writer.trigger_on_insert(trigger);

    let consumer = pipeline(
        &log,
        &writer,
        signal,
        MalformedPolicy::Skip,
        RetryPolicy::immediate(),
    );
    let stats = tokio::time::timeout(Duration::from_secs(5), consumer.run())
        .await
        .expect("loop should stop after the in-flight message")
        .unwrap();

    assert_eq!(writer.rows().len(), 1);
    assert_eq!(log.committed(), vec![(0, 0)]);
    assert_eq!(log.pending(), 1);
    assert_eq!(stats.committed, 1);
}

#[tokio::test]
async fn test_cancellation_interrupts_retry_backoff() {
    let log = MockMessageLog::with_messages(order_messages(0, 1));
    let writer = MockAnalyticsWriter::new();
    writer.fail_next(1, WriteError::Timeout("insert".to_string()));
    let (trigger, signal) = shutdown::channel();

    let policy = RetryPolicy::default()
        .with_initial_backoff(60_000)
        .with_max_backoff(60_000)
        .with_randomization_factor(0.0);
    let consumer = pipeline(&log, &writer, signal, MalformedPolicy::Skip, policy);
    let handle = tokio::spawn(consumer.run());

    tokio::time::sleep(Duration::from_millis(50)).await;
    trigger.trigger();

    let stats = tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("backoff wait should be cancellable")
        .unwrap()
        .unwrap();

    assert_eq!(stats.write_failures, 1);
    assert!(log.committed().is_empty());
    assert_eq!(log.pending(), 1);
}
