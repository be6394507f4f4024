//! Redelivery policy for messages whose write failed
//!
//! A failed write leaves the message uncommitted and rewinds its partition, so
//! the same message comes back on the next fetch. The policy decides how long
//! to wait before that fetch and whether to give up.

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use std::collections::HashMap;
use std::time::Duration;

use crate::config::ProcessingConfig;

/// Retry configuration for redelivered messages
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Initial backoff duration in milliseconds
    pub initial_backoff_ms: u64,
    /// Maximum backoff duration in milliseconds
    pub max_backoff_ms: u64,
    /// Backoff multiplier
    pub multiplier: f64,
    /// Jitter applied to each delay, 0.0 to 1.0
    pub randomization_factor: f64,
    /// Failed writes allowed per message; `None` retries forever
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 100,
            max_backoff_ms: 30_000,
            multiplier: 2.0,
            randomization_factor: 0.2,
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    /// Create a policy that gives up after `max_attempts` failures
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            ..Default::default()
        }
    }

    /// Build a policy from processing configuration
    pub fn from_config(config: &ProcessingConfig) -> Self {
        Self {
            initial_backoff_ms: config.retry_initial_ms,
            max_backoff_ms: config.retry_max_ms,
            multiplier: config.retry_multiplier,
            randomization_factor: config.retry_jitter,
            max_attempts: config.retry_max_attempts,
        }
    }

    /// Redeliver immediately, without waiting
    pub fn immediate() -> Self {
        Self {
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
            multiplier: 1.0,
            randomization_factor: 0.0,
            max_attempts: None,
        }
    }

    /// Set the initial backoff
    pub fn with_initial_backoff(mut self, ms: u64) -> Self {
        self.initial_backoff_ms = ms;
        self
    }

    /// Set the maximum backoff
    pub fn with_max_backoff(mut self, ms: u64) -> Self {
        self.max_backoff_ms = ms;
        self
    }

    /// Set the backoff multiplier
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Set the jitter
    pub fn with_randomization_factor(mut self, factor: f64) -> Self {
        self.randomization_factor = factor;
        self
    }

    /// Set the attempt limit
    pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    fn backoff(&self) -> ExponentialBackoff {
        let mut backoff = ExponentialBackoff {
            initial_interval: Duration::from_millis(self.initial_backoff_ms),
            max_interval: Duration::from_millis(self.max_backoff_ms),
            multiplier: self.multiplier,
            randomization_factor: self.randomization_factor,
            max_elapsed_time: None,
            ..Default::default()
        };
        backoff.reset();
        backoff
    }
}

/// What to do after a failed write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait `delay`, then fetch the same message again
    Retry { attempt: u32, delay: Duration },
    /// The policy's attempt limit was reached
    Exhausted { attempts: u32 },
}

struct PendingRetry {
    offset: i64,
    attempts: u32,
    backoff: ExponentialBackoff,
}

/// Tracks consecutive write failures per partition
///
/// A rewind only repositions the failed partition, so messages prefetched
/// from other partitions can fail in between. Each partition keeps its own
/// count and backoff so that interleaving does not reset them.
pub struct RetryTracker {
    policy: RetryPolicy,
    pending: HashMap<i32, PendingRetry>,
}

impl RetryTracker {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            pending: HashMap::new(),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Record a failed write for the message at `partition`/`offset`
    ///
    /// A failure on a different offset of the same partition starts a fresh
    /// count for that partition.
    pub fn record_failure(&mut self, partition: i32, offset: i64) -> RetryDecision {
        let policy = &self.policy;
        let pending = self
            .pending
            .entry(partition)
            .and_modify(|p| {
                if p.offset != offset {
                    *p = PendingRetry {
                        offset,
                        attempts: 0,
                        backoff: policy.backoff(),
                    };
                }
            })
            .or_insert_with(|| PendingRetry {
                offset,
                attempts: 0,
                backoff: policy.backoff(),
            });

        pending.attempts += 1;

        if let Some(max) = policy.max_attempts {
            if pending.attempts >= max {
                return RetryDecision::Exhausted {
                    attempts: pending.attempts,
                };
            }
        }

        let delay = pending
            .backoff
            .next_backoff()
            .unwrap_or(Duration::from_millis(policy.max_backoff_ms));
        RetryDecision::Retry {
            attempt: pending.attempts,
            delay,
        }
    }

    /// Forget the pending retry on `partition` after one of its messages was written
    pub fn record_success(&mut self, partition: i32) {
        self.pending.remove(&partition);
    }

    /// Failed attempts recorded for the message being retried on `partition`
    pub fn attempts(&self, partition: i32) -> u32 {
        self.pending.get(&partition).map_or(0, |p| p.attempts)
    }
}
