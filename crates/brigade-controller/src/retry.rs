//! Retry policy for sync results.

use brigade_core::{Error, RecordKey, Result};
use std::sync::Arc;
use tracing::{error, warn};

use crate::queue::WorkQueue;
use crate::reconciler::SyncOutcome;

/// Retries allowed for one key before it is dropped.
pub const MAX_RETRIES: u32 = 5;

/// Receives errors the controller gave up on.
pub trait ErrorSink: Send + Sync {
    fn report(&self, key: &RecordKey, error: &Error);
}

/// Reports dropped keys through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorSink;

impl ErrorSink for TracingErrorSink {
    fn report(&self, key: &RecordKey, error: &Error) {
        error!(build = %key, error = %error, "Unhandled reconcile error");
    }
}

/// What the policy did with a sync result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Forgotten,
    Requeued { attempt: u32 },
    Dropped,
}

/// Forgets successes, requeues failures with backoff, and drops a key after
/// [`MAX_RETRIES`] retries.
#[derive(Clone)]
pub struct RetryPolicy {
    sink: Arc<dyn ErrorSink>,
}

impl RetryPolicy {
    pub fn new(sink: Arc<dyn ErrorSink>) -> Self {
        Self { sink }
    }

    pub fn handle(
        &self,
        queue: &WorkQueue<RecordKey>,
        key: &RecordKey,
        result: Result<SyncOutcome>,
    ) -> RetryDecision {
        let err = match result {
            Ok(_) => {
                queue.forget(key);
                return RetryDecision::Forgotten;
            }
            Err(err) => err,
        };

        let retries = queue.num_requeues(key);
        if retries < MAX_RETRIES {
            warn!(build = %key, error = %err, attempt = retries + 1, "Error syncing build, retrying");
            queue.add_rate_limited(key.clone());
            return RetryDecision::Requeued {
                attempt: retries + 1,
            };
        }

        queue.forget(key);
        self.sink.report(key, &err);
        warn!(build = %key, error = %err, "Dropping build out of the queue");
        RetryDecision::Dropped
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Arc::new(TracingErrorSink))
    }
}
