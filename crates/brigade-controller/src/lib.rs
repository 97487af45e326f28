//! Build reconciliation controller for Brigade.
//!
//! Watches build records, queues their keys, and creates exactly one
//! workload per build:
//! - `cache`: watch-fed local mirror of build records
//! - `queue`: deduplicating, rate-limited key queue
//! - `reconciler`: the per-key sync routine
//! - `retry`: bounded retry around sync results
//! - `builder`: pure derivation of the workload spec

pub mod builder;
pub mod cache;
pub mod controller;
pub mod image;
pub mod queue;
pub mod reconciler;
pub mod retry;

#[cfg(test)]
pub(crate) mod testing;

pub use builder::build_workload;
pub use cache::{BuildCache, Informer};
pub use controller::BuildController;
pub use image::ImageRef;
pub use queue::{ExponentialBackoff, WorkQueue};
pub use reconciler::{Reconciler, SyncOutcome};
pub use retry::{ErrorSink, MAX_RETRIES, RetryDecision, RetryPolicy, TracingErrorSink};
