//! Substrate trait and watch events.
//!
//! The substrate is the orchestration platform that stores records and runs
//! workloads. The controller only talks to it through this trait.

use async_trait::async_trait;

use crate::{BuildRecord, ProjectRecord, Result, WorkloadSpec};

/// A change observed on the watched build records.
///
/// A relist is bracketed by `RelistStarted` and `RelistDone`; the records
/// delivered in between replace the previous view as a whole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent<T> {
    /// The record was created or modified.
    Applied(T),
    /// The record was deleted.
    Deleted(T),
    RelistStarted,
    Relisted(T),
    RelistDone,
}

/// Trait for orchestration substrates.
#[async_trait]
pub trait Substrate: Send + Sync {
    /// Name of this substrate.
    fn name(&self) -> &'static str;

    /// Fetch a project record by id. Always a fresh read.
    async fn get_project(&self, namespace: &str, id: &str) -> Result<Option<ProjectRecord>>;

    /// Check whether a workload with the given name exists.
    async fn workload_exists(&self, namespace: &str, name: &str) -> Result<bool>;

    /// Create a workload. Fails with `Error::AlreadyExists` if one with the
    /// same name is already present.
    async fn create_workload(&self, spec: &WorkloadSpec) -> Result<()>;

    /// Mark a build record as accepted.
    async fn mark_accepted(&self, build: &BuildRecord) -> Result<()>;
}
