//! In-memory substrate and fixtures for controller tests.

use async_trait::async_trait;
use brigade_core::record::labels;
use brigade_core::{
    BuildRecord, Error, ProjectRecord, RecordKey, RecordMeta, Result, Substrate, WatchEvent,
    WorkloadSpec,
};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::cache::{BuildCache, Informer};
use crate::queue::WorkQueue;
use crate::retry::ErrorSink;

pub fn build_record(name: &str, project: Option<&str>) -> BuildRecord {
    let mut meta = RecordMeta::new("default", name)
        .with_uid(format!("uid-{}", name))
        .with_label(labels::HERITAGE, labels::HERITAGE_BRIGADE)
        .with_label(labels::COMPONENT, labels::COMPONENT_BUILD)
        .with_label(labels::BUILD, format!("id-{}", name));
    if let Some(project) = project {
        meta = meta.with_label(labels::PROJECT, project);
    }
    BuildRecord::new(meta, Default::default())
}

pub fn project_record(name: &str, data: &[(&str, &str)]) -> ProjectRecord {
    ProjectRecord::new(
        RecordMeta::new("default", name).with_label(labels::COMPONENT, labels::COMPONENT_PROJECT),
        data.iter().map(|(k, v)| (*k, v.to_string())).collect(),
    )
}

/// A synced cache holding exactly `records`.
pub fn seeded_cache(records: Vec<BuildRecord>) -> BuildCache {
    let cache = BuildCache::new();
    let mut informer = Informer::new(cache.clone(), WorkQueue::new());
    informer.handle(WatchEvent::RelistStarted);
    for record in records {
        informer.handle(WatchEvent::Relisted(record));
    }
    informer.handle(WatchEvent::RelistDone);
    cache
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Calls {
    pub get_project: usize,
    pub workload_exists: usize,
    pub create_workload: usize,
    pub mark_accepted: usize,
}

#[derive(Default)]
pub struct MockSubstrate {
    projects: HashMap<String, ProjectRecord>,
    workloads: Mutex<HashSet<String>>,
    created: Mutex<Vec<WorkloadSpec>>,
    accepted: Mutex<Vec<String>>,
    calls: Mutex<Calls>,
    fail_project_lookups: bool,
    conflict_on_create: bool,
    fail_accept: bool,
}

impl MockSubstrate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_project(mut self, project: ProjectRecord) -> Self {
        self.projects.insert(project.name().to_string(), project);
        self
    }

    pub fn with_existing_workload(self, name: &str) -> Self {
        self.workloads
            .lock()
            .unwrap()
            .insert(name.to_string());
        self
    }

    pub fn failing_project_lookups(mut self) -> Self {
        self.fail_project_lookups = true;
        self
    }

    pub fn conflicting_creates(mut self) -> Self {
        self.conflict_on_create = true;
        self
    }

    pub fn failing_accept(mut self) -> Self {
        self.fail_accept = true;
        self
    }

    pub fn calls(&self) -> Calls {
        *self.calls.lock().unwrap()
    }

    pub fn created(&self) -> Vec<WorkloadSpec> {
        self.created.lock().unwrap().clone()
    }

    pub fn accepted(&self) -> Vec<String> {
        self.accepted.lock().unwrap().clone()
    }
}

#[async_trait]
impl Substrate for MockSubstrate {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn get_project(&self, _namespace: &str, id: &str) -> Result<Option<ProjectRecord>> {
        self.calls.lock().unwrap().get_project += 1;
        if self.fail_project_lookups {
            return Err(Error::Substrate("connection refused".to_string()));
        }
        Ok(self.projects.get(id).cloned())
    }

    async fn workload_exists(&self, _namespace: &str, name: &str) -> Result<bool> {
        self.calls.lock().unwrap().workload_exists += 1;
        Ok(self.workloads.lock().unwrap().contains(name))
    }

    async fn create_workload(&self, spec: &WorkloadSpec) -> Result<()> {
        self.calls.lock().unwrap().create_workload += 1;
        if self.conflict_on_create {
            return Err(Error::AlreadyExists(spec.name.clone()));
        }
        self.workloads.lock().unwrap().insert(spec.name.clone());
        self.created.lock().unwrap().push(spec.clone());
        Ok(())
    }

    async fn mark_accepted(&self, build: &BuildRecord) -> Result<()> {
        self.calls.lock().unwrap().mark_accepted += 1;
        if self.fail_accept {
            return Err(Error::Substrate("patch rejected".to_string()));
        }
        self.accepted.lock().unwrap().push(build.name().to_string());
        Ok(())
    }
}

/// Counts reported errors.
#[derive(Debug, Default)]
pub struct CountingSink {
    reported: AtomicUsize,
}

impl CountingSink {
    pub fn count(&self) -> usize {
        self.reported.load(Ordering::SeqCst)
    }
}

impl ErrorSink for CountingSink {
    fn report(&self, _key: &RecordKey, _error: &Error) {
        self.reported.fetch_add(1, Ordering::SeqCst);
    }
}
