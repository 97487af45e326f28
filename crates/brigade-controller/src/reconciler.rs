//! Per-key reconciliation.

use brigade_config::ControllerConfig;
use brigade_core::{Error, RecordKey, Result, Substrate};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::builder::build_workload;
use crate::cache::BuildCache;

/// What a successful sync did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The build is gone from the cache; nothing to do.
    Stale,
    /// A workload for the build already exists.
    AlreadyExists,
    /// The workload was created.
    Created,
}

/// Turns a queued build key into a workload, or into nothing if one exists.
pub struct Reconciler {
    cache: BuildCache,
    substrate: Arc<dyn Substrate>,
    config: Arc<ControllerConfig>,
}

impl Reconciler {
    pub fn new(
        cache: BuildCache,
        substrate: Arc<dyn Substrate>,
        config: Arc<ControllerConfig>,
    ) -> Self {
        Self {
            cache,
            substrate,
            config,
        }
    }

    pub async fn sync(&self, key: &RecordKey) -> Result<SyncOutcome> {
        let Some(build) = self.cache.get(key) else {
            info!(build = %key, "Build no longer exists, skipping");
            return Ok(SyncOutcome::Stale);
        };

        let project_id = build
            .project_id()
            .ok_or_else(|| Error::MissingProjectReference(key.to_string()))?;

        let project = self
            .substrate
            .get_project(build.namespace(), project_id)
            .await?
            .ok_or_else(|| Error::ProjectNotFound(project_id.to_string()))?;

        if self
            .substrate
            .workload_exists(build.namespace(), build.name())
            .await?
        {
            debug!(build = %key, "Workload already exists");
            return Ok(SyncOutcome::AlreadyExists);
        }

        let spec = build_workload(&build, &project, &self.config);
        match self.substrate.create_workload(&spec).await {
            Ok(()) => {}
            Err(e) if e.is_already_exists() => {
                debug!(build = %key, "Workload created concurrently");
                return Ok(SyncOutcome::AlreadyExists);
            }
            Err(e) => return Err(e),
        }
        info!(
            build = %key,
            project = %project_id,
            event = build.event_type().unwrap_or_default(),
            provider = build.event_provider().unwrap_or_default(),
            image = %spec.worker.image,
            sidecar = spec.sidecar.is_some(),
            "Created build workload"
        );

        // Not atomic with the create above; a failure here is only logged.
        if let Err(e) = self.substrate.mark_accepted(&build).await {
            warn!(build = %key, error = %e, "Failed to mark build accepted");
        }

        Ok(SyncOutcome::Created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockSubstrate, build_record, project_record, seeded_cache};
    use brigade_core::record::project_keys;

    fn reconciler(cache: BuildCache, substrate: Arc<MockSubstrate>) -> Reconciler {
        Reconciler::new(cache, substrate, Arc::new(ControllerConfig::default()))
    }

    #[tokio::test]
    async fn test_stale_key_is_success() {
        let substrate = Arc::new(MockSubstrate::new());
        let r = reconciler(BuildCache::new(), substrate.clone());

        let outcome = r.sync(&RecordKey::new("default", "gone")).await.unwrap();
        assert_eq!(outcome, SyncOutcome::Stale);
        assert_eq!(substrate.calls().get_project, 0);
    }

    #[tokio::test]
    async fn test_missing_project_reference_never_creates() {
        let substrate = Arc::new(MockSubstrate::new());
        let cache = seeded_cache(vec![build_record("b1", None)]);
        let r = reconciler(cache, substrate.clone());

        let err = r.sync(&RecordKey::new("default", "b1")).await.unwrap_err();
        assert!(matches!(err, Error::MissingProjectReference(_)));
        assert_eq!(substrate.calls().create_workload, 0);
        assert_eq!(substrate.calls().get_project, 0);
    }

    #[tokio::test]
    async fn test_project_not_found() {
        let substrate = Arc::new(MockSubstrate::new());
        let cache = seeded_cache(vec![build_record("b1", Some("brigade-missing"))]);
        let r = reconciler(cache, substrate.clone());

        let err = r.sync(&RecordKey::new("default", "b1")).await.unwrap_err();
        assert!(matches!(err, Error::ProjectNotFound(id) if id == "brigade-missing"));
        assert_eq!(substrate.calls().create_workload, 0);
    }

    #[tokio::test]
    async fn test_substrate_error_propagates() {
        let substrate = Arc::new(MockSubstrate::new().failing_project_lookups());
        let cache = seeded_cache(vec![build_record("b1", Some("brigade-1234"))]);
        let r = reconciler(cache, substrate.clone());

        let err = r.sync(&RecordKey::new("default", "b1")).await.unwrap_err();
        assert!(matches!(err, Error::Substrate(_)));
    }

    #[tokio::test]
    async fn test_creates_workload_and_marks_accepted() {
        let substrate = Arc::new(MockSubstrate::new().with_project(project_record(
            "brigade-1234",
            &[(project_keys::VCS_SIDECAR, "deis/git-sidecar:latest")],
        )));
        let cache = seeded_cache(vec![build_record("b1", Some("brigade-1234"))]);
        let r = reconciler(cache, substrate.clone());

        let outcome = r.sync(&RecordKey::new("default", "b1")).await.unwrap();
        assert_eq!(outcome, SyncOutcome::Created);

        let created = substrate.created();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].name, "b1");
        assert!(created[0].sidecar.is_some());
        assert_eq!(substrate.accepted(), vec!["b1".to_string()]);
    }

    #[tokio::test]
    async fn test_second_sync_is_noop() {
        let substrate =
            Arc::new(MockSubstrate::new().with_project(project_record("brigade-1234", &[])));
        let cache = seeded_cache(vec![build_record("b1", Some("brigade-1234"))]);
        let r = reconciler(cache, substrate.clone());
        let key = RecordKey::new("default", "b1");

        assert_eq!(r.sync(&key).await.unwrap(), SyncOutcome::Created);
        assert_eq!(r.sync(&key).await.unwrap(), SyncOutcome::AlreadyExists);
        assert_eq!(substrate.calls().create_workload, 1);
    }

    #[tokio::test]
    async fn test_existing_workload_short_circuits() {
        let substrate = Arc::new(
            MockSubstrate::new()
                .with_project(project_record("brigade-1234", &[]))
                .with_existing_workload("b1"),
        );
        let cache = seeded_cache(vec![build_record("b1", Some("brigade-1234"))]);
        let r = reconciler(cache, substrate.clone());
        let key = RecordKey::new("default", "b1");

        assert_eq!(r.sync(&key).await.unwrap(), SyncOutcome::AlreadyExists);
        assert_eq!(r.sync(&key).await.unwrap(), SyncOutcome::AlreadyExists);
        let calls = substrate.calls();
        assert_eq!(calls.workload_exists, 2);
        assert_eq!(calls.create_workload, 0);
        assert_eq!(calls.mark_accepted, 0);
    }

    #[tokio::test]
    async fn test_create_conflict_treated_as_existing() {
        let substrate = Arc::new(
            MockSubstrate::new()
                .with_project(project_record("brigade-1234", &[]))
                .conflicting_creates(),
        );
        let cache = seeded_cache(vec![build_record("b1", Some("brigade-1234"))]);
        let r = reconciler(cache, substrate.clone());

        let outcome = r.sync(&RecordKey::new("default", "b1")).await.unwrap();
        assert_eq!(outcome, SyncOutcome::AlreadyExists);
        assert!(substrate.accepted().is_empty());
    }

    #[tokio::test]
    async fn test_accept_marker_failure_is_not_an_error() {
        let substrate = Arc::new(
            MockSubstrate::new()
                .with_project(project_record("brigade-1234", &[]))
                .failing_accept(),
        );
        let cache = seeded_cache(vec![build_record("b1", Some("brigade-1234"))]);
        let r = reconciler(cache, substrate.clone());

        let outcome = r.sync(&RecordKey::new("default", "b1")).await.unwrap();
        assert_eq!(outcome, SyncOutcome::Created);
        assert_eq!(substrate.created().len(), 1);
    }
}
