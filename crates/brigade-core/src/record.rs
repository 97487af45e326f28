//! Build and project records.
//!
//! Both records are opaque string-to-bytes maps in the substrate. The types
//! here expose the fixed vocabulary of keys the controller reads; everything
//! else in the map is carried along untouched.

use bytes::Bytes;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Label keys carried by build and project records.
pub mod labels {
    pub const HERITAGE: &str = "heritage";
    pub const COMPONENT: &str = "component";
    pub const PROJECT: &str = "project";
    pub const BUILD: &str = "build";
    /// Written back onto a build once its workload has been created.
    pub const STATUS: &str = "status";

    pub const HERITAGE_BRIGADE: &str = "brigade";
    pub const COMPONENT_BUILD: &str = "build";
    pub const COMPONENT_PROJECT: &str = "project";
    pub const STATUS_ACCEPTED: &str = "accepted";
}

/// Data keys read from a build record.
pub mod build_keys {
    pub const SCRIPT: &str = "script";
    pub const EVENT_TYPE: &str = "event_type";
    pub const EVENT_PROVIDER: &str = "event_provider";
    pub const COMMIT: &str = "commit";
}

/// Data keys read from a project record.
pub mod project_keys {
    pub const VCS_SIDECAR: &str = "vcsSidecar";
    pub const IMAGE_PULL_SECRETS: &str = "imagePullSecrets";
    pub const DEFAULT_SCRIPT_NAME: &str = "defaultScriptName";
    pub const WORKER_COMMAND: &str = "workerCommand";
    pub const WORKER_REGISTRY: &str = "worker.registry";
    pub const WORKER_NAME: &str = "worker.name";
    pub const WORKER_TAG: &str = "worker.tag";
    pub const WORKER_PULL_POLICY: &str = "worker.pullPolicy";
    pub const SERVICE_ACCOUNT: &str = "serviceAccount";
    pub const SERVICE_ACCOUNT_REGEX: &str = "serviceAccountRegex";
    pub const CLONE_URL: &str = "cloneURL";
    pub const COMMIT: &str = "commit";
    pub const GITHUB_TOKEN: &str = "github.token";
    pub const SSH_KEY: &str = "sshKey";
}

/// Identifies one record within the substrate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[display("{namespace}/{name}")]
pub struct RecordKey {
    pub namespace: String,
    pub name: String,
}

impl RecordKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

/// Identity and labels shared by every record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMeta {
    pub name: String,
    pub namespace: String,
    /// Substrate-assigned unique id, if the record has been persisted.
    pub uid: Option<String>,
    pub labels: BTreeMap<String, String>,
}

impl RecordMeta {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = Some(uid.into());
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn key(&self) -> RecordKey {
        RecordKey::new(&self.namespace, &self.name)
    }

    /// Non-empty label value.
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels
            .get(key)
            .map(|v| v.as_str())
            .filter(|v| !v.is_empty())
    }
}

/// Opaque record payload keyed by string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordData(BTreeMap<String, Bytes>);

impl RecordData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Bytes>) {
        self.0.insert(key.into(), value.into());
    }

    /// Whether the key is present at all, even with an empty value.
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn raw(&self, key: &str) -> Option<&Bytes> {
        self.0.get(key)
    }

    /// UTF-8 value with surrounding whitespace removed; `None` when absent,
    /// blank or not valid UTF-8.
    pub fn text(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(|v| std::str::from_utf8(v).ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for RecordData
where
    K: Into<String>,
    V: Into<Bytes>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// A request to run one build, created upstream and observed read-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRecord {
    pub meta: RecordMeta,
    pub data: RecordData,
}

impl BuildRecord {
    pub fn new(meta: RecordMeta, data: RecordData) -> Self {
        Self { meta, data }
    }

    pub fn key(&self) -> RecordKey {
        self.meta.key()
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub fn namespace(&self) -> &str {
        &self.meta.namespace
    }

    /// The owning project's id, taken from the `project` label.
    pub fn project_id(&self) -> Option<&str> {
        self.meta.label(labels::PROJECT)
    }

    pub fn build_id(&self) -> Option<&str> {
        self.meta.label(labels::BUILD)
    }

    /// Whether the build carries its own non-empty script.
    pub fn has_inline_script(&self) -> bool {
        self.data
            .raw(build_keys::SCRIPT)
            .is_some_and(|script| !script.is_empty())
    }

    pub fn event_type(&self) -> Option<&str> {
        self.data.text(build_keys::EVENT_TYPE)
    }

    pub fn event_provider(&self) -> Option<&str> {
        self.data.text(build_keys::EVENT_PROVIDER)
    }

    pub fn commit(&self) -> Option<&str> {
        self.data.text(build_keys::COMMIT)
    }
}

/// A project's configuration. Fetched fresh for every reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectRecord {
    pub meta: RecordMeta,
    pub data: RecordData,
}

impl ProjectRecord {
    pub fn new(meta: RecordMeta, data: RecordData) -> Self {
        Self { meta, data }
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub fn vcs_sidecar(&self) -> Option<&str> {
        self.data.text(project_keys::VCS_SIDECAR)
    }

    /// Pull secret names from the comma-separated field. `None` when the
    /// field is not configured at all.
    pub fn image_pull_secrets(&self) -> Option<Vec<String>> {
        let raw = self.data.raw(project_keys::IMAGE_PULL_SECRETS)?;
        let raw = std::str::from_utf8(raw).ok()?;
        if raw.trim().is_empty() {
            return None;
        }
        Some(
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
        )
    }

    /// Whitespace-split worker command override.
    pub fn worker_command(&self) -> Option<Vec<String>> {
        self.data
            .text(project_keys::WORKER_COMMAND)
            .map(|cmd| cmd.split_whitespace().map(String::from).collect())
    }

    pub fn worker_registry(&self) -> Option<&str> {
        self.data.text(project_keys::WORKER_REGISTRY)
    }

    pub fn worker_name(&self) -> Option<&str> {
        self.data.text(project_keys::WORKER_NAME)
    }

    pub fn worker_tag(&self) -> Option<&str> {
        self.data.text(project_keys::WORKER_TAG)
    }

    pub fn worker_pull_policy(&self) -> Option<&str> {
        self.data.text(project_keys::WORKER_PULL_POLICY)
    }

    pub fn service_account(&self) -> Option<&str> {
        self.data.text(project_keys::SERVICE_ACCOUNT)
    }

    pub fn service_account_regex(&self) -> Option<&str> {
        self.data.text(project_keys::SERVICE_ACCOUNT_REGEX)
    }
}
