//! Workload specification.
//!
//! A [`WorkloadSpec`] is the substrate-neutral description of the unit that
//! runs one build: a primary worker container, an optional sidecar that
//! prepares the source tree, and the scheduling constraints around them.
//! Backends render it into their own object model.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Specification for the workload that runs one build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadSpec {
    /// Workload name; always the build record's name.
    pub name: String,
    pub namespace: String,
    pub labels: BTreeMap<String, String>,
    /// The build record that owns this workload.
    pub owner: Option<OwnerRef>,
    /// Primary worker container.
    pub worker: ContainerSpec,
    /// Init container run to completion before the worker starts.
    pub sidecar: Option<ContainerSpec>,
    pub volumes: Vec<Volume>,
    pub node_selector: BTreeMap<String, String>,
    pub node_affinity: Option<NodeAffinity>,
    pub service_account: String,
    pub restart_policy: RestartPolicy,
    /// `None` means "not configured", which is distinct from an empty list.
    pub image_pull_secrets: Option<Vec<String>>,
}

impl WorkloadSpec {
    /// Every container in start order.
    pub fn containers(&self) -> impl Iterator<Item = &ContainerSpec> {
        self.sidecar.iter().chain(std::iter::once(&self.worker))
    }
}

/// Reference from a workload to the record that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerRef {
    pub name: String,
    pub uid: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub pull_policy: String,
    /// Empty means "use the image entrypoint".
    pub command: Vec<String>,
    pub env: Vec<EnvVar>,
    pub volume_mounts: Vec<VolumeMount>,
    pub resources: Option<ResourceRequirements>,
}

impl ContainerSpec {
    pub fn env_var(&self, name: &str) -> Option<&EnvVar> {
        self.env.iter().find(|e| e.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    pub source: EnvSource,
}

impl EnvVar {
    pub fn literal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: EnvSource::Literal(value.into()),
        }
    }

    pub fn record_key(
        name: impl Into<String>,
        record: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source: EnvSource::RecordKey {
                record: record.into(),
                key: key.into(),
            },
        }
    }

    pub fn field_path(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: EnvSource::FieldPath(path.into()),
        }
    }
}

/// Where an environment variable gets its value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnvSource {
    /// A fixed value.
    Literal(String),
    /// Read at start time from a key of a record in the same namespace.
    RecordKey { record: String, key: String },
    /// Read from the workload's own metadata (e.g. `metadata.namespace`).
    FieldPath(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    pub name: String,
    pub source: VolumeSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VolumeSource {
    /// Projects the named record's data as files.
    Record(String),
    /// Empty scratch space that lives as long as the workload.
    Scratch,
}

/// A volume mount specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMount {
    /// Name of the volume.
    pub name: String,
    /// Path to mount in the container.
    pub mount_path: String,
    /// Whether the mount is read-only.
    pub read_only: bool,
}

/// Resource requirements for a container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequirements {
    /// CPU limit (e.g., "1000m" for 1 core).
    pub cpu_limit: Option<String>,
    /// Memory limit (e.g., "512Mi").
    pub memory_limit: Option<String>,
    /// CPU request.
    pub cpu_request: Option<String>,
    /// Memory request.
    pub memory_request: Option<String>,
}

impl ResourceRequirements {
    pub fn is_empty(&self) -> bool {
        self.cpu_limit.is_none()
            && self.memory_limit.is_none()
            && self.cpu_request.is_none()
            && self.memory_request.is_none()
    }
}

/// Required node affinity: schedule only where `key` has one of `values`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAffinity {
    pub key: String,
    pub values: Vec<String>,
}

/// Build workloads run once; a failed build is never restarted in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RestartPolicy {
    Never,
}

impl RestartPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RestartPolicy::Never => "Never",
        }
    }
}
