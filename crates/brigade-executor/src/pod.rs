//! Rendering a [`WorkloadSpec`] as a Kubernetes Pod.

use brigade_core::WorkloadSpec;
use brigade_core::workload::{self, EnvSource, VolumeSource};
use k8s_openapi::api::core::v1::{
    Affinity, Container, EmptyDirVolumeSource, EnvVar, EnvVarSource, LocalObjectReference,
    NodeAffinity, NodeSelector, NodeSelectorRequirement, NodeSelectorTerm, ObjectFieldSelector,
    Pod, PodSpec, ResourceRequirements, SecretKeySelector, SecretVolumeSource, Volume,
    VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use std::collections::BTreeMap;

/// Build records are Secrets, so that is the owner kind.
const OWNER_API_VERSION: &str = "v1";
const OWNER_KIND: &str = "Secret";
const AFFINITY_OPERATOR: &str = "In";

/// Render `spec` as a Pod ready to be created.
///
/// The sidecar becomes the Pod's only init container.
pub fn workload_to_pod(spec: &WorkloadSpec) -> Pod {
    let owner_references = spec.owner.as_ref().map(|owner| {
        vec![OwnerReference {
            api_version: OWNER_API_VERSION.to_string(),
            kind: OWNER_KIND.to_string(),
            name: owner.name.clone(),
            uid: owner.uid.clone(),
            ..Default::default()
        }]
    });

    let image_pull_secrets = spec.image_pull_secrets.as_ref().map(|names| {
        names
            .iter()
            .map(|name| LocalObjectReference { name: name.clone() })
            .collect()
    });

    Pod {
        metadata: ObjectMeta {
            name: Some(spec.name.clone()),
            namespace: Some(spec.namespace.clone()),
            labels: Some(spec.labels.clone()),
            owner_references,
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers: vec![container(&spec.worker)],
            init_containers: spec.sidecar.as_ref().map(|sidecar| vec![container(sidecar)]),
            volumes: Some(spec.volumes.iter().map(volume).collect()),
            node_selector: Some(spec.node_selector.clone()),
            affinity: spec.node_affinity.as_ref().map(affinity),
            service_account_name: Some(spec.service_account.clone()),
            restart_policy: Some(spec.restart_policy.as_str().to_string()),
            image_pull_secrets,
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn container(spec: &workload::ContainerSpec) -> Container {
    let command = if spec.command.is_empty() {
        None
    } else {
        Some(spec.command.clone())
    };

    Container {
        name: spec.name.clone(),
        image: Some(spec.image.clone()),
        image_pull_policy: Some(spec.pull_policy.clone()),
        command,
        env: Some(spec.env.iter().map(env_var).collect()),
        volume_mounts: Some(spec.volume_mounts.iter().map(volume_mount).collect()),
        resources: spec.resources.as_ref().map(resource_requirements),
        ..Default::default()
    }
}

fn env_var(var: &workload::EnvVar) -> EnvVar {
    match &var.source {
        EnvSource::Literal(value) => EnvVar {
            name: var.name.clone(),
            value: Some(value.clone()),
            ..Default::default()
        },
        EnvSource::RecordKey { record, key } => EnvVar {
            name: var.name.clone(),
            value_from: Some(EnvVarSource {
                secret_key_ref: Some(SecretKeySelector {
                    name: record.clone(),
                    key: key.clone(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        },
        EnvSource::FieldPath(path) => EnvVar {
            name: var.name.clone(),
            value_from: Some(EnvVarSource {
                field_ref: Some(ObjectFieldSelector {
                    field_path: path.clone(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        },
    }
}

fn volume(spec: &workload::Volume) -> Volume {
    match &spec.source {
        VolumeSource::Record(record) => Volume {
            name: spec.name.clone(),
            secret: Some(SecretVolumeSource {
                secret_name: Some(record.clone()),
                ..Default::default()
            }),
            ..Default::default()
        },
        VolumeSource::Scratch => Volume {
            name: spec.name.clone(),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Default::default()
        },
    }
}

fn volume_mount(mount: &workload::VolumeMount) -> VolumeMount {
    VolumeMount {
        name: mount.name.clone(),
        mount_path: mount.mount_path.clone(),
        read_only: Some(mount.read_only),
        ..Default::default()
    }
}

fn resource_requirements(resources: &workload::ResourceRequirements) -> ResourceRequirements {
    fn quantities(
        cpu: &Option<String>,
        memory: &Option<String>,
    ) -> Option<BTreeMap<String, Quantity>> {
        let map: BTreeMap<_, _> = [("cpu", cpu), ("memory", memory)]
            .into_iter()
            .filter_map(|(name, q)| q.as_ref().map(|q| (name.to_string(), Quantity(q.clone()))))
            .collect();
        (!map.is_empty()).then_some(map)
    }

    ResourceRequirements {
        requests: quantities(&resources.cpu_request, &resources.memory_request),
        limits: quantities(&resources.cpu_limit, &resources.memory_limit),
        ..Default::default()
    }
}

fn affinity(spec: &workload::NodeAffinity) -> Affinity {
    Affinity {
        node_affinity: Some(NodeAffinity {
            required_during_scheduling_ignored_during_execution: Some(NodeSelector {
                node_selector_terms: vec![NodeSelectorTerm {
                    match_expressions: Some(vec![NodeSelectorRequirement {
                        key: spec.key.clone(),
                        operator: AFFINITY_OPERATOR.to_string(),
                        values: Some(spec.values.clone()),
                    }]),
                    ..Default::default()
                }],
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}
