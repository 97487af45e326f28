//! Workload derivation.
//!
//! [`build_workload`] turns a build, its project and the controller
//! configuration into the [`WorkloadSpec`] that runs the build. It performs
//! no I/O and the same inputs always produce the same spec.

use brigade_config::ControllerConfig;
use brigade_core::record::{RecordData, build_keys, labels, project_keys};
use brigade_core::workload::{
    ContainerSpec, EnvVar, NodeAffinity, OwnerRef, ResourceRequirements, RestartPolicy, Volume,
    VolumeMount, VolumeSource,
};
use brigade_core::{BuildRecord, ProjectRecord, WorkloadSpec};
use std::collections::BTreeMap;

use crate::image::resolve_worker_image;

pub const WORKER_CONTAINER: &str = "brigade-runner";
pub const SIDECAR_CONTAINER: &str = "vcs-sidecar";
pub const BUILD_VOLUME: &str = "brigade-build";
pub const BUILD_MOUNT_PATH: &str = "/etc/brigade";
pub const SIDECAR_VOLUME: &str = "vcs-sidecar";
pub const SIDECAR_MOUNT_PATH: &str = "/src";
pub const DEFAULT_WORKER_COMMAND: [&str; 3] = ["yarn", "-s", "start"];
pub const OS_SELECTOR_KEY: &str = "kubernetes.io/os";
pub const OS_LINUX: &str = "linux";
pub const NAMESPACE_FIELD_PATH: &str = "metadata.namespace";

/// Environment variable names set on the worker and sidecar.
pub mod env {
    pub const EVENT_TYPE: &str = "BRIGADE_EVENT_TYPE";
    pub const EVENT_PROVIDER: &str = "BRIGADE_EVENT_PROVIDER";
    pub const COMMIT: &str = "BRIGADE_COMMIT";
    pub const PROJECT_ID: &str = "BRIGADE_PROJECT_ID";
    pub const BUILD_ID: &str = "BRIGADE_BUILD_ID";
    pub const BUILD_NAME: &str = "BRIGADE_BUILD_NAME";
    pub const PROJECT_NAMESPACE: &str = "BRIGADE_PROJECT_NAMESPACE";
    pub const REMOTE_URL: &str = "BRIGADE_REMOTE_URL";
    pub const WORKSPACE: &str = "BRIGADE_WORKSPACE";
    pub const DEFAULT_SCRIPT_NAME: &str = "BRIGADE_DEFAULT_SCRIPT_NAME";
    pub const SERVICE_ACCOUNT: &str = "BRIGADE_SERVICE_ACCOUNT";
    pub const SERVICE_ACCOUNT_REGEX: &str = "BRIGADE_SERVICE_ACCOUNT_REGEX";
    pub const REPO_AUTH_TOKEN: &str = "BRIGADE_REPO_AUTH_TOKEN";
    pub const REPO_KEY: &str = "BRIGADE_REPO_KEY";
}

/// Derive the workload for a build.
pub fn build_workload(
    build: &BuildRecord,
    project: &ProjectRecord,
    config: &ControllerConfig,
) -> WorkloadSpec {
    let resources = resource_requirements(config);

    let sidecar = match project.vcs_sidecar() {
        Some(image) if !build.has_inline_script() => {
            Some(sidecar_container(image, build, project, config, &resources))
        }
        _ => None,
    };

    let worker = worker_container(build, project, config, sidecar.is_some(), &resources);

    let mut volumes = vec![Volume {
        name: BUILD_VOLUME.to_string(),
        source: VolumeSource::Record(build.name().to_string()),
    }];
    if sidecar.is_some() {
        volumes.push(Volume {
            name: SIDECAR_VOLUME.to_string(),
            source: VolumeSource::Scratch,
        });
    }

    let node_affinity = config.node_pool().map(|(key, value)| NodeAffinity {
        key: key.to_string(),
        values: vec![value.to_string()],
    });

    let owner = build.meta.uid.as_ref().map(|uid| OwnerRef {
        name: build.name().to_string(),
        uid: uid.clone(),
    });

    WorkloadSpec {
        name: build.name().to_string(),
        namespace: build.namespace().to_string(),
        labels: workload_labels(build, project),
        owner,
        worker,
        sidecar,
        volumes,
        node_selector: BTreeMap::from([(OS_SELECTOR_KEY.to_string(), OS_LINUX.to_string())]),
        node_affinity,
        service_account: config.worker_service_account.clone(),
        restart_policy: RestartPolicy::Never,
        image_pull_secrets: project.image_pull_secrets(),
    }
}

fn workload_labels(build: &BuildRecord, project: &ProjectRecord) -> BTreeMap<String, String> {
    BTreeMap::from([
        (labels::HERITAGE.to_string(), labels::HERITAGE_BRIGADE.to_string()),
        (labels::COMPONENT.to_string(), labels::COMPONENT_BUILD.to_string()),
        (labels::PROJECT.to_string(), project.name().to_string()),
        (
            labels::BUILD.to_string(),
            build.build_id().unwrap_or_default().to_string(),
        ),
    ])
}

fn worker_container(
    build: &BuildRecord,
    project: &ProjectRecord,
    config: &ControllerConfig,
    with_sidecar: bool,
    resources: &Option<ResourceRequirements>,
) -> ContainerSpec {
    let command = project.worker_command().unwrap_or_else(|| {
        DEFAULT_WORKER_COMMAND
            .iter()
            .map(|s| s.to_string())
            .collect()
    });

    let pull_policy = project
        .worker_pull_policy()
        .unwrap_or(&config.worker_pull_policy)
        .to_string();

    let service_account = project
        .service_account()
        .unwrap_or(&config.project_service_account);
    let service_account_regex = project
        .service_account_regex()
        .or_else(|| Some(config.project_service_account_regex.as_str()).filter(|r| !r.is_empty()))
        .unwrap_or(&config.project_service_account);

    // The checkout only exists when the sidecar mounts it.
    let workspace = if with_sidecar { SIDECAR_MOUNT_PATH } else { "" };

    let env = vec![
        bind(env::EVENT_TYPE, build.name(), &build.data, build_keys::EVENT_TYPE),
        bind(env::EVENT_PROVIDER, build.name(), &build.data, build_keys::EVENT_PROVIDER),
        bind(env::COMMIT, build.name(), &build.data, build_keys::COMMIT),
        EnvVar::literal(env::PROJECT_ID, project.name()),
        EnvVar::literal(env::BUILD_ID, build.build_id().unwrap_or_default()),
        EnvVar::literal(env::BUILD_NAME, build.name()),
        EnvVar::field_path(env::PROJECT_NAMESPACE, NAMESPACE_FIELD_PATH),
        bind(env::REMOTE_URL, project.name(), &project.data, project_keys::CLONE_URL),
        EnvVar::literal(env::WORKSPACE, workspace),
        bind(
            env::DEFAULT_SCRIPT_NAME,
            project.name(),
            &project.data,
            project_keys::DEFAULT_SCRIPT_NAME,
        ),
        EnvVar::literal(env::SERVICE_ACCOUNT, service_account),
        EnvVar::literal(env::SERVICE_ACCOUNT_REGEX, service_account_regex),
    ];

    let mut volume_mounts = vec![VolumeMount {
        name: BUILD_VOLUME.to_string(),
        mount_path: BUILD_MOUNT_PATH.to_string(),
        read_only: true,
    }];
    if with_sidecar {
        volume_mounts.push(VolumeMount {
            name: SIDECAR_VOLUME.to_string(),
            mount_path: SIDECAR_MOUNT_PATH.to_string(),
            read_only: true,
        });
    }

    ContainerSpec {
        name: WORKER_CONTAINER.to_string(),
        image: resolve_worker_image(&config.worker_image, project),
        pull_policy,
        command,
        env,
        volume_mounts,
        resources: resources.clone(),
    }
}

fn sidecar_container(
    image: &str,
    build: &BuildRecord,
    project: &ProjectRecord,
    config: &ControllerConfig,
    resources: &Option<ResourceRequirements>,
) -> ContainerSpec {
    // The build's own revision wins over the project's default one.
    let commit = if build.commit().is_some() {
        EnvVar::record_key(env::COMMIT, build.name(), build_keys::COMMIT)
    } else {
        bind(env::COMMIT, project.name(), &project.data, project_keys::COMMIT)
    };

    let env = vec![
        EnvVar::literal(env::WORKSPACE, SIDECAR_MOUNT_PATH),
        bind(env::REMOTE_URL, project.name(), &project.data, project_keys::CLONE_URL),
        commit,
        bind(
            env::REPO_AUTH_TOKEN,
            project.name(),
            &project.data,
            project_keys::GITHUB_TOKEN,
        ),
        bind(env::REPO_KEY, project.name(), &project.data, project_keys::SSH_KEY),
    ];

    ContainerSpec {
        name: SIDECAR_CONTAINER.to_string(),
        image: image.to_string(),
        pull_policy: config.worker_pull_policy.clone(),
        command: Vec::new(),
        env,
        volume_mounts: vec![VolumeMount {
            name: SIDECAR_VOLUME.to_string(),
            mount_path: SIDECAR_MOUNT_PATH.to_string(),
            read_only: false,
        }],
        resources: resources.clone(),
    }
}

/// Bind `name` to `key` of the named record, or to an empty literal when the
/// record has no such key. The variable is never omitted.
fn bind(name: &str, record: &str, data: &RecordData, key: &str) -> EnvVar {
    if data.contains(key) {
        EnvVar::record_key(name, record, key)
    } else {
        EnvVar::literal(name, "")
    }
}

fn resource_requirements(config: &ControllerConfig) -> Option<ResourceRequirements> {
    let quantity = |q: &str| Some(q.to_string()).filter(|q| !q.is_empty());
    let resources = ResourceRequirements {
        cpu_limit: quantity(&config.worker_limits_cpu),
        memory_limit: quantity(&config.worker_limits_memory),
        cpu_request: quantity(&config.worker_requests_cpu),
        memory_request: quantity(&config.worker_requests_memory),
    };
    (!resources.is_empty()).then_some(resources)
}
