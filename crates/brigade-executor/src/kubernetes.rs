//! Kubernetes substrate implementation.

use async_trait::async_trait;
use brigade_core::record::{RecordData, labels};
use brigade_core::{
    BuildRecord, Error, ProjectRecord, RecordMeta, Result, Substrate, WorkloadSpec,
};
use k8s_openapi::api::core::v1::{Pod, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Client;
use kube::api::{Api, Patch, PatchParams, PostParams};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::debug;

use crate::pod::workload_to_pod;

/// Substrate backed by a Kubernetes cluster.
pub struct KubernetesSubstrate {
    client: Client,
}

impl KubernetesSubstrate {
    /// Connect using the ambient kubeconfig or in-cluster service account.
    pub async fn new() -> Result<Self> {
        let client = Client::try_default()
            .await
            .map_err(|e| Error::Substrate(e.to_string()))?;
        Ok(Self { client })
    }

    /// The underlying client, shared with the build watch.
    pub fn client(&self) -> &Client {
        &self.client
    }

    fn secrets(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Map a client error, keeping creation conflicts distinguishable.
fn substrate_error(err: kube::Error) -> Error {
    match err {
        kube::Error::Api(resp) if resp.code == 409 => Error::AlreadyExists(resp.message),
        other => Error::Substrate(other.to_string()),
    }
}

#[async_trait]
impl Substrate for KubernetesSubstrate {
    fn name(&self) -> &'static str {
        "kubernetes"
    }

    async fn get_project(&self, namespace: &str, id: &str) -> Result<Option<ProjectRecord>> {
        let secret = self
            .secrets(namespace)
            .get_opt(id)
            .await
            .map_err(substrate_error)?;
        Ok(secret.as_ref().map(project_record_from_secret))
    }

    async fn workload_exists(&self, namespace: &str, name: &str) -> Result<bool> {
        let pod = self
            .pods(namespace)
            .get_opt(name)
            .await
            .map_err(substrate_error)?;
        Ok(pod.is_some())
    }

    async fn create_workload(&self, spec: &WorkloadSpec) -> Result<()> {
        let pod = workload_to_pod(spec);
        self.pods(&spec.namespace)
            .create(&PostParams::default(), &pod)
            .await
            .map_err(substrate_error)?;
        debug!(namespace = %spec.namespace, pod = %spec.name, "Created pod");
        Ok(())
    }

    async fn mark_accepted(&self, build: &BuildRecord) -> Result<()> {
        let accepted = BTreeMap::from([(labels::STATUS, labels::STATUS_ACCEPTED)]);
        let patch = json!({ "metadata": { "labels": accepted } });
        self.secrets(build.namespace())
            .patch(build.name(), &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(substrate_error)?;
        Ok(())
    }
}

fn record_meta(meta: &ObjectMeta) -> RecordMeta {
    let mut record = RecordMeta::new(
        meta.namespace.clone().unwrap_or_default(),
        meta.name.clone().unwrap_or_default(),
    );
    if let Some(uid) = &meta.uid {
        record = record.with_uid(uid.clone());
    }
    for (key, value) in meta.labels.iter().flatten() {
        record = record.with_label(key.clone(), value.clone());
    }
    record
}

fn record_data(secret: &Secret) -> RecordData {
    secret
        .data
        .iter()
        .flatten()
        .map(|(key, value)| (key.clone(), value.0.clone()))
        .collect()
}

/// Read a build record out of its Secret.
pub fn build_record_from_secret(secret: &Secret) -> BuildRecord {
    BuildRecord::new(record_meta(&secret.metadata), record_data(secret))
}

/// Read a project record out of its Secret.
pub fn project_record_from_secret(secret: &Secret) -> ProjectRecord {
    ProjectRecord::new(record_meta(&secret.metadata), record_data(secret))
}
