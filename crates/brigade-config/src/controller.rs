//! Controller configuration parsing.

use crate::{ConfigError, ConfigResult};
use kdl::{KdlDocument, KdlNode};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_NAMESPACE: &str = "default";
pub const DEFAULT_WORKER_IMAGE: &str = "deis/brigade-worker:latest";
pub const DEFAULT_PULL_POLICY: &str = "IfNotPresent";
pub const DEFAULT_SERVICE_ACCOUNT: &str = "brigade-worker";

const PULL_POLICIES: [&str; 3] = ["Always", "IfNotPresent", "Never"];

/// Controller-wide configuration.
///
/// Empty strings mean "not configured" for the optional settings (resource
/// quantities, node pool, service-account regex).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Namespace watched for build records.
    pub namespace: String,
    /// Number of concurrent reconcile workers.
    pub workers: usize,
    /// Default worker image, `registry/name:tag`.
    pub worker_image: String,
    pub worker_pull_policy: String,
    /// Account the worker workload runs as.
    pub worker_service_account: String,
    /// Account handed to the worker for the jobs it spawns.
    pub project_service_account: String,
    /// Pattern the worker uses to validate project-chosen accounts.
    pub project_service_account_regex: String,
    pub worker_requests_cpu: String,
    pub worker_requests_memory: String,
    pub worker_limits_cpu: String,
    pub worker_limits_memory: String,
    /// Node label key for pinning workers to a node pool.
    pub node_pool_key: String,
    pub node_pool_value: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            workers: 1,
            worker_image: DEFAULT_WORKER_IMAGE.to_string(),
            worker_pull_policy: DEFAULT_PULL_POLICY.to_string(),
            worker_service_account: DEFAULT_SERVICE_ACCOUNT.to_string(),
            project_service_account: DEFAULT_SERVICE_ACCOUNT.to_string(),
            project_service_account_regex: String::new(),
            worker_requests_cpu: String::new(),
            worker_requests_memory: String::new(),
            worker_limits_cpu: String::new(),
            worker_limits_memory: String::new(),
            node_pool_key: String::new(),
            node_pool_value: String::new(),
        }
    }
}

impl ControllerConfig {
    /// Check the configuration for values the controller cannot work with.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.namespace.is_empty() {
            return Err(ConfigError::MissingField("namespace".to_string()));
        }
        if self.workers == 0 {
            return Err(ConfigError::InvalidValue {
                field: "workers".to_string(),
                message: "at least one worker is required".to_string(),
            });
        }
        if self.worker_image.trim().is_empty() {
            return Err(ConfigError::MissingField("worker image".to_string()));
        }
        if !PULL_POLICIES.contains(&self.worker_pull_policy.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "worker pull-policy".to_string(),
                message: format!(
                    "expected one of {}, got '{}'",
                    PULL_POLICIES.join(", "),
                    self.worker_pull_policy
                ),
            });
        }
        if !self.project_service_account_regex.is_empty() {
            Regex::new(&self.project_service_account_regex).map_err(|e| {
                ConfigError::InvalidValue {
                    field: "project service-account-regex".to_string(),
                    message: e.to_string(),
                }
            })?;
        }
        Ok(())
    }

    /// The node pool to pin workers to, only when both halves are set.
    pub fn node_pool(&self) -> Option<(&str, &str)> {
        if self.node_pool_key.is_empty() || self.node_pool_value.is_empty() {
            None
        } else {
            Some((&self.node_pool_key, &self.node_pool_value))
        }
    }
}

/// Load and validate controller configuration from a KDL file.
pub fn load_controller_config(path: impl AsRef<Path>) -> ConfigResult<ControllerConfig> {
    let text = std::fs::read_to_string(path)?;
    parse_controller_config(&text)
}

/// Parse controller configuration from KDL text, starting from defaults.
pub fn parse_controller_config(kdl: &str) -> ConfigResult<ControllerConfig> {
    let doc: KdlDocument = kdl.parse()?;
    let mut config = ControllerConfig::default();

    for node in doc.nodes() {
        match node.name().value() {
            "namespace" => {
                config.namespace = get_first_string_arg(node)
                    .ok_or_else(|| ConfigError::MissingField("namespace".to_string()))?;
            }
            "workers" => {
                config.workers = get_first_usize_arg(node, "workers")?;
            }
            "worker" => parse_worker(node, &mut config),
            "project" => parse_project(node, &mut config),
            "node-pool" => {
                config.node_pool_key = get_string_prop(node, "key").unwrap_or_default();
                config.node_pool_value = get_string_prop(node, "value").unwrap_or_default();
            }
            _ => {} // Ignore unknown nodes
        }
    }

    config.validate()?;
    Ok(config)
}

fn parse_worker(node: &KdlNode, config: &mut ControllerConfig) {
    let Some(children) = node.children() else {
        return;
    };
    for child in children.nodes() {
        match child.name().value() {
            "image" => {
                if let Some(image) = get_first_string_arg(child) {
                    config.worker_image = image;
                }
            }
            "pull-policy" => {
                if let Some(policy) = get_first_string_arg(child) {
                    config.worker_pull_policy = policy;
                }
            }
            "service-account" => {
                if let Some(account) = get_first_string_arg(child) {
                    config.worker_service_account = account;
                }
            }
            "requests" => {
                config.worker_requests_cpu = get_string_prop(child, "cpu").unwrap_or_default();
                config.worker_requests_memory =
                    get_string_prop(child, "memory").unwrap_or_default();
            }
            "limits" => {
                config.worker_limits_cpu = get_string_prop(child, "cpu").unwrap_or_default();
                config.worker_limits_memory = get_string_prop(child, "memory").unwrap_or_default();
            }
            _ => {}
        }
    }
}

fn parse_project(node: &KdlNode, config: &mut ControllerConfig) {
    let Some(children) = node.children() else {
        return;
    };
    for child in children.nodes() {
        match child.name().value() {
            "service-account" => {
                if let Some(account) = get_first_string_arg(child) {
                    config.project_service_account = account;
                }
            }
            "service-account-regex" => {
                config.project_service_account_regex =
                    get_first_string_arg(child).unwrap_or_default();
            }
            _ => {}
        }
    }
}

// Helper functions for extracting values from KDL nodes

fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn get_first_usize_arg(node: &KdlNode, field: &str) -> ConfigResult<usize> {
    let value = node
        .entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_integer())
        .ok_or_else(|| ConfigError::MissingField(field.to_string()))?;
    usize::try_from(value).map_err(|_| ConfigError::InvalidValue {
        field: field.to_string(),
        message: format!("{} is out of range", value),
    })
}

fn get_string_prop(node: &KdlNode, name: &str) -> Option<String> {
    node.get(name)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ControllerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.worker_image, "deis/brigade-worker:latest");
        assert_eq!(config.workers, 1);
        assert!(config.node_pool().is_none());
    }

    #[test]
    fn test_parse_empty_document_gives_defaults() {
        let config = parse_controller_config("").unwrap();
        assert_eq!(config, ControllerConfig::default());
    }

    #[test]
    fn test_parse_full_config() {
        let kdl = r#"
            namespace "brigade"
            workers 4

            worker {
                image "myrepo/brigade-worker:canary"
                pull-policy "Always"
                service-account "brigade-runner"
                requests cpu="100m" memory="128Mi"
                limits cpu="1" memory="1Gi"
            }

            project {
                service-account "brigade-jobs"
                service-account-regex "^brigade-.*$"
            }

            node-pool key="agentpool" value="builds"
        "#;

        let config = parse_controller_config(kdl).unwrap();
        assert_eq!(config.namespace, "brigade");
        assert_eq!(config.workers, 4);
        assert_eq!(config.worker_image, "myrepo/brigade-worker:canary");
        assert_eq!(config.worker_pull_policy, "Always");
        assert_eq!(config.worker_service_account, "brigade-runner");
        assert_eq!(config.worker_requests_cpu, "100m");
        assert_eq!(config.worker_requests_memory, "128Mi");
        assert_eq!(config.worker_limits_cpu, "1");
        assert_eq!(config.worker_limits_memory, "1Gi");
        assert_eq!(config.project_service_account, "brigade-jobs");
        assert_eq!(config.project_service_account_regex, "^brigade-.*$");
        assert_eq!(config.node_pool(), Some(("agentpool", "builds")));
    }

    #[test]
    fn test_half_configured_node_pool_is_ignored() {
        let config = parse_controller_config(r#"node-pool key="agentpool""#).unwrap();
        assert_eq!(config.node_pool_key, "agentpool");
        assert!(config.node_pool().is_none());
    }

    #[test]
    fn test_reject_zero_workers() {
        let result = parse_controller_config("workers 0");
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InvalidValue { field, .. } if field == "workers"
        ));
    }

    #[test]
    fn test_reject_unknown_pull_policy() {
        let kdl = r#"
            worker {
                pull-policy "Sometimes"
            }
        "#;
        assert!(matches!(
            parse_controller_config(kdl).unwrap_err(),
            ConfigError::InvalidValue { .. }
        ));
    }

    #[test]
    fn test_reject_bad_service_account_regex() {
        let kdl = r#"
            project {
                service-account-regex "brigade-(["
            }
        "#;
        assert!(matches!(
            parse_controller_config(kdl).unwrap_err(),
            ConfigError::InvalidValue { .. }
        ));
    }

    #[test]
    fn test_reject_malformed_kdl() {
        let result = parse_controller_config("worker {");
        assert!(matches!(result.unwrap_err(), ConfigError::Parse(_)));
    }
}
