//! Kubernetes substrate for the Brigade build controller.
//!
//! Build and project records are Secrets; a build's workload is a Pod.
//! - `kubernetes`: the [`Substrate`](brigade_core::Substrate) implementation
//! - `pod`: rendering a workload spec into a Pod
//! - `watch`: the build Secret watch, as controller watch events

pub mod kubernetes;
pub mod pod;
pub mod watch;

pub use kubernetes::{KubernetesSubstrate, build_record_from_secret, project_record_from_secret};
pub use pod::workload_to_pod;
pub use watch::{BUILD_SECRET_SELECTOR, watch_builds, watch_event};
