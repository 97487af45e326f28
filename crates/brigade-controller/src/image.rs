//! Worker image resolution.

use brigade_core::ProjectRecord;
use std::fmt;

const DEFAULT_TAG: &str = "latest";

/// A container image split into registry, name, tag and digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    /// Everything before the last `/`, e.g. `deis` or `quay.io/deis`.
    pub registry: Option<String>,
    pub name: String,
    pub tag: Option<String>,
    /// Content digest such as `sha256:...`, without the `@`.
    pub digest: Option<String>,
}

impl ImageRef {
    /// Split an image string. An image with neither tag nor digest gets
    /// the `latest` tag.
    ///
    /// The `@digest` suffix is split off first. After that a `:` only
    /// separates the tag when nothing after it contains `/`, so registry
    /// ports (`localhost:5000/worker`) are left alone.
    pub fn parse(image: &str) -> Self {
        let image = image.trim();
        let (image, digest) = match image.split_once('@') {
            Some((image, digest)) if !digest.is_empty() => (image, Some(digest.to_string())),
            Some((image, _)) => (image, None),
            None => (image, None),
        };
        let (path, tag) = match image.rfind(':') {
            Some(idx) if !image[idx + 1..].contains('/') => (&image[..idx], &image[idx + 1..]),
            _ => (image, ""),
        };
        let (registry, name) = match path.rfind('/') {
            Some(idx) => (Some(path[..idx].to_string()), &path[idx + 1..]),
            None => (None, path),
        };
        let tag = match (tag.is_empty(), &digest) {
            (false, _) => Some(tag.to_string()),
            (true, None) => Some(DEFAULT_TAG.to_string()),
            (true, Some(_)) => None,
        };
        Self {
            registry: registry.filter(|r| !r.is_empty()),
            name: name.to_string(),
            tag,
            digest,
        }
    }

    /// Apply any subset of overrides, keeping the other components.
    ///
    /// A digest pins one exact image, so any override drops it. An image
    /// left with neither tag nor digest falls back to `latest`.
    pub fn with_overrides(
        mut self,
        registry: Option<&str>,
        name: Option<&str>,
        tag: Option<&str>,
    ) -> Self {
        if registry.is_some() || name.is_some() || tag.is_some() {
            self.digest = None;
        }
        if let Some(registry) = registry {
            self.registry = Some(registry.to_string());
        }
        if let Some(name) = name {
            self.name = name.to_string();
        }
        if let Some(tag) = tag {
            self.tag = Some(tag.to_string());
        }
        if self.tag.is_none() && self.digest.is_none() {
            self.tag = Some(DEFAULT_TAG.to_string());
        }
        self
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(registry) = &self.registry {
            write!(f, "{}/", registry)?;
        }
        f.write_str(&self.name)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{}", tag)?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{}", digest)?;
        }
        Ok(())
    }
}

/// Resolve the worker image: project overrides on top of the default.
pub fn resolve_worker_image(default_image: &str, project: &ProjectRecord) -> String {
    ImageRef::parse(default_image)
        .with_overrides(
            project.worker_registry(),
            project.worker_name(),
            project.worker_tag(),
        )
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use brigade_core::RecordMeta;
    use brigade_core::record::project_keys;

    fn project(data: &[(&str, &str)]) -> ProjectRecord {
        ProjectRecord::new(
            RecordMeta::new("default", "brigade-1234"),
            data.iter().map(|(k, v)| (*k, v.to_string())).collect(),
        )
    }

    #[test]
    fn test_parse_full_image() {
        let image = ImageRef::parse("deis/brigade-worker:v1.2.3");
        assert_eq!(image.registry.as_deref(), Some("deis"));
        assert_eq!(image.name, "brigade-worker");
        assert_eq!(image.tag.as_deref(), Some("v1.2.3"));
        assert_eq!(image.digest, None);
    }

    #[test]
    fn test_parse_defaults_tag_to_latest() {
        let image = ImageRef::parse("deis/brigade-worker");
        assert_eq!(image.tag.as_deref(), Some("latest"));
        assert_eq!(image.to_string(), "deis/brigade-worker:latest");
    }

    #[test]
    fn test_parse_bare_name() {
        let image = ImageRef::parse("brigade-worker");
        assert_eq!(image.registry, None);
        assert_eq!(image.to_string(), "brigade-worker:latest");
    }

    #[test]
    fn test_parse_registry_with_port() {
        let image = ImageRef::parse("localhost:5000/team/brigade-worker");
        assert_eq!(image.registry.as_deref(), Some("localhost:5000/team"));
        assert_eq!(image.name, "brigade-worker");
        assert_eq!(image.tag.as_deref(), Some("latest"));
    }

    #[test]
    fn test_full_project_override() {
        let p = project(&[
            (project_keys::WORKER_REGISTRY, "myrepo"),
            (project_keys::WORKER_NAME, "brigade-worker-with-deps"),
            (project_keys::WORKER_TAG, "canary"),
        ]);
        assert_eq!(
            resolve_worker_image("deis/brigade-worker:latest", &p),
            "myrepo/brigade-worker-with-deps:canary"
        );
    }

    #[test]
    fn test_no_overrides_untagged_default() {
        assert_eq!(
            resolve_worker_image("deis/brigade-worker", &project(&[])),
            "deis/brigade-worker:latest"
        );
    }

    #[test]
    fn test_tag_only_override_keeps_registry_and_name() {
        let p = project(&[(project_keys::WORKER_TAG, "canary")]);
        assert_eq!(
            resolve_worker_image("deis/brigade-worker:v1.0.0", &p),
            "deis/brigade-worker:canary"
        );
    }

    #[test]
    fn test_registry_only_override() {
        let p = project(&[(project_keys::WORKER_REGISTRY, "quay.io/myorg")]);
        assert_eq!(
            resolve_worker_image("deis/brigade-worker:v1.0.0", &p),
            "quay.io/myorg/brigade-worker:v1.0.0"
        );
    }

    #[test]
    fn test_blank_override_is_ignored() {
        let p = project(&[(project_keys::WORKER_TAG, "  ")]);
        assert_eq!(
            resolve_worker_image("deis/brigade-worker:v1.0.0", &p),
            "deis/brigade-worker:v1.0.0"
        );
    }

    #[test]
    fn test_parse_digest() {
        let image = ImageRef::parse("deis/brigade-worker@sha256:abcd");
        assert_eq!(image.registry.as_deref(), Some("deis"));
        assert_eq!(image.name, "brigade-worker");
        assert_eq!(image.tag, None);
        assert_eq!(image.digest.as_deref(), Some("sha256:abcd"));
        assert_eq!(image.to_string(), "deis/brigade-worker@sha256:abcd");
    }

    #[test]
    fn test_parse_tag_and_digest() {
        let image = ImageRef::parse("localhost:5000/brigade-worker:v1@sha256:abcd");
        assert_eq!(image.registry.as_deref(), Some("localhost:5000"));
        assert_eq!(image.tag.as_deref(), Some("v1"));
        assert_eq!(image.digest.as_deref(), Some("sha256:abcd"));
        assert_eq!(
            image.to_string(),
            "localhost:5000/brigade-worker:v1@sha256:abcd"
        );
    }

    #[test]
    fn test_digest_default_kept_without_overrides() {
        assert_eq!(
            resolve_worker_image("deis/brigade-worker@sha256:abcd", &project(&[])),
            "deis/brigade-worker@sha256:abcd"
        );
    }

    #[test]
    fn test_tag_override_replaces_digest() {
        let p = project(&[(project_keys::WORKER_TAG, "canary")]);
        assert_eq!(
            resolve_worker_image("deis/brigade-worker@sha256:abcd", &p),
            "deis/brigade-worker:canary"
        );
    }

    #[test]
    fn test_name_override_on_digest_falls_back_to_latest() {
        let p = project(&[(project_keys::WORKER_NAME, "brigade-worker-with-deps")]);
        assert_eq!(
            resolve_worker_image("deis/brigade-worker@sha256:abcd", &p),
            "deis/brigade-worker-with-deps:latest"
        );
    }
}
