//! Helm chart scanner.
//!
//! Two manifest families live here. Chart dependency files
//! (`Chart.yaml`, `Chart.lock`, `requirements.yaml`,
//! `requirements.lock`) declare subcharts: when an `alias` renames a
//! dependency the alias becomes the record name and the original chart
//! name moves into the package list; the declared `repository` becomes
//! the record's git URL when it points at a git host.
//!
//! Values files (`values*.yaml`) are walked recursively: every
//! `image: <string>` leaf and every `{repository, tag}` object yields a
//! Docker record. Object-form references without a registry host are
//! qualified with the chart-level `global.imageRegistry` and
//! `global.imagePrefix`; string leaves are taken verbatim.

use super::Scanner;
use super::docker::split_image_ref;
use crate::context::ScanContext;
use crate::core::DepscanError;
use crate::model::{Dependency, Ecosystem};
use anyhow::Result;
use std::path::Path;

/// Scanner for Helm charts and values files.
pub struct HelmScanner;

impl Scanner for HelmScanner {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Helm
    }

    fn file_patterns(&self) -> &'static [&'static str] {
        &[
            "Chart.yaml",
            "Chart.lock",
            "requirements.yaml",
            "requirements.lock",
            "values*.yaml",
        ]
    }

    fn scan_file(&self, _ctx: &ScanContext, path: &Path, content: &str) -> Result<Vec<Dependency>> {
        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        let value: serde_yaml::Value =
            serde_yaml::from_str(content).map_err(|e| DepscanError::ManifestParseError {
                file: file_name.to_string(),
                reason: e.to_string(),
            })?;

        if file_name.starts_with("values") {
            Ok(scan_values(file_name, &value))
        } else {
            Ok(scan_chart_dependencies(file_name, &value))
        }
    }
}

/// A repository URL the walker can clone: a git forge or an explicit
/// `.git` remote. OCI and plain chart-museum repositories stay
/// non-traversable.
fn git_like_repository(repository: &str) -> bool {
    if !repository.starts_with("https://") && !repository.starts_with("git@") {
        return false;
    }
    repository.ends_with(".git")
        || ["github.com", "gitlab.com", "bitbucket.org"]
            .iter()
            .any(|host| repository.contains(host))
}

fn scan_chart_dependencies(file_name: &str, value: &serde_yaml::Value) -> Vec<Dependency> {
    let mut deps = Vec::new();
    let Some(entries) = value.get("dependencies").and_then(|v| v.as_sequence()) else {
        return deps;
    };

    for entry in entries {
        let Some(name) = entry.get("name").and_then(|v| v.as_str()) else {
            continue;
        };
        let version = entry
            .get("version")
            .map(yaml_scalar_to_string)
            .unwrap_or_default();
        let repository = entry
            .get("repository")
            .and_then(|v| v.as_str())
            .unwrap_or("");

        let mut dep = match entry.get("alias").and_then(|v| v.as_str()) {
            Some(alias) => {
                let mut d = Dependency::new(
                    Ecosystem::Helm,
                    alias,
                    version.clone(),
                    file_name.to_string(),
                );
                d.package.push(name.to_string());
                d
            }
            None => Dependency::new(Ecosystem::Helm, name, version.clone(), file_name.to_string()),
        };
        if git_like_repository(repository) {
            dep.git = repository.to_string();
        }
        deps.push(dep);
    }
    deps
}

/// Registry/prefix context pulled from the values file's `global` block.
#[derive(Default)]
struct GlobalImageConfig {
    registry: String,
    prefix: String,
}

impl GlobalImageConfig {
    fn from_values(value: &serde_yaml::Value) -> Self {
        let global = value.get("global");
        let pick = |key: &str| {
            global
                .and_then(|g| g.get(key))
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string()
        };
        Self {
            registry: pick("imageRegistry"),
            prefix: pick("imagePrefix"),
        }
    }

    /// Prepends registry and prefix to a bare repository name.
    fn qualify(&self, repository: &str) -> String {
        let first_segment = repository.split('/').next().unwrap_or("");
        let has_registry = first_segment.contains('.')
            || first_segment.contains(':')
            || first_segment == "localhost";
        if has_registry {
            return repository.to_string();
        }
        [self.registry.as_str(), self.prefix.as_str(), repository]
            .iter()
            .filter(|part| !part.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join("/")
    }
}

fn yaml_scalar_to_string(value: &serde_yaml::Value) -> String {
    match value {
        serde_yaml::Value::String(s) => s.clone(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

fn scan_values(file_name: &str, value: &serde_yaml::Value) -> Vec<Dependency> {
    let config = GlobalImageConfig::from_values(value);
    let mut deps = Vec::new();
    walk_values(value, file_name, "", &config, &mut deps);
    deps
}

fn walk_values(
    value: &serde_yaml::Value,
    file_name: &str,
    path: &str,
    config: &GlobalImageConfig,
    out: &mut Vec<Dependency>,
) {
    match value {
        serde_yaml::Value::Mapping(map) => {
            for (key, child) in map {
                let Some(key_str) = key.as_str() else {
                    continue;
                };
                let child_path = if path.is_empty() {
                    key_str.to_string()
                } else {
                    format!("{path}.{key_str}")
                };

                if key_str == "image" {
                    let source = format!("{file_name}:{child_path}");
                    match child {
                        serde_yaml::Value::String(image) => {
                            let (name, version) = split_image_ref(image);
                            out.push(Dependency::new(Ecosystem::Docker, name, version, source));
                            continue;
                        }
                        serde_yaml::Value::Mapping(image_map) => {
                            if let Some(repository) =
                                image_map.get("repository").and_then(|v| v.as_str())
                            {
                                let tag = image_map
                                    .get("tag")
                                    .map(yaml_scalar_to_string)
                                    .unwrap_or_default();
                                let version = if tag.is_empty() { "latest".into() } else { tag };
                                out.push(Dependency::new(
                                    Ecosystem::Docker,
                                    config.qualify(repository),
                                    version,
                                    source,
                                ));
                                continue;
                            }
                        }
                        _ => {}
                    }
                }

                walk_values(child, file_name, &child_path, config, out);
            }
        }
        serde_yaml::Value::Sequence(seq) => {
            for child in seq {
                walk_values(child, file_name, path, config, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(file: &str, content: &str) -> Vec<Dependency> {
        let ctx = ScanContext::new("/tmp", 0);
        HelmScanner.scan_file(&ctx, Path::new(file), content).unwrap()
    }

    #[test]
    fn chart_dependencies_with_alias() {
        let deps = scan(
            "Chart.yaml",
            r#"
apiVersion: v2
name: parent
dependencies:
  - name: postgresql
    version: 12.1.0
    repository: https://charts.bitnami.com/bitnami
  - name: redis
    alias: cache
    version: 17.0.1
    repository: https://charts.bitnami.com/bitnami
"#,
        );
        assert_eq!(deps.len(), 2);
        assert_eq!(deps[0].name, "postgresql");
        assert_eq!(deps[0].version, "12.1.0");
        assert_eq!(deps[0].git, "");

        assert_eq!(deps[1].name, "cache");
        assert_eq!(deps[1].package, vec!["redis".to_string()]);
    }

    #[test]
    fn git_hosted_chart_repository_is_traversable() {
        let deps = scan(
            "Chart.yaml",
            "dependencies:\n  - name: internal\n    version: 1.0.0\n    repository: https://github.com/org/charts\n",
        );
        assert_eq!(deps[0].git, "https://github.com/org/charts");
    }

    #[test]
    fn values_object_form_gets_registry_and_prefix() {
        let deps = scan(
            "values.yaml",
            r#"
global:
  imageRegistry: "r.io"
  imagePrefix: "proj"
services:
  api:
    image:
      repository: nginx
      tag: "1.27"
web:
  image: busybox:1.36
"#,
        );
        assert_eq!(deps.len(), 2);

        let api = deps.iter().find(|d| d.name.contains("nginx")).unwrap();
        assert_eq!(api.name, "r.io/proj/nginx");
        assert_eq!(api.version, "1.27");
        assert_eq!(api.ecosystem, Ecosystem::Docker);

        let web = deps.iter().find(|d| d.name == "busybox").unwrap();
        assert_eq!(web.version, "1.36");
    }

    #[test]
    fn qualified_repository_is_untouched() {
        let deps = scan(
            "values.yaml",
            "global:\n  imageRegistry: r.io\napp:\n  image:\n    repository: quay.io/org/tool\n    tag: v5\n",
        );
        assert_eq!(deps[0].name, "quay.io/org/tool");
    }

    #[test]
    fn numeric_tag_is_stringified() {
        let deps = scan("values.yaml", "app:\n  image:\n    repository: nginx\n    tag: 1.27\n");
        assert_eq!(deps[0].version, "1.27");
    }

    #[test]
    fn tagless_object_defaults_latest() {
        let deps = scan("values.yaml", "app:\n  image:\n    repository: nginx\n");
        assert_eq!(deps[0].version, "latest");
    }

    #[test]
    fn chart_lock_is_scanned_like_chart_yaml() {
        let deps = scan(
            "Chart.lock",
            "dependencies:\n  - name: postgresql\n    repository: https://charts.bitnami.com/bitnami\n    version: 12.1.2\ndigest: sha256:abc\n",
        );
        assert_eq!(deps[0].version, "12.1.2");
    }

    #[test]
    fn deeply_nested_and_list_values() {
        let deps = scan(
            "values-prod.yaml",
            "tiers:\n  - name: a\n    sidecar:\n      image: envoy:1.30\n  - name: b\n    image: fluentd:v1.16\n",
        );
        let names: Vec<_> = deps.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["envoy", "fluentd"]);
    }
}
