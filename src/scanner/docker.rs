//! Container image scanner (`Dockerfile*`, compose files).
//!
//! Dockerfiles contribute one record per `FROM` image and per
//! `COPY --from=` image, skipping `scratch` and references to build
//! stages declared earlier in the same file. `ARG` declarations seen
//! above a line resolve `${VAR}` and `${VAR:-default}` substitutions in
//! it.
//!
//! Splitting an image reference into name and version has one genuinely
//! annoying corner: `myreg.io:5000/app`. A colon is a port only when the
//! text after it up to the next `/` is all digits and the text before it
//! contains a dot; everything else is a tag separator. Digest references
//! (`@sha256:...`) keep the digest as the version, leading `@` included.

use super::Scanner;
use crate::context::ScanContext;
use crate::core::DepscanError;
use crate::model::{Dependency, Ecosystem};
use anyhow::Result;
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

/// Scanner for Dockerfiles and compose manifests.
pub struct DockerScanner;

impl Scanner for DockerScanner {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Docker
    }

    fn file_patterns(&self) -> &'static [&'static str] {
        &["Dockerfile*", "docker-compose.yml", "compose.yml"]
    }

    fn scan_file(&self, _ctx: &ScanContext, path: &Path, content: &str) -> Result<Vec<Dependency>> {
        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if file_name == "docker-compose.yml" || file_name == "compose.yml" {
            scan_compose(file_name, content)
        } else {
            Ok(scan_dockerfile(file_name, content))
        }
    }
}

/// Splits an image reference into `(name, version)`.
///
/// A colon is a port only if the text after it up to the next `/` is
/// all digits and the text before the colon contains a dot; any other
/// colon is a tag separator.
#[must_use]
pub fn split_image_ref(image: &str) -> (String, String) {
    if let Some(at) = image.find('@') {
        // Digest pin: keep the whole "@sha256:..." as the version.
        return (image[..at].to_string(), image[at..].to_string());
    }

    if let Some(colon) = image.rfind(':') {
        let after = &image[colon + 1..];
        let port_candidate = &after[..after.find('/').unwrap_or(after.len())];
        let is_port = !port_candidate.is_empty()
            && port_candidate.chars().all(|c| c.is_ascii_digit())
            && image[..colon].contains('.');
        if is_port {
            return (image.to_string(), "latest".to_string());
        }
        return (image[..colon].to_string(), after.to_string());
    }

    (image.to_string(), "latest".to_string())
}

fn var_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").expect("static regex")
    })
}

/// Substitutes `${VAR}` and `${VAR:-default}` from the `ARG` values seen
/// so far. Unknown variables without a default collapse to empty.
fn resolve_build_args(text: &str, args: &HashMap<String, String>) -> String {
    var_re()
        .replace_all(text, |caps: &regex::Captures<'_>| {
            args.get(&caps[1])
                .map(String::as_str)
                .or_else(|| caps.get(2).map(|m| m.as_str()))
                .unwrap_or("")
                .to_string()
        })
        .into_owned()
}

fn image_record(image: &str, source: String) -> Dependency {
    let (name, version) = split_image_ref(image);
    Dependency::new(Ecosystem::Docker, name, version, source)
}

fn scan_dockerfile(file_name: &str, content: &str) -> Vec<Dependency> {
    let mut deps = Vec::new();
    let mut args: HashMap<String, String> = HashMap::new();
    let mut stages: Vec<String> = Vec::new();

    for (idx, raw) in content.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let upper = line.to_ascii_uppercase();

        if upper.starts_with("ARG ") {
            let decl = line[4..].trim();
            if let Some((name, default)) = decl.split_once('=') {
                args.insert(name.trim().to_string(), default.trim().to_string());
            } else {
                args.entry(decl.to_string()).or_default();
            }
            continue;
        }

        if upper.starts_with("FROM ") {
            let resolved = resolve_build_args(line, &args);
            let mut fields = resolved.split_whitespace().skip(1).peekable();
            while fields.peek().is_some_and(|f| f.starts_with("--")) {
                fields.next(); // --platform and friends
            }
            let Some(image) = fields.next() else { continue };

            // FROM base AS builder
            if fields.next().is_some_and(|f| f.eq_ignore_ascii_case("as"))
                && let Some(stage) = fields.next()
            {
                stages.push(stage.to_ascii_lowercase());
            }

            if image.eq_ignore_ascii_case("scratch")
                || stages.contains(&image.to_ascii_lowercase())
            {
                continue;
            }
            deps.push(image_record(image, format!("{file_name}:{line_no}")));
            continue;
        }

        if upper.starts_with("COPY ") {
            let resolved = resolve_build_args(line, &args);
            for field in resolved.split_whitespace() {
                let Some(source_ref) = field.strip_prefix("--from=") else {
                    continue;
                };
                let lowered = source_ref.to_ascii_lowercase();
                // Stage names and numeric stage indexes are build-local.
                if source_ref.bytes().all(|b| b.is_ascii_digit()) || stages.contains(&lowered) {
                    continue;
                }
                deps.push(image_record(source_ref, format!("{file_name}:{line_no}")));
            }
        }
    }

    deps
}

fn scan_compose(file_name: &str, content: &str) -> Result<Vec<Dependency>> {
    let value: serde_yaml::Value =
        serde_yaml::from_str(content).map_err(|e| DepscanError::ManifestParseError {
            file: file_name.to_string(),
            reason: e.to_string(),
        })?;

    let mut deps = Vec::new();
    if let Some(services) = value.get("services").and_then(|v| v.as_mapping()) {
        for (service, config) in services {
            let Some(image) = config.get("image").and_then(|v| v.as_str()) else {
                continue;
            };
            let service_name = service.as_str().unwrap_or("service");
            deps.push(image_record(image, format!("{file_name}:{service_name}")));
        }
    }
    Ok(deps)
}
