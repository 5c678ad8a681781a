//! Node package scanner.
//!
//! Handles `package.json` plus the three lockfile dialects in the wild:
//! `package-lock.json` (v1 nested maps and v2/v3 `packages` keyed by
//! `node_modules/` paths), `yarn.lock` (two-line blocks of
//! `pkg@range:` headers followed by an indented `version "x"`), and
//! `pnpm-lock.yaml` (`/[@scope/]name/version` package keys).
//!
//! Scoped names (`@scope/name`) survive all of it because the version
//! separator is always the *last* `@`.

use super::Scanner;
use crate::context::ScanContext;
use crate::core::DepscanError;
use crate::model::{Dependency, Ecosystem};
use anyhow::Result;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

/// Scanner for Node manifests and lockfiles.
pub struct NodeScanner {
    yarn_version_re: &'static Regex,
}

impl NodeScanner {
    /// Creates the scanner.
    #[must_use]
    pub fn new() -> Self {
        static RE: OnceLock<Regex> = OnceLock::new();
        Self {
            yarn_version_re: RE
                .get_or_init(|| Regex::new(r#"^\s+version\s+"([^"]+)""#).expect("static regex")),
        }
    }
}

impl Default for NodeScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl Scanner for NodeScanner {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Npm
    }

    fn file_patterns(&self) -> &'static [&'static str] {
        &[
            "package.json",
            "package-lock.json",
            "yarn.lock",
            "pnpm-lock.yaml",
        ]
    }

    fn scan_file(&self, _ctx: &ScanContext, path: &Path, content: &str) -> Result<Vec<Dependency>> {
        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        match file_name {
            "package-lock.json" => scan_package_lock(file_name, content),
            "yarn.lock" => Ok(self.scan_yarn_lock(file_name, content)),
            "pnpm-lock.yaml" => scan_pnpm_lock(file_name, content),
            _ => scan_package_json(file_name, content),
        }
    }
}

fn record(name: &str, version: &str, source: String) -> Dependency {
    Dependency::new(Ecosystem::Npm, name, version, source)
}

const DEP_SECTIONS: [&str; 4] = [
    "dependencies",
    "devDependencies",
    "peerDependencies",
    "optionalDependencies",
];

fn parse_json(file_name: &str, content: &str) -> Result<serde_json::Value> {
    serde_json::from_str(content).map_err(|e| {
        DepscanError::ManifestParseError {
            file: file_name.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

fn scan_package_json(file_name: &str, content: &str) -> Result<Vec<Dependency>> {
    let value = parse_json(file_name, content)?;
    let mut deps = Vec::new();
    for section in DEP_SECTIONS {
        if let Some(map) = value.get(section).and_then(|v| v.as_object()) {
            for (name, range) in map {
                deps.push(record(
                    name,
                    range.as_str().unwrap_or_default(),
                    file_name.to_string(),
                ));
            }
        }
    }
    Ok(deps)
}

/// Package name from a v7+ lockfile path: the segment after the last
/// `node_modules/`, keeping a scope prefix intact.
fn name_from_lock_path(path: &str) -> Option<&str> {
    let idx = path.rfind("node_modules/")?;
    let name = &path[idx + "node_modules/".len()..];
    if name.is_empty() { None } else { Some(name) }
}

fn scan_package_lock(file_name: &str, content: &str) -> Result<Vec<Dependency>> {
    let value = parse_json(file_name, content)?;
    let mut deps = Vec::new();

    // Lockfile v2/v3: flat "packages" map keyed by install path.
    if let Some(packages) = value.get("packages").and_then(|v| v.as_object()) {
        for (path, entry) in packages {
            if path.is_empty() {
                continue; // the root project itself
            }
            let Some(name) = name_from_lock_path(path) else {
                continue;
            };
            let version = entry.get("version").and_then(|v| v.as_str()).unwrap_or("");
            let mut dep = record(name, version, file_name.to_string());
            dep.indirect = path.matches("node_modules/").count() > 1;
            deps.push(dep);
        }
        return Ok(deps);
    }

    // Lockfile v1: nested "dependencies" tree.
    fn walk_v1(
        map: &serde_json::Map<String, serde_json::Value>,
        nested: bool,
        file_name: &str,
        out: &mut Vec<Dependency>,
    ) {
        for (name, entry) in map {
            let version = entry.get("version").and_then(|v| v.as_str()).unwrap_or("");
            let mut dep = record(name, version, file_name.to_string());
            dep.indirect = nested;
            out.push(dep);
            if let Some(children) = entry.get("dependencies").and_then(|v| v.as_object()) {
                walk_v1(children, true, file_name, out);
            }
        }
    }
    if let Some(map) = value.get("dependencies").and_then(|v| v.as_object()) {
        walk_v1(map, false, file_name, &mut deps);
    }
    Ok(deps)
}

impl NodeScanner {
    fn scan_yarn_lock(&self, file_name: &str, content: &str) -> Vec<Dependency> {
        let mut deps = Vec::new();
        let mut block_names: Vec<String> = Vec::new();

        for raw in content.lines() {
            let line = raw.trim_end();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            // Block headers sit at column zero and end with ':'. One
            // header may declare several "name@range" selectors.
            if !raw.starts_with([' ', '\t']) && line.ends_with(':') {
                block_names = line
                    .trim_end_matches(':')
                    .split(',')
                    .filter_map(|selector| {
                        let selector = selector.trim().trim_matches('"');
                        let at = selector.rfind('@')?;
                        if at == 0 {
                            return None; // "@scope/name" with no range
                        }
                        Some(selector[..at].to_string())
                    })
                    .collect();
                continue;
            }

            if let Some(caps) = self.yarn_version_re.captures(raw) {
                let version = &caps[1];
                for name in block_names.drain(..) {
                    deps.push(record(&name, version, file_name.to_string()));
                }
            }
        }
        deps
    }
}

/// Parses a pnpm package key: `/name/1.0.0`, `/@scope/name/1.0.0`, or
/// the newer `/[@scope/]name@1.0.0` form. Peer-dependency suffixes
/// (`_react@18.2.0`, `(react@18.2.0)`) are dropped.
fn split_pnpm_key(key: &str) -> Option<(String, String)> {
    let key = key.strip_prefix('/')?;
    let key = key.split('(').next().unwrap_or(key);

    // "/name/version" with an optional "_peer" suffix on the version.
    if let Some(slash) = key.rfind('/') {
        let name = &key[..slash];
        let version = key[slash + 1..].split('_').next().unwrap_or("");
        if !name.is_empty()
            && !version.is_empty()
            && !version.contains('@')
            && version.starts_with(|c: char| c.is_ascii_digit())
        {
            return Some((name.to_string(), version.to_string()));
        }
    }

    // "[@scope/]name@version": version after the last '@'.
    let at = key.rfind('@').filter(|&at| at > 0)?;
    let version = key[at + 1..].split('_').next().unwrap_or("");
    if version.is_empty() {
        return None;
    }
    Some((key[..at].to_string(), version.to_string()))
}

fn scan_pnpm_lock(file_name: &str, content: &str) -> Result<Vec<Dependency>> {
    let value: serde_yaml::Value =
        serde_yaml::from_str(content).map_err(|e| DepscanError::ManifestParseError {
            file: file_name.to_string(),
            reason: e.to_string(),
        })?;
    let mut deps = Vec::new();
    if let Some(packages) = value.get("packages").and_then(|v| v.as_mapping()) {
        for key in packages.keys().filter_map(|k| k.as_str()) {
            if let Some((name, version)) = split_pnpm_key(key) {
                deps.push(record(&name, &version, file_name.to_string()));
            }
        }
    }
    Ok(deps)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(file: &str, content: &str) -> Vec<Dependency> {
        let ctx = ScanContext::new("/tmp", 0);
        NodeScanner::new()
            .scan_file(&ctx, Path::new(file), content)
            .unwrap()
    }

    #[test]
    fn package_json_merges_all_sections() {
        let deps = scan(
            "package.json",
            r#"{
  "dependencies": {"express": "^4.19.0", "@types/node": "20.14.0"},
  "devDependencies": {"vitest": "^1.6.0"},
  "peerDependencies": {"react": ">=18"},
  "optionalDependencies": {"fsevents": "~2.3.3"}
}"#,
        );
        assert_eq!(deps.len(), 5);
        let scoped = deps.iter().find(|d| d.name == "@types/node").unwrap();
        assert_eq!(scoped.version, "20.14.0");
        assert!(deps.iter().any(|d| d.name == "react"));
    }

    #[test]
    fn package_lock_v3_names_from_paths() {
        let deps = scan(
            "package-lock.json",
            r#"{
  "lockfileVersion": 3,
  "packages": {
    "": {"name": "root"},
    "node_modules/express": {"version": "4.19.2"},
    "node_modules/@scope/tool": {"version": "1.2.3"},
    "node_modules/a/node_modules/b": {"version": "0.0.9"}
  }
}"#,
        );
        assert_eq!(deps.len(), 3);
        let nested = deps.iter().find(|d| d.name == "b").unwrap();
        assert!(nested.indirect);
        let scoped = deps.iter().find(|d| d.name == "@scope/tool").unwrap();
        assert_eq!(scoped.version, "1.2.3");
    }

    #[test]
    fn package_lock_v1_nested_tree() {
        let deps = scan(
            "package-lock.json",
            r#"{
  "lockfileVersion": 1,
  "dependencies": {
    "express": {
      "version": "4.19.2",
      "dependencies": {"accepts": {"version": "1.3.8"}}
    }
  }
}"#,
        );
        assert_eq!(deps.len(), 2);
        assert!(!deps[0].indirect);
        assert!(deps[1].indirect);
    }

    #[test]
    fn yarn_lock_two_line_blocks() {
        let deps = scan(
            "yarn.lock",
            r#"# yarn lockfile v1

express@^4.19.0:
  version "4.19.2"
  resolved "https://registry.yarnpkg.com/express/-/express-4.19.2.tgz"

"@babel/core@^7.24.0", "@babel/core@^7.23.0":
  version "7.24.7"
"#,
        );
        assert_eq!(deps.len(), 3);
        assert_eq!(deps[0].name, "express");
        assert_eq!(deps[0].version, "4.19.2");
        assert_eq!(deps[1].name, "@babel/core");
        assert_eq!(deps[1].version, "7.24.7");
        assert_eq!(deps[2].name, "@babel/core");
    }

    #[test]
    fn pnpm_lock_key_forms() {
        let deps = scan(
            "pnpm-lock.yaml",
            "lockfileVersion: '6.0'\npackages:\n  /lodash/4.17.21:\n    resolution: {}\n  /@scope/pkg/2.0.0_react@18.2.0:\n    resolution: {}\n  /@scope/other@3.1.0:\n    resolution: {}\n",
        );
        let pairs: Vec<(&str, &str)> = deps
            .iter()
            .map(|d| (d.name.as_str(), d.version.as_str()))
            .collect();
        assert_eq!(
            pairs,
            [
                ("lodash", "4.17.21"),
                ("@scope/pkg", "2.0.0"),
                ("@scope/other", "3.1.0"),
            ]
        );
    }

    #[test]
    fn malformed_package_json_is_a_parse_error() {
        let ctx = ScanContext::new("/tmp", 0);
        assert!(
            NodeScanner::new()
                .scan_file(&ctx, Path::new("package.json"), "{ not json")
                .is_err()
        );
    }
}
