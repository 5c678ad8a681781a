//! Python package scanner.
//!
//! Covers the whole zoo of Python dependency declarations:
//! `requirements*.txt`, `Pipfile` / `Pipfile.lock`, `pyproject.toml`
//! (both PEP 621 `[project]` tables and Poetry), `poetry.lock`,
//! `setup.py`, and `setup.cfg`.
//!
//! Version specifier operators (`==`, `>=`, `~=`, `^`, `~`, ...) are
//! stripped so the record carries the declared version text itself.
//! Include/editable directives (`-r`, `-e`) and Poetry's `python` key
//! are ignored; `optional-dependencies` groups are treated like regular
//! dependencies.

use super::Scanner;
use crate::context::ScanContext;
use crate::core::DepscanError;
use crate::model::{Dependency, Ecosystem};
use anyhow::Result;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

/// Scanner for Python dependency manifests.
pub struct PythonScanner;

impl Scanner for PythonScanner {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Pip
    }

    fn file_patterns(&self) -> &'static [&'static str] {
        &[
            "requirements*.txt",
            "Pipfile",
            "Pipfile.lock",
            "pyproject.toml",
            "poetry.lock",
            "setup.py",
            "setup.cfg",
        ]
    }

    fn scan_file(&self, _ctx: &ScanContext, path: &Path, content: &str) -> Result<Vec<Dependency>> {
        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        match file_name {
            "Pipfile" => scan_pipfile(file_name, content),
            "Pipfile.lock" => scan_pipfile_lock(file_name, content),
            "pyproject.toml" => scan_pyproject(file_name, content),
            "poetry.lock" => scan_poetry_lock(file_name, content),
            "setup.py" => Ok(scan_setup_py(file_name, content)),
            "setup.cfg" => Ok(scan_setup_cfg(file_name, content)),
            _ => Ok(scan_requirements(file_name, content)),
        }
    }
}

fn record(name: &str, version: &str, source: String) -> Dependency {
    Dependency::new(Ecosystem::Pip, name, version, source)
}

/// Splits a PEP 508 requirement string into `(name, version)`, dropping
/// extras and environment markers and stripping the specifier operator.
fn split_requirement(spec: &str) -> Option<(String, String)> {
    let spec = spec.split(';').next().unwrap_or(spec).trim();
    if spec.is_empty() {
        return None;
    }

    let op_start = spec.find(['=', '<', '>', '!', '~', '^']);
    let (raw_name, raw_version) = match op_start {
        Some(idx) => {
            let rest = &spec[idx..];
            let op_len = rest
                .bytes()
                .take_while(|b| matches!(b, b'=' | b'<' | b'>' | b'!' | b'~' | b'^'))
                .count();
            (&spec[..idx], rest[op_len..].trim())
        }
        None => (spec, ""),
    };

    // "pkg[extra1,extra2]" declares the same package.
    let name = raw_name.split('[').next().unwrap_or(raw_name).trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), raw_version.to_string()))
}

fn scan_requirements(file_name: &str, content: &str) -> Vec<Dependency> {
    let mut deps = Vec::new();
    for (idx, raw) in content.lines().enumerate() {
        let line = raw.split('#').next().unwrap_or(raw).trim();
        if line.is_empty() || line.starts_with('-') {
            // -r/-c includes, -e editables, and pip options.
            continue;
        }
        if let Some((name, version)) = split_requirement(line) {
            deps.push(record(&name, &version, format!("{file_name}:{}", idx + 1)));
        }
    }
    deps
}

fn strip_specifier_prefix(version: &str) -> &str {
    version.trim_start_matches(['=', '<', '>', '!', '~', '^']).trim()
}

fn dep_from_toml_value(name: &str, value: &toml::Value, source: String) -> Option<Dependency> {
    if name.eq_ignore_ascii_case("python") {
        return None;
    }
    match value {
        toml::Value::String(version) => {
            Some(record(name, strip_specifier_prefix(version), source))
        }
        toml::Value::Table(table) => {
            let mut dep = record(
                name,
                table
                    .get("version")
                    .and_then(|v| v.as_str())
                    .map(strip_specifier_prefix)
                    .unwrap_or_default(),
                source,
            );
            if let Some(git) = table.get("git").and_then(|v| v.as_str()) {
                dep.git = git.to_string();
                if dep.version.is_empty() {
                    for key in ["tag", "rev", "branch", "ref"] {
                        if let Some(reference) = table.get(key).and_then(|v| v.as_str()) {
                            dep.version = reference.to_string();
                            break;
                        }
                    }
                }
            }
            Some(dep)
        }
        _ => None,
    }
}

fn parse_toml(file_name: &str, content: &str) -> Result<toml::Value> {
    toml::from_str::<toml::Value>(content).map_err(|e| {
        DepscanError::ManifestParseError {
            file: file_name.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

fn scan_pipfile(file_name: &str, content: &str) -> Result<Vec<Dependency>> {
    let value = parse_toml(file_name, content)?;
    let mut deps = Vec::new();
    for section in ["packages", "dev-packages"] {
        if let Some(table) = value.get(section).and_then(|v| v.as_table()) {
            for (name, spec) in table {
                if let Some(dep) = dep_from_toml_value(name, spec, file_name.to_string()) {
                    deps.push(dep);
                }
            }
        }
    }
    Ok(deps)
}

fn scan_pipfile_lock(file_name: &str, content: &str) -> Result<Vec<Dependency>> {
    let value: serde_json::Value =
        serde_json::from_str(content).map_err(|e| DepscanError::ManifestParseError {
            file: file_name.to_string(),
            reason: e.to_string(),
        })?;
    let mut deps = Vec::new();
    for section in ["default", "develop"] {
        if let Some(map) = value.get(section).and_then(|v| v.as_object()) {
            for (name, spec) in map {
                let version = spec
                    .get("version")
                    .and_then(|v| v.as_str())
                    .map(strip_specifier_prefix)
                    .unwrap_or_default();
                deps.push(record(name, version, file_name.to_string()));
            }
        }
    }
    Ok(deps)
}

fn scan_pyproject(file_name: &str, content: &str) -> Result<Vec<Dependency>> {
    let value = parse_toml(file_name, content)?;
    let mut deps = Vec::new();

    // PEP 621: [project] dependencies + optional-dependencies groups.
    if let Some(project) = value.get("project") {
        if let Some(list) = project.get("dependencies").and_then(|v| v.as_array()) {
            for spec in list.iter().filter_map(|v| v.as_str()) {
                if let Some((name, version)) = split_requirement(spec) {
                    deps.push(record(&name, &version, file_name.to_string()));
                }
            }
        }
        if let Some(groups) = project
            .get("optional-dependencies")
            .and_then(|v| v.as_table())
        {
            for list in groups.values().filter_map(|v| v.as_array()) {
                for spec in list.iter().filter_map(|v| v.as_str()) {
                    if let Some((name, version)) = split_requirement(spec) {
                        deps.push(record(&name, &version, file_name.to_string()));
                    }
                }
            }
        }
    }

    // Poetry: [tool.poetry.dependencies], dev-dependencies, and groups.
    if let Some(poetry) = value.get("tool").and_then(|t| t.get("poetry")) {
        let mut tables = Vec::new();
        tables.push(poetry.get("dependencies"));
        tables.push(poetry.get("dev-dependencies"));
        if let Some(groups) = poetry.get("group").and_then(|g| g.as_table()) {
            for group in groups.values() {
                tables.push(group.get("dependencies"));
            }
        }
        for table in tables.into_iter().flatten().filter_map(|t| t.as_table()) {
            for (name, spec) in table {
                if let Some(dep) = dep_from_toml_value(name, spec, file_name.to_string()) {
                    deps.push(dep);
                }
            }
        }
    }

    Ok(deps)
}

fn scan_poetry_lock(file_name: &str, content: &str) -> Result<Vec<Dependency>> {
    let value = parse_toml(file_name, content)?;
    let mut deps = Vec::new();
    if let Some(packages) = value.get("package").and_then(|v| v.as_array()) {
        for package in packages {
            let Some(name) = package.get("name").and_then(|v| v.as_str()) else {
                continue;
            };
            let version = package
                .get("version")
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            deps.push(record(name, version, file_name.to_string()));
        }
    }
    Ok(deps)
}

fn setup_py_requires_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)install_requires\s*=\s*\[(.*?)\]").expect("static regex")
    })
}

fn quoted_string_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"["']([^"']+)["']"#).expect("static regex"))
}

fn scan_setup_py(file_name: &str, content: &str) -> Vec<Dependency> {
    let mut deps = Vec::new();
    if let Some(caps) = setup_py_requires_re().captures(content) {
        let body = caps.get(1).map_or("", |m| m.as_str());
        for m in quoted_string_re().captures_iter(body) {
            if let Some((name, version)) = split_requirement(&m[1]) {
                deps.push(record(&name, &version, file_name.to_string()));
            }
        }
    }
    deps
}

fn scan_setup_cfg(file_name: &str, content: &str) -> Vec<Dependency> {
    let mut deps = Vec::new();
    let mut in_requires = false;

    for (idx, raw) in content.lines().enumerate() {
        let line = raw.trim_end();
        let trimmed = line.trim();

        if trimmed.starts_with('[') {
            in_requires = false;
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("install_requires") {
            in_requires = true;
            let inline = rest.trim_start_matches(['=', ' ']).trim();
            if !inline.is_empty()
                && let Some((name, version)) = split_requirement(inline)
            {
                deps.push(record(&name, &version, format!("{file_name}:{}", idx + 1)));
            }
            continue;
        }
        if in_requires {
            // Continuation lines are indented; a new key ends the block.
            if !raw.starts_with([' ', '\t']) || trimmed.contains(" = ") {
                in_requires = false;
                continue;
            }
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            if let Some((name, version)) = split_requirement(trimmed) {
                deps.push(record(&name, &version, format!("{file_name}:{}", idx + 1)));
            }
        }
    }
    deps
}
