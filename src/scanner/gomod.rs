//! Go module scanner (`go.mod`, `go.sum`).
//!
//! `go.mod` is the primary source: `require` directives become records,
//! `replace` directives rewrite them, and `// indirect` markers are
//! preserved. Modules under `golang.org/x/` are typed `stdlib` (they
//! live outside the standard library proper but are maintained with it
//! and are rarely interesting when auditing third-party exposure).
//!
//! `go.sum` is a fallback: it only gets scanned when no adjacent
//! `go.mod` exists (discovery enforces this), yielding one record per
//! unique module with `/go.mod` suffixes stripped from versions.

use super::Scanner;
use crate::context::ScanContext;
use crate::model::{Dependency, Ecosystem, LOCAL_VERSION_PREFIX};
use anyhow::Result;
use std::collections::HashSet;
use std::path::Path;

/// Scanner for Go module manifests.
pub struct GoModScanner;

const STDLIB_PREFIX: &str = "golang.org/x/";

impl Scanner for GoModScanner {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Go
    }

    fn file_patterns(&self) -> &'static [&'static str] {
        &["go.mod", "go.sum"]
    }

    fn scan_file(&self, _ctx: &ScanContext, path: &Path, content: &str) -> Result<Vec<Dependency>> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("go.mod");
        if file_name == "go.sum" {
            Ok(scan_go_sum(content))
        } else {
            Ok(scan_go_mod(content))
        }
    }
}

fn module_type(name: &str) -> Ecosystem {
    if name.starts_with(STDLIB_PREFIX) {
        Ecosystem::Stdlib
    } else {
        Ecosystem::Go
    }
}

/// Derives the canonical remote URL for well-known forge hosts; other
/// module paths stay non-traversable.
fn infer_git_url(name: &str) -> String {
    for host in ["github.com", "gitlab.com", "bitbucket.org"] {
        if let Some(rest) = name.strip_prefix(&format!("{host}/")) {
            let mut parts = rest.splitn(3, '/');
            if let (Some(org), Some(repo)) = (parts.next(), parts.next())
                && !org.is_empty()
                && !repo.is_empty()
            {
                return format!("https://{host}/{org}/{repo}");
            }
        }
    }
    String::new()
}

/// A local replacement path: absolute, `./`, `../`, or a Windows drive
/// letter.
fn is_local_replace_target(target: &str) -> bool {
    target.starts_with('/')
        || target.starts_with("./")
        || target.starts_with("../")
        || (target.len() >= 2
            && target.as_bytes()[1] == b':'
            && target.as_bytes()[0].is_ascii_alphabetic())
}

#[derive(Debug)]
struct ReplaceDirective {
    original_name: String,
    target_name: String,
    target_version: Option<String>,
    local: bool,
}

fn parse_replace_line(line: &str) -> Option<ReplaceDirective> {
    let (lhs, rhs) = line.split_once("=>")?;
    let lhs_fields: Vec<&str> = lhs.split_whitespace().collect();
    let rhs_fields: Vec<&str> = rhs.split_whitespace().collect();
    let original_name = (*lhs_fields.first()?).to_string();
    let target_name = (*rhs_fields.first()?).to_string();
    let local = is_local_replace_target(&target_name);
    Some(ReplaceDirective {
        original_name,
        target_version: rhs_fields.get(1).map(|v| (*v).to_string()),
        target_name,
        local,
    })
}

fn scan_go_mod(content: &str) -> Vec<Dependency> {
    let mut deps: Vec<Dependency> = Vec::new();
    let mut replaces: Vec<ReplaceDirective> = Vec::new();
    let mut in_require = false;
    let mut in_replace = false;

    for (idx, raw) in content.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with("//") {
            continue;
        }

        if in_require || in_replace {
            if line == ")" {
                in_require = false;
                in_replace = false;
                continue;
            }
            if in_require {
                if let Some(dep) = parse_require_entry(line, line_no) {
                    deps.push(dep);
                }
            } else if let Some(rep) = parse_replace_line(line) {
                replaces.push(rep);
            }
            continue;
        }

        if line.starts_with("require (") {
            in_require = true;
        } else if line.starts_with("replace (") {
            in_replace = true;
        } else if let Some(rest) = line.strip_prefix("require ") {
            if let Some(dep) = parse_require_entry(rest.trim(), line_no) {
                deps.push(dep);
            }
        } else if let Some(rest) = line.strip_prefix("replace ") {
            if let Some(rep) = parse_replace_line(rest.trim()) {
                replaces.push(rep);
            }
        }
        // module, go, toolchain, exclude and retract directives carry no
        // dependency information for this report.
    }

    for rep in &replaces {
        apply_replace(&mut deps, rep);
    }

    deps
}

fn parse_require_entry(entry: &str, line_no: usize) -> Option<Dependency> {
    let indirect = entry.contains("// indirect");
    let entry = entry.split("//").next().unwrap_or(entry).trim();
    let mut fields = entry.split_whitespace();
    let name = fields.next()?;
    let version = fields.next().unwrap_or("");
    if name.is_empty() {
        return None;
    }

    let mut dep = Dependency::new(
        module_type(name),
        name,
        version,
        format!("go.mod:{line_no}"),
    );
    dep.indirect = indirect;
    dep.git = if dep.ecosystem == Ecosystem::Go {
        infer_git_url(name)
    } else {
        String::new()
    };
    Some(dep)
}

fn apply_replace(deps: &mut [Dependency], rep: &ReplaceDirective) {
    for dep in deps.iter_mut().filter(|d| d.name == rep.original_name) {
        let original = if dep.version.is_empty() {
            dep.name.clone()
        } else {
            format!("{} {}", dep.name, dep.version)
        };

        if rep.local {
            // Local path replacement keeps the declared name and turns
            // the version into a non-network redirect.
            dep.version = format!("{LOCAL_VERSION_PREFIX}{}", rep.target_name);
            dep.git = String::new();
        } else {
            dep.name = rep.target_name.clone();
            if let Some(version) = &rep.target_version {
                dep.version = version.clone();
            }
            dep.ecosystem = module_type(&dep.name);
            dep.git = if dep.ecosystem == Ecosystem::Go {
                infer_git_url(&dep.name)
            } else {
                String::new()
            };
        }
        dep.resolved_from = Some(original);
    }
}

fn scan_go_sum(content: &str) -> Vec<Dependency> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut deps = Vec::new();

    for (idx, raw) in content.lines().enumerate() {
        let line = raw.trim();
        let mut fields = line.split_whitespace();
        let (Some(name), Some(version)) = (fields.next(), fields.next()) else {
            continue;
        };
        let version = version.strip_suffix("/go.mod").unwrap_or(version);
        if !seen.insert(name.to_string()) {
            continue;
        }

        let kind = module_type(name);
        let git = if kind == Ecosystem::Go {
            infer_git_url(name)
        } else {
            String::new()
        };
        deps.push(
            Dependency::new(kind, name, version, format!("go.sum:{}", idx + 1)).with_git(git),
        );
    }

    deps
}
