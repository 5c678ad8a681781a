//! Conflict detection across manifests in one walk.

use depscan_cli::model::FilterSet;
use depscan_cli::repo::RepoManager;
use depscan_cli::scanner::ScannerRegistry;
use depscan_cli::test_utils::write_file;
use depscan_cli::walker::{ScanOptions, Walker};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn walker(cache: &TempDir) -> Walker {
    Walker::new(
        Arc::new(ScannerRegistry::builtin()),
        Arc::new(RepoManager::new(cache.path())),
    )
}

/// Two local modules, each pinning `github.com/x/y` differently.
fn divergent_fixture(root: &Path) -> std::path::PathBuf {
    let proj = root.join("proj");
    let sib = root.join("sib");
    std::fs::create_dir_all(&proj).unwrap();
    std::fs::create_dir_all(&sib).unwrap();
    write_file(
        &proj,
        "go.mod",
        "module m\nrequire (\n\tgithub.com/x/y v1.0.0\n\texample.com/s v0.1.0\n)\nreplace example.com/s => ../sib\n",
    );
    write_file(&sib, "go.mod", "module sib\nrequire github.com/x/y v2.0.0\n");
    proj
}

#[tokio::test]
async fn exactly_one_conflict_per_divergent_key() {
    let cache = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();
    let proj = divergent_fixture(root.path());

    let (result, _) = walker(&cache)
        .scan(
            proj.to_str().unwrap(),
            ScanOptions {
                max_depth: 1,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(result.conflicts.len(), 1);
    let conflict = &result.conflicts[0];
    assert_eq!(conflict.dependency_name, "github.com/x/y");
    assert_eq!(conflict.resolution_strategy, "latest");
    let versions: Vec<&str> = conflict.versions.iter().map(|v| v.version.as_str()).collect();
    assert_eq!(versions, ["v1.0.0", "v2.0.0"]);

    // Stable-first dedup keeps the first-arriving version in the flat list.
    let flat = result
        .dependencies
        .iter()
        .find(|d| d.name == "github.com/x/y")
        .unwrap();
    assert_eq!(flat.version, "v1.0.0");

    // At most one flat record per (type, name) key.
    let count = result
        .dependencies
        .iter()
        .filter(|d| d.name == "github.com/x/y")
        .count();
    assert_eq!(count, 1);
    assert_eq!(result.metadata.conflicts_found, 1);
    assert_eq!(result.metadata.total_dependencies, result.dependencies.len());
}

#[tokio::test]
async fn depth_zero_reports_no_conflicts() {
    let cache = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();
    let proj = divergent_fixture(root.path());

    let (result, _) = walker(&cache)
        .scan(proj.to_str().unwrap(), ScanOptions::default())
        .await
        .unwrap();

    // The sibling module is never entered, so only one version is seen.
    assert!(result.conflicts.is_empty());
    assert!(result.dependencies.iter().all(|d| d.depth == 0));
}

#[tokio::test]
async fn conflicts_only_consider_emitted_records() {
    let cache = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();
    let proj = divergent_fixture(root.path());

    // Filter out the sibling's declaration entirely: the surviving
    // records carry a single version, so no conflict may be reported.
    let (result, _) = walker(&cache)
        .scan(
            proj.to_str().unwrap(),
            ScanOptions {
                max_depth: 1,
                filter: FilterSet::parse("!example.com/*").unwrap(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    // example.com/s was filtered, its subtree pruned, v2.0.0 never seen.
    assert!(result.conflicts.is_empty());
    let flat = result
        .dependencies
        .iter()
        .find(|d| d.name == "github.com/x/y")
        .unwrap();
    assert_eq!(flat.version, "v1.0.0");
}

#[tokio::test]
async fn same_version_twice_is_not_a_conflict() {
    let cache = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();
    let proj = root.path().join("proj");
    let sib = root.path().join("sib");
    std::fs::create_dir_all(&proj).unwrap();
    std::fs::create_dir_all(&sib).unwrap();
    write_file(
        &proj,
        "go.mod",
        "module m\nrequire (\n\tgithub.com/x/y v1.0.0\n\texample.com/s v0.1.0\n)\nreplace example.com/s => ../sib\n",
    );
    write_file(&sib, "go.mod", "module sib\nrequire github.com/x/y v1.0.0\n");

    let (result, _) = walker(&cache)
        .scan(
            proj.to_str().unwrap(),
            ScanOptions {
                max_depth: 1,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(result.conflicts.is_empty());
}
