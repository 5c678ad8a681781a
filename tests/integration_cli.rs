//! CLI-level assertions against the built binary.

use assert_cmd::Command;
use predicates::prelude::*;
use serial_test::serial;
use tempfile::TempDir;

fn depscan() -> Command {
    Command::cargo_bin("depscan").expect("binary builds")
}

#[test]
fn scan_empty_directory_reports_zero() {
    let proj = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    depscan()
        .args([
            "scan",
            proj.path().to_str().unwrap(),
            "--cache-dir",
            cache.path().to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("0 dependencies"));
}

#[test]
fn scan_json_output_is_wire_shaped() {
    let proj = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    std::fs::write(
        proj.path().join("go.mod"),
        "module m\nrequire github.com/a/b v1.2.3\n",
    )
    .unwrap();

    let output = depscan()
        .args([
            "scan",
            proj.path().to_str().unwrap(),
            "--format",
            "json",
            "--cache-dir",
            cache.path().to_str().unwrap(),
        ])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(value["metadata"]["scanType"], "local");
    assert_eq!(value["metadata"]["totalDependencies"], 1);
    assert_eq!(value["dependencies"][0]["name"], "github.com/a/b");
    assert_eq!(value["dependencies"][0]["type"], "go");
    assert_eq!(value["dependencies"][0]["git"], "https://github.com/a/b");
}

#[test]
fn missing_root_fails_with_hint() {
    depscan()
        .args(["scan", "/definitely/not/here"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn invalid_filter_is_rejected() {
    let proj = TempDir::new().unwrap();
    depscan()
        .args(["scan", proj.path().to_str().unwrap(), "--filter", "[broken"])
        .assert()
        .failure();
}

#[test]
fn cache_dir_prints_configured_location() {
    let cache = TempDir::new().unwrap();
    depscan()
        .args(["cache", "dir", "--cache-dir", cache.path().to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains(cache.path().to_str().unwrap()));
}

#[test]
#[serial]
fn cache_dir_honours_environment_override() {
    let cache = TempDir::new().unwrap();
    depscan()
        .env("DEPSCAN_CACHE_DIR", cache.path())
        .args(["cache", "dir"])
        .assert()
        .success()
        .stdout(predicate::str::contains(cache.path().to_str().unwrap()));
}

#[test]
fn cache_clean_removes_the_root() {
    let cache = TempDir::new().unwrap();
    let marker = cache.path().join("github.com").join("org");
    std::fs::create_dir_all(&marker).unwrap();

    depscan()
        .args(["cache", "clean", "--cache-dir", cache.path().to_str().unwrap()])
        .assert()
        .success();
    assert!(!marker.exists());
}
