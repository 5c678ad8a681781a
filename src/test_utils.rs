//! Fixture helpers shared by unit and integration tests.

use std::path::{Path, PathBuf};

/// Writes `content` to `dir/name`, creating parent directories.
///
/// # Panics
///
/// Panics on I/O errors; fixtures failing to build should abort a test
/// immediately.
pub fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("failed to create fixture directory");
    }
    std::fs::write(&path, content).expect("failed to write fixture file");
    path
}

/// Builds a minimal Go module fixture directory.
pub fn write_go_module(dir: &Path, module: &str, requires: &[(&str, &str)]) -> PathBuf {
    let mut content = format!("module {module}\n\ngo 1.22\n\nrequire (\n");
    for (name, version) in requires {
        content.push_str(&format!("\t{name} {version}\n"));
    }
    content.push_str(")\n");
    write_file(dir, "go.mod", &content)
}

/// Builds a Helm chart fixture with a values file.
pub fn write_chart(dir: &Path, name: &str, values: &str) -> PathBuf {
    write_file(
        dir,
        "Chart.yaml",
        &format!("apiVersion: v2\nname: {name}\nversion: 0.1.0\n"),
    );
    write_file(dir, "values.yaml", values)
}
