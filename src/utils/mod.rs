//! Small cross-cutting helpers.

/// Determines if a given URL/path is a local filesystem path rather
/// than a remote repository reference.
///
/// # Examples
///
/// ```rust
/// use depscan_cli::utils::is_local_path;
///
/// assert!(is_local_path("/absolute/path"));
/// assert!(is_local_path("./relative/path"));
/// assert!(is_local_path("../up/one"));
/// assert!(is_local_path("C:\\windows\\path"));
///
/// assert!(!is_local_path("github.com/org/repo"));
/// assert!(!is_local_path("https://github.com/org/repo"));
/// ```
#[must_use]
pub fn is_local_path(path: &str) -> bool {
    path.starts_with('/')
        || path.starts_with("./")
        || path.starts_with("../")
        || (path.len() >= 2
            && path.as_bytes()[1] == b':'
            && path.as_bytes()[0].is_ascii_alphabetic())
}

/// Formats a byte count for humans.
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_path_shapes() {
        assert!(is_local_path("/abs"));
        assert!(is_local_path("./rel"));
        assert!(is_local_path("../up"));
        assert!(is_local_path("C:\\win"));
        assert!(!is_local_path("github.com/org/repo"));
        assert!(!is_local_path("https://github.com/org/repo"));
    }

    #[test]
    fn byte_formatting() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KiB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MiB");
    }
}
