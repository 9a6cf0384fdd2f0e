//! Build the `PATH` handed to launched processes.
//!
//! User overrides come first so they can shadow system tools, but the bundle
//! and system directories are always appended so a broken override cannot
//! stop Sage from finding its own binaries.

use std::collections::HashSet;
use std::path::Path;

/// Separator between entries of a `PATH`-style string.
pub const PATH_SEPARATOR: char = ':';

/// System directories that must always be searchable.
const SYSTEM_PATHS: &[&str] = &["/bin", "/usr/bin", "/usr/local/bin", "/Library/TeX/texbin"];

/// Split `user_path`, drop empty segments, append `required`, and remove
/// duplicates keeping each entry's first occurrence.
pub fn build_search_path<S: AsRef<str>>(user_path: &str, required: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    user_path
        .split(PATH_SEPARATOR)
        .filter(|entry| !entry.is_empty())
        .chain(required.iter().map(|entry| entry.as_ref()))
        .filter(|entry| seen.insert(*entry))
        .map(String::from)
        .collect()
}

/// Join entries back into a `PATH` string.
pub fn join_search_path(entries: &[String]) -> String {
    let separator = PATH_SEPARATOR.to_string();
    entries.join(separator.as_str())
}

/// Required entries for a bundle reachable through `link`
/// (`/var/tmp/sage-<version>-current`).
pub fn required_paths(link: &Path) -> Vec<String> {
    let mut paths = vec![
        link.join("local").join("bin").display().to_string(),
        link.join("venv").join("bin").display().to_string(),
    ];
    paths.extend(SYSTEM_PATHS.iter().map(|p| p.to_string()));
    paths
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        let result = build_search_path("/a:/b:/a", &["/a", "/c"]);
        assert_eq!(result, vec!["/a", "/b", "/c"]);
    }

    #[test]
    fn test_empty_segments_dropped() {
        let result = build_search_path("::/opt/bin::", &["/bin"]);
        assert_eq!(result, vec!["/opt/bin", "/bin"]);
    }

    #[test]
    fn test_empty_user_path() {
        let result = build_search_path("", &["/bin", "/usr/bin", "/bin"]);
        assert_eq!(result, vec!["/bin", "/usr/bin"]);
    }

    #[test]
    fn test_every_required_entry_present() {
        let required = ["/x", "/y", "/z"];
        let result = build_search_path("/y:/q", &required);
        for entry in required {
            assert!(result.iter().any(|p| p == entry), "missing {}", entry);
        }
        assert_eq!(result, vec!["/y", "/q", "/x", "/z"]);
    }

    #[test]
    fn test_required_paths_layout() {
        let paths = required_paths(Path::new("/var/tmp/sage-10.4-current"));
        assert_eq!(paths[0], "/var/tmp/sage-10.4-current/local/bin");
        assert_eq!(paths[1], "/var/tmp/sage-10.4-current/venv/bin");
        assert_eq!(paths.last().map(String::as_str), Some("/Library/TeX/texbin"));
    }

    #[test]
    fn test_join() {
        let entries = build_search_path("/a", &["/b"]);
        assert_eq!(join_search_path(&entries), "/a:/b");
    }
}
