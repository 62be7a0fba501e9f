//! Helpers for sanitizing data before it enters logs, span attributes or
//! the slip record.
//!
//! Client-supplied names are never trusted for storage paths, and absolute
//! upload paths are kept out of traces.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;

/// Longest display name kept for an uploaded file.
const MAX_DISPLAY_NAME: usize = 255;

/// Returns only the filename component of a path (no directory).
///
/// Safe for span fields: shows the file name, never the full path.
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Returns a short deterministic hash of a path for correlation without
/// exposing the actual path.
pub fn hash_path(path: &Path) -> String {
    let mut hasher = DefaultHasher::new();
    path.hash(&mut hasher);
    let hash = hasher.finish();
    format!("{:016x}", hash)
}

/// Reduces a client-supplied filename to a display name.
///
/// Keeps the last path component (either separator style), strips control
/// characters and truncates. Falls back to `"upload"` when nothing is left.
pub fn display_filename(raw: &str) -> String {
    let last = raw.rsplit(['/', '\\']).next().unwrap_or(raw);
    let cleaned: String = last
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_DISPLAY_NAME)
        .collect();
    let cleaned = cleaned.trim();

    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_redact_path_returns_filename() {
        assert_eq!(
            redact_path(Path::new("/srv/moneymate/uploads/3f2a.jpg")),
            "3f2a.jpg"
        );
    }

    #[test]
    fn test_redact_path_no_filename() {
        assert_eq!(redact_path(Path::new("/")), "<unknown>");
    }

    #[test]
    fn test_hash_path_deterministic() {
        let path = PathBuf::from("/srv/uploads/a.png");
        let h1 = hash_path(&path);
        let h2 = hash_path(&path);
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 16);
    }

    #[test]
    fn test_hash_path_different_paths_differ() {
        assert_ne!(hash_path(Path::new("/a/b")), hash_path(Path::new("/c/d")));
    }

    #[test]
    fn test_display_filename_strips_directories() {
        assert_eq!(display_filename("../../etc/passwd"), "passwd");
        assert_eq!(display_filename("C:\\Users\\me\\slip.png"), "slip.png");
        assert_eq!(display_filename("receipt.jpg"), "receipt.jpg");
    }

    #[test]
    fn test_display_filename_fallbacks() {
        assert_eq!(display_filename(""), "upload");
        assert_eq!(display_filename("dir/"), "upload");
        assert_eq!(display_filename(".."), "upload");
        assert_eq!(display_filename("a\u{0}b\n.jpg"), "ab.jpg");
    }

    #[test]
    fn test_display_filename_truncates() {
        let long = "x".repeat(400);
        assert_eq!(display_filename(&long).len(), 255);
    }
}
