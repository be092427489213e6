//! File utility functions for listing and filtering directory entries.

use std::fs;
use std::path::{Path, PathBuf};

/// Returns the regular files directly inside `dir`, sorted by file name.
///
/// Sub-directories and entries whose file name appears in `excluded` are
/// skipped. A missing path, a path that is not a directory, or an unreadable
/// directory all yield an empty list.
pub fn sorted_files(dir: &Path, excluded: &[&str]) -> Vec<PathBuf> {
    if !dir.is_dir() {
        return Vec::new();
    }

    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .filter(|e| {
            let name = e.file_name();
            let name = name.to_string_lossy();
            !excluded.contains(&name.as_ref())
        })
        .map(|e| e.path())
        .filter(|path| path.is_file())
        .collect();

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    files
}

/// Returns true if `dir` exists, is a directory, and contains at least one entry.
pub fn is_non_empty_dir(dir: &Path) -> bool {
    dir.is_dir()
        && fs::read_dir(dir)
            .map(|mut entries| entries.next().is_some())
            .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"x").unwrap();
    }

    #[test]
    fn test_sorted_files_orders_by_name() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "c.png");
        touch(tmp.path(), "a.png");
        touch(tmp.path(), "b.png");

        let names: Vec<String> = sorted_files(tmp.path(), &[])
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();

        assert_eq!(names, vec!["a.png", "b.png", "c.png"]);
    }

    #[test]
    fn test_sorted_files_skips_directories_and_excluded() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "a.png");
        touch(tmp.path(), "output");
        fs::create_dir(tmp.path().join("nested")).unwrap();

        let files = sorted_files(tmp.path(), &["output"]);
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("a.png"));
    }

    #[test]
    fn test_sorted_files_missing_dir() {
        let tmp = TempDir::new().unwrap();
        assert!(sorted_files(&tmp.path().join("absent"), &[]).is_empty());
    }

    #[test]
    fn test_sorted_files_on_regular_file() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "a.png");
        assert!(sorted_files(&tmp.path().join("a.png"), &[]).is_empty());
    }

    #[test]
    fn test_is_non_empty_dir() {
        let tmp = TempDir::new().unwrap();
        assert!(!is_non_empty_dir(tmp.path()));
        assert!(!is_non_empty_dir(&tmp.path().join("absent")));

        touch(tmp.path(), "a.png");
        assert!(is_non_empty_dir(tmp.path()));
        assert!(!is_non_empty_dir(&tmp.path().join("a.png")));
    }
}
