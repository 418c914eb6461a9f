//! File set backed by a retrieved directory.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use super::FileSet;
use crate::errors::FileSetError;

/// Exposes the regular files directly inside a directory.
#[derive(Debug, Clone)]
pub struct DirectoryFileSet {
    root: PathBuf,
}

impl DirectoryFileSet {
    /// Opens a directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, FileSetError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(FileSetError::unreadable(
                root.display().to_string(),
                "not a directory",
            ));
        }
        Ok(Self { root })
    }

    /// Returns the directory path.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl FileSet for DirectoryFileSet {
    fn names(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.root) else {
            tracing::warn!(root = %self.root.display(), "Retrieved directory is not listable");
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        names.sort();
        names
    }

    fn read(&self, name: &str) -> Result<Cow<'_, str>, FileSetError> {
        match std::fs::read_to_string(self.root.join(name)) {
            Ok(content) => Ok(Cow::Owned(content)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(FileSetError::not_found(name))
            }
            Err(err) => Err(FileSetError::unreadable(name, err.to_string())),
        }
    }

    fn contains(&self, name: &str) -> bool {
        self.root.join(name).is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_directory_listing_and_read() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("case.scf"), ":ENE  : ********** TOTAL ENERGY IN Ry =  -1.0\n").unwrap();
        fs::write(dir.path().join("lapw1.error"), "").unwrap();
        fs::create_dir(dir.path().join("subdir")).unwrap();

        let files = DirectoryFileSet::open(dir.path()).unwrap();
        assert_eq!(files.names(), vec!["case.scf", "lapw1.error"]);
        assert!(files.contains("case.scf"));
        assert!(!files.contains("subdir"));
        assert!(files.read("case.scf").unwrap().contains("TOTAL ENERGY"));
    }

    #[test]
    fn test_directory_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let files = DirectoryFileSet::open(dir.path()).unwrap();
        assert!(matches!(
            files.read("case.dayfile"),
            Err(FileSetError::NotFound { .. })
        ));
    }

    #[test]
    fn test_open_rejects_non_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain");
        fs::write(&path, "x").unwrap();
        assert!(DirectoryFileSet::open(&path).is_err());
    }
}
