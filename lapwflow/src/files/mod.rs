//! Read-only access to the files retrieved after a step runs.
//!
//! Parsers never touch the filesystem directly; they go through
//! [`FileSet`], which is implemented for in-memory snapshots and for a
//! retrieved directory on disk.

mod directory;
mod memory;

pub use directory::DirectoryFileSet;
pub use memory::MemoryFileSet;

use std::borrow::Cow;
use std::fmt::Debug;

use crate::errors::FileSetError;

/// A named collection of retrieved text files.
pub trait FileSet: Send + Sync + Debug {
    /// Returns every file name in the set, sorted.
    fn names(&self) -> Vec<String>;

    /// Reads one file as text.
    fn read(&self, name: &str) -> Result<Cow<'_, str>, FileSetError>;

    /// Returns true if `name` is part of the set.
    fn contains(&self, name: &str) -> bool {
        self.names().iter().any(|n| n == name)
    }

    /// Returns the names ending with `suffix`.
    fn names_with_suffix(&self, suffix: &str) -> Vec<String> {
        self.names()
            .into_iter()
            .filter(|n| n.ends_with(suffix))
            .collect()
    }

    /// Reads a file, treating absence as `None`.
    fn read_optional(&self, name: &str) -> Result<Option<Cow<'_, str>>, FileSetError> {
        match self.read(name) {
            Ok(content) => Ok(Some(content)),
            Err(FileSetError::NotFound { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }
}
