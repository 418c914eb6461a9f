//! In-memory file set.

use std::borrow::Cow;
use std::collections::BTreeMap;

use super::FileSet;
use crate::errors::FileSetError;

/// A file set held entirely in memory.
///
/// This is what the execution collaborator hands back after a step, and
/// what tests build fixtures with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryFileSet {
    files: BTreeMap<String, String>,
}

impl MemoryFileSet {
    /// Creates an empty file set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file.
    #[must_use]
    pub fn with_file(mut self, name: impl Into<String>, content: impl Into<String>) -> Self {
        self.insert(name, content);
        self
    }

    /// Adds or replaces a file.
    pub fn insert(&mut self, name: impl Into<String>, content: impl Into<String>) {
        self.files.insert(name.into(), content.into());
    }

    /// Removes a file, returning its content.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.files.remove(name)
    }

    /// Copies every file of `other` into this set.
    pub fn extend(&mut self, other: &Self) {
        for (name, content) in &other.files {
            self.files.insert(name.clone(), content.clone());
        }
    }

    /// Returns the number of files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Returns true if the set has no files.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FileSet for MemoryFileSet {
    fn names(&self) -> Vec<String> {
        self.files.keys().cloned().collect()
    }

    fn read(&self, name: &str) -> Result<Cow<'_, str>, FileSetError> {
        self.files
            .get(name)
            .map(|content| Cow::Borrowed(content.as_str()))
            .ok_or_else(|| FileSetError::not_found(name))
    }

    fn contains(&self, name: &str) -> bool {
        self.files.contains_key(name)
    }
}

impl<K, V> FromIterator<(K, V)> for MemoryFileSet
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            files: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
