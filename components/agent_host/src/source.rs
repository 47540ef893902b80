//! Script source lookup.

use parking_lot::RwLock;
use std::collections::HashMap;

/// Supplies script source text by path.
///
/// Lookups happen on context threads, so implementations must be shareable.
pub trait SourceStore: Send + Sync {
    /// Returns the source stored at `path`, if any.
    fn read(&self, path: &str) -> Option<String>;
}

/// An in-memory [`SourceStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    files: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `source` at `path`, returning the previous source if there was
    /// one.
    pub fn write(&self, path: impl Into<String>, source: impl Into<String>) -> Option<String> {
        self.files.write().insert(path.into(), source.into())
    }

    /// Removes the source at `path`.
    pub fn remove(&self, path: &str) -> Option<String> {
        self.files.write().remove(path)
    }

    /// Number of stored sources.
    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty()
    }
}

impl SourceStore for MemoryStore {
    fn read(&self, path: &str) -> Option<String> {
        self.files.read().get(path).cloned()
    }
}
