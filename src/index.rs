//! In-memory file index: normalized path -> last-known mtime (ms).
//!
//! One instance per watched root. The watcher owns the only write path;
//! resolvers read through owned snapshots. A batch is applied under a single
//! write lock, so a concurrent reader observes the pre- or post-batch state,
//! never a partial one.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug, Clone, Default)]
pub struct FileIndex {
    inner: Arc<RwLock<HashMap<String, u64>>>,
}

impl FileIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or refresh entries.
    pub fn upsert<I>(&self, entries: I)
    where
        I: IntoIterator<Item = (String, u64)>,
    {
        let mut map = self
            .inner
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        for (path, mtime) in entries {
            map.insert(path, mtime);
        }
    }

    /// Drop entries; unknown paths are ignored.
    pub fn remove<I>(&self, paths: I)
    where
        I: IntoIterator<Item = String>,
    {
        let mut map = self
            .inner
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        for path in paths {
            map.remove(&path);
        }
    }

    /// Apply one watcher batch atomically, additions first.
    pub fn apply_batch(&self, added: Vec<(String, u64)>, removed: Vec<String>) {
        let mut map = self
            .inner
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        for (path, mtime) in added {
            map.insert(path, mtime);
        }
        for path in removed {
            map.remove(&path);
        }
    }

    /// Owned, immutable view for one resolution pass.
    pub fn snapshot(&self) -> FileSnapshot {
        let map = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        FileSnapshot { files: map.clone() }
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Default)]
pub struct FileSnapshot {
    files: HashMap<String, u64>,
}

impl FileSnapshot {
    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    pub fn mtime(&self, path: &str) -> Option<u64> {
        self.files.get(path).copied()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn into_map(self) -> HashMap<String, u64> {
        self.files
    }
}
