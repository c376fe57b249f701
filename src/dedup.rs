//! Concurrency-safe identifier set shared by the tasks of one search.

use parking_lot::Mutex;
use std::collections::HashSet;

/// Set of record ids already selected as matches.
///
/// Every operation takes the inner lock, so membership checks and inserts from
/// concurrent permutation tasks are serialized.
#[derive(Debug, Default)]
pub struct DedupSet {
    ids: Mutex<HashSet<String>>,
}

impl DedupSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.lock().contains(id)
    }

    /// Insert `id`. Inserting an id twice is a no-op.
    pub fn add(&self, id: &str) {
        let mut ids = self.ids.lock();
        if !ids.contains(id) {
            ids.insert(id.to_string());
        }
    }

    /// Atomically insert `id` if it is absent and fewer than `limit` ids are
    /// selected. Returns true if this call selected it.
    pub fn select(&self, id: &str, limit: usize) -> bool {
        let mut ids = self.ids.lock();
        if ids.len() >= limit || ids.contains(id) {
            return false;
        }
        ids.insert(id.to_string())
    }

    pub fn len(&self) -> usize {
        self.ids.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
