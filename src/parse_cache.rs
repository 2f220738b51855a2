//! Bounded, recency-ordered cache of parsed files, keyed by `(project,
//! rel_path)`. Backs the public `parse_source`/`get_parsed_ast` entry
//! points so repeated queries against an unchanged file skip re-parsing.
//!
//! Built on `indexmap::IndexMap` for its ordered, shift-evictable entries
//! rather than pulling in a dedicated `lru` crate: LRU eviction is rolled
//! on top directly (move-to-end on access, evict from the front once over
//! capacity).

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::parsing::ExtractedFile;

pub struct ParseCache {
    capacity: usize,
    entries: Mutex<IndexMap<(String, String), Arc<ExtractedFile>>>,
}

impl ParseCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(IndexMap::new()),
        }
    }

    pub fn get(&self, project: &str, rel_path: &str) -> Option<Arc<ExtractedFile>> {
        let mut entries = self.entries.lock();
        let key = (project.to_string(), rel_path.to_string());
        let value = entries.shift_remove(&key)?;
        entries.insert(key, value.clone());
        Some(value)
    }

    pub fn put(&self, project: &str, rel_path: &str, extracted: ExtractedFile) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries.lock();
        let key = (project.to_string(), rel_path.to_string());
        entries.shift_remove(&key);
        entries.insert(key, Arc::new(extracted));
        while entries.len() > self.capacity {
            entries.shift_remove_index(0);
        }
    }

    pub fn remove(&self, project: &str, rel_path: &str) {
        self.entries.lock().shift_remove(&(project.to_string(), rel_path.to_string()));
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_least_recently_used_entry_past_capacity() {
        let cache = ParseCache::new(2);
        cache.put("app", "a.ts", ExtractedFile::default());
        cache.put("app", "b.ts", ExtractedFile::default());
        cache.get("app", "a.ts");
        cache.put("app", "c.ts", ExtractedFile::default());

        assert!(cache.get("app", "a.ts").is_some());
        assert!(cache.get("app", "b.ts").is_none());
        assert!(cache.get("app", "c.ts").is_some());
    }

    #[test]
    fn zero_capacity_never_caches() {
        let cache = ParseCache::new(0);
        cache.put("app", "a.ts", ExtractedFile::default());
        assert_eq!(cache.len(), 0);
    }
}
