//! Keyed cache of the most recently built [`DependencyGraph`] per scope.
//! Invalidated wholesale on every `on_indexed` emission — both the owner's
//! coordinator and a promoted reader's must call [`GraphCache::invalidate`]
//! from the same hook, so a stale graph never survives a reindex.
//!
//! Uses `parking_lot::RwLock` for interior mutability rather than the
//! stdlib lock, matching its use everywhere else synchronous state needs
//! guarding without crossing an await point.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::IndexResult;
use crate::graph::{DependencyGraph, GraphScope};
use crate::store::SqliteStore;

#[derive(Default)]
pub struct GraphCache {
    entries: RwLock<HashMap<String, Arc<DependencyGraph>>>,
}

impl GraphCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached graph for `scope` if present, otherwise builds,
    /// caches, and returns a fresh one.
    pub fn get_or_build(&self, store: &SqliteStore, scope: GraphScope) -> IndexResult<Arc<DependencyGraph>> {
        let key = scope.cache_key();
        if let Some(graph) = self.entries.read().get(&key) {
            return Ok(graph.clone());
        }

        let graph = Arc::new(DependencyGraph::build(store, scope)?);
        self.entries.write().insert(key, graph.clone());
        Ok(graph)
    }

    /// Drops every cached graph. Called once per completed index run.
    pub fn invalidate(&self) {
        self.entries.write().clear();
    }
}
