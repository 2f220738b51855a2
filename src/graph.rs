//! The file-to-file import graph, built from persisted `imports` relations
//! on top of `petgraph::DiGraph`: BFS traversal, `Direction::Incoming` for
//! reverse edges, `tarjan_scc` for cycle detection, and a from-scratch
//! Johnson's elementary-circuit search for enumerating cycle paths, since
//! petgraph has no built-in enumerator for that.

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::Direction;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::error::IndexResult;
use crate::store::SqliteStore;
use crate::types::RelationKind;

/// Which relations feed the graph: a single project's `imports` edges, or
/// every project's, node-qualified so cross-project edges don't collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GraphScope {
    Project(String),
    Cross,
}

impl GraphScope {
    pub fn cache_key(&self) -> String {
        match self {
            GraphScope::Project(name) => name.clone(),
            GraphScope::Cross => "__cross__".to_string(),
        }
    }
}

/// A file-to-file import graph for one [`GraphScope`]. Built once per
/// [`crate::session::Session`] query needing it and cached by
/// [`crate::graph_cache::GraphCache`]; rebuilt whenever the index changes.
pub struct DependencyGraph {
    graph: DiGraph<String, ()>,
    index: HashMap<String, NodeIndex>,
    scope: GraphScope,
}

impl DependencyGraph {
    /// Loads every `imports` relation in scope and populates the adjacency
    /// list. A file that only appears as a destination still becomes a
    /// node with no outbound edges, so `get_dependents` on a leaf dependency
    /// isn't silently empty just because it was never a source.
    pub fn build(store: &SqliteStore, scope: GraphScope) -> IndexResult<Self> {
        let relations = store.all_relations()?;
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();

        for relation in &relations {
            if relation.kind != RelationKind::Imports {
                continue;
            }

            let (src_key, dst_key) = match &scope {
                GraphScope::Project(project) => {
                    if &relation.src.project != project || &relation.dst.project != project {
                        continue;
                    }
                    (relation.src.rel_path.clone(), relation.dst.rel_path.clone())
                }
                GraphScope::Cross => (
                    format!("{}::{}", relation.src.project, relation.src.rel_path),
                    format!("{}::{}", relation.dst.project, relation.dst.rel_path),
                ),
            };

            let src = ensure_node(&mut graph, &mut index, src_key);
            let dst = ensure_node(&mut graph, &mut index, dst_key);
            graph.update_edge(src, dst, ());
        }

        Ok(Self { graph, index, scope })
    }

    pub fn scope(&self) -> &GraphScope {
        &self.scope
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Every node's key, in no particular order; read-only view for callers
    /// (the session defensively copies this on the way out to the caller).
    pub fn node_keys(&self) -> Vec<String> {
        self.graph.node_weights().cloned().collect()
    }

    pub fn get_dependencies(&self, file: &str) -> Vec<String> {
        let Some(&idx) = self.index.get(file) else {
            return Vec::new();
        };
        self.graph
            .neighbors_directed(idx, Direction::Outgoing)
            .map(|n| self.graph[n].clone())
            .collect()
    }

    pub fn get_dependents(&self, file: &str) -> Vec<String> {
        let Some(&idx) = self.index.get(file) else {
            return Vec::new();
        };
        self.graph
            .neighbors_directed(idx, Direction::Incoming)
            .map(|n| self.graph[n].clone())
            .collect()
    }

    /// Forward BFS from `file`, excluding `file` itself.
    pub fn get_transitive_dependencies(&self, file: &str) -> Vec<String> {
        let Some(&start) = self.index.get(file) else {
            return Vec::new();
        };
        let mut visited = HashSet::new();
        visited.insert(start);
        let mut queue = VecDeque::from([start]);
        let mut result = Vec::new();

        while let Some(node) = queue.pop_front() {
            for next in self.graph.neighbors_directed(node, Direction::Outgoing) {
                if visited.insert(next) {
                    result.push(self.graph[next].clone());
                    queue.push_back(next);
                }
            }
        }
        result
    }

    /// Reverse BFS from every seed in `files`; the union of everything that
    /// transitively depends on one of them, excluding the seeds.
    pub fn get_affected_by_change(&self, files: &[String]) -> Vec<String> {
        let seeds: HashSet<NodeIndex> = files.iter().filter_map(|f| self.index.get(f).copied()).collect();
        let mut visited = seeds.clone();
        let mut queue: VecDeque<NodeIndex> = seeds.into_iter().collect();
        let mut result = Vec::new();

        while let Some(node) = queue.pop_front() {
            for prev in self.graph.neighbors_directed(node, Direction::Incoming) {
                if visited.insert(prev) {
                    result.push(self.graph[prev].clone());
                    queue.push_back(prev);
                }
            }
        }
        result
    }

    /// Iterative DFS with three-colouring; returns on the first back-edge
    /// found, so it never visits more of the graph than necessary.
    pub fn has_cycle(&self) -> bool {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Color {
            White,
            Grey,
            Black,
        }

        let mut color = vec![Color::White; self.graph.node_bound()];
        for start in self.graph.node_indices() {
            if color[start.index()] != Color::White {
                continue;
            }

            let mut stack: Vec<(NodeIndex, std::vec::IntoIter<NodeIndex>)> = Vec::new();
            color[start.index()] = Color::Grey;
            stack.push((start, self.successors(start).into_iter()));

            while let Some((node, iter)) = stack.last_mut() {
                let node = *node;
                match iter.next() {
                    Some(next) => match color[next.index()] {
                        Color::White => {
                            color[next.index()] = Color::Grey;
                            stack.push((next, self.successors(next).into_iter()));
                        }
                        Color::Grey => return true,
                        Color::Black => {}
                    },
                    None => {
                        color[node.index()] = Color::Black;
                        stack.pop();
                    }
                }
            }
        }
        false
    }

    fn successors(&self, node: NodeIndex) -> Vec<NodeIndex> {
        self.graph.neighbors_directed(node, Direction::Outgoing).collect()
    }

    /// Every elementary cycle, each appearing exactly once in canonical
    /// (lexicographically-smallest-node-first) rotation. Finds non-trivial
    /// strongly-connected components first so Johnson's search never runs
    /// on acyclic parts of the graph; honours `max_cycles` by stopping as
    /// soon as that many distinct cycles have been found.
    pub fn get_cycle_paths(&self, max_cycles: Option<usize>) -> Vec<Vec<String>> {
        let mut seen: HashSet<Vec<NodeIndex>> = HashSet::new();
        let mut result = Vec::new();

        'outer: for scc in tarjan_scc(&self.graph) {
            let has_self_loop = scc.len() == 1 && self.graph.contains_edge(scc[0], scc[0]);
            if scc.len() < 2 && !has_self_loop {
                continue;
            }
            let component: HashSet<NodeIndex> = scc.iter().copied().collect();

            for &start in &scc {
                let mut johnson = Johnson::new(&self.graph);
                johnson.circuit(start, start, &component);

                for cycle in johnson.cycles {
                    let canonical = self.canonical_rotation(&cycle);
                    if seen.insert(canonical.clone()) {
                        result.push(canonical.iter().map(|n| self.graph[*n].clone()).collect());
                        if max_cycles.is_some_and(|max| seen.len() >= max) {
                            break 'outer;
                        }
                    }
                }
            }
        }
        result
    }

    fn canonical_rotation(&self, cycle: &[NodeIndex]) -> Vec<NodeIndex> {
        let min_pos = cycle
            .iter()
            .enumerate()
            .min_by_key(|(_, n)| &self.graph[**n])
            .map(|(i, _)| i)
            .unwrap_or(0);
        let mut rotated = cycle[min_pos..].to_vec();
        rotated.extend_from_slice(&cycle[..min_pos]);
        rotated
    }
}

fn ensure_node(graph: &mut DiGraph<String, ()>, index: &mut HashMap<String, NodeIndex>, key: String) -> NodeIndex {
    if let Some(&idx) = index.get(&key) {
        return idx;
    }
    let idx = graph.add_node(key.clone());
    index.insert(key, idx);
    idx
}

/// Johnson's elementary-circuit search, restricted to one strongly-connected
/// component. `blocked`/`b` are the algorithm's standard bookkeeping: a
/// blocked vertex won't be retried until something on its stack path
/// actually closes a cycle through it.
struct Johnson<'g> {
    graph: &'g DiGraph<String, ()>,
    blocked: HashSet<NodeIndex>,
    b: HashMap<NodeIndex, HashSet<NodeIndex>>,
    stack: Vec<NodeIndex>,
    cycles: Vec<Vec<NodeIndex>>,
}

impl<'g> Johnson<'g> {
    fn new(graph: &'g DiGraph<String, ()>) -> Self {
        Self {
            graph,
            blocked: HashSet::new(),
            b: HashMap::new(),
            stack: Vec::new(),
            cycles: Vec::new(),
        }
    }

    fn circuit(&mut self, v: NodeIndex, s: NodeIndex, component: &HashSet<NodeIndex>) -> bool {
        let mut found = false;
        self.stack.push(v);
        self.blocked.insert(v);

        let neighbors: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(v, Direction::Outgoing)
            .filter(|w| component.contains(w))
            .collect();

        for w in &neighbors {
            if *w == s {
                self.cycles.push(self.stack.clone());
                found = true;
            } else if !self.blocked.contains(w) && self.circuit(*w, s, component) {
                found = true;
            }
        }

        if found {
            self.unblock(v);
        } else {
            for w in neighbors {
                self.b.entry(w).or_default().insert(v);
            }
        }

        self.stack.pop();
        found
    }

    fn unblock(&mut self, u: NodeIndex) {
        self.blocked.remove(&u);
        if let Some(bu) = self.b.remove(&u) {
            for w in bu {
                if self.blocked.contains(&w) {
                    self.unblock(w);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FileRecord, Relation, RelationEndpoint};
    use tempfile::TempDir;

    fn open_store() -> (TempDir, SqliteStore) {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::open(dir.path().join("index.sqlite3")).unwrap();
        (dir, store)
    }

    fn file(project: &str, rel_path: &str) -> FileRecord {
        FileRecord {
            project: project.into(),
            rel_path: rel_path.into(),
            content_hash: "0".into(),
            mtime_ms: 0,
            size_bytes: 0,
            last_indexed_at_ms: 0,
        }
    }

    fn imports(project: &str, src: &str, dst: &str) -> Relation {
        Relation {
            kind: RelationKind::Imports,
            src: RelationEndpoint::file(project, src),
            dst: RelationEndpoint::file(project, dst),
            metadata: serde_json::Value::Null,
        }
    }

    #[test]
    fn simple_chain_has_no_cycle() {
        let (_dir, store) = open_store();
        store
            .transaction(|tx| {
                store.upsert_file(tx, &file("app", "a.ts"))?;
                store.upsert_file(tx, &file("app", "b.ts"))?;
                store.replace_file_relations(tx, "app", "b.ts", &[imports("app", "b.ts", "a.ts")])
            })
            .unwrap();

        let graph = DependencyGraph::build(&store, GraphScope::Project("app".into())).unwrap();
        assert_eq!(graph.get_dependencies("b.ts"), vec!["a.ts".to_string()]);
        assert_eq!(graph.get_dependents("a.ts"), vec!["b.ts".to_string()]);
        assert!(!graph.has_cycle());
        assert!(graph.get_cycle_paths(None).is_empty());
    }

    #[test]
    fn two_node_cycle_is_detected_once() {
        let (_dir, store) = open_store();
        store
            .transaction(|tx| {
                store.replace_file_relations(tx, "app", "a.ts", &[imports("app", "a.ts", "b.ts")])?;
                store.replace_file_relations(tx, "app", "b.ts", &[imports("app", "b.ts", "a.ts")])
            })
            .unwrap();

        let graph = DependencyGraph::build(&store, GraphScope::Project("app".into())).unwrap();
        assert!(graph.has_cycle());
        let cycles = graph.get_cycle_paths(None);
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0], vec!["a.ts".to_string(), "b.ts".to_string()]);
    }

    #[test]
    fn transitive_dependencies_and_affected_by_change() {
        let (_dir, store) = open_store();
        store
            .transaction(|tx| {
                store.replace_file_relations(tx, "app", "c.ts", &[imports("app", "c.ts", "b.ts")])?;
                store.replace_file_relations(tx, "app", "b.ts", &[imports("app", "b.ts", "a.ts")])
            })
            .unwrap();

        let graph = DependencyGraph::build(&store, GraphScope::Project("app".into())).unwrap();
        let mut transitive = graph.get_transitive_dependencies("c.ts");
        transitive.sort();
        assert_eq!(transitive, vec!["a.ts".to_string(), "b.ts".to_string()]);

        let mut affected = graph.get_affected_by_change(&["a.ts".to_string()]);
        affected.sort();
        assert_eq!(affected, vec!["b.ts".to_string(), "c.ts".to_string()]);
    }

    #[test]
    fn cross_project_scope_qualifies_node_keys() {
        let (_dir, store) = open_store();
        store
            .transaction(|tx| {
                store.replace_file_relations(
                    tx,
                    "app",
                    "a.ts",
                    &[Relation {
                        kind: RelationKind::Imports,
                        src: RelationEndpoint::file("app", "a.ts"),
                        dst: RelationEndpoint::file("lib", "index.ts"),
                        metadata: serde_json::Value::Null,
                    }],
                )
            })
            .unwrap();

        let graph = DependencyGraph::build(&store, GraphScope::Cross).unwrap();
        assert_eq!(graph.get_dependencies("app::a.ts"), vec!["lib::index.ts".to_string()]);
    }

    #[test]
    fn max_cycles_stops_early() {
        let (_dir, store) = open_store();
        store
            .transaction(|tx| {
                store.replace_file_relations(tx, "app", "a.ts", &[imports("app", "a.ts", "b.ts")])?;
                store.replace_file_relations(tx, "app", "b.ts", &[imports("app", "b.ts", "a.ts")])?;
                store.replace_file_relations(tx, "app", "c.ts", &[imports("app", "c.ts", "d.ts")])?;
                store.replace_file_relations(tx, "app", "d.ts", &[imports("app", "d.ts", "c.ts")])
            })
            .unwrap();

        let graph = DependencyGraph::build(&store, GraphScope::Project("app".into())).unwrap();
        let cycles = graph.get_cycle_paths(Some(1));
        assert_eq!(cycles.len(), 1);
    }
}
