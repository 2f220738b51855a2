use serde::{Deserialize, Serialize};

use crate::types::RelationKind;

/// One side of a [`Relation`]. File-level relations (e.g. `imports`,
/// `re-exports`) leave `qualified_name` empty; symbol-level relations
/// (`calls`, `extends`, `implements`, `references`) set it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationEndpoint {
    pub project: String,
    pub rel_path: String,
    pub qualified_name: Option<String>,
}

impl RelationEndpoint {
    pub fn file(project: impl Into<String>, rel_path: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            rel_path: rel_path.into(),
            qualified_name: None,
        }
    }

    pub fn symbol(
        project: impl Into<String>,
        rel_path: impl Into<String>,
        qualified_name: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            rel_path: rel_path.into(),
            qualified_name: Some(qualified_name.into()),
        }
    }
}

/// A directed edge between two [`RelationEndpoint`]s, owned by the file that
/// produced it (the source side). Identity is the ordered tuple
/// `(kind, src, dst)`; `metadata` carries extractor-specific extras (import
/// specifier text, call argument count, ...) and never participates in
/// identity or dedup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub kind: RelationKind,
    pub src: RelationEndpoint,
    pub dst: RelationEndpoint,
    pub metadata: serde_json::Value,
}

impl Relation {
    pub fn owning_file_project(&self) -> &str {
        &self.src.project
    }

    pub fn owning_file_rel_path(&self) -> &str {
        &self.src.rel_path
    }
}
