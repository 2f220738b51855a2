use serde::{Deserialize, Serialize};

/// A registered project boundary: a named subtree of the workspace rooted at
/// a directory containing a package manifest (`package.json`, `tsconfig.json`,
/// ...). Relative paths stored elsewhere in the index are always relative to
/// a `ProjectBoundary.directory`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectBoundary {
    /// Unique name within the workspace, derived from the manifest's
    /// `name` field when present, otherwise the directory's basename.
    pub name: String,

    /// Path to the project root, relative to the workspace root.
    pub directory: String,
}
