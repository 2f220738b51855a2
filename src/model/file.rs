use serde::{Deserialize, Serialize};

/// A single indexed source file within a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub project: String,
    /// Path relative to the project's `ProjectBoundary.directory`.
    pub rel_path: String,
    /// 16 hex digit content hash, see [`crate::hash::content_hash`].
    pub content_hash: String,
    /// Modification time in epoch milliseconds, as reported by the
    /// filesystem at the time of the last successful index.
    pub mtime_ms: i64,
    pub size_bytes: i64,
    pub last_indexed_at_ms: i64,
}
