//! The result handed to every `on_indexed` subscriber and returned from
//! `full_index`/`incremental_index`: a summary of what one run did.

use serde::{Deserialize, Serialize};

use crate::types::SymbolKind;

/// One symbol's identity as it appears in a [`SymbolDiff`] bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedSymbol {
    pub name: String,
    pub file_path: String,
    pub kind: SymbolKind,
}

/// `(filePath, qualifiedName, kind)`-keyed diff between the symbols present
/// before and after a run. Best-effort: a full index computes this from a
/// snapshot taken before the run and the rows left after it, so a file
/// that's rewritten mid-run by something outside the coordinator can be
/// missing or misattributed here. It's an observability aid, not a store
/// invariant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolDiff {
    pub added: Vec<ChangedSymbol>,
    pub removed: Vec<ChangedSymbol>,
    pub modified: Vec<ChangedSymbol>,
}

impl SymbolDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }
}

/// The outcome of one full or incremental indexing run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexReport {
    pub indexed_files: u64,
    pub removed_files: u64,
    pub total_symbols: u64,
    pub total_relations: u64,
    pub duration_ms: u64,
    pub changed_files: Vec<String>,
    pub deleted_files: Vec<String>,
    pub failed_files: Vec<String>,
    pub changed_symbols: SymbolDiff,
}
