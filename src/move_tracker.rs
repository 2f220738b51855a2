//! Detects file renames/moves by fingerprint rather than path: a symbol
//! that disappears from a deleted file and reappears, alone, under a
//! fingerprint match elsewhere is retargeted rather than left to rot as a
//! dangling relation.
//!
//! Runs only on incremental runs, after every changed file in the batch has
//! already been written: the snapshot of a to-be-deleted file's symbols is
//! taken before the deletion so the pre-image is available, then matched
//! against the store's post-image once the new file's symbols are in place.

use crate::error::IndexResult;
use crate::model::{RelationEndpoint, Symbol};
use crate::store::SqliteStore;

#[derive(Debug, Default, Clone, Copy)]
pub struct MoveTrackerStats {
    pub symbols_considered: usize,
    pub relations_retargeted: usize,
}

/// One file's symbols, captured immediately before `deleteFile` runs.
pub struct DeletedFileSnapshot {
    pub project: String,
    pub rel_path: String,
    pub symbols: Vec<Symbol>,
}

/// For every symbol in every snapshot, looks up `getByFingerprint(project,
/// fingerprint)` against the now-current store. A unique match elsewhere
/// retargets inbound/outbound relations from the old `(file, symbol)` to
/// the new one; an ambiguous match (more than one candidate, or the only
/// candidate being the original location) is left untouched.
pub fn retarget_moved_symbols(
    store: &SqliteStore,
    tx: &rusqlite::Transaction,
    snapshots: &[DeletedFileSnapshot],
) -> IndexResult<MoveTrackerStats> {
    let mut stats = MoveTrackerStats::default();

    for snapshot in snapshots {
        for symbol in &snapshot.symbols {
            if symbol.fingerprint.is_empty() {
                continue;
            }
            stats.symbols_considered += 1;

            let candidates = store.find_symbols_by_fingerprint(&snapshot.project, &symbol.fingerprint)?;
            let elsewhere: Vec<&Symbol> = candidates
                .iter()
                .filter(|c| c.rel_path != snapshot.rel_path || c.qualified_name != symbol.qualified_name)
                .collect();

            if let [new_location] = elsewhere.as_slice() {
                let old = RelationEndpoint::symbol(&snapshot.project, &snapshot.rel_path, &symbol.qualified_name);
                let new = RelationEndpoint::symbol(&snapshot.project, &new_location.rel_path, &new_location.qualified_name);
                stats.relations_retargeted += store.retarget_relations(tx, &old, &new)?;
            }
        }
    }

    Ok(stats)
}
