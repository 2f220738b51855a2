//! Applies a processed file's symbols and relations to the store as a
//! single transaction: upsert the file row, replace its symbols, replace
//! its relations. Deletion likewise happens in one transaction so a crash
//! mid-write never leaves orphaned symbol/relation rows. Both are the
//! per-file write path used by incremental runs; a full reindex instead
//! wholesale-replaces every row across all files in one larger transaction
//! (`coordinator::run_full`) rather than going file-by-file through here.

use crate::error::IndexResult;
use crate::processor::ProcessedFile;
use crate::store::SqliteStore;

pub struct RepositoryWriter<'s> {
    store: &'s SqliteStore,
}

impl<'s> RepositoryWriter<'s> {
    pub fn new(store: &'s SqliteStore) -> Self {
        Self { store }
    }

    pub fn apply(&self, processed: &ProcessedFile) -> IndexResult<()> {
        self.store.transaction(|tx| {
            self.store.upsert_file(tx, &processed.file)?;
            self.store.replace_file_symbols(
                tx,
                &processed.file.project,
                &processed.file.rel_path,
                &processed.symbols,
            )?;
            self.store.replace_file_relations(
                tx,
                &processed.file.project,
                &processed.file.rel_path,
                &processed.relations,
            )?;
            Ok(())
        })
    }

    /// Deletes a file, cascading to its symbols and owned relations, in one
    /// transaction. Retargeting relations onto a file's new location after a
    /// rename is `move_tracker::retarget_moved_symbols`'s job, run once per
    /// index run across every deleted file rather than per delete here,
    /// since the new location isn't known until the whole batch of changes
    /// has been matched by fingerprint.
    pub fn delete(&self, project: &str, rel_path: &str) -> IndexResult<()> {
        self.store.transaction(|tx| self.store.delete_file(tx, project, rel_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FileRecord, Symbol};
    use crate::types::{Span, SymbolKind};
    use tempfile::TempDir;

    fn processed(rel_path: &str) -> ProcessedFile {
        ProcessedFile {
            file: FileRecord {
                project: "app".into(),
                rel_path: rel_path.into(),
                content_hash: "0000000000000000".into(),
                mtime_ms: 1,
                size_bytes: 1,
                last_indexed_at_ms: 1,
            },
            symbols: vec![Symbol {
                project: "app".into(),
                rel_path: rel_path.into(),
                qualified_name: "foo".into(),
                kind: SymbolKind::Function,
                span: Span::new(1, 0, 1, 1),
                exported: true,
                signature: String::new(),
                signature_summary: "params:0|async:0".into(),
                fingerprint: "aaaaaaaaaaaaaaaa".into(),
                detail: serde_json::Value::Null,
            }],
            relations: Vec::new(),
        }
    }

    #[test]
    fn apply_then_delete_removes_symbols() {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::open(dir.path().join("index.sqlite3")).unwrap();
        let writer = RepositoryWriter::new(&store);

        writer.apply(&processed("a.ts")).unwrap();
        assert_eq!(store.symbols_for_file("app", "a.ts").unwrap().len(), 1);

        writer.delete("app", "a.ts").unwrap();
        assert!(store.get_file("app", "a.ts").unwrap().is_none());
        assert_eq!(store.symbols_for_file("app", "a.ts").unwrap().len(), 0);
    }
}
