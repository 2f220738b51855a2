//! The embedded relational store: one SQLite database per workspace at
//! `<project_root>/.codetrace/index.sqlite3`, opened in WAL mode so readers
//! never block behind a writer's transaction.
//!
//! There is exactly one storage backend, so unlike the parser seam in
//! [`crate::parsing`] this module exposes a concrete type rather than a
//! trait: a `Store` trait with no second implementation would only add
//! indirection.

mod ownership;
mod schema;

pub use ownership::OwnershipArbiter;

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};

use crate::error::{IndexError, IndexResult};
use crate::model::{FileRecord, ProjectBoundary, Relation, RelationEndpoint, Symbol};
use crate::types::{RelationKind, SymbolKind, Span};

#[derive(Debug, Clone, Copy, Default)]
pub struct StoreStats {
    pub project_count: u64,
    pub file_count: u64,
    pub symbol_count: u64,
    pub relation_count: u64,
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl SqliteStore {
    /// Open (creating if absent) the database at `path`, applying schema
    /// migrations and WAL mode.
    pub fn open(path: impl AsRef<Path>) -> IndexResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| IndexError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.pragma_update(None, "busy_timeout", 5000i64)?;
        conn.execute_batch(schema::SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Checkpoints the WAL back into the main database file. Called as the
    /// last step of a graceful session close; the connection itself closes
    /// on drop once every `Arc<SqliteStore>` clone is gone.
    pub fn close(&self) -> IndexResult<()> {
        let conn = self.conn.lock();
        conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        Ok(())
    }

    /// Run `f` inside a single transaction, committing on `Ok` and rolling
    /// back on `Err`. This is the only suspension point writers pass
    /// through; readers never observe a partially written transaction
    /// thanks to WAL snapshot isolation.
    pub fn transaction<T>(
        &self,
        f: impl FnOnce(&rusqlite::Transaction) -> IndexResult<T>,
    ) -> IndexResult<T> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    pub fn upsert_project_boundary(&self, boundary: &ProjectBoundary) -> IndexResult<()> {
        self.conn.lock().execute(
            "INSERT INTO project_boundary (name, directory) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET directory = excluded.directory",
            params![boundary.name, boundary.directory],
        )?;
        Ok(())
    }

    pub fn list_project_boundaries(&self) -> IndexResult<Vec<ProjectBoundary>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT name, directory FROM project_boundary ORDER BY name")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ProjectBoundary {
                    name: row.get(0)?,
                    directory: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn get_file(&self, project: &str, rel_path: &str) -> IndexResult<Option<FileRecord>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT project, rel_path, content_hash, mtime_ms, size_bytes, last_indexed_at_ms
             FROM file WHERE project = ?1 AND rel_path = ?2",
            params![project, rel_path],
            Self::row_to_file,
        )
        .optional()
        .map_err(IndexError::from)
    }

    pub fn list_files(&self, project: Option<&str>) -> IndexResult<Vec<FileRecord>> {
        let conn = self.conn.lock();
        let mut stmt = match project {
            Some(_) => conn.prepare(
                "SELECT project, rel_path, content_hash, mtime_ms, size_bytes, last_indexed_at_ms
                 FROM file WHERE project = ?1 ORDER BY rel_path",
            )?,
            None => conn.prepare(
                "SELECT project, rel_path, content_hash, mtime_ms, size_bytes, last_indexed_at_ms
                 FROM file ORDER BY project, rel_path",
            )?,
        };
        let rows = match project {
            Some(p) => stmt.query_map(params![p], Self::row_to_file)?.collect::<Result<Vec<_>, _>>()?,
            None => stmt.query_map([], Self::row_to_file)?.collect::<Result<Vec<_>, _>>()?,
        };
        Ok(rows)
    }

    fn row_to_file(row: &rusqlite::Row) -> rusqlite::Result<FileRecord> {
        Ok(FileRecord {
            project: row.get(0)?,
            rel_path: row.get(1)?,
            content_hash: row.get(2)?,
            mtime_ms: row.get(3)?,
            size_bytes: row.get(4)?,
            last_indexed_at_ms: row.get(5)?,
        })
    }

    pub fn upsert_file(&self, tx: &rusqlite::Transaction, file: &FileRecord) -> IndexResult<()> {
        tx.execute(
            "INSERT INTO file (project, rel_path, content_hash, mtime_ms, size_bytes, last_indexed_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(project, rel_path) DO UPDATE SET
                content_hash = excluded.content_hash,
                mtime_ms = excluded.mtime_ms,
                size_bytes = excluded.size_bytes,
                last_indexed_at_ms = excluded.last_indexed_at_ms",
            params![
                file.project,
                file.rel_path,
                file.content_hash,
                file.mtime_ms,
                file.size_bytes,
                file.last_indexed_at_ms,
            ],
        )?;
        Ok(())
    }

    /// Deletes the file row, cascading to its symbols and relations it owns
    /// (foreign keys with `ON DELETE CASCADE`; see `schema.rs`).
    pub fn delete_file(&self, tx: &rusqlite::Transaction, project: &str, rel_path: &str) -> IndexResult<()> {
        tx.execute(
            "DELETE FROM file WHERE project = ?1 AND rel_path = ?2",
            params![project, rel_path],
        )?;
        Ok(())
    }

    pub fn replace_file_symbols(
        &self,
        tx: &rusqlite::Transaction,
        project: &str,
        rel_path: &str,
        symbols: &[Symbol],
    ) -> IndexResult<()> {
        tx.execute(
            "DELETE FROM symbol WHERE project = ?1 AND rel_path = ?2",
            params![project, rel_path],
        )?;
        for symbol in symbols {
            tx.execute(
                "INSERT INTO symbol (
                    project, rel_path, qualified_name, kind,
                    start_line, start_column, end_line, end_column,
                    exported, signature, signature_summary, fingerprint, detail
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    symbol.project,
                    symbol.rel_path,
                    symbol.qualified_name,
                    symbol.kind.as_str(),
                    symbol.span.start_line,
                    symbol.span.start_column,
                    symbol.span.end_line,
                    symbol.span.end_column,
                    symbol.exported,
                    symbol.signature,
                    symbol.signature_summary,
                    symbol.fingerprint,
                    symbol.detail.to_string(),
                ],
            )?;
        }
        Ok(())
    }

    pub fn replace_file_relations(
        &self,
        tx: &rusqlite::Transaction,
        project: &str,
        rel_path: &str,
        relations: &[Relation],
    ) -> IndexResult<()> {
        tx.execute(
            "DELETE FROM relation WHERE src_project = ?1 AND src_rel_path = ?2",
            params![project, rel_path],
        )?;
        for relation in relations {
            tx.execute(
                "INSERT INTO relation (
                    kind,
                    src_project, src_rel_path, src_qualified_name,
                    dst_project, dst_rel_path, dst_qualified_name,
                    metadata
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    relation.kind.as_str(),
                    relation.src.project,
                    relation.src.rel_path,
                    relation.src.qualified_name,
                    relation.dst.project,
                    relation.dst.rel_path,
                    relation.dst.qualified_name,
                    relation.metadata.to_string(),
                ],
            )?;
        }
        Ok(())
    }

    pub fn symbols_for_file(&self, project: &str, rel_path: &str) -> IndexResult<Vec<Symbol>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT project, rel_path, qualified_name, kind, start_line, start_column,
                    end_line, end_column, exported, signature, signature_summary, fingerprint, detail
             FROM symbol WHERE project = ?1 AND rel_path = ?2 ORDER BY start_line, start_column",
        )?;
        let rows = stmt
            .query_map(params![project, rel_path], Self::row_to_symbol)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn find_symbol(&self, project: &str, qualified_name: &str) -> IndexResult<Option<Symbol>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT project, rel_path, qualified_name, kind, start_line, start_column,
                    end_line, end_column, exported, signature, signature_summary, fingerprint, detail
             FROM symbol WHERE project = ?1 AND qualified_name = ?2",
            params![project, qualified_name],
            Self::row_to_symbol,
        )
        .optional()
        .map_err(IndexError::from)
    }

    /// Symbols sharing `fingerprint` within `project`, the sole lookup the
    /// move tracker uses to match a deleted symbol to its new location.
    pub fn find_symbols_by_fingerprint(&self, project: &str, fingerprint: &str) -> IndexResult<Vec<Symbol>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT project, rel_path, qualified_name, kind, start_line, start_column,
                    end_line, end_column, exported, signature, signature_summary, fingerprint, detail
             FROM symbol WHERE project = ?1 AND fingerprint = ?2",
        )?;
        let rows = stmt
            .query_map(params![project, fingerprint], Self::row_to_symbol)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Every symbol currently in the store, across all projects. Used as the
    /// before/after snapshot for a full reindex's changed-symbols diff.
    pub fn all_symbols(&self) -> IndexResult<Vec<Symbol>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT project, rel_path, qualified_name, kind, start_line, start_column,
                    end_line, end_column, exported, signature, signature_summary, fingerprint, detail
             FROM symbol",
        )?;
        let rows = stmt.query_map([], Self::row_to_symbol)?.collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn row_to_symbol(row: &rusqlite::Row) -> rusqlite::Result<Symbol> {
        let kind: String = row.get(3)?;
        let detail: String = row.get(12)?;
        Ok(Symbol {
            project: row.get(0)?,
            rel_path: row.get(1)?,
            qualified_name: row.get(2)?,
            kind: SymbolKind::from_str(&kind).unwrap_or(SymbolKind::Variable),
            span: Span::new(row.get(4)?, row.get(5)?, row.get(6)?, row.get(7)?),
            exported: row.get(8)?,
            signature: row.get(9)?,
            signature_summary: row.get(10)?,
            fingerprint: row.get(11)?,
            detail: serde_json::from_str(&detail).unwrap_or(serde_json::Value::Null),
        })
    }

    pub fn relations_from_file(&self, project: &str, rel_path: &str) -> IndexResult<Vec<Relation>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT kind, src_project, src_rel_path, src_qualified_name,
                    dst_project, dst_rel_path, dst_qualified_name, metadata
             FROM relation WHERE src_project = ?1 AND src_rel_path = ?2",
        )?;
        let rows = stmt
            .query_map(params![project, rel_path], Self::row_to_relation)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn relations_to_file(&self, project: &str, rel_path: &str) -> IndexResult<Vec<Relation>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT kind, src_project, src_rel_path, src_qualified_name,
                    dst_project, dst_rel_path, dst_qualified_name, metadata
             FROM relation WHERE dst_project = ?1 AND dst_rel_path = ?2",
        )?;
        let rows = stmt
            .query_map(params![project, rel_path], Self::row_to_relation)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn all_relations(&self) -> IndexResult<Vec<Relation>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT kind, src_project, src_rel_path, src_qualified_name,
                    dst_project, dst_rel_path, dst_qualified_name, metadata
             FROM relation",
        )?;
        let rows = stmt.query_map([], Self::row_to_relation)?.collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Rewrites every relation endpoint matching `old` to `new`. Used by the
    /// move tracker when a file is renamed: relations pointing at the old
    /// location are retargeted rather than dropped and re-discovered.
    pub fn retarget_relations(
        &self,
        tx: &rusqlite::Transaction,
        old: &RelationEndpoint,
        new: &RelationEndpoint,
    ) -> IndexResult<usize> {
        let src_updated = tx.execute(
            "UPDATE relation SET src_project = ?1, src_rel_path = ?2, src_qualified_name = ?3
             WHERE src_project = ?4 AND src_rel_path = ?5
               AND src_qualified_name IS ?6",
            params![
                new.project,
                new.rel_path,
                new.qualified_name,
                old.project,
                old.rel_path,
                old.qualified_name,
            ],
        )?;
        let dst_updated = tx.execute(
            "UPDATE relation SET dst_project = ?1, dst_rel_path = ?2, dst_qualified_name = ?3
             WHERE dst_project = ?4 AND dst_rel_path = ?5
               AND dst_qualified_name IS ?6",
            params![
                new.project,
                new.rel_path,
                new.qualified_name,
                old.project,
                old.rel_path,
                old.qualified_name,
            ],
        )?;
        Ok(src_updated + dst_updated)
    }

    fn row_to_relation(row: &rusqlite::Row) -> rusqlite::Result<Relation> {
        let kind: String = row.get(0)?;
        let metadata: String = row.get(7)?;
        Ok(Relation {
            kind: RelationKind::from_str(&kind).unwrap_or(RelationKind::References),
            src: RelationEndpoint {
                project: row.get(1)?,
                rel_path: row.get(2)?,
                qualified_name: row.get(3)?,
            },
            dst: RelationEndpoint {
                project: row.get(4)?,
                rel_path: row.get(5)?,
                qualified_name: row.get(6)?,
            },
            metadata: serde_json::from_str(&metadata).unwrap_or(serde_json::Value::Null),
        })
    }

    /// Stats scoped to a single project boundary, the `getStats(project)`
    /// entry of the store contract.
    pub fn stats_for_project(&self, project: &str) -> IndexResult<StoreStats> {
        let conn = self.conn.lock();
        let file_count: u64 =
            conn.query_row("SELECT COUNT(*) FROM file WHERE project = ?1", params![project], |r| r.get(0))?;
        let symbol_count: u64 =
            conn.query_row("SELECT COUNT(*) FROM symbol WHERE project = ?1", params![project], |r| r.get(0))?;
        let relation_count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM relation WHERE src_project = ?1",
            params![project],
            |r| r.get(0),
        )?;
        Ok(StoreStats {
            project_count: 1,
            file_count,
            symbol_count,
            relation_count,
        })
    }

    pub fn stats(&self) -> IndexResult<StoreStats> {
        let conn = self.conn.lock();
        let project_count: u64 = conn.query_row("SELECT COUNT(*) FROM project_boundary", [], |r| r.get(0))?;
        let file_count: u64 = conn.query_row("SELECT COUNT(*) FROM file", [], |r| r.get(0))?;
        let symbol_count: u64 = conn.query_row("SELECT COUNT(*) FROM symbol", [], |r| r.get(0))?;
        let relation_count: u64 = conn.query_row("SELECT COUNT(*) FROM relation", [], |r| r.get(0))?;
        Ok(StoreStats {
            project_count,
            file_count,
            symbol_count,
            relation_count,
        })
    }
}
