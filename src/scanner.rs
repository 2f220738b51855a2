//! Walks a project boundary's directory tree and classifies each candidate
//! file against the store's last-known record, using `ignore::WalkBuilder`
//! so `.gitignore` rules apply without reimplementing them.

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use ignore::WalkBuilder;

use crate::error::{IndexError, IndexResult};
use crate::hash::content_hash;
use crate::model::FileRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileChange {
    /// Not present in the store, or content hash differs from the stored
    /// record (mtime alone is not trusted; see `classify`).
    Changed { rel_path: String },
    /// Present in the store with a matching content hash; skipped entirely.
    Unchanged { rel_path: String },
    /// Present in the store but missing from disk.
    Deleted { rel_path: String },
}

pub struct FileScanner {
    extensions: Vec<String>,
    ignore_patterns: Vec<String>,
}

impl FileScanner {
    pub fn new(extensions: Vec<String>, ignore_patterns: Vec<String>) -> Self {
        Self {
            extensions,
            ignore_patterns,
        }
    }

    fn has_tracked_extension(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        self.extensions.iter().any(|ext| name.ends_with(ext.as_str()))
    }

    /// Walks `directory` (gitignore-aware, plus the configured extra ignore
    /// patterns) and returns every candidate file's path relative to
    /// `directory`, sorted for deterministic ordering.
    pub fn walk(&self, directory: &Path) -> IndexResult<Vec<String>> {
        let mut builder = WalkBuilder::new(directory);
        builder.hidden(false).git_ignore(true).git_global(true).git_exclude(true);

        let mut overrides = ignore::overrides::OverrideBuilder::new(directory);
        for pattern in &self.ignore_patterns {
            let negated = format!("!{pattern}");
            overrides.add(&negated).map_err(|e| IndexError::Config(e.to_string()))?;
        }
        builder.overrides(overrides.build().map_err(|e| IndexError::Config(e.to_string()))?);

        let mut paths = Vec::new();
        for entry in builder.build() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(_) => continue,
            };
            if entry.file_type().is_some_and(|t| t.is_file()) && self.has_tracked_extension(entry.path()) {
                if let Ok(rel) = entry.path().strip_prefix(directory) {
                    paths.push(rel.to_string_lossy().replace('\\', "/"));
                }
            }
        }
        paths.sort();
        Ok(paths)
    }

    /// Compares the files present under `directory` against `known`
    /// (the store's current records for this project) and classifies each
    /// into changed, unchanged, or deleted.
    pub fn classify(
        &self,
        directory: &Path,
        known: &[FileRecord],
    ) -> IndexResult<Vec<FileChange>> {
        let on_disk = self.walk(directory)?;
        let known_by_path: std::collections::HashMap<&str, &FileRecord> =
            known.iter().map(|f| (f.rel_path.as_str(), f)).collect();

        let mut changes = Vec::new();
        let mut seen = std::collections::HashSet::new();

        for rel_path in &on_disk {
            seen.insert(rel_path.clone());
            let full_path = directory.join(rel_path);

            // Stat equality is authoritative before hashing: unmodified
            // trees rescan in O(N) stats with no file reads at all.
            if let (Some(record), Ok((mtime_ms, size_bytes))) =
                (known_by_path.get(rel_path.as_str()), Self::stat(&full_path))
            {
                if record.mtime_ms == mtime_ms && record.size_bytes == size_bytes {
                    changes.push(FileChange::Unchanged { rel_path: rel_path.clone() });
                    continue;
                }
            }

            let Ok(bytes) = std::fs::read(&full_path) else {
                continue;
            };
            match known_by_path.get(rel_path.as_str()) {
                Some(record) if record.content_hash == content_hash(&bytes) => {
                    changes.push(FileChange::Unchanged {
                        rel_path: rel_path.clone(),
                    });
                }
                _ => {
                    changes.push(FileChange::Changed {
                        rel_path: rel_path.clone(),
                    });
                }
            }
        }

        for record in known {
            if !seen.contains(&record.rel_path) {
                changes.push(FileChange::Deleted {
                    rel_path: record.rel_path.clone(),
                });
            }
        }

        Ok(changes)
    }

    pub fn stat(full_path: &Path) -> IndexResult<(i64, i64)> {
        let metadata = std::fs::metadata(full_path).map_err(|source| IndexError::Io {
            path: full_path.to_path_buf(),
            source,
        })?;
        let mtime_ms = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        Ok((mtime_ms, metadata.len() as i64))
    }
}

pub fn to_full_path(directory: &Path, rel_path: &str) -> PathBuf {
    directory.join(rel_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn scanner() -> FileScanner {
        FileScanner::new(vec![".ts".into()], vec!["dist/**".into()])
    }

    #[test]
    fn walk_finds_tracked_extensions_only() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.ts"), "export const a = 1;").unwrap();
        fs::write(dir.path().join("a.md"), "# notes").unwrap();

        let found = scanner().walk(dir.path()).unwrap();
        assert_eq!(found, vec!["a.ts".to_string()]);
    }

    #[test]
    fn walk_respects_extra_ignore_patterns() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("dist")).unwrap();
        fs::write(dir.path().join("dist/out.ts"), "export {}").unwrap();
        fs::write(dir.path().join("keep.ts"), "export {}").unwrap();

        let found = scanner().walk(dir.path()).unwrap();
        assert_eq!(found, vec!["keep.ts".to_string()]);
    }

    #[test]
    fn classify_detects_changed_unchanged_and_deleted() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.ts"), "export const a = 1;").unwrap();
        fs::write(dir.path().join("b.ts"), "export const b = 2;").unwrap();

        let known = vec![
            FileRecord {
                project: "app".into(),
                rel_path: "a.ts".into(),
                content_hash: content_hash(b"export const a = 1;"),
                mtime_ms: 0,
                size_bytes: 0,
                last_indexed_at_ms: 0,
            },
            FileRecord {
                project: "app".into(),
                rel_path: "gone.ts".into(),
                content_hash: "x".into(),
                mtime_ms: 0,
                size_bytes: 0,
                last_indexed_at_ms: 0,
            },
        ];

        let mut changes = scanner().classify(dir.path(), &known).unwrap();
        changes.sort_by(|a, b| format!("{a:?}").cmp(&format!("{b:?}")));

        assert!(changes.contains(&FileChange::Unchanged { rel_path: "a.ts".into() }));
        assert!(changes.contains(&FileChange::Changed { rel_path: "b.ts".into() }));
        assert!(changes.contains(&FileChange::Deleted { rel_path: "gone.ts".into() }));
    }
}
