//! Turns one file's bytes into symbols and relations ready for the writer:
//! runs the language parser, then rewrites relative import specifiers and
//! tsconfig path aliases into paths relative to the project root.

use std::path::Path;
use std::sync::Arc;

use crate::error::{IndexError, IndexResult};
use crate::hash::content_hash;
use crate::model::{FileRecord, Relation};
use crate::parsing::LanguageParser;
use crate::tsconfig::TsconfigCache;

pub struct FileProcessor {
    parsers: Vec<Box<dyn LanguageParser>>,
    tsconfig: Arc<TsconfigCache>,
}

pub struct ProcessedFile {
    pub file: FileRecord,
    pub symbols: Vec<crate::model::Symbol>,
    pub relations: Vec<Relation>,
}

impl FileProcessor {
    pub fn new(parsers: Vec<Box<dyn LanguageParser>>, tsconfig: Arc<TsconfigCache>) -> Self {
        Self { parsers, tsconfig }
    }

    pub fn tsconfig_cache(&self) -> &TsconfigCache {
        &self.tsconfig
    }

    /// Reads, hashes, parses, and path-resolves `rel_path` under
    /// `project_directory`. Returns `Err(UnsupportedExtension)` if no
    /// registered parser claims the file's extension.
    ///
    /// `known_files` is the full-reindex allow-list: when present, a
    /// resolved import/re-export relation is kept only if its
    /// `"project::relPath"` key appears in it. `None` keeps every resolved
    /// relation, which is what incremental runs want (the target may simply
    /// not have been touched this run).
    pub fn process(
        &self,
        project: &str,
        project_directory: &Path,
        rel_path: &str,
        known_files: Option<&std::collections::HashSet<String>>,
    ) -> IndexResult<ProcessedFile> {
        let full_path = project_directory.join(rel_path);
        let bytes = std::fs::read(&full_path).map_err(|source| IndexError::Io {
            path: full_path.clone(),
            source,
        })?;
        let source = String::from_utf8_lossy(&bytes).into_owned();

        let extension = extension_of(rel_path).ok_or_else(|| IndexError::UnsupportedExtension(rel_path.into()))?;
        let parser = crate::parsing::parser_for(&extension, &self.parsers)
            .ok_or(IndexError::UnsupportedExtension(extension))?;

        let mut extracted = parser.parse_file(project, rel_path, &source)?;
        extracted.relations = self.resolve_relation_targets(project_directory, rel_path, extracted.relations);

        if let Some(known_files) = known_files {
            extracted.relations.retain(|relation| {
                if !matches!(relation.kind, crate::types::RelationKind::Imports | crate::types::RelationKind::ReExports) {
                    return true;
                }
                if relation.dst.rel_path.is_empty() || !relation.dst.rel_path.contains('/') && !relation.dst.rel_path.contains('.') {
                    // Looks like a bare package specifier (no alias/relative path
                    // resolved it), not an internal file; never filtered out.
                    return true;
                }
                known_files.contains(&format!("{}::{}", relation.dst.project, relation.dst.rel_path))
            });
        }

        let (mtime_ms, size_bytes) = crate::scanner::FileScanner::stat(&full_path)?;
        let file = FileRecord {
            project: project.to_string(),
            rel_path: rel_path.to_string(),
            content_hash: content_hash(&bytes),
            mtime_ms,
            size_bytes,
            last_indexed_at_ms: mtime_ms,
        };

        Ok(ProcessedFile {
            file,
            symbols: extracted.symbols,
            relations: extracted.relations,
        })
    }

    /// Rewrites `imports`/`re-exports` relation targets (currently raw
    /// specifier text in `dst.rel_path`) into paths relative to the
    /// project root: resolves `./`/`../` relative specifiers against the
    /// importing file's directory, and tsconfig path aliases via the
    /// cache. Bare package specifiers (no matching alias) are left as-is;
    /// the dependency graph treats unresolved targets as external. A
    /// relative specifier that normalizes to outside the project root
    /// (more `..` segments than the importing file has ancestors) is
    /// dropped per the contract in spec.md §4.3(c) rather than kept with a
    /// bogus in-root-looking path.
    fn resolve_relation_targets(&self, project_directory: &Path, rel_path: &str, relations: Vec<Relation>) -> Vec<Relation> {
        let resolved_aliases = self.tsconfig.get(project_directory);
        let importing_dir = Path::new(rel_path).parent().unwrap_or_else(|| Path::new(""));

        relations
            .into_iter()
            .filter_map(|mut relation| {
                if !matches!(relation.kind, crate::types::RelationKind::Imports | crate::types::RelationKind::ReExports) {
                    return Some(relation);
                }
                let specifier = relation.dst.rel_path.clone();
                if specifier.starts_with('.') {
                    let joined = importing_dir.join(&specifier);
                    match normalize_path(&joined.to_string_lossy()) {
                        Some(normalized) => relation.dst.rel_path = normalized,
                        None => return None,
                    }
                } else if let Some(aliased) = resolved_aliases.resolve_alias(&specifier) {
                    relation.dst.rel_path = aliased;
                }
                Some(relation)
            })
            .collect()
    }
}

fn extension_of(rel_path: &str) -> Option<String> {
    let name = rel_path.rsplit('/').next()?;
    let dot = name.find('.')?;
    Some(name[dot..].to_string())
}

/// Collapses `.`/`..` segments in a joined relative path, without touching
/// the filesystem. Returns `None` if a `..` segment would pop past the
/// root (the joined path escapes the project directory), so the caller can
/// drop the relation instead of resolving it to a plausible-looking but
/// wrong in-root path.
fn normalize_path(path: &str) -> Option<String> {
    let mut stack: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if stack.pop().is_none() {
                    return None;
                }
            }
            other => stack.push(other),
        }
    }
    Some(stack.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn processor() -> FileProcessor {
        FileProcessor::new(
            vec![Box::new(crate::parsing::TypeScriptParser::new())],
            Arc::new(TsconfigCache::new()),
        )
    }

    #[test]
    fn process_resolves_relative_import_against_importing_directory() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("src/widgets")).unwrap();
        fs::write(
            dir.path().join("src/widgets/button.ts"),
            "import { helper } from \"../util\";\n",
        )
        .unwrap();

        let result = processor().process("app", dir.path(), "src/widgets/button.ts", None).unwrap();
        let relation = &result.relations[0];
        assert_eq!(relation.dst.rel_path, "src/util");
    }

    #[test]
    fn known_files_allow_list_drops_imports_to_files_outside_it() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(
            dir.path().join("src/a.ts"),
            "import { helper } from \"./util\";\n",
        )
        .unwrap();

        let mut known = std::collections::HashSet::new();
        known.insert("app::src/a.ts".to_string());
        let result = processor().process("app", dir.path(), "src/a.ts", Some(&known)).unwrap();
        assert!(result.relations.is_empty());

        known.insert("app::src/util".to_string());
        let result = processor().process("app", dir.path(), "src/a.ts", Some(&known)).unwrap();
        assert_eq!(result.relations.len(), 1);
    }

    #[test]
    fn process_rejects_unknown_extension() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("readme.md"), "# hi").unwrap();
        assert!(processor().process("app", dir.path(), "readme.md", None).is_err());
    }

    #[test]
    fn normalize_path_collapses_parent_segments() {
        assert_eq!(normalize_path("src/widgets/../util"), Some("src/util".to_string()));
        assert_eq!(normalize_path("./src/./a"), Some("src/a".to_string()));
    }

    #[test]
    fn normalize_path_rejects_paths_escaping_the_root() {
        assert_eq!(normalize_path("../outside"), None);
        assert_eq!(normalize_path("src/../../outside"), None);
    }

    #[test]
    fn process_drops_relations_escaping_the_project_root() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("a.ts"),
            "import { helper } from \"../../../outside\";\n",
        )
        .unwrap();

        let result = processor().process("app", dir.path(), "a.ts", None).unwrap();
        assert!(result.relations.is_empty());
    }
}
