//! Source parsing trait seam. There is one production implementation
//! ([`typescript::TypeScriptParser`]), but the `FileProcessor` depends only
//! on [`LanguageParser`] so tests can substitute a fake extractor without
//! touching tree-sitter.

mod typescript;

pub use typescript::TypeScriptParser;

use crate::error::IndexResult;
use crate::model::{Relation, Symbol};

/// Symbols and relations extracted from a single source file. Every
/// `Symbol.project`/`rel_path` and `Relation.src.project`/`rel_path` in the
/// result is expected to already carry the caller's `project`/`rel_path`.
#[derive(Debug, Clone, Default)]
pub struct ExtractedFile {
    pub symbols: Vec<Symbol>,
    pub relations: Vec<Relation>,
}

pub trait LanguageParser: Send + Sync {
    /// Extensions (with leading dot) this parser claims, e.g. `[".ts", ".tsx"]`.
    fn extensions(&self) -> &[&str];

    fn parse_file(&self, project: &str, rel_path: &str, source: &str) -> IndexResult<ExtractedFile>;
}

pub fn parser_for(extension: &str, parsers: &[Box<dyn LanguageParser>]) -> Option<&dyn LanguageParser> {
    parsers
        .iter()
        .find(|p| p.extensions().contains(&extension))
        .map(|p| p.as_ref())
}
