use serde::{Deserialize, Serialize};

use crate::types::{SymbolKind, Span};

/// A named declaration extracted from a source file.
///
/// Members of classes/interfaces/enums are stored as their own `Symbol` with
/// `qualified_name` of the form `"Parent.child"`; there is no separate
/// containment table; qualified name prefixes carry that relationship.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    pub project: String,
    pub rel_path: String,
    /// Dotted path from the file's top level, e.g. `"Widget.render"`.
    pub qualified_name: String,
    pub kind: SymbolKind,
    pub span: Span,
    pub exported: bool,
    /// Rendered signature, e.g. `"(id: string, opts?: Options): Promise<void>"`.
    /// Empty for non-callable kinds.
    pub signature: String,
    /// `"params:<N>|async:<0|1>"` for callables; kind-specific summary
    /// otherwise (e.g. `"members:<N>"` for enums). Feeds the fingerprint.
    pub signature_summary: String,
    /// Stable across file moves/renames as long as name, kind, and
    /// signature summary are unchanged. See [`crate::hash::symbol_fingerprint`].
    pub fingerprint: String,
    /// Extractor-specific extras (JSDoc text, decorator names, type
    /// parameters, ...), opaque to the rest of the index.
    pub detail: serde_json::Value,
}

impl Symbol {
    pub fn parent_qualified_name(&self) -> Option<&str> {
        self.qualified_name.rfind('.').map(|i| &self.qualified_name[..i])
    }

    pub fn leaf_name(&self) -> &str {
        match self.qualified_name.rfind('.') {
            Some(i) => &self.qualified_name[i + 1..],
            None => &self.qualified_name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SymbolKind;

    fn sample(qualified_name: &str) -> Symbol {
        Symbol {
            project: "app".into(),
            rel_path: "src/widget.ts".into(),
            qualified_name: qualified_name.into(),
            kind: SymbolKind::Method,
            span: Span::new(1, 0, 1, 1),
            exported: true,
            signature: "(): void".into(),
            signature_summary: "params:0|async:0".into(),
            fingerprint: "deadbeefcafef00d".into(),
            detail: serde_json::Value::Null,
        }
    }

    #[test]
    fn parent_qualified_name_splits_on_last_dot() {
        let s = sample("Widget.render");
        assert_eq!(s.parent_qualified_name(), Some("Widget"));
        assert_eq!(s.leaf_name(), "render");
    }

    #[test]
    fn top_level_symbol_has_no_parent() {
        let s = sample("Widget");
        assert_eq!(s.parent_qualified_name(), None);
        assert_eq!(s.leaf_name(), "Widget");
    }
}
