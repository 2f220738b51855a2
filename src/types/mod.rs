//! Core identity and value types shared across the index.

use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;

/// Identity of a symbol row. Never zero; zero is reserved as a sentinel for
/// "no symbol" in relation endpoints that may be file-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SymbolId(NonZeroU32);

impl SymbolId {
    pub fn new(value: u32) -> Option<Self> {
        NonZeroU32::new(value).map(Self)
    }

    pub fn value(&self) -> u32 {
        self.0.get()
    }
}

/// A source span: 1-based line numbers, 0-based columns, matching the data
/// model invariant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

impl Span {
    pub fn new(start_line: u32, start_column: u32, end_line: u32, end_column: u32) -> Self {
        Self {
            start_line,
            start_column,
            end_line,
            end_column,
        }
    }
}

/// Symbol kinds extracted from a TypeScript-family source tree. Members of
/// classes/interfaces/enums are stored as separate `Symbol` rows with
/// qualifiedName `"Parent.child"`, but still carry one of these kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SymbolKind {
    Function,
    Method,
    Class,
    Interface,
    Enum,
    EnumMember,
    TypeAlias,
    Variable,
    Constant,
    Property,
    Namespace,
}

impl SymbolKind {
    /// Stable lowercase identifier, used both for storage and fingerprinting.
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Function => "function",
            SymbolKind::Method => "method",
            SymbolKind::Class => "class",
            SymbolKind::Interface => "interface",
            SymbolKind::Enum => "enum",
            SymbolKind::EnumMember => "enum-member",
            SymbolKind::TypeAlias => "type-alias",
            SymbolKind::Variable => "variable",
            SymbolKind::Constant => "constant",
            SymbolKind::Property => "property",
            SymbolKind::Namespace => "namespace",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "function" => SymbolKind::Function,
            "method" => SymbolKind::Method,
            "class" => SymbolKind::Class,
            "interface" => SymbolKind::Interface,
            "enum" => SymbolKind::Enum,
            "enum-member" => SymbolKind::EnumMember,
            "type-alias" => SymbolKind::TypeAlias,
            "variable" => SymbolKind::Variable,
            "constant" => SymbolKind::Constant,
            "property" => SymbolKind::Property,
            "namespace" => SymbolKind::Namespace,
            _ => return None,
        })
    }

    /// Whether this kind is "callable" for the purposes of fingerprinting
    /// (`params:<N>|async:<0|1>` summaries only apply to these).
    pub fn is_callable(&self) -> bool {
        matches!(self, SymbolKind::Function | SymbolKind::Method)
    }
}

/// Relation kinds tracked between symbols/files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelationKind {
    Imports,
    Calls,
    Extends,
    Implements,
    ReExports,
    References,
}

impl RelationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationKind::Imports => "imports",
            RelationKind::Calls => "calls",
            RelationKind::Extends => "extends",
            RelationKind::Implements => "implements",
            RelationKind::ReExports => "re-exports",
            RelationKind::References => "references",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "imports" => RelationKind::Imports,
            "calls" => RelationKind::Calls,
            "extends" => RelationKind::Extends,
            "implements" => RelationKind::Implements,
            "re-exports" => RelationKind::ReExports,
            "references" => RelationKind::References,
            _ => return None,
        })
    }
}

/// The kind of change a filesystem watcher observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatcherEventKind {
    Create,
    Change,
    Delete,
}

/// One filesystem change, as delivered by the watcher to the coordinator.
/// `rel_path` is relative to the workspace root, forward-slash separated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatcherEvent {
    pub kind: WatcherEventKind,
    pub rel_path: String,
}

impl WatcherEvent {
    pub fn create(rel_path: impl Into<String>) -> Self {
        Self { kind: WatcherEventKind::Create, rel_path: rel_path.into() }
    }

    pub fn change(rel_path: impl Into<String>) -> Self {
        Self { kind: WatcherEventKind::Change, rel_path: rel_path.into() }
    }

    pub fn delete(rel_path: impl Into<String>) -> Self {
        Self { kind: WatcherEventKind::Delete, rel_path: rel_path.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_id_rejects_zero() {
        assert!(SymbolId::new(0).is_none());
        assert_eq!(SymbolId::new(7).unwrap().value(), 7);
    }

    #[test]
    fn symbol_kind_round_trips_through_str() {
        for kind in [
            SymbolKind::Function,
            SymbolKind::Method,
            SymbolKind::Class,
            SymbolKind::Interface,
            SymbolKind::Enum,
            SymbolKind::EnumMember,
            SymbolKind::TypeAlias,
            SymbolKind::Variable,
            SymbolKind::Constant,
            SymbolKind::Property,
            SymbolKind::Namespace,
        ] {
            assert_eq!(SymbolKind::from_str(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn relation_kind_round_trips_through_str() {
        for kind in [
            RelationKind::Imports,
            RelationKind::Calls,
            RelationKind::Extends,
            RelationKind::Implements,
            RelationKind::ReExports,
            RelationKind::References,
        ] {
            assert_eq!(RelationKind::from_str(kind.as_str()), Some(kind));
        }
    }
}
