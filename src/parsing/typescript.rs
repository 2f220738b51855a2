//! TypeScript/TSX symbol and relation extraction, built on `tree-sitter` +
//! `tree-sitter-typescript`: one parser per extension, a thread-local
//! `tree_sitter::Parser` so rayon worker threads reuse theirs across files
//! instead of reallocating one per call.

use std::cell::RefCell;

use serde_json::json;
use tree_sitter::{Node, Parser, Tree};

use super::{ExtractedFile, LanguageParser};
use crate::error::{IndexError, IndexResult};
use crate::hash::symbol_fingerprint;
use crate::model::{Relation, RelationEndpoint, Symbol};
use crate::types::{RelationKind, Span, SymbolKind};

thread_local! {
    static PARSER: RefCell<Option<Parser>> = const { RefCell::new(None) };
}

pub struct TypeScriptParser {
    extensions: Vec<&'static str>,
}

impl TypeScriptParser {
    pub fn new() -> Self {
        Self {
            extensions: vec![".ts", ".tsx", ".mts", ".cts"],
        }
    }

    fn with_parser<T>(&self, is_tsx: bool, f: impl FnOnce(&mut Parser) -> T) -> T {
        PARSER.with(|cell| {
            let mut slot = cell.borrow_mut();
            let parser = slot.get_or_insert_with(Parser::new);
            let language = if is_tsx {
                tree_sitter_typescript::LANGUAGE_TSX.into()
            } else {
                tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()
            };
            parser
                .set_language(&language)
                .expect("tree-sitter-typescript grammar failed to load");
            f(parser)
        })
    }
}

impl Default for TypeScriptParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageParser for TypeScriptParser {
    fn extensions(&self) -> &[&str] {
        &self.extensions
    }

    fn parse_file(&self, project: &str, rel_path: &str, source: &str) -> IndexResult<ExtractedFile> {
        let is_tsx = rel_path.ends_with(".tsx");
        let tree = self
            .with_parser(is_tsx, |parser| parser.parse(source, None))
            .ok_or_else(|| IndexError::Parse {
                path: rel_path.into(),
                reason: "tree-sitter returned no tree".into(),
            })?;

        let mut ctx = ExtractionContext {
            project,
            rel_path,
            source,
            out: ExtractedFile::default(),
        };
        ctx.walk_top_level(&tree);
        ctx.walk_calls(&tree);
        Ok(ctx.out)
    }
}

struct ExtractionContext<'a> {
    project: &'a str,
    rel_path: &'a str,
    source: &'a str,
    out: ExtractedFile,
}

impl<'a> ExtractionContext<'a> {
    fn text(&self, node: Node) -> &'a str {
        node.utf8_text(self.source.as_bytes()).unwrap_or_default()
    }

    fn span(&self, node: Node) -> Span {
        let start = node.start_position();
        let end = node.end_position();
        Span::new(
            start.row as u32 + 1,
            start.column as u32,
            end.row as u32 + 1,
            end.column as u32,
        )
    }

    fn push_symbol(
        &mut self,
        qualified_name: String,
        kind: SymbolKind,
        node: Node,
        exported: bool,
        signature: String,
        signature_summary: String,
        detail: serde_json::Value,
    ) {
        let fingerprint = symbol_fingerprint(&qualified_name, kind.as_str(), &signature_summary);
        self.out.symbols.push(Symbol {
            project: self.project.to_string(),
            rel_path: self.rel_path.to_string(),
            qualified_name,
            kind,
            span: self.span(node),
            exported,
            signature,
            signature_summary,
            fingerprint,
            detail,
        });
    }

    fn push_relation(&mut self, kind: RelationKind, src_symbol: Option<String>, target_text: &str, meta: serde_json::Value) {
        self.out.relations.push(Relation {
            kind,
            src: RelationEndpoint {
                project: self.project.to_string(),
                rel_path: self.rel_path.to_string(),
                qualified_name: src_symbol,
            },
            dst: RelationEndpoint {
                project: self.project.to_string(),
                rel_path: target_text.to_string(),
                qualified_name: None,
            },
            metadata: meta,
        });
    }

    fn walk_top_level(&mut self, tree: &Tree) {
        let root = tree.root_node();
        let mut cursor = root.walk();
        for child in root.children(&mut cursor) {
            self.visit_statement(child, false);
        }
    }

    /// Visits a top-level (or export-wrapped) statement, dispatching on kind.
    fn visit_statement(&mut self, node: Node, exported: bool) {
        match node.kind() {
            "export_statement" => {
                let is_default = node
                    .children(&mut node.walk())
                    .any(|c| c.kind() == "default");
                if let Some(decl) = node.child_by_field_name("declaration") {
                    self.visit_statement(decl, true);
                } else if node.child_by_field_name("source").is_some() {
                    self.visit_reexport(node);
                } else if !is_default {
                    // `export { a, b }` with no declaration/source: named
                    // re-export of locally declared symbols. No relation to
                    // record; symbols already carry their own exported flag
                    // from their declaration site.
                }
            }
            "import_statement" => self.visit_import(node),
            "function_declaration" => self.visit_function(node, exported, None),
            "class_declaration" => self.visit_class(node, exported),
            "interface_declaration" => self.visit_interface(node, exported),
            "enum_declaration" => self.visit_enum(node, exported),
            "type_alias_declaration" => self.visit_type_alias(node, exported),
            "lexical_declaration" | "variable_statement" => self.visit_variables(node, exported),
            _ => {}
        }
    }

    fn visit_import(&mut self, node: Node) {
        if let Some(source) = node.child_by_field_name("source") {
            let specifier = self.text(source).trim_matches(|c| c == '"' || c == '\'').to_string();
            self.push_relation(RelationKind::Imports, None, &specifier, json!({ "specifier": specifier }));
        }
    }

    fn visit_reexport(&mut self, node: Node) {
        if let Some(source) = node.child_by_field_name("source") {
            let specifier = self.text(source).trim_matches(|c| c == '"' || c == '\'').to_string();
            self.push_relation(RelationKind::ReExports, None, &specifier, json!({ "specifier": specifier }));
        }
    }

    fn visit_function(&mut self, node: Node, exported: bool, parent: Option<&str>) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = self.text(name_node).to_string();
        let qualified_name = match parent {
            Some(p) => format!("{p}.{name}"),
            None => name,
        };
        let params = node.child_by_field_name("parameters");
        let param_count = params.map(count_params).unwrap_or(0);
        let is_async = node.children(&mut node.walk()).any(|c| c.kind() == "async");
        let signature = self.text(node.child_by_field_name("parameters").unwrap_or(node)).to_string();
        let signature_summary = format!("params:{param_count}|async:{}", is_async as u8);
        self.push_symbol(
            qualified_name,
            SymbolKind::Function,
            node,
            exported,
            signature,
            signature_summary,
            serde_json::Value::Null,
        );
    }

    fn visit_class(&mut self, node: Node, exported: bool) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = self.text(name_node).to_string();

        if let Some(heritage) = find_child_by_kind(node, "class_heritage") {
            self.visit_heritage(&name, heritage);
        }

        self.push_symbol(
            name.clone(),
            SymbolKind::Class,
            node,
            exported,
            String::new(),
            "members:0".into(),
            serde_json::Value::Null,
        );

        if let Some(body) = node.child_by_field_name("body") {
            self.visit_class_body(&name, body);
        }
    }

    fn visit_heritage(&mut self, class_name: &str, heritage: Node) {
        let mut cursor = heritage.walk();
        for clause in heritage.children(&mut cursor) {
            match clause.kind() {
                "extends_clause" => {
                    for target in clause.children(&mut clause.walk()) {
                        if target.kind() == "identifier" || target.kind() == "generic_type" {
                            let target_name = self.text(target).to_string();
                            self.push_relation(
                                RelationKind::Extends,
                                Some(class_name.to_string()),
                                &target_name,
                                serde_json::Value::Null,
                            );
                        }
                    }
                }
                "implements_clause" => {
                    for target in clause.children(&mut clause.walk()) {
                        if target.kind() == "type_identifier" || target.kind() == "generic_type" {
                            let target_name = self.text(target).to_string();
                            self.push_relation(
                                RelationKind::Implements,
                                Some(class_name.to_string()),
                                &target_name,
                                serde_json::Value::Null,
                            );
                        }
                    }
                }
                _ => {}
            }
        }
    }

    fn visit_class_body(&mut self, class_name: &str, body: Node) {
        let mut cursor = body.walk();
        for member in body.children(&mut cursor) {
            match member.kind() {
                "method_definition" => self.visit_function(member, false, Some(class_name)),
                "public_field_definition" | "property_identifier" => {
                    if let Some(name_node) = member.child_by_field_name("name") {
                        let name = self.text(name_node).to_string();
                        self.push_symbol(
                            format!("{class_name}.{name}"),
                            SymbolKind::Property,
                            member,
                            false,
                            String::new(),
                            "members:0".into(),
                            serde_json::Value::Null,
                        );
                    }
                }
                _ => {}
            }
        }
    }

    fn visit_interface(&mut self, node: Node, exported: bool) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = self.text(name_node).to_string();

        if let Some(heritage) = find_child_by_kind(node, "extends_type_clause") {
            for target in heritage.children(&mut heritage.walk()) {
                if target.kind() == "type_identifier" || target.kind() == "generic_type" {
                    let target_name = self.text(target).to_string();
                    self.push_relation(RelationKind::Extends, Some(name.clone()), &target_name, serde_json::Value::Null);
                }
            }
        }

        self.push_symbol(
            name.clone(),
            SymbolKind::Interface,
            node,
            exported,
            String::new(),
            "members:0".into(),
            serde_json::Value::Null,
        );

        if let Some(body) = node.child_by_field_name("body") {
            let mut cursor = body.walk();
            for member in body.children(&mut cursor) {
                if member.kind() == "property_signature" || member.kind() == "method_signature" {
                    if let Some(name_node) = member.child_by_field_name("name") {
                        let member_name = self.text(name_node).to_string();
                        let kind = if member.kind() == "method_signature" {
                            SymbolKind::Method
                        } else {
                            SymbolKind::Property
                        };
                        self.push_symbol(
                            format!("{name}.{member_name}"),
                            kind,
                            member,
                            false,
                            String::new(),
                            "members:0".into(),
                            serde_json::Value::Null,
                        );
                    }
                }
            }
        }
    }

    fn visit_enum(&mut self, node: Node, exported: bool) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = self.text(name_node).to_string();
        let body = node.child_by_field_name("body");
        let member_count = body.map(|b| {
            b.children(&mut b.walk())
                .filter(|c| c.kind() == "property_identifier" || c.kind() == "enum_assignment")
                .count()
        }).unwrap_or(0);

        self.push_symbol(
            name.clone(),
            SymbolKind::Enum,
            node,
            exported,
            String::new(),
            "members:0".into(),
            serde_json::json!({ "members": member_count }),
        );

        if let Some(body) = body {
            let mut cursor = body.walk();
            for member in body.children(&mut cursor) {
                let member_name_node = match member.kind() {
                    "property_identifier" => Some(member),
                    "enum_assignment" => member.child_by_field_name("name"),
                    _ => None,
                };
                if let Some(member_name_node) = member_name_node {
                    let member_name = self.text(member_name_node).to_string();
                    self.push_symbol(
                        format!("{name}.{member_name}"),
                        SymbolKind::EnumMember,
                        member,
                        false,
                        String::new(),
                        "members:0".into(),
                        serde_json::Value::Null,
                    );
                }
            }
        }
    }

    fn visit_type_alias(&mut self, node: Node, exported: bool) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = self.text(name_node).to_string();
        self.push_symbol(
            name,
            SymbolKind::TypeAlias,
            node,
            exported,
            String::new(),
            "members:0".into(),
            serde_json::Value::Null,
        );
    }

    fn visit_variables(&mut self, node: Node, exported: bool) {
        let is_const = node
            .children(&mut node.walk())
            .any(|c| c.kind() == "const");
        let mut cursor = node.walk();
        for declarator in node.children(&mut cursor) {
            if declarator.kind() != "variable_declarator" {
                continue;
            }
            let Some(name_node) = declarator.child_by_field_name("name") else {
                continue;
            };
            if name_node.kind() != "identifier" {
                continue;
            }
            let name = self.text(name_node).to_string();
            let kind = if is_const { SymbolKind::Constant } else { SymbolKind::Variable };
            self.push_symbol(
                name,
                kind,
                declarator,
                exported,
                String::new(),
                "members:0".into(),
                serde_json::Value::Null,
            );
        }
    }

    /// Second pass: find every `call_expression`, attributing it to the
    /// nearest enclosing named function/method (or the file's implicit
    /// top-level scope if none).
    fn walk_calls(&mut self, tree: &Tree) {
        let root = tree.root_node();
        self.walk_calls_from(root, None);
    }

    fn walk_calls_from(&mut self, node: Node, enclosing: Option<String>) {
        let next_enclosing = match node.kind() {
            "function_declaration" | "method_definition" | "arrow_function" | "function_expression" => {
                node.child_by_field_name("name")
                    .map(|n| self.text(n).to_string())
                    .or(enclosing.clone())
            }
            _ => enclosing.clone(),
        };

        if node.kind() == "call_expression" {
            if let Some(function) = node.child_by_field_name("function") {
                let callee = match function.kind() {
                    "identifier" => Some(self.text(function).to_string()),
                    "member_expression" => function
                        .child_by_field_name("property")
                        .map(|p| self.text(p).to_string()),
                    _ => None,
                };
                if let Some(callee) = callee {
                    self.push_relation(
                        RelationKind::Calls,
                        next_enclosing.clone(),
                        &callee,
                        serde_json::Value::Null,
                    );
                }
            }
        }

        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.walk_calls_from(child, next_enclosing.clone());
        }
    }
}

fn find_child_by_kind<'a>(node: Node<'a>, kind: &str) -> Option<Node<'a>> {
    node.children(&mut node.walk()).find(|c| c.kind() == kind)
}

fn count_params(params: Node) -> usize {
    params
        .children(&mut params.walk())
        .filter(|c| c.kind() != "(" && c.kind() != ")" && c.kind() != ",")
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_exported_function_with_param_count() {
        let parser = TypeScriptParser::new();
        let source = "export async function load(id: string): Promise<void> {}\n";
        let extracted = parser.parse_file("app", "a.ts", source).unwrap();
        let func = extracted
            .symbols
            .iter()
            .find(|s| s.qualified_name == "load")
            .expect("function symbol");
        assert_eq!(func.kind, SymbolKind::Function);
        assert!(func.exported);
        assert_eq!(func.signature_summary, "params:1|async:1");
    }

    #[test]
    fn extracts_class_with_heritage_and_methods() {
        let parser = TypeScriptParser::new();
        let source = "export class Widget extends Base implements Drawable {\n  render(): void {}\n}\n";
        let extracted = parser.parse_file("app", "widget.ts", source).unwrap();

        assert!(extracted.symbols.iter().any(|s| s.qualified_name == "Widget" && s.kind == SymbolKind::Class));
        assert!(extracted.symbols.iter().any(|s| s.qualified_name == "Widget.render" && s.kind == SymbolKind::Method));
        assert!(extracted
            .relations
            .iter()
            .any(|r| r.kind == RelationKind::Extends && r.dst.rel_path == "Base"));
        assert!(extracted
            .relations
            .iter()
            .any(|r| r.kind == RelationKind::Implements && r.dst.rel_path == "Drawable"));
    }

    #[test]
    fn extracts_import_relation() {
        let parser = TypeScriptParser::new();
        let source = "import { helper } from \"./util\";\n";
        let extracted = parser.parse_file("app", "a.ts", source).unwrap();
        assert!(extracted
            .relations
            .iter()
            .any(|r| r.kind == RelationKind::Imports && r.dst.rel_path == "./util"));
    }

    #[test]
    fn extracts_call_relation_from_enclosing_function() {
        let parser = TypeScriptParser::new();
        let source = "function outer() { inner(); }\n";
        let extracted = parser.parse_file("app", "a.ts", source).unwrap();
        assert!(extracted.relations.iter().any(|r| {
            r.kind == RelationKind::Calls
                && r.src.qualified_name.as_deref() == Some("outer")
                && r.dst.rel_path == "inner"
        }));
    }
}
