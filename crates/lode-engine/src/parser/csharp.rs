//! Semantic C# parser backed by tree-sitter.
//!
//! Unlike the regex tier, this parser produces fully-qualified names (via a
//! namespace/type scope stack), parent back references, modifier lists, and
//! the typed edge set: `Inherits`/`Implements` from base lists, `Calls`
//! from invocation expressions, `Returns` from method return types, and
//! `TypeOf` from parameter/property/field types. Primitive types never
//! produce edges.

use tree_sitter::Node;
use uuid::Uuid;

use lode_core::{EdgeKind, Language, ParsedFile, RawEdge, Span, Symbol, SymbolId, SymbolKind};

use super::{failed_parse, ParseContext, SourceParser};

/// Types that never become edge targets.
const PRIMITIVES: &[&str] = &[
    "bool", "byte", "char", "decimal", "double", "float", "int", "long", "nint", "nuint",
    "object", "sbyte", "short", "string", "uint", "ulong", "ushort", "var", "void",
];

pub struct CSharpParser;

impl CSharpParser {
    pub fn new() -> Self {
        Self
    }
}

impl SourceParser for CSharpParser {
    fn languages(&self) -> &[Language] {
        &[Language::CSharp]
    }

    fn parse(
        &self,
        ctx: &ParseContext<'_>,
        file_path: &str,
        _language: Language,
        source: &str,
    ) -> ParsedFile {
        let mut parser = tree_sitter::Parser::new();
        if let Err(e) = parser.set_language(&tree_sitter_c_sharp::LANGUAGE.into()) {
            return failed_parse(
                ctx,
                file_path,
                Language::CSharp,
                source,
                format!("failed to load C# grammar: {e}"),
            );
        }

        let Some(tree) = parser.parse(source, None) else {
            return failed_parse(
                ctx,
                file_path,
                Language::CSharp,
                source,
                "tree-sitter parse returned no tree".to_string(),
            );
        };

        let mut walker = Walker {
            ctx,
            file_path,
            source: source.as_bytes(),
            scope: Vec::new(),
            current_member: None,
            symbols: Vec::new(),
            edges: Vec::new(),
        };
        walker.walk(tree.root_node());
        walker.resolve_local_calls();

        ParsedFile {
            repo_id: ctx.repo_id,
            branch_name: ctx.branch_name.to_string(),
            commit_sha: ctx.commit_sha.to_string(),
            file_path: file_path.to_string(),
            language: Language::CSharp,
            symbols: walker.symbols,
            edges: walker.edges,
            source_text: source.to_string(),
            success: true,
            error: None,
        }
    }
}

struct Walker<'a> {
    ctx: &'a ParseContext<'a>,
    file_path: &'a str,
    source: &'a [u8],
    /// Enclosing namespace/type names and ids; the qualified-name prefix.
    scope: Vec<(String, SymbolId)>,
    /// Innermost method/constructor, the source of call edges.
    current_member: Option<SymbolId>,
    symbols: Vec<Symbol>,
    edges: Vec<RawEdge>,
}

impl Walker<'_> {
    fn walk(&mut self, node: Node<'_>) {
        match node.kind() {
            "namespace_declaration" | "file_scoped_namespace_declaration" => {
                self.enter_container(node, SymbolKind::Namespace);
                return;
            }
            "class_declaration" | "record_declaration" => {
                self.enter_container(node, SymbolKind::Class);
                return;
            }
            "interface_declaration" => {
                self.enter_container(node, SymbolKind::Interface);
                return;
            }
            "struct_declaration" => {
                self.enter_container(node, SymbolKind::Struct);
                return;
            }
            "enum_declaration" => {
                self.enter_container(node, SymbolKind::Enum);
                return;
            }
            "method_declaration" => {
                self.enter_method(node, SymbolKind::Method);
                return;
            }
            "constructor_declaration" => {
                self.enter_method(node, SymbolKind::Constructor);
                return;
            }
            "property_declaration" => {
                self.add_property(node);
            }
            "field_declaration" => {
                self.add_field(node);
            }
            "invocation_expression" => {
                self.add_call(node);
            }
            _ => {}
        }

        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.walk(child);
        }
    }

    /// Record a namespace/type symbol, push it on the scope stack, walk the
    /// body, then pop. A dotted namespace (`namespace A.B`) contributes its
    /// full path to the scope but is named by its last segment.
    fn enter_container(&mut self, node: Node<'_>, kind: SymbolKind) {
        let Some(name) = self.name_of(node) else {
            return;
        };

        let display = name.rsplit('.').next().unwrap_or(&name).to_string();
        let id = self.push_symbol_scoped(node, &display, &name, kind);

        if matches!(kind, SymbolKind::Class | SymbolKind::Interface | SymbolKind::Struct) {
            self.add_base_list_edges(node, id);
        }

        self.scope.push((name, id));
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.walk(child);
        }
        self.scope.pop();
    }

    /// Record a method/constructor symbol, emit Returns + parameter TypeOf
    /// edges, then walk the body with this member as the call source.
    fn enter_method(&mut self, node: Node<'_>, kind: SymbolKind) {
        let Some(name) = self.name_of(node) else {
            return;
        };

        let id = self.push_symbol(node, &name, kind);

        if kind == SymbolKind::Method {
            // Grammar versions differ on the return-type field name.
            let ret = node
                .child_by_field_name("returns")
                .or_else(|| node.child_by_field_name("type"));
            if let Some(ret) = ret {
                self.add_type_edge(id, ret, EdgeKind::Returns);
            }
        }
        if let Some(params) = node.child_by_field_name("parameters") {
            let mut cursor = params.walk();
            for param in params.children(&mut cursor) {
                if param.kind() == "parameter" {
                    if let Some(ty) = param.child_by_field_name("type") {
                        self.add_type_edge(id, ty, EdgeKind::TypeOf);
                    }
                }
            }
        }

        let saved = self.current_member.replace(id);
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.walk(child);
        }
        self.current_member = saved;
    }

    fn add_property(&mut self, node: Node<'_>) {
        let Some(name) = self.name_of(node) else {
            return;
        };
        let id = self.push_symbol(node, &name, SymbolKind::Property);
        if let Some(ty) = node.child_by_field_name("type") {
            self.add_type_edge(id, ty, EdgeKind::TypeOf);
        }
    }

    fn add_field(&mut self, node: Node<'_>) {
        // field_declaration → variable_declaration → variable_declarator(s)
        let Some(var_decl) = child_of_kind(node, "variable_declaration") else {
            return;
        };
        let ty = var_decl.child_by_field_name("type");

        let mut cursor = var_decl.walk();
        for declarator in var_decl.children(&mut cursor) {
            if declarator.kind() != "variable_declarator" {
                continue;
            }
            let Some(name_node) = child_of_kind(declarator, "identifier") else {
                continue;
            };
            let name = self.text(name_node).to_string();
            let id = self.push_symbol_at(node, declarator, &name, &name, SymbolKind::Field);
            if let Some(ty) = ty {
                self.add_type_edge(id, ty, EdgeKind::TypeOf);
            }
        }
    }

    /// A call edge from the enclosing member to the invocation target.
    /// The target is the textual callee path; single-segment callees are
    /// upgraded to qualified names after the walk when the file defines
    /// them (`resolve_local_calls`).
    fn add_call(&mut self, node: Node<'_>) {
        let Some(source_id) = self.current_member else {
            return;
        };
        let Some(function) = node.child_by_field_name("function") else {
            return;
        };

        let mut target = self.text(function).trim().to_string();
        for prefix in ["this.", "base."] {
            if let Some(stripped) = target.strip_prefix(prefix) {
                target = stripped.to_string();
            }
        }
        if target.is_empty() {
            return;
        }

        self.edges.push(RawEdge {
            source_symbol_id: source_id,
            target,
            kind: EdgeKind::Calls,
        });
    }

    /// Inherits/Implements edges from a type's base list. Without full type
    /// information an interface base is recognised by the `IName`
    /// convention; everything else is treated as inheritance.
    fn add_base_list_edges(&mut self, node: Node<'_>, source_id: SymbolId) {
        let Some(bases) = child_of_kind(node, "base_list") else {
            return;
        };
        let mut cursor = bases.walk();
        for base in bases.children(&mut cursor) {
            if !matches!(base.kind(), "identifier" | "qualified_name" | "generic_name") {
                continue;
            }
            let target = self.text(base).trim().to_string();
            if target.is_empty() {
                continue;
            }
            let kind = if looks_like_interface(&target) {
                EdgeKind::Implements
            } else {
                EdgeKind::Inherits
            };
            self.edges.push(RawEdge {
                source_symbol_id: source_id,
                target,
                kind,
            });
        }
    }

    fn add_type_edge(&mut self, source_id: SymbolId, type_node: Node<'_>, kind: EdgeKind) {
        let raw = self.text(type_node).trim().to_string();
        let base = raw.trim_end_matches("[]").trim_end_matches('?');
        if base.is_empty() || PRIMITIVES.binary_search(&base).is_ok() {
            return;
        }
        self.edges.push(RawEdge {
            source_symbol_id: source_id,
            target: raw,
            kind,
        });
    }

    fn push_symbol(&mut self, node: Node<'_>, name: &str, kind: SymbolKind) -> SymbolId {
        self.push_symbol_scoped(node, name, name, kind)
    }

    fn push_symbol_scoped(
        &mut self,
        node: Node<'_>,
        name: &str,
        scope_suffix: &str,
        kind: SymbolKind,
    ) -> SymbolId {
        self.push_symbol_at(node, node, name, scope_suffix, kind)
    }

    /// Record one symbol. `decl` is the whole declaration (for docs and
    /// modifiers); `span_node` is the node whose range becomes the span;
    /// `scope_suffix` is what the symbol contributes to qualified names
    /// (the full dotted path for namespaces).
    fn push_symbol_at(
        &mut self,
        decl: Node<'_>,
        span_node: Node<'_>,
        name: &str,
        scope_suffix: &str,
        kind: SymbolKind,
    ) -> SymbolId {
        let id = Uuid::new_v4();
        let qualified = if self.scope.is_empty() {
            scope_suffix.to_string()
        } else {
            let prefix: Vec<&str> = self.scope.iter().map(|(n, _)| n.as_str()).collect();
            format!("{}.{}", prefix.join("."), scope_suffix)
        };

        let start = span_node.start_position();
        let end = span_node.end_position();

        self.symbols.push(Symbol {
            id,
            repo_id: self.ctx.repo_id,
            branch_name: self.ctx.branch_name.to_string(),
            file_path: self.file_path.to_string(),
            commit_sha: self.ctx.commit_sha.to_string(),
            name: name.to_string(),
            qualified_name: Some(qualified),
            kind,
            language: Language::CSharp,
            span: Span {
                start_line: start.row as u32 + 1,
                start_col: start.column as u32 + 1,
                end_line: end.row as u32 + 1,
                end_col: end.column as u32 + 1,
            },
            signature: self.signature(decl),
            documentation: self.doc_comments(decl),
            modifiers: self.modifiers(decl),
            parent_symbol_id: self.scope.last().map(|(_, id)| *id),
        });
        id
    }

    /// Upgrade single-segment call targets defined in this file to their
    /// qualified names.
    fn resolve_local_calls(&mut self) {
        let mut by_name: std::collections::HashMap<&str, &str> = std::collections::HashMap::new();
        for sym in &self.symbols {
            if let Some(qn) = &sym.qualified_name {
                by_name.entry(sym.name.as_str()).or_insert(qn.as_str());
            }
        }

        let upgrades: Vec<(usize, String)> = self
            .edges
            .iter()
            .enumerate()
            .filter(|(_, e)| e.kind == EdgeKind::Calls && !e.target.contains('.'))
            .filter_map(|(i, e)| by_name.get(e.target.as_str()).map(|qn| (i, qn.to_string())))
            .collect();
        for (i, qn) in upgrades {
            self.edges[i].target = qn;
        }
    }

    // ── node helpers ──

    fn text(&self, node: Node<'_>) -> &str {
        std::str::from_utf8(&self.source[node.byte_range()]).unwrap_or("")
    }

    fn name_of(&self, node: Node<'_>) -> Option<String> {
        let name_node = node.child_by_field_name("name")?;
        let text = self.text(name_node).trim();
        if text.is_empty() {
            None
        } else {
            Some(text.to_string())
        }
    }

    /// First line of the declaration, without a trailing brace.
    fn signature(&self, node: Node<'_>) -> Option<String> {
        let first_line = self.text(node).lines().next()?;
        Some(first_line.trim().trim_end_matches('{').trim_end().to_string())
    }

    fn modifiers(&self, node: Node<'_>) -> Vec<String> {
        let mut cursor = node.walk();
        node.children(&mut cursor)
            .filter(|c| c.kind() == "modifier")
            .map(|c| self.text(c).to_string())
            .collect()
    }

    /// Preceding `///` comment block, with the comment markers stripped.
    fn doc_comments(&self, node: Node<'_>) -> Option<String> {
        let mut parts = Vec::new();
        let mut sibling = node.prev_sibling();

        while let Some(prev) = sibling {
            if prev.kind() != "comment" {
                break;
            }
            let text = self.text(prev).trim();
            let Some(content) = text.strip_prefix("///") else {
                break;
            };
            parts.push(content.trim().to_string());
            sibling = prev.prev_sibling();
        }

        if parts.is_empty() {
            None
        } else {
            parts.reverse();
            Some(parts.join("\n"))
        }
    }
}

fn child_of_kind<'t>(node: Node<'t>, kind: &str) -> Option<Node<'t>> {
    let mut cursor = node.walk();
    let found = node.children(&mut cursor).find(|c| c.kind() == kind);
    found
}

/// `IUserRepository`-style names are treated as interfaces.
fn looks_like_interface(name: &str) -> bool {
    let last = name.rsplit('.').next().unwrap_or(name);
    let mut chars = last.chars();
    chars.next() == Some('I') && chars.next().is_some_and(|c| c.is_ascii_uppercase())
}
