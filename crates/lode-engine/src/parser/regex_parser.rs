//! Line-scan regex parsers.
//!
//! The regex tier covers JavaScript/TypeScript (including JSX/TSX), Python,
//! Java, Go, and Rust. It captures declaration name, kind, 1-based span,
//! and the declaration line as the signature. Edges are the semantic tier's
//! job; this tier emits symbols only.

use regex::Regex;
use uuid::Uuid;

use lode_core::{Language, ParsedFile, Span, Symbol, SymbolKind};

use super::{ParseContext, SourceParser};

/// Control-flow words that look like method declarations to a line regex.
const NOT_METHOD_NAMES: &[&str] = &["catch", "do", "else", "for", "if", "return", "switch", "while"];

struct DeclRule {
    pattern: Regex,
    kind: SymbolKind,
    /// Container declarations (class, interface, ...) parent the symbols
    /// found inside their brace or indent block.
    container: bool,
}

/// One language family's rule set, evaluated line by line.
pub struct RegexParser {
    languages: Vec<Language>,
    rules: Vec<DeclRule>,
    /// Member pattern applied only inside a container block.
    method_rule: Option<Regex>,
    /// Python-style: block extent by indentation, function vs method by
    /// leading indentation of the `def`.
    indent_mode: bool,
}

impl RegexParser {
    /// All regex-tier parsers.
    pub fn all() -> Vec<RegexParser> {
        vec![
            Self::ecmascript(),
            Self::python(),
            Self::java(),
            Self::go(),
            Self::rust(),
        ]
    }

    fn ecmascript() -> Self {
        let rules = vec![
            rule(r"^\s*(?:export\s+)?(?:default\s+)?(?:abstract\s+)?class\s+(?P<name>\w+)", SymbolKind::Class, true),
            rule(r"^\s*(?:export\s+)?interface\s+(?P<name>\w+)", SymbolKind::Interface, true),
            rule(r"^\s*(?:export\s+)?(?:const\s+)?enum\s+(?P<name>\w+)", SymbolKind::Enum, true),
            rule(r"^\s*(?:export\s+)?namespace\s+(?P<name>\w+)", SymbolKind::Namespace, true),
            rule(r"^\s*(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s*\*?\s*(?P<name>\w+)\s*\(", SymbolKind::Function, false),
            rule(r"^\s*(?:export\s+)?(?:const|let|var)\s+(?P<name>\w+)\s*=\s*(?:async\s+)?(?:\([^)]*\)|\w+)\s*=>", SymbolKind::Function, false),
        ];
        let method = Regex::new(
            r"^\s+(?:public\s+|private\s+|protected\s+|static\s+|readonly\s+|abstract\s+|override\s+)*(?:async\s+)?(?:get\s+|set\s+)?(?P<name>\w+)\s*(?:<[^>]*>)?\([^;]*\)\s*(?::\s*[^{;]+)?\{",
        )
        .expect("valid method regex");
        Self {
            languages: vec![Language::JavaScript, Language::TypeScript],
            rules,
            method_rule: Some(method),
            indent_mode: false,
        }
    }

    fn python() -> Self {
        let rules = vec![
            rule(r"^\s*class\s+(?P<name>\w+)", SymbolKind::Class, true),
            rule(r"^\s*(?:async\s+)?def\s+(?P<name>\w+)\s*\(", SymbolKind::Function, false),
        ];
        Self {
            languages: vec![Language::Python],
            rules,
            method_rule: None,
            indent_mode: true,
        }
    }

    fn java() -> Self {
        let rules = vec![
            rule(r"^\s*(?:(?:public|private|protected|static|final|abstract|sealed)\s+)*class\s+(?P<name>\w+)", SymbolKind::Class, true),
            rule(r"^\s*(?:(?:public|private|protected|static|sealed)\s+)*interface\s+(?P<name>\w+)", SymbolKind::Interface, true),
            rule(r"^\s*(?:(?:public|private|protected|static)\s+)*enum\s+(?P<name>\w+)", SymbolKind::Enum, true),
            rule(r"^\s*(?:(?:public|private|protected|static|final)\s+)*record\s+(?P<name>\w+)", SymbolKind::Class, true),
        ];
        let method = Regex::new(
            r"^\s+(?:(?:public|private|protected|static|final|abstract|synchronized|native|default)\s+)*[\w<>\[\],\.\s]*?(?P<name>\w+)\s*\([^;{]*\)\s*(?:throws\s+[\w,\.\s]+)?\{",
        )
        .expect("valid method regex");
        Self {
            languages: vec![Language::Java],
            rules,
            method_rule: Some(method),
            indent_mode: false,
        }
    }

    fn go() -> Self {
        let rules = vec![
            rule(r"^func\s+(?P<name>\w+)\s*\(", SymbolKind::Function, false),
            rule(r"^func\s*\([^)]*\)\s*(?P<name>\w+)\s*\(", SymbolKind::Method, false),
            rule(r"^type\s+(?P<name>\w+)\s+struct\b", SymbolKind::Struct, true),
            rule(r"^type\s+(?P<name>\w+)\s+interface\b", SymbolKind::Interface, true),
        ];
        Self {
            languages: vec![Language::Go],
            rules,
            method_rule: None,
            indent_mode: false,
        }
    }

    fn rust() -> Self {
        let rules = vec![
            rule(r"^\s*(?:pub(?:\([^)]*\))?\s+)?struct\s+(?P<name>\w+)", SymbolKind::Struct, true),
            rule(r"^\s*(?:pub(?:\([^)]*\))?\s+)?enum\s+(?P<name>\w+)", SymbolKind::Enum, true),
            rule(r"^\s*(?:pub(?:\([^)]*\))?\s+)?trait\s+(?P<name>\w+)", SymbolKind::Interface, true),
            rule(r"^\s*(?:pub(?:\([^)]*\))?\s+)?mod\s+(?P<name>\w+)", SymbolKind::Namespace, true),
            rule(r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:async\s+)?(?:unsafe\s+)?(?:extern\s+\S+\s+)?fn\s+(?P<name>\w+)", SymbolKind::Function, false),
        ];
        Self {
            languages: vec![Language::Rust],
            rules,
            method_rule: None,
            indent_mode: false,
        }
    }
}

fn rule(pattern: &str, kind: SymbolKind, container: bool) -> DeclRule {
    DeclRule {
        pattern: Regex::new(pattern).expect("valid declaration regex"),
        kind,
        container,
    }
}

impl SourceParser for RegexParser {
    fn languages(&self) -> &[Language] {
        &self.languages
    }

    fn parse(
        &self,
        ctx: &ParseContext<'_>,
        file_path: &str,
        language: Language,
        source: &str,
    ) -> ParsedFile {
        let lines: Vec<&str> = source.lines().collect();

        let mut symbols: Vec<Symbol> = Vec::new();
        // Open container blocks: (symbol id, name, end line).
        let mut containers: Vec<(Uuid, String, u32)> = Vec::new();

        for (idx, line) in lines.iter().enumerate() {
            let line_no = (idx + 1) as u32;

            while containers.last().is_some_and(|(_, _, end)| line_no > *end) {
                containers.pop();
            }

            let mut matched = None;
            for decl in &self.rules {
                if let Some(caps) = decl.pattern.captures(line) {
                    let name = caps["name"].to_string();
                    matched = Some((name, decl.kind, decl.container));
                    break;
                }
            }

            if matched.is_none() {
                if let Some(method) = &self.method_rule {
                    if !containers.is_empty() {
                        if let Some(caps) = method.captures(line) {
                            let name = caps["name"].to_string();
                            if !NOT_METHOD_NAMES.contains(&name.as_str()) {
                                matched = Some((name, SymbolKind::Method, false));
                            }
                        }
                    }
                }
            }

            let Some((name, mut kind, is_container)) = matched else {
                continue;
            };

            let end_line = if self.indent_mode {
                indent_block_end(&lines, idx)
            } else {
                brace_block_end(&lines, idx)
            };

            // Python distinguishes function vs method by leading indentation.
            if self.indent_mode
                && kind == SymbolKind::Function
                && line.starts_with(char::is_whitespace)
            {
                kind = SymbolKind::Method;
            }

            let parent = containers.last().cloned();
            if let Some((_, parent_name, _)) = &parent {
                kind = match kind {
                    SymbolKind::Function if !self.indent_mode => SymbolKind::Method,
                    SymbolKind::Method if *parent_name == name => SymbolKind::Constructor,
                    other => other,
                };
            }

            let id = Uuid::new_v4();
            let signature = line.trim().trim_end_matches('{').trim_end().to_string();
            symbols.push(Symbol {
                id,
                repo_id: ctx.repo_id,
                branch_name: ctx.branch_name.to_string(),
                file_path: file_path.to_string(),
                commit_sha: ctx.commit_sha.to_string(),
                name: name.clone(),
                qualified_name: None,
                kind,
                language,
                span: Span {
                    start_line: line_no,
                    start_col: 1,
                    end_line,
                    end_col: 1,
                },
                signature: Some(signature),
                documentation: None,
                modifiers: Vec::new(),
                parent_symbol_id: parent.map(|(pid, _, _)| pid),
            });

            if is_container {
                containers.push((id, name, end_line));
            }
        }

        ParsedFile {
            repo_id: ctx.repo_id,
            branch_name: ctx.branch_name.to_string(),
            commit_sha: ctx.commit_sha.to_string(),
            file_path: file_path.to_string(),
            language,
            symbols,
            edges: Vec::new(),
            source_text: source.to_string(),
            success: true,
            error: None,
        }
    }
}

/// End line (1-based) of the brace block opened at `start_idx`. Falls back
/// to the declaration line when no opening brace appears within three
/// lines (abstract members, interface signatures).
fn brace_block_end(lines: &[&str], start_idx: usize) -> u32 {
    let mut depth: i32 = 0;
    let mut opened = false;

    for (j, line) in lines.iter().enumerate().skip(start_idx) {
        for c in line.chars() {
            match c {
                '{' => {
                    depth += 1;
                    opened = true;
                }
                '}' => depth -= 1,
                _ => {}
            }
        }
        if opened && depth <= 0 {
            return (j + 1) as u32;
        }
        if !opened && j >= start_idx + 2 {
            break;
        }
    }

    if opened {
        lines.len() as u32
    } else {
        (start_idx + 1) as u32
    }
}

/// End line (1-based) of the indentation block opened at `start_idx`.
fn indent_block_end(lines: &[&str], start_idx: usize) -> u32 {
    let decl_indent = leading_indent(lines[start_idx]);
    let mut last_in_block = start_idx;

    for (j, line) in lines.iter().enumerate().skip(start_idx + 1) {
        if line.trim().is_empty() {
            continue;
        }
        if leading_indent(line) <= decl_indent {
            break;
        }
        last_in_block = j;
    }
    (last_in_block + 1) as u32
}

fn leading_indent(line: &str) -> usize {
    line.chars().take_while(|c| c.is_whitespace()).count()
}
