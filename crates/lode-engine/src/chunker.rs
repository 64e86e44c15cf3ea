//! Symbol-granular chunking.
//!
//! Each chunkable symbol becomes one chunk: the symbol's line range plus a
//! few context lines either side, capped at a character budget that keeps
//! the content safely under the embedding provider's 8k-token context.
//! The chunker is pure CPU work over the `source_text` captured at parse
//! time; it performs no I/O.

use std::collections::HashMap;

use uuid::Uuid;

use lode_core::config::ChunkingConfig;
use lode_core::{CodeChunk, ParsedFile, Symbol, SymbolKind};

/// Kinds that produce a chunk. Namespaces span whole files and
/// variables/parameters/fields carry no body worth embedding.
const CHUNKABLE_KINDS: &[SymbolKind] = &[
    SymbolKind::Class,
    SymbolKind::Interface,
    SymbolKind::Struct,
    SymbolKind::Enum,
    SymbolKind::Method,
    SymbolKind::Function,
    SymbolKind::Constructor,
    SymbolKind::Property,
];

pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }

    /// Chunk every chunkable symbol of a parsed file.
    pub fn chunk_file(&self, parsed: &ParsedFile) -> Vec<CodeChunk> {
        let lines: Vec<&str> = parsed.source_text.lines().collect();
        if lines.is_empty() {
            return Vec::new();
        }

        let by_id: HashMap<_, _> = parsed.symbols.iter().map(|s| (s.id, s)).collect();

        let mut chunks = Vec::new();
        for symbol in &parsed.symbols {
            if !CHUNKABLE_KINDS.contains(&symbol.kind) {
                continue;
            }
            if let Some(chunk) = self.chunk_symbol(parsed, symbol, &lines, &by_id) {
                chunks.push(chunk);
            }
        }
        chunks
    }

    fn chunk_symbol(
        &self,
        parsed: &ParsedFile,
        symbol: &Symbol,
        lines: &[&str],
        by_id: &HashMap<Uuid, &Symbol>,
    ) -> Option<CodeChunk> {
        let total = lines.len() as u32;
        let start = symbol.span.start_line.clamp(1, total);
        let end = symbol.span.end_line.clamp(start, total);

        // Window with context overlap, clamped to the file.
        let mut window_start = start.saturating_sub(self.config.context_lines_before).max(1);
        let mut window_end = (end + self.config.context_lines_after).min(total);

        let mut content = slice_lines(lines, window_start, window_end);

        // Over budget: drop the overlap first, then truncate.
        if content.chars().count() > self.config.max_chunk_chars {
            window_start = start;
            window_end = end;
            content = slice_lines(lines, window_start, window_end);
        }
        if content.chars().count() > self.config.max_chunk_chars {
            content = truncate_chars(&content, self.config.max_chunk_chars);
        }

        if content.trim().is_empty() {
            return None;
        }

        let token_count = (content.chars().count() / 4) as i32;
        let parent_symbol_name = symbol
            .parent_symbol_id
            .and_then(|pid| by_id.get(&pid))
            .map(|p| p.name.clone());

        Some(CodeChunk {
            id: Uuid::new_v4(),
            repo_id: parsed.repo_id,
            branch_name: parsed.branch_name.clone(),
            file_path: parsed.file_path.clone(),
            symbol_id: Some(symbol.id),
            symbol_name: symbol.name.clone(),
            symbol_kind: symbol.kind,
            language: symbol.language,
            content,
            chunk_start_line: window_start,
            chunk_end_line: window_end,
            symbol_start_line: start,
            symbol_end_line: end,
            token_count,
            parent_symbol_name,
            signature: symbol.signature.clone(),
            documentation: symbol.documentation.clone(),
        })
    }
}

/// Join an inclusive 1-based line range.
fn slice_lines(lines: &[&str], start: u32, end: u32) -> String {
    lines[(start as usize - 1)..(end as usize)].join("\n")
}

/// Truncate to at most `max_chars` characters. Char-granular: a multibyte
/// character is kept or dropped whole, never split.
fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => s[..byte_idx].to_string(),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lode_core::{Language, ParsedFile, Span};

    fn parsed_with(source: &str, symbols: Vec<Symbol>) -> ParsedFile {
        ParsedFile {
            repo_id: Uuid::new_v4(),
            branch_name: "main".into(),
            commit_sha: "abc123".into(),
            file_path: "src/demo.cs".into(),
            language: Language::CSharp,
            symbols,
            edges: Vec::new(),
            source_text: source.to_string(),
            success: true,
            error: None,
        }
    }

    fn symbol(name: &str, kind: SymbolKind, start: u32, end: u32) -> Symbol {
        Symbol {
            id: Uuid::new_v4(),
            repo_id: Uuid::new_v4(),
            branch_name: "main".into(),
            file_path: "src/demo.cs".into(),
            commit_sha: "abc123".into(),
            name: name.into(),
            qualified_name: None,
            kind,
            language: Language::CSharp,
            span: Span {
                start_line: start,
                start_col: 1,
                end_line: end,
                end_col: 1,
            },
            signature: None,
            documentation: None,
            modifiers: Vec::new(),
            parent_symbol_id: None,
        }
    }

    #[test]
    fn window_contains_symbol_with_context() {
        let source: String = (1..=40).map(|i| format!("line {i}\n")).collect();
        let parsed = parsed_with(&source, vec![symbol("M", SymbolKind::Method, 20, 24)]);

        let chunks = Chunker::new(ChunkingConfig::default()).chunk_file(&parsed);
        assert_eq!(chunks.len(), 1);
        let chunk = &chunks[0];
        assert_eq!(chunk.chunk_start_line, 15);
        assert_eq!(chunk.chunk_end_line, 29);
        assert!(chunk.content.contains("line 20"));
        assert!(chunk.content.contains("line 24"));
    }

    #[test]
    fn window_clamps_to_file_bounds() {
        let source = "a\nb\nc\n";
        let parsed = parsed_with(source, vec![symbol("F", SymbolKind::Function, 1, 2)]);

        let chunks = Chunker::new(ChunkingConfig::default()).chunk_file(&parsed);
        assert_eq!(chunks[0].chunk_start_line, 1);
        assert_eq!(chunks[0].chunk_end_line, 3);
    }

    #[test]
    fn non_chunkable_kinds_are_skipped() {
        let source = "namespace N;\nint x;\n";
        let parsed = parsed_with(
            source,
            vec![
                symbol("N", SymbolKind::Namespace, 1, 2),
                symbol("x", SymbolKind::Field, 2, 2),
                symbol("p", SymbolKind::Parameter, 2, 2),
            ],
        );
        let chunks = Chunker::new(ChunkingConfig::default()).chunk_file(&parsed);
        assert!(chunks.is_empty());
    }

    #[test]
    fn oversize_drops_overlap_before_truncating() {
        // Symbol body fits the budget; the overlap pushes it past. The
        // chunk must fall back to the bare symbol range.
        let long_line = "x".repeat(100);
        let source: String = (0..20).map(|_| format!("{long_line}\n")).collect();
        let config = ChunkingConfig {
            context_lines_before: 5,
            context_lines_after: 5,
            max_chunk_chars: 1_050,
        };
        let parsed = parsed_with(&source, vec![symbol("M", SymbolKind::Method, 6, 15)]);

        let chunks = Chunker::new(config).chunk_file(&parsed);
        assert_eq!(chunks[0].chunk_start_line, 6);
        assert_eq!(chunks[0].chunk_end_line, 15);
        assert!(chunks[0].content.chars().count() <= 1_050);
    }

    #[test]
    fn truncation_never_splits_a_multibyte_char() {
        let source: String = "é".repeat(100);
        let truncated = truncate_chars(&source, 7);
        assert_eq!(truncated.chars().count(), 7);
        assert!(truncated.is_char_boundary(truncated.len()));
    }

    #[test]
    fn token_count_estimates_quarter_of_chars() {
        let source = format!("{}\n", "a".repeat(400));
        let parsed = parsed_with(&source, vec![symbol("F", SymbolKind::Function, 1, 1)]);
        let chunks = Chunker::new(ChunkingConfig::default()).chunk_file(&parsed);
        assert_eq!(chunks[0].token_count, 100);
    }

    #[test]
    fn token_count_counts_chars_not_bytes() {
        // 400 two-byte chars: 100 tokens by char count, not 200 by bytes.
        let source = format!("{}\n", "é".repeat(400));
        let parsed = parsed_with(&source, vec![symbol("F", SymbolKind::Function, 1, 1)]);
        let chunks = Chunker::new(ChunkingConfig::default()).chunk_file(&parsed);
        assert_eq!(chunks[0].token_count, 100);
    }

    #[test]
    fn parent_name_resolved_from_parent_id() {
        let source = "class A {\n  void M() {}\n}\n";
        let parent = symbol("A", SymbolKind::Class, 1, 3);
        let mut child = symbol("M", SymbolKind::Method, 2, 2);
        child.parent_symbol_id = Some(parent.id);
        let parsed = parsed_with(source, vec![parent, child]);

        let chunks = Chunker::new(ChunkingConfig::default()).chunk_file(&parsed);
        let m_chunk = chunks.iter().find(|c| c.symbol_name == "M").unwrap();
        assert_eq!(m_chunk.parent_symbol_name.as_deref(), Some("A"));
    }
}
