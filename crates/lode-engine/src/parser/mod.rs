pub mod csharp;
pub mod regex_parser;
pub mod registry;

pub use registry::ParserRegistry;

use lode_core::{Language, ParsedFile, RepoId};

/// Index scope carried through a parse so every extracted symbol lands in
/// the right `(repo, branch, commit)`.
#[derive(Debug, Clone, Copy)]
pub struct ParseContext<'a> {
    pub repo_id: RepoId,
    pub branch_name: &'a str,
    pub commit_sha: &'a str,
}

/// Trait implemented by each parser tier.
///
/// Two tiers exist: line-scan regex parsers (JavaScript/TypeScript, Python,
/// Java, Go, Rust) and the semantic C# parser. A parser never fails the
/// batch: any internal error is reported on the returned [`ParsedFile`]
/// (`success = false`, empty symbols and edges).
pub trait SourceParser: Send + Sync {
    /// Languages this parser handles.
    fn languages(&self) -> &[Language];

    /// Extract symbols and edges from one file. `language` is the detected
    /// tag for the file (parsers registered for several languages need it
    /// to label their output).
    fn parse(
        &self,
        ctx: &ParseContext<'_>,
        file_path: &str,
        language: Language,
        source: &str,
    ) -> ParsedFile;
}

/// Build an empty, failed `ParsedFile` for error paths.
pub(crate) fn failed_parse(
    ctx: &ParseContext<'_>,
    file_path: &str,
    language: Language,
    source: &str,
    error: String,
) -> ParsedFile {
    ParsedFile {
        repo_id: ctx.repo_id,
        branch_name: ctx.branch_name.to_string(),
        commit_sha: ctx.commit_sha.to_string(),
        file_path: file_path.to_string(),
        language,
        symbols: Vec::new(),
        edges: Vec::new(),
        source_text: source.to_string(),
        success: false,
        error: Some(error),
    }
}
