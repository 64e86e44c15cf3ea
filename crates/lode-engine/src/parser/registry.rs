use std::collections::HashMap;
use std::sync::Arc;

use lode_core::{Language, ParsedFile};

use super::csharp::CSharpParser;
use super::regex_parser::RegexParser;
use super::{ParseContext, SourceParser};

/// Central registry mapping a language to its parser.
///
/// Each parser is wrapped in an `Arc` so multiple languages (e.g.
/// JavaScript and TypeScript) can share one parser instance.
pub struct ParserRegistry {
    parsers: HashMap<Language, Arc<dyn SourceParser>>,
}

impl ParserRegistry {
    /// Create a registry with all built-in parsers registered.
    pub fn new() -> Self {
        let mut parsers: HashMap<Language, Arc<dyn SourceParser>> = HashMap::new();

        let csharp = Arc::new(CSharpParser::new()) as Arc<dyn SourceParser>;
        for lang in csharp.languages() {
            parsers.insert(*lang, Arc::clone(&csharp));
        }

        for regex_parser in RegexParser::all() {
            let parser = Arc::new(regex_parser) as Arc<dyn SourceParser>;
            for lang in parser.languages() {
                parsers.insert(*lang, Arc::clone(&parser));
            }
        }

        Self { parsers }
    }

    /// Whether a parser is registered for the language.
    pub fn supports(&self, language: Language) -> bool {
        self.parsers.contains_key(&language)
    }

    /// Parse one file with the parser registered for its language.
    ///
    /// Unsupported languages produce a failed `ParsedFile` rather than an
    /// error; the indexing batch continues either way.
    pub fn parse(
        &self,
        ctx: &ParseContext<'_>,
        file_path: &str,
        language: Language,
        source: &str,
    ) -> ParsedFile {
        match self.parsers.get(&language) {
            Some(parser) => parser.parse(ctx, file_path, language, source),
            None => super::failed_parse(
                ctx,
                file_path,
                language,
                source,
                format!("no parser registered for {language}"),
            ),
        }
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::new()
    }
}
