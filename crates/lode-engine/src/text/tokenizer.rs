//! Identifier tokenization.
//!
//! Splits identifiers into lowercase sub-tokens for search indexing and
//! fingerprinting: `parseHttpResponse2` → `parse`, `http`, `response`, `2`.

/// Caps for the identifier-extraction path.
const MAX_EXTRACT_INPUT_CHARS: usize = 4000;
const MAX_EXTRACTED_IDENTIFIERS: usize = 256;
const MIN_EXTRACT_TOKEN_LEN: usize = 3;

/// Minimum sub-token length kept by [`Tokenizer::tokens`].
const MIN_TOKEN_LEN: usize = 2;

/// Keywords dropped during identifier extraction. Merged across the indexed
/// languages; a keyword in one language is noise in all of them.
const KEYWORDS: &[&str] = &[
    "abstract", "async", "await", "base", "bool", "break", "byte", "case", "catch", "char",
    "class", "const", "continue", "decimal", "def", "default", "delegate", "double", "elif",
    "else", "enum", "event", "explicit", "extern", "false", "final", "finally", "float", "fn",
    "for", "foreach", "func", "function", "get", "goto", "impl", "implicit", "import", "in",
    "int", "interface", "internal", "lambda", "let", "lock", "long", "match", "mod", "mut",
    "namespace", "new", "none", "null", "object", "operator", "out", "override", "package",
    "params", "pass", "private", "protected", "pub", "public", "raise", "readonly", "ref",
    "return", "sbyte", "sealed", "self", "set", "short", "static", "string", "struct", "super",
    "switch", "this", "throw", "trait", "true", "try", "type", "typeof", "uint", "ulong",
    "unsafe", "use", "ushort", "using", "var", "virtual", "void", "while", "with", "yield",
];

/// Stateless identifier tokenizer.
pub struct Tokenizer;

impl Tokenizer {
    /// Split an arbitrary string into lowercase sub-tokens, preserving
    /// multiplicity (a token bag). Segments on any non-alphanumeric
    /// character, then splits camel/Pascal runs, acronym runs, and digit
    /// groups within each segment.
    pub fn tokens(input: &str) -> Vec<String> {
        let mut out = Vec::new();
        for segment in input.split(|c: char| !c.is_alphanumeric()) {
            if segment.is_empty() {
                continue;
            }
            split_case_runs(segment, &mut out);
        }
        out.retain(|t| t.chars().count() >= MIN_TOKEN_LEN);
        out
    }

    /// Deduplicated variant of [`Tokenizer::tokens`], preserving first-seen
    /// order.
    pub fn unique_tokens(input: &str) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        Self::tokens(input)
            .into_iter()
            .filter(|t| seen.insert(t.clone()))
            .collect()
    }

    /// Extract identifier sub-tokens from a source snippet.
    ///
    /// Bounded on three axes: at most [`MAX_EXTRACT_INPUT_CHARS`] of input
    /// are scanned, at most [`MAX_EXTRACTED_IDENTIFIERS`] tokens returned,
    /// and tokens shorter than [`MIN_EXTRACT_TOKEN_LEN`] or all-digit are
    /// dropped, as are language keywords.
    pub fn extract_identifiers(snippet: &str) -> Vec<String> {
        let bounded: String = snippet.chars().take(MAX_EXTRACT_INPUT_CHARS).collect();

        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();

        for word in identifier_words(&bounded) {
            for token in Self::tokens(word) {
                if token.chars().count() < MIN_EXTRACT_TOKEN_LEN {
                    continue;
                }
                if token.chars().all(|c| c.is_ascii_digit()) {
                    continue;
                }
                if KEYWORDS.binary_search(&token.as_str()).is_ok() {
                    continue;
                }
                if seen.insert(token.clone()) {
                    out.push(token);
                    if out.len() >= MAX_EXTRACTED_IDENTIFIERS {
                        return out;
                    }
                }
            }
        }
        out
    }
}

/// Split one alphanumeric segment into case/digit runs and push the
/// lowercased parts. `HTTPServer2` → `http`, `server`, `2`.
fn split_case_runs(segment: &str, out: &mut Vec<String>) {
    let chars: Vec<char> = segment.chars().collect();
    let mut current = String::new();

    for i in 0..chars.len() {
        let c = chars[i];
        if let Some(prev) = current.chars().last() {
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            let boundary = (prev.is_lowercase() && c.is_uppercase())
                || (prev.is_ascii_digit() != c.is_ascii_digit())
                || (prev.is_uppercase() && c.is_uppercase() && next_is_lower);
            if boundary {
                out.push(current.to_lowercase());
                current = String::new();
            }
        }
        current.push(c);
    }
    if !current.is_empty() {
        out.push(current.to_lowercase());
    }
}

/// Iterate identifier-shaped words (`[A-Za-z_][A-Za-z0-9_]*`) in a snippet.
fn identifier_words(input: &str) -> impl Iterator<Item = &str> {
    input
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty() && !w.starts_with(|c: char| c.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_camel_and_pascal_case() {
        assert_eq!(Tokenizer::tokens("parseHttpResponse"), vec!["parse", "http", "response"]);
        assert_eq!(Tokenizer::tokens("UserService"), vec!["user", "service"]);
    }

    #[test]
    fn keeps_acronym_runs_together() {
        assert_eq!(Tokenizer::tokens("HTTPServer"), vec!["http", "server"]);
        assert_eq!(Tokenizer::tokens("parseHTTP"), vec!["parse", "http"]);
    }

    #[test]
    fn splits_digit_groups() {
        assert_eq!(Tokenizer::tokens("sha256Hash"), vec!["sha", "256", "hash"]);
    }

    #[test]
    fn segments_on_non_alphanumerics() {
        assert_eq!(
            Tokenizer::tokens("get_user_by_id"),
            vec!["get", "user", "by", "id"]
        );
        assert_eq!(Tokenizer::tokens("Ns.Cls.Method"), vec!["ns", "cls", "method"]);
    }

    #[test]
    fn drops_short_tokens() {
        // single-char sub-tokens are dropped
        assert_eq!(Tokenizer::tokens("x"), Vec::<String>::new());
        assert_eq!(Tokenizer::tokens("aB"), Vec::<String>::new());
    }

    #[test]
    fn unique_preserves_first_seen_order() {
        assert_eq!(
            Tokenizer::unique_tokens("user user service user"),
            vec!["user", "service"]
        );
    }

    #[test]
    fn extract_drops_keywords_and_digits() {
        let tokens = Tokenizer::extract_identifiers("return parseToken(token, 42);");
        assert!(tokens.contains(&"parse".to_string()));
        assert!(tokens.contains(&"token".to_string()));
        assert!(!tokens.contains(&"return".to_string()));
        assert!(!tokens.iter().any(|t| t.chars().all(|c| c.is_ascii_digit())));
    }

    #[test]
    fn extract_enforces_min_length() {
        let tokens = Tokenizer::extract_identifiers("db id getUserById");
        assert!(!tokens.contains(&"db".to_string()));
        assert!(!tokens.contains(&"id".to_string()));
        assert!(tokens.contains(&"user".to_string()));
    }

    #[test]
    fn extract_caps_identifier_count() {
        // 1000 distinct lowercase identifiers, far more than the cap.
        let mut src = String::new();
        for a in b'a'..=b'j' {
            for b in b'a'..=b'j' {
                for c in b'a'..=b'j' {
                    src.push_str(&format!("qz{}{}{} ", a as char, b as char, c as char));
                }
            }
        }
        let tokens = Tokenizer::extract_identifiers(&src);
        assert_eq!(tokens.len(), 256);
    }

    #[test]
    fn keyword_table_is_sorted() {
        let mut sorted = KEYWORDS.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, KEYWORDS, "KEYWORDS must stay sorted for binary_search");
    }
}
