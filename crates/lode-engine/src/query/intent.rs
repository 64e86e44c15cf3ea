//! Rule-based query intent detection and term extraction.
//!
//! Intents are evaluated in a fixed order; the first match wins. A
//! navigation phrase that carries two or more generic concept words but
//! no exact identifier is demoted to plain search.

use std::sync::LazyLock;

use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryIntent {
    Similar,
    Relations,
    Documentation,
    Examples,
    Search,
    Navigation,
}

impl std::fmt::Display for QueryIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Similar => "similar",
            Self::Relations => "relations",
            Self::Documentation => "documentation",
            Self::Examples => "examples",
            Self::Search => "search",
            Self::Navigation => "navigation",
        };
        write!(f, "{s}")
    }
}

static RELATIONS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(what|who)\s+(calls|uses|implements|extends)\b|\b(callers?|call\s+sites?|usages?)\s+of\b|\b(called|used|implemented|extended|inherited)\s+by\b|\bimplementations?\s+of\b|\bsubclasses?\s+of\b",
    )
    .expect("valid relations regex")
});

static INCOMING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(what|who)\s+calls\b|\bcallers?\s+of\b|\bcalled\s+by\b|\busages?\s+of\b|\bused\s+by\b")
        .expect("valid incoming regex")
});

static DOCUMENTATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(explain|describe|document(ation)?)\b|\bwhat\s+(is|does|are)\b|\bhow\s+(does|do)\b")
        .expect("valid documentation regex")
});

static EXAMPLES_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(examples?|usage|samples?)\b|\bhow\s+to\s+use\b").expect("valid examples regex")
});

static SEARCH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bsearch\b|\bfind\s+code\b|\blook(ing)?\s+for\b|\bgrep\b")
        .expect("valid search regex")
});

static NAVIGATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(find|show|locate|open|go\s+to|where\s+is|jump\s+to)\b")
        .expect("valid navigation regex")
});

static SYMBOL_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    // PascalCase (including single-hump names like `Login`), camelCase, or
    // snake_case identifiers longer than two characters.
    Regex::new(r"\b([A-Z][a-z0-9]+(?:[A-Z][a-z0-9]*)+|[A-Z][a-z0-9]{2,}|[a-z]+(?:[A-Z][a-z0-9]*)+|[A-Za-z][A-Za-z0-9]*_[A-Za-z0-9_]+)\b")
        .expect("valid symbol regex")
});

static PASCAL_CASE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z][a-z0-9]+(?:[A-Z][a-z0-9]*)+\b").expect("valid pascal regex"));

static FILE_PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[\w.-]+(?:[/\\][\w.-]+)*\.[A-Za-z0-9]{1,8}\b").expect("valid path regex")
});

/// Stop words stripped during keyword extraction.
const STOP_WORDS: &[&str] = &[
    "a", "all", "an", "and", "any", "are", "at", "be", "by", "can", "code", "do", "does", "find",
    "for", "from", "get", "has", "have", "how", "in", "is", "it", "me", "my", "of", "on", "or",
    "please", "show", "that", "the", "this", "to", "what", "where", "which", "who", "with", "you",
];

/// Generic concept words that demote a navigation phrase to search.
const CONCEPT_WORDS: &[&str] = &[
    "auth", "authentication", "cache", "caching", "config", "configuration", "database", "error",
    "handler", "handling", "log", "logging", "logic", "migration", "parsing", "queue", "request",
    "response", "retry", "routing", "security", "serialization", "session", "storage", "validation",
];

/// Detect the intent of a query. Rules run in a fixed order; the first
/// match wins.
pub fn detect(query: &str) -> QueryIntent {
    let trimmed = query.trim();

    if parse_similar(trimmed).is_some() {
        return QueryIntent::Similar;
    }
    if RELATIONS_RE.is_match(trimmed) {
        return QueryIntent::Relations;
    }
    if DOCUMENTATION_RE.is_match(trimmed) {
        return QueryIntent::Documentation;
    }
    if EXAMPLES_RE.is_match(trimmed) {
        return QueryIntent::Examples;
    }
    if SEARCH_RE.is_match(trimmed) {
        return QueryIntent::Search;
    }
    if NAVIGATION_RE.is_match(trimmed) {
        let concepts = concept_count(trimmed);
        let has_identifier = PASCAL_CASE_RE.is_match(trimmed);
        if concepts >= 2 && !has_identifier {
            return QueryIntent::Search;
        }
        return QueryIntent::Navigation;
    }
    QueryIntent::Search
}

/// `similar:<seed-id> [extra terms...]` → seed id and trailing filter
/// terms.
pub fn parse_similar(query: &str) -> Option<(String, Vec<String>)> {
    let rest = query.trim().strip_prefix("similar:")?;
    let mut parts = rest.split_whitespace();
    let seed = parts.next()?.to_string();
    if seed.is_empty() {
        return None;
    }
    let terms = parts.map(str::to_string).collect();
    Some((seed, terms))
}

/// Whether a relations phrase asks for incoming edges ("what calls X").
pub fn is_incoming(query: &str) -> bool {
    INCOMING_RE.is_match(query)
}

/// Keywords: lowercased words minus stop words, identifiers preserved.
pub fn extract_keywords(query: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    query
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| w.len() > 1)
        .map(str::to_lowercase)
        .filter(|w| STOP_WORDS.binary_search(&w.as_str()).is_err())
        .filter(|w| seen.insert(w.clone()))
        .collect()
}

/// Identifier-shaped names in the query (PascalCase, camelCase, or
/// snake_case), longer than two characters. Capitalised sentence-leading
/// words that are really stop words (`Show`, `Find`) are dropped.
pub fn extract_symbol_names(query: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    SYMBOL_NAME_RE
        .find_iter(query)
        .map(|m| m.as_str().to_string())
        .filter(|name| name.len() > 2)
        .filter(|name| STOP_WORDS.binary_search(&name.to_lowercase().as_str()).is_err())
        .filter(|name| seen.insert(name.clone()))
        .collect()
}

/// File paths mentioned in the query (`src/auth/login.cs` style).
pub fn extract_file_paths(query: &str) -> Vec<String> {
    FILE_PATH_RE
        .find_iter(query)
        .map(|m| m.as_str().to_string())
        .collect()
}

fn concept_count(query: &str) -> usize {
    query
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| CONCEPT_WORDS.binary_search(&w.as_str()).is_ok())
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn similar_prefix_wins_first() {
        let id = "0b7a8f3e-2c1d-4f6a-9e8b-123456789abc";
        assert_eq!(detect(&format!("similar:{id}")), QueryIntent::Similar);
        assert_eq!(
            detect(&format!("similar:{id} retry logic")),
            QueryIntent::Similar
        );
        let (seed, terms) = parse_similar(&format!("similar:{id} retry logic")).unwrap();
        assert_eq!(seed, id);
        assert_eq!(terms, vec!["retry", "logic"]);
    }

    #[test]
    fn relations_phrases_detected() {
        assert_eq!(detect("what calls the Login method?"), QueryIntent::Relations);
        assert_eq!(detect("callers of UserService"), QueryIntent::Relations);
        assert_eq!(detect("implementations of IRepository"), QueryIntent::Relations);
        assert!(is_incoming("what calls the Login method?"));
        assert!(!is_incoming("what does Login call"));
    }

    #[test]
    fn documentation_and_examples_detected() {
        assert_eq!(detect("explain the retry policy"), QueryIntent::Documentation);
        assert_eq!(detect("what is UserService"), QueryIntent::Documentation);
        assert_eq!(detect("usage of the cache client"), QueryIntent::Examples);
    }

    #[test]
    fn navigation_with_identifier_stays_navigation() {
        assert_eq!(detect("find UserService class"), QueryIntent::Navigation);
        assert_eq!(detect("show me the Login method"), QueryIntent::Navigation);
    }

    #[test]
    fn generic_navigation_demotes_to_search() {
        assert_eq!(detect("find authentication error handling"), QueryIntent::Search);
    }

    #[test]
    fn default_is_search() {
        assert_eq!(detect("token refresh"), QueryIntent::Search);
    }

    #[test]
    fn keywords_strip_stop_words() {
        let kws = extract_keywords("find the UserService for authentication");
        assert!(kws.contains(&"userservice".to_string()));
        assert!(kws.contains(&"authentication".to_string()));
        assert!(!kws.contains(&"the".to_string()));
        assert!(!kws.contains(&"find".to_string()));
    }

    #[test]
    fn symbol_names_match_common_casings() {
        let names = extract_symbol_names("compare UserService with parse_token and getValue");
        assert_eq!(names, vec!["UserService", "parse_token", "getValue"]);
    }

    #[test]
    fn single_hump_names_extracted_but_stop_words_dropped() {
        let names = extract_symbol_names("what calls the Login method?");
        assert_eq!(names, vec!["Login"]);

        let names = extract_symbol_names("Show me the Widget");
        assert_eq!(names, vec!["Widget"]);
    }

    #[test]
    fn file_paths_extracted() {
        let paths = extract_file_paths("look at src/auth/login.cs and README.md");
        assert_eq!(paths, vec!["src/auth/login.cs", "README.md"]);
    }

    #[test]
    fn stop_and_concept_tables_are_sorted() {
        let mut sorted = STOP_WORDS.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, STOP_WORDS);
        let mut sorted = CONCEPT_WORDS.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, CONCEPT_WORDS);
    }
}
