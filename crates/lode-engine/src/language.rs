//! Path and shebang based language detection.

use std::path::Path;

use lode_core::Language;

/// Detect the language of a file from its path, falling back to the shebang
/// line for extensionless scripts and to well-known filenames last.
pub fn detect(path: &str, source: Option<&str>) -> Language {
    let p = Path::new(path);

    if let Some(ext) = p.extension().and_then(|e| e.to_str()) {
        let lang = by_extension(&ext.to_ascii_lowercase());
        if lang != Language::Unknown {
            return lang;
        }
    }

    if let Some(src) = source {
        let lang = by_shebang(src);
        if lang != Language::Unknown {
            return lang;
        }
    }

    p.file_name()
        .and_then(|n| n.to_str())
        .map(by_filename)
        .unwrap_or(Language::Unknown)
}

/// Whether files of this language enter the index. Data and markup formats
/// carry no symbols worth extracting.
pub fn should_index(language: Language) -> bool {
    !matches!(
        language,
        Language::Json
            | Language::Yaml
            | Language::Toml
            | Language::Html
            | Language::Css
            | Language::Markdown
            | Language::Sql
            | Language::Unknown
    )
}

fn by_extension(ext: &str) -> Language {
    match ext {
        "cs" => Language::CSharp,
        "js" | "jsx" | "mjs" | "cjs" => Language::JavaScript,
        "ts" | "tsx" | "mts" | "cts" => Language::TypeScript,
        "py" | "pyi" => Language::Python,
        "java" => Language::Java,
        "go" => Language::Go,
        "rs" => Language::Rust,
        "rb" | "rake" => Language::Ruby,
        "sh" | "bash" | "zsh" => Language::Shell,
        "json" => Language::Json,
        "yml" | "yaml" => Language::Yaml,
        "toml" => Language::Toml,
        "html" | "htm" => Language::Html,
        "css" | "scss" | "less" => Language::Css,
        "md" | "markdown" => Language::Markdown,
        "sql" => Language::Sql,
        _ => Language::Unknown,
    }
}

fn by_shebang(source: &str) -> Language {
    let first = source.lines().next().unwrap_or("");
    if !first.starts_with("#!") {
        return Language::Unknown;
    }
    // Interpreter name is the last path segment; `env` forwards to the
    // following word.
    let mut words = first.trim_start_matches("#!").split_whitespace();
    let mut interp = words.next().unwrap_or("");
    if interp.ends_with("/env") {
        interp = words.next().unwrap_or("");
    }
    let interp = interp.rsplit('/').next().unwrap_or(interp);

    match interp.trim_end_matches(|c: char| c.is_ascii_digit() || c == '.') {
        "python" => Language::Python,
        "node" | "nodejs" => Language::JavaScript,
        "bash" | "sh" | "zsh" => Language::Shell,
        "ruby" => Language::Ruby,
        _ => Language::Unknown,
    }
}

fn by_filename(name: &str) -> Language {
    match name {
        "Rakefile" | "Gemfile" => Language::Ruby,
        "Dockerfile" | "Makefile" => Language::Unknown,
        "BUILD" | "WORKSPACE" => Language::Python,
        _ => Language::Unknown,
    }
}
