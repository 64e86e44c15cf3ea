use lode_core::{Language, SymbolKind};
use lode_engine::parser::{ParseContext, ParserRegistry};
use uuid::Uuid;

fn ctx() -> (Uuid, &'static str, &'static str) {
    (Uuid::new_v4(), "main", "abc123")
}

fn parse(language: Language, file: &str, source: &str) -> lode_core::ParsedFile {
    let (repo_id, branch, sha) = ctx();
    let registry = ParserRegistry::new();
    let parse_ctx = ParseContext {
        repo_id,
        branch_name: branch,
        commit_sha: sha,
    };
    registry.parse(&parse_ctx, file, language, source)
}

#[test]
fn typescript_classes_functions_and_methods() {
    let source = r#"
export interface TokenProvider {
  refresh(): Promise<string>;
}

export class AuthClient {
  private token: string;

  constructor(provider: TokenProvider) {
    this.token = "";
  }

  async login(user: string): Promise<void> {
    await this.refresh();
  }
}

export function createClient(provider: TokenProvider) {
  return new AuthClient(provider);
}

export const parseHeader = (raw: string) => raw.trim();
"#;
    let parsed = parse(Language::TypeScript, "src/auth.ts", source);
    assert!(parsed.success);

    let find = |name: &str| {
        parsed
            .symbols
            .iter()
            .find(|s| s.name == name)
            .unwrap_or_else(|| panic!("missing {name}: {:?}", names(&parsed)))
    };

    assert_eq!(find("TokenProvider").kind, SymbolKind::Interface);
    assert_eq!(find("AuthClient").kind, SymbolKind::Class);
    assert_eq!(find("login").kind, SymbolKind::Method);
    assert_eq!(find("createClient").kind, SymbolKind::Function);
    assert_eq!(find("parseHeader").kind, SymbolKind::Function);

    // Methods parent to their class.
    assert_eq!(find("login").parent_symbol_id, Some(find("AuthClient").id));
}

#[test]
fn typescript_spans_cover_the_block() {
    let source = "class A {\n  m() {\n    return 1;\n  }\n}\n";
    let parsed = parse(Language::TypeScript, "a.ts", source);

    let class = parsed.symbols.iter().find(|s| s.name == "A").unwrap();
    assert_eq!(class.span.start_line, 1);
    assert_eq!(class.span.end_line, 5);

    let method = parsed.symbols.iter().find(|s| s.name == "m").unwrap();
    assert_eq!(method.span.start_line, 2);
    assert_eq!(method.span.end_line, 4);
}

#[test]
fn python_functions_vs_methods_by_indentation() {
    let source = r#"
class AuthService:
    def __init__(self, secret):
        self.secret = secret

    def validate(self, token):
        return True

def authenticate_user(request):
    return validate_token(request)
"#;
    let parsed = parse(Language::Python, "auth.py", source);
    assert!(parsed.success);

    let find = |name: &str| parsed.symbols.iter().find(|s| s.name == name).unwrap();

    assert_eq!(find("AuthService").kind, SymbolKind::Class);
    assert_eq!(find("validate").kind, SymbolKind::Method);
    assert_eq!(find("authenticate_user").kind, SymbolKind::Function);
    assert_eq!(
        find("validate").parent_symbol_id,
        Some(find("AuthService").id)
    );
}

#[test]
fn python_block_extent_by_indentation() {
    let source = "def top():\n    a = 1\n    b = 2\n\ndef next_fn():\n    pass\n";
    let parsed = parse(Language::Python, "mod.py", source);

    let top = parsed.symbols.iter().find(|s| s.name == "top").unwrap();
    assert_eq!(top.span.start_line, 1);
    assert_eq!(top.span.end_line, 3);
}

#[test]
fn java_types_methods_and_constructors() {
    let source = r#"
public class OrderService {
    private final Repository repo;

    public OrderService(Repository repo) {
        this.repo = repo;
    }

    public Order findOrder(String id) {
        return repo.get(id);
    }
}

interface Repository {
}
"#;
    let parsed = parse(Language::Java, "OrderService.java", source);

    let find = |name: &str| {
        parsed
            .symbols
            .iter()
            .find(|s| s.name == name)
            .unwrap_or_else(|| panic!("missing {name}: {:?}", names(&parsed)))
    };

    assert_eq!(find("OrderService").kind, SymbolKind::Class);
    assert_eq!(find("Repository").kind, SymbolKind::Interface);
    assert_eq!(find("findOrder").kind, SymbolKind::Method);

    // Constructor recognised by matching the enclosing class name.
    let ctor = parsed
        .symbols
        .iter()
        .find(|s| s.kind == SymbolKind::Constructor)
        .expect("constructor");
    assert_eq!(ctor.name, "OrderService");
}

#[test]
fn go_functions_methods_and_types() {
    let source = r#"
type Client struct {
	baseURL string
}

type Doer interface {
	Do(req *Request) error
}

func NewClient(url string) *Client {
	return &Client{baseURL: url}
}

func (c *Client) Get(path string) error {
	return nil
}
"#;
    let parsed = parse(Language::Go, "client.go", source);

    let find = |name: &str| parsed.symbols.iter().find(|s| s.name == name).unwrap();

    assert_eq!(find("Client").kind, SymbolKind::Struct);
    assert_eq!(find("Doer").kind, SymbolKind::Interface);
    assert_eq!(find("NewClient").kind, SymbolKind::Function);
    assert_eq!(find("Get").kind, SymbolKind::Method);
}

#[test]
fn rust_items_extracted() {
    let source = r#"
pub struct Cache {
    entries: Vec<Entry>,
}

pub enum Entry {
    Hit,
    Miss,
}

pub trait Evict {
    fn evict(&mut self);
}

pub fn new_cache() -> Cache {
    Cache { entries: Vec::new() }
}
"#;
    let parsed = parse(Language::Rust, "cache.rs", source);

    let find = |name: &str| parsed.symbols.iter().find(|s| s.name == name).unwrap();

    assert_eq!(find("Cache").kind, SymbolKind::Struct);
    assert_eq!(find("Entry").kind, SymbolKind::Enum);
    assert_eq!(find("Evict").kind, SymbolKind::Interface);
    assert_eq!(find("new_cache").kind, SymbolKind::Function);
}

#[test]
fn signatures_are_the_declaration_line() {
    let source = "export function createClient(provider: TokenProvider) {\n}\n";
    let parsed = parse(Language::TypeScript, "c.ts", source);
    let sig = parsed.symbols[0].signature.as_deref().unwrap();
    assert_eq!(sig, "export function createClient(provider: TokenProvider)");
}

#[test]
fn control_flow_is_not_a_method() {
    let source = "class A {\n  m() {\n    if (x) {\n      while (y) {}\n    }\n  }\n}\n";
    let parsed = parse(Language::TypeScript, "a.ts", source);
    let names = names(&parsed);
    assert!(!names.contains(&"if"));
    assert!(!names.contains(&"while"));
}

#[test]
fn unsupported_language_fails_softly() {
    let (repo_id, branch, sha) = ctx();
    let registry = ParserRegistry::new();
    let parse_ctx = ParseContext {
        repo_id,
        branch_name: branch,
        commit_sha: sha,
    };
    let parsed = parse_ctx_parse(&registry, &parse_ctx, Language::Ruby);
    assert!(!parsed.success);
    assert!(parsed.symbols.is_empty());
    assert!(parsed.error.is_some());
}

fn parse_ctx_parse(
    registry: &ParserRegistry,
    ctx: &ParseContext<'_>,
    language: Language,
) -> lode_core::ParsedFile {
    registry.parse(ctx, "script.rb", language, "def hello; end\n")
}

fn names(parsed: &lode_core::ParsedFile) -> Vec<&str> {
    parsed.symbols.iter().map(|s| s.name.as_str()).collect()
}
