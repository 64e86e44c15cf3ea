use lode_core::{EdgeKind, Language, ParsedFile, SymbolKind};
use lode_engine::parser::{ParseContext, ParserRegistry};
use uuid::Uuid;

fn parse(source: &str) -> ParsedFile {
    let repo_id = Uuid::new_v4();
    let registry = ParserRegistry::new();
    let ctx = ParseContext {
        repo_id,
        branch_name: "main",
        commit_sha: "abc123",
    };
    registry.parse(&ctx, "src/Service.cs", Language::CSharp, source)
}

const SOURCE: &str = r#"
namespace App.Auth
{
    /// Validates session tokens.
    public class UserService : BaseService, IUserService
    {
        private TokenCache _cache;

        public string DisplayName { get; set; }

        public UserService(TokenCache cache)
        {
            _cache = cache;
        }

        /// Checks a login attempt.
        public AuthResult Login(string name, int attempts)
        {
            Validate(name);
            _cache.Store(name);
            return null;
        }

        private void Validate(string name)
        {
        }
    }

    public interface IUserService
    {
    }

    public enum AuthResultKind
    {
        Ok,
        Denied
    }
}
"#;

fn find<'a>(parsed: &'a ParsedFile, name: &str) -> &'a lode_core::Symbol {
    parsed
        .symbols
        .iter()
        .find(|s| s.name == name)
        .unwrap_or_else(|| {
            let names: Vec<&str> = parsed.symbols.iter().map(|s| s.name.as_str()).collect();
            panic!("missing symbol {name}, got {names:?}")
        })
}

#[test]
fn extracts_symbols_with_kinds() {
    let parsed = parse(SOURCE);
    assert!(parsed.success, "error: {:?}", parsed.error);

    assert_eq!(find(&parsed, "Auth").kind, SymbolKind::Namespace);
    assert_eq!(find(&parsed, "UserService").kind, SymbolKind::Class);
    assert_eq!(find(&parsed, "IUserService").kind, SymbolKind::Interface);
    assert_eq!(find(&parsed, "AuthResultKind").kind, SymbolKind::Enum);
    assert_eq!(find(&parsed, "Login").kind, SymbolKind::Method);
    assert_eq!(find(&parsed, "DisplayName").kind, SymbolKind::Property);
    assert_eq!(find(&parsed, "_cache").kind, SymbolKind::Field);

    let ctor = parsed
        .symbols
        .iter()
        .find(|s| s.kind == SymbolKind::Constructor)
        .expect("constructor");
    assert_eq!(ctor.name, "UserService");
}

#[test]
fn qualified_names_follow_the_scope_stack() {
    let parsed = parse(SOURCE);

    assert_eq!(
        find(&parsed, "UserService").qualified_name.as_deref(),
        Some("App.Auth.UserService")
    );
    assert_eq!(
        find(&parsed, "Login").qualified_name.as_deref(),
        Some("App.Auth.UserService.Login")
    );
}

#[test]
fn parent_back_references_are_set() {
    let parsed = parse(SOURCE);

    let class = find(&parsed, "UserService");
    let login = find(&parsed, "Login");
    assert_eq!(login.parent_symbol_id, Some(class.id));

    let namespace = find(&parsed, "Auth");
    assert_eq!(class.parent_symbol_id, Some(namespace.id));
}

#[test]
fn base_list_produces_inherits_and_implements() {
    let parsed = parse(SOURCE);
    let class = find(&parsed, "UserService");

    let inherits: Vec<&str> = parsed
        .edges
        .iter()
        .filter(|e| e.source_symbol_id == class.id && e.kind == EdgeKind::Inherits)
        .map(|e| e.target.as_str())
        .collect();
    assert_eq!(inherits, vec!["BaseService"]);

    let implements: Vec<&str> = parsed
        .edges
        .iter()
        .filter(|e| e.source_symbol_id == class.id && e.kind == EdgeKind::Implements)
        .map(|e| e.target.as_str())
        .collect();
    assert_eq!(implements, vec!["IUserService"]);
}

#[test]
fn invocations_become_call_edges() {
    let parsed = parse(SOURCE);
    let login = find(&parsed, "Login");

    let calls: Vec<&str> = parsed
        .edges
        .iter()
        .filter(|e| e.source_symbol_id == login.id && e.kind == EdgeKind::Calls)
        .map(|e| e.target.as_str())
        .collect();

    // Single-segment local callees are upgraded to their qualified names;
    // member-access callees keep their textual path.
    assert!(
        calls.contains(&"App.Auth.UserService.Validate"),
        "calls: {calls:?}"
    );
    assert!(calls.contains(&"_cache.Store"), "calls: {calls:?}");
}

#[test]
fn primitive_types_never_produce_edges() {
    let parsed = parse(SOURCE);
    let login = find(&parsed, "Login");

    // Login(string name, int attempts) → no TypeOf edges for string/int.
    let type_edges: Vec<&str> = parsed
        .edges
        .iter()
        .filter(|e| e.source_symbol_id == login.id && e.kind == EdgeKind::TypeOf)
        .map(|e| e.target.as_str())
        .collect();
    assert!(type_edges.is_empty(), "unexpected: {type_edges:?}");

    // But AuthResult (non-primitive return) is a Returns edge.
    let returns: Vec<&str> = parsed
        .edges
        .iter()
        .filter(|e| e.source_symbol_id == login.id && e.kind == EdgeKind::Returns)
        .map(|e| e.target.as_str())
        .collect();
    assert_eq!(returns, vec!["AuthResult"]);
}

#[test]
fn field_and_property_types_produce_typeof_edges() {
    let parsed = parse(SOURCE);
    let field = find(&parsed, "_cache");

    let typeof_targets: Vec<&str> = parsed
        .edges
        .iter()
        .filter(|e| e.source_symbol_id == field.id && e.kind == EdgeKind::TypeOf)
        .map(|e| e.target.as_str())
        .collect();
    assert_eq!(typeof_targets, vec!["TokenCache"]);

    // DisplayName is a string property: primitive, no edge.
    let prop = find(&parsed, "DisplayName");
    assert!(!parsed
        .edges
        .iter()
        .any(|e| e.source_symbol_id == prop.id && e.kind == EdgeKind::TypeOf));
}

#[test]
fn doc_comments_and_modifiers_are_captured() {
    let parsed = parse(SOURCE);

    let class = find(&parsed, "UserService");
    assert_eq!(class.documentation.as_deref(), Some("Validates session tokens."));
    assert!(class.modifiers.contains(&"public".to_string()));

    let login = find(&parsed, "Login");
    assert_eq!(login.documentation.as_deref(), Some("Checks a login attempt."));

    let validate = find(&parsed, "Validate");
    assert!(validate.modifiers.contains(&"private".to_string()));
}

#[test]
fn spans_are_one_based_and_ordered() {
    let parsed = parse(SOURCE);
    for symbol in &parsed.symbols {
        assert!(symbol.span.start_line >= 1);
        assert!(symbol.span.end_line >= symbol.span.start_line);
    }
}

#[test]
fn garbage_input_never_panics() {
    let parsed = parse("%%% not actually c# {{{");
    // tree-sitter is error-tolerant; the parse reports success with
    // whatever it could extract, and must never panic.
    assert!(parsed.edges.iter().all(|e| !e.target.is_empty()));
}

#[test]
fn empty_input_yields_no_symbols() {
    let parsed = parse("");
    assert!(parsed.success);
    assert!(parsed.symbols.is_empty());
    assert!(parsed.edges.is_empty());
}
