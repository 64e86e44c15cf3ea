//! Query orchestration.
//!
//! The single public operation: detect intent, retrieve through the right
//! strategy (symbol lookup, relation expansion, hybrid lexical/vector
//! search, or SimHash similarity), optionally re-rank by graph degree,
//! and compact the response. Stateless — everything lives in the store.

use std::collections::HashMap;
use std::sync::Arc;

use lode_core::config::Config;
use lode_core::{Language, Repository, Result, RetrievalProfile, Symbol, SymbolId};

use crate::embed::EmbeddingProvider;
use crate::query::{
    intent, Compactor, QueryIntent, QueryMetadata, QueryResponse, QueryResult, RelatedEntry,
};
use crate::store::Store;
use crate::text::Fingerprint;

const BM25_WEIGHT: f64 = 0.3;
const VECTOR_WEIGHT: f64 = 0.7;
const RELATION_LIMIT: i64 = 10;
const SIMILAR_LIMIT: usize = 10;
const CANDIDATE_CAP: i64 = 2000;
const RELATED_CONTEXT_RESULTS: usize = 3;

#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub repository: String,
    pub query: String,
    pub branch: Option<String>,
    pub language: Option<Language>,
    pub max_results: usize,
    pub profile: Option<RetrievalProfile>,
    pub include_related: bool,
}

/// A result plus the symbol it came from, kept until graph re-ranking is
/// done.
struct Scored {
    result: QueryResult,
    symbol_id: Option<SymbolId>,
}

pub struct QueryEngine {
    store: Store,
    provider: Arc<EmbeddingProvider>,
    compactor: Compactor,
    default_profile: RetrievalProfile,
}

impl QueryEngine {
    pub fn new(store: Store, provider: Arc<EmbeddingProvider>, config: &Config) -> Self {
        Self {
            store,
            provider,
            compactor: Compactor::new(config.response.clone()),
            default_profile: config.default_profile,
        }
    }

    /// Execute one query. Never fails outward: any error becomes a
    /// well-formed response with a machine-readable metadata code.
    pub async fn query(&self, request: QueryRequest) -> QueryResponse {
        let branch_label = request.branch.clone().unwrap_or_default();
        match self.execute(&request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("query failed: {e}");
                error_response(
                    &request.repository,
                    &branch_label,
                    &request.query,
                    "internal_error",
                    &e.to_string(),
                )
            }
        }
    }

    async fn execute(&self, request: &QueryRequest) -> Result<QueryResponse> {
        let Some(repo) = self.store.repos.get_by_name(&request.repository).await? else {
            return Ok(error_response(
                &request.repository,
                request.branch.as_deref().unwrap_or(""),
                &request.query,
                "repository_not_found",
                "repository is not indexed",
            ));
        };

        let branch = request
            .branch
            .clone()
            .unwrap_or_else(|| repo.default_branch.clone());
        if let Err(e) = self.store.repos.touch_branch(repo.id, &branch).await {
            tracing::debug!("touch branch failed: {e}");
        }

        let query_intent = intent::detect(&request.query);
        let profile = request.profile.unwrap_or(self.default_profile);

        let mut metadata = QueryMetadata {
            keywords: intent::extract_keywords(&request.query),
            profile: profile.to_string(),
            ..QueryMetadata::default()
        };

        let mut scored = match query_intent {
            QueryIntent::Similar => {
                return self
                    .similarity(request, &repo, &branch, &mut metadata)
                    .await;
            }
            QueryIntent::Navigation => {
                let mut results = self.navigation(request, &repo, &branch).await?;
                if results.is_empty() {
                    results = self
                        .hybrid(request, &repo, &branch, profile, &mut metadata)
                        .await?;
                }
                results
            }
            QueryIntent::Relations => {
                self.relations(request, &repo, &branch, profile, &mut metadata)
                    .await?
            }
            QueryIntent::Documentation | QueryIntent::Examples | QueryIntent::Search => {
                self.hybrid(request, &repo, &branch, profile, &mut metadata)
                    .await?
            }
        };

        if request.include_related && query_intent != QueryIntent::Relations {
            self.graph_rerank(&mut scored).await?;
        }

        let results: Vec<QueryResult> = scored.into_iter().map(|s| s.result).collect();
        let suggestions = build_suggestions(query_intent, &results);

        let response = QueryResponse {
            repo: repo.name.clone(),
            branch,
            query: request.query.clone(),
            intent: query_intent.to_string(),
            total: results.len(),
            results,
            suggestions,
            metadata,
        };
        Ok(self.compactor.compact(response))
    }

    // ── navigation ──

    async fn navigation(
        &self,
        request: &QueryRequest,
        repo: &Repository,
        branch: &str,
    ) -> Result<Vec<Scored>> {
        let names = intent::extract_symbol_names(&request.query);
        let needle = match names.first() {
            Some(name) => name.clone(),
            None => return Ok(Vec::new()),
        };

        let symbols = self
            .store
            .symbols
            .find_by_name(
                repo.id,
                branch,
                &needle,
                request.language,
                request.max_results as i64,
            )
            .await?;

        // A file path mentioned in the query pins matches in that file to
        // the top.
        let paths = intent::extract_file_paths(&request.query);

        let mut scored: Vec<Scored> = symbols
            .into_iter()
            .map(|sym| {
                let exact = sym.name.eq_ignore_ascii_case(&needle);
                let in_named_file = paths.iter().any(|p| sym.file_path.ends_with(p.as_str()));
                let score = match (exact, in_named_file) {
                    (true, _) => 1.0,
                    (false, true) => 0.9,
                    (false, false) => 0.8,
                };
                Scored {
                    symbol_id: Some(sym.id),
                    result: symbol_result(&sym, score, "symbol"),
                }
            })
            .collect();
        scored.sort_by(|a, b| b.result.score.total_cmp(&a.result.score));
        Ok(scored)
    }

    // ── relations ──

    async fn relations(
        &self,
        request: &QueryRequest,
        repo: &Repository,
        branch: &str,
        profile: RetrievalProfile,
        metadata: &mut QueryMetadata,
    ) -> Result<Vec<Scored>> {
        let names = intent::extract_symbol_names(&request.query);
        let Some(needle) = names.first() else {
            return self.hybrid(request, repo, branch, profile, metadata).await;
        };

        let symbols = self
            .store
            .symbols
            .find_by_name(repo.id, branch, needle, request.language, 1)
            .await?;
        let Some(target) = symbols.into_iter().next() else {
            return self.hybrid(request, repo, branch, profile, metadata).await;
        };

        let outgoing = self.store.edges.outgoing(target.id, RELATION_LIMIT).await?;
        let incoming = self.store.edges.incoming(target.id, RELATION_LIMIT).await?;

        let mut related: Vec<RelatedEntry> = Vec::new();
        for n in &outgoing {
            related.push(RelatedEntry {
                relation: n.kind.to_string(),
                symbol: n.symbol.name.clone(),
            });
        }
        for n in &incoming {
            related.push(RelatedEntry {
                relation: incoming_label(n.kind),
                symbol: n.symbol.name.clone(),
            });
        }

        let mut primary = symbol_result(&target, 1.0, "symbol_with_relations");
        primary.related = (!related.is_empty()).then_some(related);

        let mut scored = vec![Scored {
            symbol_id: Some(target.id),
            result: primary,
        }];

        // "what calls X" promotes each caller to a primary result.
        if intent::is_incoming(&request.query) {
            for n in &incoming {
                let mut caller = symbol_result(&n.symbol, 0.9, "caller");
                caller.related = Some(vec![RelatedEntry {
                    relation: n.kind.to_string(),
                    symbol: target.name.clone(),
                }]);
                scored.push(Scored {
                    symbol_id: Some(n.symbol.id),
                    result: caller,
                });
            }
        }

        if request.include_related {
            let extra = self
                .hybrid(request, repo, branch, profile, metadata)
                .await?;
            scored.extend(extra.into_iter().take(RELATED_CONTEXT_RESULTS));
        }

        Ok(scored)
    }

    // ── hybrid search ──

    async fn hybrid(
        &self,
        request: &QueryRequest,
        repo: &Repository,
        branch: &str,
        profile: RetrievalProfile,
        metadata: &mut QueryMetadata,
    ) -> Result<Vec<Scored>> {
        // Fast profile goes symbol-first: ranked full-text over the symbol
        // documents, falling through to chunk search only when empty.
        if profile == RetrievalProfile::Fast {
            let hits = self
                .store
                .search
                .full_text(
                    repo.id,
                    branch,
                    &request.query,
                    request.language,
                    request.max_results as i64,
                )
                .await?;
            if !hits.is_empty() {
                let ids: Vec<SymbolId> = hits.iter().map(|h| h.symbol_id).collect();
                let symbols: HashMap<SymbolId, Symbol> = self
                    .store
                    .symbols
                    .get_by_ids(&ids)
                    .await?
                    .into_iter()
                    .map(|s| (s.id, s))
                    .collect();

                let mut scored = Vec::new();
                for hit in hits {
                    let Some(sym) = symbols.get(&hit.symbol_id) else {
                        continue;
                    };
                    let mut result = symbol_result(sym, hit.rank.min(1.0), "symbol");
                    result.content = Some(hit.snippet);
                    scored.push(Scored {
                        symbol_id: Some(sym.id),
                        result,
                    });
                }
                return Ok(scored);
            }
        }

        let query_vector = match profile {
            RetrievalProfile::Fast => None,
            RetrievalProfile::Hybrid | RetrievalProfile::Semantic => {
                if !self.provider.enabled() {
                    metadata.fallback = Some("embeddings_disabled".to_string());
                    metadata.embedding_used = Some(false);
                    None
                } else {
                    match self.provider.embed_one(&request.query).await {
                        Ok(Some(vector)) if vector.is_empty() => {
                            metadata.fallback = Some("missing_query_embedding".to_string());
                            metadata.embedding_used = Some(false);
                            None
                        }
                        Ok(Some(vector)) if vector.iter().any(|v| !v.is_finite()) => {
                            metadata.fallback = Some("invalid_query_embedding".to_string());
                            metadata.embedding_used = Some(false);
                            None
                        }
                        Ok(vector) => {
                            metadata.embedding_used = Some(vector.is_some());
                            if vector.is_some() {
                                metadata.embedding_model =
                                    Some(self.provider.model().to_string());
                            }
                            vector
                        }
                        Err(e) => {
                            tracing::warn!("query embedding failed: {e}");
                            metadata.fallback =
                                Some("embedding_provider_unavailable".to_string());
                            metadata.embedding_used = Some(false);
                            None
                        }
                    }
                }
            }
        };

        let limit = (request.max_results * 2) as i64;
        let hits = match self
            .store
            .chunks
            .hybrid_search(
                repo.id,
                branch,
                &request.query,
                query_vector.as_deref(),
                BM25_WEIGHT,
                VECTOR_WEIGHT,
                limit,
            )
            .await
        {
            Ok(hits) => hits,
            // A vector the store rejects (wrong dimensionality after a
            // model change) degrades to lexical search.
            Err(e) if query_vector.is_some() => {
                tracing::warn!("vector search failed, falling back to lexical: {e}");
                metadata.fallback = Some("invalid_query_embedding_dims".to_string());
                metadata.embedding_used = Some(false);
                self.store
                    .chunks
                    .hybrid_search(repo.id, branch, &request.query, None, BM25_WEIGHT, VECTOR_WEIGHT, limit)
                    .await?
            }
            Err(e) => return Err(e),
        };

        let ids: Vec<_> = hits.iter().map(|h| h.chunk_id).collect();
        let chunks: HashMap<_, _> = self
            .store
            .chunks
            .get_by_ids(&ids)
            .await?
            .into_iter()
            .map(|c| (c.id, c))
            .collect();

        let mut scored = Vec::new();
        for hit in hits {
            let Some(chunk) = chunks.get(&hit.chunk_id) else {
                continue;
            };
            scored.push(Scored {
                symbol_id: chunk.symbol_id,
                result: QueryResult {
                    file: chunk.file_path.clone(),
                    lines: format!("{}-{}", chunk.chunk_start_line, chunk.chunk_end_line),
                    score: hit.score,
                    result_type: "chunk".to_string(),
                    symbol: Some(chunk.symbol_name.clone()),
                    kind: Some(chunk.symbol_kind.to_string()),
                    sig: chunk.signature.clone(),
                    content: Some(chunk.content.clone()),
                    docs: chunk.documentation.clone(),
                    related: None,
                    reasons: None,
                },
            });
        }
        Ok(scored)
    }

    // ── similarity ──

    async fn similarity(
        &self,
        request: &QueryRequest,
        repo: &Repository,
        branch: &str,
        metadata: &mut QueryMetadata,
    ) -> Result<QueryResponse> {
        let parsed = intent::parse_similar(&request.query);
        let (seed_raw, terms) = match parsed {
            Some(parts) => parts,
            None => {
                return Ok(self.similarity_error(repo, branch, request, metadata, "seed_not_found"))
            }
        };

        let Ok(seed_id) = seed_raw.parse::<SymbolId>() else {
            return Ok(self.similarity_error(repo, branch, request, metadata, "seed_not_found"));
        };

        if self.store.repos.branch(repo.id, branch).await?.is_none() {
            return Ok(self.similarity_error(repo, branch, request, metadata, "seed_scope_missing"));
        }

        let Some(seed) = self.store.symbols.get_by_id(seed_id).await? else {
            return Ok(self.similarity_error(repo, branch, request, metadata, "seed_not_found"));
        };
        if seed.repo_id != repo.id || seed.branch_name != branch {
            return Ok(self.similarity_error(repo, branch, request, metadata, "seed_scope_mismatch"));
        }

        let Some(seed_fp) = self.store.fingerprints.get(seed_id).await? else {
            return Ok(self.similarity_error(
                repo,
                branch,
                request,
                metadata,
                "seed_fingerprint_missing",
            ));
        };

        let seed_print = Fingerprint::from_value(seed_fp.fingerprint);
        let mut candidates: Vec<(SymbolId, u32)> = self
            .store
            .fingerprints
            .candidates(&seed_fp, CANDIDATE_CAP)
            .await?
            .into_iter()
            .map(|(id, fp)| (id, seed_print.distance(&Fingerprint::from_value(fp))))
            .collect();

        candidates.sort_by_key(|(_, d)| *d);
        candidates.truncate(SIMILAR_LIMIT);

        let ids: Vec<SymbolId> = candidates.iter().map(|(id, _)| *id).collect();
        let symbols: HashMap<SymbolId, Symbol> = self
            .store
            .symbols
            .get_by_ids(&ids)
            .await?
            .into_iter()
            .map(|s| (s.id, s))
            .collect();
        let snippets = self.store.search.snippets(&ids).await?;

        let mut results = Vec::new();
        for (id, distance) in candidates {
            let Some(sym) = symbols.get(&id) else { continue };
            let snippet = snippets.get(&id).cloned();
            if !matches_terms(sym, snippet.as_deref(), &terms) {
                continue;
            }

            let mut result = symbol_result(sym, 1.0 - f64::from(distance) / 64.0, "similar");
            result.content = snippet;
            result.reasons = Some(vec![
                "similarity:simhash".to_string(),
                format!("distance:{distance}"),
                format!("seed:{seed_id}"),
            ]);
            results.push(result);
        }

        let response = QueryResponse {
            repo: repo.name.clone(),
            branch: branch.to_string(),
            query: request.query.clone(),
            intent: QueryIntent::Similar.to_string(),
            total: results.len(),
            results,
            suggestions: Vec::new(),
            metadata: metadata.clone(),
        };
        Ok(self.compactor.compact(response))
    }

    fn similarity_error(
        &self,
        repo: &Repository,
        branch: &str,
        request: &QueryRequest,
        metadata: &QueryMetadata,
        code: &str,
    ) -> QueryResponse {
        let mut metadata = metadata.clone();
        metadata.error_code = Some(code.to_string());
        QueryResponse {
            repo: repo.name.clone(),
            branch: branch.to_string(),
            query: request.query.clone(),
            intent: QueryIntent::Similar.to_string(),
            total: 0,
            results: Vec::new(),
            suggestions: Vec::new(),
            metadata,
        }
    }

    // ── graph re-rank ──

    /// Blend each result's retrieval score with its graph connectivity:
    /// `0.7 · score + 0.3 · min(1, (out + 2·in) / 20)`.
    async fn graph_rerank(&self, scored: &mut [Scored]) -> Result<()> {
        for entry in scored.iter_mut() {
            let Some(symbol_id) = entry.symbol_id else {
                continue;
            };
            let (out_degree, in_degree) = self.store.edges.degree(symbol_id).await?;
            let graph_score =
                ((out_degree as f64 + 2.0 * in_degree as f64) / 20.0).min(1.0);
            entry.result.score = 0.7 * entry.result.score + 0.3 * graph_score;
        }
        scored.sort_by(|a, b| b.result.score.total_cmp(&a.result.score));
        Ok(())
    }
}

// ── helpers ──

fn symbol_result(symbol: &Symbol, score: f64, result_type: &str) -> QueryResult {
    QueryResult {
        file: symbol.file_path.clone(),
        lines: format!("{}-{}", symbol.span.start_line, symbol.span.end_line),
        score,
        result_type: result_type.to_string(),
        symbol: Some(symbol.name.clone()),
        kind: Some(capitalized_kind(symbol)),
        sig: symbol.signature.clone(),
        content: None,
        docs: symbol.documentation.clone(),
        related: None,
        reasons: None,
    }
}

/// Kind labels are surfaced in PascalCase (`Class`, `Method`).
fn capitalized_kind(symbol: &Symbol) -> String {
    let kind = symbol.kind.to_string();
    let mut chars = kind.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => kind,
    }
}

fn incoming_label(kind: lode_core::EdgeKind) -> String {
    use lode_core::EdgeKind;
    match kind {
        EdgeKind::Calls => "called_by".to_string(),
        EdgeKind::Inherits => "inherited_by".to_string(),
        EdgeKind::Implements => "implemented_by".to_string(),
        EdgeKind::TypeOf => "typed_by".to_string(),
        EdgeKind::Returns => "returned_by".to_string(),
    }
}

fn matches_terms(symbol: &Symbol, snippet: Option<&str>, terms: &[String]) -> bool {
    if terms.is_empty() {
        return true;
    }
    let haystack = format!(
        "{} {} {} {} {}",
        symbol.name,
        symbol.qualified_name.as_deref().unwrap_or(""),
        symbol.signature.as_deref().unwrap_or(""),
        symbol.documentation.as_deref().unwrap_or(""),
        snippet.unwrap_or(""),
    )
    .to_lowercase();

    terms.iter().all(|t| haystack.contains(&t.to_lowercase()))
}

fn build_suggestions(query_intent: QueryIntent, results: &[QueryResult]) -> Vec<String> {
    let top_symbol = results.iter().find_map(|r| r.symbol.as_deref());
    let Some(name) = top_symbol else {
        return Vec::new();
    };

    match query_intent {
        QueryIntent::Navigation => vec![
            format!("Show me the implementation of {name}"),
            format!("what calls {name}?"),
        ],
        QueryIntent::Relations => vec![format!("explain {name}")],
        QueryIntent::Documentation => vec![format!("usage of {name}")],
        QueryIntent::Examples | QueryIntent::Search => {
            vec![format!("what calls {name}?"), format!("explain {name}")]
        }
        QueryIntent::Similar => Vec::new(),
    }
}

fn error_response(
    repo: &str,
    branch: &str,
    query: &str,
    code: &str,
    message: &str,
) -> QueryResponse {
    QueryResponse {
        repo: repo.to_string(),
        branch: branch.to_string(),
        query: query.to_string(),
        intent: QueryIntent::Search.to_string(),
        total: 0,
        results: Vec::new(),
        suggestions: Vec::new(),
        metadata: QueryMetadata {
            error_code: Some(code.to_string()),
            error: Some(message.to_string()),
            ..QueryMetadata::default()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lode_core::{Span, SymbolKind};
    use uuid::Uuid;

    fn sample_symbol(name: &str) -> Symbol {
        Symbol {
            id: Uuid::new_v4(),
            repo_id: Uuid::new_v4(),
            branch_name: "main".into(),
            file_path: "src/auth.cs".into(),
            commit_sha: "abc".into(),
            name: name.into(),
            qualified_name: Some(format!("App.Auth.{name}")),
            kind: SymbolKind::Class,
            language: Language::CSharp,
            span: Span { start_line: 10, start_col: 1, end_line: 42, end_col: 2 },
            signature: Some(format!("public class {name}")),
            documentation: Some("Handles session tokens.".into()),
            modifiers: vec!["public".into()],
            parent_symbol_id: None,
        }
    }

    #[test]
    fn symbol_result_renders_lines_and_kind() {
        let result = symbol_result(&sample_symbol("UserService"), 1.0, "symbol");
        assert_eq!(result.lines, "10-42");
        assert_eq!(result.kind.as_deref(), Some("Class"));
        assert_eq!(result.symbol.as_deref(), Some("UserService"));
        assert_eq!(result.result_type, "symbol");
    }

    #[test]
    fn term_filter_matches_across_fields() {
        let sym = sample_symbol("TokenCache");
        assert!(matches_terms(&sym, None, &[]));
        assert!(matches_terms(&sym, None, &["token".into()]));
        assert!(matches_terms(&sym, None, &["session".into()])); // docs
        assert!(matches_terms(&sym, Some("uses RedisClient"), &["redis".into()]));
        assert!(!matches_terms(&sym, None, &["kafka".into()]));
    }

    #[test]
    fn incoming_labels_are_directional() {
        assert_eq!(incoming_label(lode_core::EdgeKind::Calls), "called_by");
        assert_eq!(incoming_label(lode_core::EdgeKind::Implements), "implemented_by");
    }

    #[test]
    fn suggestions_follow_intent() {
        let results = vec![symbol_result(&sample_symbol("UserService"), 1.0, "symbol")];
        let suggestions = build_suggestions(QueryIntent::Navigation, &results);
        assert_eq!(suggestions[0], "Show me the implementation of UserService");
    }
}
