//! Qualified-name edge resolution.
//!
//! Parsers emit edges whose targets are qualified-name strings. Inside the
//! persistence transaction — after the batch's symbols are inserted — the
//! resolver turns each target into a concrete symbol id or discards the
//! edge as an external reference. All lookups are case-insensitive and
//! scoped to one `(repo, branch)`; resolution never crosses repositories
//! or branches.

use std::collections::{HashMap, HashSet};

use sqlx::PgConnection;
use uuid::Uuid;

use lode_core::{Edge, RawEdge, RepoId, Result, Symbol, SymbolId};

use crate::store::SymbolStore;

/// Result of resolving one batch of raw edges.
#[derive(Debug, Default)]
pub struct ResolutionOutcome {
    pub edges: Vec<Edge>,
    pub resolved: usize,
    pub discarded: usize,
}

pub struct EdgeResolver;

impl EdgeResolver {
    /// Resolve a batch of raw edges against the batch's own symbols plus
    /// everything visible inside the transaction.
    pub async fn resolve(
        conn: &mut PgConnection,
        repo_id: RepoId,
        branch_name: &str,
        commit_sha: &str,
        raw_edges: &[RawEdge],
        batch_symbols: &[Symbol],
    ) -> Result<ResolutionOutcome> {
        if raw_edges.is_empty() {
            return Ok(ResolutionOutcome::default());
        }

        // L_current: this batch's qualified names, first-win on collisions.
        let mut current: HashMap<String, SymbolId> = HashMap::new();
        for sym in batch_symbols {
            if let Some(qn) = &sym.qualified_name {
                current.entry(normalize(qn)).or_insert(sym.id);
            }
        }
        let by_id: HashMap<SymbolId, &Symbol> =
            batch_symbols.iter().map(|s| (s.id, s)).collect();

        // Batch the store lookups for every target not settled locally.
        let mut normalized_wanted: HashSet<String> = HashSet::new();
        let mut stripped_wanted: HashSet<String> = HashSet::new();
        for raw in raw_edges {
            if Uuid::parse_str(raw.target.trim()).is_ok() {
                continue;
            }
            let norm = normalize(&raw.target);
            if !current.contains_key(&norm) {
                normalized_wanted.insert(norm.clone());
            }
            stripped_wanted.insert(strip(&norm));
        }

        let db_lookup: HashMap<String, SymbolId> = SymbolStore::lookup_qualified(
            conn,
            repo_id,
            branch_name,
            &normalized_wanted.iter().cloned().collect::<Vec<_>>(),
        )
        .await?
        .into_iter()
        .collect();

        let mut stripped_lookup: HashMap<String, Vec<SymbolId>> = HashMap::new();
        for (qn_lower, id) in SymbolStore::lookup_stripped(
            conn,
            repo_id,
            branch_name,
            &stripped_wanted.iter().cloned().collect::<Vec<_>>(),
        )
        .await?
        {
            stripped_lookup.entry(strip(&qn_lower)).or_default().push(id);
        }

        let mut outcome = ResolutionOutcome::default();
        let mut seen: HashSet<(SymbolId, SymbolId, lode_core::EdgeKind)> = HashSet::new();

        for raw in raw_edges {
            let target_id = Self::resolve_target(
                conn,
                raw,
                &current,
                &db_lookup,
                &stripped_lookup,
                &by_id,
            )
            .await?;

            match target_id {
                Some(target_symbol_id) => {
                    if !seen.insert((raw.source_symbol_id, target_symbol_id, raw.kind)) {
                        continue;
                    }
                    outcome.resolved += 1;
                    outcome.edges.push(Edge {
                        id: Uuid::new_v4(),
                        repo_id,
                        branch_name: branch_name.to_string(),
                        commit_sha: commit_sha.to_string(),
                        source_symbol_id: raw.source_symbol_id,
                        target_symbol_id,
                        kind: raw.kind,
                    });
                }
                None => outcome.discarded += 1,
            }
        }

        tracing::debug!(
            resolved = outcome.resolved,
            discarded = outcome.discarded,
            "edge resolution finished"
        );
        Ok(outcome)
    }

    async fn resolve_target(
        conn: &mut PgConnection,
        raw: &RawEdge,
        current: &HashMap<String, SymbolId>,
        db_lookup: &HashMap<String, SymbolId>,
        stripped_lookup: &HashMap<String, Vec<SymbolId>>,
        by_id: &HashMap<SymbolId, &Symbol>,
    ) -> Result<Option<SymbolId>> {
        // Already a concrete id.
        if let Ok(id) = Uuid::parse_str(raw.target.trim()) {
            return Ok(Some(id));
        }

        let norm = normalize(&raw.target);
        if let Some(id) = current.get(&norm).or_else(|| db_lookup.get(&norm)) {
            return Ok(Some(*id));
        }

        // Parameter-stripped fallback, accepted only when unambiguous.
        if let Some(ids) = stripped_lookup.get(&strip(&norm)) {
            if ids.len() == 1 {
                return Ok(Some(ids[0]));
            }
        }

        // Local scope: a sibling member of the source's parent whose short
        // name matches the last dotted segment.
        if let Some(source) = by_id.get(&raw.source_symbol_id) {
            if let Some(parent_id) = source.parent_symbol_id {
                let short = norm.rsplit('.').next().unwrap_or(&norm);
                let short = short.split('(').next().unwrap_or(short);
                let children = SymbolStore::children_named(conn, parent_id, short).await?;
                if children.len() == 1 {
                    return Ok(Some(children[0]));
                }
            }
        }

        Ok(None)
    }
}

/// Canonical folding for qualified-name comparison: trimmed, lowercased.
pub(crate) fn normalize(qualified_name: &str) -> String {
    qualified_name.trim().to_lowercase()
}

/// Signature-insensitive form: parameter list removed, generic argument
/// lists collapsed.
pub(crate) fn strip(normalized: &str) -> String {
    let without_params = match normalized.find('(') {
        Some(idx) => &normalized[..idx],
        None => normalized,
    };

    let mut out = String::with_capacity(without_params.len());
    let mut depth = 0usize;
    for c in without_params.chars() {
        match c {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_folds_case_and_whitespace() {
        assert_eq!(normalize("  Ns.Cls.Method  "), "ns.cls.method");
    }

    #[test]
    fn strip_removes_parameter_list() {
        assert_eq!(strip("ns.c.m(int, bool)"), "ns.c.m");
        assert_eq!(strip("ns.c.m"), "ns.c.m");
    }

    #[test]
    fn strip_collapses_generics() {
        assert_eq!(strip("ns.repo<tuser>.get(int)"), "ns.repo.get");
        assert_eq!(strip("ns.dict<string, list<int>>.count"), "ns.dict.count");
    }
}
