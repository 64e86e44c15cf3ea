//! Response size governor.
//!
//! Every query response passes through three hard caps: result count,
//! total snippet characters, and serialized JSON bytes. The snippet
//! budget is distributed pro-rata across results; when the serialized
//! response is still too large, the lowest-scored result is dropped, then
//! snippet budgets are halved, until the response fits or a single result
//! remains. The compactor is a monotone projection: compacting an
//! already-compact response changes nothing.

use lode_core::config::ResponseConfig;

use super::QueryResponse;

const ELLIPSIS: char = '…';
const MIN_SNIPPET_CHARS: usize = 16;

pub struct Compactor {
    config: ResponseConfig,
}

impl Compactor {
    pub fn new(config: ResponseConfig) -> Self {
        Self { config }
    }

    pub fn compact(&self, mut response: QueryResponse) -> QueryResponse {
        response
            .results
            .sort_by(|a, b| b.score.total_cmp(&a.score));
        response.results.truncate(self.config.max_results);

        self.apply_snippet_budget(&mut response, self.config.max_snippet_chars);

        // Shrink until the serialized envelope fits.
        let mut snippet_budget = self.config.max_snippet_chars;
        loop {
            let size = serialized_len(&response);
            if size <= self.config.max_json_bytes {
                break;
            }
            if response.results.len() > 1 {
                response.results.pop();
                response.total = response.total.min(response.results.len());
                continue;
            }
            if snippet_budget <= MIN_SNIPPET_CHARS {
                break;
            }
            snippet_budget /= 2;
            self.apply_snippet_budget(&mut response, snippet_budget);
        }

        response
    }

    /// Distribute `budget` characters across result contents pro-rata to
    /// their current lengths.
    fn apply_snippet_budget(&self, response: &mut QueryResponse, budget: usize) {
        let total_chars: usize = response
            .results
            .iter()
            .filter_map(|r| r.content.as_ref())
            .map(|c| c.chars().count())
            .sum();
        if total_chars <= budget || total_chars == 0 {
            return;
        }

        for result in &mut response.results {
            let Some(content) = result.content.take() else {
                continue;
            };
            let len = content.chars().count();
            let share = (budget * len / total_chars).max(MIN_SNIPPET_CHARS.min(budget));
            result.content = Some(truncate_with_marker(&content, share));
        }
    }
}

/// Truncate to at most `max_chars` characters including the ellipsis
/// marker, never splitting a multibyte character.
fn truncate_with_marker(content: &str, max_chars: usize) -> String {
    if content.chars().count() <= max_chars {
        return content.to_string();
    }
    let kept = max_chars.saturating_sub(1);
    let mut out: String = content.chars().take(kept).collect();
    out.push(ELLIPSIS);
    out
}

fn serialized_len(response: &QueryResponse) -> usize {
    serde_json::to_vec(response).map(|b| b.len()).unwrap_or(usize::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{QueryMetadata, QueryResult};

    fn result(score: f64, content_chars: usize) -> QueryResult {
        QueryResult {
            file: "src/demo.cs".into(),
            lines: "1-40".into(),
            score,
            result_type: "chunk".into(),
            symbol: Some("Demo".into()),
            kind: Some("class".into()),
            sig: None,
            content: Some("x".repeat(content_chars)),
            docs: None,
            related: None,
            reasons: None,
        }
    }

    fn response(results: Vec<QueryResult>) -> QueryResponse {
        QueryResponse {
            repo: "demo".into(),
            branch: "main".into(),
            query: "demo".into(),
            intent: "search".into(),
            total: results.len(),
            results,
            suggestions: vec![],
            metadata: QueryMetadata::default(),
        }
    }

    fn caps(max_results: usize, max_snippet_chars: usize, max_json_bytes: usize) -> Compactor {
        Compactor::new(ResponseConfig {
            max_results,
            max_snippet_chars,
            max_json_bytes,
        })
    }

    #[test]
    fn enforces_all_three_caps() {
        // 25 results with 1000-char contents against {10, 8000, 16384}.
        let results: Vec<QueryResult> = (0..25).map(|i| result(1.0 - i as f64 / 100.0, 1000)).collect();
        let compacted = caps(10, 8000, 16384).compact(response(results));

        assert!(compacted.results.len() <= 10);
        let snippet_total: usize = compacted
            .results
            .iter()
            .filter_map(|r| r.content.as_ref())
            .map(|c| c.chars().count())
            .sum();
        assert!(snippet_total <= 8000, "snippet total {snippet_total}");
        assert!(serialized_len(&compacted) <= 16384);
    }

    #[test]
    fn keeps_highest_scored_results() {
        let results = vec![result(0.2, 10), result(0.9, 10), result(0.5, 10)];
        let compacted = caps(2, 8000, 16384).compact(response(results));

        assert_eq!(compacted.results.len(), 2);
        assert_eq!(compacted.results[0].score, 0.9);
        assert_eq!(compacted.results[1].score, 0.5);
    }

    #[test]
    fn small_responses_pass_unchanged() {
        let results = vec![result(1.0, 100)];
        let original = response(results);
        let bytes_before = serialized_len(&original);
        let compacted = caps(10, 8000, 16384).compact(original);
        assert_eq!(serialized_len(&compacted), bytes_before);
        assert_eq!(compacted.results[0].content.as_ref().unwrap().len(), 100);
    }

    #[test]
    fn compaction_is_idempotent() {
        let results: Vec<QueryResult> = (0..25).map(|i| result(1.0 - i as f64 / 100.0, 1000)).collect();
        let compactor = caps(10, 2000, 8192);

        let once = compactor.compact(response(results));
        let once_bytes = serde_json::to_vec(&once).unwrap();
        let twice = compactor.compact(once);
        let twice_bytes = serde_json::to_vec(&twice).unwrap();
        assert_eq!(once_bytes, twice_bytes);
    }

    #[test]
    fn truncation_adds_marker_within_budget() {
        let truncated = truncate_with_marker(&"a".repeat(50), 20);
        assert_eq!(truncated.chars().count(), 20);
        assert!(truncated.ends_with(ELLIPSIS));
    }

    #[test]
    fn oversized_single_result_halves_snippets() {
        let results = vec![result(1.0, 4000)];
        let compacted = caps(10, 4000, 1024).compact(response(results));
        assert_eq!(compacted.results.len(), 1);
        assert!(serialized_len(&compacted) <= 1024);
    }
}
