//! Pluggable tag/description search strategy.
//!
//! Scoring mirrors the gateway's own usage-weighted ranker, minus the
//! usage-frequency term (the kernel has no invocation-count ledger) and
//! plus the tag/description weighting spec.md calls for.

use crate::model::Tool;

/// Tunables for [`DefaultSearchStrategy`].
#[derive(Debug, Clone, Copy)]
pub struct SearchOptions {
    /// Weight applied per query-word that overlaps a tag word or a
    /// description word longer than two characters.
    pub description_weight: f64,
    /// When every candidate scores zero, return the first `limit` tools
    /// instead of an empty page.
    pub fallback_on_zero_score: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            description_weight: 1.0,
            fallback_on_zero_score: true,
        }
    }
}

/// A pluggable ranking strategy used by the client kernel's `search` call.
pub trait SearchStrategy: Send + Sync {
    /// Score and order `tools` against `query`, returning at most `limit`.
    fn search(&self, tools: Vec<Tool>, query: &str, limit: usize) -> Vec<Tool>;
}

/// Tag-substring + word-overlap scoring, as described in spec.md §4.1
/// "Search".
pub struct DefaultSearchStrategy {
    options: SearchOptions,
}

impl DefaultSearchStrategy {
    /// Build a strategy with the given tunables.
    #[must_use]
    pub fn new(options: SearchOptions) -> Self {
        Self { options }
    }

    fn score(&self, tool: &Tool, query_lower: &str, query_words: &[&str]) -> f64 {
        let mut score = 0.0;

        for tag in &tool.tags {
            let tag_lower = tag.to_lowercase();
            if query_lower.contains(&tag_lower) || tag_lower.contains(query_lower) {
                score += 1.0;
            }
        }

        let tag_words: Vec<String> = tool
            .tags
            .iter()
            .flat_map(|t| t.to_lowercase().split_whitespace().map(str::to_string).collect::<Vec<_>>())
            .collect();
        let desc_lower = tool.description.to_lowercase();
        let desc_words: Vec<&str> = desc_lower.split_whitespace().collect();

        for word in query_words {
            if tag_words.iter().any(|t| t == word) {
                score += self.options.description_weight;
            }
            if word.len() > 2 && desc_words.iter().any(|d| *d == *word) {
                score += self.options.description_weight;
            }
        }

        score
    }
}

impl Default for DefaultSearchStrategy {
    fn default() -> Self {
        Self::new(SearchOptions::default())
    }
}

impl SearchStrategy for DefaultSearchStrategy {
    fn search(&self, mut tools: Vec<Tool>, query: &str, limit: usize) -> Vec<Tool> {
        let query_lower = query.to_lowercase();
        let query_words: Vec<&str> = query_lower.split_whitespace().collect();

        let mut scored: Vec<(f64, Tool)> = tools
            .drain(..)
            .map(|t| {
                let score = self.score(&t, &query_lower, &query_words);
                (score, t)
            })
            .collect();

        let all_zero = scored.iter().all(|(s, _)| *s == 0.0);
        if all_zero && self.options.fallback_on_zero_score {
            return scored.into_iter().map(|(_, t)| t).take(limit).collect();
        }

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.into_iter().map(|(_, t)| t).take(limit).collect()
    }
}
