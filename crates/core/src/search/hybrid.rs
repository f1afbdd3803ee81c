//! Hybrid search planning and Reciprocal Rank Fusion.
//!
//! The planner decides whether a request runs dense-only or dense + sparse
//! (BM25), and fuses the two ranked lists with RRF:
//! `score(d) = sum(1 / (k + rank_i(d)))` with `k = 60`. Documents absent from
//! a list contribute 0 from that list. Ties break on dense score descending,
//! then id ascending, so fused output is deterministic.

use crate::bm25::tokenizer::tokenize;
use crate::config;
use ordered_float::OrderedFloat;
use std::collections::HashMap;

/// Tokenize a hybrid `text_filter` for the sparse leg.
///
/// Returns `None` when the request must fall back to dense-only search:
/// an empty filter, or fewer than `minimum_words_match` tokens remaining
/// after stop word removal.
pub fn sparse_query_tokens(
    text_filter: &str,
    include_stop_words: bool,
    minimum_words_match: usize,
) -> Option<Vec<String>> {
    if text_filter.trim().is_empty() {
        return None;
    }
    let tokens = tokenize(text_filter, include_stop_words);
    if tokens.len() < minimum_words_match.max(1) {
        return None;
    }
    Some(tokens.to_vec())
}

/// Reciprocal Rank Fusion over dense and sparse ranked lists.
///
/// Input lists are ordered best-first; ranks are 1-based. The returned score
/// is the RRF score, not a raw distance, and is sorted descending with the
/// dense-score/id tie-breaks. Truncated to `limit`.
pub fn rrf_fuse(
    dense: &[(String, f32)],
    sparse: &[(String, f32)],
    limit: usize,
) -> Vec<(String, f32)> {
    let k = config::RRF_K;
    let mut scores: HashMap<&str, f32> = HashMap::with_capacity(dense.len() + sparse.len());
    let mut dense_scores: HashMap<&str, f32> = HashMap::with_capacity(dense.len());

    for (rank, (id, score)) in dense.iter().enumerate() {
        *scores.entry(id).or_insert(0.0) += 1.0 / (k + rank as f32 + 1.0);
        dense_scores.insert(id, *score);
    }
    for (rank, (id, _)) in sparse.iter().enumerate() {
        *scores.entry(id).or_insert(0.0) += 1.0 / (k + rank as f32 + 1.0);
    }

    let mut fused: Vec<(String, f32)> = scores
        .into_iter()
        .map(|(id, score)| (id.to_string(), score))
        .collect();
    fused.sort_unstable_by(|a, b| {
        let key_a = (
            OrderedFloat(a.1),
            OrderedFloat(dense_scores.get(a.0.as_str()).copied().unwrap_or(f32::MIN)),
        );
        let key_b = (
            OrderedFloat(b.1),
            OrderedFloat(dense_scores.get(b.0.as_str()).copied().unwrap_or(f32::MIN)),
        );
        key_b.cmp(&key_a).then_with(|| a.0.cmp(&b.0))
    });
    fused.truncate(limit);
    fused
}
