//! Sparse BM25 embedding function.
//!
//! The gateway does not run keyword search itself; it produces sparse
//! `term id → weight` vectors that the remote vector DB indexes and scores.
//! Document weights follow the Okapi BM25 term-frequency normalization and
//! query weights carry the IDF, so the DB-side dot product reproduces the
//! BM25 score. Corpus statistics (document frequencies, average length) are
//! maintained per collection and fitted incrementally on insert.

use crate::bm25::tokenizer::tokenize;
use crate::config;
use std::collections::HashMap;

/// Stable 32-bit term id (FNV-1a). The sparse field is keyed by this id.
pub fn term_id(term: &str) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in term.as_bytes() {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

/// Incremental BM25 corpus statistics and encoder for one collection.
#[derive(Debug, Default)]
pub struct Bm25Encoder {
    /// term → number of documents containing the term
    doc_frequencies: HashMap<String, u64>,
    doc_count: u64,
    total_doc_length: u64,
}

impl Bm25Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents fitted so far.
    pub fn doc_count(&self) -> u64 {
        self.doc_count
    }

    fn average_doc_length(&self) -> f32 {
        if self.doc_count == 0 {
            return 0.0;
        }
        self.total_doc_length as f32 / self.doc_count as f32
    }

    /// IDF: log((N - df + 0.5) / (df + 0.5) + 1). Falls back to 1.0 before
    /// any document has been fitted so cold-start queries still carry weight.
    fn idf(&self, term: &str) -> f32 {
        if self.doc_count == 0 {
            return 1.0;
        }
        let n = self.doc_count as f32;
        let df = self.doc_frequencies.get(term).copied().unwrap_or(0) as f32;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    /// Fold a batch of chunks into the corpus statistics.
    pub fn fit(&mut self, chunks: &[&str]) {
        for chunk in chunks {
            let tokens = tokenize(chunk, false);
            self.doc_count += 1;
            self.total_doc_length += tokens.len() as u64;

            let mut seen: HashMap<&str, ()> = HashMap::new();
            for token in tokens.iter() {
                if seen.insert(token, ()).is_none() {
                    *self.doc_frequencies.entry(token.to_string()).or_insert(0) += 1;
                }
            }
        }
    }

    /// Encode a document chunk as a sparse vector of `idf · tf-norm` weights.
    pub fn encode_document(&self, chunk: &str) -> HashMap<u32, f32> {
        let tokens = tokenize(chunk, false);
        if tokens.is_empty() {
            return HashMap::new();
        }

        let mut term_frequencies: HashMap<&str, u32> = HashMap::new();
        for token in tokens.iter() {
            *term_frequencies.entry(token).or_insert(0) += 1;
        }

        let k1 = config::BM25_K1;
        let b = config::BM25_B;
        let dl = tokens.len() as f32;
        let avgdl = self.average_doc_length().max(1.0);

        let mut weights = HashMap::with_capacity(term_frequencies.len());
        for (term, tf) in term_frequencies {
            let tf = tf as f32;
            let tf_norm = (tf * (k1 + 1.0)) / (tf + k1 * (1.0 - b + b * dl / avgdl));
            weights.insert(term_id(term), self.idf(term) * tf_norm);
        }
        weights
    }

    /// Encode query tokens as a sparse vector of IDF weights.
    pub fn encode_query(&self, tokens: &[String]) -> HashMap<u32, f32> {
        let mut weights = HashMap::with_capacity(tokens.len());
        for token in tokens {
            weights.insert(term_id(token), self.idf(token));
        }
        weights
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_term_id_is_stable() {
        assert_eq!(term_id("hello"), term_id("hello"));
        assert_ne!(term_id("hello"), term_id("world"));
    }

    #[test]
    fn test_fit_tracks_corpus_stats() {
        let mut enc = Bm25Encoder::new();
        enc.fit(&["hello world", "goodbye cruel world"]);
        assert_eq!(enc.doc_count(), 2);
        assert_eq!(enc.doc_frequencies.get("world"), Some(&2));
        assert_eq!(enc.doc_frequencies.get("hello"), Some(&1));
    }

    #[test]
    fn test_encode_document_empty_chunk() {
        let enc = Bm25Encoder::new();
        assert!(enc.encode_document("").is_empty());
        assert!(enc.encode_document("the of and").is_empty());
    }

    #[test]
    fn test_encode_document_weights_positive() {
        let mut enc = Bm25Encoder::new();
        enc.fit(&["hello world", "goodbye"]);
        let weights = enc.encode_document("hello world");
        assert_eq!(weights.len(), 2);
        for (_, w) in weights {
            assert!(w > 0.0);
        }
    }

    #[test]
    fn test_rare_term_weighs_more_than_common() {
        let mut enc = Bm25Encoder::new();
        enc.fit(&["shared rare", "shared", "shared", "shared"]);
        let weights = enc.encode_document("shared rare");
        let rare = weights[&term_id("rare")];
        let common = weights[&term_id("shared")];
        assert!(rare > common, "rare={rare} common={common}");
    }

    #[test]
    fn test_encode_query_cold_start_defaults_to_one() {
        let enc = Bm25Encoder::new();
        let weights = enc.encode_query(&["anything".to_string()]);
        assert_eq!(weights[&term_id("anything")], 1.0);
    }

    #[test]
    fn test_query_document_dot_product_matches_term() {
        let mut enc = Bm25Encoder::new();
        enc.fit(&["hello world", "goodbye"]);
        let doc = enc.encode_document("goodbye");
        let query = enc.encode_query(&["goodbye".to_string()]);
        let score: f32 = query
            .iter()
            .filter_map(|(id, qw)| doc.get(id).map(|dw| qw * dw))
            .sum();
        assert!(score > 0.0);
    }
}
