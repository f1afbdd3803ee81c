//! On-the-wire BM25 tokenizer with optional stop word removal.
//!
//! Tokenizes text by lowercasing and splitting on Unicode word boundaries
//! (runs of non-alphanumeric characters). Stop words are filtered against a
//! fixed English list unless the caller opts into keeping them. Uses a
//! zero-per-token allocation design via byte spans.

use std::collections::HashSet;
use std::sync::LazyLock;

static STOP_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "a", "about", "above", "after", "again", "all", "am", "an", "and", "any", "are", "as",
        "at", "be", "because", "been", "before", "being", "below", "between", "both", "but",
        "by", "can", "did", "do", "does", "doing", "down", "during", "each", "few", "for",
        "from", "further", "had", "has", "have", "having", "he", "her", "here", "hers", "him",
        "his", "how", "i", "if", "in", "into", "is", "it", "its", "just", "me", "more", "most",
        "my", "no", "nor", "not", "now", "of", "off", "on", "once", "only", "or", "other",
        "our", "ours", "out", "over", "own", "same", "she", "should", "so", "some", "such",
        "than", "that", "the", "their", "theirs", "them", "then", "there", "these", "they",
        "this", "those", "through", "to", "too", "under", "until", "up", "very", "was", "we",
        "were", "what", "when", "where", "which", "while", "who", "whom", "why", "will",
        "with", "you", "your", "yours",
    ]
    .into_iter()
    .collect()
});

/// Returns `true` if `token` (already lowercased) is in the stop word list.
pub fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.contains(token)
}

/// Tokenized text: owns the lowercased buffer, provides `&str` slices via
/// byte spans. Only one heap allocation (the lowercased String) instead of
/// N per-token Strings.
pub struct Tokens {
    buffer: String,
    spans: Vec<(u32, u32)>,
}

impl Tokens {
    /// Returns an iterator over the token `&str` slices.
    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        self.spans
            .iter()
            .map(|&(s, e)| &self.buffer[s as usize..e as usize])
    }

    /// Returns the number of tokens.
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    /// Returns `true` if there are no tokens.
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Copies the tokens out into owned strings.
    pub fn to_vec(&self) -> Vec<String> {
        self.iter().map(str::to_string).collect()
    }
}

/// Tokenize text: lowercase, split on non-alphanumeric runs, drop stop words
/// unless `include_stop_words` is set.
pub fn tokenize(text: &str, include_stop_words: bool) -> Tokens {
    let buffer = text.to_lowercase();
    let mut spans = Vec::new();
    let mut start: Option<usize> = None;

    let mut push = |spans: &mut Vec<(u32, u32)>, s: usize, e: usize, buffer: &str| {
        let token = &buffer[s..e];
        if include_stop_words || !STOP_WORDS.contains(token) {
            spans.push((s as u32, e as u32));
        }
    };

    for (i, c) in buffer.char_indices() {
        if c.is_alphanumeric() {
            if start.is_none() {
                start = Some(i);
            }
        } else if let Some(s) = start.take() {
            push(&mut spans, s, i, &buffer);
        }
    }
    if let Some(s) = start {
        push(&mut spans, s, buffer.len(), &buffer);
    }

    Tokens { buffer, spans }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_drops_stop_words() {
        let tokens = tokenize("The quick brown fox jumps over the lazy dog", false);
        let words: Vec<&str> = tokens.iter().collect();
        assert!(!words.contains(&"the"));
        assert!(!words.contains(&"over"));
        assert!(words.contains(&"quick"));
        assert!(words.contains(&"fox"));
    }

    #[test]
    fn test_tokenize_keeps_stop_words_when_requested() {
        let tokens = tokenize("the fox", true);
        let words: Vec<&str> = tokens.iter().collect();
        assert_eq!(words, vec!["the", "fox"]);
    }

    #[test]
    fn test_tokenize_lowercases_and_splits_punctuation() {
        let tokens = tokenize("Goodbye, World! v2", false);
        let words: Vec<&str> = tokens.iter().collect();
        assert_eq!(words, vec!["goodbye", "world", "v2"]);
    }

    #[test]
    fn test_tokenize_only_stop_words_yields_empty() {
        let tokens = tokenize("the of and", false);
        assert!(tokens.is_empty());
    }

    #[test]
    fn test_tokenize_unicode() {
        let tokens = tokenize("café über-schnell", false);
        let words: Vec<&str> = tokens.iter().collect();
        assert_eq!(words, vec!["café", "über", "schnell"]);
    }

    #[test]
    fn test_tokenize_empty_input() {
        assert!(tokenize("", false).is_empty());
        assert!(tokenize("  \t\n ", false).is_empty());
    }
}
