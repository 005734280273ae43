//! Text Search Index - inverted word and phrase indexes over record text
//!
//! Each record contributes one searchable string (the engine concatenates
//! whatever fields the caller chose). Indexing pipeline:
//!
//! ```text
//! raw text -> lowercase -> split whitespace -> strip non-alphanumeric
//!          -> drop short tokens and stop words -> word index
//!                                              -> 2..3-word n-grams -> phrase index
//! ```
//!
//! Character classes are Unicode-aware, so Arabic clinic notes index the
//! same way as English ones. Lookups scan indexed words for substring
//! containment, optionally widened by a character-overlap fuzzy heuristic
//! (deliberately not edit distance). Buckets are position sets ordered by
//! record insertion position.

use std::collections::{BTreeSet, HashMap};

/// Tokens shorter than this many characters are not indexed
const MIN_TOKEN_CHARS: usize = 2;

/// Longest phrase n-gram, in words
const MAX_PHRASE_WORDS: usize = 3;

/// Share of a query token's characters that must appear in a candidate
/// word for a fuzzy hit
const FUZZY_OVERLAP: f64 = 0.8;

/// Filler words excluded from indexing, Arabic and English
const STOP_WORDS: &[&str] = &[
    "في", "من", "على", "إلى", "عن", "مع", "هذا", "هذه", "ذلك", "التي", "الذي", "كل", "تم",
    "the", "and", "or", "of", "in", "on", "at", "to", "for", "is", "was", "with", "an",
];

/// Normalize a raw string into index tokens
///
/// Lowercases, splits on whitespace, strips every non-alphanumeric
/// character from each word, then drops tokens shorter than two characters
/// or present in the stop-word list.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(|word| word.chars().filter(|c| c.is_alphanumeric()).collect::<String>())
        .filter(|token| token.chars().count() >= MIN_TOKEN_CHARS)
        .filter(|token| !STOP_WORDS.contains(&token.as_str()))
        .collect()
}

/// Contiguous word n-grams of 2 up to `MAX_PHRASE_WORDS` words
fn ngrams(tokens: &[String]) -> Vec<String> {
    let mut phrases = Vec::new();
    for len in 2..=MAX_PHRASE_WORDS {
        if tokens.len() < len {
            break;
        }
        for window in tokens.windows(len) {
            phrases.push(window.join(" "));
        }
    }
    phrases
}

/// Loose character-overlap match between a query token and an indexed word
///
/// Tokens of up to two characters fall back to substring containment;
/// longer tokens hit when at least 80% of their characters each appear
/// somewhere in the candidate.
fn fuzzy_match(query: &str, candidate: &str) -> bool {
    let query_chars = query.chars().count();
    if query_chars <= 2 {
        return candidate.contains(query);
    }
    let present = query.chars().filter(|c| candidate.contains(*c)).count();
    present as f64 / query_chars as f64 >= FUZZY_OVERLAP
}

/// Inverted word/phrase indexes plus per-record full text for exact matches
#[derive(Debug, Default)]
pub struct TextIndex {
    words: HashMap<String, BTreeSet<usize>>,
    phrases: HashMap<String, BTreeSet<usize>>,
    full_texts: HashMap<usize, String>,
}

impl TextIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Index one record's searchable text under its position
    pub fn index_record(&mut self, position: usize, text: &str) {
        let lowered = text.to_lowercase();
        let tokens = tokenize(&lowered);
        for token in &tokens {
            self.words.entry(token.clone()).or_default().insert(position);
        }
        for phrase in ngrams(&tokens) {
            self.phrases.entry(phrase).or_default().insert(position);
        }
        self.full_texts.insert(position, lowered);
    }

    /// Positions whose words match a query token
    ///
    /// Scans indexed words for substring containment of `token`; with
    /// `fuzzy` the character-overlap heuristic widens the scan. The whole
    /// bucket of every matching word is unioned in.
    pub fn lookup(&self, token: &str, fuzzy: bool) -> BTreeSet<usize> {
        let mut positions = BTreeSet::new();
        for (word, bucket) in &self.words {
            if word.contains(token) || (fuzzy && fuzzy_match(token, word)) {
                positions.extend(bucket.iter().copied());
            }
        }
        positions
    }

    /// Positions indexed under an exact phrase, normalized through the
    /// tokenizer; empty when the phrase was never indexed
    pub fn phrase_positions(&self, phrase: &str) -> Vec<usize> {
        let key = tokenize(phrase).join(" ");
        self.phrases
            .get(&key)
            .map(|bucket| bucket.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Positions whose full searchable text contains the query substring
    pub fn exact_positions(&self, query: &str) -> Vec<usize> {
        let needle = query.to_lowercase();
        let mut positions: Vec<usize> = self
            .full_texts
            .iter()
            .filter(|(_, text)| text.contains(&needle))
            .map(|(position, _)| *position)
            .collect();
        positions.sort_unstable();
        positions
    }

    /// Number of distinct indexed words
    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    /// Number of distinct indexed phrases
    pub fn phrase_count(&self) -> usize {
        self.phrases.len()
    }

    /// Discard all indexed text
    pub fn clear(&mut self) {
        self.words.clear();
        self.phrases.clear();
        self.full_texts.clear();
    }

    /// Rough memory footprint of the index maps in bytes
    pub fn approx_bytes(&self) -> usize {
        let inverted: usize = self
            .words
            .iter()
            .chain(self.phrases.iter())
            .map(|(key, bucket)| key.len() + bucket.len() * std::mem::size_of::<usize>())
            .sum();
        let texts: usize = self.full_texts.values().map(String::len).sum();
        inverted + texts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_strips_punctuation_and_stop_words() {
        assert_eq!(
            tokenize("Dental cleaning, and X-ray!"),
            vec!["dental", "cleaning", "xray"]
        );
    }

    #[test]
    fn test_tokenize_drops_short_tokens() {
        assert_eq!(tokenize("a b ok 12 x"), vec!["ok", "12"]);
    }

    #[test]
    fn test_tokenize_arabic() {
        // Arabic letters count as alphanumeric; Arabic stop words drop out
        assert_eq!(tokenize("علاج في العيادة"), vec!["علاج", "العيادة"]);
    }

    #[test]
    fn test_lookup_exact_token() {
        let mut index = TextIndex::new();
        index.index_record(0, "علاج تنظيف");
        index.index_record(1, "حشو ضرس");

        let hits = index.lookup("تنظيف", false);
        assert!(hits.contains(&0));
        assert!(!hits.contains(&1));
        assert!(index.lookup("قلع", false).is_empty());
    }

    #[test]
    fn test_lookup_substring_of_indexed_word() {
        let mut index = TextIndex::new();
        index.index_record(0, "deep cleaning session");

        assert!(index.lookup("clean", false).contains(&0));
    }

    #[test]
    fn test_fuzzy_short_token_uses_containment() {
        assert!(fuzzy_match("ab", "cab"));
        assert!(!fuzzy_match("ab", "ba"));
    }

    #[test]
    fn test_fuzzy_character_overlap_threshold() {
        // 5 of 5 query chars present
        assert!(fuzzy_match("hello", "helo"));
        // 4 of 5 present is exactly 80%
        assert!(fuzzy_match("teeth", "tea"));
        // 3 of 4 present is 75%, below the bar
        assert!(!fuzzy_match("paid", "pait"));
    }

    #[test]
    fn test_fuzzy_lookup_widens_scan() {
        let mut index = TextIndex::new();
        index.index_record(0, "whitening gel");

        assert!(index.lookup("whitning", false).is_empty());
        assert!(index.lookup("whitning", true).contains(&0));
    }

    #[test]
    fn test_exact_positions_cross_word_substring() {
        let mut index = TextIndex::new();
        index.index_record(0, "Deep Cleaning session");
        index.index_record(1, "crown fitting");

        assert_eq!(index.exact_positions("p clean"), vec![0]);
        assert!(index.exact_positions("implant").is_empty());
    }

    #[test]
    fn test_phrase_positions() {
        let mut index = TextIndex::new();
        index.index_record(0, "deep cleaning session");
        index.index_record(1, "cleaning supplies order");

        assert_eq!(index.phrase_positions("Deep Cleaning"), vec![0]);
        assert_eq!(index.phrase_positions("deep cleaning session"), vec![0]);
        assert!(index.phrase_positions("cleaning session order").is_empty());
    }

    #[test]
    fn test_clear() {
        let mut index = TextIndex::new();
        index.index_record(0, "dental floss");
        index.clear();

        assert_eq!(index.word_count(), 0);
        assert!(index.exact_positions("floss").is_empty());
    }
}
