//! Inverted index from fixed-length character n-grams to the items containing them.

use std::hash::Hash;

use ahash::{AHashMap, AHashSet};

/// N-gram length used throughout the engine.
pub const NGRAM_SIZE: usize = 3;

/// All distinct `NGRAM_SIZE`-character substrings of `text`.
///
/// Works on Unicode scalar values, not bytes. No padding is applied, so
/// strings shorter than `NGRAM_SIZE` produce no n-grams at all.
pub fn ngrams_of(text: &str) -> AHashSet<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() < NGRAM_SIZE {
        return AHashSet::new();
    }
    chars
        .windows(NGRAM_SIZE)
        .map(|w| w.iter().collect())
        .collect()
}

#[derive(Debug, Clone)]
pub struct NgramIndex<T> {
    buckets: AHashMap<String, AHashSet<T>>,
}

impl<T> Default for NgramIndex<T> {
    fn default() -> Self {
        Self { buckets: AHashMap::new() }
    }
}

impl<T: Eq + Hash + Clone> NgramIndex<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `item` under every n-gram of `text`.
    pub fn insert(&mut self, text: &str, item: T) {
        for gram in ngrams_of(text) {
            self.buckets.entry(gram).or_default().insert(item.clone());
        }
    }

    /// Remove `item` from every bucket `text` populated. Buckets left empty are dropped.
    pub fn remove(&mut self, text: &str, item: &T) {
        for gram in ngrams_of(text) {
            if let Some(bucket) = self.buckets.get_mut(&gram) {
                bucket.remove(item);
                if bucket.is_empty() {
                    self.buckets.remove(&gram);
                }
            }
        }
    }

    pub fn bucket(&self, gram: &str) -> Option<&AHashSet<T>> {
        self.buckets.get(gram)
    }

    /// Items sharing at least one n-gram with `text`, with the number of shared n-grams.
    pub fn candidates(&self, text: &str) -> AHashMap<T, usize> {
        let mut counts: AHashMap<T, usize> = AHashMap::new();
        for gram in ngrams_of(text) {
            if let Some(bucket) = self.buckets.get(&gram) {
                for item in bucket {
                    *counts.entry(item.clone()).or_insert(0) += 1;
                }
            }
        }
        counts
    }

    /// Number of distinct n-grams indexed.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ngrams_of() {
        let grams = ngrams_of("aspirin");
        assert_eq!(grams.len(), 5);
        for g in ["asp", "spi", "pir", "iri", "rin"] {
            assert!(grams.contains(g));
        }
    }

    #[test]
    fn test_short_strings_have_no_ngrams() {
        assert!(ngrams_of("").is_empty());
        assert!(ngrams_of("mg").is_empty());
        assert_eq!(ngrams_of("abc").len(), 1);
    }

    #[test]
    fn test_repeated_ngrams_are_deduplicated() {
        assert_eq!(ngrams_of("aaaa").len(), 1);
    }

    #[test]
    fn test_multibyte_characters() {
        let grams = ngrams_of("café");
        assert!(grams.contains("afé"));
        assert_eq!(grams.len(), 2);
    }

    #[test]
    fn test_candidates_count_shared_ngrams() {
        let mut index = NgramIndex::new();
        index.insert("ibuprofen", "ibuprofen".to_string());
        index.insert("aspirin", "aspirin".to_string());

        let counts = index.candidates("ibuprofin");
        assert_eq!(counts.get("ibuprofen"), Some(&5));
        assert!(!counts.contains_key("aspirin"));
    }

    #[test]
    fn test_remove_prunes_empty_buckets() {
        let mut index = NgramIndex::new();
        index.insert("aspirin", 1usize);
        index.insert("spite", 2usize);
        assert!(index.bucket("spi").unwrap().contains(&2));

        index.remove("aspirin", &1);
        assert!(index.bucket("asp").is_none());
        assert_eq!(index.bucket("spi").unwrap().len(), 1);

        index.remove("spite", &2);
        assert!(index.is_empty());
    }
}
