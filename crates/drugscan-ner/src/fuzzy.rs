//! Approximate lexical search over a set of strings.
//!
//! Two-stage lookup:
//! 1. Trigram pre-selection through an [`NgramIndex`], keeping the entries with
//!    the highest Jaccard overlap (`shared / (|query| + |entry| - shared)`), so
//!    long entries that merely contain the query do not crowd out close ones.
//! 2. Re-scoring of that short list with normalized Levenshtein similarity
//!    (`1 - distance / max_len`) from `strsim`.
//!
//! The index is append-only. Removal is not supported; a removed string keeps
//! surfacing until the index is rebuilt.

use std::cmp::Ordering;

use ahash::AHashMap;
use tracing::debug;

use crate::ngram::{ngrams_of, NgramIndex};

/// Default size of the pre-selected candidate list.
pub const DEFAULT_MAX_CANDIDATES: usize = 50;

/// What an index was built over, used for diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    Variants,
    Reference,
}

#[derive(Debug, Clone)]
pub struct FuzzyIndex {
    kind: IndexKind,
    /// Entries in insertion order; position is the tie-breaker.
    entries: Vec<String>,
    positions: AHashMap<String, usize>,
    /// Distinct n-gram count of each entry, by position.
    gram_counts: Vec<usize>,
    grams: NgramIndex<usize>,
    max_candidates: usize,
}

impl FuzzyIndex {
    pub fn new(kind: IndexKind, max_candidates: usize) -> Self {
        Self {
            kind,
            entries: Vec::new(),
            positions: AHashMap::new(),
            gram_counts: Vec::new(),
            grams: NgramIndex::new(),
            max_candidates: max_candidates.max(1),
        }
    }

    /// Build an index over known drug variants.
    pub fn build<I, S>(variants: I, max_candidates: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::build_kind(IndexKind::Variants, variants, max_candidates)
    }

    /// Build an index over a common-language reference vocabulary.
    pub fn build_reference<I, S>(vocabulary: I, max_candidates: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::build_kind(IndexKind::Reference, vocabulary, max_candidates)
    }

    fn build_kind<I, S>(kind: IndexKind, items: I, max_candidates: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut index = Self::new(kind, max_candidates);
        for item in items {
            index.insert(item.as_ref());
        }
        debug!(kind = ?kind, entries = index.len(), "Built fuzzy index");
        index
    }

    /// Append an entry. Returns `false` when it was already present.
    pub fn insert(&mut self, text: &str) -> bool {
        let normalized = text.to_lowercase();
        if self.positions.contains_key(&normalized) {
            return false;
        }
        let id = self.entries.len();
        self.grams.insert(&normalized, id);
        self.gram_counts.push(ngrams_of(&normalized).len());
        self.positions.insert(normalized.clone(), id);
        self.entries.push(normalized);
        true
    }

    /// Ranked `(entry, similarity)` pairs, best first.
    ///
    /// Equal scores keep insertion order, so results are deterministic.
    pub fn query(&self, text: &str) -> Vec<(&str, f64)> {
        self.query_normalized(&text.to_lowercase())
    }

    /// [`query`](Self::query) for text that is already lower-cased.
    pub(crate) fn query_normalized(&self, normalized: &str) -> Vec<(&str, f64)> {
        let query_grams = ngrams_of(normalized).len();

        let mut shortlist: Vec<(usize, f64)> = self
            .grams
            .candidates(normalized)
            .into_iter()
            .map(|(id, shared)| {
                let union = query_grams + self.gram_counts[id] - shared;
                (id, shared as f64 / union as f64)
            })
            .collect();
        shortlist.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        shortlist.truncate(self.max_candidates);

        // Exact entries too short to carry n-grams are still a perfect hit
        if let Some(&id) = self.positions.get(normalized) {
            if !shortlist.iter().any(|(candidate, _)| *candidate == id) {
                shortlist.push((id, 0.0));
            }
        }

        let mut scored: Vec<(usize, f64)> = shortlist
            .into_iter()
            .map(|(id, _)| {
                let score = strsim::normalized_levenshtein(normalized, &self.entries[id]);
                (id, score)
            })
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });

        scored
            .into_iter()
            .map(|(id, score)| (self.entries[id].as_str(), score))
            .collect()
    }

    /// Highest-scoring entry, if any candidate shares an n-gram with `text`.
    pub fn best(&self, text: &str) -> Option<(&str, f64)> {
        self.query(text).into_iter().next()
    }

    pub(crate) fn best_normalized(&self, normalized: &str) -> Option<(&str, f64)> {
        self.query_normalized(normalized).into_iter().next()
    }

    pub fn contains(&self, text: &str) -> bool {
        self.positions.contains_key(&text.to_lowercase())
    }

    pub fn kind(&self) -> IndexKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
