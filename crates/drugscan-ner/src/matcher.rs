//! Drug-name matching over a token sequence.
//!
//! Two greedy left-to-right passes:
//! 1. Bigrams: every adjacent token pair, joined with a single space.
//! 2. Unigrams: every token not consumed by a bigram match.
//!
//! Each candidate is tried as an exact variant first, then (optionally) as an
//! approximate one. Approximate hits must clear the similarity threshold and
//! score strictly better against drug variants than against the reference
//! vocabulary.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::dictionary::DictionaryStore;
use crate::fuzzy::FuzzyIndex;
use crate::vocabulary::{is_excluded, is_stopword};
use crate::{Attributes, CanonicalPolicy, EngineConfig};

pub const MATCH_SIMILARITY_KEY: &str = "match_similarity";
pub const MATCHING_STRING_KEY: &str = "matching_string";
pub const MATCH_VARIANT_KEY: &str = "match_variant";

/// Shortest token (in characters, exclusive) a unigram fuzzy attempt is made on.
const MIN_FUZZY_UNIGRAM_LEN: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchOptions {
    pub fuzzy_enabled: bool,
    pub fuzzy_threshold: f64,
    pub include_structure: bool,
    pub enrich_with_external_id: bool,
    pub enrich_with_external_weight: bool,
    pub canonical_policy: CanonicalPolicy,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            fuzzy_enabled: false,
            fuzzy_threshold: 0.5,
            include_structure: false,
            enrich_with_external_id: false,
            enrich_with_external_weight: false,
            canonical_policy: CanonicalPolicy::EmitAll,
        }
    }
}

impl MatchOptions {
    /// Threshold and canonical policy from the engine configuration.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            fuzzy_threshold: config.fuzzy_threshold,
            canonical_policy: config.canonical_policy,
            ..Self::default()
        }
    }

    pub fn fuzzy(mut self, enabled: bool) -> Self {
        self.fuzzy_enabled = enabled;
        self
    }

    pub fn threshold(mut self, threshold: f64) -> Self {
        self.fuzzy_threshold = threshold;
        self
    }

    pub fn structure(mut self, enabled: bool) -> Self {
        self.include_structure = enabled;
        self
    }

    pub fn external_id(mut self, enabled: bool) -> Self {
        self.enrich_with_external_id = enabled;
        self
    }

    pub fn external_weight(mut self, enabled: bool) -> Self {
        self.enrich_with_external_weight = enabled;
        self
    }

    pub fn policy(mut self, policy: CanonicalPolicy) -> Self {
        self.canonical_policy = policy;
        self
    }
}

/// One recognized drug mention over tokens `[start, end)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrugMatch {
    pub attributes: Attributes,
    pub canonical_id: String,
    pub start: usize,
    pub end: usize,
}

impl DrugMatch {
    pub fn similarity(&self) -> f64 {
        self.attributes
            .get(MATCH_SIMILARITY_KEY)
            .and_then(Value::as_f64)
            .unwrap_or(0.0)
    }

    /// Surface text the match was found on, as written in the input.
    pub fn matching_string(&self) -> Option<&str> {
        self.attributes.get(MATCHING_STRING_KEY).and_then(Value::as_str)
    }

    /// Variant an approximate match resolved to. `None` for exact matches.
    pub fn matched_variant(&self) -> Option<&str> {
        self.attributes.get(MATCH_VARIANT_KEY).and_then(Value::as_str)
    }

    pub fn name(&self) -> Option<&str> {
        self.attributes.get("name").and_then(Value::as_str)
    }

    pub fn is_fuzzy(&self) -> bool {
        self.attributes.contains_key(MATCH_VARIANT_KEY)
    }
}

struct Resolved {
    variant: String,
    score: f64,
    fuzzy: bool,
}

/// Stateless scanner over one consistent view of the dictionary and indices.
#[derive(Clone, Copy)]
pub struct Matcher<'a> {
    store: &'a DictionaryStore,
    variants: &'a FuzzyIndex,
    reference: &'a FuzzyIndex,
}

impl<'a> Matcher<'a> {
    pub fn new(
        store: &'a DictionaryStore,
        variants: &'a FuzzyIndex,
        reference: &'a FuzzyIndex,
    ) -> Self {
        Self { store, variants, reference }
    }

    /// Best drug variant for `candidate`, if it clears `threshold` and is not
    /// at least as close to an ordinary word.
    pub fn fuzzy_match(&self, candidate: &str, threshold: f64) -> Option<(String, f64)> {
        if !self.store.is_loaded() {
            return None;
        }
        self.fuzzy_match_normalized(&candidate.to_lowercase(), threshold)
    }

    fn fuzzy_match_normalized(&self, normalized: &str, threshold: f64) -> Option<(String, f64)> {
        if is_excluded(normalized) {
            return None;
        }

        let (variant, score) = self.variants.best_normalized(normalized)?;
        if score < threshold {
            return None;
        }
        let reference_score = self
            .reference
            .best_normalized(normalized)
            .map_or(0.0, |(_, s)| s);
        if reference_score >= score {
            debug!(
                candidate = %normalized,
                variant,
                score,
                reference_score,
                "Fuzzy candidate rejected as common word"
            );
            return None;
        }
        Some((variant.to_string(), score))
    }

    pub fn find_matches<S: AsRef<str>>(
        &self,
        tokens: &[S],
        options: &MatchOptions,
    ) -> Vec<DrugMatch> {
        let mut matches = Vec::new();
        if !self.store.is_loaded() {
            warn!("Dictionary not loaded, no matches returned");
            return matches;
        }
        let lowered: Vec<String> = tokens
            .iter()
            .map(|t| t.as_ref().to_lowercase())
            .collect();
        let mut consumed = vec![false; tokens.len()];

        for i in 0..tokens.len().saturating_sub(1) {
            if consumed[i] || consumed[i + 1] {
                continue;
            }
            let surface = format!("{} {}", tokens[i].as_ref(), tokens[i + 1].as_ref());
            let normalized = format!("{} {}", lowered[i], lowered[i + 1]);
            let fuzzy_allowed = options.fuzzy_enabled
                && !is_stopword(&lowered[i])
                && !is_stopword(&lowered[i + 1]);

            let threshold = options.fuzzy_threshold;
            if let Some(resolved) = self.resolve(&normalized, fuzzy_allowed, threshold) {
                if self.emit(&resolved, &surface, i, i + 2, options, &mut matches) {
                    consumed[i] = true;
                    consumed[i + 1] = true;
                }
            }
        }

        for (i, token) in tokens.iter().enumerate() {
            if consumed[i] {
                continue;
            }
            let normalized = &lowered[i];
            let fuzzy_allowed = options.fuzzy_enabled
                && !is_stopword(normalized)
                && normalized.chars().count() > MIN_FUZZY_UNIGRAM_LEN;

            let threshold = options.fuzzy_threshold;
            if let Some(resolved) = self.resolve(normalized, fuzzy_allowed, threshold) {
                if self.emit(&resolved, token.as_ref(), i, i + 1, options, &mut matches) {
                    consumed[i] = true;
                }
            }
        }

        matches
    }

    fn resolve(&self, normalized: &str, fuzzy_allowed: bool, threshold: f64) -> Option<Resolved> {
        if is_excluded(normalized) {
            return None;
        }
        if !self.store.lookup_normalized(normalized).is_empty() {
            return Some(Resolved {
                variant: normalized.to_string(),
                score: 1.0,
                fuzzy: false,
            });
        }
        if !fuzzy_allowed {
            return None;
        }
        self.fuzzy_match_normalized(normalized, threshold)
            .map(|(variant, score)| Resolved { variant, score, fuzzy: true })
    }

    /// Push one match per canonical id of the resolved variant. Returns whether
    /// anything was emitted; a variant removed since the index was built emits nothing.
    fn emit(
        &self,
        resolved: &Resolved,
        surface: &str,
        start: usize,
        end: usize,
        options: &MatchOptions,
        out: &mut Vec<DrugMatch>,
    ) -> bool {
        let canonicals = self.store.lookup_normalized(&resolved.variant);
        if canonicals.is_empty() {
            debug!(variant = %resolved.variant, "Stale fuzzy candidate ignored");
            return false;
        }
        let selected = match options.canonical_policy {
            CanonicalPolicy::EmitAll => canonicals,
            CanonicalPolicy::FirstOnly => &canonicals[..1],
        };

        let before = out.len();
        for id in selected {
            let Some(mut attributes) = self.store.merged_attributes(id, &resolved.variant) else {
                continue;
            };
            attributes.insert(MATCH_SIMILARITY_KEY.to_string(), Value::from(resolved.score));
            attributes.insert(MATCHING_STRING_KEY.to_string(), Value::from(surface));
            if resolved.fuzzy {
                let variant = Value::from(resolved.variant.as_str());
                attributes.insert(MATCH_VARIANT_KEY.to_string(), variant);
            }
            out.push(DrugMatch {
                attributes,
                canonical_id: id.clone(),
                start,
                end,
            });
        }
        out.len() > before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::DrugDataset;
    use crate::fuzzy::DEFAULT_MAX_CANDIDATES;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    struct Fixture {
        store: DictionaryStore,
        variants: FuzzyIndex,
        reference: FuzzyIndex,
    }

    impl Fixture {
        fn new(reference: &[&str]) -> Self {
            let dataset: DrugDataset = serde_json::from_value(json!({
                "schema_version": 1,
                "variant_to_canonical": {
                    "tylenol": ["acetaminophen"],
                    "vitamin d": ["cholecalciferol"],
                    "vitamin": ["vitamins"],
                    "d": ["vitamins"],
                    "ibuprofen": ["ibuprofen"],
                    "aspirin": ["aspirin"],
                    "mg": ["magnesium sulfate"],
                    "mgs": ["magnesium sulfate"],
                    "abcdx": ["abcdx"],
                    "coldrex": ["acetaminophen", "phenylephrine"]
                },
                "canonical_to_data": {
                    "acetaminophen": {"name": "Acetaminophen"},
                    "cholecalciferol": {"name": "Cholecalciferol"},
                    "vitamins": {"name": "Vitamins"},
                    "ibuprofen": {"name": "Ibuprofen"},
                    "aspirin": {"name": "Aspirin"},
                    "magnesium sulfate": {"name": "Magnesium sulfate"},
                    "abcdx": {"name": "Abcdx"},
                    "phenylephrine": {"name": "Phenylephrine"}
                }
            }))
            .unwrap();
            let store = DictionaryStore::from_dataset(dataset).unwrap();
            let variants = FuzzyIndex::build(store.variants(), DEFAULT_MAX_CANDIDATES);
            let reference = FuzzyIndex::build_reference(reference, DEFAULT_MAX_CANDIDATES);
            Self { store, variants, reference }
        }

        fn matcher(&self) -> Matcher<'_> {
            Matcher::new(&self.store, &self.variants, &self.reference)
        }
    }

    fn spans(matches: &[DrugMatch]) -> Vec<(String, usize, usize)> {
        matches
            .iter()
            .map(|m| (m.canonical_id.clone(), m.start, m.end))
            .collect()
    }

    #[test]
    fn test_exact_unigram() {
        let fixture = Fixture::new(&["take", "daily"]);
        let matches = fixture
            .matcher()
            .find_matches(&["Take", "Tylenol", "daily"], &MatchOptions::default());

        assert_eq!(spans(&matches), vec![("acetaminophen".to_string(), 1, 2)]);
        assert_eq!(matches[0].similarity(), 1.0);
        assert_eq!(matches[0].matching_string(), Some("Tylenol"));
        assert!(!matches[0].is_fuzzy());
    }

    #[test]
    fn test_bigram_beats_unigrams() {
        let fixture = Fixture::new(&[]);
        let matches = fixture
            .matcher()
            .find_matches(&["take", "Vitamin", "D", "today"], &MatchOptions::default());

        assert_eq!(spans(&matches), vec![("cholecalciferol".to_string(), 1, 3)]);
        assert_eq!(matches[0].matching_string(), Some("Vitamin D"));
    }

    #[test]
    fn test_fuzzy_misspelling_accepted() {
        let fixture = Fixture::new(&["take", "the"]);
        let options = MatchOptions::default().fuzzy(true);
        let matches = fixture
            .matcher()
            .find_matches(&["take", "the", "ibuprofin"], &options);

        assert_eq!(spans(&matches), vec![("ibuprofen".to_string(), 2, 3)]);
        assert!((matches[0].similarity() - 8.0 / 9.0).abs() < 1e-9);
        assert_eq!(matches[0].matched_variant(), Some("ibuprofen"));
        assert_eq!(matches[0].matching_string(), Some("ibuprofin"));
    }

    #[test]
    fn test_fuzzy_disabled_by_default() {
        let fixture = Fixture::new(&[]);
        let matches = fixture
            .matcher()
            .find_matches(&["the", "ibuprofin"], &MatchOptions::default());
        assert!(matches.is_empty());
    }

    #[test]
    fn test_threshold_applies() {
        let fixture = Fixture::new(&[]);
        let options = MatchOptions::default().fuzzy(true).threshold(0.95);
        assert!(fixture.matcher().find_matches(&["ibuprofin"], &options).is_empty());
    }

    #[test]
    fn test_excluded_words_never_match() {
        let fixture = Fixture::new(&[]);
        let options = MatchOptions::default().fuzzy(true).threshold(0.0);
        let matches = fixture.matcher().find_matches(&["500", "mg", "MG"], &options);
        assert!(matches.is_empty());
        assert!(fixture.matcher().fuzzy_match("mg", 0.0).is_none());
    }

    #[test]
    fn test_vocabulary_tie_rejects() {
        let fixture = Fixture::new(&["abcdy"]);
        assert!(fixture.matcher().fuzzy_match("abcdz", 0.5).is_none());

        let no_reference = Fixture::new(&[]);
        let (variant, score) = no_reference.matcher().fuzzy_match("abcdz", 0.5).unwrap();
        assert_eq!(variant, "abcdx");
        assert!((score - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_common_word_closer_than_drug_rejects() {
        let fixture = Fixture::new(&["aspiring"]);
        assert!(fixture.matcher().fuzzy_match("aspiring", 0.5).is_none());
    }

    #[test]
    fn test_short_tokens_skip_fuzzy() {
        let fixture = Fixture::new(&[]);
        let options = MatchOptions::default().fuzzy(true).threshold(0.0);
        assert!(fixture.matcher().find_matches(&["abc"], &options).is_empty());
        assert_eq!(fixture.matcher().find_matches(&["abcd"], &options).len(), 1);
    }

    #[test]
    fn test_multiple_canonicals() {
        let fixture = Fixture::new(&[]);
        let matches = fixture
            .matcher()
            .find_matches(&["coldrex"], &MatchOptions::default());
        assert_eq!(
            spans(&matches),
            vec![
                ("acetaminophen".to_string(), 0, 1),
                ("phenylephrine".to_string(), 0, 1)
            ]
        );

        let first_only = MatchOptions::default().policy(CanonicalPolicy::FirstOnly);
        let matches = fixture.matcher().find_matches(&["coldrex"], &first_only);
        assert_eq!(spans(&matches), vec![("acetaminophen".to_string(), 0, 1)]);
    }

    #[test]
    fn test_bigram_matches_come_first() {
        let fixture = Fixture::new(&[]);
        let matches = fixture.matcher().find_matches(
            &["aspirin", "and", "vitamin", "d"],
            &MatchOptions::default(),
        );
        assert_eq!(
            spans(&matches),
            vec![
                ("cholecalciferol".to_string(), 2, 4),
                ("aspirin".to_string(), 0, 1)
            ]
        );
    }

    #[test]
    fn test_no_overlapping_bigrams() {
        let mut fixture = Fixture::new(&[]);
        fixture.store.add_variant("d vitamin", "vitamins", None).unwrap();
        let matches = fixture
            .matcher()
            .find_matches(&["vitamin", "d", "vitamin"], &MatchOptions::default());
        assert_eq!(
            spans(&matches),
            vec![
                ("cholecalciferol".to_string(), 0, 2),
                ("vitamins".to_string(), 2, 3)
            ]
        );
    }

    #[test]
    fn test_stale_fuzzy_candidate_emits_nothing() {
        let mut fixture = Fixture::new(&[]);
        fixture.store.remove_variant("aspirin").unwrap();

        assert!(fixture.store.lookup_exact("aspirin").is_empty());
        let (variant, _) = fixture.matcher().fuzzy_match("asprin", 0.5).unwrap();
        assert_eq!(variant, "aspirin");

        let options = MatchOptions::default().fuzzy(true);
        assert!(fixture.matcher().find_matches(&["asprin"], &options).is_empty());
    }

    #[test]
    fn test_unloaded_dictionary_matches_nothing() {
        let store = DictionaryStore::empty();
        let variants = FuzzyIndex::build(["aspirin"], 10);
        let reference = FuzzyIndex::build_reference(Vec::<String>::new(), 10);
        let matcher = Matcher::new(&store, &variants, &reference);

        let options = MatchOptions::default().fuzzy(true);
        assert!(matcher.find_matches(&["aspirin"], &options).is_empty());
        assert!(matcher.fuzzy_match("aspirin", 0.5).is_none());
    }

    #[test]
    fn test_empty_input() {
        let fixture = Fixture::new(&[]);
        let tokens: [&str; 0] = [];
        assert!(fixture.matcher().find_matches(&tokens, &MatchOptions::default()).is_empty());
    }
}
