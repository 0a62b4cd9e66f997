//! In-memory drug dictionary.
//!
//! Owns the variant -> canonical mapping, canonical attributes and per-variant
//! overrides, plus two derived structures kept in step with every mutation:
//! the reverse canonical -> variants sets (the `synonyms` list) and the
//! variant n-gram index.
//!
//! All keys are lower-cased on the way in; callers pass raw strings.

use std::collections::{BTreeMap, BTreeSet};

use ahash::AHashMap;
use serde_json::Value;
use tracing::{debug, info};

use crate::dataset::{DrugDataset, NAME_KEY, SYNONYMS_KEY};
use crate::ngram::NgramIndex;
use crate::{Attributes, DrugScanError, Result};

/// Overlay `overrides` on a copy of `defaults`. Override keys win.
pub fn merge_attributes(defaults: &Attributes, overrides: Option<&Attributes>) -> Attributes {
    let mut merged = defaults.clone();
    if let Some(overrides) = overrides {
        for (key, value) in overrides {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

#[derive(Debug, Clone, Default)]
pub struct DictionaryStore {
    variant_to_canonical: AHashMap<String, Vec<String>>,
    canonical_to_data: AHashMap<String, Attributes>,
    variant_to_variant_data: AHashMap<String, Attributes>,
    canonical_to_variants: AHashMap<String, BTreeSet<String>>,
    ngrams: NgramIndex<String>,
    loaded: bool,
}

impl DictionaryStore {
    /// A store that has never been loaded. Lookups return nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a store from a dataset, normalizing keys and deriving synonyms.
    pub fn from_dataset(dataset: DrugDataset) -> Result<Self> {
        dataset.validate()?;

        let mut canonical_to_data = AHashMap::with_capacity(dataset.canonical_to_data.len());
        for (id, mut data) in dataset.canonical_to_data {
            data.remove(SYNONYMS_KEY);
            let key = id.to_lowercase();
            if canonical_to_data.insert(key.clone(), data).is_some() {
                return Err(DrugScanError::DatasetFormat(format!(
                    "canonical id '{key}' appears more than once after lower-casing"
                )));
            }
        }

        let mut store = Self {
            canonical_to_data,
            loaded: true,
            ..Self::default()
        };

        for (variant, canonicals) in dataset.variant_to_canonical {
            let key = variant.to_lowercase();
            if store.variant_to_canonical.contains_key(&key) {
                return Err(DrugScanError::DatasetFormat(format!(
                    "variant '{key}' appears more than once after lower-casing"
                )));
            }
            let canonicals: Vec<String> = canonicals.iter().map(|c| c.to_lowercase()).collect();
            for id in &canonicals {
                if !store.canonical_to_data.contains_key(id) {
                    return Err(DrugScanError::DatasetFormat(format!(
                        "variant '{key}' refers to unknown canonical '{id}'"
                    )));
                }
                store
                    .canonical_to_variants
                    .entry(id.clone())
                    .or_default()
                    .insert(key.clone());
            }
            store.ngrams.insert(&key, key.clone());
            store.variant_to_canonical.insert(key, canonicals);
        }

        for (variant, data) in dataset.variant_to_variant_data {
            let key = variant.to_lowercase();
            if store.variant_to_variant_data.insert(key.clone(), data).is_some() {
                return Err(DrugScanError::DatasetFormat(format!(
                    "variant data for '{key}' appears more than once after lower-casing"
                )));
            }
        }

        info!(
            variants = store.variant_to_canonical.len(),
            canonicals = store.canonical_to_data.len(),
            overrides = store.variant_to_variant_data.len(),
            ngrams = store.ngrams.len(),
            "Dictionary loaded"
        );
        Ok(store)
    }

    /// Replace the whole content of the store with `dataset`.
    ///
    /// The store is left untouched when the dataset is rejected.
    pub fn load(&mut self, dataset: DrugDataset) -> Result<()> {
        *self = Self::from_dataset(dataset)?;
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Map `variant` to `canonical_id` alone, replacing any previous entry.
    ///
    /// Override data replaces the variant's previous overrides; `None` or an
    /// empty map clears them.
    pub fn add_variant(
        &mut self,
        variant: &str,
        canonical_id: &str,
        override_data: Option<Attributes>,
    ) -> Result<()> {
        if !self.loaded {
            return Err(DrugScanError::DictionaryNotLoaded);
        }
        let variant = variant.to_lowercase();
        let canonical_id = canonical_id.to_lowercase();
        if !self.canonical_to_data.contains_key(&canonical_id) {
            return Err(DrugScanError::NotFound(canonical_id));
        }

        if let Some(previous) = self.variant_to_canonical.remove(&variant) {
            self.unlink(&variant, &previous);
        }

        self.canonical_to_variants
            .entry(canonical_id.clone())
            .or_default()
            .insert(variant.clone());
        match override_data {
            Some(data) if !data.is_empty() => {
                self.variant_to_variant_data.insert(variant.clone(), data);
            }
            _ => {
                self.variant_to_variant_data.remove(&variant);
            }
        }
        self.ngrams.insert(&variant, variant.clone());

        debug!(variant = %variant, canonical = %canonical_id, "Added variant");
        self.variant_to_canonical.insert(variant, vec![canonical_id]);
        Ok(())
    }

    /// Delete `variant` and its overrides. Returns the canonical ids it mapped to.
    pub fn remove_variant(&mut self, variant: &str) -> Result<Vec<String>> {
        if !self.loaded {
            return Err(DrugScanError::DictionaryNotLoaded);
        }
        let variant = variant.to_lowercase();
        let canonicals = self
            .variant_to_canonical
            .remove(&variant)
            .ok_or_else(|| DrugScanError::NotFound(variant.clone()))?;

        self.unlink(&variant, &canonicals);
        self.variant_to_variant_data.remove(&variant);
        self.ngrams.remove(&variant, &variant);

        debug!(variant = %variant, "Removed variant");
        Ok(canonicals)
    }

    /// Register a new canonical drug keyed by its lower-cased name, and the
    /// name itself as a variant of it. Returns the canonical id.
    pub fn add_canonical(&mut self, name: &str, mut data: Attributes) -> Result<String> {
        if !self.loaded {
            return Err(DrugScanError::DictionaryNotLoaded);
        }
        let id = name.to_lowercase();
        data.remove(SYNONYMS_KEY);
        data.entry(NAME_KEY.to_string())
            .or_insert_with(|| Value::String(name.to_string()));
        self.canonical_to_data.insert(id.clone(), data);
        self.add_variant(&id, &id, None)?;
        Ok(id)
    }

    fn unlink(&mut self, variant: &str, canonicals: &[String]) {
        for id in canonicals {
            if let Some(variants) = self.canonical_to_variants.get_mut(id) {
                variants.remove(variant);
                if variants.is_empty() {
                    self.canonical_to_variants.remove(id);
                }
            }
        }
    }

    /// Canonical ids for `token`, or an empty slice.
    pub fn lookup_exact(&self, token: &str) -> &[String] {
        self.lookup_normalized(&token.to_lowercase())
    }

    /// [`lookup_exact`](Self::lookup_exact) for a key that is already lower-cased.
    pub(crate) fn lookup_normalized(&self, key: &str) -> &[String] {
        self.variant_to_canonical
            .get(key)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn contains_variant(&self, variant: &str) -> bool {
        self.variant_to_canonical.contains_key(&variant.to_lowercase())
    }

    /// Sorted variants pointing to `canonical_id`.
    pub fn synonyms_of(&self, canonical_id: &str) -> Vec<String> {
        self.canonical_to_variants
            .get(&canonical_id.to_lowercase())
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Canonical attributes with the derived `synonyms` list attached.
    pub fn canonical(&self, canonical_id: &str) -> Option<Attributes> {
        self.canonical_normalized(&canonical_id.to_lowercase())
    }

    fn canonical_normalized(&self, id: &str) -> Option<Attributes> {
        let mut data = self.canonical_to_data.get(id)?.clone();
        let synonyms: Vec<Value> = self
            .canonical_to_variants
            .get(id)
            .map(|set| set.iter().cloned().map(Value::String).collect())
            .unwrap_or_default();
        data.insert(SYNONYMS_KEY.to_string(), Value::Array(synonyms));
        Some(data)
    }

    pub fn variant_data(&self, variant: &str) -> Option<&Attributes> {
        self.variant_to_variant_data.get(&variant.to_lowercase())
    }

    /// Attributes of a match of `variant` resolved to `canonical_id`. Both
    /// keys are taken as stored, already lower-cased.
    pub fn merged_attributes(&self, canonical_id: &str, variant: &str) -> Option<Attributes> {
        let defaults = self.canonical_normalized(canonical_id)?;
        Some(merge_attributes(&defaults, self.variant_to_variant_data.get(variant)))
    }

    pub fn variants(&self) -> impl Iterator<Item = &str> {
        self.variant_to_canonical.keys().map(String::as_str)
    }

    pub fn ngrams(&self) -> &NgramIndex<String> {
        &self.ngrams
    }

    /// Number of variants.
    pub fn len(&self) -> usize {
        self.variant_to_canonical.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variant_to_canonical.is_empty()
    }

    pub fn canonical_count(&self) -> usize {
        self.canonical_to_data.len()
    }

    /// Export into the on-disk dataset record. Synonyms are not stored.
    pub fn to_dataset(&self) -> DrugDataset {
        DrugDataset {
            variant_to_canonical: self
                .variant_to_canonical
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect::<BTreeMap<_, _>>(),
            canonical_to_data: self
                .canonical_to_data
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            variant_to_variant_data: self
                .variant_to_variant_data
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            ..DrugDataset::default()
        }
    }
}
