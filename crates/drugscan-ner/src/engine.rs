//! Drug recognition engine.
//!
//! Holds the dictionary and both fuzzy indices as one immutable [`Snapshot`]
//! behind an `Arc`. Readers clone the `Arc` and match without further
//! locking. Mutations build a new snapshot off to the side and swap it in,
//! serialized by a writer mutex, so a reader never sees a half-built index.
//!
//! # Example
//!
//! ```rust,no_run
//! use drugscan_ner::{DrugEngine, DrugDataset, MatchOptions};
//!
//! fn main() -> drugscan_ner::Result<()> {
//!     let dataset = DrugDataset::from_path("drugs.json".as_ref())?;
//!     let engine = DrugEngine::builder().dataset(dataset).build()?;
//!
//!     let tokens = ["Take", "Tylenol", "daily"];
//!     for m in engine.find_matches(&tokens, &MatchOptions::default().fuzzy(true)) {
//!         println!("{} [{}, {})", m.canonical_id, m.start, m.end);
//!     }
//!     Ok(())
//! }
//! ```

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::dataset::{DrugDataset, NAME_KEY};
use crate::dictionary::DictionaryStore;
use crate::fuzzy::{FuzzyIndex, IndexKind};
use crate::gateway::{EnrichmentGateway, CONCEPT_ID_KEY};
use crate::lookup_cache::LookupCache;
use crate::matcher::{DrugMatch, MatchOptions, Matcher};
use crate::structures::{LocalStructureProvider, StructureProvider, StructureTable};
use crate::vocabulary::VocabularySource;
use crate::{Attributes, DrugScanError, EngineConfig, Result};

/// Attribute key for the raw structure block attached to a match.
pub const STRUCTURE_KEY: &str = "structure_mol";

/// Attribute key holding the structure identifier of a canonical drug.
pub const STRUCTURE_ID_KEY: &str = "drugbank_id";

/// Batches larger than this are matched in parallel.
#[cfg(feature = "parallel")]
const PARALLEL_BATCH_THRESHOLD: usize = 10;

/// Where `reset` reloads the dictionary from.
#[derive(Debug, Clone)]
pub enum DatasetSource {
    Path(PathBuf),
    Inline(Arc<DrugDataset>),
}

impl DatasetSource {
    fn load(&self) -> Result<DrugDataset> {
        match self {
            Self::Path(path) => DrugDataset::from_path(path),
            Self::Inline(dataset) => Ok(dataset.as_ref().clone()),
        }
    }
}

/// One consistent view of the dictionary and its indices.
#[derive(Debug, Clone)]
pub struct Snapshot {
    store: Arc<DictionaryStore>,
    variants: Arc<FuzzyIndex>,
    reference: Arc<FuzzyIndex>,
}

impl Snapshot {
    fn unloaded(max_candidates: usize) -> Self {
        Self {
            store: Arc::new(DictionaryStore::empty()),
            variants: Arc::new(FuzzyIndex::new(IndexKind::Variants, max_candidates)),
            reference: Arc::new(FuzzyIndex::new(IndexKind::Reference, max_candidates)),
        }
    }

    pub fn matcher(&self) -> Matcher<'_> {
        Matcher::new(&self.store, &self.variants, &self.reference)
    }

    pub fn store(&self) -> &DictionaryStore {
        &self.store
    }

    pub fn variants(&self) -> &FuzzyIndex {
        &self.variants
    }

    pub fn reference(&self) -> &FuzzyIndex {
        &self.reference
    }
}

/// Variant index over the store's variants, in sorted order so that score
/// ties resolve the same way on every build.
fn build_variant_index(store: &DictionaryStore, max_candidates: usize) -> FuzzyIndex {
    let mut variants: Vec<&str> = store.variants().collect();
    variants.sort_unstable();
    FuzzyIndex::build(variants, max_candidates)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub loaded: bool,
    pub variants: usize,
    pub canonicals: usize,
    pub ngrams: usize,
    pub fuzzy_variants: usize,
    pub reference_words: usize,
    pub cached_lookups: usize,
}

pub struct DrugEngine {
    config: EngineConfig,
    vocabulary: VocabularySource,
    snapshot: RwLock<Arc<Snapshot>>,
    /// Serializes mutations; also owns the dataset source used by `reset`.
    writer: Mutex<Option<DatasetSource>>,
    gateway: Option<Arc<dyn EnrichmentGateway>>,
    structure_provider: Arc<dyn StructureProvider>,
    structures: Mutex<Option<Arc<StructureTable>>>,
    cache: LookupCache,
}

impl std::fmt::Debug for DrugEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DrugEngine")
            .field("stats", &self.stats())
            .field("gateway", &self.gateway.as_ref().map(|_| "<gateway>"))
            .finish()
    }
}

impl DrugEngine {
    pub fn builder() -> DrugEngineBuilder {
        DrugEngineBuilder::default()
    }

    /// Engine wired from configuration: dataset and vocabulary paths, the
    /// on-disk lookup cache and a local structure file. No enrichment gateway.
    pub fn from_config(config: EngineConfig) -> Result<Self> {
        DrugEngineBuilder::from_config(config).build()
    }

    // ── Snapshot management ────────────────────────────────────────────────

    /// Current snapshot. Stays valid and unchanged across later mutations.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn publish(&self, snapshot: Snapshot) {
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(snapshot);
    }

    fn lock_writer(&self) -> MutexGuard<'_, Option<DatasetSource>> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reload the dataset and rebuild every derived index, including the
    /// reference vocabulary.
    #[instrument(skip(self))]
    pub fn reset(&self) -> Result<()> {
        let source = self.lock_writer();
        let source = source
            .as_ref()
            .ok_or_else(|| DrugScanError::Config("no dataset configured".into()))?;
        let snapshot = self.build_snapshot(source)?;
        self.publish(snapshot);
        Ok(())
    }

    /// Load `dataset` and make it the source `reset` reloads from. A rejected
    /// dataset leaves both the live dictionary and the reset source untouched.
    #[instrument(skip(self, dataset))]
    pub fn load_dataset(&self, dataset: DrugDataset) -> Result<()> {
        let mut source = self.lock_writer();
        let candidate = DatasetSource::Inline(Arc::new(dataset));
        let snapshot = self.build_snapshot(&candidate)?;
        *source = Some(candidate);
        self.publish(snapshot);
        Ok(())
    }

    /// Fresh snapshot from `source`. Callers hold the writer lock.
    fn build_snapshot(&self, source: &DatasetSource) -> Result<Snapshot> {
        let max_candidates = self.config.max_candidates;
        let store = DictionaryStore::from_dataset(source.load()?)?;
        let variants = build_variant_index(&store, max_candidates);
        let reference = FuzzyIndex::build_reference(self.vocabulary.load()?, max_candidates);

        info!(
            variants = variants.len(),
            reference_words = reference.len(),
            "Engine indices rebuilt"
        );
        Ok(Snapshot {
            store: Arc::new(store),
            variants: Arc::new(variants),
            reference: Arc::new(reference),
        })
    }

    /// Rebuild the variant fuzzy index from the current dictionary, dropping
    /// variants removed since the last build. Runtime additions are kept.
    #[instrument(skip(self))]
    pub fn rebuild_indices(&self) -> Result<()> {
        let _guard = self.lock_writer();
        let current = self.snapshot();
        if !current.store.is_loaded() {
            return Err(DrugScanError::DictionaryNotLoaded);
        }
        let variants = build_variant_index(&current.store, self.config.max_candidates);
        debug!(variants = variants.len(), "Variant index rebuilt");
        self.publish(Snapshot {
            store: Arc::clone(&current.store),
            variants: Arc::new(variants),
            reference: Arc::clone(&current.reference),
        });
        Ok(())
    }

    // ── Dictionary mutation ────────────────────────────────────────────────

    pub fn add_variant(
        &self,
        variant: &str,
        canonical_id: &str,
        override_data: Option<Attributes>,
    ) -> Result<()> {
        let _guard = self.lock_writer();
        let current = self.snapshot();

        let mut store = DictionaryStore::clone(&current.store);
        store.add_variant(variant, canonical_id, override_data)?;
        let mut variants = FuzzyIndex::clone(&current.variants);
        variants.insert(variant);

        self.publish(Snapshot {
            store: Arc::new(store),
            variants: Arc::new(variants),
            reference: Arc::clone(&current.reference),
        });
        Ok(())
    }

    /// Register a new canonical drug named `name`. Returns its id.
    pub fn add_canonical(&self, name: &str, data: Attributes) -> Result<String> {
        let _guard = self.lock_writer();
        let current = self.snapshot();

        let mut store = DictionaryStore::clone(&current.store);
        let id = store.add_canonical(name, data)?;
        let mut variants = FuzzyIndex::clone(&current.variants);
        variants.insert(&id);

        self.publish(Snapshot {
            store: Arc::new(store),
            variants: Arc::new(variants),
            reference: Arc::clone(&current.reference),
        });
        Ok(id)
    }

    /// Remove a variant from the dictionary. Exact lookups stop seeing it
    /// immediately; the fuzzy index keeps it until [`rebuild_indices`](Self::rebuild_indices)
    /// or [`reset`](Self::reset).
    pub fn remove_variant(&self, variant: &str) -> Result<Vec<String>> {
        let _guard = self.lock_writer();
        let current = self.snapshot();

        let mut store = DictionaryStore::clone(&current.store);
        let removed = store.remove_variant(variant)?;

        self.publish(Snapshot {
            store: Arc::new(store),
            variants: Arc::clone(&current.variants),
            reference: Arc::clone(&current.reference),
        });
        Ok(removed)
    }

    // ── Queries ────────────────────────────────────────────────────────────

    /// Match drug names in `tokens`, then attach structures and enrichment
    /// as requested. Enrichment failures are logged and leave the field out.
    pub fn find_matches<S: AsRef<str>>(
        &self,
        tokens: &[S],
        options: &MatchOptions,
    ) -> Vec<DrugMatch> {
        let mut matches = self.snapshot().matcher().find_matches(tokens, options);

        if options.include_structure && !matches.is_empty() {
            self.attach_structures(&mut matches);
        }
        self.enrich(&mut matches, options);
        matches
    }

    /// [`find_matches`](Self::find_matches) over several token sequences.
    pub fn find_matches_batch(
        &self,
        batch: &[Vec<String>],
        options: &MatchOptions,
    ) -> Vec<Vec<DrugMatch>> {
        #[cfg(feature = "parallel")]
        {
            if batch.len() > PARALLEL_BATCH_THRESHOLD {
                use rayon::prelude::*;
                return batch
                    .par_iter()
                    .map(|tokens| self.find_matches(tokens.as_slice(), options))
                    .collect();
            }
        }
        batch
            .iter()
            .map(|tokens| self.find_matches(tokens.as_slice(), options))
            .collect()
    }

    /// See [`Matcher::fuzzy_match`].
    pub fn fuzzy_match(&self, candidate: &str, threshold: f64) -> Option<(String, f64)> {
        self.snapshot().matcher().fuzzy_match(candidate, threshold)
    }

    pub fn lookup_exact(&self, token: &str) -> Vec<String> {
        self.snapshot().store.lookup_exact(token).to_vec()
    }

    /// Canonical attributes including the derived `synonyms` list.
    pub fn canonical(&self, canonical_id: &str) -> Option<Attributes> {
        self.snapshot().store.canonical(canonical_id)
    }

    pub fn is_loaded(&self) -> bool {
        self.snapshot().store.is_loaded()
    }

    pub fn export_dataset(&self) -> DrugDataset {
        self.snapshot().store.to_dataset()
    }

    pub fn save_dataset(&self, path: &Path) -> Result<()> {
        self.export_dataset().save(path)?;
        info!(path = %path.display(), "Saved drug dataset");
        Ok(())
    }

    pub fn stats(&self) -> EngineStats {
        let snapshot = self.snapshot();
        EngineStats {
            loaded: snapshot.store.is_loaded(),
            variants: snapshot.store.len(),
            canonicals: snapshot.store.canonical_count(),
            ngrams: snapshot.store.ngrams().len(),
            fuzzy_variants: snapshot.variants.len(),
            reference_words: snapshot.reference.len(),
            cached_lookups: self.cache.len(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &LookupCache {
        &self.cache
    }

    // ── Post-processing ────────────────────────────────────────────────────

    fn structure_table(&self) -> Option<Arc<StructureTable>> {
        let mut slot = self.structures.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(table) = slot.as_ref() {
            return Some(Arc::clone(table));
        }
        let loaded = self
            .structure_provider
            .ensure_local(&self.config.data_dir)
            .and_then(|path| StructureTable::from_path(&path));
        match loaded {
            Ok(table) => {
                let table = Arc::new(table);
                *slot = Some(Arc::clone(&table));
                Some(table)
            }
            Err(e) => {
                warn!(error = %e, "Structure file unavailable, structures not attached");
                None
            }
        }
    }

    fn attach_structures(&self, matches: &mut [DrugMatch]) {
        let Some(table) = self.structure_table() else {
            return;
        };
        for m in matches {
            let block = match m.attributes.get(STRUCTURE_ID_KEY) {
                Some(Value::String(id)) => table.get(id),
                _ => None,
            };
            if let Some(block) = block {
                m.attributes
                    .insert(STRUCTURE_KEY.to_string(), Value::String(block.to_string()));
            }
        }
    }

    fn enrich(&self, matches: &mut [DrugMatch], options: &MatchOptions) {
        for m in matches {
            let lookup_name = m
                .attributes
                .get(NAME_KEY)
                .and_then(Value::as_str)
                .unwrap_or(&m.canonical_id)
                .to_string();

            if let Some(gateway) = &self.gateway {
                let mut attributes = m.attributes.clone();
                match gateway.resolve_molecular_weight(
                    &mut attributes,
                    &lookup_name,
                    options.enrich_with_external_weight,
                ) {
                    Ok(()) => m.attributes = attributes,
                    Err(e) => {
                        warn!(drug = %lookup_name, error = %e, "Molecular weight lookup failed")
                    }
                }
            }

            if options.enrich_with_external_id {
                if let Some(concept_id) = self.concept_id(&lookup_name) {
                    let value = concept_id.map_or(Value::Null, Value::String);
                    m.attributes.insert(CONCEPT_ID_KEY.to_string(), value);
                }
            }
        }
    }

    /// `None` when nothing can be said: the service failed, or there is no
    /// gateway and nothing cached.
    fn concept_id(&self, name: &str) -> Option<Option<String>> {
        let Some(gateway) = &self.gateway else {
            return self.cache.get(name);
        };
        match self.cache.get_or_resolve(name, |n| gateway.resolve_concept_id(n)) {
            Ok(concept_id) => Some(concept_id),
            Err(e) => {
                warn!(drug = %name, error = %e, "Concept id lookup failed");
                None
            }
        }
    }
}

// ── Builder ────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct DrugEngineBuilder {
    config: EngineConfig,
    dataset: Option<DatasetSource>,
    vocabulary: VocabularySource,
    gateway: Option<Arc<dyn EnrichmentGateway>>,
    structure_provider: Option<Arc<dyn StructureProvider>>,
    cache: Option<LookupCache>,
}

impl DrugEngineBuilder {
    pub fn from_config(config: EngineConfig) -> Self {
        let mut builder = Self {
            dataset: config.dataset_path.clone().map(DatasetSource::Path),
            vocabulary: config
                .vocabulary_path
                .clone()
                .map(VocabularySource::Path)
                .unwrap_or_default(),
            cache: Some(LookupCache::load(config.cache_path())),
            ..Self::default()
        };
        builder.config = config;
        builder
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn dataset(mut self, dataset: DrugDataset) -> Self {
        self.dataset = Some(DatasetSource::Inline(Arc::new(dataset)));
        self
    }

    pub fn dataset_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.dataset = Some(DatasetSource::Path(path.into()));
        self
    }

    pub fn vocabulary(mut self, vocabulary: VocabularySource) -> Self {
        self.vocabulary = vocabulary;
        self
    }

    pub fn gateway(mut self, gateway: Arc<dyn EnrichmentGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn structure_provider(mut self, provider: Arc<dyn StructureProvider>) -> Self {
        self.structure_provider = Some(provider);
        self
    }

    pub fn cache(mut self, cache: LookupCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Build the engine, loading the dataset when one was given. Without a
    /// dataset the engine starts unloaded and matches nothing.
    pub fn build(self) -> Result<DrugEngine> {
        self.config.validate()?;
        let structure_provider: Arc<dyn StructureProvider> = match self.structure_provider {
            Some(provider) => provider,
            None => Arc::new(LocalStructureProvider::new(self.config.structure_file_name.clone())),
        };
        let has_dataset = self.dataset.is_some();

        let engine = DrugEngine {
            snapshot: RwLock::new(Arc::new(Snapshot::unloaded(self.config.max_candidates))),
            writer: Mutex::new(self.dataset),
            vocabulary: self.vocabulary,
            gateway: self.gateway,
            structure_provider,
            structures: Mutex::new(None),
            cache: self.cache.unwrap_or_else(LookupCache::in_memory),
            config: self.config,
        };

        if has_dataset {
            engine.reset()?;
        }
        Ok(engine)
    }
}
