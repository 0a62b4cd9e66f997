//! Drug-name recognition over pre-tokenized text.
//!
//! Combines exact dictionary lookup with approximate lexical matching:
//! - **Dictionary**: variant -> canonical drug mapping with attribute overrides
//! - **Fuzzy search**: trigram candidate selection re-scored by normalized
//!   Levenshtein similarity
//! - **Disambiguation**: approximate hits that look at least as much like an
//!   ordinary word are rejected
//! - **Enrichment**: optional molecular weight, concept id and structure data
//!
//! Start with [`DrugEngine`].

pub mod dataset;
pub mod dictionary;
pub mod engine;
mod fs_util;
pub mod fuzzy;
pub mod gateway;
pub mod lookup_cache;
pub mod matcher;
pub mod ngram;
pub mod structures;
pub mod vocabulary;

pub use drugscan_common::{CanonicalPolicy, DrugScanError, EngineConfig, Result};

/// Attribute map carried by canonical drugs, variant overrides and matches.
pub type Attributes = serde_json::Map<String, serde_json::Value>;

pub use dataset::DrugDataset;
pub use dictionary::{merge_attributes, DictionaryStore};
pub use engine::{DatasetSource, DrugEngine, DrugEngineBuilder, EngineStats, Snapshot};
pub use fuzzy::FuzzyIndex;
pub use gateway::{EnrichmentGateway, MockEnrichmentGateway};
pub use lookup_cache::LookupCache;
pub use matcher::{DrugMatch, MatchOptions, Matcher};
pub use ngram::NgramIndex;
pub use structures::{LocalStructureProvider, StructureProvider, StructureTable};
pub use vocabulary::VocabularySource;
