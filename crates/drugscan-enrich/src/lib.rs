//! drugscan-enrich: HTTP-backed enrichment for the drug-name engine.
//!
//! Provides the networked implementations of the engine's seams:
//! - [`HttpEnrichmentGateway`]: molecular weight (PubChem) and concept id lookups
//! - [`HttpStructureProvider`]: one-time download of the structure file
//!
//! All requests go through [`AllowlistClient`], which refuses hosts that were
//! not configured.

pub mod client;
pub mod gateway;
pub mod structures;

use std::sync::Arc;

use drugscan_common::{DrugScanError, EngineConfig, Result};
use drugscan_ner::{DrugEngine, DrugEngineBuilder};
use tracing::info;

pub use client::AllowlistClient;
pub use gateway::HttpEnrichmentGateway;
pub use structures::HttpStructureProvider;

/// Engine wired to the configured remote services.
///
/// Loads the dataset, vocabulary and lookup cache named in `config`. The
/// structure file is downloaded on first use when `structure_url` is set,
/// otherwise it must already exist in `data_dir`.
///
/// `vocabulary_path` is required: the bundled word list is too small to
/// reject approximate hits on ordinary English words.
pub fn engine_from_config(config: EngineConfig) -> Result<DrugEngine> {
    if config.vocabulary_path.is_none() {
        return Err(DrugScanError::Config(
            "vocabulary_path must name a full English word list".into(),
        ));
    }
    let gateway = HttpEnrichmentGateway::from_config(&config)?;
    let structures = HttpStructureProvider::from_config(&config)?;

    let mut builder = DrugEngineBuilder::from_config(config).gateway(Arc::new(gateway));
    if let Some(provider) = structures {
        info!("Structure file will be downloaded on demand");
        builder = builder.structure_provider(Arc::new(provider));
    }
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};

    fn word_list(dir: &Path) -> PathBuf {
        let path = dir.join("words.txt");
        std::fs::write(&path, "insular\nmorphing\nprocess\n").unwrap();
        path
    }

    #[test]
    fn test_engine_from_config_without_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            data_dir: dir.path().to_path_buf(),
            vocabulary_path: Some(word_list(dir.path())),
            ..Default::default()
        };
        let engine = engine_from_config(config).unwrap();
        assert!(!engine.is_loaded());
        assert!(engine.find_matches(&["aspirin"], &Default::default()).is_empty());
    }

    #[test]
    fn test_engine_from_config_rejects_bad_url() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            pubchem_url: "not a url".into(),
            vocabulary_path: Some(word_list(dir.path())),
            ..Default::default()
        };
        let err = engine_from_config(config).unwrap_err();
        assert!(matches!(&err, DrugScanError::Config(msg) if msg.contains("not a url")));
    }

    #[test]
    fn test_engine_from_config_requires_vocabulary() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            data_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let err = engine_from_config(config).unwrap_err();
        assert!(matches!(&err, DrugScanError::Config(msg) if msg.contains("vocabulary_path")));
    }
}
