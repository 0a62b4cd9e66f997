//! Engine configuration.
//!
//! Loaded from YAML, TOML or JSON. Every field has a default so a partial
//! file (or none at all) yields a working configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{DrugScanError, Result};

/// How matches are emitted when one variant resolves to several canonical drugs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalPolicy {
    /// One match per canonical id, all sharing the same span.
    #[default]
    EmitAll,
    /// Only the first canonical id listed for the variant.
    FirstOnly,
}

/// Complete engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Versioned JSON dictionary dataset.
    pub dataset_path: Option<PathBuf>,

    /// Newline-separated common-language word list for the reference index.
    /// Falls back to the embedded word list when unset.
    pub vocabulary_path: Option<PathBuf>,

    /// Directory holding the lookup cache and downloaded structure file.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_cache_file")]
    pub cache_file: String,

    #[serde(default = "default_structure_file_name")]
    pub structure_file_name: String,

    #[serde(default)]
    pub structure_url: Option<String>,

    #[serde(default = "default_pubchem_url")]
    pub pubchem_url: String,

    #[serde(default = "default_concept_url")]
    pub concept_url: String,

    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    /// Default minimum similarity for fuzzy matches.
    #[serde(default = "default_fuzzy_threshold")]
    pub fuzzy_threshold: f64,

    /// Number of n-gram pre-selected candidates re-scored per fuzzy query.
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,

    #[serde(default)]
    pub canonical_policy: CanonicalPolicy,
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".drug_names")
}
fn default_cache_file() -> String { "concept_cache.json".to_string() }
fn default_structure_file_name() -> String { "open structures.sdf".to_string() }
fn default_pubchem_url() -> String { "https://pubchem.ncbi.nlm.nih.gov/rest/pug".to_string() }
fn default_concept_url() -> String { "https://athena.ohdsi.org/api/v1/concepts".to_string() }
fn default_http_timeout() -> u64 { 30 }
fn default_fuzzy_threshold() -> f64 { 0.5 }
fn default_max_candidates() -> usize { 50 }

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dataset_path: None,
            vocabulary_path: None,
            data_dir: default_data_dir(),
            cache_file: default_cache_file(),
            structure_file_name: default_structure_file_name(),
            structure_url: None,
            pubchem_url: default_pubchem_url(),
            concept_url: default_concept_url(),
            http_timeout_secs: default_http_timeout(),
            fuzzy_threshold: default_fuzzy_threshold(),
            max_candidates: default_max_candidates(),
            canonical_policy: CanonicalPolicy::default(),
        }
    }
}

// ── Helper Methods ─────────────────────────────────────────────────────────────

impl EngineConfig {
    /// Load from YAML file
    pub fn from_yaml(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)
            .map_err(|e| DrugScanError::Config(format!("{path}: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from TOML file
    pub fn from_toml(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| DrugScanError::Config(format!("{path}: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from JSON file
    pub fn from_json(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save to YAML file
    pub fn to_yaml(&self, path: &str) -> Result<()> {
        let content = serde_yaml::to_string(self)
            .map_err(|e| DrugScanError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.fuzzy_threshold) {
            return Err(DrugScanError::Config(format!(
                "fuzzy_threshold must be within [0, 1], got {}",
                self.fuzzy_threshold
            )));
        }
        if self.max_candidates == 0 {
            return Err(DrugScanError::Config("max_candidates must be positive".into()));
        }
        Ok(())
    }

    pub fn cache_path(&self) -> PathBuf {
        self.data_dir.join(&self.cache_file)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
