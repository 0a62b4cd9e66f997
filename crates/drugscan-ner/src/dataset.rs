//! Versioned dictionary dataset record.
//!
//! The dataset is the on-disk source of truth for the dictionary: three named
//! maps plus a schema version. Derived data (the `synonyms` list of each
//! canonical drug) is never stored and is stripped if present.

use std::collections::{BTreeMap, HashSet};
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::fs_util::write_atomic;
use crate::{Attributes, DrugScanError, Result};

/// Current dataset schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Attribute key of the derived synonym list.
pub const SYNONYMS_KEY: &str = "synonyms";

/// Attribute key of the human-readable canonical name.
pub const NAME_KEY: &str = "name";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrugDataset {
    pub schema_version: u32,
    /// Variant -> ordered canonical ids (no duplicates).
    #[serde(default)]
    pub variant_to_canonical: BTreeMap<String, Vec<String>>,
    /// Canonical id -> attributes (must include `name`).
    #[serde(default)]
    pub canonical_to_data: BTreeMap<String, Attributes>,
    /// Variant -> attribute overrides (sparse).
    #[serde(default)]
    pub variant_to_variant_data: BTreeMap<String, Attributes>,
}

impl Default for DrugDataset {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            variant_to_canonical: BTreeMap::new(),
            canonical_to_data: BTreeMap::new(),
            variant_to_variant_data: BTreeMap::new(),
        }
    }
}

impl DrugDataset {
    pub fn from_json_str(content: &str) -> Result<Self> {
        let dataset: Self = serde_json::from_str(content)
            .map_err(|e| DrugScanError::DatasetFormat(e.to_string()))?;
        dataset.validate()?;
        Ok(dataset)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let dataset: Self = serde_json::from_reader(reader)
            .map_err(|e| DrugScanError::DatasetFormat(e.to_string()))?;
        dataset.validate()?;
        Ok(dataset)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let dataset = Self::from_reader(std::io::BufReader::new(file))?;
        info!(
            path = %path.display(),
            variants = dataset.variant_to_canonical.len(),
            canonicals = dataset.canonical_to_data.len(),
            "Loaded drug dataset"
        );
        Ok(dataset)
    }

    /// Write the dataset as JSON, replacing any existing file atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_vec_pretty(self)?;
        write_atomic(path, &content)
    }

    /// Check the structural rules a loadable dataset must satisfy.
    pub fn validate(&self) -> Result<()> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(DrugScanError::DatasetFormat(format!(
                "unsupported schema version {} (expected {})",
                self.schema_version, SCHEMA_VERSION
            )));
        }

        for (variant, canonicals) in &self.variant_to_canonical {
            if canonicals.is_empty() {
                return Err(DrugScanError::DatasetFormat(format!(
                    "variant '{variant}' has no canonical ids"
                )));
            }
            let mut seen = HashSet::with_capacity(canonicals.len());
            for id in canonicals {
                if !seen.insert(id.to_lowercase()) {
                    return Err(DrugScanError::DatasetFormat(format!(
                        "variant '{variant}' lists canonical '{id}' more than once"
                    )));
                }
            }
        }

        for (id, data) in &self.canonical_to_data {
            match data.get(NAME_KEY) {
                Some(serde_json::Value::String(name)) if !name.is_empty() => {}
                _ => {
                    return Err(DrugScanError::DatasetFormat(format!(
                        "canonical '{id}' is missing a name"
                    )))
                }
            }
        }

        Ok(())
    }
}
