//! Chemical structure lookup from an SDF-style structure file.
//!
//! Records are separated by lines starting with `$$$$`. Inside a record the
//! molecule block runs up to and including the identifier line (a line
//! starting with `DB`); the `> <DRUGBANK_ID>` property header is dropped.

use std::collections::HashMap;
use std::io::BufRead;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::{DrugScanError, Result};

const RECORD_TERMINATOR: &str = "$$$$";
const ID_PREFIX: &str = "DB";
const ID_HEADER: &str = "DRUGBANK_ID";

/// Identifier -> raw structure block.
#[derive(Debug, Clone, Default)]
pub struct StructureTable {
    blocks: HashMap<String, String>,
}

impl StructureTable {
    pub fn parse<R: BufRead>(reader: R) -> Result<Self> {
        let mut blocks = HashMap::new();
        let mut in_block = true;
        let mut current = String::new();

        for line in reader.lines() {
            let line = line?;
            if in_block && !line.contains(ID_HEADER) {
                current.push_str(&line);
                current.push('\n');
            }
            if line.starts_with(ID_PREFIX) {
                blocks.insert(line.trim().to_string(), std::mem::take(&mut current));
                in_block = false;
            }
            if line.starts_with(RECORD_TERMINATOR) {
                in_block = true;
            }
        }

        Ok(Self { blocks })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let table = Self::parse(std::io::BufReader::new(file))?;
        info!(path = %path.display(), structures = table.len(), "Loaded structure table");
        Ok(table)
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        self.blocks.get(id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// Supplies the structure file the engine parses on first use.
pub trait StructureProvider: Send + Sync {
    /// Make sure the structure file exists under `dir` and return its path.
    fn ensure_local(&self, dir: &Path) -> Result<PathBuf>;
}

/// Uses a structure file that is already on disk. Never downloads.
#[derive(Debug, Clone)]
pub struct LocalStructureProvider {
    file_name: String,
}

impl LocalStructureProvider {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self { file_name: file_name.into() }
    }
}

impl StructureProvider for LocalStructureProvider {
    fn ensure_local(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(&self.file_name);
        if path.is_file() {
            Ok(path)
        } else {
            Err(DrugScanError::NotFound(path.display().to_string()))
        }
    }
}
