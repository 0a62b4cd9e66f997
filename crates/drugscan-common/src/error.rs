use thiserror::Error;

#[derive(Debug, Error)]
pub enum DrugScanError {
    #[error("Drug dictionary not loaded")]
    DictionaryNotLoaded,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("Lookup cache corrupted: {0}")]
    CacheCorruption(String),

    #[error("Dataset format error: {0}")]
    DatasetFormat(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DrugScanError {
    /// Whether the error only affects a single match attempt and must not abort a scan.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DrugScanError::DictionaryNotLoaded
                | DrugScanError::ExternalService(_)
                | DrugScanError::CacheCorruption(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, DrugScanError>;
