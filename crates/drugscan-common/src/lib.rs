//! drugscan-common: Shared error taxonomy and engine configuration used across all drugscan crates.

pub mod config;
pub mod error;

// Re-export commonly used types
pub use config::{CanonicalPolicy, EngineConfig};
pub use error::{DrugScanError, Result};
