//! Post-match enrichment interface.
//!
//! The engine only talks to external services through [`EnrichmentGateway`].
//! Implementations:
//! - HTTP (`drugscan-enrich`)
//! - [`MockEnrichmentGateway`] (testing)

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::Value;

use crate::{Attributes, DrugScanError, Result};

/// Attribute key written by molecular-weight enrichment.
pub const MOLECULAR_WEIGHT_KEY: &str = "molecular_weight";

/// Attribute key written by concept-id enrichment.
pub const CONCEPT_ID_KEY: &str = "omop_id";

pub trait EnrichmentGateway: Send + Sync {
    /// Add a molecular weight to `attrs` for the drug `name`.
    ///
    /// With `use_remote` false only locally available data may be used. On
    /// error `attrs` must be left as it was.
    fn resolve_molecular_weight(&self, attrs: &mut Attributes, name: &str, use_remote: bool)
        -> Result<()>;

    /// External concept identifier for `name`, or `None` when the service
    /// knows no such drug.
    fn resolve_concept_id(&self, name: &str) -> Result<Option<String>>;
}

// ── Mock Implementation for Testing ────────────────────────────────────────

/// Gateway with canned answers. Names are matched case-insensitively.
#[derive(Debug, Default)]
pub struct MockEnrichmentGateway {
    weights: HashMap<String, f64>,
    concepts: HashMap<String, String>,
    failing: HashSet<String>,
    weight_calls: AtomicUsize,
    concept_calls: AtomicUsize,
}

impl MockEnrichmentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_weight(mut self, name: &str, weight: f64) -> Self {
        self.weights.insert(name.to_lowercase(), weight);
        self
    }

    pub fn with_concept(mut self, name: &str, concept_id: &str) -> Self {
        self.concepts.insert(name.to_lowercase(), concept_id.to_string());
        self
    }

    /// Every call for `name` fails with an external-service error.
    pub fn failing_for(mut self, name: &str) -> Self {
        self.failing.insert(name.to_lowercase());
        self
    }

    /// Remote weight lookups performed so far.
    pub fn weight_calls(&self) -> usize {
        self.weight_calls.load(Ordering::SeqCst)
    }

    pub fn concept_calls(&self) -> usize {
        self.concept_calls.load(Ordering::SeqCst)
    }

    fn check(&self, name: &str) -> Result<String> {
        let key = name.to_lowercase();
        if self.failing.contains(&key) {
            return Err(DrugScanError::ExternalService(format!("mock failure for {name}")));
        }
        Ok(key)
    }
}

impl EnrichmentGateway for MockEnrichmentGateway {
    fn resolve_molecular_weight(
        &self,
        attrs: &mut Attributes,
        name: &str,
        use_remote: bool,
    ) -> Result<()> {
        if !use_remote || attrs.contains_key(MOLECULAR_WEIGHT_KEY) {
            return Ok(());
        }
        self.weight_calls.fetch_add(1, Ordering::SeqCst);
        let key = self.check(name)?;
        if let Some(weight) = self.weights.get(&key) {
            attrs.insert(MOLECULAR_WEIGHT_KEY.to_string(), Value::from(*weight));
        }
        Ok(())
    }

    fn resolve_concept_id(&self, name: &str) -> Result<Option<String>> {
        self.concept_calls.fetch_add(1, Ordering::SeqCst);
        let key = self.check(name)?;
        Ok(self.concepts.get(&key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_weight() {
        let gateway = MockEnrichmentGateway::new().with_weight("Aspirin", 180.16);
        let mut attrs = Attributes::new();

        gateway.resolve_molecular_weight(&mut attrs, "aspirin", false).unwrap();
        assert!(attrs.is_empty());
        assert_eq!(gateway.weight_calls(), 0);

        gateway.resolve_molecular_weight(&mut attrs, "aspirin", true).unwrap();
        assert_eq!(attrs[MOLECULAR_WEIGHT_KEY], 180.16);
        assert_eq!(gateway.weight_calls(), 1);
    }

    #[test]
    fn test_mock_failure_leaves_attrs() {
        let gateway = MockEnrichmentGateway::new().failing_for("aspirin");
        let mut attrs = Attributes::new();
        let err = gateway
            .resolve_molecular_weight(&mut attrs, "Aspirin", true)
            .unwrap_err();
        assert!(err.is_recoverable());
        assert!(attrs.is_empty());
    }

    #[test]
    fn test_mock_concept() {
        let gateway = MockEnrichmentGateway::new().with_concept("aspirin", "1112807");
        assert_eq!(gateway.resolve_concept_id("ASPIRIN").unwrap(), Some("1112807".into()));
        assert_eq!(gateway.resolve_concept_id("unknown").unwrap(), None);
        assert_eq!(gateway.concept_calls(), 2);
    }
}
