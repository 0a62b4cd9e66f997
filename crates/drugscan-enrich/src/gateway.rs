//! HTTP enrichment gateway.
//!
//! - Molecular weight from PubChem PUG REST
//!   (`/compound/name/{name}/property/MolecularWeight/JSON`)
//! - Concept id from the OHDSI Athena concept search (`?query={name}`), first
//!   standard drug concept
//!
//! Both calls are blocking with the client's timeout. A 404 means the service
//! does not know the name and is not an error.

use std::time::Duration;

use drugscan_common::{DrugScanError, EngineConfig, Result};
use drugscan_ner::gateway::MOLECULAR_WEIGHT_KEY;
use drugscan_ner::{Attributes, EnrichmentGateway};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

use crate::client::{external, parse_base_url, AllowlistClient};

#[derive(Debug, Deserialize)]
struct PropertyResponse {
    #[serde(rename = "PropertyTable")]
    property_table: PropertyTable,
}

#[derive(Debug, Deserialize)]
struct PropertyTable {
    #[serde(rename = "Properties", default)]
    properties: Vec<CompoundProperty>,
}

#[derive(Debug, Deserialize)]
struct CompoundProperty {
    #[serde(rename = "MolecularWeight")]
    molecular_weight: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ConceptPage {
    #[serde(default)]
    content: Vec<Concept>,
}

#[derive(Debug, Deserialize)]
struct Concept {
    id: Value,
}

/// First molecular weight in a PubChem property response. PubChem reports it
/// as a decimal string; plain numbers are accepted too.
pub fn parse_molecular_weight(body: &str) -> Result<Option<f64>> {
    let response: PropertyResponse = serde_json::from_str(body)
        .map_err(|e| DrugScanError::ExternalService(format!("unexpected PubChem response: {e}")))?;
    let weight = response
        .property_table
        .properties
        .into_iter()
        .find_map(|p| match p.molecular_weight? {
            Value::String(s) => s.trim().parse::<f64>().ok(),
            Value::Number(n) => n.as_f64(),
            _ => None,
        });
    Ok(weight)
}

/// Id of the first concept in an Athena search page.
pub fn parse_concept_id(body: &str) -> Result<Option<String>> {
    let page: ConceptPage = serde_json::from_str(body)
        .map_err(|e| DrugScanError::ExternalService(format!("unexpected concept response: {e}")))?;
    Ok(page.content.into_iter().next().and_then(|c| match c.id {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }))
}

pub fn molecular_weight_url(base: &Url, name: &str) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| DrugScanError::Config(format!("URL cannot be a base: {base}")))?
        .pop_if_empty()
        .extend(["compound", "name", name, "property", "MolecularWeight", "JSON"]);
    Ok(url)
}

pub fn concept_search_url(base: &Url, name: &str) -> Url {
    let mut url = base.clone();
    url.query_pairs_mut()
        .append_pair("query", name)
        .append_pair("domain", "Drug")
        .append_pair("standardConcept", "Standard")
        .append_pair("pageSize", "1");
    url
}

pub struct HttpEnrichmentGateway {
    client: AllowlistClient,
    pubchem_url: Url,
    concept_url: Url,
}

impl HttpEnrichmentGateway {
    pub fn new(client: AllowlistClient, pubchem_url: Url, concept_url: Url) -> Self {
        Self { client, pubchem_url, concept_url }
    }

    /// Gateway for the service URLs in `config`; their hosts are allowed
    /// automatically.
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let pubchem_url = parse_base_url(&config.pubchem_url)?;
        let concept_url = parse_base_url(&config.concept_url)?;
        let mut client = AllowlistClient::new(Duration::from_secs(config.http_timeout_secs))?;
        client.allow_url(&pubchem_url);
        client.allow_url(&concept_url);
        Ok(Self::new(client, pubchem_url, concept_url))
    }

    /// Body of a successful GET, or `None` on 404.
    fn fetch(&self, url: &Url) -> Result<Option<String>> {
        let resp = self.client.get(url)?.send().map_err(external)?;
        match resp.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => resp.text().map(Some).map_err(external),
            status => Err(DrugScanError::ExternalService(format!("{url} returned {status}"))),
        }
    }
}

impl EnrichmentGateway for HttpEnrichmentGateway {
    #[instrument(skip(self, attrs))]
    fn resolve_molecular_weight(
        &self,
        attrs: &mut Attributes,
        name: &str,
        use_remote: bool,
    ) -> Result<()> {
        if !use_remote || attrs.contains_key(MOLECULAR_WEIGHT_KEY) {
            return Ok(());
        }
        let url = molecular_weight_url(&self.pubchem_url, name)?;
        debug!(drug = name, "Fetching PubChem molecular weight");

        let Some(body) = self.fetch(&url)? else {
            return Ok(());
        };
        if let Some(weight) = parse_molecular_weight(&body)? {
            attrs.insert(MOLECULAR_WEIGHT_KEY.to_string(), Value::from(weight));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    fn resolve_concept_id(&self, name: &str) -> Result<Option<String>> {
        let url = concept_search_url(&self.concept_url, name);
        debug!(drug = name, "Searching concept id");

        match self.fetch(&url)? {
            Some(body) => parse_concept_id(&body),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_molecular_weight() {
        let body = r#"{"PropertyTable":{"Properties":[{"CID":2244,"MolecularWeight":"180.16"}]}}"#;
        assert_eq!(parse_molecular_weight(body).unwrap(), Some(180.16));

        let numeric = r#"{"PropertyTable":{"Properties":[{"CID":1,"MolecularWeight":151.16}]}}"#;
        assert_eq!(parse_molecular_weight(numeric).unwrap(), Some(151.16));

        let empty = r#"{"PropertyTable":{"Properties":[]}}"#;
        assert_eq!(parse_molecular_weight(empty).unwrap(), None);
    }

    #[test]
    fn test_parse_molecular_weight_rejects_garbage() {
        assert!(matches!(
            parse_molecular_weight("<html>"),
            Err(DrugScanError::ExternalService(_))
        ));
    }

    #[test]
    fn test_parse_concept_id() {
        let body = r#"{"content":[{"id":1112807,"name":"aspirin"},{"id":2}],"totalElements":2}"#;
        assert_eq!(parse_concept_id(body).unwrap(), Some("1112807".to_string()));
        assert_eq!(parse_concept_id(r#"{"content":[]}"#).unwrap(), None);
        assert_eq!(parse_concept_id(r#"{}"#).unwrap(), None);
    }

    #[test]
    fn test_molecular_weight_url() {
        let base = Url::parse("https://pubchem.ncbi.nlm.nih.gov/rest/pug").unwrap();
        let url = molecular_weight_url(&base, "vitamin d").unwrap();
        assert_eq!(
            url.as_str(),
            "https://pubchem.ncbi.nlm.nih.gov/rest/pug/compound/name/vitamin%20d/property/MolecularWeight/JSON"
        );
    }

    #[test]
    fn test_concept_search_url() {
        let base = Url::parse("https://athena.ohdsi.org/api/v1/concepts").unwrap();
        let url = concept_search_url(&base, "vitamin d");
        assert_eq!(url.path(), "/api/v1/concepts");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("query".to_string(), "vitamin d".to_string())));
        assert!(pairs.contains(&("domain".to_string(), "Drug".to_string())));
    }

    #[test]
    fn test_local_only_makes_no_request() {
        let config = EngineConfig {
            pubchem_url: "http://127.0.0.1:9/pug".into(),
            ..Default::default()
        };
        let gateway = HttpEnrichmentGateway::from_config(&config).unwrap();
        let mut attrs = Attributes::new();
        gateway.resolve_molecular_weight(&mut attrs, "aspirin", false).unwrap();
        assert!(attrs.is_empty());
    }

    #[test]
    fn test_unreachable_service_is_external_error() {
        let config = EngineConfig {
            pubchem_url: "http://127.0.0.1:9/pug".into(),
            concept_url: "http://127.0.0.1:9/concepts".into(),
            http_timeout_secs: 2,
            ..Default::default()
        };
        let gateway = HttpEnrichmentGateway::from_config(&config).unwrap();

        let mut attrs = Attributes::new();
        let err = gateway
            .resolve_molecular_weight(&mut attrs, "aspirin", true)
            .unwrap_err();
        assert!(err.is_recoverable());
        assert!(attrs.is_empty());
        assert!(gateway.resolve_concept_id("aspirin").is_err());
    }
}
