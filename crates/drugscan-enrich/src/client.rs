use std::collections::HashSet;
use std::time::Duration;

use drugscan_common::{DrugScanError, Result};
use reqwest::blocking::{Client, ClientBuilder, RequestBuilder};
use url::Url;

/// Blocking HTTP client restricted to an allow-list of hosts.
#[derive(Debug, Clone)]
pub struct AllowlistClient {
    client: Client,
    allowlist: HashSet<String>,
}

impl AllowlistClient {
    /// Client allowing the public drug-data services used by default.
    pub fn new(timeout: Duration) -> Result<Self> {
        let allowlist = [
            "pubchem.ncbi.nlm.nih.gov", // PubChem PUG REST
            "athena.ohdsi.org",         // OHDSI Athena vocabulary
            "go.drugbank.com",          // DrugBank open structures
        ]
        .into_iter()
        .map(str::to_string)
        .collect();

        let client = ClientBuilder::new()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                DrugScanError::ExternalService(format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self { client, allowlist })
    }

    /// Allow an exact hostname.
    pub fn allow_domain(&mut self, domain: &str) {
        self.allowlist.insert(domain.to_string());
    }

    /// Allow the host `url` points at.
    pub fn allow_url(&mut self, url: &Url) {
        if let Some(host) = url.host_str() {
            self.allow_domain(host);
        }
    }

    /// Exact host or a subdomain of an allowed host.
    pub fn is_allowed(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        self.allowlist
            .iter()
            .any(|allowed| host == allowed || host.ends_with(&format!(".{allowed}")))
    }

    pub fn get(&self, url: &Url) -> Result<RequestBuilder> {
        if !self.is_allowed(url) {
            return Err(DrugScanError::ExternalService(format!(
                "domain not in allowlist for URL {url}"
            )));
        }
        Ok(self.client.get(url.clone()))
    }
}

/// Map a transport error into the engine's error taxonomy.
pub(crate) fn external(e: reqwest::Error) -> DrugScanError {
    DrugScanError::ExternalService(e.to_string())
}

/// Parse a configured base URL.
pub(crate) fn parse_base_url(raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| DrugScanError::Config(format!("invalid URL '{raw}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> AllowlistClient {
        AllowlistClient::new(Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn test_default_allowlist() {
        let client = client();
        let allowed = |raw: &str| client.is_allowed(&Url::parse(raw).unwrap());
        assert!(allowed("https://pubchem.ncbi.nlm.nih.gov/rest/pug"));
        assert!(allowed("https://api.athena.ohdsi.org/x"));
        assert!(!allowed("https://evil.example.com/"));
        assert!(!allowed("https://notpubchem.ncbi.nlm.nih.gov.evil.com/"));
    }

    #[test]
    fn test_disallowed_get_is_external_error() {
        let client = client();
        let err = client.get(&Url::parse("https://example.com/").unwrap()).unwrap_err();
        assert!(matches!(err, DrugScanError::ExternalService(_)));
    }

    #[test]
    fn test_allow_url() {
        let mut client = client();
        let url = Url::parse("http://127.0.0.1:8080/structures.sdf").unwrap();
        assert!(!client.is_allowed(&url));
        client.allow_url(&url);
        assert!(client.is_allowed(&url));
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(parse_base_url("not a url"), Err(DrugScanError::Config(_))));
    }
}
