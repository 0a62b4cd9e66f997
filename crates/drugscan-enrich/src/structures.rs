//! Structure file download.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use drugscan_common::{DrugScanError, EngineConfig, Result};
use drugscan_ner::StructureProvider;
use tempfile::NamedTempFile;
use tracing::{info, instrument};
use url::Url;

use crate::client::{external, parse_base_url, AllowlistClient};

/// Downloads the structure file on first use and reuses it afterwards.
pub struct HttpStructureProvider {
    client: AllowlistClient,
    url: Url,
    file_name: String,
}

impl HttpStructureProvider {
    pub fn new(client: AllowlistClient, url: Url, file_name: impl Into<String>) -> Self {
        Self { client, url, file_name: file_name.into() }
    }

    /// `None` when no structure URL is configured.
    pub fn from_config(config: &EngineConfig) -> Result<Option<Self>> {
        let Some(raw) = &config.structure_url else {
            return Ok(None);
        };
        let url = parse_base_url(raw)?;
        let mut client = AllowlistClient::new(Duration::from_secs(config.http_timeout_secs))?;
        client.allow_url(&url);
        Ok(Some(Self::new(client, url, config.structure_file_name.clone())))
    }

    #[instrument(skip(self))]
    fn download(&self, target: &Path, dir: &Path) -> Result<()> {
        let mut resp = self.client.get(&self.url)?.send().map_err(external)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(DrugScanError::ExternalService(format!(
                "{} returned {status}",
                self.url
            )));
        }

        let mut tmp = NamedTempFile::new_in(dir)?;
        let bytes = resp.copy_to(&mut tmp).map_err(external)?;
        tmp.flush()?;
        tmp.persist(target).map_err(|e| e.error)?;

        info!(url = %self.url, path = %target.display(), bytes, "Downloaded structure file");
        Ok(())
    }
}

impl StructureProvider for HttpStructureProvider {
    fn ensure_local(&self, dir: &Path) -> Result<PathBuf> {
        let target = dir.join(&self.file_name);
        if !target.is_file() {
            std::fs::create_dir_all(dir)?;
            self.download(&target, dir)?;
        }
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_url_means_no_provider() {
        let config = EngineConfig::default();
        assert!(HttpStructureProvider::from_config(&config).unwrap().is_none());
    }

    #[test]
    fn test_existing_file_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("structures.sdf"), "DB00945\n$$$$\n").unwrap();
        let config = EngineConfig {
            structure_url: Some("http://127.0.0.1:9/structures.sdf".into()),
            structure_file_name: "structures.sdf".into(),
            ..Default::default()
        };

        let provider = HttpStructureProvider::from_config(&config).unwrap().unwrap();
        let path = provider.ensure_local(dir.path()).unwrap();
        assert_eq!(path, dir.path().join("structures.sdf"));
    }

    #[test]
    fn test_failed_download_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            structure_url: Some("http://127.0.0.1:9/structures.sdf".into()),
            http_timeout_secs: 2,
            ..Default::default()
        };

        let provider = HttpStructureProvider::from_config(&config).unwrap().unwrap();
        let err = provider.ensure_local(dir.path()).unwrap_err();
        assert!(matches!(err, DrugScanError::ExternalService(_)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
