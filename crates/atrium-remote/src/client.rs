use anyhow::{bail, Context, Result};
use atrium_manifest::AppManifest;

/// Read-only client for the remote app registry: catalog listing, single
/// entries, and search.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    registry_url: String,
    client: reqwest::Client,
}

impl RegistryClient {
    pub fn new(registry_url: &str) -> Self {
        Self {
            registry_url: registry_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// `GET {registry_url}` returning the full catalog.
    pub async fn fetch_catalog(&self) -> Result<Vec<AppManifest>> {
        self.get_json(&self.registry_url).await
    }

    /// `GET {registry_url}/{id}` returning one catalog entry.
    pub async fn fetch_entry(&self, id: &str) -> Result<AppManifest> {
        self.get_json(&format!("{}/{}", self.registry_url, id)).await
    }

    /// `GET {registry_url}/search?q=` returning filtered entries.
    pub async fn search(&self, query: &str) -> Result<Vec<AppManifest>> {
        let url = format!("{}/search", self.registry_url);
        let response = self
            .client
            .get(&url)
            .query(&[("q", query)])
            .send()
            .await
            .with_context(|| format!("failed to search registry {url}"))?;
        if !response.status().is_success() {
            bail!("registry search '{url}' returned status {}", response.status());
        }
        response
            .json()
            .await
            .with_context(|| format!("failed to decode registry search response from {url}"))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("failed to fetch registry resource {url}"))?;
        if !response.status().is_success() {
            bail!("registry resource '{url}' returned status {}", response.status());
        }
        response
            .json()
            .await
            .with_context(|| format!("failed to decode registry response from {url}"))
    }
}
