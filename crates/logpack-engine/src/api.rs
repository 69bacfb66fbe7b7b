//! HTTP client for the pack server
//!
//! Two endpoints per pack:
//!
//! - `GET {server}/api/log-packs/{packId}/meta` returns [`PackMeta`]
//! - `GET {server}/api/log-packs/{packId}/download` returns the raw archive

use crate::config::SessionConfig;
use crate::error::{EngineError, Result};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use url::Url;

// ============================================================================
// Endpoints
// ============================================================================

/// Build the pack metadata URL
pub fn meta_url(base_url: &str, pack_id: &str) -> String {
    format!("{}/api/log-packs/{}/meta", base_url, pack_id)
}

/// Build the pack download URL
pub fn download_url(base_url: &str, pack_id: &str) -> String {
    format!("{}/api/log-packs/{}/download", base_url, pack_id)
}

/// Metadata the server publishes for a pack
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackMeta {
    pub pack_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Object storage key of the archive
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r2_key: Option<String>,
    /// Expected SHA-256 of the compressed archive
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// Client for the pack server
#[derive(Debug, Clone)]
pub struct PackClient {
    client: Client,
    base_url: String,
}

/// Map non-success statuses to [`EngineError::Transport`]
fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    Err(EngineError::Transport {
        status: status.as_u16(),
        message: status.canonical_reason().unwrap_or("Unknown").to_string(),
    })
}

impl PackClient {
    pub fn new(config: &SessionConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.api_timeout).build()?;
        Ok(Self {
            client,
            base_url: config.server_url.trim_end_matches('/').to_string(),
        })
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(&SessionConfig::from_env()?)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// URL the archive of `pack_id` is served from
    pub fn download_url(&self, pack_id: &str) -> String {
        download_url(&self.base_url, pack_id)
    }

    /// Fetch pack metadata
    #[instrument(skip(self))]
    pub async fn fetch_meta(&self, pack_id: &str) -> Result<PackMeta> {
        let url = meta_url(&self.base_url, pack_id);
        let response = self.client.get(&url).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(EngineError::PackNotFound(pack_id.to_string()));
        }

        let meta: PackMeta = check_status(response)?.json().await?;
        debug!(pack_id, title = %meta.title, "Fetched pack metadata");
        Ok(meta)
    }

    /// Download the archive of `pack_id`
    pub async fn download(&self, pack_id: &str) -> Result<Vec<u8>> {
        self.fetch_url(&self.download_url(pack_id), |_, _| {}).await
    }

    /// Download `url`, reporting `(loaded, total)` after every chunk
    #[instrument(skip(self, on_progress))]
    pub async fn fetch_url<F>(&self, url: &str, mut on_progress: F) -> Result<Vec<u8>>
    where
        F: FnMut(u64, Option<u64>),
    {
        let url = Url::parse(url)?;
        let mut response = check_status(self.client.get(url).send().await?)?;

        let total = response.content_length();
        let mut buffer = Vec::with_capacity(total.unwrap_or(0).min(64 * 1024 * 1024) as usize);

        while let Some(chunk) = response.chunk().await? {
            buffer.extend_from_slice(&chunk);
            on_progress(buffer.len() as u64, total);
        }

        info!(bytes = buffer.len(), "Downloaded pack");
        Ok(buffer)
    }
}
