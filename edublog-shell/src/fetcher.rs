//! Network access for assets.

use crate::error::{ShellError, ShellResult};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use tracing::debug;

/// A network response for one asset.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedAsset {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl FetchedAsset {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Fetches an app-relative URL from the network.
///
/// Non-2xx responses are returned as-is; only transport failures are errors.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> ShellResult<FetchedAsset>;
}

/// Fetches assets from the app's origin over HTTP.
pub struct HttpFetcher {
    client: Client,
    origin: String,
}

impl HttpFetcher {
    pub fn new(origin: impl Into<String>) -> ShellResult<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            origin: origin.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl AssetFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> ShellResult<FetchedAsset> {
        let full = format!("{}{}", self.origin, url);
        let resp = self
            .client
            .get(&full)
            .send()
            .await
            .map_err(|e| ShellError::Fetch {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let body = resp.bytes().await.map_err(|e| ShellError::Fetch {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        debug!("fetched {url}: {status}, {} bytes", body.len());

        Ok(FetchedAsset {
            status,
            content_type,
            body: body.to_vec(),
        })
    }
}
