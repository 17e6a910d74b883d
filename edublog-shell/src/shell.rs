//! The cache shell lifecycle.

use crate::config::ShellConfig;
use crate::error::{ShellError, ShellResult};
use crate::fetcher::AssetFetcher;
use chrono::Utc;
use edublog_storage::{AssetCache, CachedAsset, StorageResult};
use edublog_sync::{DrainReport, SyncTrigger};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What `respond` served.
#[derive(Debug, Clone, PartialEq)]
pub struct ShellResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
    pub from_cache: bool,
}

pub struct CacheShell {
    cache: AssetCache,
    fetcher: Arc<dyn AssetFetcher>,
    trigger: Option<Arc<SyncTrigger>>,
    config: ShellConfig,
}

impl CacheShell {
    pub fn new(cache: AssetCache, fetcher: Arc<dyn AssetFetcher>, config: ShellConfig) -> Self {
        Self {
            cache,
            fetcher,
            trigger: None,
            config,
        }
    }

    /// Routes background-sync events to `trigger`.
    pub fn with_trigger(mut self, trigger: Arc<SyncTrigger>) -> Self {
        self.trigger = Some(trigger);
        self
    }

    pub fn config(&self) -> &ShellConfig {
        &self.config
    }

    async fn blocking<T, F>(&self, f: F) -> ShellResult<T>
    where
        F: FnOnce(AssetCache) -> StorageResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let cache = self.cache.clone();
        tokio::task::spawn_blocking(move || f(cache))
            .await
            .map_err(|e| ShellError::Task(e.to_string()))?
            .map_err(ShellError::from)
    }

    /// Fetches every precache URL and stores them all, or none.
    ///
    /// Returns the number of assets stored.
    pub async fn install(&self) -> ShellResult<usize> {
        let fetches = self.config.precache_urls.iter().map(|url| async move {
            let fetched = self.fetcher.fetch(url).await?;
            if !fetched.is_success() {
                return Err(ShellError::BadStatus {
                    url: url.clone(),
                    status: fetched.status,
                });
            }
            Ok::<_, ShellError>(CachedAsset {
                url: url.clone(),
                status: fetched.status,
                content_type: fetched.content_type,
                body: fetched.body,
                stored_at: Utc::now(),
            })
        });

        let assets = match futures::future::try_join_all(fetches).await {
            Ok(assets) => assets,
            Err(e) => {
                warn!("install of {} failed: {e}", self.config.cache_name);
                return Err(e);
            }
        };

        let count = assets.len();
        let name = self.config.cache_name.clone();
        self.blocking(move |cache| cache.put_all(&name, &assets))
            .await?;
        info!("installed {count} assets into {}", self.config.cache_name);
        Ok(count)
    }

    /// Deletes every cache except the current one. Returns the deleted names.
    pub async fn activate(&self) -> ShellResult<Vec<String>> {
        let current = self.config.cache_name.clone();
        let deleted = self
            .blocking(move |cache| {
                let mut deleted = Vec::new();
                for name in cache.cache_names()? {
                    if name != current {
                        cache.delete_cache(&name)?;
                        deleted.push(name);
                    }
                }
                Ok(deleted)
            })
            .await?;

        for name in &deleted {
            info!("deleted stale cache {name}");
        }
        Ok(deleted)
    }

    /// Serves `url` from the current cache, falling back to the network.
    /// Network responses are not stored.
    pub async fn respond(&self, url: &str) -> ShellResult<ShellResponse> {
        let name = self.config.cache_name.clone();
        let key = url.to_string();
        if let Some(hit) = self
            .blocking(move |cache| cache.lookup(&name, &key))
            .await?
        {
            debug!("cache hit {url}");
            return Ok(ShellResponse {
                status: hit.status,
                content_type: hit.content_type,
                body: hit.body,
                from_cache: true,
            });
        }

        debug!("cache miss {url}, fetching");
        let fetched = self.fetcher.fetch(url).await?;
        Ok(ShellResponse {
            status: fetched.status,
            content_type: fetched.content_type,
            body: fetched.body,
            from_cache: false,
        })
    }

    /// Forwards a background-sync event. Returns `None` when there is no
    /// trigger or the tag is not ours.
    pub async fn handle_sync(&self, tag: &str) -> ShellResult<Option<DrainReport>> {
        let Some(trigger) = &self.trigger else {
            debug!("no sync trigger, ignoring tag {tag:?}");
            return Ok(None);
        };
        Ok(trigger.on_background_sync_signal(tag).await?)
    }
}
