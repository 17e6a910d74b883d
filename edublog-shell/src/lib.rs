//! Offline shell for the EduBlog web app.
//!
//! Mirrors a service worker's lifecycle: `install` precaches the app entry
//! points into a versioned cache, `activate` drops caches from older
//! versions, `respond` serves cache-first with network fallback, and
//! `handle_sync` forwards background-sync events to the sync trigger.

pub mod config;
pub mod error;
pub mod fetcher;
pub mod shell;

pub use config::ShellConfig;
pub use error::{ShellError, ShellResult};
pub use fetcher::{AssetFetcher, FetchedAsset, HttpFetcher};
pub use shell::{CacheShell, ShellResponse};
