//! Shell configuration.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// Versioned cache name. Bump it to invalidate every cached asset.
    pub cache_name: String,

    /// Entry points fetched and stored at install.
    pub precache_urls: Vec<String>,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            cache_name: "edublog-cache-v1".to_string(),
            precache_urls: ["/", "/index.html", "/src/main.tsx", "/src/App.tsx"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}
