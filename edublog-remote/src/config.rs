//! Remote backend configuration.

use serde::{Deserialize, Serialize};

/// Connection settings for the hosted table API.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Project URL, without the `/rest/v1` suffix.
    pub base_url: String,

    /// Public (anon) API key, sent as `apikey` on every request.
    pub api_key: String,

    /// Signed-in user's access token. Falls back to the API key as bearer.
    pub access_token: Option<String>,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:54321".to_string(),
            api_key: String::new(),
            access_token: None,
            request_timeout_secs: 30,
        }
    }
}

impl RemoteConfig {
    /// Table endpoint, e.g. `{base_url}/rest/v1/posts`.
    pub fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url.trim_end_matches('/'), table)
    }
}
