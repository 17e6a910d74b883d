//! REST backend for PostgREST-style hosted tables.
//!
//! - insert: `POST /rest/v1/{table}` with a one-element array, `id` included
//! - update: `PATCH /rest/v1/{table}?id=eq.{id}`
//! - delete: `DELETE /rest/v1/{table}?id=eq.{id}`

use crate::backend::RemoteBackend;
use crate::config::RemoteConfig;
use crate::error::{RemoteError, RemoteResult};
use async_trait::async_trait;
use edublog_types::{Record, Table};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

/// HTTP client for the hosted tables.
#[derive(Clone)]
pub struct RestBackend {
    client: Client,
    config: RemoteConfig,
    access_token: Arc<RwLock<Option<String>>>,
}

impl RestBackend {
    pub fn new(config: RemoteConfig) -> RemoteResult<Self> {
        if config.base_url.is_empty() {
            return Err(RemoteError::Config("base_url is empty".into()));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            access_token: Arc::new(RwLock::new(config.access_token.clone())),
            config,
        })
    }

    /// Replaces the bearer token (after sign-in or a session refresh).
    pub async fn set_access_token(&self, token: Option<String>) {
        *self.access_token.write().await = token;
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    async fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let token = self.access_token.read().await;
        let bearer = token.as_deref().unwrap_or(&self.config.api_key);
        request
            .header("apikey", &self.config.api_key)
            .bearer_auth(bearer)
    }

    fn by_id(&self, request: RequestBuilder, id: &str) -> RequestBuilder {
        request.query(&[("id", format!("eq.{id}"))])
    }

    async fn send(&self, request: RequestBuilder) -> RemoteResult<Response> {
        self.authorized(request).await.send().await.map_err(|e| {
            if e.is_connect() {
                RemoteError::Unavailable(e.to_string())
            } else {
                RemoteError::Http(e)
            }
        })
    }
}

/// Row body for an insert. The record id always wins over any `id` in the
/// payload so local and remote keys cannot diverge.
fn insert_row(record: &Record) -> RemoteResult<serde_json::Value> {
    let mut row = record.data.clone();
    let fields = row.as_object_mut().ok_or_else(|| {
        RemoteError::InvalidPayload(format!("record {} is not a JSON object", record.id))
    })?;
    fields.insert(
        "id".to_string(),
        serde_json::Value::String(record.id.clone()),
    );
    Ok(row)
}

#[async_trait]
impl RemoteBackend for RestBackend {
    async fn insert(&self, table: Table, record: &Record) -> RemoteResult<()> {
        let row = insert_row(record)?;
        let url = self.config.table_url(table.as_str());
        let request = self
            .client
            .post(&url)
            .header("Prefer", "return=minimal")
            .json(&[row]);
        let resp = self.send(request).await?;

        if resp.status() == StatusCode::CONFLICT {
            debug!("insert {table}/{} already applied", record.id);
            return Ok(());
        }
        check_status(resp).await
    }

    async fn update(
        &self,
        table: Table,
        id: &str,
        partial: &serde_json::Value,
    ) -> RemoteResult<()> {
        let url = self.config.table_url(table.as_str());
        let request = self.by_id(self.client.patch(&url), id).json(partial);
        let resp = self.send(request).await?;
        check_status(resp).await
    }

    async fn delete_by_id(&self, table: Table, id: &str) -> RemoteResult<()> {
        let url = self.config.table_url(table.as_str());
        let request = self.by_id(self.client.delete(&url), id);
        let resp = self.send(request).await?;
        check_status(resp).await
    }
}

async fn check_status(resp: Response) -> RemoteResult<()> {
    let status = resp.status();
    if status.is_success() {
        return Ok(());
    }
    let body = resp.text().await.unwrap_or_default();
    Err(RemoteError::Status {
        status: status.as_u16(),
        body,
    })
}
