//! Current-generation backend client speaking the Elasticsearch REST API.
//!
//! One [`ElasticWriter`] targets one index. Batch writes go through `_bulk`,
//! single saves through `PUT _doc/{id}` so the response carries the
//! document version used to detect first creation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use sync_types::{DocumentRef, Fields, SearchDocument};

use crate::error::BackendError;
use crate::writer::{strip_empty, IndexWriter, NestedIndex, SaveOptions, SaveResponse};

/// Configuration for a current-backend index writer.
#[derive(Debug, Clone)]
pub struct ElasticWriterConfig {
    /// Cluster base URL (e.g., "http://127.0.0.1:9200")
    pub url: String,

    /// Target index name
    pub index: String,

    /// API key, sent as `Authorization: ApiKey <key>`
    pub api_key: Option<SecretString>,

    /// Request timeout
    pub timeout: Duration,
}

impl ElasticWriterConfig {
    /// Create a config without credentials and a 30 second timeout.
    pub fn new(url: impl Into<String>, index: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            index: index.into(),
            api_key: None,
            timeout: Duration::from_secs(30),
        }
    }

    /// Set the API key.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::from(api_key.into()));
        self
    }

    /// Set an API key that is already held as a secret.
    pub fn with_secret_api_key(mut self, api_key: SecretString) -> Self {
        self.api_key = Some(api_key);
        self
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Writer for one index of the current backend.
pub struct ElasticWriter {
    client: Client,
    config: ElasticWriterConfig,
}

#[derive(Deserialize)]
struct WriteResponse {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_version")]
    version: u64,
}

#[derive(Deserialize)]
struct BulkResponse {
    errors: bool,
    #[serde(default)]
    items: Vec<Value>,
}

/// Bulk operation kind.
#[derive(Clone, Copy)]
enum BulkAction {
    Index,
    Delete,
}

impl ElasticWriter {
    /// Create a new writer.
    pub fn new(config: ElasticWriterConfig) -> Result<Self, BackendError> {
        if config.url.trim().is_empty() || config.index.trim().is_empty() {
            return Err(BackendError::Config(
                "url and index are required".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| BackendError::Config(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn base_url(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    fn request(&self, method: Method, url: String) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.config.api_key {
            Some(key) => builder.header(
                "Authorization",
                format!("ApiKey {}", key.expose_secret()),
            ),
            None => builder,
        }
    }

    /// HEAD request mapped to existence: 200 true, 404 false.
    async fn exists(&self, url: String) -> Result<bool, BackendError> {
        let response = self.request(Method::HEAD, url).send().await?;
        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(BackendError::from_status(status.as_u16(), "")),
        }
    }

    /// Fail on a non-success status, returning the response otherwise.
    async fn check(response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(BackendError::from_status(status.as_u16(), body))
    }

    fn refresh_param(refresh: bool) -> &'static str {
        if refresh {
            "true"
        } else {
            "false"
        }
    }

    /// Send a `_bulk` request and surface the first item failure.
    async fn bulk(&self, body: String, action: BulkAction) -> Result<(), BackendError> {
        let response = self
            .request(Method::POST, format!("{}/_bulk", self.base_url()))
            .header("Content-Type", "application/x-ndjson")
            .body(body)
            .send()
            .await?;
        let response = Self::check(response).await?;
        let parsed: BulkResponse = response.json().await?;
        if !parsed.errors {
            return Ok(());
        }

        for item in &parsed.items {
            let Some(result) = item.as_object().and_then(|o| o.values().next()) else {
                continue;
            };
            let status = result.get("status").and_then(Value::as_u64).unwrap_or(500) as u16;
            // Deleting an id that is already gone is not a failure
            if matches!(action, BulkAction::Delete) && status == 404 {
                continue;
            }
            if status >= 300 {
                let reason = result
                    .get("error")
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "bulk item failed".to_string());
                warn!(index = %self.config.index, status, "Bulk item failed");
                return Err(BackendError::from_status(status, reason));
            }
        }
        Ok(())
    }

    fn bulk_index_body(&self, docs: &[SearchDocument]) -> Result<String, BackendError> {
        let mut body = String::new();
        for doc in docs {
            let mut meta = json!({ "_index": self.config.index, "_id": doc.id });
            if let Some(routing) = &doc.routing {
                meta["routing"] = json!(routing);
            }
            body.push_str(&serde_json::to_string(&json!({ "index": meta }))?);
            body.push('\n');
            body.push_str(&serde_json::to_string(&doc.body())?);
            body.push('\n');
        }
        Ok(body)
    }

    fn bulk_delete_body(&self, ids: &[String]) -> Result<String, BackendError> {
        let mut body = String::new();
        for id in ids {
            let action = json!({ "delete": { "_index": self.config.index, "_id": id } });
            body.push_str(&serde_json::to_string(&action)?);
            body.push('\n');
        }
        Ok(body)
    }
}

#[async_trait]
impl IndexWriter for ElasticWriter {
    fn name(&self) -> &str {
        &self.config.index
    }

    async fn add(&self, docs: &[SearchDocument]) -> Result<(), BackendError> {
        if docs.is_empty() {
            return Ok(());
        }
        let body = self.bulk_index_body(docs)?;
        self.bulk(body, BulkAction::Index).await?;
        debug!(index = %self.config.index, count = docs.len(), "Bulk indexed documents");
        Ok(())
    }

    async fn update(
        &self,
        target: &DocumentRef,
        fields: &Fields,
        refresh: bool,
    ) -> Result<(), BackendError> {
        let url = format!(
            "{}/{}/_update/{}",
            self.base_url(),
            self.config.index,
            target.id
        );
        let mut request = self
            .request(Method::POST, url)
            .query(&[("refresh", Self::refresh_param(refresh))])
            .json(&json!({ "doc": fields }));
        if let Some(routing) = &target.routing {
            request = request.query(&[("routing", routing.as_str())]);
        }

        Self::check(request.send().await?).await?;
        debug!(index = %self.config.index, id = %target.id, "Updated document fields");
        Ok(())
    }

    async fn delete_by_ids(&self, ids: &[String]) -> Result<(), BackendError> {
        if ids.is_empty() {
            return Ok(());
        }
        let body = self.bulk_delete_body(ids)?;
        self.bulk(body, BulkAction::Delete).await?;
        debug!(index = %self.config.index, count = ids.len(), "Bulk deleted documents");
        Ok(())
    }

    async fn commit(&self) -> Result<(), BackendError> {
        let url = format!("{}/{}/_refresh", self.base_url(), self.config.index);
        Self::check(self.request(Method::POST, url).send().await?).await?;
        debug!(index = %self.config.index, "Refreshed index");
        Ok(())
    }
}

#[async_trait]
impl NestedIndex for ElasticWriter {
    fn index_name(&self) -> &str {
        &self.config.index
    }

    async fn index_exists(&self) -> Result<bool, BackendError> {
        self.exists(format!("{}/{}", self.base_url(), self.config.index))
            .await
    }

    async fn document_exists(&self, id: &str) -> Result<bool, BackendError> {
        self.exists(format!(
            "{}/{}/_doc/{}",
            self.base_url(),
            self.config.index,
            id
        ))
        .await
    }

    async fn save(
        &self,
        doc: &SearchDocument,
        options: SaveOptions,
    ) -> Result<SaveResponse, BackendError> {
        let body = if options.skip_empty {
            strip_empty(&doc.body())
        } else {
            doc.body()
        };

        let url = format!("{}/{}/_doc/{}", self.base_url(), self.config.index, doc.id);
        let mut request = self
            .request(Method::PUT, url)
            .query(&[("refresh", Self::refresh_param(options.refresh))])
            .json(&body);
        if let Some(routing) = &doc.routing {
            request = request.query(&[("routing", routing.as_str())]);
        }

        let response = Self::check(request.send().await?).await?;
        let raw: Value = response.json().await?;
        let parsed: WriteResponse = serde_json::from_value(raw.clone())?;

        debug!(
            index = %self.config.index,
            id = %parsed.id,
            version = parsed.version,
            "Saved document"
        );

        Ok(SaveResponse {
            id: parsed.id,
            version: parsed.version,
            meta: if options.return_meta {
                raw.as_object().cloned()
            } else {
                None
            },
        })
    }
}
