//! Legacy backend client speaking the Solr JSON update API.
//!
//! Each entity kind has its own core, so one [`SolrWriter`] is built per
//! core URL. All writes go through `POST {core}/update?wt=json`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use sync_types::{DocumentRef, Fields, SearchDocument};

use crate::error::BackendError;
use crate::writer::IndexWriter;

/// Configuration for a legacy core writer.
#[derive(Debug, Clone)]
pub struct SolrWriterConfig {
    /// Name used in logs (usually the entity kind label)
    pub name: String,
    /// Core URL, e.g. "http://127.0.0.1:8983/solr/recap"
    pub url: String,
    /// Request timeout
    pub timeout: Duration,
}

impl SolrWriterConfig {
    /// Create a config with the default 30 second timeout.
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Writer for one legacy core.
pub struct SolrWriter {
    client: Client,
    config: SolrWriterConfig,
}

#[derive(Deserialize)]
struct SolrResponse {
    #[serde(rename = "responseHeader")]
    header: SolrHeader,
}

#[derive(Deserialize)]
struct SolrHeader {
    status: i64,
}

impl SolrWriter {
    /// Create a new writer.
    pub fn new(config: SolrWriterConfig) -> Result<Self, BackendError> {
        if config.url.trim().is_empty() {
            return Err(BackendError::Config(format!(
                "no core url for {}",
                config.name
            )));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| BackendError::Config(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// The update handler URL.
    fn update_url(&self) -> String {
        format!("{}/update", self.config.url.trim_end_matches('/'))
    }

    /// Send a JSON body to the update handler and check Solr's status.
    async fn post_update(&self, body: &Value, soft_commit: bool) -> Result<(), BackendError> {
        let mut request = self
            .client
            .post(self.update_url())
            .query(&[("wt", "json")])
            .json(body);
        if soft_commit {
            request = request.query(&[("softCommit", "true")]);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::from_status(status.as_u16(), body));
        }

        let parsed: SolrResponse = response.json().await?;
        if parsed.header.status != 0 {
            return Err(BackendError::Transport {
                status: status.as_u16(),
                body: format!("solr status {}", parsed.header.status),
            });
        }
        Ok(())
    }
}

/// Body of a document as the legacy backend expects it: fields plus `id`.
fn solr_document(doc: &SearchDocument) -> Value {
    let mut body = doc.body();
    body.insert("id".to_string(), Value::String(doc.id.clone()));
    Value::Object(body)
}

/// Atomic update body setting each named field.
fn atomic_update(target: &DocumentRef, fields: &Fields) -> Value {
    let mut update = Fields::new();
    update.insert("id".to_string(), Value::String(target.id.clone()));
    for (name, value) in fields {
        update.insert(name.clone(), json!({ "set": value }));
    }
    Value::Array(vec![Value::Object(update)])
}

#[async_trait]
impl IndexWriter for SolrWriter {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn add(&self, docs: &[SearchDocument]) -> Result<(), BackendError> {
        if docs.is_empty() {
            debug!(core = %self.config.name, "No documents to add");
            return Ok(());
        }
        let body = Value::Array(docs.iter().map(solr_document).collect());
        self.post_update(&body, false).await?;
        debug!(core = %self.config.name, count = docs.len(), "Added documents");
        Ok(())
    }

    async fn update(
        &self,
        target: &DocumentRef,
        fields: &Fields,
        refresh: bool,
    ) -> Result<(), BackendError> {
        self.post_update(&atomic_update(target, fields), refresh)
            .await?;
        debug!(core = %self.config.name, id = %target.id, "Updated document fields");
        Ok(())
    }

    async fn delete_by_ids(&self, ids: &[String]) -> Result<(), BackendError> {
        if ids.is_empty() {
            return Ok(());
        }
        self.post_update(&json!({ "delete": ids }), false).await?;
        debug!(core = %self.config.name, count = ids.len(), "Deleted documents");
        Ok(())
    }

    async fn commit(&self) -> Result<(), BackendError> {
        self.post_update(&json!({ "commit": {} }), false).await?;
        debug!(core = %self.config.name, "Committed");
        Ok(())
    }
}
