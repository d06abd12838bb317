//! Backend write interfaces.
//!
//! [`IndexWriter`] is the narrow capability every backend offers: batch
//! add/overwrite, partial update, delete by id and commit. Writes are keyed
//! by document id, so re-sending a document overwrites it.
//!
//! [`NestedIndex`] extends it with what the nested-document backend adds:
//! existence checks used by child routing and single saves that report the
//! document version.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use sync_types::{DocumentRef, Fields, SearchDocument};

use crate::error::BackendError;

/// Write operations shared by all backends.
#[async_trait]
pub trait IndexWriter: Send + Sync {
    /// Name of this writer for logging.
    fn name(&self) -> &str;

    /// Add or overwrite a batch of documents.
    async fn add(&self, docs: &[SearchDocument]) -> Result<(), BackendError>;

    /// Update only the named fields of an existing document.
    async fn update(
        &self,
        target: &DocumentRef,
        fields: &Fields,
        refresh: bool,
    ) -> Result<(), BackendError>;

    /// Delete documents by primary key. Unknown ids are ignored.
    async fn delete_by_ids(&self, ids: &[String]) -> Result<(), BackendError>;

    /// Make pending writes visible.
    async fn commit(&self) -> Result<(), BackendError>;
}

/// Options for a single-document save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveOptions {
    /// Drop null and empty values from the body before sending
    pub skip_empty: bool,
    /// Include the backend's raw write metadata in the response
    pub return_meta: bool,
    /// Refresh the index so the write is immediately searchable
    pub refresh: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            skip_empty: false,
            return_meta: true,
            refresh: false,
        }
    }
}

/// Result of a single-document save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveResponse {
    /// Id assigned to the document
    pub id: String,
    /// Document version after the write; 1 means the document was created
    pub version: u64,
    /// Raw write metadata, when requested
    #[serde(default)]
    pub meta: Option<Fields>,
}

impl SaveResponse {
    /// Whether this write created the document.
    pub fn is_first_creation(&self) -> bool {
        self.version == 1
    }
}

/// Nested-document backend operations.
#[async_trait]
pub trait NestedIndex: IndexWriter {
    /// Name of the index this writer targets.
    fn index_name(&self) -> &str;

    /// Whether the target index exists.
    async fn index_exists(&self) -> Result<bool, BackendError>;

    /// Whether a document with this id exists in the index.
    async fn document_exists(&self, id: &str) -> Result<bool, BackendError>;

    /// Save one document, returning its id and post-write version.
    async fn save(
        &self,
        doc: &SearchDocument,
        options: SaveOptions,
    ) -> Result<SaveResponse, BackendError>;
}

/// Remove null, empty-string, empty-array and empty-object values.
pub fn strip_empty(fields: &Fields) -> Fields {
    fields
        .iter()
        .filter(|(_, value)| match value {
            Value::Null => false,
            Value::String(s) => !s.is_empty(),
            Value::Array(items) => !items.is_empty(),
            Value::Object(map) => !map.is_empty(),
            _ => true,
        })
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}
