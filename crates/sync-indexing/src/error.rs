//! Error types for conversion, record loading and task orchestration.

use sync_backend::BackendError;
use sync_types::{EntityId, EntityKind};
use thiserror::Error;

/// Why a single entity could not be converted into a search document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConversionError {
    /// A required attribute is missing
    #[error("Entity {id}: missing attribute: {message}")]
    Attribute { id: EntityId, message: String },

    /// An attribute has a value of the wrong type or format
    #[error("Entity {id}: invalid value: {message}")]
    Value { id: EntityId, message: String },

    /// The entity's content cannot be turned into a document
    #[error("Entity {id}: unparseable document: {message}")]
    Unparseable { id: EntityId, message: String },
}

impl ConversionError {
    /// Id of the entity that failed to convert.
    pub fn entity_id(&self) -> EntityId {
        match self {
            ConversionError::Attribute { id, .. }
            | ConversionError::Value { id, .. }
            | ConversionError::Unparseable { id, .. } => *id,
        }
    }
}

/// Errors raised by a [`RecordStore`](crate::store::RecordStore).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No record with this kind and id
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: EntityId },

    /// The store could not be read
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Snapshot or record could not be decoded
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Errors surfaced by pipeline entry points.
#[derive(Error, Debug, Clone)]
pub enum SyncError {
    /// Backend write failed
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Record store failed
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A document could not be built
    #[error("Conversion error: {0}")]
    Conversion(#[from] ConversionError),

    /// No converter registered for a kind
    #[error("No converter registered for {0}")]
    NoConverter(EntityKind),

    /// No backend writer configured for a kind
    #[error("No writer configured for {0}")]
    NoWriter(EntityKind),

    /// Bounded retries ran out
    #[error("Gave up after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<SyncError>,
    },

    /// Invalid pipeline configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SyncError {
    /// Whether the failed call may succeed if retried.
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Backend(err) => err.is_transient(),
            _ => false,
        }
    }
}
