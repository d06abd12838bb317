//! # sync-types
//!
//! Shared domain types for the docket-sync pipeline.
//!
//! This crate defines the data structures passed between the record store,
//! the converters and the search backends:
//! - Entities: relational records that can be represented as search documents
//! - Search documents: backend-ready field maps with routing information
//! - Settings: layered configuration for backends, retries and alerts
//!
//! ## Usage
//!
//! ```rust
//! use sync_types::{Entity, EntityKind};
//!
//! let audio = Entity::new(42, EntityKind::Audio);
//! assert!(!audio.kind.is_aggregate());
//! ```

pub mod config;
pub mod document;
pub mod entity;
pub mod error;

pub use config::{
    AlertSettings, CurrentBackendSettings, LegacyBackendSettings, RetrySettings, Settings,
    REDACTED,
};
pub use document::{ChildDescriptor, DocumentRef, Fields, SearchDocument, PERSON_JOIN_FIELD};
pub use entity::{Entity, EntityId, EntityKind, ParentMetadata};
pub use error::SyncTypesError;
