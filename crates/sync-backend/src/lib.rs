//! # sync-backend
//!
//! Write clients for the search backends kept in sync by docket-sync.
//!
//! Two backends are supported behind one narrow [`IndexWriter`] interface:
//! - [`SolrWriter`]: the legacy backend, one core per entity kind
//! - [`ElasticWriter`]: the current backend, which also implements
//!   [`NestedIndex`] for parent/child documents and versioned saves
//!
//! [`MemoryIndex`] is an in-process implementation of both traits used by
//! tests and dry runs. It supports failure injection and counts calls.
//!
//! Every client reports failures as [`BackendError`], whose
//! [`BackendError::is_transient`] decides whether a task is retried.

pub mod elastic;
pub mod error;
pub mod memory;
pub mod solr;
pub mod writer;

pub use elastic::{ElasticWriter, ElasticWriterConfig};
pub use error::BackendError;
pub use memory::{MemoryIndex, StoredDocument};
pub use solr::{SolrWriter, SolrWriterConfig};
pub use writer::{strip_empty, IndexWriter, NestedIndex, SaveOptions, SaveResponse};
