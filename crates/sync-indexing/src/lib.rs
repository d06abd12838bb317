//! Synchronization pipeline for docket-sync.
//!
//! This crate turns relational records into search documents and keeps the
//! search backends consistent with them.
//!
//! ## Key Components
//!
//! - [`ConverterRegistry`]: Per-kind entity-to-document converters
//! - [`StalenessGate`]: Skips aggregates that were re-indexed recently
//! - [`SharedMetadata`]: Parent fields fetched once per child batch
//! - [`RoutingResolver`]: Places nested children under their parent
//! - [`AlertTrigger`]: Forwards first creations of alert-eligible documents
//! - [`SyncPipeline`]: Task entry points returning an [`Outcome`]
//!
//! ## Architecture
//!
//! 1. A task loads records from a [`RecordStore`]
//! 2. Converters build documents; per-record failures are collected, not raised
//! 3. Documents are written through a backend writer
//! 4. The task reports an [`Outcome`]; retries and continuation
//!    cancellation are left to the scheduler
//!
//! ## Example
//!
//! ```ignore
//! use sync_indexing::{MemoryStore, SyncPipeline, TaskContext};
//!
//! let pipeline = SyncPipeline::from_settings(&settings, store, flags)?;
//! let outcome = pipeline
//!     .add_batch(&TaskContext::new("t1"), &[1, 2, 3], EntityKind::Audio, true)
//!     .await;
//! ```

pub mod alerts;
pub mod converter;
pub mod error;
pub mod metadata;
pub mod outcome;
pub mod report;
pub mod routing;
pub mod staleness;
pub mod store;
pub mod tasks;

pub use alerts::{
    AlertDecision, AlertEligibility, AlertForward, AlertTrigger, CancelReason, FeatureFlags,
    StaticFlags,
};
pub use converter::{
    convert_batch, AggregateConverter, BatchConversion, Conversion, ConversionFailure,
    ConverterRegistry, DocumentConverter, FieldConverter, FieldSpec, FieldType,
};
pub use error::{ConversionError, StoreError, SyncError};
pub use metadata::SharedMetadata;
pub use outcome::{BoundedRetry, Outcome, RetryPolicy, TaskContext};
pub use report::{AggregateStatus, BatchReport};
pub use routing::{NotReadyReason, Routing, RoutingResolver};
pub use staleness::{Freshness, StalenessGate};
pub use store::{MemoryStore, RecordStore, Snapshot};
pub use tasks::{AggregatePayload, SyncPipeline, SyncPipelineBuilder};
