//! Record store interface and an in-memory implementation.
//!
//! The relational store is external to the pipeline. [`RecordStore`] is the
//! read side the pipeline needs plus the single write it performs: stamping
//! `last_indexed_at` on aggregates after a successful re-index.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sync_types::{Entity, EntityId, EntityKind, ParentMetadata};

use crate::error::StoreError;

/// Access to the relational records being indexed.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Load the records of one kind. Unknown ids are skipped.
    ///
    /// Aggregates are returned with their children attached, ordered by id.
    async fn fetch(&self, kind: EntityKind, ids: &[EntityId]) -> Result<Vec<Entity>, StoreError>;

    /// Load a single record.
    async fn fetch_one(&self, kind: EntityKind, id: EntityId) -> Result<Entity, StoreError> {
        self.fetch(kind, &[id])
            .await?
            .into_iter()
            .next()
            .ok_or(StoreError::NotFound { kind, id })
    }

    /// Denormalized fields of the parent owning `child`, if it has one.
    async fn parent_metadata(&self, child: &Entity) -> Result<Option<ParentMetadata>, StoreError>;

    /// Record that the given aggregates were fully re-indexed at `at`.
    async fn stamp_indexed(
        &self,
        kind: EntityKind,
        ids: &[EntityId],
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}

/// Serialized form of a [`MemoryStore`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    /// Records, optionally with nested children
    #[serde(default)]
    pub entities: Vec<Entity>,
}

/// In-memory record store.
///
/// Records are held flat. Children nested in an inserted aggregate are
/// split out and linked back through `parent_id`, then reattached when the
/// aggregate is fetched.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<(EntityKind, EntityId), Entity>>,
    metadata_fetches: AtomicUsize,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from records.
    pub fn from_entities(entities: impl IntoIterator<Item = Entity>) -> Self {
        let store = Self::new();
        for entity in entities {
            store.insert(entity);
        }
        store
    }

    /// Build a store from a JSON snapshot (`{"entities": [...]}`).
    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        let snapshot: Snapshot = serde_json::from_str(json)?;
        Ok(Self::from_entities(snapshot.entities))
    }

    /// Insert or replace a record and any nested children.
    pub fn insert(&self, mut entity: Entity) {
        let children = std::mem::take(&mut entity.children);
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        for mut child in children {
            child.parent_id.get_or_insert(entity.id);
            records.insert((child.kind, child.id), child);
        }
        records.insert((entity.kind, entity.id), entity);
    }

    /// Look up a stored record without children attached.
    pub fn get(&self, kind: EntityKind, id: EntityId) -> Option<Entity> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(kind, id))
            .cloned()
    }

    /// Number of stored records, children included.
    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// How many times parent metadata was looked up.
    pub fn metadata_fetches(&self) -> usize {
        self.metadata_fetches.load(Ordering::SeqCst)
    }

    fn with_children(
        records: &HashMap<(EntityKind, EntityId), Entity>,
        mut entity: Entity,
    ) -> Entity {
        if let Some(child_kind) = entity.kind.child_kind() {
            let mut children: Vec<Entity> = records
                .values()
                .filter(|r| r.kind == child_kind && r.parent_id == Some(entity.id))
                .cloned()
                .collect();
            children.sort_by_key(|c| c.id);
            entity.children = children;
        }
        entity
    }
}

/// Kind of the record that owns children of `kind`.
fn parent_kind_of(kind: EntityKind) -> Option<EntityKind> {
    match kind {
        EntityKind::RecapDocument => Some(EntityKind::Docket),
        EntityKind::Opinion => Some(EntityKind::OpinionCluster),
        EntityKind::Education | EntityKind::Position => Some(EntityKind::Person),
        _ => None,
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn fetch(&self, kind: EntityKind, ids: &[EntityId]) -> Result<Vec<Entity>, StoreError> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        Ok(ids
            .iter()
            .filter_map(|id| records.get(&(kind, *id)).cloned())
            .map(|entity| Self::with_children(&records, entity))
            .collect())
    }

    async fn parent_metadata(&self, child: &Entity) -> Result<Option<ParentMetadata>, StoreError> {
        self.metadata_fetches.fetch_add(1, Ordering::SeqCst);
        let (Some(parent_id), Some(parent_kind)) = (child.parent_id, parent_kind_of(child.kind))
        else {
            return Ok(None);
        };
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        records
            .get(&(parent_kind, parent_id))
            .map(|parent| Some(ParentMetadata::from_parent(parent)))
            .ok_or(StoreError::NotFound {
                kind: parent_kind,
                id: parent_id,
            })
    }

    async fn stamp_indexed(
        &self,
        kind: EntityKind,
        ids: &[EntityId],
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        for id in ids {
            if let Some(record) = records.get_mut(&(kind, *id)) {
                record.last_indexed_at = Some(at);
            }
        }
        Ok(())
    }
}
