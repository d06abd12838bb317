//! Shared parent metadata for child batches.
//!
//! Children passed to [`SharedMetadata::resolve`] must share one parent.
//! Its denormalized fields are looked up once through the first child and
//! reused for the whole group.

use sync_types::{Entity, ParentMetadata};
use tracing::debug;

use crate::error::StoreError;
use crate::store::RecordStore;

/// Parent metadata resolved once for a batch of children.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SharedMetadata {
    metadata: Option<ParentMetadata>,
}

impl SharedMetadata {
    /// Fetch the parent metadata of `children` with a single store lookup.
    ///
    /// An empty batch resolves to no metadata without touching the store.
    pub async fn resolve(
        store: &dyn RecordStore,
        children: &[Entity],
    ) -> Result<Self, StoreError> {
        let Some(first) = children.first() else {
            return Ok(Self::default());
        };

        let metadata = store.parent_metadata(first).await?;
        debug!(
            children = children.len(),
            parent_id = ?metadata.as_ref().map(|m| m.parent_id),
            "Resolved shared parent metadata"
        );
        Ok(Self { metadata })
    }

    /// The resolved metadata, if any.
    pub fn get(&self) -> Option<&ParentMetadata> {
        self.metadata.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;
    use sync_types::EntityKind;

    #[tokio::test]
    async fn test_one_lookup_for_many_children() {
        let mut docket = Entity::new(7, EntityKind::Docket).with_field("case_name", "A v. B");
        for id in 0..100 {
            docket = docket.with_child(Entity::new(1000 + id, EntityKind::RecapDocument));
        }
        let store = MemoryStore::from_entities([docket]);
        let ids: Vec<_> = (1000..1100).collect();
        let children = store.fetch(EntityKind::RecapDocument, &ids).await.unwrap();

        let shared = SharedMetadata::resolve(&store, &children).await.unwrap();
        assert_eq!(shared.get().unwrap().fields["case_name"], json!("A v. B"));
        assert_eq!(store.metadata_fetches(), 1);
    }

    #[tokio::test]
    async fn test_empty_batch_is_none() {
        let store = MemoryStore::new();
        let shared = SharedMetadata::resolve(&store, &[]).await.unwrap();
        assert!(shared.get().is_none());
        assert_eq!(store.metadata_fetches(), 0);
    }
}
