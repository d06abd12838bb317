//! Parent/child routing for the nested-document backend.
//!
//! Education and position records are stored as children of their person's
//! document. A child must be written with the parent id as routing key, a
//! join value naming its relation, and an id prefixed by its relation so it
//! cannot collide with the parent's id space.

use std::fmt;

use sync_backend::{BackendError, NestedIndex};
use sync_types::{ChildDescriptor, Entity, EntityId, SearchDocument};
use tracing::debug;

/// Why a child cannot be written yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotReadyReason {
    /// The target index does not exist
    IndexMissing(String),
    /// The child has no parent id
    NoParent,
    /// The parent document has not been indexed
    ParentMissing(EntityId),
}

impl fmt::Display for NotReadyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotReadyReason::IndexMissing(index) => write!(f, "index {} does not exist", index),
            NotReadyReason::NoParent => write!(f, "no parent id"),
            NotReadyReason::ParentMissing(id) => write!(f, "parent document {} not indexed", id),
        }
    }
}

/// Where and how a document is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routing {
    /// Top-level document
    Standalone { doc_id: String },
    /// Child document placed under its parent
    Child {
        doc_id: String,
        routing: String,
        descriptor: ChildDescriptor,
    },
    /// Preconditions not met; the write is skipped
    NotReady(NotReadyReason),
}

impl Routing {
    /// Apply the id and placement to a converted document.
    ///
    /// `NotReady` leaves the document unchanged.
    pub fn apply(&self, doc: SearchDocument) -> SearchDocument {
        match self {
            Routing::Standalone { doc_id } => doc.with_id(doc_id.clone()),
            Routing::Child {
                doc_id,
                routing,
                descriptor,
            } => doc
                .with_id(doc_id.clone())
                .as_child_of(routing.clone(), descriptor.clone()),
            Routing::NotReady(_) => doc,
        }
    }
}

/// Resolves the routing of entities written to a nested index.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoutingResolver;

impl RoutingResolver {
    pub fn new() -> Self {
        Self
    }

    /// Check the child preconditions in order: index exists, parent id
    /// present, parent document exists.
    pub async fn resolve(
        &self,
        entity: &Entity,
        index: &dyn NestedIndex,
    ) -> Result<Routing, BackendError> {
        let (Some(relation), Some(prefix)) = (
            entity.kind.child_relation(),
            entity.kind.document_id_prefix(),
        ) else {
            return Ok(Routing::Standalone {
                doc_id: entity.id.to_string(),
            });
        };

        if !index.index_exists().await? {
            return Ok(Self::not_ready(
                entity,
                NotReadyReason::IndexMissing(index.index_name().to_string()),
            ));
        }

        let Some(parent_id) = entity.parent_id else {
            return Ok(Self::not_ready(entity, NotReadyReason::NoParent));
        };

        if !index.document_exists(&parent_id.to_string()).await? {
            return Ok(Self::not_ready(
                entity,
                NotReadyReason::ParentMissing(parent_id),
            ));
        }

        Ok(Routing::Child {
            doc_id: format!("{}_{}", prefix, entity.id),
            routing: parent_id.to_string(),
            descriptor: ChildDescriptor::person_child(relation, parent_id),
        })
    }

    fn not_ready(entity: &Entity, reason: NotReadyReason) -> Routing {
        debug!(id = entity.id, kind = %entity.kind, reason = %reason, "Child not ready");
        Routing::NotReady(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sync_backend::MemoryIndex;
    use sync_types::{EntityKind, Fields};

    fn people_index_with_person(id: EntityId) -> MemoryIndex {
        let index = MemoryIndex::new("people_db_index");
        index.seed(&SearchDocument::new(
            id.to_string(),
            EntityKind::Person,
            Fields::new(),
        ));
        index
    }

    #[tokio::test]
    async fn test_standalone_kind() {
        let index = MemoryIndex::new("people_db_index");
        let routing = RoutingResolver::new()
            .resolve(&Entity::new(12, EntityKind::Person), &index)
            .await
            .unwrap();
        assert_eq!(
            routing,
            Routing::Standalone {
                doc_id: "12".into()
            }
        );
    }

    #[tokio::test]
    async fn test_child_routed_to_parent() {
        let index = people_index_with_person(12);
        let education = Entity::new(5, EntityKind::Education).with_parent(12);
        let routing = RoutingResolver::new()
            .resolve(&education, &index)
            .await
            .unwrap();

        assert_eq!(
            routing,
            Routing::Child {
                doc_id: "ed_5".into(),
                routing: "12".into(),
                descriptor: ChildDescriptor::person_child("education", 12),
            }
        );

        let doc = routing.apply(SearchDocument::new("5", EntityKind::Education, Fields::new()));
        assert_eq!(doc.id, "ed_5");
        assert_eq!(doc.routing.as_deref(), Some("12"));
    }

    #[tokio::test]
    async fn test_missing_parent_document_not_ready() {
        let index = MemoryIndex::new("people_db_index");
        let position = Entity::new(3, EntityKind::Position).with_parent(12);
        let routing = RoutingResolver::new()
            .resolve(&position, &index)
            .await
            .unwrap();
        assert_eq!(routing, Routing::NotReady(NotReadyReason::ParentMissing(12)));
    }

    #[tokio::test]
    async fn test_missing_index_checked_first() {
        let index = MemoryIndex::new("people_db_index");
        index.set_exists(false);
        let orphan = Entity::new(3, EntityKind::Position);
        let routing = RoutingResolver::new().resolve(&orphan, &index).await.unwrap();
        assert_eq!(
            routing,
            Routing::NotReady(NotReadyReason::IndexMissing("people_db_index".into()))
        );
    }

    #[tokio::test]
    async fn test_missing_parent_id_not_ready() {
        let index = people_index_with_person(12);
        let orphan = Entity::new(3, EntityKind::Position);
        let routing = RoutingResolver::new().resolve(&orphan, &index).await.unwrap();
        assert_eq!(routing, Routing::NotReady(NotReadyReason::NoParent));
    }
}
