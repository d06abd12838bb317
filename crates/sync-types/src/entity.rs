//! Indexable entities loaded from the record store.
//!
//! An [`Entity`] is a relational record flattened into a field map. The
//! pipeline never mutates entities except to stamp `last_indexed_at` on
//! aggregate parents after a successful full re-index.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::Fields;
use crate::error::SyncTypesError;

/// Primary key of a record in the relational store.
pub type EntityId = u64;

/// Kind tag selecting the converter and backend for an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Oral argument audio recording
    Audio,
    /// Court docket (aggregate parent of RECAP documents)
    Docket,
    /// Document filed on a docket
    RecapDocument,
    /// Opinion cluster (aggregate parent of opinions)
    OpinionCluster,
    /// Single opinion within a cluster
    Opinion,
    /// Judge or other person record
    Person,
    /// Education record of a person
    Education,
    /// Position held by a person
    Position,
}

impl EntityKind {
    /// All kinds, in declaration order.
    pub const ALL: [EntityKind; 8] = [
        EntityKind::Audio,
        EntityKind::Docket,
        EntityKind::RecapDocument,
        EntityKind::OpinionCluster,
        EntityKind::Opinion,
        EntityKind::Person,
        EntityKind::Education,
        EntityKind::Position,
    ];

    /// Snake-case label used in config keys and task messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Audio => "audio",
            EntityKind::Docket => "docket",
            EntityKind::RecapDocument => "recap_document",
            EntityKind::OpinionCluster => "opinion_cluster",
            EntityKind::Opinion => "opinion",
            EntityKind::Person => "person",
            EntityKind::Education => "education",
            EntityKind::Position => "position",
        }
    }

    /// Model label in `app.Model` form, as emitted by the record store.
    pub fn model_label(&self) -> &'static str {
        match self {
            EntityKind::Audio => "audio.Audio",
            EntityKind::Docket => "search.Docket",
            EntityKind::RecapDocument => "search.RECAPDocument",
            EntityKind::OpinionCluster => "search.OpinionCluster",
            EntityKind::Opinion => "search.Opinion",
            EntityKind::Person => "people_db.Person",
            EntityKind::Education => "people_db.Education",
            EntityKind::Position => "people_db.Position",
        }
    }

    /// Aggregates contribute many documents (one per child) instead of one.
    pub fn is_aggregate(&self) -> bool {
        matches!(self, EntityKind::Docket | EntityKind::OpinionCluster)
    }

    /// Kind of the children owned by an aggregate.
    pub fn child_kind(&self) -> Option<EntityKind> {
        match self {
            EntityKind::Docket => Some(EntityKind::RecapDocument),
            EntityKind::OpinionCluster => Some(EntityKind::Opinion),
            _ => None,
        }
    }

    /// Aggregate owning entities of this kind, the inverse of [`child_kind`].
    ///
    /// [`child_kind`]: EntityKind::child_kind
    pub fn aggregate_parent(&self) -> Option<EntityKind> {
        match self {
            EntityKind::RecapDocument => Some(EntityKind::Docket),
            EntityKind::Opinion => Some(EntityKind::OpinionCluster),
            _ => None,
        }
    }

    /// Relation name for kinds stored as nested children of a person document.
    pub fn child_relation(&self) -> Option<&'static str> {
        match self {
            EntityKind::Education => Some("education"),
            EntityKind::Position => Some("position"),
            _ => None,
        }
    }

    /// Prefix of the synthetic document id for nested children.
    ///
    /// Keeps child ids out of the parent's numeric id space.
    pub fn document_id_prefix(&self) -> Option<&'static str> {
        match self {
            EntityKind::Education => Some("ed"),
            EntityKind::Position => Some("po"),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = SyncTypesError;

    /// Accepts either the snake-case label or the `app.Model` label.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s || kind.model_label() == s)
            .ok_or_else(|| SyncTypesError::UnknownKind(s.to_string()))
    }
}

/// A relational record that can be represented as one or more search documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Primary key
    pub id: EntityId,

    /// Kind tag
    pub kind: EntityKind,

    /// Owning parent (docket for RECAP documents, person for education...)
    #[serde(default)]
    pub parent_id: Option<EntityId>,

    /// When this aggregate was last fully re-indexed
    #[serde(default)]
    pub last_indexed_at: Option<DateTime<Utc>>,

    /// Kind-specific fields
    #[serde(default)]
    pub fields: Fields,

    /// Ordered children of an aggregate parent
    #[serde(default)]
    pub children: Vec<Entity>,
}

impl Entity {
    /// Create an entity with no fields.
    pub fn new(id: EntityId, kind: EntityKind) -> Self {
        Self {
            id,
            kind,
            parent_id: None,
            last_indexed_at: None,
            fields: Fields::new(),
            children: Vec::new(),
        }
    }

    /// Set the owning parent.
    pub fn with_parent(mut self, parent_id: EntityId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// Add a field.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Set the last indexed timestamp.
    pub fn with_last_indexed_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_indexed_at = Some(at);
        self
    }

    /// Append a child record.
    pub fn with_child(mut self, child: Entity) -> Self {
        self.children.push(child);
        self
    }

    /// Look up a field value.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

/// Denormalized parent fields copied into every child document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParentMetadata {
    /// Parent primary key
    pub parent_id: EntityId,

    /// Parent kind
    pub parent_kind: EntityKind,

    /// Fields shared by all children
    pub fields: Fields,
}

impl ParentMetadata {
    /// Build metadata from a parent entity's own fields.
    pub fn from_parent(parent: &Entity) -> Self {
        Self {
            parent_id: parent.id,
            parent_kind: parent.kind,
            fields: parent.fields.clone(),
        }
    }
}
