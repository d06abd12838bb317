//! Search documents produced by conversion and consumed by the backends.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::entity::{EntityId, EntityKind};

/// Field name to value mapping of a search document.
pub type Fields = Map<String, Value>;

/// Join field used by person documents and their nested children.
pub const PERSON_JOIN_FIELD: &str = "person_child";

/// Places a child document under its parent in a nested-document index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildDescriptor {
    /// Name of the join field in the index mapping
    pub join_field: String,
    /// Relation name of the child (e.g. "education")
    pub name: String,
    /// Parent document id
    pub parent: EntityId,
}

impl ChildDescriptor {
    /// Create a descriptor for a child of a person document.
    pub fn person_child(name: impl Into<String>, parent: EntityId) -> Self {
        Self {
            join_field: PERSON_JOIN_FIELD.to_string(),
            name: name.into(),
            parent,
        }
    }

    /// JSON value stored under the join field.
    pub fn join_value(&self) -> Value {
        serde_json::json!({ "name": self.name, "parent": self.parent })
    }
}

/// A backend-ready search document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchDocument {
    /// Backend primary key
    pub id: String,

    /// Kind of the entity the document was built from
    pub kind: EntityKind,

    /// Document fields
    pub fields: Fields,

    /// Routing key (owning parent id) for nested backends
    #[serde(default)]
    pub routing: Option<String>,

    /// Child placement for nested backends
    #[serde(default)]
    pub child: Option<ChildDescriptor>,
}

impl SearchDocument {
    /// Create a standalone document.
    pub fn new(id: impl Into<String>, kind: EntityKind, fields: Fields) -> Self {
        Self {
            id: id.into(),
            kind,
            fields,
            routing: None,
            child: None,
        }
    }

    /// Place the document under a parent: sets routing and the join value.
    pub fn as_child_of(mut self, routing: impl Into<String>, child: ChildDescriptor) -> Self {
        self.routing = Some(routing.into());
        self.child = Some(child);
        self
    }

    /// Override the primary key.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Request body: fields plus the join value for child documents.
    pub fn body(&self) -> Fields {
        let mut body = self.fields.clone();
        if let Some(child) = &self.child {
            body.insert(child.join_field.clone(), child.join_value());
        }
        body
    }

    /// Reference used to address this document for partial updates.
    pub fn reference(&self) -> DocumentRef {
        DocumentRef {
            id: self.id.clone(),
            routing: self.routing.clone(),
        }
    }
}

/// Address of an existing document in a backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentRef {
    /// Backend primary key
    pub id: String,
    /// Routing key, required for child documents
    #[serde(default)]
    pub routing: Option<String>,
}

impl DocumentRef {
    /// Reference a top-level document.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            routing: None,
        }
    }

    /// Reference a routed child document.
    pub fn routed(id: impl Into<String>, routing: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            routing: Some(routing.into()),
        }
    }
}
