//! Entity-to-document conversion.
//!
//! Each entity kind has a [`DocumentConverter`]. Plain kinds use a
//! [`FieldConverter`] that validates declared fields; aggregates use an
//! [`AggregateConverter`] that fans out into one document per child, each
//! carrying the aggregate's shared fields.
//!
//! Conversion failures are per entity. [`convert_batch`] collects them next
//! to the successful documents so one bad record never aborts a batch.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate};
use serde_json::Value;
use tracing::{debug, warn};

use sync_types::{Entity, EntityId, EntityKind, Fields, ParentMetadata, SearchDocument};

use crate::error::{ConversionError, SyncError};

/// Result of converting one entity.
#[derive(Debug, Clone, PartialEq)]
pub enum Conversion {
    /// A single document
    One(SearchDocument),
    /// Several documents, to be added to the batch individually
    Many(Vec<SearchDocument>),
    /// The entity cannot be represented yet and is left out
    None,
}

impl Conversion {
    /// Flatten into a list of documents.
    pub fn into_documents(self) -> Vec<SearchDocument> {
        match self {
            Conversion::One(doc) => vec![doc],
            Conversion::Many(docs) => docs,
            Conversion::None => Vec::new(),
        }
    }
}

/// Converts entities of one kind into search documents.
pub trait DocumentConverter: Send + Sync {
    /// Kind handled by this converter.
    fn kind(&self) -> EntityKind;

    /// Convert an entity, merging in the parent's shared fields if given.
    fn convert(
        &self,
        entity: &Entity,
        metadata: Option<&ParentMetadata>,
    ) -> Result<Conversion, ConversionError>;
}

/// Value type expected for a declared field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
    Integer,
    Float,
    Bool,
    /// RFC 3339 timestamp or `YYYY-MM-DD` date
    Date,
}

impl FieldType {
    fn accepts(&self, value: &Value) -> bool {
        match self {
            FieldType::Text => value.is_string(),
            FieldType::Integer => value.is_i64() || value.is_u64(),
            FieldType::Float => value.is_number(),
            FieldType::Bool => value.is_boolean(),
            FieldType::Date => value.as_str().is_some_and(|s| {
                DateTime::parse_from_rfc3339(s).is_ok()
                    || NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
            }),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::Bool => "bool",
            FieldType::Date => "date",
        }
    }
}

/// A declared document field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    pub field_type: FieldType,
    pub required: bool,
}

impl FieldSpec {
    /// A field that must be present and non-null.
    pub fn required(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: true,
        }
    }

    /// A field that may be absent; absent values are sent as null.
    pub fn optional(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: false,
        }
    }
}

/// Field-driven converter for non-aggregate kinds.
#[derive(Debug, Clone)]
pub struct FieldConverter {
    kind: EntityKind,
    fields: Vec<FieldSpec>,
    content_field: Option<String>,
}

impl FieldConverter {
    /// Create a converter with the given field declarations.
    pub fn new(kind: EntityKind, fields: Vec<FieldSpec>) -> Self {
        Self {
            kind,
            fields,
            content_field: None,
        }
    }

    /// Require a text content field before the entity can be indexed.
    ///
    /// An absent or null content field means the entity is not ready and
    /// converts to [`Conversion::None`].
    pub fn with_content_field(mut self, name: impl Into<String>) -> Self {
        self.content_field = Some(name.into());
        self
    }

    /// Validate the declared fields and collect them into a field map.
    fn build_fields(&self, entity: &Entity) -> Result<Fields, ConversionError> {
        let mut fields = Fields::new();
        for spec in &self.fields {
            match entity.field(&spec.name) {
                None | Some(Value::Null) if spec.required => {
                    return Err(ConversionError::Attribute {
                        id: entity.id,
                        message: format!("{} is required", spec.name),
                    });
                }
                None | Some(Value::Null) => {
                    fields.insert(spec.name.clone(), Value::Null);
                }
                Some(value) if !spec.field_type.accepts(value) => {
                    return Err(ConversionError::Value {
                        id: entity.id,
                        message: format!("{} is not a valid {}", spec.name, spec.field_type.label()),
                    });
                }
                Some(value) => {
                    fields.insert(spec.name.clone(), value.clone());
                }
            }
        }
        Ok(fields)
    }
}

impl DocumentConverter for FieldConverter {
    fn kind(&self) -> EntityKind {
        self.kind
    }

    fn convert(
        &self,
        entity: &Entity,
        metadata: Option<&ParentMetadata>,
    ) -> Result<Conversion, ConversionError> {
        if let Some(content) = &self.content_field {
            match entity.field(content) {
                None | Some(Value::Null) => {
                    debug!(id = entity.id, kind = %self.kind, "No content yet, skipping");
                    return Ok(Conversion::None);
                }
                Some(Value::String(_)) => {}
                Some(_) => {
                    return Err(ConversionError::Unparseable {
                        id: entity.id,
                        message: format!("{} is not text", content),
                    });
                }
            }
        }

        let own = self.build_fields(entity)?;

        let mut fields = metadata.map(|m| m.fields.clone()).unwrap_or_default();
        fields.extend(own);
        if let Some(content) = &self.content_field {
            if let Some(value) = entity.field(content) {
                fields.insert(content.clone(), value.clone());
            }
        }

        Ok(Conversion::One(SearchDocument::new(
            entity.id.to_string(),
            self.kind,
            fields,
        )))
    }
}

/// Converter for aggregate parents.
///
/// The parent's own declared fields become the shared metadata that is
/// merged into every child document.
pub struct AggregateConverter {
    parent: FieldConverter,
    child: Arc<dyn DocumentConverter>,
    emit_summary: bool,
}

impl AggregateConverter {
    /// Create an aggregate converter from the parent's field declarations
    /// and the child kind's converter.
    pub fn new(parent: FieldConverter, child: Arc<dyn DocumentConverter>) -> Self {
        Self {
            parent,
            child,
            emit_summary: false,
        }
    }

    /// Also emit one document for the parent itself, id `"<kind>_<id>"`.
    pub fn with_summary(mut self) -> Self {
        self.emit_summary = true;
        self
    }
}

impl DocumentConverter for AggregateConverter {
    fn kind(&self) -> EntityKind {
        self.parent.kind
    }

    fn convert(
        &self,
        entity: &Entity,
        _metadata: Option<&ParentMetadata>,
    ) -> Result<Conversion, ConversionError> {
        let shared = ParentMetadata {
            parent_id: entity.id,
            parent_kind: entity.kind,
            fields: self.parent.build_fields(entity)?,
        };

        let mut docs = Vec::with_capacity(entity.children.len() + 1);
        if self.emit_summary {
            docs.push(SearchDocument::new(
                format!("{}_{}", entity.kind, entity.id),
                entity.kind,
                shared.fields.clone(),
            ));
        }
        for child in &entity.children {
            docs.extend(self.child.convert(child, Some(&shared))?.into_documents());
        }
        Ok(Conversion::Many(docs))
    }
}

/// Kind-to-converter lookup.
#[derive(Default, Clone)]
pub struct ConverterRegistry {
    converters: HashMap<EntityKind, Arc<dyn DocumentConverter>>,
}

impl ConverterRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a converter under its kind, replacing any previous one.
    pub fn register(&mut self, converter: Arc<dyn DocumentConverter>) {
        self.converters.insert(converter.kind(), converter);
    }

    /// Converter for a kind.
    pub fn get(&self, kind: EntityKind) -> Result<&Arc<dyn DocumentConverter>, SyncError> {
        self.converters
            .get(&kind)
            .ok_or(SyncError::NoConverter(kind))
    }

    /// Registry with field declarations for every kind.
    pub fn with_defaults() -> Self {
        use FieldType::*;

        let recap = Arc::new(FieldConverter::new(
            EntityKind::RecapDocument,
            vec![
                FieldSpec::optional("document_number", Integer),
                FieldSpec::optional("description", Text),
                FieldSpec::optional("entry_date_filed", Date),
                FieldSpec::optional("page_count", Integer),
                FieldSpec::optional("is_available", Bool),
                FieldSpec::optional("plain_text", Text),
            ],
        ));
        let opinion = Arc::new(FieldConverter::new(
            EntityKind::Opinion,
            vec![
                FieldSpec::optional("type", Text),
                FieldSpec::optional("author_id", Integer),
                FieldSpec::optional("per_curiam", Bool),
                FieldSpec::optional("plain_text", Text),
            ],
        ));
        let docket = AggregateConverter::new(
            FieldConverter::new(
                EntityKind::Docket,
                vec![
                    FieldSpec::required("case_name", Text),
                    FieldSpec::required("court_id", Text),
                    FieldSpec::optional("docket_number", Text),
                    FieldSpec::optional("date_filed", Date),
                    FieldSpec::optional("assigned_to", Text),
                ],
            ),
            recap.clone(),
        );
        let cluster = AggregateConverter::new(
            FieldConverter::new(
                EntityKind::OpinionCluster,
                vec![
                    FieldSpec::required("case_name", Text),
                    FieldSpec::optional("court_id", Text),
                    FieldSpec::optional("date_filed", Date),
                    FieldSpec::optional("judges", Text),
                    FieldSpec::optional("citation_count", Integer),
                ],
            ),
            opinion.clone(),
        );
        let audio = FieldConverter::new(
            EntityKind::Audio,
            vec![
                FieldSpec::required("case_name", Text),
                FieldSpec::optional("docket_id", Integer),
                FieldSpec::optional("court_id", Text),
                FieldSpec::optional("date_argued", Date),
                FieldSpec::optional("judges", Text),
                FieldSpec::optional("duration", Integer),
            ],
        )
        .with_content_field("local_path_mp3");
        let person = FieldConverter::new(
            EntityKind::Person,
            vec![
                FieldSpec::required("name_full", Text),
                FieldSpec::optional("gender", Text),
                FieldSpec::optional("date_dob", Date),
                FieldSpec::optional("dob_city", Text),
            ],
        );
        let education = FieldConverter::new(
            EntityKind::Education,
            vec![
                FieldSpec::required("school", Text),
                FieldSpec::optional("degree_level", Text),
                FieldSpec::optional("degree_year", Integer),
            ],
        );
        let position = FieldConverter::new(
            EntityKind::Position,
            vec![
                FieldSpec::optional("position_type", Text),
                FieldSpec::optional("job_title", Text),
                FieldSpec::optional("court_id", Text),
                FieldSpec::optional("date_start", Date),
                FieldSpec::optional("date_termination", Date),
            ],
        );

        let mut registry = Self::new();
        registry.register(recap);
        registry.register(opinion);
        registry.register(Arc::new(docket));
        registry.register(Arc::new(cluster));
        registry.register(Arc::new(audio));
        registry.register(Arc::new(person));
        registry.register(Arc::new(education));
        registry.register(Arc::new(position));
        registry
    }
}

/// An entity that failed conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionFailure {
    pub id: EntityId,
    pub error: ConversionError,
}

/// Documents and failures from converting a batch.
#[derive(Debug, Default, Clone)]
pub struct BatchConversion {
    pub documents: Vec<SearchDocument>,
    pub failures: Vec<ConversionFailure>,
    /// Entities that converted to nothing
    pub skipped: usize,
}

impl BatchConversion {
    /// Append another batch's results.
    pub fn merge(&mut self, other: BatchConversion) {
        self.documents.extend(other.documents);
        self.failures.extend(other.failures);
        self.skipped += other.skipped;
    }
}

/// Convert a batch of entities, collecting per-entity failures.
///
/// Fails only when an entity's kind has no converter.
pub fn convert_batch(
    registry: &ConverterRegistry,
    entities: &[Entity],
    metadata: Option<&ParentMetadata>,
) -> Result<BatchConversion, SyncError> {
    let mut batch = BatchConversion::default();
    for entity in entities {
        let converter = registry.get(entity.kind)?;
        match converter.convert(entity, metadata) {
            Ok(Conversion::None) => batch.skipped += 1,
            Ok(conversion) => batch.documents.extend(conversion.into_documents()),
            Err(error) => {
                warn!(id = entity.id, kind = %entity.kind, error = %error, "Conversion failed");
                batch.failures.push(ConversionFailure {
                    id: entity.id,
                    error,
                });
            }
        }
    }
    Ok(batch)
}
