//! Task entry points of the synchronization pipeline.
//!
//! [`SyncPipeline`] wires the record store, converters and backend writers
//! together. Every entry point is one unit of work for the scheduler: it
//! takes a [`TaskContext`] and reports an [`Outcome`] instead of retrying
//! or cancelling continuations itself.
//!
//! Batch entry points write to the legacy backend and retry forever on a
//! fixed delay. Single-document entry points write to the nested backend
//! and give up after a bounded number of attempts.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use sync_backend::{
    ElasticWriter, ElasticWriterConfig, IndexWriter, NestedIndex, SaveOptions, SolrWriter,
    SolrWriterConfig,
};
use sync_types::{DocumentRef, Entity, EntityId, EntityKind, Fields, Settings};

use crate::alerts::{AlertDecision, AlertEligibility, AlertForward, AlertTrigger, FeatureFlags};
use crate::converter::{convert_batch, BatchConversion, Conversion, ConverterRegistry};
use crate::error::SyncError;
use crate::metadata::SharedMetadata;
use crate::outcome::{Outcome, RetryPolicy, TaskContext};
use crate::report::{AggregateStatus, BatchReport};
use crate::routing::{Routing, RoutingResolver};
use crate::staleness::{Freshness, StalenessGate};
use crate::store::RecordStore;

/// Change notification for an aggregate parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatePayload {
    /// Docket id
    pub parent_id: EntityId,
    /// Whether the docket's own content changed since the last index
    #[serde(default)]
    pub content_changed: bool,
}

/// Unwrap a result or return the outcome for its error.
macro_rules! attempt {
    ($policy:expr, $ctx:expr, $result:expr) => {
        match $result {
            Ok(value) => value,
            Err(err) => return $policy.on_error($ctx, SyncError::from(err)),
        }
    };
}

/// Unwrap a result or fail permanently.
macro_rules! require {
    ($result:expr) => {
        match $result {
            Ok(value) => value,
            Err(err) => return Outcome::Fatal(SyncError::from(err)),
        }
    };
}

/// The synchronization pipeline.
pub struct SyncPipeline {
    store: Arc<dyn RecordStore>,
    converters: ConverterRegistry,
    legacy: HashMap<EntityKind, Arc<dyn IndexWriter>>,
    current: HashMap<EntityKind, Arc<dyn NestedIndex>>,
    gate: StalenessGate,
    routing: RoutingResolver,
    alerts: AlertTrigger,
    batch_policy: RetryPolicy,
    single_policy: RetryPolicy,
    auto_refresh: bool,
}

impl SyncPipeline {
    /// Start building a pipeline over `store`.
    pub fn builder(store: Arc<dyn RecordStore>) -> SyncPipelineBuilder {
        SyncPipelineBuilder::new(store)
    }

    /// Build a pipeline with HTTP writers for every configured backend.
    ///
    /// Kinds sharing a core URL or index name share one writer.
    pub fn from_settings(
        settings: &Settings,
        store: Arc<dyn RecordStore>,
        flags: Arc<dyn FeatureFlags>,
    ) -> Result<Self, SyncError> {
        let eligibility = AlertEligibility::from_settings(&settings.alerts)
            .map_err(|e| SyncError::Config(e.to_string()))?;
        let mut builder = Self::builder(store)
            .alerts(AlertTrigger::new(eligibility, flags))
            .freshness_threshold(settings.freshness_threshold())
            .retry(
                RetryPolicy::batch(&settings.retry),
                RetryPolicy::single(&settings.retry),
            )
            .auto_refresh(settings.current.auto_refresh);

        let legacy_timeout = Duration::from_secs(settings.legacy.timeout_secs);
        let mut by_url: HashMap<&str, Arc<dyn IndexWriter>> = HashMap::new();
        for kind in EntityKind::ALL {
            let Some(url) = settings.legacy.url_for(kind) else {
                continue;
            };
            let writer = match by_url.get(url) {
                Some(writer) => writer.clone(),
                None => {
                    let config = SolrWriterConfig::new(kind.as_str(), url).with_timeout(legacy_timeout);
                    let writer: Arc<dyn IndexWriter> = Arc::new(SolrWriter::new(config)?);
                    by_url.insert(url, writer.clone());
                    writer
                }
            };
            builder = builder.legacy_writer(kind, writer);
        }

        let current_timeout = Duration::from_secs(settings.current.timeout_secs);
        let mut by_index: HashMap<&str, Arc<dyn NestedIndex>> = HashMap::new();
        for kind in EntityKind::ALL {
            let Some(index) = settings.current.index_for(kind) else {
                continue;
            };
            let writer = match by_index.get(index) {
                Some(writer) => writer.clone(),
                None => {
                    let mut config = ElasticWriterConfig::new(settings.current.url.as_str(), index)
                        .with_timeout(current_timeout);
                    if let Some(key) = &settings.current.api_key {
                        config = config.with_secret_api_key(key.clone());
                    }
                    let writer: Arc<dyn NestedIndex> = Arc::new(ElasticWriter::new(config)?);
                    by_index.insert(index, writer.clone());
                    writer
                }
            };
            builder = builder.current_index(kind, writer);
        }

        Ok(builder.build())
    }

    /// The record store this pipeline reads from.
    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    fn legacy_writer(&self, kind: EntityKind) -> Result<&Arc<dyn IndexWriter>, SyncError> {
        self.legacy.get(&kind).ok_or(SyncError::NoWriter(kind))
    }

    fn current_index(&self, kind: EntityKind) -> Result<&Arc<dyn NestedIndex>, SyncError> {
        self.current.get(&kind).ok_or(SyncError::NoWriter(kind))
    }

    /// Convert children with the denormalized fields of their own parent.
    ///
    /// Each distinct parent is looked up once.
    async fn convert_children(&self, children: &[Entity]) -> Result<BatchConversion, SyncError> {
        let mut groups: BTreeMap<Option<EntityId>, Vec<Entity>> = BTreeMap::new();
        for child in children {
            groups.entry(child.parent_id).or_default().push(child.clone());
        }

        let mut batch = BatchConversion::default();
        for group in groups.values() {
            let shared = SharedMetadata::resolve(self.store.as_ref(), group).await?;
            batch.merge(convert_batch(&self.converters, group, shared.get())?);
        }
        Ok(batch)
    }

    /// Write converted documents and optionally commit.
    async fn write_batch(
        &self,
        writer: &dyn IndexWriter,
        batch: &BatchConversion,
        force_commit: bool,
    ) -> Result<BatchReport, SyncError> {
        let mut report = BatchReport::from_conversion(batch);
        if !batch.documents.is_empty() {
            writer.add(&batch.documents).await?;
        }
        if force_commit {
            writer.commit().await?;
            report.committed = true;
        }
        info!(
            writer = %writer.name(),
            written = report.written,
            failed = report.failed.len(),
            skipped = report.skipped,
            committed = report.committed,
            "Wrote batch"
        );
        Ok(report)
    }

    /// Convert and write a batch of records of one kind.
    ///
    /// Records that fail conversion are logged and left out. Children of an
    /// aggregate carry their own parent's shared fields. Dockets that were
    /// written are stamped as freshly indexed.
    pub async fn add_batch(
        &self,
        ctx: &TaskContext,
        ids: &[EntityId],
        kind: EntityKind,
        force_commit: bool,
    ) -> Outcome<BatchReport> {
        let policy = &self.batch_policy;
        let writer = require!(self.legacy_writer(kind));
        let entities = attempt!(policy, ctx, self.store.fetch(kind, ids).await);
        let batch = if kind.aggregate_parent().is_some() {
            attempt!(policy, ctx, self.convert_children(&entities).await)
        } else {
            require!(convert_batch(&self.converters, &entities, None))
        };

        let report = attempt!(
            policy,
            ctx,
            self.write_batch(writer.as_ref(), &batch, force_commit).await
        );

        if kind == EntityKind::Docket {
            let written: Vec<EntityId> = entities
                .iter()
                .map(|e| e.id)
                .filter(|id| !report.failed.contains(id))
                .collect();
            attempt!(
                policy,
                ctx,
                self.store.stamp_indexed(kind, &written, Utc::now()).await
            );
        }

        Outcome::Success(report)
    }

    /// Re-index a docket and all its documents unless it is fresh.
    ///
    /// A missing payload is a no-op. The docket is stamped only after its
    /// documents were written.
    pub async fn add_or_update_aggregate(
        &self,
        ctx: &TaskContext,
        payload: Option<AggregatePayload>,
        force_commit: bool,
        threshold: Option<Duration>,
    ) -> Outcome<AggregateStatus> {
        let Some(payload) = payload else {
            debug!(task_id = %ctx.task_id, "No aggregate payload");
            return Outcome::Success(AggregateStatus::Skipped);
        };

        let policy = &self.batch_policy;
        let kind = EntityKind::Docket;
        let writer = require!(self.legacy_writer(kind));
        let docket = attempt!(
            policy,
            ctx,
            self.store.fetch_one(kind, payload.parent_id).await
        );

        let gate = threshold.map(StalenessGate::new).unwrap_or(self.gate);
        if gate.evaluate(docket.last_indexed_at, payload.content_changed, Utc::now())
            == Freshness::Skip
        {
            debug!(docket_id = docket.id, "Docket indexed recently, skipping");
            return Outcome::Success(AggregateStatus::Skipped);
        }

        let converter = require!(self.converters.get(kind));
        let documents = require!(converter.convert(&docket, None)).into_documents();
        let batch = BatchConversion {
            documents,
            ..BatchConversion::default()
        };

        let report = attempt!(
            policy,
            ctx,
            self.write_batch(writer.as_ref(), &batch, force_commit).await
        );
        attempt!(
            policy,
            ctx,
            self.store.stamp_indexed(kind, &[docket.id], Utc::now()).await
        );

        Outcome::Success(AggregateStatus::Reindexed(report))
    }

    /// Write a batch of documents belonging to one docket.
    ///
    /// The docket's shared fields are fetched once for the whole batch.
    pub async fn add_children_batch(
        &self,
        ctx: &TaskContext,
        ids: &[EntityId],
        force_commit: bool,
    ) -> Outcome<BatchReport> {
        let policy = &self.batch_policy;
        let kind = EntityKind::RecapDocument;
        let writer = require!(self.legacy_writer(kind));
        let children = attempt!(policy, ctx, self.store.fetch(kind, ids).await);
        let batch = attempt!(policy, ctx, self.convert_children(&children).await);

        let report = attempt!(
            policy,
            ctx,
            self.write_batch(writer.as_ref(), &batch, force_commit).await
        );
        Outcome::Success(report)
    }

    /// Delete documents by id from the legacy backend.
    pub async fn delete_batch(
        &self,
        ctx: &TaskContext,
        ids: &[EntityId],
        kind: EntityKind,
        force_commit: bool,
    ) -> Outcome<BatchReport> {
        let policy = &self.batch_policy;
        let writer = require!(self.legacy_writer(kind));
        let doc_ids: Vec<String> = ids.iter().map(ToString::to_string).collect();

        attempt!(policy, ctx, writer.delete_by_ids(&doc_ids).await);
        let mut report = BatchReport {
            deleted: doc_ids.len(),
            ..BatchReport::default()
        };
        if force_commit {
            attempt!(policy, ctx, writer.commit().await);
            report.committed = true;
        }
        info!(writer = %writer.name(), deleted = report.deleted, "Deleted documents");
        Outcome::Success(report)
    }

    /// Save one record to the nested backend and decide on alerting.
    ///
    /// Succeeds with the alert payload only for the first creation of an
    /// alert-eligible document. Every other result cancels the downstream
    /// alert step, including children whose parent is not indexed yet.
    pub async fn save_document(&self, ctx: &TaskContext, entity: &Entity) -> Outcome<AlertForward> {
        let policy = &self.single_policy;
        let index = require!(self.current_index(entity.kind));

        let routing = attempt!(
            policy,
            ctx,
            self.routing.resolve(entity, index.as_ref()).await
        );
        if let Routing::NotReady(reason) = &routing {
            info!(id = entity.id, kind = %entity.kind, reason = %reason, "Skipping save");
            return Outcome::CancelDownstream;
        }

        let converter = require!(self.converters.get(entity.kind));
        let doc = match require!(converter.convert(entity, None)) {
            Conversion::One(doc) => routing.apply(doc),
            Conversion::None => {
                debug!(id = entity.id, kind = %entity.kind, "Nothing to save");
                return Outcome::CancelDownstream;
            }
            Conversion::Many(_) => {
                return Outcome::Fatal(SyncError::Config(format!(
                    "{} converts to many documents and cannot be saved alone",
                    entity.kind
                )));
            }
        };

        let options = SaveOptions {
            skip_empty: false,
            return_meta: true,
            refresh: self.auto_refresh,
        };
        let response = attempt!(policy, ctx, index.save(&doc, options).await);
        info!(
            id = %response.id,
            kind = %entity.kind,
            version = response.version,
            "Saved document"
        );

        match self.alerts.decide(entity.kind, &response, &doc) {
            AlertDecision::Forward(forward) => Outcome::Success(forward),
            AlertDecision::Cancel(reason) => {
                debug!(id = %response.id, reason = ?reason, "Alert step cancelled");
                Outcome::CancelDownstream
            }
        }
    }

    /// Load a record and save it to the nested backend.
    pub async fn save_record(
        &self,
        ctx: &TaskContext,
        kind: EntityKind,
        id: EntityId,
    ) -> Outcome<AlertForward> {
        let entity = attempt!(self.single_policy, ctx, self.store.fetch_one(kind, id).await);
        self.save_document(ctx, &entity).await
    }

    /// Update named fields of an existing nested-backend document.
    pub async fn update_document(
        &self,
        ctx: &TaskContext,
        kind: EntityKind,
        target: &DocumentRef,
        fields: &Fields,
    ) -> Outcome<()> {
        let index = require!(self.current_index(kind));
        attempt!(
            self.single_policy,
            ctx,
            index.update(target, fields, self.auto_refresh).await
        );
        debug!(id = %target.id, kind = %kind, fields = fields.len(), "Updated document");
        Outcome::Success(())
    }
}

/// Builder for [`SyncPipeline`].
pub struct SyncPipelineBuilder {
    store: Arc<dyn RecordStore>,
    converters: ConverterRegistry,
    legacy: HashMap<EntityKind, Arc<dyn IndexWriter>>,
    current: HashMap<EntityKind, Arc<dyn NestedIndex>>,
    gate: StalenessGate,
    alerts: Option<AlertTrigger>,
    batch_policy: RetryPolicy,
    single_policy: RetryPolicy,
    auto_refresh: bool,
}

impl SyncPipelineBuilder {
    fn new(store: Arc<dyn RecordStore>) -> Self {
        let retry = sync_types::RetrySettings::default();
        Self {
            store,
            converters: ConverterRegistry::with_defaults(),
            legacy: HashMap::new(),
            current: HashMap::new(),
            gate: StalenessGate::default(),
            alerts: None,
            batch_policy: RetryPolicy::batch(&retry),
            single_policy: RetryPolicy::single(&retry),
            auto_refresh: false,
        }
    }

    /// Replace the default converters.
    pub fn converters(mut self, converters: ConverterRegistry) -> Self {
        self.converters = converters;
        self
    }

    /// Legacy backend writer for a kind.
    pub fn legacy_writer(mut self, kind: EntityKind, writer: Arc<dyn IndexWriter>) -> Self {
        self.legacy.insert(kind, writer);
        self
    }

    /// Nested backend index for a kind.
    pub fn current_index(mut self, kind: EntityKind, index: Arc<dyn NestedIndex>) -> Self {
        self.current.insert(kind, index);
        self
    }

    pub fn freshness_threshold(mut self, threshold: Duration) -> Self {
        self.gate = StalenessGate::new(threshold);
        self
    }

    pub fn alerts(mut self, alerts: AlertTrigger) -> Self {
        self.alerts = Some(alerts);
        self
    }

    /// Retry policies for batch and single-document tasks.
    pub fn retry(mut self, batch: RetryPolicy, single: RetryPolicy) -> Self {
        self.batch_policy = batch;
        self.single_policy = single;
        self
    }

    pub fn auto_refresh(mut self, auto_refresh: bool) -> Self {
        self.auto_refresh = auto_refresh;
        self
    }

    /// Finish building. Without an alert trigger no kind is alert-eligible.
    pub fn build(self) -> SyncPipeline {
        let alerts = self.alerts.unwrap_or_else(|| {
            AlertTrigger::new(
                AlertEligibility::default(),
                Arc::new(crate::alerts::StaticFlags::default()),
            )
        });
        SyncPipeline {
            store: self.store,
            converters: self.converters,
            legacy: self.legacy,
            current: self.current,
            gate: self.gate,
            routing: RoutingResolver::new(),
            alerts,
            batch_policy: self.batch_policy,
            single_policy: self.single_policy,
            auto_refresh: self.auto_refresh,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::StaticFlags;
    use crate::store::MemoryStore;
    use serde_json::json;
    use sync_backend::{BackendError, MemoryIndex};
    use sync_types::SearchDocument;

    const FLAG: &str = "oa-es-alerts-active";

    struct Fixture {
        store: Arc<MemoryStore>,
        legacy: Arc<MemoryIndex>,
        people: Arc<MemoryIndex>,
        audio: Arc<MemoryIndex>,
        pipeline: SyncPipeline,
    }

    fn fixture(entities: Vec<Entity>, flag_on: bool) -> Fixture {
        let store = Arc::new(MemoryStore::from_entities(entities));
        let legacy = Arc::new(MemoryIndex::new("recap"));
        let people = Arc::new(MemoryIndex::new("people_db_index"));
        let audio = Arc::new(MemoryIndex::new("oral_arguments_vectors"));
        let enabled: Vec<&str> = if flag_on { vec![FLAG] } else { vec![] };
        let alerts = AlertTrigger::new(
            AlertEligibility::new([EntityKind::Audio]).with_flag(EntityKind::Audio, FLAG),
            Arc::new(StaticFlags::new(enabled)),
        );

        let mut builder = SyncPipeline::builder(store.clone()).alerts(alerts);
        for kind in [
            EntityKind::Audio,
            EntityKind::Docket,
            EntityKind::RecapDocument,
        ] {
            builder = builder.legacy_writer(kind, legacy.clone());
        }
        for kind in [EntityKind::Person, EntityKind::Education, EntityKind::Position] {
            builder = builder.current_index(kind, people.clone());
        }
        builder = builder.current_index(EntityKind::Audio, audio.clone());

        Fixture {
            store,
            legacy,
            people,
            audio,
            pipeline: builder.build(),
        }
    }

    fn audio(id: EntityId) -> Entity {
        Entity::new(id, EntityKind::Audio)
            .with_field("case_name", format!("Argument {}", id))
            .with_field("local_path_mp3", format!("mp3/{}.mp3", id))
    }

    fn docket(last_indexed_minutes_ago: Option<i64>) -> Entity {
        let mut docket = Entity::new(7, EntityKind::Docket)
            .with_field("case_name", "Lovelace v. Babbage")
            .with_field("court_id", "cand");
        if let Some(minutes) = last_indexed_minutes_ago {
            docket = docket.with_last_indexed_at(Utc::now() - chrono::Duration::minutes(minutes));
        }
        for id in 70..73 {
            docket = docket.with_child(
                Entity::new(id, EntityKind::RecapDocument).with_field("description", "Motion"),
            );
        }
        docket
    }

    fn ctx() -> TaskContext {
        TaskContext::new("test-task")
    }

    #[tokio::test]
    async fn test_add_batch_partial_failure() {
        let mut entities: Vec<Entity> = (1..=5).map(audio).collect();
        entities[2] = audio(3).with_field("date_argued", "yesterday-ish");
        let f = fixture(entities, false);

        let report = f
            .pipeline
            .add_batch(&ctx(), &[1, 2, 3, 4, 5], EntityKind::Audio, true)
            .await
            .success()
            .unwrap();

        assert_eq!(report.written, 4);
        assert_eq!(report.failed, vec![3]);
        assert!(report.committed);
        assert_eq!(f.legacy.ids(), vec!["1", "2", "4", "5"]);
        assert_eq!(f.legacy.commit_calls(), 1);
    }

    #[tokio::test]
    async fn test_add_batch_is_idempotent() {
        let f = fixture((1..=3).map(audio).collect(), false);
        for _ in 0..2 {
            assert!(f
                .pipeline
                .add_batch(&ctx(), &[1, 2, 3], EntityKind::Audio, false)
                .await
                .is_success());
        }
        assert_eq!(f.legacy.len(), 3);
        assert_eq!(f.legacy.commit_calls(), 0);
    }

    #[tokio::test]
    async fn test_add_batch_stamps_dockets() {
        let f = fixture(vec![docket(None)], false);
        let report = f
            .pipeline
            .add_batch(&ctx(), &[7], EntityKind::Docket, false)
            .await
            .success()
            .unwrap();

        assert_eq!(report.written, 3);
        assert!(f
            .store
            .get(EntityKind::Docket, 7)
            .unwrap()
            .last_indexed_at
            .is_some());
    }

    #[tokio::test]
    async fn test_add_batch_transient_error_retries_after_fixed_delay() {
        let f = fixture(vec![audio(1)], false);
        f.legacy.fail_next(BackendError::Connection("refused".into()));

        let outcome = f
            .pipeline
            .add_batch(&ctx(), &[1], EntityKind::Audio, false)
            .await;
        assert!(matches!(
            outcome,
            Outcome::RetryAfter { delay, .. } if delay == Duration::from_secs(30)
        ));
    }

    #[tokio::test]
    async fn test_missing_writer_is_fatal() {
        let f = fixture(vec![], false);
        let outcome = f
            .pipeline
            .add_batch(&ctx(), &[1], EntityKind::Opinion, false)
            .await;
        assert!(matches!(
            outcome,
            Outcome::Fatal(SyncError::NoWriter(EntityKind::Opinion))
        ));
    }

    #[tokio::test]
    async fn test_aggregate_without_payload_is_noop() {
        let f = fixture(vec![docket(None)], false);
        let outcome = f
            .pipeline
            .add_or_update_aggregate(&ctx(), None, false, None)
            .await;
        assert!(matches!(outcome, Outcome::Success(AggregateStatus::Skipped)));
        assert_eq!(f.legacy.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_fresh_unchanged_aggregate_skipped() {
        let f = fixture(vec![docket(Some(10))], false);
        let payload = AggregatePayload {
            parent_id: 7,
            content_changed: false,
        };
        let outcome = f
            .pipeline
            .add_or_update_aggregate(&ctx(), Some(payload), false, None)
            .await;
        assert!(matches!(outcome, Outcome::Success(AggregateStatus::Skipped)));
        assert_eq!(f.legacy.add_calls(), 0);
    }

    #[tokio::test]
    async fn test_fresh_changed_aggregate_reindexed_and_stamped() {
        let f = fixture(vec![docket(Some(10))], false);
        let before = f.store.get(EntityKind::Docket, 7).unwrap().last_indexed_at;
        let payload = AggregatePayload {
            parent_id: 7,
            content_changed: true,
        };

        let outcome = f
            .pipeline
            .add_or_update_aggregate(&ctx(), Some(payload), true, None)
            .await;
        let Outcome::Success(AggregateStatus::Reindexed(report)) = outcome else {
            panic!("expected reindex");
        };
        assert_eq!(report.written, 3);
        assert_eq!(f.legacy.ids(), vec!["70", "71", "72"]);
        assert_eq!(
            f.legacy.get("71").unwrap().body["case_name"],
            json!("Lovelace v. Babbage")
        );

        let after = f.store.get(EntityKind::Docket, 7).unwrap().last_indexed_at;
        assert!(after > before);
    }

    #[tokio::test]
    async fn test_failed_aggregate_write_not_stamped() {
        let f = fixture(vec![docket(Some(120))], false);
        let before = f.store.get(EntityKind::Docket, 7).unwrap().last_indexed_at;
        f.legacy.fail_next(BackendError::from_status(503, "busy"));

        let payload = AggregatePayload {
            parent_id: 7,
            content_changed: false,
        };
        let outcome = f
            .pipeline
            .add_or_update_aggregate(&ctx(), Some(payload), false, None)
            .await;
        assert!(matches!(outcome, Outcome::RetryAfter { .. }));
        assert_eq!(
            f.store.get(EntityKind::Docket, 7).unwrap().last_indexed_at,
            before
        );
    }

    #[tokio::test]
    async fn test_children_batch_fetches_metadata_once() {
        let mut parent = Entity::new(7, EntityKind::Docket)
            .with_field("case_name", "A v. B")
            .with_field("court_id", "nysd");
        for id in 0..100 {
            parent = parent.with_child(Entity::new(1000 + id, EntityKind::RecapDocument));
        }
        let f = fixture(vec![parent], false);
        let ids: Vec<EntityId> = (1000..1100).collect();

        let report = f
            .pipeline
            .add_children_batch(&ctx(), &ids, false)
            .await
            .success()
            .unwrap();

        assert_eq!(report.written, 100);
        assert_eq!(f.store.metadata_fetches(), 1);
        assert_eq!(f.legacy.get("1042").unwrap().body["case_name"], json!("A v. B"));
    }

    #[tokio::test]
    async fn test_add_batch_children_carry_their_own_parent_fields() {
        let other = Entity::new(8, EntityKind::Docket)
            .with_field("case_name", "Hopper v. Navy")
            .with_field("court_id", "dcd")
            .with_child(Entity::new(80, EntityKind::RecapDocument).with_field("description", "Order"));
        let f = fixture(vec![docket(None), other], false);

        let report = f
            .pipeline
            .add_batch(&ctx(), &[70, 80, 71], EntityKind::RecapDocument, false)
            .await
            .success()
            .unwrap();

        assert_eq!(report.written, 3);
        assert_eq!(f.store.metadata_fetches(), 2);
        for id in ["70", "71"] {
            let body = f.legacy.get(id).unwrap().body;
            assert_eq!(body["case_name"], json!("Lovelace v. Babbage"));
            assert_eq!(body["court_id"], json!("cand"));
        }
        let body = f.legacy.get("80").unwrap().body;
        assert_eq!(body["case_name"], json!("Hopper v. Navy"));
        assert_eq!(body["description"], json!("Order"));
        // Children are never stamped, only dockets
        assert!(f.store.get(EntityKind::Docket, 7).unwrap().last_indexed_at.is_none());
    }

    #[tokio::test]
    async fn test_delete_batch() {
        let f = fixture(vec![], false);
        f.legacy.seed(&SearchDocument::new("4", EntityKind::Audio, Fields::new()));

        let report = f
            .pipeline
            .delete_batch(&ctx(), &[4, 5], EntityKind::Audio, true)
            .await
            .success()
            .unwrap();
        assert_eq!(report.deleted, 2);
        assert!(report.committed);
        assert!(f.legacy.is_empty());
    }

    #[tokio::test]
    async fn test_new_audio_forwards_alert() {
        let f = fixture(vec![audio(9)], true);
        let forward = f
            .pipeline
            .save_record(&ctx(), EntityKind::Audio, 9)
            .await
            .success()
            .unwrap();
        assert_eq!(forward.id, "9");
        assert_eq!(forward.fields["case_name"], json!("Argument 9"));

        // Second save is an update
        let outcome = f.pipeline.save_record(&ctx(), EntityKind::Audio, 9).await;
        assert!(matches!(outcome, Outcome::CancelDownstream));
        assert_eq!(f.audio.save_calls(), 2);
    }

    #[tokio::test]
    async fn test_flag_off_cancels_alert() {
        let f = fixture(vec![audio(9)], false);
        let outcome = f.pipeline.save_record(&ctx(), EntityKind::Audio, 9).await;
        assert!(matches!(outcome, Outcome::CancelDownstream));
        assert!(f.audio.contains("9"));
    }

    #[tokio::test]
    async fn test_child_without_parent_document_not_written() {
        let education = Entity::new(5, EntityKind::Education)
            .with_parent(12)
            .with_field("school", "Yale");
        let f = fixture(vec![education.clone()], true);

        let outcome = f.pipeline.save_document(&ctx(), &education).await;
        assert!(matches!(outcome, Outcome::CancelDownstream));
        assert_eq!(f.people.save_calls(), 0);
    }

    #[tokio::test]
    async fn test_child_saved_with_routing() {
        let education = Entity::new(5, EntityKind::Education)
            .with_parent(12)
            .with_field("school", "Yale");
        let f = fixture(vec![], false);
        f.people
            .seed(&SearchDocument::new("12", EntityKind::Person, Fields::new()));

        let outcome = f.pipeline.save_document(&ctx(), &education).await;
        assert!(matches!(outcome, Outcome::CancelDownstream));

        let stored = f.people.get("ed_5").unwrap();
        assert_eq!(stored.routing.as_deref(), Some("12"));
        assert_eq!(
            stored.body["person_child"],
            json!({"name": "education", "parent": 12})
        );
    }

    #[tokio::test]
    async fn test_save_retry_is_bounded() {
        let f = fixture(vec![audio(9)], true);
        f.audio
            .fail_always(BackendError::from_status(502, "bad gateway"));

        let mut ctx = ctx();
        let first = f.pipeline.save_record(&ctx, EntityKind::Audio, 9).await;
        assert!(matches!(
            first,
            Outcome::RetryAfter { delay, .. } if delay == Duration::from_secs(5)
        ));

        ctx = ctx.next_attempt().next_attempt();
        let last = f.pipeline.save_record(&ctx, EntityKind::Audio, 9).await;
        assert!(matches!(
            last,
            Outcome::Fatal(SyncError::RetriesExhausted { attempts: 3, .. })
        ));
    }

    #[tokio::test]
    async fn test_update_document() {
        let f = fixture(vec![], false);
        f.people
            .seed(&SearchDocument::new("12", EntityKind::Person, Fields::new()));

        let mut fields = Fields::new();
        fields.insert("name_full".into(), json!("Thurgood Marshall"));
        let outcome = f
            .pipeline
            .update_document(&ctx(), EntityKind::Person, &DocumentRef::new("12"), &fields)
            .await;
        assert!(outcome.is_success());
        assert_eq!(
            f.people.get("12").unwrap().body["name_full"],
            json!("Thurgood Marshall")
        );
    }
}
