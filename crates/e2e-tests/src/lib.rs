//! End-to-end test infrastructure for docket-sync.
//!
//! Provides a shared TestHarness wiring the pipeline and task runner over an
//! in-memory record store and in-memory indices laid out like the default
//! backend configuration.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use sync_backend::{IndexWriter, MemoryIndex, NestedIndex};
use sync_indexing::{
    AlertEligibility, AlertTrigger, MemoryStore, RecordStore, StaticFlags, SyncPipeline,
};
use sync_scheduler::{
    parse_task_lines, AlertOutbox, RunnerConfig, SchedulerError, TaskRequest, TaskRunner,
    TaskValue,
};
use sync_types::{Entity, EntityId, EntityKind};

/// Flag gating alerts for oral argument recordings.
pub const AUDIO_ALERT_FLAG: &str = "oa-es-alerts-active";

/// Shared test harness for E2E tests.
pub struct TestHarness {
    pub store: Arc<MemoryStore>,
    /// Legacy core for oral arguments
    pub audio_core: Arc<MemoryIndex>,
    /// Legacy core shared by dockets and their documents
    pub recap_core: Arc<MemoryIndex>,
    /// Legacy core for judges
    pub person_core: Arc<MemoryIndex>,
    /// Current index for oral arguments
    pub oral_arguments: Arc<MemoryIndex>,
    /// Current index holding judges with nested education and positions
    pub people: Arc<MemoryIndex>,
    pub outbox: Arc<AlertOutbox>,
    pub runner: TaskRunner,
}

impl TestHarness {
    /// Create a harness over `entities` with the audio alert flag off.
    pub fn new(entities: Vec<Entity>) -> Self {
        Self::with_alerts(entities, false)
    }

    /// Create a harness choosing whether the audio alert flag is on.
    pub fn with_alerts(entities: Vec<Entity>, alerts_on: bool) -> Self {
        let store = Arc::new(MemoryStore::from_entities(entities));
        let audio_core = Arc::new(MemoryIndex::new("audio"));
        let recap_core = Arc::new(MemoryIndex::new("recap"));
        let person_core = Arc::new(MemoryIndex::new("person"));
        let oral_arguments = Arc::new(MemoryIndex::new("oral_arguments_vectors"));
        let people = Arc::new(MemoryIndex::new("people_db_index"));

        let enabled: Vec<&str> = if alerts_on {
            vec![AUDIO_ALERT_FLAG]
        } else {
            Vec::new()
        };
        let trigger = AlertTrigger::new(
            AlertEligibility::new([EntityKind::Audio])
                .with_flag(EntityKind::Audio, AUDIO_ALERT_FLAG),
            Arc::new(StaticFlags::new(enabled)),
        );

        let record_store: Arc<dyn RecordStore> = store.clone();
        let pipeline = SyncPipeline::builder(record_store)
            .legacy_writer(EntityKind::Audio, audio_core.clone() as Arc<dyn IndexWriter>)
            .legacy_writer(EntityKind::Docket, recap_core.clone() as Arc<dyn IndexWriter>)
            .legacy_writer(
                EntityKind::RecapDocument,
                recap_core.clone() as Arc<dyn IndexWriter>,
            )
            .legacy_writer(EntityKind::Person, person_core.clone() as Arc<dyn IndexWriter>)
            .current_index(EntityKind::Audio, oral_arguments.clone() as Arc<dyn NestedIndex>)
            .current_index(EntityKind::Person, people.clone() as Arc<dyn NestedIndex>)
            .current_index(EntityKind::Education, people.clone() as Arc<dyn NestedIndex>)
            .current_index(EntityKind::Position, people.clone() as Arc<dyn NestedIndex>)
            .alerts(trigger)
            .build();

        let outbox = Arc::new(AlertOutbox::new());
        let runner = TaskRunner::new(
            Arc::new(pipeline),
            outbox.clone(),
            RunnerConfig::default(),
        )
        .expect("Default runner config is valid");

        Self {
            store,
            audio_core,
            recap_core,
            person_core,
            oral_arguments,
            people,
            outbox,
            runner,
        }
    }

    /// Run one request chain.
    pub async fn run(&self, request: TaskRequest) -> Result<Option<TaskValue>, SchedulerError> {
        self.runner.run(request).await
    }

    /// Parse and run task lines in order.
    pub async fn run_lines(
        &self,
        lines: &str,
    ) -> Vec<Result<Option<TaskValue>, SchedulerError>> {
        let requests = parse_task_lines(lines.as_bytes()).expect("Failed to parse task lines");
        self.runner.run_all(requests).await
    }
}

/// An oral argument recording that has been transcoded.
pub fn audio(id: EntityId) -> Entity {
    Entity::new(id, EntityKind::Audio)
        .with_field("case_name", format!("Oral argument {}", id))
        .with_field("court_id", "scotus")
        .with_field("local_path_mp3", format!("mp3/{}.mp3", id))
}

/// A docket with `documents` RECAP documents numbered `id * 1000 + n`.
pub fn docket(
    id: EntityId,
    documents: u64,
    last_indexed_at: Option<DateTime<Utc>>,
) -> Entity {
    let mut docket = Entity::new(id, EntityKind::Docket)
        .with_field("case_name", format!("United States v. Party {}", id))
        .with_field("court_id", "dcd")
        .with_field("docket_number", format!("1:24-cv-{:05}", id));
    if let Some(at) = last_indexed_at {
        docket = docket.with_last_indexed_at(at);
    }
    for n in 1..=documents {
        docket = docket.with_child(
            Entity::new(id * 1000 + n, EntityKind::RecapDocument)
                .with_field("document_number", n)
                .with_field("description", format!("Entry {}", n)),
        );
    }
    docket
}

/// Ids of the RECAP documents created by [`docket`].
pub fn docket_document_ids(id: EntityId, documents: u64) -> Vec<EntityId> {
    (1..=documents).map(|n| id * 1000 + n).collect()
}

/// A judge.
pub fn person(id: EntityId) -> Entity {
    Entity::new(id, EntityKind::Person)
        .with_field("name_full", format!("Judge {}", id))
        .with_field("gender", "f")
}

/// An education record of a judge.
pub fn education(id: EntityId, person_id: EntityId) -> Entity {
    Entity::new(id, EntityKind::Education)
        .with_parent(person_id)
        .with_field("school", "Yale Law School")
        .with_field("degree_year", 1980)
}
