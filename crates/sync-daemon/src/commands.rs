//! Command implementations for the sync daemon.
//!
//! Handles:
//! - run: Load config and a record snapshot, replay tasks through the runner
//! - config: Print the effective configuration

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::signal;
use tracing::{info, warn};

use sync_backend::{IndexWriter, MemoryIndex, NestedIndex};
use sync_indexing::{
    AlertEligibility, AlertTrigger, MemoryStore, RecordStore, RetryPolicy, StaticFlags,
    SyncPipeline,
};
use sync_scheduler::{
    parse_task_lines, AlertOutbox, DeadLetter, RegistrySummary, RunnerConfig, TaskRequest,
    TaskRunner,
};
use sync_types::{EntityKind, Settings};

/// What a replay did, printed as JSON when `run` finishes.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub summary: RegistrySummary,
    /// Documents forwarded to alert matching
    pub alerts: usize,
    /// Documents written to the legacy backend
    pub written: usize,
    pub dead_letters: Vec<DeadLetter>,
}

/// Load settings and apply CLI overrides.
pub fn load_settings(config_path: Option<&str>, log_level: Option<&str>) -> Result<Settings> {
    let mut settings = Settings::load(config_path).context("Failed to load configuration")?;
    if let Some(level) = log_level {
        settings.log_level = level.to_string();
    }
    Ok(settings)
}

fn init_logging(settings: &Settings) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&settings.log_level)),
        )
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")
}

/// Replay tasks against a record snapshot.
///
/// Tasks are read from `tasks_path`, or stdin when it is `None`. Ctrl+C
/// stops tasks waiting to retry.
pub async fn run_tasks(
    config_path: Option<&str>,
    log_level: Option<&str>,
    snapshot_path: &str,
    tasks_path: Option<&str>,
    dry_run: bool,
    max_concurrency: usize,
) -> Result<()> {
    let settings = load_settings(config_path, log_level)?;
    init_logging(&settings)?;

    info!("Sync daemon starting...");
    info!("  Legacy cores: {}", settings.legacy.urls.len());
    info!("  Current backend: {}", settings.current.url);
    info!("  Log level: {}", settings.log_level);

    let snapshot = std::fs::read_to_string(snapshot_path)
        .with_context(|| format!("Failed to read snapshot {}", snapshot_path))?;
    let requests = match tasks_path {
        Some(path) => {
            let file = File::open(path).with_context(|| format!("Failed to open {}", path))?;
            parse_task_lines(BufReader::new(file))?
        }
        None => parse_task_lines(io::stdin().lock())?,
    };
    info!("Loaded {} task chains", requests.len());

    let report = execute(&settings, &snapshot, requests, dry_run, max_concurrency).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Build a runner over the snapshot and run every request.
pub async fn execute(
    settings: &Settings,
    snapshot: &str,
    requests: Vec<TaskRequest>,
    dry_run: bool,
    max_concurrency: usize,
) -> Result<RunReport> {
    let store: Arc<dyn RecordStore> =
        Arc::new(MemoryStore::from_json(snapshot).context("Invalid snapshot")?);
    let flags = Arc::new(StaticFlags::from_settings(&settings.alerts));
    let pipeline = if dry_run {
        dry_run_pipeline(settings, store)?
    } else {
        SyncPipeline::from_settings(settings, store, flags)
            .context("Failed to configure backends")?
    };

    let outbox = Arc::new(AlertOutbox::new());
    let runner = TaskRunner::new(
        Arc::new(pipeline),
        outbox.clone(),
        RunnerConfig::default().with_max_concurrency(max_concurrency),
    )?;

    let shutdown = runner.shutdown_token();
    let signal_task = tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down...");
            shutdown.cancel();
        }
    });

    let results = runner.run_all(requests).await;
    signal_task.abort();

    let mut written = 0;
    for result in &results {
        match result {
            Ok(value) => written += value.as_ref().map_or(0, |v| v.documents_written()),
            Err(err) => warn!(error = %err, "Task chain did not complete"),
        }
    }

    let registry = runner.registry();
    Ok(RunReport {
        summary: registry.summary(),
        alerts: outbox.len(),
        written,
        dead_letters: registry.dead_letters(),
    })
}

/// Pipeline writing to in-memory indices named like the configured ones.
fn dry_run_pipeline(settings: &Settings, store: Arc<dyn RecordStore>) -> Result<SyncPipeline> {
    let eligibility = AlertEligibility::from_settings(&settings.alerts)?;
    let mut builder = SyncPipeline::builder(store)
        .alerts(AlertTrigger::new(
            eligibility,
            Arc::new(StaticFlags::from_settings(&settings.alerts)),
        ))
        .freshness_threshold(settings.freshness_threshold())
        .retry(
            RetryPolicy::batch(&settings.retry),
            RetryPolicy::single(&settings.retry),
        )
        .auto_refresh(settings.current.auto_refresh);

    let mut legacy: HashMap<&str, Arc<MemoryIndex>> = HashMap::new();
    let mut current: HashMap<&str, Arc<MemoryIndex>> = HashMap::new();
    for kind in EntityKind::ALL {
        if let Some(url) = settings.legacy.url_for(kind) {
            let index = legacy
                .entry(url)
                .or_insert_with(|| Arc::new(MemoryIndex::new(kind.as_str())))
                .clone();
            builder = builder.legacy_writer(kind, index as Arc<dyn IndexWriter>);
        }
        if let Some(name) = settings.current.index_for(kind) {
            let index = current
                .entry(name)
                .or_insert_with(|| Arc::new(MemoryIndex::new(name)))
                .clone();
            builder = builder.current_index(kind, index as Arc<dyn NestedIndex>);
        }
    }
    Ok(builder.build())
}

/// Print the effective configuration.
pub fn show_config(config_path: Option<&str>, log_level: Option<&str>) -> Result<()> {
    let settings = load_settings(config_path, log_level)?;
    print!("{}", render_config(&settings)?);
    Ok(())
}

/// Settings as TOML. Secrets serialize as a placeholder.
pub fn render_config(settings: &Settings) -> Result<String> {
    toml::to_string_pretty(settings).context("Failed to render configuration")
}
