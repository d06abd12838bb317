//! Configuration loading for docket-sync.
//!
//! Layered config: defaults -> config file -> env vars -> CLI flags.
//! The default config file lives at ~/.config/docket-sync/config.toml.
//! Environment variables use the `SYNC_` prefix and `__` for nesting,
//! e.g. `SYNC_CURRENT__URL` or `SYNC_RETRY__MAX_ATTEMPTS`.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use config::{Config, Environment, File};
use directories::ProjectDirs;
use secrecy::SecretString;
use serde::{Deserialize, Serialize, Serializer};

use crate::entity::EntityKind;
use crate::error::SyncTypesError;

/// Legacy (Solr-style) backend: one core URL per entity kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyBackendSettings {
    /// Core URL keyed by entity kind label
    #[serde(default = "default_legacy_urls")]
    pub urls: BTreeMap<String, String>,

    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_legacy_urls() -> BTreeMap<String, String> {
    let base = "http://127.0.0.1:8983/solr";
    [
        (EntityKind::Audio, "audio"),
        (EntityKind::Docket, "recap"),
        (EntityKind::RecapDocument, "recap"),
        (EntityKind::OpinionCluster, "collection1"),
        (EntityKind::Opinion, "collection1"),
        (EntityKind::Person, "person"),
    ]
    .into_iter()
    .map(|(kind, core)| (kind.as_str().to_string(), format!("{}/{}", base, core)))
    .collect()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for LegacyBackendSettings {
    fn default() -> Self {
        Self {
            urls: default_legacy_urls(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl LegacyBackendSettings {
    /// Core URL for a kind, if one is configured.
    pub fn url_for(&self, kind: EntityKind) -> Option<&str> {
        self.urls.get(kind.as_str()).map(String::as_str)
    }
}

/// Current-generation (nested document) backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentBackendSettings {
    /// Cluster base URL
    #[serde(default = "default_current_url")]
    pub url: String,

    /// API key (loaded from env var, not stored in config file).
    /// Serialized as a placeholder, never in clear.
    #[serde(
        default,
        serialize_with = "serialize_redacted",
        skip_serializing_if = "Option::is_none"
    )]
    pub api_key: Option<SecretString>,

    /// Index name keyed by entity kind label
    #[serde(default = "default_indices")]
    pub indices: BTreeMap<String, String>,

    /// Refresh the index on every write so changes are visible immediately
    #[serde(default)]
    pub auto_refresh: bool,

    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Placeholder written in place of secrets.
pub const REDACTED: &str = "<redacted>";

fn serialize_redacted<S: Serializer>(
    secret: &Option<SecretString>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(_) => serializer.serialize_some(REDACTED),
        None => serializer.serialize_none(),
    }
}

fn default_current_url() -> String {
    "http://127.0.0.1:9200".to_string()
}

fn default_indices() -> BTreeMap<String, String> {
    [
        (EntityKind::Audio, "oral_arguments_vectors"),
        (EntityKind::Person, "people_db_index"),
        (EntityKind::Education, "people_db_index"),
        (EntityKind::Position, "people_db_index"),
    ]
    .into_iter()
    .map(|(kind, index)| (kind.as_str().to_string(), index.to_string()))
    .collect()
}

impl Default for CurrentBackendSettings {
    fn default() -> Self {
        Self {
            url: default_current_url(),
            api_key: None,
            indices: default_indices(),
            auto_refresh: false,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl CurrentBackendSettings {
    /// Index name for a kind, if one is configured.
    pub fn index_for(&self, kind: EntityKind) -> Option<&str> {
        self.indices.get(kind.as_str()).map(String::as_str)
    }
}

/// Alert forwarding settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertSettings {
    /// Kinds whose first creation may trigger alert matching
    #[serde(default = "default_eligible_kinds")]
    pub eligible_kinds: Vec<String>,

    /// Feature flag gating alert forwarding, keyed by kind label
    #[serde(default = "default_alert_flags")]
    pub flags: BTreeMap<String, String>,

    /// Flags that are switched on
    #[serde(default)]
    pub enabled_flags: Vec<String>,
}

fn default_eligible_kinds() -> Vec<String> {
    vec![EntityKind::Audio.as_str().to_string()]
}

fn default_alert_flags() -> BTreeMap<String, String> {
    let mut flags = BTreeMap::new();
    flags.insert(
        EntityKind::Audio.as_str().to_string(),
        "oa-es-alerts-active".to_string(),
    );
    flags
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            eligible_kinds: default_eligible_kinds(),
            flags: default_alert_flags(),
            enabled_flags: Vec::new(),
        }
    }
}

impl AlertSettings {
    /// Parse the eligible kind labels.
    pub fn eligible(&self) -> Result<Vec<EntityKind>, SyncTypesError> {
        self.eligible_kinds.iter().map(|s| s.parse()).collect()
    }

    /// Parse the per-kind flag names.
    pub fn kind_flags(&self) -> Result<BTreeMap<EntityKind, String>, SyncTypesError> {
        self.flags
            .iter()
            .map(|(kind, flag)| Ok((kind.parse()?, flag.clone())))
            .collect()
    }
}

/// Retry policy settings for backend writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Fixed delay between retries of batch tasks (unbounded)
    #[serde(default = "default_batch_delay")]
    pub batch_delay_secs: u64,

    /// Attempts allowed for single-document save/update
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First delay of the single-document backoff
    #[serde(default = "default_initial_interval")]
    pub initial_interval_secs: u64,

    /// Growth factor of the single-document backoff
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Cap on a single backoff delay
    #[serde(default = "default_max_interval")]
    pub max_interval_secs: u64,
}

fn default_batch_delay() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_interval() -> u64 {
    5
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_interval() -> u64 {
    60
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            batch_delay_secs: default_batch_delay(),
            max_attempts: default_max_attempts(),
            initial_interval_secs: default_initial_interval(),
            multiplier: default_multiplier(),
            max_interval_secs: default_max_interval(),
        }
    }
}

impl RetrySettings {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be > 0".to_string());
        }
        if self.multiplier < 1.0 {
            return Err(format!("multiplier must be >= 1.0, got {}", self.multiplier));
        }
        if self.max_interval_secs < self.initial_interval_secs {
            return Err("max_interval_secs must be >= initial_interval_secs".to_string());
        }
        Ok(())
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Legacy backend configuration
    #[serde(default)]
    pub legacy: LegacyBackendSettings,

    /// Current backend configuration
    #[serde(default)]
    pub current: CurrentBackendSettings,

    /// Aggregates fresher than this are only re-indexed when their content changed
    #[serde(default = "default_freshness_threshold")]
    pub freshness_threshold_secs: u64,

    /// Alert forwarding configuration
    #[serde(default)]
    pub alerts: AlertSettings,

    /// Retry configuration
    #[serde(default)]
    pub retry: RetrySettings,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_freshness_threshold() -> u64 {
    60 * 60
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            legacy: LegacyBackendSettings::default(),
            current: CurrentBackendSettings::default(),
            freshness_threshold_secs: default_freshness_threshold(),
            alerts: AlertSettings::default(),
            retry: RetrySettings::default(),
            log_level: default_log_level(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/docket-sync/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (SYNC_*)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, SyncTypesError> {
        let config_dir = ProjectDirs::from("", "", "docket-sync")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("freshness_threshold_secs", default_freshness_threshold() as i64)
            .map_err(|e| SyncTypesError::Config(e.to_string()))?
            .set_default("log_level", default_log_level())
            .map_err(|e| SyncTypesError::Config(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Format: SYNC_LOG_LEVEL, SYNC_CURRENT__URL, SYNC_RETRY__MAX_ATTEMPTS, etc.
        builder = builder.add_source(
            Environment::with_prefix("SYNC")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| SyncTypesError::Config(e.to_string()))?;

        let settings: Settings = config
            .try_deserialize()
            .map_err(|e| SyncTypesError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), SyncTypesError> {
        self.retry.validate().map_err(SyncTypesError::Config)?;
        if self.current.url.trim().is_empty() {
            return Err(SyncTypesError::Config("current.url must not be empty".to_string()));
        }
        for (kind, url) in &self.legacy.urls {
            kind.parse::<EntityKind>()?;
            if url.trim().is_empty() {
                return Err(SyncTypesError::Config(format!(
                    "legacy.urls.{} must not be empty",
                    kind
                )));
            }
        }
        self.alerts.eligible()?;
        self.alerts.kind_flags()?;
        Ok(())
    }

    /// Freshness threshold as a duration.
    pub fn freshness_threshold(&self) -> Duration {
        Duration::from_secs(self.freshness_threshold_secs)
    }
}
