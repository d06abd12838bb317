//! Alert forwarding after single-document saves.
//!
//! Saved queries are matched against newly created documents of eligible
//! kinds. Only the first creation of a document forwards it; later updates
//! must not re-alert. A per-kind feature flag can switch forwarding off, in
//! which case the downstream matching step is cancelled.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use sync_backend::SaveResponse;
use sync_types::{AlertSettings, EntityKind, Fields, SearchDocument, SyncTypesError};

/// Feature flag lookup.
pub trait FeatureFlags: Send + Sync {
    fn is_enabled(&self, flag: &str) -> bool;
}

/// Flags fixed at construction.
#[derive(Debug, Clone, Default)]
pub struct StaticFlags {
    enabled: HashSet<String>,
}

impl StaticFlags {
    pub fn new(enabled: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            enabled: enabled.into_iter().map(Into::into).collect(),
        }
    }

    /// Flags listed as enabled in the alert settings.
    pub fn from_settings(settings: &AlertSettings) -> Self {
        Self::new(settings.enabled_flags.iter().cloned())
    }
}

impl FeatureFlags for StaticFlags {
    fn is_enabled(&self, flag: &str) -> bool {
        self.enabled.contains(flag)
    }
}

/// Which kinds are alert-eligible and which flag gates each.
#[derive(Debug, Clone, Default)]
pub struct AlertEligibility {
    kinds: HashSet<EntityKind>,
    flags: BTreeMap<EntityKind, String>,
}

impl AlertEligibility {
    pub fn new(kinds: impl IntoIterator<Item = EntityKind>) -> Self {
        Self {
            kinds: kinds.into_iter().collect(),
            flags: BTreeMap::new(),
        }
    }

    /// Gate forwarding for `kind` behind `flag`.
    pub fn with_flag(mut self, kind: EntityKind, flag: impl Into<String>) -> Self {
        self.flags.insert(kind, flag.into());
        self
    }

    pub fn from_settings(settings: &AlertSettings) -> Result<Self, SyncTypesError> {
        Ok(Self {
            kinds: settings.eligible()?.into_iter().collect(),
            flags: settings.kind_flags()?,
        })
    }

    pub fn is_eligible(&self, kind: EntityKind) -> bool {
        self.kinds.contains(&kind)
    }

    pub fn flag_for(&self, kind: EntityKind) -> Option<&str> {
        self.flags.get(&kind).map(String::as_str)
    }
}

/// Payload handed to alert matching.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertForward {
    /// Id of the created document
    pub id: String,
    pub kind: EntityKind,
    /// Document body to match saved queries against
    pub fields: Fields,
}

/// Why no alert was forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    FlagDisabled,
    NotFirstCreation,
    NotEligible,
}

/// Outcome of the alert check for one save.
#[derive(Debug, Clone, PartialEq)]
pub enum AlertDecision {
    Forward(AlertForward),
    Cancel(CancelReason),
}

/// Decides whether a save forwards its document to alert matching.
#[derive(Clone)]
pub struct AlertTrigger {
    eligibility: AlertEligibility,
    flags: Arc<dyn FeatureFlags>,
}

impl AlertTrigger {
    pub fn new(eligibility: AlertEligibility, flags: Arc<dyn FeatureFlags>) -> Self {
        Self { eligibility, flags }
    }

    pub fn decide(
        &self,
        kind: EntityKind,
        response: &SaveResponse,
        doc: &SearchDocument,
    ) -> AlertDecision {
        if !self.eligibility.is_eligible(kind) {
            return AlertDecision::Cancel(CancelReason::NotEligible);
        }
        if !response.is_first_creation() {
            debug!(id = %response.id, version = response.version, "Not a first creation, no alert");
            return AlertDecision::Cancel(CancelReason::NotFirstCreation);
        }
        if let Some(flag) = self.eligibility.flag_for(kind) {
            if !self.flags.is_enabled(flag) {
                debug!(id = %response.id, flag, "Alert flag disabled");
                return AlertDecision::Cancel(CancelReason::FlagDisabled);
            }
        }

        AlertDecision::Forward(AlertForward {
            id: response.id.clone(),
            kind,
            fields: doc.body(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const FLAG: &str = "oa-es-alerts-active";

    fn trigger(flag_on: bool) -> AlertTrigger {
        let eligibility = AlertEligibility::new([EntityKind::Audio]).with_flag(EntityKind::Audio, FLAG);
        let enabled: Vec<&str> = if flag_on { vec![FLAG] } else { vec![] };
        AlertTrigger::new(eligibility, Arc::new(StaticFlags::new(enabled)))
    }

    fn saved(version: u64) -> SaveResponse {
        SaveResponse {
            id: "9".into(),
            version,
            meta: None,
        }
    }

    fn audio_doc() -> SearchDocument {
        let mut fields = Fields::new();
        fields.insert("case_name".into(), json!("Oral argument"));
        SearchDocument::new("9", EntityKind::Audio, fields)
    }

    #[test]
    fn test_new_audio_with_flag_on_forwards() {
        let decision = trigger(true).decide(EntityKind::Audio, &saved(1), &audio_doc());
        let AlertDecision::Forward(forward) = decision else {
            panic!("expected forward, got {:?}", decision);
        };
        assert_eq!(forward.id, "9");
        assert_eq!(forward.fields["case_name"], json!("Oral argument"));
    }

    #[test]
    fn test_flag_off_cancels() {
        assert_eq!(
            trigger(false).decide(EntityKind::Audio, &saved(1), &audio_doc()),
            AlertDecision::Cancel(CancelReason::FlagDisabled)
        );
    }

    #[test]
    fn test_update_does_not_alert() {
        assert_eq!(
            trigger(true).decide(EntityKind::Audio, &saved(2), &audio_doc()),
            AlertDecision::Cancel(CancelReason::NotFirstCreation)
        );
    }

    #[test]
    fn test_ineligible_kind() {
        assert_eq!(
            trigger(true).decide(EntityKind::Person, &saved(1), &audio_doc()),
            AlertDecision::Cancel(CancelReason::NotEligible)
        );
    }

    #[test]
    fn test_eligible_without_flag_forwards() {
        let trigger = AlertTrigger::new(
            AlertEligibility::new([EntityKind::Audio]),
            Arc::new(StaticFlags::default()),
        );
        assert!(matches!(
            trigger.decide(EntityKind::Audio, &saved(1), &audio_doc()),
            AlertDecision::Forward(_)
        ));
    }

    #[test]
    fn test_from_settings() {
        let mut settings = AlertSettings::default();
        settings.enabled_flags.push(FLAG.to_string());

        let eligibility = AlertEligibility::from_settings(&settings).unwrap();
        assert!(eligibility.is_eligible(EntityKind::Audio));
        assert_eq!(eligibility.flag_for(EntityKind::Audio), Some(FLAG));
        assert!(StaticFlags::from_settings(&settings).is_enabled(FLAG));
    }
}
