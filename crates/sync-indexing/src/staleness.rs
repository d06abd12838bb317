//! Freshness gate for aggregate re-indexing.
//!
//! Re-indexing an aggregate rewrites every child document, so an aggregate
//! indexed within the threshold is skipped unless its content changed.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Decision of the [`StalenessGate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Indexed recently and unchanged
    Skip,
    /// Needs a full re-index
    Reindex,
}

/// Decides whether an aggregate needs a full re-index.
#[derive(Debug, Clone, Copy)]
pub struct StalenessGate {
    threshold: Duration,
}

impl Default for StalenessGate {
    fn default() -> Self {
        Self::new(Duration::from_secs(60 * 60))
    }
}

impl StalenessGate {
    pub fn new(threshold: Duration) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Skip iff the aggregate was indexed after `now - threshold` and its
    /// content is unchanged. Never-indexed aggregates always re-index.
    pub fn evaluate(
        &self,
        last_indexed_at: Option<DateTime<Utc>>,
        content_changed: bool,
        now: DateTime<Utc>,
    ) -> Freshness {
        let too_fresh = match (last_indexed_at, chrono::Duration::from_std(self.threshold)) {
            (Some(last), Ok(threshold)) => last > now - threshold,
            // Threshold beyond chrono's range: everything indexed is fresh
            (Some(_), Err(_)) => true,
            (None, _) => false,
        };

        if too_fresh && !content_changed {
            Freshness::Skip
        } else {
            Freshness::Reindex
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_fresh_unchanged_skips() {
        let gate = StalenessGate::default();
        let last = now() - chrono::Duration::minutes(10);
        assert_eq!(gate.evaluate(Some(last), false, now()), Freshness::Skip);
    }

    #[test]
    fn test_fresh_changed_reindexes() {
        let gate = StalenessGate::default();
        let last = now() - chrono::Duration::minutes(10);
        assert_eq!(gate.evaluate(Some(last), true, now()), Freshness::Reindex);
    }

    #[test]
    fn test_stale_reindexes() {
        let gate = StalenessGate::default();
        let last = now() - chrono::Duration::hours(2);
        assert_eq!(gate.evaluate(Some(last), false, now()), Freshness::Reindex);
    }

    #[test]
    fn test_never_indexed_reindexes() {
        let gate = StalenessGate::default();
        assert_eq!(gate.evaluate(None, false, now()), Freshness::Reindex);
    }

    #[test]
    fn test_exact_threshold_is_stale() {
        let gate = StalenessGate::new(Duration::from_secs(60));
        let last = now() - chrono::Duration::seconds(60);
        assert_eq!(gate.evaluate(Some(last), false, now()), Freshness::Reindex);
    }
}
