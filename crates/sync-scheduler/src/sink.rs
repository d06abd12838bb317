//! Destination for alert payloads produced by document saves.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tracing::info;

use sync_indexing::AlertForward;

/// Receives documents to match against saved alert queries.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn deliver(&self, alert: AlertForward);
}

/// Collects forwarded alerts in memory.
#[derive(Default)]
pub struct AlertOutbox {
    alerts: Mutex<Vec<AlertForward>>,
}

impl AlertOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Alerts delivered so far, in delivery order.
    pub fn alerts(&self) -> Vec<AlertForward> {
        self.alerts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Remove and return all delivered alerts.
    pub fn drain(&self) -> Vec<AlertForward> {
        std::mem::take(&mut *self.alerts.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn len(&self) -> usize {
        self.alerts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AlertSink for AlertOutbox {
    async fn deliver(&self, alert: AlertForward) {
        info!(id = %alert.id, kind = %alert.kind, "Forwarding document to alert matching");
        self.alerts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(alert);
    }
}
