//! Persisted error reports
//!
//! Failures the UI swallows (background encryption, storage hiccups) are
//! appended to a bounded log in the key-value store so a user can paste it
//! into a bug report:
//! - Newest entries last, oldest dropped past the cap
//! - Messages pass through the credential filter before they are stored
//! - Recording never fails the caller

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::VaultResult;
use crate::filter::OutputFilter;
use crate::models::storage_keys;
use crate::storage::KeyValueStore;

/// Default cap on stored entries
pub const DEFAULT_MAX_REPORTS: usize = 50;

/// Single error report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub timestamp: DateTime<Utc>,
    /// Subsystem that failed, e.g. `Encryption`
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
}

/// Bounded error log on top of a key-value store
pub struct ErrorReporter<'a> {
    store: &'a dyn KeyValueStore,
    filter: OutputFilter,
    max_reports: usize,
}

impl<'a> ErrorReporter<'a> {
    pub fn new(store: &'a dyn KeyValueStore, max_reports: usize) -> Self {
        Self {
            store,
            filter: OutputFilter::new(),
            max_reports,
        }
    }

    /// Also redact this exact value from recorded messages
    pub fn with_secret(mut self, secret: &str) -> Self {
        self.filter.add_secret(secret);
        self
    }

    /// Append a report. Storage problems are logged and dropped.
    pub fn record(&self, kind: &str, message: &str) {
        if let Err(e) = self.try_record(kind, message) {
            warn!("Failed to persist error report: {}", e);
        }
    }

    fn try_record(&self, kind: &str, message: &str) -> VaultResult<()> {
        let mut entries = self.entries()?;
        entries.push(ErrorReport {
            timestamp: Utc::now(),
            kind: kind.to_string(),
            message: self.filter.scan_and_redact(message).redacted_output,
        });

        if entries.len() > self.max_reports {
            let excess = entries.len() - self.max_reports;
            entries.drain(..excess);
        }

        let json = serde_json::to_string(&entries)?;
        self.store.set(storage_keys::ERROR_LOG, &json)
    }

    /// Stored reports, oldest first. A corrupt log reads as empty.
    pub fn entries(&self) -> VaultResult<Vec<ErrorReport>> {
        let Some(raw) = self.store.get(storage_keys::ERROR_LOG)? else {
            return Ok(Vec::new());
        };
        Ok(serde_json::from_str(&raw).unwrap_or_default())
    }

    /// Pretty-printed JSON of all reports
    pub fn report(&self) -> VaultResult<String> {
        Ok(serde_json::to_string_pretty(&self.entries()?)?)
    }

    pub fn clear(&self) -> VaultResult<()> {
        self.store.delete(storage_keys::ERROR_LOG)
    }
}
