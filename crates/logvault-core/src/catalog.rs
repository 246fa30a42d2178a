//! Log catalog: which remote log files are safe to archive.
//!
//! The listing itself comes from an external [`LogFileLister`]. Selection is a
//! pure transformation over that listing ([`select_log_files`]):
//!
//! 1. Drop files last written before the retention threshold.
//! 2. Drop exactly one file with the newest `last_written`; the database is
//!    presumed to still be appending to it.
//! 3. Drop the bootstrap log if it is present.
//!
//! The input listing is never mutated.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::config::ArchiverConfig;
use crate::error::ArchiverResult;
use crate::types::LogFileDescriptor;

/// Lists the log files of a database instance.
#[async_trait::async_trait]
pub trait LogFileLister: Send + Sync {
    /// List log files of `instance_id` written at or after `written_after`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ArchiverError::Catalog`] when the listing call fails.
    async fn list_log_files(
        &self,
        instance_id: &str,
        written_after: DateTime<Utc>,
    ) -> ArchiverResult<Vec<LogFileDescriptor>>;
}

/// Select the names of the files eligible for download, in listing order.
///
/// When several files share the newest timestamp only the first of them is
/// dropped. An empty result is valid.
///
/// # Examples
///
/// ```
/// use logvault_core::catalog::select_log_files;
/// use logvault_core::types::LogFileDescriptor;
///
/// let listing = vec![
///     LogFileDescriptor::from_millis("a", 100).unwrap(),
///     LogFileDescriptor::from_millis("b", 200).unwrap(),
///     LogFileDescriptor::from_millis("error/postgres.log", 50).unwrap(),
/// ];
/// let threshold = chrono::DateTime::from_timestamp_millis(0).unwrap();
///
/// assert_eq!(select_log_files(&listing, threshold, "error/postgres.log"), vec!["a"]);
/// ```
#[must_use]
pub fn select_log_files(
    descriptors: &[LogFileDescriptor],
    threshold: DateTime<Utc>,
    bootstrap_name: &str,
) -> Vec<String> {
    let mut recent: Vec<&LogFileDescriptor> = descriptors
        .iter()
        .filter(|d| d.last_written >= threshold)
        .collect();

    if let Some(newest) = index_of_newest(&recent) {
        let removed = recent.remove(newest);
        debug!(file = %removed.name, "Skipping most recently written log file");
    }

    if let Some(pos) = recent.iter().position(|d| d.name == bootstrap_name) {
        recent.remove(pos);
        debug!(file = %bootstrap_name, "Skipping bootstrap log file");
    }

    recent.into_iter().map(|d| d.name.clone()).collect()
}

/// Position of the first descriptor holding the maximum `last_written`.
fn index_of_newest(descriptors: &[&LogFileDescriptor]) -> Option<usize> {
    let mut best: Option<(usize, DateTime<Utc>)> = None;
    for (i, d) in descriptors.iter().enumerate() {
        match best {
            Some((_, ts)) if d.last_written <= ts => {}
            _ => best = Some((i, d.last_written)),
        }
    }
    best.map(|(i, _)| i)
}

/// Lists an instance's log files and filters them down to the eligible set.
#[derive(Clone)]
pub struct LogCatalog {
    lister: Arc<dyn LogFileLister>,
    instance_id: String,
    retention: Duration,
    bootstrap_name: String,
}

impl std::fmt::Debug for LogCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogCatalog")
            .field("instance_id", &self.instance_id)
            .field("retention", &self.retention)
            .field("bootstrap_name", &self.bootstrap_name)
            .finish_non_exhaustive()
    }
}

impl LogCatalog {
    /// Create a catalog for the instance named in `config`.
    #[must_use]
    pub fn new(lister: Arc<dyn LogFileLister>, config: &ArchiverConfig) -> Self {
        Self {
            lister,
            instance_id: config.db_instance_identifier.clone(),
            retention: config.retention(),
            bootstrap_name: config.bootstrap_log_name.clone(),
        }
    }

    /// The retention threshold relative to `now`.
    #[must_use]
    pub fn threshold(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.retention
    }

    /// List and filter the files eligible for download as of `now`.
    pub async fn eligible_files(&self, now: DateTime<Utc>) -> ArchiverResult<Vec<String>> {
        let threshold = self.threshold(now);
        let listing = self
            .lister
            .list_log_files(&self.instance_id, threshold)
            .await?;
        let selected = select_log_files(&listing, threshold, &self.bootstrap_name);

        info!(
            instance = %self.instance_id,
            listed = listing.len(),
            selected = selected.len(),
            threshold = %threshold,
            "Selected log files for archival"
        );
        Ok(selected)
    }
}
