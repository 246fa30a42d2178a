//! The archival run: list, sign and fetch each file, archive, upload.
//!
//! A run is strictly sequential. Each eligible file is signed and fetched one at
//! a time, the archive is fully built and verified in memory, and only then is
//! it uploaded in a single request. Nothing is shared between runs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use logvault_auth::{CredentialProvider, RequestSigner};
use serde::Serialize;
use tracing::{info, warn};
use typed_builder::TypedBuilder;

use crate::archive::{Archive, ArchiveBuilder};
use crate::catalog::{LogCatalog, LogFileLister};
use crate::clock::{Clock, SystemClock};
use crate::config::{ArchiverConfig, DownloadPolicy};
use crate::download::{LogDownloader, LogFetcher};
use crate::error::{ArchiverError, ArchiverResult};
use crate::types::LogEndpoint;
use crate::uploader::{ColdStorage, ColdStorageUploader};

/// Outcome of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    /// Description the archive was uploaded under; `None` when nothing was uploaded.
    pub description: Option<String>,
    /// Number of files in the uploaded archive.
    pub files_archived: usize,
    /// Files left out under [`DownloadPolicy::SkipAndContinue`].
    pub skipped: Vec<String>,
    /// Compressed archive size in bytes.
    pub archive_bytes: u64,
    /// Identifier assigned by cold storage.
    pub archive_id: Option<String>,
    /// Where the local copy was written, if requested.
    pub local_copy: Option<PathBuf>,
}

impl RunReport {
    /// Whether an archive was uploaded.
    #[must_use]
    pub fn uploaded(&self) -> bool {
        self.archive_id.is_some()
    }

    /// Archive size in KiB, rounded down.
    #[must_use]
    pub fn archive_kib(&self) -> u64 {
        self.archive_bytes / 1024
    }
}

/// Archive description for a run of `instance_id` started at `instant`.
///
/// ```
/// use chrono::TimeZone;
/// use logvault_core::pipeline::archive_description;
///
/// let at = chrono::Utc.with_ymd_and_hms(2018, 5, 17, 4, 5, 6).unwrap();
/// assert_eq!(archive_description("db-1", at), "db-1/2018-05-17__04-05-06__UTC.tar.gz");
/// ```
#[must_use]
pub fn archive_description(instance_id: &str, instant: DateTime<Utc>) -> String {
    format!(
        "{instance_id}/{}.tar.gz",
        instant.format("%Y-%m-%d__%H-%M-%S__UTC")
    )
}

/// One archival run wired to its collaborators.
#[derive(TypedBuilder)]
pub struct Pipeline {
    /// Run configuration.
    config: ArchiverConfig,
    /// Region of the database instance.
    #[builder(setter(into))]
    region: String,
    /// Key material for signing downloads.
    credentials: Arc<dyn CredentialProvider>,
    /// Catalog listing backend.
    lister: Arc<dyn LogFileLister>,
    /// HTTP backend for presigned downloads.
    fetcher: Arc<dyn LogFetcher>,
    /// Cold-storage backend.
    storage: Arc<dyn ColdStorage>,
    /// Time source for thresholds, signatures and the archive description.
    #[builder(default = Arc::new(SystemClock) as Arc<dyn Clock>)]
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// The run configuration.
    #[must_use]
    pub fn config(&self) -> &ArchiverConfig {
        &self.config
    }

    /// Endpoint the log files are downloaded from.
    #[must_use]
    pub fn endpoint(&self) -> LogEndpoint {
        LogEndpoint {
            service: self.config.service.clone(),
            region: self.region.clone(),
            authority: self.config.endpoint_authority.clone(),
            instance_id: self.config.db_instance_identifier.clone(),
        }
    }

    /// Execute one run.
    ///
    /// The configuration is validated and credentials are resolved before the
    /// catalog is queried. An empty catalog still produces an (empty) archive
    /// and uploads it. Only when every download was skipped under
    /// [`DownloadPolicy::SkipAndContinue`] is nothing uploaded.
    ///
    /// # Errors
    ///
    /// Any [`ArchiverError`]; a failed run never uploads a partial archive unless
    /// [`DownloadPolicy::SkipAndContinue`] is configured.
    pub async fn run(&self) -> ArchiverResult<RunReport> {
        self.config.validate()?;
        let started = self.clock.now();
        let instance = self.config.db_instance_identifier.as_str();

        let signer = RequestSigner::new(
            Arc::clone(&self.credentials),
            &self.region,
            &self.config.service,
        );
        signer.ensure_credentials()?;

        let catalog = LogCatalog::new(Arc::clone(&self.lister), &self.config);
        let files = catalog.eligible_files(started).await?;
        if files.is_empty() {
            info!(instance, "No log files eligible for archival, uploading empty archive");
        }

        let downloader = LogDownloader::new(
            signer,
            Arc::clone(&self.fetcher),
            self.endpoint(),
            Arc::clone(&self.clock),
            self.config.presign_expires_secs,
        );

        let mut builder = ArchiveBuilder::new(started);
        let mut skipped = Vec::new();
        for name in &files {
            match downloader.download(name).await {
                Ok(entry) => builder.append(&entry)?,
                Err(err @ ArchiverError::DownloadFailure { .. })
                    if self.config.download_policy == DownloadPolicy::SkipAndContinue =>
                {
                    warn!(instance, file = %name, error = %err, "Skipping log file");
                    skipped.push(name.clone());
                }
                Err(err) => return Err(err),
            }
        }

        if builder.is_empty() && !skipped.is_empty() {
            warn!(instance, skipped = skipped.len(), "Every download failed, skipping upload");
            return Ok(RunReport {
                skipped,
                ..RunReport::default()
            });
        }

        let archive = builder.finish()?;
        let description = archive_description(instance, started);
        info!(
            instance,
            description = %description,
            files = archive.file_count(),
            size_kb = archive.len() / 1024,
            "Archive built"
        );

        let local_copy = match &self.config.local_copy_dir {
            Some(dir) => Some(write_local_copy(dir, &description, &archive).await?),
            None => None,
        };

        let uploader = ColdStorageUploader::new(
            Arc::clone(&self.storage),
            &self.config.glacier_vault_name,
        );
        let receipt = uploader.upload(&description, &archive).await?;

        Ok(RunReport {
            description: Some(receipt.description),
            files_archived: archive.file_count(),
            skipped,
            archive_bytes: archive.len(),
            archive_id: Some(receipt.archive_id),
            local_copy,
        })
    }
}

/// Write `archive` to `<dir>/<description>`, creating parent directories.
async fn write_local_copy(dir: &Path, description: &str, archive: &Archive) -> ArchiverResult<PathBuf> {
    let path = dir.join(description);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&path, archive.bytes()).await?;
    info!(path = %path.display(), size = archive.len(), "Wrote local archive copy");
    Ok(path)
}
