//! Single-request upload of a finished archive to cold storage.
//!
//! An upload is considered successful only when the response carries an
//! archive id. Nothing is retried here: a failed run may be re-invoked as a
//! whole, at the price of a possible duplicate archive in the vault.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{error, info};

use crate::archive::Archive;
use crate::error::{ArchiverError, ArchiverResult};

/// A request to store one archive.
#[derive(Debug, Clone)]
pub struct UploadArchiveRequest {
    /// Target vault.
    pub vault_name: String,
    /// Free-form description, used as the archive's logical name.
    pub description: String,
    /// Archive content.
    pub body: Bytes,
}

/// What the cold-storage service answered.
#[derive(Debug, Clone, Default)]
pub struct UploadArchiveResponse {
    /// Identifier of the stored archive. Absent means the upload did not happen.
    pub archive_id: Option<String>,
    /// Resource location reported by the service.
    pub location: Option<String>,
    /// Checksum computed by the service.
    pub checksum: Option<String>,
}

/// A cold-storage backend.
#[async_trait::async_trait]
pub trait ColdStorage: Send + Sync {
    /// Send one upload request.
    ///
    /// # Errors
    ///
    /// Any transport or service error; the uploader reports it as
    /// [`ArchiverError::UploadTransport`].
    async fn upload_archive(
        &self,
        request: UploadArchiveRequest,
    ) -> anyhow::Result<UploadArchiveResponse>;
}

/// Proof that an archive reached cold storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveReceipt {
    /// Identifier assigned by the service.
    pub archive_id: String,
    /// Description the archive was stored under.
    pub description: String,
    /// Uploaded size in bytes.
    pub size: u64,
    /// Resource location, when reported.
    pub location: Option<String>,
}

/// Uploads archives into one vault.
#[derive(Clone)]
pub struct ColdStorageUploader {
    storage: Arc<dyn ColdStorage>,
    vault_name: String,
}

impl std::fmt::Debug for ColdStorageUploader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ColdStorageUploader")
            .field("vault_name", &self.vault_name)
            .finish_non_exhaustive()
    }
}

impl ColdStorageUploader {
    /// Create an uploader targeting `vault_name`.
    #[must_use]
    pub fn new(storage: Arc<dyn ColdStorage>, vault_name: impl Into<String>) -> Self {
        Self {
            storage,
            vault_name: vault_name.into(),
        }
    }

    /// The target vault.
    #[must_use]
    pub fn vault_name(&self) -> &str {
        &self.vault_name
    }

    /// Upload `archive` under `description`.
    ///
    /// # Errors
    ///
    /// - [`ArchiverError::UploadTransport`] if the request fails
    /// - [`ArchiverError::UploadFailed`] if the response has no archive id
    pub async fn upload(&self, description: &str, archive: &Archive) -> ArchiverResult<ArchiveReceipt> {
        let request = UploadArchiveRequest {
            vault_name: self.vault_name.clone(),
            description: description.to_owned(),
            body: archive.bytes().clone(),
        };

        let response = self.storage.upload_archive(request).await.map_err(|e| {
            error!(description, vault = %self.vault_name, error = %e, "Archive upload request failed");
            ArchiverError::UploadTransport {
                description: description.to_owned(),
                reason: format!("{e:#}"),
            }
        })?;

        let Some(archive_id) = response.archive_id.filter(|id| !id.is_empty()) else {
            error!(description, vault = %self.vault_name, "Upload response carried no archive id");
            return Err(ArchiverError::UploadFailed {
                description: description.to_owned(),
            });
        };

        info!(
            description,
            vault = %self.vault_name,
            archive_id = %archive_id,
            size = archive.len(),
            "Uploaded archive"
        );
        Ok(ArchiveReceipt {
            archive_id,
            description: description.to_owned(),
            size: archive.len(),
            location: response.location,
        })
    }
}
