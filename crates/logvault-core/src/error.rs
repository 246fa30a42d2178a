//! Error types for the archival pipeline.
//!
//! Every failure the pipeline can hit is represented by [`ArchiverError`]. None
//! of them are retried internally; the caller (a scheduler, a shell, a cron
//! job) decides whether to re-run.

use logvault_auth::AuthError;

/// Archival pipeline error type.
#[derive(Debug, thiserror::Error)]
pub enum ArchiverError {
    /// Signing key material could not be resolved. Raised before any network I/O.
    #[error("credentials unavailable: {reason}")]
    CredentialsUnavailable {
        /// Why the credentials could not be resolved.
        reason: String,
    },

    /// The catalog listing for the instance failed.
    #[error("failed to list log files for {instance}: {reason}")]
    Catalog {
        /// The database instance identifier.
        instance: String,
        /// Underlying failure.
        reason: String,
    },

    /// A log file could not be retrieved (transport error or non-success status).
    #[error("failed to download log file {file}: {reason}")]
    DownloadFailure {
        /// The log file name.
        file: String,
        /// Underlying failure.
        reason: String,
    },

    /// An archive entry's declared size does not match the bytes written.
    #[error("archive entry {path} declared {declared} bytes but holds {actual}")]
    ArchiveCorruption {
        /// The entry path inside the archive.
        path: String,
        /// The size recorded for the entry.
        declared: u64,
        /// The size actually present.
        actual: u64,
    },

    /// The cold-storage response carried no archive identifier.
    #[error("failed to upload archive {description}: no archive id in response")]
    UploadFailed {
        /// The archive description used as its logical identifier.
        description: String,
    },

    /// The upload request itself failed before a response was obtained.
    #[error("failed to upload archive {description}: {reason}")]
    UploadTransport {
        /// The archive description used as its logical identifier.
        description: String,
        /// Underlying failure.
        reason: String,
    },

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Local I/O failure (archive staging, local copy).
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Internal error with context.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<AuthError> for ArchiverError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::CredentialsUnavailable { reason } => Self::CredentialsUnavailable { reason },
            AuthError::InvalidTarget(reason) => {
                Self::Internal(anyhow::anyhow!("invalid signing target: {reason}"))
            }
        }
    }
}

/// Convenience result type for pipeline operations.
pub type ArchiverResult<T> = Result<T, ArchiverError>;
