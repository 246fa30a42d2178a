//! Database log archival pipeline for logvault.
//!
//! Selects the log files of a database instance that are safe to snapshot,
//! downloads each one through a freshly presigned URL, packs them into a single
//! `.tar.gz` archive and uploads it to a cold-storage vault.
//!
//! # Architecture
//!
//! ```text
//! Pipeline::run
//!     |
//!     +--> LogCatalog (LogFileLister)        list + filter
//!     |
//!     +--> LogDownloader x N (RequestSigner + LogFetcher)
//!     |
//!     +--> ArchiveBuilder                    tar.gz, verified
//!     |
//!     +--> ColdStorageUploader (ColdStorage) single request
//! ```
//!
//! Every external system sits behind an object-safe trait so the pipeline can be
//! exercised without network access.

pub mod archive;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod download;
pub mod error;
pub mod pipeline;
pub mod types;
pub mod uploader;

pub use archive::{Archive, ArchiveBuilder, ArchiveEntry, ArchivedFile};
pub use catalog::{LogCatalog, LogFileLister, select_log_files};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ArchiverConfig, DownloadPolicy};
pub use download::{FetchedLog, HttpLogFetcher, LogDownloader, LogFetcher};
pub use error::{ArchiverError, ArchiverResult};
pub use pipeline::{Pipeline, RunReport, archive_description};
pub use types::{LogEndpoint, LogFileDescriptor};
pub use uploader::{
    ArchiveReceipt, ColdStorage, ColdStorageUploader, UploadArchiveRequest, UploadArchiveResponse,
};
