//! Signed retrieval of individual log files.
//!
//! Every file gets its own presigned URL, signed at the instant the download
//! starts. A URL signed for one file is never reused for the next one since its
//! validity window is only a few seconds long.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use logvault_auth::{PresignTarget, RequestSigner};
use tracing::{debug, warn};

use crate::archive::ArchiveEntry;
use crate::clock::Clock;
use crate::error::{ArchiverError, ArchiverResult};
use crate::types::LogEndpoint;

/// Default per-request timeout of [`HttpLogFetcher`].
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(300);

/// Raw body of a downloaded log file.
#[derive(Debug, Clone)]
pub struct FetchedLog {
    /// Response body.
    pub body: Bytes,
    /// Length announced by the server, if any.
    pub content_length: Option<u64>,
}

/// Performs the unauthenticated GET of a presigned URL.
#[async_trait::async_trait]
pub trait LogFetcher: Send + Sync {
    /// Fetch `url`, which authorizes the download of `file_name`.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiverError::DownloadFailure`] on transport errors and
    /// non-success statuses.
    async fn fetch(&self, file_name: &str, url: &str) -> ArchiverResult<FetchedLog>;
}

/// [`LogFetcher`] backed by a `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpLogFetcher {
    client: reqwest::Client,
}

impl HttpLogFetcher {
    /// Create a fetcher with the default timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiverError::Internal`] if the HTTP client cannot be built.
    pub fn new() -> ArchiverResult<Self> {
        Self::with_timeout(DEFAULT_HTTP_TIMEOUT)
    }

    /// Create a fetcher whose requests time out after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiverError::Internal`] if the HTTP client cannot be built.
    pub fn with_timeout(timeout: Duration) -> ArchiverResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build HTTP client: {e}"))?;
        Ok(Self { client })
    }

    /// Wrap an existing client.
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl LogFetcher for HttpLogFetcher {
    async fn fetch(&self, file_name: &str, url: &str) -> ArchiverResult<FetchedLog> {
        let failure = |reason: String| ArchiverError::DownloadFailure {
            file: file_name.to_owned(),
            reason,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| failure(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(256).collect();
            return Err(failure(format!("HTTP {status}: {snippet}")));
        }

        let content_length = response.content_length();
        let body = response
            .bytes()
            .await
            .map_err(|e| failure(format!("failed to read body: {e}")))?;

        Ok(FetchedLog {
            body,
            content_length,
        })
    }
}

/// Signs and fetches log files one at a time.
#[derive(Clone)]
pub struct LogDownloader {
    signer: RequestSigner,
    fetcher: Arc<dyn LogFetcher>,
    endpoint: LogEndpoint,
    clock: Arc<dyn Clock>,
    expires_secs: u64,
}

impl std::fmt::Debug for LogDownloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogDownloader")
            .field("signer", &self.signer)
            .field("endpoint", &self.endpoint)
            .field("expires_secs", &self.expires_secs)
            .finish_non_exhaustive()
    }
}

impl LogDownloader {
    /// Create a downloader for `endpoint`.
    #[must_use]
    pub fn new(
        signer: RequestSigner,
        fetcher: Arc<dyn LogFetcher>,
        endpoint: LogEndpoint,
        clock: Arc<dyn Clock>,
        expires_secs: u64,
    ) -> Self {
        Self {
            signer,
            fetcher,
            endpoint,
            clock,
            expires_secs,
        }
    }

    /// The endpoint files are downloaded from.
    #[must_use]
    pub fn endpoint(&self) -> &LogEndpoint {
        &self.endpoint
    }

    /// Sign a fresh URL for `file_name` and download it.
    ///
    /// The returned entry declares the size announced by the server when one was
    /// sent, so a truncated body is caught when the entry is archived.
    ///
    /// # Errors
    ///
    /// - [`ArchiverError::CredentialsUnavailable`] before any request is sent
    /// - [`ArchiverError::DownloadFailure`] for transport or HTTP failures
    pub async fn download(&self, file_name: &str) -> ArchiverResult<ArchiveEntry> {
        let target = PresignTarget::get(self.endpoint.host(), self.endpoint.download_path(file_name))
            .with_expires(self.expires_secs);
        let presigned = self.signer.presign(&target, self.clock.now())?;

        debug!(
            file = %file_name,
            amz_date = %presigned.amz_date,
            "Downloading log file"
        );

        let fetched = self.fetcher.fetch(file_name, &presigned.url).await?;
        let actual = fetched.body.len() as u64;
        let entry = ArchiveEntry::new(file_name, fetched.body);

        match fetched.content_length {
            Some(declared) => {
                if declared != actual {
                    warn!(
                        file = %file_name,
                        declared,
                        actual,
                        "Downloaded body length differs from Content-Length"
                    );
                }
                Ok(entry.with_declared_size(declared))
            }
            None => Ok(entry),
        }
    }
}
