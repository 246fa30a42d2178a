//! End-to-end tests for the logvault pipeline.
//!
//! The log-download endpoint is played by a tiny HTTP server bound to a random
//! local port; every request it receives is recorded so tests can check the
//! presigned query strings. The catalog listing and cold storage are in-memory
//! fakes. Nothing here needs AWS access.
//!
//! ```text
//! cargo test -p logvault-integration
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Once};

use chrono::{DateTime, NaiveDateTime, Utc};
use logvault_auth::canonical::build_canonical_request;
use logvault_auth::{Credentials, SigningContext, hash_payload};
use logvault_core::{
    ArchiverResult, ColdStorage, FetchedLog, HttpLogFetcher, LogFetcher, LogFileDescriptor,
    LogFileLister, UploadArchiveRequest, UploadArchiveResponse,
};
use parking_lot::Mutex;
use percent_encoding::percent_decode_str;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

static INIT: Once = Once::new();

/// Access key used by every test signer.
pub const ACCESS_KEY: &str = "AKIDEXAMPLE";
/// Secret key used by every test signer.
pub const SECRET_KEY: &str = "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY";
/// Instance whose logs the tests archive.
pub const INSTANCE: &str = "audit-db";
/// Region the tests sign for.
pub const REGION: &str = "us-east-1";
/// Host the presigned URLs are issued for.
pub const RDS_HOST: &str = "rds.us-east-1.amazonaws.com";

/// Initialize tracing (once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

/// Request path of a log file on the download endpoint.
#[must_use]
pub fn download_path(file_name: &str) -> String {
    format!("/v13/downloadCompleteLogFile/{INSTANCE}/{file_name}")
}

/// A local stand-in for the log-download endpoint.
///
/// Known paths answer `200` with the file body; anything else answers `403`,
/// like the real service does for a bad signature.
#[derive(Debug)]
pub struct LogServer {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<String>>>,
    handle: JoinHandle<()>,
}

impl LogServer {
    /// Serve `files`, keyed by log file name.
    pub async fn start(files: &[(&str, &[u8])]) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind local listener");
        let addr = listener.local_addr().expect("local addr");
        let routes: Arc<HashMap<String, Vec<u8>>> = Arc::new(
            files
                .iter()
                .map(|(name, body)| (download_path(name), body.to_vec()))
                .collect(),
        );
        let requests = Arc::new(Mutex::new(Vec::new()));

        let handle = tokio::spawn({
            let requests = Arc::clone(&requests);
            async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let routes = Arc::clone(&routes);
                    let requests = Arc::clone(&requests);
                    tokio::spawn(async move {
                        if let Err(e) = serve_one(stream, &routes, &requests).await {
                            tracing::warn!(error = %e, "log server connection failed");
                        }
                    });
                }
            }
        });

        Self {
            addr,
            requests,
            handle,
        }
    }

    /// `http://127.0.0.1:<port>`.
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Request targets (path and query) received so far, in arrival order.
    #[must_use]
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }
}

impl Drop for LogServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve_one(
    mut stream: TcpStream,
    routes: &HashMap<String, Vec<u8>>,
    requests: &Mutex<Vec<String>>,
) -> std::io::Result<()> {
    let mut head = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        head.extend_from_slice(&chunk[..n]);
        if head.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }

    let head = String::from_utf8_lossy(&head);
    let target = head.split_whitespace().nth(1).unwrap_or("/").to_owned();
    requests.lock().push(target.clone());
    tracing::debug!(target = %target, "log server request");

    let path = target.split('?').next().unwrap_or_default();
    let (status, body): (&str, &[u8]) = match routes.get(path) {
        Some(body) => ("200 OK", body),
        None => ("403 Forbidden", b"<Error><Code>SignatureDoesNotMatch</Code></Error>"),
    };

    let header = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    stream.write_all(header.as_bytes()).await?;
    stream.write_all(body).await?;
    stream.shutdown().await?;
    Ok(())
}

/// [`LogFetcher`] that sends presigned URLs to a [`LogServer`] instead of AWS.
///
/// Only the scheme and authority are rewritten; the signed path and query are
/// sent unchanged through a real [`HttpLogFetcher`].
#[derive(Debug)]
pub struct LocalFetcher {
    inner: HttpLogFetcher,
    origin: String,
    base_url: String,
}

impl LocalFetcher {
    /// Redirect `https://{RDS_HOST}` to `server`.
    #[must_use]
    pub fn new(server: &LogServer) -> Self {
        Self {
            inner: HttpLogFetcher::new().expect("build HTTP client"),
            origin: format!("https://{RDS_HOST}"),
            base_url: server.base_url(),
        }
    }
}

#[async_trait::async_trait]
impl LogFetcher for LocalFetcher {
    async fn fetch(&self, file_name: &str, url: &str) -> ArchiverResult<FetchedLog> {
        assert!(url.starts_with(&self.origin), "unexpected origin in {url}");
        let local = url.replacen(&self.origin, &self.base_url, 1);
        self.inner.fetch(file_name, &local).await
    }
}

/// Catalog listing served from memory.
#[derive(Debug, Default)]
pub struct MemoryLister {
    listing: Vec<LogFileDescriptor>,
}

impl MemoryLister {
    /// Answer every listing with `listing`.
    #[must_use]
    pub fn new(listing: Vec<LogFileDescriptor>) -> Self {
        Self { listing }
    }
}

#[async_trait::async_trait]
impl LogFileLister for MemoryLister {
    async fn list_log_files(
        &self,
        _instance_id: &str,
        written_after: DateTime<Utc>,
    ) -> ArchiverResult<Vec<LogFileDescriptor>> {
        Ok(self
            .listing
            .iter()
            .filter(|d| d.last_written >= written_after)
            .cloned()
            .collect())
    }
}

/// Cold storage that keeps every upload in memory.
#[derive(Debug, Default)]
pub struct MemoryVault {
    uploads: Mutex<Vec<UploadArchiveRequest>>,
}

impl MemoryVault {
    /// Uploads received so far.
    #[must_use]
    pub fn uploads(&self) -> Vec<UploadArchiveRequest> {
        self.uploads.lock().clone()
    }
}

#[async_trait::async_trait]
impl ColdStorage for MemoryVault {
    async fn upload_archive(
        &self,
        request: UploadArchiveRequest,
    ) -> anyhow::Result<UploadArchiveResponse> {
        let mut uploads = self.uploads.lock();
        uploads.push(request);
        Ok(UploadArchiveResponse {
            archive_id: Some(format!("archive-{}", uploads.len())),
            location: None,
            checksum: None,
        })
    }
}

/// Query parameters of a request target, percent-decoded, in wire order.
#[must_use]
pub fn query_params(target: &str) -> Vec<(String, String)> {
    let Some((_, query)) = target.split_once('?') else {
        return Vec::new();
    };
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| {
            (
                percent_decode_str(k).decode_utf8_lossy().into_owned(),
                percent_decode_str(v).decode_utf8_lossy().into_owned(),
            )
        })
        .collect()
}

/// Recompute the signature of a presigned request target the way the service
/// would, and compare it with the one the request carries.
#[must_use]
pub fn signature_is_valid(target: &str, host: &str, secret_key: &str) -> bool {
    let path = target.split('?').next().unwrap_or_default();
    let params = query_params(target);

    let Some(signature) = param(&params, "X-Amz-Signature") else {
        return false;
    };
    let Some(date) = param(&params, "X-Amz-Date")
        .and_then(|d| NaiveDateTime::parse_from_str(d, "%Y%m%dT%H%M%SZ").ok())
    else {
        return false;
    };
    let Some(credential) = param(&params, "X-Amz-Credential") else {
        return false;
    };
    let scope: Vec<&str> = credential.split('/').collect();
    if scope.len() != 5 {
        return false;
    }

    let mut credentials = Credentials::new(scope[0], secret_key);
    if let Some(token) = param(&params, "X-Amz-Security-Token") {
        credentials = credentials.with_session_token(token);
    }
    let ctx = SigningContext::new(credentials, scope[2], scope[3], date.and_utc());

    let unsigned: Vec<(&str, &str)> = params
        .iter()
        .filter(|(k, _)| k != "X-Amz-Signature")
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    let canonical = build_canonical_request(
        "GET",
        path,
        &unsigned,
        &[("host", host)],
        &["host"],
        &hash_payload(b""),
    );
    let (_, expected) = ctx.sign(&canonical);
    expected == signature
}

fn param<'a>(params: &'a [(String, String)], name: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

mod test_pipeline;
mod test_presign;
