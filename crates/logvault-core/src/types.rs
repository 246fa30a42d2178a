//! Domain types shared across the pipeline stages.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A remote log file as reported by the catalog listing.
///
/// An immutable snapshot; it is never written back anywhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogFileDescriptor {
    /// File name relative to the instance's log directory, e.g. `error/postgresql.log.2024-01-01-00`.
    pub name: String,
    /// Last time the database wrote to the file.
    pub last_written: DateTime<Utc>,
}

impl LogFileDescriptor {
    /// Create a descriptor.
    #[must_use]
    pub fn new(name: impl Into<String>, last_written: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            last_written,
        }
    }

    /// Create a descriptor from a Unix timestamp in milliseconds, as the
    /// listing API reports it. Returns `None` for out-of-range timestamps.
    #[must_use]
    pub fn from_millis(name: impl Into<String>, millis: i64) -> Option<Self> {
        DateTime::from_timestamp_millis(millis).map(|ts| Self::new(name, ts))
    }
}

/// Where the signed log-download endpoint lives.
///
/// `GET https://{service}.{region}.{authority}/v13/downloadCompleteLogFile/{instance}/{file}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEndpoint {
    /// Service name, e.g. `rds`.
    pub service: String,
    /// Region, e.g. `us-east-1`.
    pub region: String,
    /// DNS suffix, e.g. `amazonaws.com`.
    pub authority: String,
    /// Database instance identifier.
    pub instance_id: String,
}

impl LogEndpoint {
    /// REST API version segment of the download path.
    pub const API_VERSION: &str = "v13";

    /// Host name of the endpoint.
    #[must_use]
    pub fn host(&self) -> String {
        format!("{}.{}.{}", self.service, self.region, self.authority)
    }

    /// Request path for one log file.
    #[must_use]
    pub fn download_path(&self, file_name: &str) -> String {
        format!(
            "/{}/downloadCompleteLogFile/{}/{}",
            Self::API_VERSION,
            self.instance_id,
            file_name.trim_start_matches('/')
        )
    }
}

impl fmt::Display for LogEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "https://{}", self.host())
    }
}
