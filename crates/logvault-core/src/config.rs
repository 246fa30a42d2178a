//! Pipeline configuration.
//!
//! Provides [`ArchiverConfig`], the single value that carries every tunable of a
//! run. The pipeline never reads the environment itself; the binary builds the
//! config once via [`ArchiverConfig::from_env`] and passes it down.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::error::ArchiverError;

/// What to do when a single log file cannot be downloaded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DownloadPolicy {
    /// Abort the whole run; no partial archive is uploaded.
    #[default]
    Abort,
    /// Log the failure, leave the file out and archive the rest.
    SkipAndContinue,
}

impl FromStr for DownloadPolicy {
    type Err = ArchiverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abort" => Ok(Self::Abort),
            "skip" | "skip-and-continue" | "continue" => Ok(Self::SkipAndContinue),
            other => Err(ArchiverError::Config(format!(
                "unknown download policy: {other} (expected abort or skip)"
            ))),
        }
    }
}

impl fmt::Display for DownloadPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Abort => f.write_str("abort"),
            Self::SkipAndContinue => f.write_str("skip-and-continue"),
        }
    }
}

/// Archival pipeline configuration.
///
/// # Examples
///
/// ```
/// use logvault_core::config::ArchiverConfig;
///
/// let config = ArchiverConfig::builder()
///     .db_instance_identifier("db-1")
///     .glacier_vault_name("audit-logs")
///     .build();
/// assert_eq!(config.retention_hours, 24);
/// assert_eq!(config.presign_expires_secs, 30);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct ArchiverConfig {
    /// Database instance whose logs are archived.
    #[builder(setter(into))]
    pub db_instance_identifier: String,

    /// Cold-storage vault receiving the archive.
    #[builder(setter(into))]
    pub glacier_vault_name: String,

    /// Region of the database instance. `None` means "discover from the instance".
    #[builder(default, setter(strip_option, into))]
    pub region: Option<String>,

    /// Service name used in the credential scope and host name.
    #[builder(default = String::from("rds"), setter(into))]
    pub service: String,

    /// DNS suffix of the service endpoint.
    #[builder(default = String::from("amazonaws.com"), setter(into))]
    pub endpoint_authority: String,

    /// Files last written before `now - retention_hours` are ignored.
    #[builder(default = 24)]
    pub retention_hours: u32,

    /// Validity window of each presigned download URL.
    #[builder(default = 30)]
    pub presign_expires_secs: u64,

    /// Name of the bootstrap log that is never archived.
    #[builder(default = String::from("error/postgres.log"), setter(into))]
    pub bootstrap_log_name: String,

    /// Behaviour when one download fails.
    #[builder(default)]
    pub download_policy: DownloadPolicy,

    /// Directory receiving a local copy of the archive before upload.
    #[builder(default, setter(strip_option, into))]
    pub local_copy_dir: Option<PathBuf>,

    /// Log level filter string (e.g. `"info"`, `"debug"`).
    #[builder(default = String::from("info"), setter(into))]
    pub log_level: String,
}

impl Default for ArchiverConfig {
    fn default() -> Self {
        Self {
            db_instance_identifier: String::new(),
            glacier_vault_name: String::new(),
            region: None,
            service: String::from("rds"),
            endpoint_authority: String::from("amazonaws.com"),
            retention_hours: 24,
            presign_expires_secs: 30,
            bootstrap_log_name: String::from("error/postgres.log"),
            download_policy: DownloadPolicy::Abort,
            local_copy_dir: None,
            log_level: String::from("info"),
        }
    }
}

impl ArchiverConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `DB_INSTANCE_IDENTIFIER` | *(required)* |
    /// | `GLACIER_VAULT_NAME` | *(required)* |
    /// | `AWS_REGION` / `AWS_DEFAULT_REGION` | *(discovered)* |
    /// | `LOG_SERVICE` | `rds` |
    /// | `ENDPOINT_AUTHORITY` | `amazonaws.com` |
    /// | `LOG_RETENTION_HOURS` | `24` |
    /// | `PRESIGN_EXPIRES_SECS` | `30` |
    /// | `BOOTSTRAP_LOG_NAME` | `error/postgres.log` |
    /// | `DOWNLOAD_POLICY` | `abort` |
    /// | `LOCAL_ARCHIVE_DIR` | *(unset)* |
    /// | `LOG_LEVEL` | `info` |
    ///
    /// # Errors
    ///
    /// Returns [`ArchiverError::Config`] when a numeric or enum variable does not parse.
    pub fn from_env() -> Result<Self, ArchiverError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiverError::Config`] when a numeric or enum variable does not parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ArchiverError> {
        let mut config = Self::default();

        if let Some(v) = lookup("DB_INSTANCE_IDENTIFIER") {
            config.db_instance_identifier = v;
        }
        if let Some(v) = lookup("GLACIER_VAULT_NAME") {
            config.glacier_vault_name = v;
        }
        if let Some(v) = lookup("AWS_REGION").or_else(|| lookup("AWS_DEFAULT_REGION")) {
            if !v.is_empty() {
                config.region = Some(v);
            }
        }
        if let Some(v) = lookup("LOG_SERVICE") {
            config.service = v;
        }
        if let Some(v) = lookup("ENDPOINT_AUTHORITY") {
            config.endpoint_authority = v;
        }
        if let Some(v) = lookup("LOG_RETENTION_HOURS") {
            config.retention_hours = parse_number("LOG_RETENTION_HOURS", &v)?;
        }
        if let Some(v) = lookup("PRESIGN_EXPIRES_SECS") {
            config.presign_expires_secs = parse_number("PRESIGN_EXPIRES_SECS", &v)?;
        }
        if let Some(v) = lookup("BOOTSTRAP_LOG_NAME") {
            config.bootstrap_log_name = v;
        }
        if let Some(v) = lookup("DOWNLOAD_POLICY") {
            config.download_policy = v.parse()?;
        }
        if let Some(v) = lookup("LOCAL_ARCHIVE_DIR") {
            if !v.is_empty() {
                config.local_copy_dir = Some(PathBuf::from(v));
            }
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            config.log_level = v;
        }

        Ok(config)
    }

    /// Check the fields a run cannot do without.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiverError::Config`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ArchiverError> {
        if self.db_instance_identifier.trim().is_empty() {
            return Err(ArchiverError::Config(
                "DB_INSTANCE_IDENTIFIER must be set".to_owned(),
            ));
        }
        if self.glacier_vault_name.trim().is_empty() {
            return Err(ArchiverError::Config(
                "GLACIER_VAULT_NAME must be set".to_owned(),
            ));
        }
        if self.presign_expires_secs == 0 {
            return Err(ArchiverError::Config(
                "PRESIGN_EXPIRES_SECS must be positive".to_owned(),
            ));
        }
        if self.service.is_empty() || self.endpoint_authority.is_empty() {
            return Err(ArchiverError::Config(
                "service and endpoint authority must be non-empty".to_owned(),
            ));
        }
        Ok(())
    }

    /// Retention window as a [`chrono::Duration`].
    #[must_use]
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.retention_hours))
    }
}

fn parse_number<T: FromStr>(name: &str, value: &str) -> Result<T, ArchiverError> {
    value
        .trim()
        .parse()
        .map_err(|_| ArchiverError::Config(format!("{name} is not a valid number: {value}")))
}
