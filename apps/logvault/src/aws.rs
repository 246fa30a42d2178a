//! AWS SDK adapters for the pipeline's collaborator traits.

use async_trait::async_trait;
use aws_credential_types::provider::ProvideCredentials;
use chrono::{DateTime, Utc};
use logvault_auth::{AuthError, CredentialProvider, Credentials, EnvCredentialProvider};
use logvault_core::{
    ArchiverError, ArchiverResult, ColdStorage, LogFileDescriptor, LogFileLister,
    UploadArchiveRequest, UploadArchiveResponse,
};
use tracing::{debug, warn};

/// Resolve signing credentials from the SDK's default provider chain.
///
/// Falls back to the plain `AWS_*` environment variables when the chain is not
/// configured at all.
pub async fn resolve_credentials(
    sdk_config: &aws_config::SdkConfig,
) -> Result<Credentials, AuthError> {
    let Some(provider) = sdk_config.credentials_provider() else {
        warn!("no credential provider configured, reading environment variables");
        return EnvCredentialProvider::default().credentials();
    };

    let resolved = provider
        .provide_credentials()
        .await
        .map_err(|e| AuthError::credentials_unavailable(e.to_string()))?;

    let credentials = Credentials::new(resolved.access_key_id(), resolved.secret_access_key());
    Ok(match resolved.session_token() {
        Some(token) => credentials.with_session_token(token),
        None => credentials,
    })
}

/// Region component of an ARN (`arn:partition:service:region:account:resource`).
pub fn region_from_arn(arn: &str) -> Option<&str> {
    arn.split(':').nth(3).filter(|region| !region.is_empty())
}

/// Look up the region a database instance lives in.
pub async fn discover_region(
    client: &aws_sdk_rds::Client,
    instance_id: &str,
) -> ArchiverResult<String> {
    let output = client
        .describe_db_instances()
        .db_instance_identifier(instance_id)
        .send()
        .await
        .map_err(|e| ArchiverError::Catalog {
            instance: instance_id.to_owned(),
            reason: aws_sdk_rds::error::DisplayErrorContext(&e).to_string(),
        })?;

    let arn = output
        .db_instances()
        .first()
        .and_then(|instance| instance.db_instance_arn())
        .ok_or_else(|| ArchiverError::Catalog {
            instance: instance_id.to_owned(),
            reason: "instance has no ARN".to_owned(),
        })?;

    region_from_arn(arn)
        .map(str::to_owned)
        .ok_or_else(|| ArchiverError::Config(format!("cannot derive region from ARN {arn}")))
}

/// [`LogFileLister`] over `DescribeDBLogFiles`.
#[derive(Debug, Clone)]
pub struct RdsLogLister {
    client: aws_sdk_rds::Client,
}

impl RdsLogLister {
    /// Wrap an RDS client.
    pub fn new(client: aws_sdk_rds::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LogFileLister for RdsLogLister {
    async fn list_log_files(
        &self,
        instance_id: &str,
        written_after: DateTime<Utc>,
    ) -> ArchiverResult<Vec<LogFileDescriptor>> {
        let mut files = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let output = self
                .client
                .describe_db_log_files()
                .db_instance_identifier(instance_id)
                .file_last_written(written_after.timestamp_millis())
                .set_marker(marker.take())
                .send()
                .await
                .map_err(|e| ArchiverError::Catalog {
                    instance: instance_id.to_owned(),
                    reason: aws_sdk_rds::error::DisplayErrorContext(&e).to_string(),
                })?;

            for detail in output.describe_db_log_files() {
                match (detail.log_file_name(), detail.last_written()) {
                    (Some(name), Some(millis)) => {
                        if let Some(descriptor) = LogFileDescriptor::from_millis(name, millis) {
                            files.push(descriptor);
                        }
                    }
                    _ => debug!(?detail, "Ignoring incomplete log file entry"),
                }
            }

            match output.marker() {
                Some(next) if !next.is_empty() => marker = Some(next.to_owned()),
                _ => break,
            }
        }

        Ok(files)
    }
}

/// [`ColdStorage`] over Glacier `UploadArchive`.
#[derive(Debug, Clone)]
pub struct GlacierColdStorage {
    client: aws_sdk_glacier::Client,
}

impl GlacierColdStorage {
    /// Wrap a Glacier client.
    pub fn new(client: aws_sdk_glacier::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ColdStorage for GlacierColdStorage {
    async fn upload_archive(
        &self,
        request: UploadArchiveRequest,
    ) -> anyhow::Result<UploadArchiveResponse> {
        let output = self
            .client
            .upload_archive()
            .account_id("-")
            .vault_name(request.vault_name)
            .archive_description(request.description)
            .body(aws_sdk_glacier::primitives::ByteStream::from(request.body))
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("{}", aws_sdk_glacier::error::DisplayErrorContext(&e)))?;

        Ok(UploadArchiveResponse {
            archive_id: output.archive_id().map(str::to_owned),
            location: output.location().map(str::to_owned),
            checksum: output.checksum().map(str::to_owned),
        })
    }
}
