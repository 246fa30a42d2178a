//! logvault - archive database log files into cold storage.
//!
//! Lists the log files an RDS instance wrote during the retention window,
//! downloads each one through a SigV4 presigned URL, packs them into a single
//! `.tar.gz` and uploads it to a Glacier vault. Meant to be invoked on a
//! schedule; any failure exits non-zero and the next run starts over.
//!
//! # Usage
//!
//! ```text
//! DB_INSTANCE_IDENTIFIER=audit-db GLACIER_VAULT_NAME=audit-logs logvault
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `DB_INSTANCE_IDENTIFIER` | *(required)* | Instance whose logs are archived |
//! | `GLACIER_VAULT_NAME` | *(required)* | Destination vault |
//! | `AWS_REGION` | *(discovered)* | Region of the instance |
//! | `LOG_RETENTION_HOURS` | `24` | Ignore files last written before this window |
//! | `PRESIGN_EXPIRES_SECS` | `30` | Validity of each download URL |
//! | `DOWNLOAD_POLICY` | `abort` | `abort` or `skip` on a failed download |
//! | `LOCAL_ARCHIVE_DIR` | *(unset)* | Also write the archive here |
//! | `LOG_LEVEL` | `info` | Log level filter |
//! | `RUST_LOG` | *(unset)* | Fine-grained tracing filter (overrides `LOG_LEVEL`) |

mod aws;

use std::sync::Arc;

use anyhow::{Context, Result};
use aws_config::BehaviorVersion;
use aws_sdk_rds::config::Region;
use logvault_auth::StaticCredentialProvider;
use logvault_core::{ArchiverConfig, HttpLogFetcher, Pipeline};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::aws::{GlacierColdStorage, RdsLogLister};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the tracing subscriber.
///
/// Uses `RUST_LOG` if set, otherwise falls back to the `LOG_LEVEL` config value.
fn init_tracing(log_level: &str) -> Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(log_level)
            .with_context(|| format!("invalid log level filter: {log_level}"))?
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = ArchiverConfig::from_env().context("failed to load configuration")?;
    init_tracing(&config.log_level)?;
    config.validate()?;

    info!(
        instance = %config.db_instance_identifier,
        vault = %config.glacier_vault_name,
        retention_hours = config.retention_hours,
        download_policy = %config.download_policy,
        version = VERSION,
        "starting logvault",
    );

    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(region) = &config.region {
        loader = loader.region(Region::new(region.clone()));
    }
    let sdk_config = loader.load().await;

    let credentials = aws::resolve_credentials(&sdk_config)
        .await
        .map_err(logvault_core::ArchiverError::from)?;

    let rds = aws_sdk_rds::Client::new(&sdk_config);
    let region = match &config.region {
        Some(region) => region.clone(),
        None => {
            let region = aws::discover_region(&rds, &config.db_instance_identifier).await?;
            info!(region = %region, "discovered instance region");
            region
        }
    };

    let glacier_config = aws_sdk_glacier::config::Builder::from(&sdk_config)
        .region(aws_sdk_glacier::config::Region::new(region.clone()))
        .build();

    let pipeline = Pipeline::builder()
        .config(config)
        .region(region)
        .credentials(Arc::new(StaticCredentialProvider::from_credentials(credentials)))
        .lister(Arc::new(RdsLogLister::new(rds)))
        .fetcher(Arc::new(HttpLogFetcher::new()?))
        .storage(Arc::new(GlacierColdStorage::new(
            aws_sdk_glacier::Client::from_conf(glacier_config),
        )))
        .build();

    let report = match pipeline.run().await {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, "archival run failed");
            return Err(e.into());
        }
    };

    if let Some(archive_id) = &report.archive_id {
        info!(
            archive_id = %archive_id,
            description = report.description.as_deref().unwrap_or_default(),
            "archive stored",
        );
    }
    println!("Archive has: {} files", report.files_archived);
    println!("Archive size: {} KB", report.archive_kib());
    if !report.skipped.is_empty() {
        println!("Skipped: {}", report.skipped.join(", "));
    }

    Ok(())
}
