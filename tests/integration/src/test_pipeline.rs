//! Full archival runs against the local log server.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{DateTime, Duration, TimeZone, Utc};
    use logvault_auth::StaticCredentialProvider;
    use logvault_core::{
        Archive, ArchiveEntry, ArchiverConfig, ArchiverError, DownloadPolicy,
        LogFileDescriptor, ManualClock, Pipeline,
    };

    use crate::{
        ACCESS_KEY, INSTANCE, LocalFetcher, LogServer, MemoryLister, MemoryVault, RDS_HOST,
        REGION, SECRET_KEY, init_tracing, query_params, signature_is_valid,
    };

    const OLDEST: &str = "error/postgresql.log.2024-06-10-07";
    const OLDER: &str = "error/postgresql.log.2024-06-10-08";
    const CURRENT: &str = "error/postgresql.log.2024-06-10-09";
    const BOOTSTRAP: &str = "error/postgres.log";

    fn started() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 10, 9, 30, 0).unwrap()
    }

    fn listing() -> Vec<LogFileDescriptor> {
        vec![
            LogFileDescriptor::new("error/postgresql.log.2024-06-08-07", started() - Duration::hours(50)),
            LogFileDescriptor::new(OLDEST, started() - Duration::minutes(150)),
            LogFileDescriptor::new(BOOTSTRAP, started() - Duration::hours(2)),
            LogFileDescriptor::new(OLDER, started() - Duration::minutes(90)),
            LogFileDescriptor::new(CURRENT, started() - Duration::minutes(1)),
        ]
    }

    fn config(policy: DownloadPolicy) -> ArchiverConfig {
        ArchiverConfig::builder()
            .db_instance_identifier(INSTANCE)
            .glacier_vault_name("audit-logs")
            .download_policy(policy)
            .build()
    }

    fn pipeline(config: ArchiverConfig, server: &LogServer, vault: &Arc<MemoryVault>) -> Pipeline {
        Pipeline::builder()
            .config(config)
            .region(REGION)
            .credentials(Arc::new(StaticCredentialProvider::new(ACCESS_KEY, SECRET_KEY)))
            .lister(Arc::new(MemoryLister::new(listing())))
            .fetcher(Arc::new(LocalFetcher::new(server)))
            .storage(vault.clone())
            .clock(Arc::new(ManualClock::stepping(started(), Duration::seconds(2))))
            .build()
    }

    fn archive_from(bytes: bytes::Bytes) -> Vec<ArchiveEntry> {
        Archive::from_bytes(bytes).unwrap().extract().unwrap()
    }

    #[tokio::test]
    async fn test_should_archive_downloaded_logs_and_upload_once() {
        init_tracing();
        let server = LogServer::start(&[
            (OLDEST, b"2024-06-10 07:00:00 UTC LOG:  AUDIT: SESSION,1,1,READ\n".as_slice()),
            (OLDER, b"2024-06-10 08:00:00 UTC LOG:  AUDIT: SESSION,2,1,WRITE\n".as_slice()),
            (CURRENT, b"still being written".as_slice()),
        ])
        .await;
        let vault = Arc::new(MemoryVault::default());

        let report = pipeline(config(DownloadPolicy::Abort), &server, &vault)
            .run()
            .await
            .unwrap();

        assert_eq!(report.files_archived, 2);
        assert_eq!(report.archive_id.as_deref(), Some("archive-1"));
        assert_eq!(
            report.description.as_deref(),
            Some("audit-db/2024-06-10__09-30-00__UTC.tar.gz")
        );

        let uploads = vault.uploads();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].vault_name, "audit-logs");
        assert_eq!(report.archive_bytes, uploads[0].body.len() as u64);

        let entries = archive_from(uploads[0].body.clone());
        let names: Vec<&str> = entries.iter().map(ArchiveEntry::path).collect();
        assert_eq!(names, vec![OLDEST, OLDER]);
        assert_eq!(
            entries[1].data().as_ref(),
            b"2024-06-10 08:00:00 UTC LOG:  AUDIT: SESSION,2,1,WRITE\n"
        );
    }

    #[tokio::test]
    async fn test_should_send_valid_fresh_signature_per_file() {
        init_tracing();
        let server = LogServer::start(&[(OLDEST, b"a".as_slice()), (OLDER, b"b".as_slice())]).await;
        let vault = Arc::new(MemoryVault::default());

        pipeline(config(DownloadPolicy::Abort), &server, &vault)
            .run()
            .await
            .unwrap();

        let requests = server.requests();
        assert_eq!(requests.len(), 2);
        for target in &requests {
            assert!(signature_is_valid(target, RDS_HOST, SECRET_KEY), "bad signature: {target}");
            let names: Vec<String> = query_params(target).into_iter().map(|(k, _)| k).collect();
            assert_eq!(
                names,
                vec![
                    "X-Amz-Algorithm",
                    "X-Amz-Credential",
                    "X-Amz-Date",
                    "X-Amz-Expires",
                    "X-Amz-SignedHeaders",
                    "X-Amz-Signature",
                ]
            );
        }

        let dates: Vec<String> = requests
            .iter()
            .map(|t| {
                query_params(t)
                    .into_iter()
                    .find(|(k, _)| k == "X-Amz-Date")
                    .map(|(_, v)| v)
                    .unwrap()
            })
            .collect();
        assert_ne!(dates[0], dates[1]);
    }

    #[tokio::test]
    async fn test_should_abort_without_upload_when_download_is_rejected() {
        init_tracing();
        let server = LogServer::start(&[(OLDER, b"b".as_slice())]).await;
        let vault = Arc::new(MemoryVault::default());

        let err = pipeline(config(DownloadPolicy::Abort), &server, &vault)
            .run()
            .await
            .unwrap_err();

        match err {
            ArchiverError::DownloadFailure { file, reason } => {
                assert_eq!(file, OLDEST);
                assert!(reason.contains("403"), "reason: {reason}");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(server.requests().len(), 1);
        assert!(vault.uploads().is_empty());
    }

    #[tokio::test]
    async fn test_should_archive_remaining_files_under_skip_policy() {
        init_tracing();
        let server = LogServer::start(&[(OLDER, b"b".as_slice())]).await;
        let vault = Arc::new(MemoryVault::default());

        let report = pipeline(config(DownloadPolicy::SkipAndContinue), &server, &vault)
            .run()
            .await
            .unwrap();

        assert_eq!(report.files_archived, 1);
        assert_eq!(report.skipped, vec![OLDEST]);
        let entries = archive_from(vault.uploads()[0].body.clone());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path(), OLDER);
    }

    #[tokio::test]
    async fn test_should_keep_local_copy_identical_to_upload() {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let server = LogServer::start(&[(OLDEST, b"a".as_slice()), (OLDER, b"b".as_slice())]).await;
        let vault = Arc::new(MemoryVault::default());
        let config = ArchiverConfig::builder()
            .db_instance_identifier(INSTANCE)
            .glacier_vault_name("audit-logs")
            .local_copy_dir(dir.path())
            .build();

        let report = pipeline(config, &server, &vault).run().await.unwrap();

        let copy = std::fs::read(report.local_copy.unwrap()).unwrap();
        assert_eq!(copy, vault.uploads()[0].body.to_vec());
    }
}
