//! Presigned URLs checked by an independent re-computation of the signature.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};
    use logvault_auth::{Credentials, PresignTarget, RequestSigner, StaticCredentialProvider};

    use crate::{
        ACCESS_KEY, RDS_HOST, REGION, SECRET_KEY, download_path, query_params, signature_is_valid,
    };

    fn target_of(url: &str) -> &str {
        url.split_once(RDS_HOST).map(|(_, rest)| rest).unwrap()
    }

    fn signer(credentials: Credentials) -> RequestSigner {
        RequestSigner::new(
            Arc::new(StaticCredentialProvider::from_credentials(credentials)),
            REGION,
            "rds",
        )
    }

    #[test]
    fn test_should_verify_presigned_download_url() {
        let target = PresignTarget::get(RDS_HOST, download_path("error/postgresql.log.2024-06-10-07"));
        let at = Utc.with_ymd_and_hms(2024, 6, 10, 9, 30, 0).unwrap();

        let presigned = signer(Credentials::new(ACCESS_KEY, SECRET_KEY))
            .presign(&target, at)
            .unwrap();

        assert!(signature_is_valid(target_of(&presigned.url), RDS_HOST, SECRET_KEY));
        assert!(!signature_is_valid(target_of(&presigned.url), RDS_HOST, "wrong-secret"));
    }

    #[test]
    fn test_should_sign_security_token_of_temporary_credentials() {
        let target = PresignTarget::get(RDS_HOST, download_path("error/postgresql.log.2024-06-10-07"));
        let at = Utc.with_ymd_and_hms(2024, 6, 10, 9, 30, 0).unwrap();
        let credentials = Credentials::new(ACCESS_KEY, SECRET_KEY).with_session_token("FwoG/token+with=chars");

        let presigned = signer(credentials).presign(&target, at).unwrap();
        let request_target = target_of(&presigned.url);

        let params = query_params(request_target);
        assert!(params
            .iter()
            .any(|(k, v)| k == "X-Amz-Security-Token" && v == "FwoG/token+with=chars"));
        assert!(signature_is_valid(request_target, RDS_HOST, SECRET_KEY));

        let tampered = request_target.replace("X-Amz-Expires=30", "X-Amz-Expires=3600");
        assert!(!signature_is_valid(&tampered, RDS_HOST, SECRET_KEY));
    }

    #[test]
    fn test_should_produce_distinct_valid_signatures_at_distinct_instants() {
        let target = PresignTarget::get(RDS_HOST, download_path("error/postgresql.log.2024-06-10-07"));
        let at = Utc.with_ymd_and_hms(2024, 6, 10, 9, 30, 0).unwrap();
        let signer = signer(Credentials::new(ACCESS_KEY, SECRET_KEY));

        let first = signer.presign(&target, at).unwrap();
        let second = signer.presign(&target, at + Duration::seconds(1)).unwrap();

        assert_ne!(first.signature, second.signature);
        assert!(signature_is_valid(target_of(&first.url), RDS_HOST, SECRET_KEY));
        assert!(signature_is_valid(target_of(&second.url), RDS_HOST, SECRET_KEY));
    }
}
