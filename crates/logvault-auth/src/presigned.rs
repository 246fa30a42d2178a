//! Presigned URL generation for AWS Signature Version 4.
//!
//! Presigned URLs carry authentication in query parameters rather than in an
//! `Authorization` header, so the resulting URL can be fetched by any plain
//! HTTP client. The parameters, in the order they appear:
//!
//! - `X-Amz-Algorithm` - Always `AWS4-HMAC-SHA256`
//! - `X-Amz-Credential` - `AKID/date/region/service/aws4_request`
//! - `X-Amz-Date` - ISO 8601 basic format timestamp (`YYYYMMDDTHHMMSSZ`)
//! - `X-Amz-Expires` - Validity duration in seconds
//! - `X-Amz-Security-Token` - Only for temporary credentials
//! - `X-Amz-SignedHeaders` - Always `host`
//! - `X-Amz-Signature` - The hex-encoded signature, appended last

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::canonical::{build_canonical_request, build_canonical_uri, uri_encode};
use crate::credentials::{CredentialProvider, Credentials};
use crate::error::AuthError;
use crate::sigv4::{ALGORITHM, SigningContext, hash_payload};

/// The single header covered by a presigned signature.
const SIGNED_HEADER: &str = "host";

/// Default validity window of a presigned URL, in seconds.
pub const DEFAULT_EXPIRES_SECS: u64 = 30;

/// Payload hash for requests whose body is not signed (used by S3 presigned URLs).
pub const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";

/// The resource a presigned URL grants access to.
#[derive(Debug, Clone)]
pub struct PresignTarget {
    /// HTTP method, e.g. `GET`.
    pub method: String,
    /// Host name without scheme, e.g. `rds.us-east-1.amazonaws.com`.
    pub host: String,
    /// Absolute request path.
    pub path: String,
    /// Validity window in seconds.
    pub expires_secs: u64,
    /// Hex SHA-256 of the request body (empty body for `GET`).
    pub payload_hash: String,
}

impl PresignTarget {
    /// A `GET` against `host` + `path` with an empty body and the default expiry.
    #[must_use]
    pub fn get(host: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: "GET".to_owned(),
            host: host.into(),
            path: path.into(),
            expires_secs: DEFAULT_EXPIRES_SECS,
            payload_hash: hash_payload(b""),
        }
    }

    /// Override the validity window.
    #[must_use]
    pub fn with_expires(mut self, expires_secs: u64) -> Self {
        self.expires_secs = expires_secs;
        self
    }

    /// Override the payload hash.
    #[must_use]
    pub fn with_payload_hash(mut self, payload_hash: impl Into<String>) -> Self {
        self.payload_hash = payload_hash.into();
        self
    }

    fn validate(&self) -> Result<(), AuthError> {
        if self.host.is_empty() || self.host.contains('/') {
            return Err(AuthError::InvalidTarget(format!(
                "host must be a bare authority: {:?}",
                self.host
            )));
        }
        if !self.path.starts_with('/') {
            return Err(AuthError::InvalidTarget(format!(
                "path must be absolute: {:?}",
                self.path
            )));
        }
        if self.method.is_empty() {
            return Err(AuthError::InvalidTarget("method is empty".to_owned()));
        }
        Ok(())
    }
}

/// A fully-qualified presigned URL plus the intermediate signing values.
#[derive(Debug, Clone)]
pub struct PresignedUrl {
    /// `https://host/path?query&X-Amz-Signature=...`.
    pub url: String,
    /// The canonical request that was signed.
    pub canonical_request: String,
    /// The string to sign derived from the canonical request.
    pub string_to_sign: String,
    /// Hex-encoded signature.
    pub signature: String,
    /// `X-Amz-Date` of the signature.
    pub amz_date: String,
}

/// Produces SigV4 presigned URLs for one region/service pair.
///
/// Credentials are resolved from the provider on every call, and a fresh
/// [`SigningContext`] is built per URL.
#[derive(Clone)]
pub struct RequestSigner {
    provider: Arc<dyn CredentialProvider>,
    region: String,
    service: String,
}

impl std::fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSigner")
            .field("region", &self.region)
            .field("service", &self.service)
            .finish_non_exhaustive()
    }
}

impl RequestSigner {
    /// Create a signer for `service` in `region`.
    #[must_use]
    pub fn new(
        provider: Arc<dyn CredentialProvider>,
        region: impl Into<String>,
        service: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            region: region.into(),
            service: service.into(),
        }
    }

    /// The region this signer scopes credentials to.
    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// The service this signer scopes credentials to.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Resolve credentials without signing anything.
    ///
    /// Lets callers fail before doing any network I/O.
    pub fn ensure_credentials(&self) -> Result<Credentials, AuthError> {
        self.provider.credentials()
    }

    /// Presign `target` as of `instant`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::CredentialsUnavailable`] when the provider has no key
    /// material, or [`AuthError::InvalidTarget`] for a malformed target.
    pub fn presign(
        &self,
        target: &PresignTarget,
        instant: DateTime<Utc>,
    ) -> Result<PresignedUrl, AuthError> {
        let credentials = self.provider.credentials()?;
        target.validate()?;

        let ctx = SigningContext::new(credentials, &self.region, &self.service, instant);
        Ok(presign_with_context(&ctx, target))
    }
}

/// Presign `target` with an explicit signing context.
#[must_use]
pub fn presign_with_context(ctx: &SigningContext, target: &PresignTarget) -> PresignedUrl {
    let amz_date = ctx.amz_date();
    let credential = ctx.credential();
    let expires = target.expires_secs.to_string();

    let mut query: Vec<(&str, &str)> = vec![
        ("X-Amz-Algorithm", ALGORITHM),
        ("X-Amz-Credential", credential.as_str()),
        ("X-Amz-Date", amz_date.as_str()),
        ("X-Amz-Expires", expires.as_str()),
    ];
    if let Some(token) = ctx.credentials().session_token.as_deref() {
        query.push(("X-Amz-Security-Token", token));
    }
    query.push(("X-Amz-SignedHeaders", SIGNED_HEADER));

    let canonical_request = build_canonical_request(
        &target.method,
        &target.path,
        &query,
        &[(SIGNED_HEADER, target.host.as_str())],
        &[SIGNED_HEADER],
        &target.payload_hash,
    );
    debug!(canonical_request, "Built presign canonical request");

    let (string_to_sign, signature) = ctx.sign(&canonical_request);
    debug!(string_to_sign, "Built presign string to sign");

    // Parameters are appended in declaration order, which is already sorted;
    // the signature always goes last and is not part of the canonical query.
    let query_string = query
        .iter()
        .map(|(name, value)| format!("{name}={}", uri_encode(value)))
        .collect::<Vec<_>>()
        .join("&");
    let url = format!(
        "https://{}{}?{query_string}&X-Amz-Signature={signature}",
        target.host,
        build_canonical_uri(&target.path)
    );

    debug!(
        access_key_id = %ctx.credentials().access_key_id,
        host = %target.host,
        amz_date = %amz_date,
        "Presigned request"
    );

    PresignedUrl {
        url,
        canonical_request,
        string_to_sign,
        signature,
        amz_date,
    }
}
