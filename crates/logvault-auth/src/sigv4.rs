//! AWS Signature Version 4 primitives.
//!
//! This module holds the pieces of SigV4 that do not depend on where the
//! signature ends up (header or query string):
//!
//! 1. Derive the signing key with a four-step HMAC-SHA256 chain scoped to a
//!    date, region and service ([`derive_signing_key_chain`]).
//! 2. Build the string to sign from the timestamp, credential scope and
//!    canonical request hash ([`build_string_to_sign`]).
//! 3. Compute the hex-encoded signature ([`compute_signature`]).
//!
//! [`SigningContext`] bundles the inputs of one signing operation. A context is
//! built fresh for each request because both the timestamp and the derived key
//! are time-bound.

use chrono::{DateTime, Utc};
use hmac::{Hmac, KeyInit, Mac};
use sha2::{Digest, Sha256};

use crate::credentials::Credentials;

/// The only algorithm supported by this implementation.
pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Terminator of every credential scope.
pub const SCOPE_TERMINATOR: &str = "aws4_request";

/// Timestamp format for `X-Amz-Date` (ISO 8601 basic).
const AMZ_DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Date format used in the credential scope.
const DATE_STAMP_FORMAT: &str = "%Y%m%d";

type HmacSha256 = Hmac<Sha256>;

/// Every intermediate key of the SigV4 derivation chain.
///
/// ```text
/// k_date    = HMAC-SHA256("AWS4" + secret_key, date)
/// k_region  = HMAC-SHA256(k_date, region)
/// k_service = HMAC-SHA256(k_region, service)
/// k_signing = HMAC-SHA256(k_service, "aws4_request")
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct SigningKeyChain {
    /// Key scoped to the date stamp.
    pub k_date: Vec<u8>,
    /// Key scoped to date and region.
    pub k_region: Vec<u8>,
    /// Key scoped to date, region and service.
    pub k_service: Vec<u8>,
    /// Final signing key.
    pub k_signing: Vec<u8>,
}

impl std::fmt::Debug for SigningKeyChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKeyChain").finish_non_exhaustive()
    }
}

/// Derive the full SigV4 key chain, exposing each intermediate value.
///
/// # Examples
///
/// ```
/// use logvault_auth::sigv4::derive_signing_key_chain;
///
/// let chain = derive_signing_key_chain(
///     "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
///     "20120215",
///     "us-east-1",
///     "iam",
/// );
/// assert_eq!(
///     hex::encode(&chain.k_signing),
///     "f4780e2d9f65fa895f9c67b32ce1baf0b0d8a43505a000a1a9e090d414db404d"
/// );
/// ```
#[must_use]
pub fn derive_signing_key_chain(
    secret_key: &str,
    date: &str,
    region: &str,
    service: &str,
) -> SigningKeyChain {
    let k_date = hmac_sha256(format!("AWS4{secret_key}").as_bytes(), date.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    let k_signing = hmac_sha256(&k_service, SCOPE_TERMINATOR.as_bytes());
    SigningKeyChain {
        k_date,
        k_region,
        k_service,
        k_signing,
    }
}

/// Derive the SigV4 signing key (the last link of [`derive_signing_key_chain`]).
#[must_use]
pub fn derive_signing_key(secret_key: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    derive_signing_key_chain(secret_key, date, region, service).k_signing
}

/// Build the SigV4 string to sign.
///
/// Format:
/// ```text
/// AWS4-HMAC-SHA256\n
/// <ISO8601 timestamp>\n
/// <credential_scope>\n
/// <hex(SHA256(canonical_request))>
/// ```
#[must_use]
pub fn build_string_to_sign(
    timestamp: &str,
    credential_scope: &str,
    canonical_request_hash: &str,
) -> String {
    format!("{ALGORITHM}\n{timestamp}\n{credential_scope}\n{canonical_request_hash}")
}

/// Compute the HMAC-SHA256 signature of `data` using the given `signing_key`.
///
/// Returns the hex-encoded signature.
#[must_use]
pub fn compute_signature(signing_key: &[u8], data: &str) -> String {
    hex::encode(hmac_sha256(signing_key, data.as_bytes()))
}

/// Compute the SHA-256 hash of the given payload and return it as a hex string.
///
/// # Examples
///
/// ```
/// use logvault_auth::sigv4::hash_payload;
///
/// // SHA-256 of empty payload
/// assert_eq!(
///     hash_payload(b""),
///     "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
/// );
/// ```
#[must_use]
pub fn hash_payload(payload: &[u8]) -> String {
    hex::encode(Sha256::digest(payload))
}

/// Inputs of a single signing operation.
///
/// Never reuse a context across requests: the instant it carries bounds the
/// signature's validity window.
#[derive(Debug, Clone)]
pub struct SigningContext {
    credentials: Credentials,
    region: String,
    service: String,
    instant: DateTime<Utc>,
}

impl SigningContext {
    /// Create a context for signing at `instant`.
    #[must_use]
    pub fn new(
        credentials: Credentials,
        region: impl Into<String>,
        service: impl Into<String>,
        instant: DateTime<Utc>,
    ) -> Self {
        Self {
            credentials,
            region: region.into(),
            service: service.into(),
            instant,
        }
    }

    /// The credentials this context signs with.
    #[must_use]
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// The signing instant.
    #[must_use]
    pub fn instant(&self) -> DateTime<Utc> {
        self.instant
    }

    /// `X-Amz-Date` value, e.g. `20130524T000000Z`.
    #[must_use]
    pub fn amz_date(&self) -> String {
        self.instant.format(AMZ_DATE_FORMAT).to_string()
    }

    /// Date stamp of the credential scope, e.g. `20130524`.
    #[must_use]
    pub fn date_stamp(&self) -> String {
        self.instant.format(DATE_STAMP_FORMAT).to_string()
    }

    /// `date/region/service/aws4_request`.
    #[must_use]
    pub fn credential_scope(&self) -> String {
        format!(
            "{}/{}/{}/{SCOPE_TERMINATOR}",
            self.date_stamp(),
            self.region,
            self.service
        )
    }

    /// `access-key/date/region/service/aws4_request`, the `X-Amz-Credential` value.
    #[must_use]
    pub fn credential(&self) -> String {
        format!(
            "{}/{}",
            self.credentials.access_key_id,
            self.credential_scope()
        )
    }

    /// Derive the signing key for this context's scope.
    #[must_use]
    pub fn signing_key(&self) -> Vec<u8> {
        derive_signing_key(
            &self.credentials.secret_access_key,
            &self.date_stamp(),
            &self.region,
            &self.service,
        )
    }

    /// Sign a canonical request, returning `(string_to_sign, signature)`.
    #[must_use]
    pub fn sign(&self, canonical_request: &str) -> (String, String) {
        let canonical_hash = hash_payload(canonical_request.as_bytes());
        let string_to_sign =
            build_string_to_sign(&self.amz_date(), &self.credential_scope(), &canonical_hash);
        let signature = compute_signature(&self.signing_key(), &string_to_sign);
        (string_to_sign, signature)
    }
}

/// Compute HMAC-SHA256 and return the raw bytes.
fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can accept keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}
