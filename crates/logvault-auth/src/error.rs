//! Error types for SigV4 request signing.
//!
//! All signing failures are represented by [`AuthError`]. Signing itself is a
//! pure computation, so the only failure modes are missing key material and a
//! target that cannot be expressed as a URL.

/// Errors that can occur while producing an AWS Signature Version 4 presigned URL.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The access key ID or secret access key could not be resolved.
    ///
    /// Raised before any network call is attempted.
    #[error("credentials unavailable: {reason}")]
    CredentialsUnavailable {
        /// Why the credential provider could not produce key material.
        reason: String,
    },

    /// The request target (host, path, method) is not usable for signing.
    #[error("invalid signing target: {0}")]
    InvalidTarget(String),
}

impl AuthError {
    /// Shorthand for a [`AuthError::CredentialsUnavailable`] with the given reason.
    #[must_use]
    pub fn credentials_unavailable(reason: impl Into<String>) -> Self {
        Self::CredentialsUnavailable {
            reason: reason.into(),
        }
    }
}
