//! Canonical request construction for AWS Signature Version 4.
//!
//! This module implements the canonical request format as specified by AWS:
//!
//! ```text
//! HTTPRequestMethod\n
//! CanonicalURI\n
//! CanonicalQueryString\n
//! CanonicalHeaders\n\n
//! SignedHeaders\n
//! HashedPayload
//! ```
//!
//! Each component is normalized following the AWS SigV4 rules. A single
//! byte of difference here does not produce a data error downstream; the
//! service simply answers `SignatureDoesNotMatch`.

use std::collections::BTreeMap;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};

/// The set of characters that must be percent-encoded in URI path segments and
/// query string components.
///
/// SigV4 requires every character except the unreserved ones
/// (A-Z, a-z, 0-9, `-`, `_`, `.`, `~`) to be encoded.
const URI_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Build the full canonical request string from its components.
///
/// `query` holds raw (unencoded) name/value pairs; they are encoded and sorted
/// here. Header names and values are normalized by [`build_canonical_headers`].
///
/// # Examples
///
/// ```
/// use logvault_auth::canonical::build_canonical_request;
///
/// let canonical = build_canonical_request(
///     "GET",
///     "/test.txt",
///     &[],
///     &[("host", "examplebucket.s3.amazonaws.com")],
///     &["host"],
///     "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
/// );
/// assert!(canonical.starts_with("GET\n/test.txt\n\nhost:examplebucket.s3.amazonaws.com\n\nhost\n"));
/// ```
#[must_use]
pub fn build_canonical_request(
    method: &str,
    path: &str,
    query: &[(&str, &str)],
    headers: &[(&str, &str)],
    signed_headers: &[&str],
    payload_hash: &str,
) -> String {
    let canonical_uri = build_canonical_uri(path);
    let canonical_query = build_canonical_query_string(query);
    let canonical_headers = build_canonical_headers(headers, signed_headers);
    let signed_headers_str = build_signed_headers_string(signed_headers);

    format!(
        "{method}\n{canonical_uri}\n{canonical_query}\n{canonical_headers}\n\n{signed_headers_str}\n{payload_hash}"
    )
}

/// Build the canonical URI by URI-encoding each path segment individually.
///
/// Forward slashes (`/`) are preserved. Empty paths are normalized to `/`.
/// Segments are decoded before encoding so an already-encoded path is not
/// encoded twice.
///
/// # Examples
///
/// ```
/// use logvault_auth::canonical::build_canonical_uri;
///
/// assert_eq!(build_canonical_uri("/test.txt"), "/test.txt");
/// assert_eq!(build_canonical_uri(""), "/");
/// assert_eq!(build_canonical_uri("/a b/c"), "/a%20b/c");
/// ```
#[must_use]
pub fn build_canonical_uri(path: &str) -> String {
    if path.is_empty() || path == "/" {
        return "/".to_owned();
    }

    path.split('/')
        .map(|segment| {
            let decoded = percent_decode_str(segment).decode_utf8_lossy();
            uri_encode(&decoded)
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Build the canonical query string from raw name/value pairs.
///
/// Names and values are percent-encoded with the SigV4 unreserved set (space
/// becomes `%20`, `/` becomes `%2F`), then sorted by encoded name, and by
/// value for duplicate names.
///
/// # Examples
///
/// ```
/// use logvault_auth::canonical::build_canonical_query_string;
///
/// assert_eq!(build_canonical_query_string(&[]), "");
/// assert_eq!(
///     build_canonical_query_string(&[("b", "2"), ("a", "x/y")]),
///     "a=x%2Fy&b=2"
/// );
/// ```
#[must_use]
pub fn build_canonical_query_string(query: &[(&str, &str)]) -> String {
    let mut params: Vec<(String, String)> = query
        .iter()
        .map(|(name, value)| (uri_encode(name), uri_encode(value)))
        .collect();

    params.sort_unstable();

    params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Build the canonical headers string.
///
/// Only headers listed in `signed_headers` are included. Header names are trimmed
/// and lowercased, values are trimmed of leading/trailing whitespace and
/// consecutive spaces are collapsed to a single space. Headers are sorted by name.
///
/// The result does NOT include a trailing newline; the caller adds that as part of
/// the canonical request format (the double newline between headers and signed headers).
///
/// # Examples
///
/// ```
/// use logvault_auth::canonical::build_canonical_headers;
///
/// let result = build_canonical_headers(&[(" Host ", " rds.us-east-1.amazonaws.com ")], &["host"]);
/// assert_eq!(result, "host:rds.us-east-1.amazonaws.com");
/// ```
#[must_use]
pub fn build_canonical_headers(headers: &[(&str, &str)], signed_headers: &[&str]) -> String {
    // Multiple headers sharing a name are joined with commas.
    let mut header_map: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let lower_name = normalize_header_name(name);
        let trimmed_value = collapse_whitespace(value.trim());
        header_map
            .entry(lower_name)
            .and_modify(|existing| {
                existing.push(',');
                existing.push_str(&trimmed_value);
            })
            .or_insert(trimmed_value);
    }

    let mut sorted_signed: Vec<String> = signed_headers
        .iter()
        .map(|name| normalize_header_name(name))
        .collect();
    sorted_signed.sort_unstable();

    sorted_signed
        .iter()
        .filter_map(|name| header_map.get(name).map(|value| format!("{name}:{value}")))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Build the signed headers string as a semicolon-separated list of lowercase header names.
///
/// # Examples
///
/// ```
/// use logvault_auth::canonical::build_signed_headers_string;
///
/// assert_eq!(build_signed_headers_string(&["X-Amz-Date", "host"]), "host;x-amz-date");
/// ```
#[must_use]
pub fn build_signed_headers_string(signed_headers: &[&str]) -> String {
    let mut sorted: Vec<String> = signed_headers
        .iter()
        .map(|name| normalize_header_name(name))
        .collect();
    sorted.sort_unstable();
    sorted.join(";")
}

/// URI-encode a single path segment or query component using the SigV4 rules.
#[must_use]
pub fn uri_encode(input: &str) -> String {
    utf8_percent_encode(input, URI_ENCODE_SET).to_string()
}

fn normalize_header_name(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

/// Collapse consecutive whitespace characters in a string to a single space.
fn collapse_whitespace(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut prev_was_space = false;
    for ch in s.chars() {
        if ch.is_whitespace() {
            if !prev_was_space {
                result.push(' ');
                prev_was_space = true;
            }
        } else {
            result.push(ch);
            prev_was_space = false;
        }
    }
    result
}
