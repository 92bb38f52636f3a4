//! HTTP Signature codec for `ActivityPub`.
//!
//! Pure functions over strings and bytes, no I/O and no clock: the caller
//! supplies the `Date` header along with the rest of the request headers.
//! See: <https://datatracker.ietf.org/doc/html/draft-cavage-http-signatures>

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, NaiveDateTime, Utc};
use rsa::{
    pkcs1v15::{Signature, SigningKey, VerifyingKey},
    sha2::Sha256,
    signature::{SignatureEncoding, Signer, Verifier},
};
use sha2::{Digest, Sha256 as Sha256Hasher};
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

use crate::crypto::{KeyError, parse_private_key, parse_public_key};

/// The only signing algorithm this engine produces or accepts.
pub const RSA_SHA256: &str = "rsa-sha256";

/// Pseudo-header standing for `<method> <path>`.
pub const REQUEST_TARGET: &str = "(request-target)";

/// Headers signed on requests that carry a body.
pub const SIGNED_HEADERS_WITH_BODY: &[&str] = &[REQUEST_TARGET, "host", "date", "digest"];

/// Headers signed on bodiless requests.
pub const SIGNED_HEADERS_WITHOUT_BODY: &[&str] = &[REQUEST_TARGET, "host", "date"];

const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Errors from the signature codec.
#[derive(Debug, Error)]
pub enum SignatureCodecError {
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error("Missing signed header: {0}")]
    MissingHeader(String),
    #[error("Signing failed: {0}")]
    SigningFailed(String),
}

/// Parsed `Signature` request header.
///
/// Every field is optional at parse time so the inbound validator can
/// report exactly which part is missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignatureHeader {
    /// Key ID (typically the actor's public key URL).
    pub key_id: Option<String>,
    /// Algorithm as sent by the remote side.
    pub algorithm: Option<String>,
    /// Ordered list of signed header names.
    pub headers: Option<Vec<String>>,
    /// Base64 signature.
    pub signature: Option<String>,
}

impl SignatureHeader {
    /// Parse a `Signature` header value.
    ///
    /// Format: `keyId="...",algorithm="...",headers="...",signature="..."`.
    /// Unknown parameters are ignored; values may contain `=` (base64 padding).
    #[must_use]
    pub fn parse(header: &str) -> Self {
        let mut parsed = Self::default();

        for part in header.split(',') {
            let part = part.trim();
            if let Some((key, value)) = part.split_once('=') {
                let value = value.trim().trim_matches('"').to_string();
                match key.trim() {
                    "keyId" => parsed.key_id = Some(value),
                    "algorithm" => parsed.algorithm = Some(value),
                    "headers" => {
                        parsed.headers = Some(
                            value
                                .split_whitespace()
                                .map(str::to_lowercase)
                                .collect(),
                        );
                    }
                    "signature" => parsed.signature = Some(value),
                    _ => {}
                }
            }
        }

        parsed
    }

    /// Render a complete header value for an outbound request.
    #[must_use]
    pub fn to_header_value(key_id: &str, signed_headers: &[&str], signature: &str) -> String {
        format!(
            r#"keyId="{key_id}",algorithm="{RSA_SHA256}",headers="{}",signature="{signature}""#,
            signed_headers.join(" ")
        )
    }
}

/// Build the canonical signing string.
///
/// One `"<lowercased-name>: <value>"` line per entry of `ordered_header_names`,
/// joined by `\n`. `(request-target)` expands to `"<lowercase method> <path>"`.
/// `headers` keys are matched case-insensitively.
pub fn build_signing_string(
    method: &str,
    path: &str,
    headers: &HashMap<String, String>,
    ordered_header_names: &[&str],
) -> Result<String, SignatureCodecError> {
    let mut lines = Vec::with_capacity(ordered_header_names.len());

    for name in ordered_header_names {
        let name = name.to_lowercase();
        let value = if name == REQUEST_TARGET {
            format!("{} {path}", method.to_lowercase())
        } else {
            header_value(headers, &name)
                .ok_or_else(|| SignatureCodecError::MissingHeader(name.clone()))?
                .to_string()
        };
        lines.push(format!("{name}: {value}"));
    }

    Ok(lines.join("\n"))
}

fn header_value<'a>(headers: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    headers.get(name).map(String::as_str).or_else(|| {
        headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    })
}

/// Sign a signing string with RSA-SHA256 and return the base64 signature.
pub fn sign(signing_string: &str, private_key_pem: &str) -> Result<String, SignatureCodecError> {
    let private_key = parse_private_key(private_key_pem)?;
    let signing_key = SigningKey::<Sha256>::new(private_key);
    let signature = signing_key
        .try_sign(signing_string.as_bytes())
        .map_err(|e| SignatureCodecError::SigningFailed(e.to_string()))?;

    Ok(BASE64.encode(signature.to_bytes()))
}

/// Verify a raw signature against a signing string.
///
/// A mismatch is a normal outcome: every failure, including an unreadable
/// public key, yields `false`.
#[must_use]
pub fn verify(signing_string: &str, signature: &[u8], public_key_pem: &str) -> bool {
    let public_key = match parse_public_key(public_key_pem) {
        Ok(key) => key,
        Err(e) => {
            debug!(error = %e, "Cannot verify with unreadable public key");
            return false;
        }
    };
    let Ok(signature) = Signature::try_from(signature) else {
        return false;
    };

    VerifyingKey::<Sha256>::new(public_key)
        .verify(signing_string.as_bytes(), &signature)
        .is_ok()
}

/// Verify a base64 signature as carried in the `Signature` header.
#[must_use]
pub fn verify_base64(signing_string: &str, signature_b64: &str, public_key_pem: &str) -> bool {
    BASE64
        .decode(signature_b64)
        .is_ok_and(|bytes| verify(signing_string, &bytes, public_key_pem))
}

/// Calculate the `Digest` header value of a body: `SHA-256=<base64>`.
#[must_use]
pub fn calculate_digest(body: &[u8]) -> String {
    let hash = Sha256Hasher::digest(body);
    format!("SHA-256={}", BASE64.encode(hash))
}

/// Check a `Digest` header against the body it claims to describe.
#[must_use]
pub fn verify_digest(body: &[u8], digest_header: &str) -> bool {
    // Some servers send several digests separated by commas.
    let expected = BASE64.encode(Sha256Hasher::digest(body));
    digest_header.split(',').map(str::trim).any(|d| {
        d.split_once('=')
            .is_some_and(|(alg, value)| alg.eq_ignore_ascii_case("SHA-256") && value == expected)
    })
}

/// Format a timestamp as an HTTP `Date` header (RFC 7231 IMF-fixdate).
#[must_use]
pub fn format_http_date(at: DateTime<Utc>) -> String {
    at.format(HTTP_DATE_FORMAT).to_string()
}

/// Parse an HTTP `Date` header.
///
/// Accepts IMF-fixdate, RFC 2822, RFC 850 and asctime forms.
#[must_use]
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt.with_timezone(&Utc));
    }

    let formats = [
        HTTP_DATE_FORMAT,
        "%A, %d-%b-%y %H:%M:%S GMT",
        "%a %b %e %H:%M:%S %Y",
    ];
    formats.iter().find_map(|format| {
        NaiveDateTime::parse_from_str(value, format)
            .ok()
            .map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc))
    })
}
