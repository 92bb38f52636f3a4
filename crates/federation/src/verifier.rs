//! Inbound HTTP Signature validation.
//!
//! One request goes through five steps, each with its own failure:
//!
//! 1. extract and parse the `Signature` header
//! 2. algorithm gate (before any key lookup)
//! 3. resolve the signing actor and its key
//! 4. `Date` freshness
//! 5. rebuild the signing string from the actual request and verify
//!
//! Only a request that passes all of them is attributed to an actor.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use apub_common::AppError;
use apub_common::http_signature::{
    REQUEST_TARGET, RSA_SHA256, SignatureHeader, build_signing_string, parse_http_date,
    verify_base64, verify_digest,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::activities::Activity;
use crate::directory::ActorDirectory;

/// Headers every accepted signature must cover.
const REQUIRED_SIGNED_HEADERS: &[&str] = &[REQUEST_TARGET, "date"];

/// Why an inbound request was not attributed to an actor.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Request has no Signature header")]
    MissingSignatureHeader,
    #[error("Signature header has no keyId")]
    MissingKeyId,
    #[error("Signature header has no headers list")]
    MissingSignedHeadersList,
    #[error("Signature header has no signature")]
    MissingSignatureInHeader,
    #[error("Signature does not cover required header: {0}")]
    RequiredHeaderNotSigned(String),
    #[error("Signature algorithm not specified")]
    AlgorithmNotSpecified,
    #[error("Signature algorithm not supported: {0}")]
    AlgorithmNotSupported(String),
    #[error("Only a single actor is supported in signing")]
    SingleActorIsSupportedInSigning,
    #[error("Actor not found: {0}")]
    UserNotExistsInDatabase(String),
    #[error("Actor has no public key: {0}")]
    PrivateKeyNotExists(String),
    #[error("Key {key_id} does not belong to actor {actor}")]
    KeyIdActorMismatch { key_id: String, actor: String },
    #[error("Actor lookup failed: {0}")]
    Directory(AppError),
    #[error("Request has no Date header")]
    MissingDateHeader,
    #[error("Unparsable Date header: {0}")]
    IncorrectDateFormat(String),
    #[error("Date header is {skew_secs}s away from now")]
    BadTimeWindow { skew_secs: i64 },
    #[error("Signed header missing from request: {0}")]
    MissingSignedHeader(String),
    #[error("Digest header does not match body")]
    DigestMismatch,
    #[error("Signature is not valid")]
    SignatureIsNotValid,
}

impl ValidationError {
    /// Only a failing actor lookup can succeed on retry.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Directory(e) => e.is_transient(),
            _ => false,
        }
    }
}

/// An inbound HTTP request as far as signature checking cares.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundRequest {
    pub method: String,
    /// Path and query, exactly as received.
    pub path: String,
    /// Header names lowercased.
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub body: Vec<u8>,
}

impl InboundRequest {
    #[must_use]
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    /// Add a header, lowercasing its name.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_lowercase(), value.into());
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Header value by (case-insensitive) name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    /// True when a `Signature` header is present.
    #[must_use]
    pub fn is_signed(&self) -> bool {
        self.header("signature").is_some()
    }
}

/// A parsed `Signature` header with every mandatory part present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSignature {
    pub key_id: String,
    pub algorithm: Option<String>,
    pub headers: Vec<String>,
    pub signature: String,
}

impl ParsedSignature {
    /// Step 1: extract the `Signature` header.
    pub fn extract(request: &InboundRequest) -> Result<Self, ValidationError> {
        let raw = request
            .header("signature")
            .ok_or(ValidationError::MissingSignatureHeader)?;
        let header = SignatureHeader::parse(raw);

        let key_id = header.key_id.ok_or(ValidationError::MissingKeyId)?;
        let headers = header
            .headers
            .ok_or(ValidationError::MissingSignedHeadersList)?;
        let signature = header
            .signature
            .ok_or(ValidationError::MissingSignatureInHeader)?;

        for required in REQUIRED_SIGNED_HEADERS {
            if !headers.iter().any(|h| h == required) {
                return Err(ValidationError::RequiredHeaderNotSigned(
                    (*required).to_string(),
                ));
            }
        }

        Ok(Self {
            key_id,
            algorithm: header.algorithm,
            headers,
            signature,
        })
    }

    /// Step 2: only `rsa-sha256` is accepted.
    pub fn check_algorithm(&self) -> Result<(), ValidationError> {
        match self.algorithm.as_deref() {
            None => Err(ValidationError::AlgorithmNotSpecified),
            Some(algorithm) if algorithm.eq_ignore_ascii_case(RSA_SHA256) => Ok(()),
            Some(other) => Err(ValidationError::AlgorithmNotSupported(other.to_string())),
        }
    }
}

/// The actor a request was verified to come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedActor {
    pub actor_id: String,
    pub key_id: String,
}

/// Validates inbound signed requests against an [`ActorDirectory`].
#[derive(Clone)]
pub struct SignatureValidator {
    directory: Arc<dyn ActorDirectory>,
    max_clock_skew: Duration,
}

impl SignatureValidator {
    #[must_use]
    pub fn new(directory: Arc<dyn ActorDirectory>, max_clock_skew: Duration) -> Self {
        Self {
            directory,
            max_clock_skew,
        }
    }

    /// Steps 1 and 2 only. Cheap: no key lookup, no cryptography.
    pub fn algorithm_gate(request: &InboundRequest) -> Result<ParsedSignature, ValidationError> {
        let signature = ParsedSignature::extract(request)?;
        signature.check_algorithm()?;
        Ok(signature)
    }

    /// Run all five steps for `request`, which carries `activity`.
    pub async fn validate(
        &self,
        request: &InboundRequest,
        activity: &Activity,
        now: DateTime<Utc>,
    ) -> Result<VerifiedActor, ValidationError> {
        let signature = Self::algorithm_gate(request)?;

        // Step 3: resolve the signer.
        let actor = activity
            .single_actor()
            .ok_or(ValidationError::SingleActorIsSupportedInSigning)?;
        let record = self
            .directory
            .find_actor(&actor.id)
            .await
            .map_err(ValidationError::Directory)?
            .ok_or_else(|| ValidationError::UserNotExistsInDatabase(actor.id.clone()))?;
        let key = record
            .public_key
            .ok_or_else(|| ValidationError::PrivateKeyNotExists(actor.id.clone()))?;
        if key.key_id != signature.key_id {
            return Err(ValidationError::KeyIdActorMismatch {
                key_id: signature.key_id,
                actor: actor.id.clone(),
            });
        }

        // Step 4: freshness.
        self.check_freshness(request, now)?;

        // Step 5: recompute and verify.
        verify_request(request, &signature, &key.public_key_pem)?;

        debug!(actor_id = %actor.id, key_id = %signature.key_id, "Signature verified");
        Ok(VerifiedActor {
            actor_id: actor.id.clone(),
            key_id: signature.key_id,
        })
    }

    /// Step 4: the `Date` header must be within the clock-skew window of
    /// `now`, in either direction. The boundary itself is accepted.
    pub fn check_freshness(
        &self,
        request: &InboundRequest,
        now: DateTime<Utc>,
    ) -> Result<(), ValidationError> {
        let raw = request
            .header("date")
            .ok_or(ValidationError::MissingDateHeader)?;
        let date = parse_http_date(raw)
            .ok_or_else(|| ValidationError::IncorrectDateFormat(raw.to_string()))?;

        let skew_secs = (now - date).num_seconds();
        let max_skew = i64::try_from(self.max_clock_skew.as_secs()).unwrap_or(i64::MAX);
        if skew_secs.abs() > max_skew {
            warn!(skew_secs, "Rejecting request outside the signature time window");
            return Err(ValidationError::BadTimeWindow { skew_secs });
        }
        Ok(())
    }
}

/// Step 5 on its own: rebuild the signing string from the request and check
/// the signature and the body digest.
///
/// A request with a body must sign `digest`, otherwise the body would not be
/// covered by the signature at all.
pub fn verify_request(
    request: &InboundRequest,
    signature: &ParsedSignature,
    public_key_pem: &str,
) -> Result<(), ValidationError> {
    let digest_signed = signature.headers.iter().any(|h| h == "digest");
    if !request.body.is_empty() && !digest_signed {
        return Err(ValidationError::RequiredHeaderNotSigned("digest".to_string()));
    }

    for name in &signature.headers {
        if name != REQUEST_TARGET && request.header(name).is_none() {
            return Err(ValidationError::MissingSignedHeader(name.clone()));
        }
    }

    if digest_signed {
        let digest = request.header("digest").unwrap_or_default();
        if !verify_digest(&request.body, digest) {
            return Err(ValidationError::DigestMismatch);
        }
    }

    let names: Vec<&str> = signature.headers.iter().map(String::as_str).collect();
    let signing_string =
        build_signing_string(&request.method, &request.path, &request.headers, &names)
            .map_err(|_| ValidationError::SignatureIsNotValid)?;

    if verify_base64(&signing_string, &signature.signature, public_key_pem) {
        Ok(())
    } else {
        Err(ValidationError::SignatureIsNotValid)
    }
}
