//! Outbound request targets.
//!
//! Every outbound call is described by a [`TargetType`]: one enum per
//! action family, one variant per action, each variant carrying exactly the
//! parameters its document needs. A target knows its HTTP method, how to
//! reach its endpoint from a base URL, its body, and how to sign itself.
//! Building a request is pure; [`crate::client::FederationClient`] does the
//! network part.

use std::collections::HashMap;

use apub_common::KeyMaterial;
use apub_common::http_signature::{
    SIGNED_HEADERS_WITH_BODY, SIGNED_HEADERS_WITHOUT_BODY, SignatureCodecError, SignatureHeader,
    build_signing_string, calculate_digest, format_http_date, sign,
};
use chrono::{DateTime, Utc};
use reqwest::Method;
use thiserror::Error;
use url::Url;

mod activity;
mod notes;
mod person;
mod users;
mod well_known;

pub use activity::ActivityTarget;
pub use notes::{NoteDraft, NotesTarget};
pub use person::PersonTarget;
pub use users::UsersTarget;
pub use well_known::WellKnownTarget;

/// Media type of ActivityPub documents.
pub const ACTIVITY_JSON: &str = "application/activity+json";

/// Per-call signing identity.
///
/// Passed into every call instead of living on the client, since several
/// local actors may be delivering at once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningContext {
    /// Key id put in the `Signature` header.
    pub key_id: String,
    /// PEM private key. Required for signed targets.
    pub private_key_pem: Option<String>,
    /// `User-Agent` sent with every request.
    pub user_agent: Option<String>,
}

impl SigningContext {
    /// Signing context for a local actor.
    #[must_use]
    pub fn new(keys: &KeyMaterial, user_agent: impl Into<String>) -> Self {
        Self {
            key_id: keys.key_id.clone(),
            private_key_pem: keys.private_key_pem.clone(),
            user_agent: Some(user_agent.into()),
        }
    }

    /// Context for unsigned requests (well-known discovery).
    #[must_use]
    pub fn anonymous(user_agent: impl Into<String>) -> Self {
        Self {
            key_id: String::new(),
            private_key_pem: None,
            user_agent: Some(user_agent.into()),
        }
    }
}

/// Errors building an outbound request.
#[derive(Debug, Error)]
pub enum TargetError {
    #[error("Signing context has no private key")]
    MissingPrivateKey,
    #[error("Target URL has no host")]
    MissingHost,
    #[error("Invalid target URL: {0}")]
    InvalidUrl(String),
    #[error("Failed to serialize document: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Signature(#[from] SignatureCodecError),
}

/// A fully built request, ready to hand to an HTTP client.
#[derive(Debug, Clone)]
pub struct BuiltRequest {
    pub method: Method,
    pub url: Url,
    /// Lowercased header names.
    pub headers: HashMap<String, String>,
    pub body: Option<Vec<u8>>,
}

/// One outbound action.
pub trait TargetType {
    /// HTTP method.
    fn method(&self) -> Method;

    /// Final URL given the base the caller supplied (an inbox, an actor id or
    /// a server origin).
    fn endpoint(&self, base: &Url) -> Result<Url, TargetError> {
        Ok(base.clone())
    }

    /// Request body; `None` for bodiless requests.
    fn body(&self) -> Result<Option<Vec<u8>>, TargetError>;

    /// Unsigned targets only get `Accept` (and `Content-Type` with a body).
    fn is_signed(&self) -> bool {
        true
    }

    /// `Accept` header value.
    fn accept(&self) -> &'static str {
        ACTIVITY_JSON
    }

    /// Header set for a request to `url`, signing over `(request-target)`,
    /// `host`, `date` and, with a body, `digest`.
    fn headers(
        &self,
        ctx: &SigningContext,
        url: &Url,
        date: DateTime<Utc>,
        body: Option<&[u8]>,
    ) -> Result<HashMap<String, String>, TargetError> {
        let host = host_header(url).ok_or(TargetError::MissingHost)?;

        let mut headers = HashMap::new();
        headers.insert("accept".to_string(), self.accept().to_string());
        if let Some(body) = body {
            headers.insert("content-type".to_string(), ACTIVITY_JSON.to_string());
            headers.insert("digest".to_string(), calculate_digest(body));
        }
        if !self.is_signed() {
            return Ok(headers);
        }

        let private_key = ctx
            .private_key_pem
            .as_deref()
            .ok_or(TargetError::MissingPrivateKey)?;
        headers.insert("host".to_string(), host);
        headers.insert("date".to_string(), format_http_date(date));

        let signed_headers = if body.is_some() {
            SIGNED_HEADERS_WITH_BODY
        } else {
            SIGNED_HEADERS_WITHOUT_BODY
        };
        let signing_string = build_signing_string(
            self.method().as_str(),
            &request_path(url),
            &headers,
            signed_headers,
        )?;
        let signature = sign(&signing_string, private_key)?;
        headers.insert(
            "signature".to_string(),
            SignatureHeader::to_header_value(&ctx.key_id, signed_headers, &signature),
        );

        Ok(headers)
    }

    /// Resolve the endpoint, serialize the body and compute headers.
    fn build(
        &self,
        ctx: &SigningContext,
        base: &Url,
        date: DateTime<Utc>,
    ) -> Result<BuiltRequest, TargetError> {
        if self.is_signed() && ctx.private_key_pem.is_none() {
            return Err(TargetError::MissingPrivateKey);
        }
        let url = self.endpoint(base)?;
        let body = self.body()?;
        let headers = self.headers(ctx, &url, date, body.as_deref())?;

        Ok(BuiltRequest {
            method: self.method(),
            url,
            headers,
            body,
        })
    }
}

/// `Host` header value: host plus any non-default port.
#[must_use]
pub fn host_header(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

/// Path and query as they appear in `(request-target)`.
#[must_use]
pub fn request_path(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{query}", url.path()),
        None => url.path().to_string(),
    }
}

/// `<actor>/followers`.
pub(crate) fn followers_of(actor: &str) -> String {
    format!("{}/followers", actor.trim_end_matches('/'))
}

/// Append a segment to the path of `base`.
pub(crate) fn append_path(base: &Url, segment: &str) -> Url {
    let mut url = base.clone();
    let path = format!("{}/{segment}", base.path().trim_end_matches('/'));
    url.set_path(&path);
    url
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use apub_common::crypto::generate_rsa_keypair;
    use apub_common::http_signature::{verify_base64, verify_digest};
    use chrono::TimeZone;

    fn context() -> (SigningContext, KeyMaterial) {
        let keys = generate_rsa_keypair("https://local.example/users/alice#main-key").unwrap();
        (SigningContext::new(&keys, "apub-engine/test"), keys)
    }

    fn follow() -> UsersTarget {
        UsersTarget::Follow {
            source: "https://local.example/users/alice".to_string(),
            target: "https://remote.example/users/bob".to_string(),
            follow_id: 7,
        }
    }

    #[test]
    fn test_signed_post_headers_verify() {
        let (ctx, keys) = context();
        let inbox = Url::parse("https://remote.example/users/bob/inbox").unwrap();
        let date = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();

        let request = follow().build(&ctx, &inbox, date).unwrap();
        let body = request.body.as_deref().unwrap();

        assert_eq!(request.method, Method::POST);
        assert_eq!(request.headers["host"], "remote.example");
        assert_eq!(request.headers["date"], "Fri, 01 Mar 2024 12:00:00 GMT");
        assert!(verify_digest(body, &request.headers["digest"]));

        let parsed = SignatureHeader::parse(&request.headers["signature"]);
        assert_eq!(parsed.key_id.as_deref(), Some(keys.key_id.as_str()));
        assert_eq!(
            parsed.headers.unwrap(),
            vec!["(request-target)", "host", "date", "digest"]
        );

        let signing_string = build_signing_string(
            "POST",
            "/users/bob/inbox",
            &request.headers,
            SIGNED_HEADERS_WITH_BODY,
        )
        .unwrap();
        assert!(verify_base64(
            &signing_string,
            &parsed.signature.unwrap(),
            &keys.public_key_pem
        ));
    }

    #[test]
    fn test_missing_private_key() {
        let ctx = SigningContext::anonymous("apub-engine/test");
        let inbox = Url::parse("https://remote.example/inbox").unwrap();

        let result = follow().build(&ctx, &inbox, Utc::now());
        assert!(matches!(result, Err(TargetError::MissingPrivateKey)));
    }

    #[test]
    fn test_host_header_keeps_port() {
        let url = Url::parse("http://localhost:3000/inbox").unwrap();
        assert_eq!(host_header(&url).as_deref(), Some("localhost:3000"));

        let url = Url::parse("https://remote.example:443/inbox").unwrap();
        assert_eq!(host_header(&url).as_deref(), Some("remote.example"));
    }

    #[test]
    fn test_request_path_includes_query() {
        let url = Url::parse("https://r.example/users/bob/outbox?page=true").unwrap();
        assert_eq!(request_path(&url), "/users/bob/outbox?page=true");
    }
}
