//! Unsigned discovery endpoints.

use reqwest::Method;
use url::Url;

use super::{TargetError, TargetType};

/// Well-known discovery documents. The base URL is the server origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WellKnownTarget {
    /// `/.well-known/webfinger?resource=<resource>`, e.g. `acct:bob@remote.example`.
    Webfinger { resource: String },
    /// `/.well-known/nodeinfo` discovery document.
    NodeInfo,
    /// The nodeinfo document the discovery document links to.
    NodeInfo2 { path: String },
    /// `/.well-known/host-meta` (XRD).
    HostMeta,
}

impl TargetType for WellKnownTarget {
    fn method(&self) -> Method {
        Method::GET
    }

    fn endpoint(&self, base: &Url) -> Result<Url, TargetError> {
        let join = |path: &str| {
            base.join(path)
                .map_err(|e| TargetError::InvalidUrl(e.to_string()))
        };
        match self {
            Self::Webfinger { resource } => {
                let mut url = join("/.well-known/webfinger")?;
                url.query_pairs_mut().append_pair("resource", resource);
                Ok(url)
            }
            Self::NodeInfo => join("/.well-known/nodeinfo"),
            Self::NodeInfo2 { path } => join(path),
            Self::HostMeta => join("/.well-known/host-meta"),
        }
    }

    fn body(&self) -> Result<Option<Vec<u8>>, TargetError> {
        Ok(None)
    }

    fn is_signed(&self) -> bool {
        false
    }

    fn accept(&self) -> &'static str {
        match self {
            Self::Webfinger { .. } => "application/jrd+json, application/json",
            Self::NodeInfo | Self::NodeInfo2 { .. } => "application/json",
            Self::HostMeta => "application/xrd+xml",
        }
    }
}
