//! Signed fetches of an actor and its collections.

use reqwest::Method;
use url::Url;

use super::{TargetError, TargetType, append_path};

/// Signed GETs against an actor. The base URL is the actor id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersonTarget {
    Profile,
    Outbox,
    Followers,
    Following,
}

impl TargetType for PersonTarget {
    fn method(&self) -> Method {
        Method::GET
    }

    fn endpoint(&self, base: &Url) -> Result<Url, TargetError> {
        Ok(match self {
            Self::Profile => base.clone(),
            Self::Outbox => append_path(base, "outbox"),
            Self::Followers => append_path(base, "followers"),
            Self::Following => append_path(base, "following"),
        })
    }

    fn body(&self) -> Result<Option<Vec<u8>>, TargetError> {
        Ok(None)
    }
}
