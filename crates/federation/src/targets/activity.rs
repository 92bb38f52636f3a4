//! An already-built activity, POSTed as is.

use reqwest::Method;

use super::{TargetError, TargetType};
use crate::activities::Activity;

/// Sends a prebuilt activity, e.g. one taken off the delivery queue.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityTarget(pub Activity);

impl TargetType for ActivityTarget {
    fn method(&self) -> Method {
        Method::POST
    }

    fn body(&self) -> Result<Option<Vec<u8>>, TargetError> {
        Ok(Some(self.0.to_canonical_bytes()?))
    }
}
