//! The three-valued routing class attached to every classified request.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Which backend version pool may serve a request.
///
/// The wire form (propagation header value) is the upper-case tag:
/// `ALL`, `PROD` or `GRAY`. Parsing is case-sensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RoutingClass {
    /// No restriction, the candidate pool is left unfiltered.
    All,
    /// Only instances carrying the production version label.
    Prod,
    /// Only instances carrying the gray (canary) version label.
    Gray,
}

impl RoutingClass {
    pub const ALL_CLASSES: [Self; 3] = [Self::All, Self::Prod, Self::Gray];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::All => "ALL",
            Self::Prod => "PROD",
            Self::Gray => "GRAY",
        }
    }

    /// Parse a header value, returning `None` for anything that is not
    /// exactly one of the three tags.
    #[must_use]
    pub fn from_header_value(value: &str) -> Option<Self> {
        value.parse().ok()
    }
}

impl fmt::Display for RoutingClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown routing class '{0}' (expected ALL, PROD or GRAY)")]
pub struct UnknownRoutingClass(pub String);

impl FromStr for RoutingClass {
    type Err = UnknownRoutingClass;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ALL" => Ok(Self::All),
            "PROD" => Ok(Self::Prod),
            "GRAY" => Ok(Self::Gray),
            other => Err(UnknownRoutingClass(other.to_string())),
        }
    }
}
