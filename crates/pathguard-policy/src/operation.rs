//! Operations and decisions.
//!
//! An [`OperationKind`] names what a caller wants to do to a path. The six
//! known kinds map one-to-one onto an [`Access`] flag; anything else is kept
//! verbatim as [`OperationKind::Other`] and handled by the engine's
//! [`UnknownOperationPolicy`].

use crate::Access;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Operation requested on a path.
///
/// Parsing is total and case-insensitive.
///
/// # Example
///
/// ```
/// use pathguard_policy::{Access, OperationKind};
///
/// let op: OperationKind = "Download".parse().unwrap_or(OperationKind::Read);
/// assert_eq!(op, OperationKind::Download);
/// assert_eq!(op.access(), Some(Access::DOWNLOAD));
///
/// let odd = OperationKind::parse("rename");
/// assert_eq!(odd.access(), None);
/// assert_eq!(odd.as_str(), "rename");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Read,
    Write,
    Download,
    Execute,
    Search,
    Delete,
    /// Any operation without a capability of its own.
    Other(String),
}

impl OperationKind {
    /// Parses an operation name; unknown names become [`Self::Other`].
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let name = raw.trim().to_ascii_lowercase();
        match name.as_str() {
            "read" => Self::Read,
            "write" => Self::Write,
            "download" => Self::Download,
            "execute" => Self::Execute,
            "search" => Self::Search,
            "delete" => Self::Delete,
            _ => Self::Other(name),
        }
    }

    /// The capability this operation requires, or `None` when unknown.
    #[must_use]
    pub fn access(&self) -> Option<Access> {
        match self {
            Self::Read => Some(Access::READ),
            Self::Write => Some(Access::WRITE),
            Self::Download => Some(Access::DOWNLOAD),
            Self::Execute => Some(Access::EXECUTE),
            Self::Search => Some(Access::SEARCH),
            Self::Delete => Some(Access::DELETE),
            Self::Other(_) => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Download => "download",
            Self::Execute => "execute",
            Self::Search => "search",
            Self::Delete => "delete",
            Self::Other(name) => name,
        }
    }

    /// Returns `true` for [`Self::Other`].
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Other(_))
    }
}

impl FromStr for OperationKind {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a permission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    /// `Allow` when `allowed`, otherwise `Deny`.
    #[must_use]
    pub fn from_bool(allowed: bool) -> Self {
        if allowed {
            Self::Allow
        } else {
            Self::Deny
        }
    }

    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    #[must_use]
    pub fn is_denied(&self) -> bool {
        matches!(self, Self::Deny)
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to decide for an operation with no capability flag.
///
/// Defaults to [`Allow`](Self::Allow) (fail-open). Deployments that want
/// fail-closed set `policy.unknown_operation = "deny"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownOperationPolicy {
    #[default]
    Allow,
    Deny,
}

impl UnknownOperationPolicy {
    /// The decision this policy yields.
    #[must_use]
    pub fn decision(&self) -> Decision {
        match self {
            Self::Allow => Decision::Allow,
            Self::Deny => Decision::Deny,
        }
    }
}
