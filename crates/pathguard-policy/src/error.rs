//! Policy-layer errors.
//!
//! Local resolution never fails; only rule mutation can be refused.
//!
//! | Variant | Code | Recoverable |
//! |---------|------|-------------|
//! | [`PolicyError::InvalidPath`] | `POLICY_INVALID_PATH` | No |
//! | [`PolicyError::InvalidOperation`] | `POLICY_INVALID_OPERATION` | No |

use pathguard_types::ErrorCode;
use thiserror::Error;

/// Error returned by rule mutations on a policy tree.
///
/// # Example
///
/// ```
/// use pathguard_policy::{normalize, PolicyError, PolicyTree};
///
/// let mut tree = PolicyTree::default();
/// let err = tree.clear_rule(&normalize("/")).expect_err("root is permanent");
/// assert!(matches!(err, PolicyError::InvalidOperation(_)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    /// Input could not be turned into a usable canonical path.
    #[error("invalid path '{raw}': {reason}")]
    InvalidPath {
        /// The raw input.
        raw: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The operation is not permitted on this tree (e.g. clearing `/`).
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

impl PolicyError {
    /// Creates an `InvalidPath` error.
    pub fn invalid_path(raw: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            raw: raw.into(),
            reason: reason.into(),
        }
    }

    /// Creates an `InvalidOperation` error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation(message.into())
    }
}

impl ErrorCode for PolicyError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidPath { .. } => "POLICY_INVALID_PATH",
            Self::InvalidOperation(_) => "POLICY_INVALID_OPERATION",
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }
}
