//! Runtime errors.
//!
//! Three layers, each with its own code namespace:
//!
//! | Type | Prefix | Raised by |
//! |------|--------|-----------|
//! | [`GuardError`] | `POLICY_` | [`PolicyEngine`](crate::PolicyEngine) mutations and refresh |
//! | [`StoreError`] | `STORE_` | [`PolicyStore`](crate::PolicyStore) implementations, snapshot cache |
//! | [`DirectoryError`] | `DIRECTORY_` | [`DirectoryProvider`](crate::DirectoryProvider), [`GuardedDirectory`](crate::GuardedDirectory) |
//!
//! A denied [`check`](crate::PolicyEngine::check) is not an error: it is a
//! [`Decision::Deny`](pathguard_policy::Decision) plus an audit entry.

use pathguard_policy::{CanonicalPath, OperationKind, PolicyError};
use pathguard_types::ErrorCode;
use std::time::Duration;
use thiserror::Error;

/// Failure talking to the remote policy store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Transport failure: connection refused, DNS, reset.
    ///
    /// A pull that hits this falls back to degraded mode.
    #[error("policy store unreachable at {endpoint}: {message}")]
    Unreachable { endpoint: String, message: String },

    /// The store answered and refused the request.
    #[error("policy store rejected the request (status {status}): {message}")]
    Rejected { status: u16, message: String },

    /// No answer within the configured bound.
    #[error("policy store did not answer within {0:?}")]
    Timeout(Duration),

    /// A payload could not be encoded or decoded.
    #[error("policy payload could not be decoded: {0}")]
    Codec(String),

    /// Local snapshot file could not be read or written.
    #[error("snapshot I/O failed for '{path}': {message}")]
    Io { path: String, message: String },
}

impl StoreError {
    pub fn unreachable(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unreachable {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        Self::Rejected {
            status,
            message: message.into(),
        }
    }

    pub fn io(path: impl AsRef<std::path::Path>, source: &std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            message: source.to_string(),
        }
    }

    /// Returns `true` when the remote could not be contacted at all.
    ///
    /// These failures put a pull into degraded mode; everything else is a
    /// hard error.
    #[must_use]
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Unreachable { .. } | Self::Timeout(_))
    }
}

impl ErrorCode for StoreError {
    fn code(&self) -> &'static str {
        match self {
            Self::Unreachable { .. } => "STORE_UNREACHABLE",
            Self::Rejected { .. } => "STORE_REJECTED",
            Self::Timeout(_) => "STORE_TIMEOUT",
            Self::Codec(_) => "STORE_CODEC",
            Self::Io { .. } => "STORE_IO",
        }
    }

    fn is_recoverable(&self) -> bool {
        self.is_connectivity()
    }
}

/// Error returned by [`PolicyEngine`](crate::PolicyEngine).
#[derive(Debug, Error)]
pub enum GuardError {
    /// The raw path was refused before any state changed.
    #[error("invalid path '{raw}': {reason}")]
    InvalidPath { raw: String, reason: String },

    /// The mutation is not allowed (e.g. resetting `/`).
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// The remote store did not confirm a rule change; the local tree was
    /// rolled back.
    #[error("rule change for '{path}' was not persisted: {source}")]
    PersistenceFailed {
        path: CanonicalPath,
        #[source]
        source: StoreError,
    },

    /// The remote store refused a pull. Connectivity failures never land
    /// here; they put the engine into degraded mode instead.
    #[error("policy refresh rejected: {0}")]
    SyncRejected(#[source] StoreError),
}

impl GuardError {
    /// The store failure behind this error, if any.
    #[must_use]
    pub fn store_cause(&self) -> Option<&StoreError> {
        match self {
            Self::PersistenceFailed { source, .. } | Self::SyncRejected(source) => Some(source),
            _ => None,
        }
    }
}

impl From<PolicyError> for GuardError {
    fn from(err: PolicyError) -> Self {
        match err {
            PolicyError::InvalidPath { raw, reason } => Self::InvalidPath { raw, reason },
            PolicyError::InvalidOperation(msg) => Self::InvalidOperation(msg),
        }
    }
}

impl ErrorCode for GuardError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidPath { .. } => "POLICY_INVALID_PATH",
            Self::InvalidOperation(_) => "POLICY_INVALID_OPERATION",
            Self::PersistenceFailed { .. } => "POLICY_PERSISTENCE_FAILED",
            Self::SyncRejected(_) => "POLICY_SYNC_REJECTED",
        }
    }

    fn is_recoverable(&self) -> bool {
        self.store_cause().is_some_and(|e| e.is_recoverable())
    }
}

/// Error returned by directory providers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    /// The policy engine denied the operation; the agent was not contacted.
    #[error("{operation} denied on '{path}'")]
    Denied {
        path: CanonicalPath,
        operation: OperationKind,
    },

    /// The agent could not be contacted.
    #[error("agent unreachable at {endpoint}: {message}")]
    Unreachable { endpoint: String, message: String },

    /// The agent answered with an error (usually an OS permission issue).
    #[error("agent error: {0}")]
    Agent(String),

    /// The agent's payload could not be decoded.
    #[error("agent payload could not be decoded: {0}")]
    Codec(String),
}

impl ErrorCode for DirectoryError {
    fn code(&self) -> &'static str {
        match self {
            Self::Denied { .. } => "DIRECTORY_DENIED",
            Self::Unreachable { .. } => "DIRECTORY_UNREACHABLE",
            Self::Agent(_) => "DIRECTORY_AGENT_ERROR",
            Self::Codec(_) => "DIRECTORY_CODEC",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(self, Self::Unreachable { .. })
    }
}
