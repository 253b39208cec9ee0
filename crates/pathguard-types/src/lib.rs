//! Core types for PathGuard.
//!
//! Foundational identifiers and the error-code contract shared by every
//! crate in the workspace.
//!
//! # Crate Architecture
//!
//! ```text
//! pathguard-types    (AgentId, ChangeId, ErrorCode)   ◄── HERE
//!        ↑
//! pathguard-policy   (CanonicalPath, PermissionSet, PolicyTree)
//!        ↑
//! pathguard-runtime  (PolicyEngine, PolicySync, AuditLog, stores, config)
//!        ↑
//! pathguard-cli      (`pathguard` binary)
//! ```

pub mod error;
pub mod id;

pub use error::{assert_error_code, ErrorCode};
pub use id::{AgentId, ChangeId};
