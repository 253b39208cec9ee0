//! Path-scoped permission primitives for PathGuard.
//!
//! Everything in this crate is synchronous, allocation-light and free of
//! I/O. The runtime crate wraps it with remote sync, auditing and locking.
//!
//! # Model
//!
//! ```text
//! raw path ──► PathNormalizer ──► CanonicalPath ──► PolicyTree::resolve ──► PermissionSet
//!                                                                            │
//!                                   OperationKind ──► Access flag ──────────►├──► Decision
//! ```
//!
//! | Type | Role |
//! |------|------|
//! | [`CanonicalPath`] | Normalized lookup key |
//! | [`PermissionSet`] | Six independent capabilities for one path |
//! | [`PolicyTree`] | Explicit rules with nearest-ancestor inheritance |
//! | [`OperationKind`] / [`Decision`] | What is asked and what is answered |
//!
//! # Crate Architecture
//!
//! ```text
//! pathguard-types
//!        ↑
//! pathguard-policy   ◄── THIS CRATE
//!        ↑
//! pathguard-runtime
//! ```

pub mod error;
pub mod operation;
pub mod path;
pub mod permission;
pub mod tree;

pub use error::PolicyError;
pub use operation::{Decision, OperationKind, UnknownOperationPolicy};
pub use path::{normalize, CanonicalPath, PathNormalizer};
pub use permission::{Access, PermissionSet};
pub use tree::{PolicyTree, Restricted, Rules};
