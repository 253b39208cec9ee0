//! Unified error interface for PathGuard.
//!
//! Every error enum in the workspace implements [`ErrorCode`] so that the
//! CLI, audit trail and log lines can report a stable, machine-readable
//! code next to the human message.
//!
//! # Example
//!
//! ```
//! use pathguard_types::ErrorCode;
//!
//! #[derive(Debug)]
//! enum StoreFault {
//!     Offline,
//!     Refused,
//! }
//!
//! impl ErrorCode for StoreFault {
//!     fn code(&self) -> &'static str {
//!         match self {
//!             Self::Offline => "STORE_OFFLINE",
//!             Self::Refused => "STORE_REFUSED",
//!         }
//!     }
//!
//!     fn is_recoverable(&self) -> bool {
//!         matches!(self, Self::Offline)
//!     }
//! }
//!
//! let err = StoreFault::Offline;
//! assert_eq!(err.code(), "STORE_OFFLINE");
//! assert!(err.is_recoverable());
//! ```

/// Machine-readable error code contract.
///
/// # Code Format
///
/// - **UPPER_SNAKE_CASE**: e.g. `"POLICY_INVALID_PATH"`
/// - **Namespace-prefixed** by layer: `POLICY_`, `STORE_`, `CONFIG_`, `DIRECTORY_`
/// - **Stable**: codes are part of the CLI output contract
///
/// # Recoverability
///
/// An error is recoverable when retrying (by the caller, never inside the
/// engine) may succeed: transport failures and timeouts. Rejections by the
/// remote store and invalid input are not.
pub trait ErrorCode {
    /// Returns a machine-readable error code.
    fn code(&self) -> &'static str;

    /// Returns whether a caller-driven retry may succeed.
    fn is_recoverable(&self) -> bool;
}

/// Validates that an error code follows workspace conventions.
///
/// # Panics
///
/// Panics if the code is empty, lacks `expected_prefix`, or is not
/// UPPER_SNAKE_CASE. Intended for tests.
///
/// # Example
///
/// ```
/// use pathguard_types::{assert_error_code, ErrorCode};
///
/// struct Timeout;
///
/// impl ErrorCode for Timeout {
///     fn code(&self) -> &'static str { "STORE_TIMEOUT" }
///     fn is_recoverable(&self) -> bool { true }
/// }
///
/// assert_error_code(&Timeout, "STORE_");
/// ```
pub fn assert_error_code<E: ErrorCode>(err: &E, expected_prefix: &str) {
    let code = err.code();

    assert!(!code.is_empty(), "Error code must not be empty");
    assert!(
        code.starts_with(expected_prefix),
        "Error code '{code}' must start with prefix '{expected_prefix}'"
    );
    assert!(
        is_upper_snake_case(code),
        "Error code '{code}' must be UPPER_SNAKE_CASE"
    );
}

fn is_upper_snake_case(s: &str) -> bool {
    !s.starts_with('_')
        && !s.ends_with('_')
        && !s.contains("__")
        && s.chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}
