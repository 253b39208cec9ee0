//! Bounded audit trail of decisions and rule changes.
//!
//! The log is a ring: once `capacity` entries are held, each append evicts
//! the oldest one. Appends never fail and never block on I/O; every entry is
//! also emitted as a `tracing` event so that a subscriber can persist it.
//!
//! | Severity | tracing level | Typical source |
//! |----------|---------------|----------------|
//! | `info` | INFO | allowed checks |
//! | `warning` | WARN | denied checks, unknown operations, degraded mode |
//! | `error` | ERROR | failed pushes and refreshes |
//! | `security` | WARN (`security = true`) | confirmed rule changes |

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use pathguard_policy::CanonicalPath;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

/// Default number of retained entries.
pub const DEFAULT_AUDIT_CAPACITY: usize = 1_000;

/// Audit entry severity, ordered from least to most notable.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Info,
    Warning,
    Error,
    Security,
}

impl Severity {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Security => "security",
        }
    }

    /// Parses a lowercase severity name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "info" => Some(Self::Info),
            "warning" | "warn" => Some(Self::Warning),
            "error" => Some(Self::Error),
            "security" => Some(Self::Security),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One audit record. Holds everything by value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Monotonic per-log sequence number, starting at 1.
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub path: CanonicalPath,
    pub message: String,
    pub severity: Severity,
}

/// Selection criteria for [`AuditLog::query`]. All criteria combine with AND.
///
/// # Example
///
/// ```
/// use pathguard_policy::normalize;
/// use pathguard_runtime::{AuditFilter, Severity};
///
/// let filter = AuditFilter::new()
///     .min_severity(Severity::Warning)
///     .under(normalize("/secure"))
///     .limit(10);
/// # let _ = filter;
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditFilter {
    min_severity: Option<Severity>,
    severity: Option<Severity>,
    prefix: Option<CanonicalPath>,
    limit: Option<usize>,
}

impl AuditFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps entries at or above `severity`.
    #[must_use]
    pub fn min_severity(mut self, severity: Severity) -> Self {
        self.min_severity = Some(severity);
        self
    }

    /// Keeps entries with exactly `severity`.
    #[must_use]
    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    /// Keeps entries whose path is `prefix` or lies beneath it.
    #[must_use]
    pub fn under(mut self, prefix: CanonicalPath) -> Self {
        self.prefix = Some(prefix);
        self
    }

    /// Stops after `n` matches.
    #[must_use]
    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    /// Returns `true` if `entry` passes every criterion except the limit.
    #[must_use]
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        self.min_severity.is_none_or(|min| entry.severity >= min)
            && self.severity.is_none_or(|s| entry.severity == s)
            && self
                .prefix
                .as_ref()
                .is_none_or(|prefix| entry.path.starts_with(prefix))
    }
}

#[derive(Debug)]
struct Ring {
    entries: VecDeque<AuditEntry>,
    next_seq: u64,
}

/// Bounded, append-only audit log.
///
/// Cloning the log shares the same buffer.
///
/// # Example
///
/// ```
/// use pathguard_policy::normalize;
/// use pathguard_runtime::{AuditFilter, AuditLog, Severity};
///
/// let log = AuditLog::new(2);
/// log.append(normalize("/a"), "first", Severity::Info);
/// log.append(normalize("/b"), "second", Severity::Warning);
/// log.append(normalize("/c"), "third", Severity::Error);
///
/// assert_eq!(log.len(), 2);
/// let warnings: Vec<_> = log
///     .query(AuditFilter::new().min_severity(Severity::Warning))
///     .map(|e| e.message)
///     .collect();
/// assert_eq!(warnings, ["second", "third"]);
/// ```
#[derive(Debug, Clone)]
pub struct AuditLog {
    ring: Arc<Mutex<Ring>>,
    capacity: usize,
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new(DEFAULT_AUDIT_CAPACITY)
    }
}

impl AuditLog {
    /// Creates a log holding at most `capacity` entries (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            ring: Arc::new(Mutex::new(Ring {
                entries: VecDeque::with_capacity(capacity.min(DEFAULT_AUDIT_CAPACITY)),
                next_seq: 1,
            })),
            capacity,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records an entry, evicting the oldest one when full. Returns the
    /// entry's sequence number.
    pub fn append(
        &self,
        path: CanonicalPath,
        message: impl Into<String>,
        severity: Severity,
    ) -> u64 {
        let message = message.into();
        emit(&path, &message, severity);

        let mut ring = self.ring.lock();
        let seq = ring.next_seq;
        ring.next_seq = ring.next_seq.saturating_add(1);
        while ring.entries.len() >= self.capacity {
            ring.entries.pop_front();
        }
        ring.entries.push_back(AuditEntry {
            seq,
            timestamp: Utc::now(),
            path,
            message,
            severity,
        });
        seq
    }

    /// Entries matching `filter`, oldest first.
    ///
    /// The returned iterator works on a snapshot taken at call time, so
    /// appends made while iterating are not observed and never block.
    pub fn query(&self, filter: AuditFilter) -> impl Iterator<Item = AuditEntry> {
        let snapshot: Vec<AuditEntry> = self.ring.lock().entries.iter().cloned().collect();
        let limit = filter.limit.unwrap_or(usize::MAX);
        snapshot
            .into_iter()
            .filter(move |entry| filter.matches(entry))
            .take(limit)
    }

    /// Every retained entry, oldest first.
    #[must_use]
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.query(AuditFilter::new()).collect()
    }
}

fn emit(path: &CanonicalPath, message: &str, severity: Severity) {
    match severity {
        Severity::Info => tracing::info!(target: "pathguard::audit", %path, "{message}"),
        Severity::Warning => tracing::warn!(target: "pathguard::audit", %path, "{message}"),
        Severity::Error => tracing::error!(target: "pathguard::audit", %path, "{message}"),
        Severity::Security => {
            tracing::warn!(target: "pathguard::audit", %path, security = true, "{message}")
        }
    }
}
