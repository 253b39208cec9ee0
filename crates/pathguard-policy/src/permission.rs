//! Permission sets.
//!
//! A [`PermissionSet`] is the value stored against a path: six independent
//! capabilities backed by the [`Access`] bitflags.
//!
//! # Independence
//!
//! No capability implies another. In particular `download` does not imply
//! `read`; a caller that wants "download requires read" must check both.
//! The engine enforces exactly the flag an operation maps to.
//!
//! # Presets
//!
//! | Preset | read | write | download | execute | search | delete |
//! |--------|------|-------|----------|---------|--------|--------|
//! | [`console_default`](PermissionSet::console_default) | ✓ | | ✓ | | ✓ | |
//! | [`full_access`](PermissionSet::full_access) | ✓ | ✓ | ✓ | ✓ | ✓ | ✓ |
//! | [`blocked`](PermissionSet::blocked) | | | | | | |

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

bitflags! {
    /// Capabilities gated per path.
    ///
    /// | Flag | Operation |
    /// |------|-----------|
    /// | [`READ`](Self::READ) | list / open |
    /// | [`WRITE`](Self::WRITE) | create / modify |
    /// | [`DOWNLOAD`](Self::DOWNLOAD) | transfer to the browser |
    /// | [`EXECUTE`](Self::EXECUTE) | run on the agent host |
    /// | [`SEARCH`](Self::SEARCH) | recursive search |
    /// | [`DELETE`](Self::DELETE) | remove |
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Access: u8 {
        const READ     = 0b0000_0001;
        const WRITE    = 0b0000_0010;
        const DOWNLOAD = 0b0000_0100;
        const EXECUTE  = 0b0000_1000;
        const SEARCH   = 0b0001_0000;
        const DELETE   = 0b0010_0000;
    }
}

/// Immutable set of the six path capabilities.
///
/// Edits produce a new value ([`with`](Self::with)); a stored rule is
/// always replaced as a whole, never patched field by field.
///
/// # Example
///
/// ```
/// use pathguard_policy::{Access, PermissionSet};
///
/// let base = PermissionSet::console_default();
/// assert!(base.read() && base.download() && base.search());
/// assert!(!base.write());
///
/// let edited = base.with(Access::DELETE, true);
/// assert!(edited.delete());
/// assert!(!base.delete()); // base untouched
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "PermissionFields", into = "PermissionFields")]
pub struct PermissionSet {
    access: Access,
}

impl PermissionSet {
    /// Builds a set from the six flags in declaration order.
    #[must_use]
    pub fn new(
        read: bool,
        write: bool,
        download: bool,
        execute: bool,
        search: bool,
        delete: bool,
    ) -> Self {
        let mut access = Access::empty();
        access.set(Access::READ, read);
        access.set(Access::WRITE, write);
        access.set(Access::DOWNLOAD, download);
        access.set(Access::EXECUTE, execute);
        access.set(Access::SEARCH, search);
        access.set(Access::DELETE, delete);
        Self { access }
    }

    /// Builds a set from raw flags.
    #[must_use]
    pub const fn from_access(access: Access) -> Self {
        Self { access }
    }

    /// Root default of the admin console: read, download and search.
    #[must_use]
    pub const fn console_default() -> Self {
        Self::from_access(Access::READ.union(Access::DOWNLOAD).union(Access::SEARCH))
    }

    /// Every capability granted.
    #[must_use]
    pub const fn full_access() -> Self {
        Self::from_access(Access::all())
    }

    /// Every capability denied.
    #[must_use]
    pub const fn blocked() -> Self {
        Self::from_access(Access::empty())
    }

    /// Raw flags.
    #[must_use]
    pub fn access(&self) -> Access {
        self.access
    }

    /// Returns `true` if every flag in `access` is granted.
    #[must_use]
    pub fn allows(&self, access: Access) -> bool {
        self.access.contains(access)
    }

    /// Returns a copy with `access` set to `enabled`.
    #[must_use]
    pub fn with(self, access: Access, enabled: bool) -> Self {
        let mut next = self.access;
        next.set(access, enabled);
        Self { access: next }
    }

    #[must_use]
    pub fn read(&self) -> bool {
        self.allows(Access::READ)
    }

    #[must_use]
    pub fn write(&self) -> bool {
        self.allows(Access::WRITE)
    }

    #[must_use]
    pub fn download(&self) -> bool {
        self.allows(Access::DOWNLOAD)
    }

    #[must_use]
    pub fn execute(&self) -> bool {
        self.allows(Access::EXECUTE)
    }

    #[must_use]
    pub fn search(&self) -> bool {
        self.allows(Access::SEARCH)
    }

    #[must_use]
    pub fn delete(&self) -> bool {
        self.allows(Access::DELETE)
    }

    /// `read && download`: a folder that fails this is reported as restricted.
    #[must_use]
    pub fn is_browsable(&self) -> bool {
        self.allows(Access::READ | Access::DOWNLOAD)
    }

    /// Names of the granted flags, in declaration order.
    #[must_use]
    pub fn granted_names(&self) -> Vec<&'static str> {
        self.access
            .iter_names()
            .map(|(name, _)| name)
            .collect()
    }
}

impl Default for PermissionSet {
    fn default() -> Self {
        Self::console_default()
    }
}

impl fmt::Display for PermissionSet {
    /// Compact `rwdxsk` form with `-` for denied flags, e.g. `r-d-s-`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flags = [
            (Access::READ, 'r'),
            (Access::WRITE, 'w'),
            (Access::DOWNLOAD, 'd'),
            (Access::EXECUTE, 'x'),
            (Access::SEARCH, 's'),
            (Access::DELETE, 'k'),
        ];
        for (flag, c) in flags {
            let shown = if self.allows(flag) { c } else { '-' };
            write!(f, "{shown}")?;
        }
        Ok(())
    }
}

/// Field-per-flag serde shape (`{ read = true, write = false, ... }`).
///
/// Missing fields deserialize as `false`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
struct PermissionFields {
    read: bool,
    write: bool,
    download: bool,
    execute: bool,
    search: bool,
    delete: bool,
}

impl From<PermissionFields> for PermissionSet {
    fn from(f: PermissionFields) -> Self {
        Self::new(f.read, f.write, f.download, f.execute, f.search, f.delete)
    }
}

impl From<PermissionSet> for PermissionFields {
    fn from(p: PermissionSet) -> Self {
        Self {
            read: p.read(),
            write: p.write(),
            download: p.download(),
            execute: p.execute(),
            search: p.search(),
            delete: p.delete(),
        }
    }
}
