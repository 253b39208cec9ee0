//! Path → permission mapping with ancestor inheritance.
//!
//! # Resolution
//!
//! ```text
//! rules:  /            r-d-s-
//!         /secure      ------
//!         /secure/pub  r-----
//!
//! resolve(/secure/pub/a.txt)  → /secure/pub   (nearest ruled ancestor)
//! resolve(/secure/x/y)        → /secure
//! resolve(/public)            → /
//! resolve(/secure)            → /secure       (exact match wins)
//! ```
//!
//! An explicit rule replaces whatever its ancestors say; rules are never
//! merged. The root rule is stored outside the map so resolution always
//! has somewhere to land.

use crate::{CanonicalPath, PermissionSet, PolicyError};
use std::collections::btree_map;
use std::collections::BTreeMap;
use std::iter;

/// Explicit rules keyed by canonical path. `/` always has a rule.
///
/// # Example
///
/// ```
/// use pathguard_policy::{normalize, PermissionSet, PolicyTree};
///
/// let mut tree = PolicyTree::new(PermissionSet::console_default());
/// tree.set_rule(normalize("/secure"), PermissionSet::blocked());
///
/// assert!(!tree.resolve(&normalize("/secure/nested/file")).read());
/// assert!(tree.resolve(&normalize("/public")).read());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyTree {
    root_path: CanonicalPath,
    root: PermissionSet,
    rules: BTreeMap<CanonicalPath, PermissionSet>,
}

impl Default for PolicyTree {
    fn default() -> Self {
        Self::new(PermissionSet::console_default())
    }
}

impl PolicyTree {
    /// Creates a tree holding only the root rule.
    #[must_use]
    pub fn new(root: PermissionSet) -> Self {
        Self {
            root_path: CanonicalPath::root(),
            root,
            rules: BTreeMap::new(),
        }
    }

    /// Builds a tree from a full rule mapping.
    ///
    /// A `/` entry in `rules` becomes the root rule; `root_default` is used
    /// only when the mapping has none.
    #[must_use]
    pub fn from_rules<I>(root_default: PermissionSet, rules: I) -> Self
    where
        I: IntoIterator<Item = (CanonicalPath, PermissionSet)>,
    {
        let mut tree = Self::new(root_default);
        for (path, perms) in rules {
            tree.set_rule(path, perms);
        }
        tree
    }

    /// Effective permissions for `path`.
    #[must_use]
    pub fn resolve(&self, path: &CanonicalPath) -> PermissionSet {
        self.resolve_with_source(path).1
    }

    /// Effective permissions together with the path whose rule supplied them.
    #[must_use]
    pub fn resolve_with_source(&self, path: &CanonicalPath) -> (&CanonicalPath, PermissionSet) {
        if let Some((p, perms)) = self.lookup(path) {
            return (p, perms);
        }
        for ancestor in path.ancestors() {
            if let Some((p, perms)) = self.lookup(&ancestor) {
                return (p, perms);
            }
        }
        (&self.root_path, self.root)
    }

    /// The explicit rule at `path`, ignoring inheritance.
    #[must_use]
    pub fn explicit(&self, path: &CanonicalPath) -> Option<PermissionSet> {
        self.lookup(path).map(|(_, perms)| perms)
    }

    /// The root (system-wide default) rule.
    #[must_use]
    pub fn root_rule(&self) -> PermissionSet {
        self.root
    }

    /// Inserts or replaces the rule at `path`. Returns the replaced rule.
    pub fn set_rule(&mut self, path: CanonicalPath, perms: PermissionSet) -> Option<PermissionSet> {
        if path.is_root() {
            return Some(std::mem::replace(&mut self.root, perms));
        }
        self.rules.insert(path, perms)
    }

    /// Removes the explicit rule at `path`, reverting it to inheritance.
    ///
    /// Clearing an absent rule is a no-op returning `Ok(None)`.
    ///
    /// # Errors
    ///
    /// [`PolicyError::InvalidOperation`] when `path` is `/`.
    pub fn clear_rule(&mut self, path: &CanonicalPath) -> Result<Option<PermissionSet>, PolicyError> {
        if path.is_root() {
            return Err(PolicyError::invalid_operation(
                "the root rule can be overwritten but not removed",
            ));
        }
        Ok(self.rules.remove(path))
    }

    /// Number of explicit rules, root included. Never zero.
    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.rules.len().saturating_add(1)
    }

    /// Every explicit rule in path order, root first.
    pub fn iter(&self) -> Rules<'_> {
        Rules {
            inner: iter::once((&self.root_path, &self.root)).chain(self.rules.iter()),
        }
    }

    /// Explicit rules whose permissions fail `requirement`.
    ///
    /// Inherited paths never appear. The iterator is lazy and `Clone`, so a
    /// report can be restarted from a saved copy or by calling this again.
    ///
    /// ```
    /// use pathguard_policy::{normalize, PermissionSet, PolicyTree};
    ///
    /// let mut tree = PolicyTree::default();
    /// tree.set_rule(normalize("/vault"), PermissionSet::blocked());
    /// tree.set_rule(normalize("/open"), PermissionSet::full_access());
    ///
    /// let restricted: Vec<_> = tree
    ///     .list_restricted(PermissionSet::is_browsable)
    ///     .map(|(path, _)| path.to_string())
    ///     .collect();
    /// assert_eq!(restricted, ["/vault"]);
    /// ```
    pub fn list_restricted<F>(&self, requirement: F) -> Restricted<'_, F>
    where
        F: Fn(&PermissionSet) -> bool,
    {
        Restricted {
            rules: self.iter(),
            requirement,
        }
    }

    /// Copies the explicit rules into an owned map (root included).
    #[must_use]
    pub fn to_map(&self) -> BTreeMap<CanonicalPath, PermissionSet> {
        self.iter().map(|(p, perms)| (p.clone(), perms)).collect()
    }

    fn lookup(&self, path: &CanonicalPath) -> Option<(&CanonicalPath, PermissionSet)> {
        if path.is_root() {
            return Some((&self.root_path, self.root));
        }
        self.rules.get_key_value(path).map(|(p, perms)| (p, *perms))
    }
}

type RulesInner<'a> = iter::Chain<
    iter::Once<(&'a CanonicalPath, &'a PermissionSet)>,
    btree_map::Iter<'a, CanonicalPath, PermissionSet>,
>;

/// Iterator over explicit rules, root first.
#[derive(Debug, Clone)]
pub struct Rules<'a> {
    inner: RulesInner<'a>,
}

impl<'a> Iterator for Rules<'a> {
    type Item = (&'a CanonicalPath, PermissionSet);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(p, perms)| (p, *perms))
    }
}

/// Iterator returned by [`PolicyTree::list_restricted`].
#[derive(Debug, Clone)]
pub struct Restricted<'a, F> {
    rules: Rules<'a>,
    requirement: F,
}

impl<'a, F> Iterator for Restricted<'a, F>
where
    F: Fn(&PermissionSet) -> bool,
{
    type Item = (&'a CanonicalPath, PermissionSet);

    fn next(&mut self) -> Option<Self::Item> {
        let requirement = &self.requirement;
        self.rules.find(|(_, perms)| !requirement(perms))
    }
}
