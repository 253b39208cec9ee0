//! Canonical paths and the normalizer that produces them.
//!
//! Every rule lookup is keyed by a [`CanonicalPath`]. Raw strings coming
//! from the browser, the agent or the operator are turned into canonical
//! form by [`PathNormalizer::normalize`], which is total: malformed input
//! degrades to a best-effort canonical form instead of failing.
//!
//! # Canonical Form
//!
//! ```text
//! ""                 → /
//! "/"                → /
//! "C:"               → C:/
//! "C:Users\\bob"     → C:/Users/bob
//! "D:\\data\\\\x"    → D:/data/x
//! "//srv///share/"   → /srv/share/
//! "docs"             → /docs
//! ```
//!
//! Trailing separators are kept (only collapsed), so `/a/` and `/a` are
//! distinct keys; ancestor resolution treats them as the same directory.

use crate::PolicyError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A normalized path used as the sole key for rule lookup.
///
/// Construct one with [`PathNormalizer::normalize`] (or the [`normalize`]
/// shortcut). Non-drive paths always begin with `/`; drive paths begin with
/// `X:/`. Only `/` is used as separator and separators never repeat.
///
/// # Example
///
/// ```
/// use pathguard_policy::{normalize, CanonicalPath};
///
/// let p = normalize("C:Users\\bob");
/// assert_eq!(p.as_str(), "C:/Users/bob");
/// assert!(p.is_drive_rooted());
/// assert!(normalize("").is_root());
/// assert_eq!(normalize("/"), CanonicalPath::root());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CanonicalPath(String);

impl CanonicalPath {
    /// The root path `/`.
    #[must_use]
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Returns the canonical string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` for `/`.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Returns `true` when the path starts with a drive prefix (`C:/`).
    #[must_use]
    pub fn is_drive_rooted(&self) -> bool {
        has_drive_prefix(&self.0)
    }

    /// Non-empty path segments. For drive paths the first segment is the
    /// drive itself (`"C:"`).
    pub fn segments(&self) -> impl Iterator<Item = &str> + '_ {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// Strict ancestors from the nearest directory up to `/`.
    ///
    /// The path itself is never yielded; `/` is always yielded last unless
    /// the path is `/`. A trailing separator does not count as a level, so
    /// `/a/` yields `/a` before `/`.
    ///
    /// ```
    /// use pathguard_policy::normalize;
    ///
    /// let chain: Vec<String> = normalize("C:/Users/bob")
    ///     .ancestors()
    ///     .into_iter()
    ///     .map(|p| p.as_str().to_string())
    ///     .collect();
    /// assert_eq!(chain, ["C:/Users", "C:/", "/"]);
    /// ```
    #[must_use]
    pub fn ancestors(&self) -> Vec<CanonicalPath> {
        if self.is_root() {
            return Vec::new();
        }
        let segments: Vec<&str> = self.segments().collect();
        let drive = self.is_drive_rooted();
        let mut chain = Vec::with_capacity(segments.len().saturating_add(1));
        for depth in (1..=segments.len()).rev() {
            let candidate = render(&segments[..depth], drive);
            if candidate != self.0 {
                chain.push(Self(candidate));
            }
        }
        chain.push(Self::root());
        chain
    }

    /// Segment-aware prefix test: `/a` is a prefix of `/a/b` but not of `/ab`.
    ///
    /// `/` is a prefix of every path.
    #[must_use]
    pub fn starts_with(&self, prefix: &CanonicalPath) -> bool {
        if prefix.is_root() || self.0 == prefix.0 {
            return true;
        }
        if prefix.0.ends_with('/') {
            return self.0.starts_with(&prefix.0);
        }
        self.0
            .strip_prefix(&prefix.0)
            .is_some_and(|rest| rest.starts_with('/'))
    }

    /// Wraps a string already known to be canonical.
    pub(crate) fn from_canonical(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for CanonicalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CanonicalPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for CanonicalPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for CanonicalPath {
    /// Deserialized paths are re-normalized (case-sensitive) so that a
    /// hand-edited snapshot can never smuggle in a non-canonical key.
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(normalize(&raw))
    }
}

/// Canonicalizes raw path strings.
///
/// The only knob is case sensitivity: when disabled, canonical forms are
/// lowercased so `C:/Users` and `c:/users` share one rule.
///
/// # Example
///
/// ```
/// use pathguard_policy::PathNormalizer;
///
/// let strict = PathNormalizer::default();
/// assert_eq!(strict.normalize("C:\\Data").as_str(), "C:/Data");
///
/// let folded = PathNormalizer::new(false);
/// assert_eq!(folded.normalize("C:\\Data").as_str(), "c:/data");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathNormalizer {
    case_sensitive: bool,
}

impl Default for PathNormalizer {
    fn default() -> Self {
        Self {
            case_sensitive: true,
        }
    }
}

impl PathNormalizer {
    /// Creates a normalizer with the given case sensitivity.
    #[must_use]
    pub fn new(case_sensitive: bool) -> Self {
        Self { case_sensitive }
    }

    /// Returns whether canonical forms keep their case.
    #[must_use]
    pub fn is_case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    /// Canonicalizes `raw`. Deterministic, idempotent and total.
    #[must_use]
    pub fn normalize(&self, raw: &str) -> CanonicalPath {
        if raw.trim().is_empty() || raw == "/" {
            return CanonicalPath::root();
        }

        let mut s = raw.to_string();

        // Drive letter not followed by '/' gets one ("C:" → "C:/", "C:x" → "C:/x").
        if has_drive_prefix(&s) && s.as_bytes().get(2) != Some(&b'/') {
            s.insert(2, '/');
        }

        let s = s.replace('\\', "/");

        let mut out = String::with_capacity(s.len().saturating_add(1));
        let mut prev_sep = false;
        for c in s.chars() {
            if c == '/' {
                if prev_sep {
                    continue;
                }
                prev_sep = true;
            } else {
                prev_sep = false;
            }
            out.push(c);
        }

        if !out.starts_with('/') && !has_drive_prefix(&out) {
            out.insert(0, '/');
        }

        if !self.case_sensitive {
            out = out.to_lowercase();
        }

        CanonicalPath::from_canonical(out)
    }

    /// Strict variant used before a rule is written.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidPath`] when `raw` contains NUL or other
    /// ASCII control characters, which no agent filesystem accepts.
    pub fn validate(&self, raw: &str) -> Result<CanonicalPath, PolicyError> {
        if let Some(c) = raw.chars().find(|c| c.is_ascii_control()) {
            return Err(PolicyError::invalid_path(
                raw,
                format!("contains control character U+{:04X}", u32::from(c)),
            ));
        }
        Ok(self.normalize(raw))
    }
}

/// Canonicalizes `raw` with the default (case-sensitive) normalizer.
#[must_use]
pub fn normalize(raw: &str) -> CanonicalPath {
    PathNormalizer::default().normalize(raw)
}

fn has_drive_prefix(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() >= 2 && b[0].is_ascii_alphabetic() && b[1] == b':'
}

fn render(segments: &[&str], drive: bool) -> String {
    match segments.split_first() {
        Some((first, rest)) if drive => {
            if rest.is_empty() {
                format!("{first}/")
            } else {
                format!("{first}/{}", rest.join("/"))
            }
        }
        _ => format!("/{}", segments.join("/")),
    }
}
