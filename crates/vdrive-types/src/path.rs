//! Canonical node addresses and name validation.
//!
//! A [`VolumePath`] addresses a node relative to its volume root:
//! - The root is the empty path and renders as `/`
//! - Components are separated by `/` and are valid names (see [`validate_name`])
//! - There are no empty, `.` or `..` components
//!
//! Every `VolumePath` value is canonical, so two paths are equal exactly when
//! they address the same location.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{VfsError, VfsResult};

/// Maximum length of a single name in bytes.
pub const MAX_NAME_LEN: usize = 255;

/// Characters that are forbidden anywhere in a name.
const FORBIDDEN_CHARS: &[char] = &['/', '\\', '\0'];

/// Validate a node name, returning `Ok(())` if valid.
///
/// # Examples
///
/// ```
/// use vdrive_types::validate_name;
///
/// assert!(validate_name("report.pdf").is_ok());
/// assert!(validate_name("").is_err());
/// assert!(validate_name("..").is_err());
/// assert!(validate_name("a/b").is_err());
/// ```
pub fn validate_name(name: &str) -> VfsResult<()> {
    if name.is_empty() {
        return Err(VfsError::invalid_name(name, "name must not be empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(VfsError::invalid_name(
            name,
            format!("name is longer than {MAX_NAME_LEN} bytes"),
        ));
    }
    if name == "." || name == ".." {
        return Err(VfsError::invalid_name(name, "reserved name"));
    }
    for ch in FORBIDDEN_CHARS {
        if name.contains(*ch) {
            return Err(VfsError::invalid_name(
                name,
                format!("contains forbidden character: {ch:?}"),
            ));
        }
    }
    Ok(())
}

/// Canonical address of a node inside its volume.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VolumePath(String);

impl VolumePath {
    /// The volume root.
    pub fn root() -> Self {
        Self(String::new())
    }

    /// Parse a caller-supplied path leniently.
    ///
    /// Leading, trailing and repeated `/` as well as `.` components are
    /// dropped. `..` is rejected rather than resolved so a path can never
    /// climb out of its volume.
    pub fn parse(raw: &str) -> VfsResult<Self> {
        let mut parts: Vec<&str> = Vec::new();
        for component in raw.split('/') {
            match component {
                "" | "." => continue,
                ".." => {
                    return Err(VfsError::InvalidArgument(format!(
                        "path {raw:?} must not contain '..'"
                    )))
                }
                name => {
                    validate_name(name)?;
                    parts.push(name);
                }
            }
        }
        Ok(Self(parts.join("/")))
    }

    /// Parse the display form produced by [`fmt::Display`] and accept it
    /// only if it is already canonical.
    pub fn parse_strict(display: &str) -> VfsResult<Self> {
        let rest = display.strip_prefix('/').ok_or_else(|| {
            VfsError::InvalidArgument(format!("path {display:?} must start with '/'"))
        })?;
        let path = Self::parse(rest)?;
        if path.0 != rest {
            return Err(VfsError::InvalidArgument(format!(
                "path {display:?} is not canonical"
            )));
        }
        Ok(path)
    }

    /// Append a single validated name.
    pub fn join(&self, name: &str) -> VfsResult<Self> {
        validate_name(name)?;
        if self.is_root() {
            Ok(Self(name.to_string()))
        } else {
            Ok(Self(format!("{}/{name}", self.0)))
        }
    }

    /// Append another relative path.
    pub fn join_path(&self, other: &VolumePath) -> Self {
        match (self.is_root(), other.is_root()) {
            (_, true) => self.clone(),
            (true, false) => other.clone(),
            (false, false) => Self(format!("{}/{}", self.0, other.0)),
        }
    }

    /// The parent path, or `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(idx) => Some(Self(self.0[..idx].to_string())),
            None => Some(Self::root()),
        }
    }

    /// The last component, or `None` for the root.
    pub fn name(&self) -> Option<&str> {
        if self.is_root() {
            return None;
        }
        Some(match self.0.rfind('/') {
            Some(idx) => &self.0[idx + 1..],
            None => &self.0,
        })
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the components from the root down.
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|c| !c.is_empty())
    }

    /// Number of components (0 for the root).
    pub fn depth(&self) -> usize {
        self.components().count()
    }

    /// Returns `true` if `self` equals `ancestor` or lies beneath it.
    pub fn starts_with(&self, ancestor: &VolumePath) -> bool {
        ancestor.is_root()
            || self.0 == ancestor.0
            || (self.0.starts_with(&ancestor.0) && self.0[ancestor.0.len()..].starts_with('/'))
    }

    /// The path of `self` relative to `base`, if `self` lies at or beneath it.
    pub fn relative_to(&self, base: &VolumePath) -> Option<VolumePath> {
        if !self.starts_with(base) {
            return None;
        }
        if base.is_root() {
            return Some(self.clone());
        }
        let rest = self.0[base.0.len()..].trim_start_matches('/');
        Some(Self(rest.to_string()))
    }

    /// The canonical relative form (`""` for the root, `a/b` otherwise).
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for VolumePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VolumePath({self})")
    }
}

impl fmt::Display for VolumePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.0)
    }
}

impl TryFrom<String> for VolumePath {
    type Error = VfsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse_strict(&value)
    }
}

impl From<VolumePath> for String {
    fn from(path: VolumePath) -> Self {
        path.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn root_renders_as_slash() {
        assert_eq!(VolumePath::root().to_string(), "/");
        assert!(VolumePath::root().is_root());
        assert_eq!(VolumePath::root().parent(), None);
        assert_eq!(VolumePath::root().name(), None);
    }

    #[test]
    fn parse_normalizes() {
        let p = VolumePath::parse("//docs/./reports/").unwrap();
        assert_eq!(p.as_str(), "docs/reports");
        assert_eq!(p.to_string(), "/docs/reports");
        assert_eq!(p.name(), Some("reports"));
        assert_eq!(p.parent().unwrap().as_str(), "docs");
        assert_eq!(p.depth(), 2);
    }

    #[test]
    fn parse_rejects_parent_traversal() {
        assert!(VolumePath::parse("docs/../etc").is_err());
        assert!(VolumePath::parse("..").is_err());
    }

    #[test]
    fn parse_strict_requires_canonical_form() {
        assert_eq!(VolumePath::parse_strict("/").unwrap(), VolumePath::root());
        assert_eq!(VolumePath::parse_strict("/a/b").unwrap().as_str(), "a/b");
        assert!(VolumePath::parse_strict("a/b").is_err());
        assert!(VolumePath::parse_strict("/a//b").is_err());
        assert!(VolumePath::parse_strict("/a/b/").is_err());
        assert!(VolumePath::parse_strict("/a/./b").is_err());
    }

    #[test]
    fn join_validates_names() {
        let docs = VolumePath::root().join("docs").unwrap();
        assert_eq!(docs.join("a.txt").unwrap().as_str(), "docs/a.txt");
        assert!(docs.join("").is_err());
        assert!(docs.join("x/y").is_err());
        assert!(docs.join("..").is_err());
        assert!(docs.join("back\\slash").is_err());
    }

    #[test]
    fn starts_with_respects_component_boundaries() {
        let a = VolumePath::parse("docs").unwrap();
        let b = VolumePath::parse("docs/x").unwrap();
        let c = VolumePath::parse("docsx").unwrap();
        assert!(b.starts_with(&a));
        assert!(a.starts_with(&a));
        assert!(!c.starts_with(&a));
        assert!(c.starts_with(&VolumePath::root()));
        assert_eq!(b.relative_to(&a).unwrap().as_str(), "x");
        assert!(a.relative_to(&a).unwrap().is_root());
        assert_eq!(c.relative_to(&a), None);
    }

    #[test]
    fn name_length_limit() {
        assert!(validate_name(&"n".repeat(MAX_NAME_LEN)).is_ok());
        assert!(validate_name(&"n".repeat(MAX_NAME_LEN + 1)).is_err());
    }

    fn name_strategy() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9 _.-]{1,16}".prop_filter("reserved", |s| s != "." && s != "..")
    }

    proptest! {
        #[test]
        fn display_then_strict_parse_is_identity(names in proptest::collection::vec(name_strategy(), 0..6)) {
            let mut path = VolumePath::root();
            for name in &names {
                path = path.join(name).unwrap();
            }
            let parsed = VolumePath::parse_strict(&path.to_string()).unwrap();
            prop_assert_eq!(parsed, path);
        }
    }
}
