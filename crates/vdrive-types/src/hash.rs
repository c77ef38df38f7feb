use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{VfsError, VfsResult};

/// Maximum length of a volume id in characters.
pub const MAX_VOLUME_ID_LEN: usize = 32;

/// Identity of a mounted volume.
///
/// Volume ids are 1 to 32 ASCII alphanumerics. They prefix every hash the
/// codec issues for the volume, and because they never contain `_` the first
/// underscore of a hash always ends the volume id.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VolumeId(String);

impl VolumeId {
    /// Validate and wrap a volume id.
    pub fn new(id: impl Into<String>) -> VfsResult<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(VfsError::Config("volume id must not be empty".into()));
        }
        if id.len() > MAX_VOLUME_ID_LEN {
            return Err(VfsError::Config(format!(
                "volume id {id:?} is longer than {MAX_VOLUME_ID_LEN} characters"
            )));
        }
        if !id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(VfsError::Config(format!(
                "volume id {id:?} must be ASCII alphanumeric"
            )));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for VolumeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VolumeId({})", self.0)
    }
}

impl fmt::Display for VolumeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for VolumeId {
    type Err = VfsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for VolumeId {
    type Error = VfsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<VolumeId> for String {
    fn from(id: VolumeId) -> Self {
        id.0
    }
}

/// Opaque identifier of a node.
///
/// A `NodeHash` is only meaningful to the codec that issued it. Callers
/// receive hashes from driver operations and hand them back unchanged; the
/// only hash a caller may spell out itself is the bootstrap root `"/"`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeHash(String);

impl NodeHash {
    /// The reserved bootstrap identifier: root of the default volume.
    pub const BOOTSTRAP: &'static str = "/";

    /// The bootstrap hash `"/"`.
    pub fn bootstrap() -> Self {
        Self(Self::BOOTSTRAP.to_string())
    }

    /// Wrap a string received from a caller. No validation happens here;
    /// the codec rejects anything it did not issue.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Returns `true` for the bootstrap hash `"/"`.
    pub fn is_bootstrap(&self) -> bool {
        self.0 == Self::BOOTSTRAP
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for NodeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeHash({})", self.0)
    }
}

impl fmt::Display for NodeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeHash {
    fn from(raw: &str) -> Self {
        Self::from_raw(raw)
    }
}
