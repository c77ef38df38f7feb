use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::capability::CapabilitySet;
use crate::error::VfsError;
use crate::hash::{NodeHash, VolumeId};

/// MIME type reported for directories.
pub const DIRECTORY_MIME: &str = "directory";

/// Kind of a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Directory,
}

impl NodeKind {
    pub fn is_dir(&self) -> bool {
        matches!(self, Self::Directory)
    }

    pub fn is_file(&self) -> bool {
        matches!(self, Self::File)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File => write!(f, "file"),
            Self::Directory => write!(f, "directory"),
        }
    }
}

/// Full attribute set of a node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub hash: NodeHash,
    /// Parent directory hash; `None` for the volume root.
    pub parent: Option<NodeHash>,
    pub volume: VolumeId,
    pub name: String,
    pub kind: NodeKind,
    pub size: u64,
    pub modified: DateTime<Utc>,
    pub mime: String,
    #[serde(flatten)]
    pub caps: CapabilitySet,
    /// For directories: whether at least one visible sub-directory exists.
    pub dirs: bool,
    /// Thumbnail reference, when one has been generated.
    pub tmb: Option<String>,
}

impl NodeInfo {
    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// One directory of a flattened navigation tree.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TreeNode {
    pub hash: NodeHash,
    pub parent: NodeHash,
    pub name: String,
}

/// A thumbnail produced by `tmb`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThumbnailRef {
    pub hash: NodeHash,
    pub tmb: String,
}

/// Mode of an open descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpenMode {
    Read,
    Write,
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
        }
    }
}

/// Ordering applied to directory listings.
///
/// Ties are always broken by name using byte-wise (case-sensitive)
/// comparison.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortRule {
    Name,
    Size,
    Modified,
    /// Directories first, then files, each group by name.
    #[default]
    KindThenName,
}

impl SortRule {
    /// Compare two nodes under this rule.
    pub fn compare(&self, a: &NodeInfo, b: &NodeInfo) -> Ordering {
        let primary = match self {
            Self::Name => Ordering::Equal,
            Self::Size => a.size.cmp(&b.size),
            Self::Modified => a.modified.cmp(&b.modified),
            Self::KindThenName => b.is_dir().cmp(&a.is_dir()),
        };
        primary.then_with(|| a.name.as_bytes().cmp(b.name.as_bytes()))
    }

    /// Sort a listing in place.
    pub fn sort(&self, nodes: &mut [NodeInfo]) {
        nodes.sort_by(|a, b| self.compare(a, b));
    }
}

impl fmt::Display for SortRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name => write!(f, "name"),
            Self::Size => write!(f, "size"),
            Self::Modified => write!(f, "modified"),
            Self::KindThenName => write!(f, "kind-then-name"),
        }
    }
}

impl FromStr for SortRule {
    type Err = VfsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "name" => Ok(Self::Name),
            "size" => Ok(Self::Size),
            "modified" | "date" => Ok(Self::Modified),
            "kind-then-name" | "kind" => Ok(Self::KindThenName),
            other => Err(VfsError::InvalidArgument(format!("unknown sort rule: {other}"))),
        }
    }
}
