use std::fmt;

use serde::{Deserialize, Serialize};

/// One permission facet evaluated per node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Read,
    Write,
    Remove,
}

impl Capability {
    pub const ALL: [Capability; 3] = [Capability::Read, Capability::Write, Capability::Remove];
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
            Self::Remove => write!(f, "remove"),
        }
    }
}

/// Resolved read/write/remove permissions of a node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet {
    pub read: bool,
    pub write: bool,
    pub remove: bool,
}

impl CapabilitySet {
    /// Every capability granted.
    pub const fn all() -> Self {
        Self {
            read: true,
            write: true,
            remove: true,
        }
    }

    /// No capability granted.
    pub const fn none() -> Self {
        Self {
            read: false,
            write: false,
            remove: false,
        }
    }

    /// Whether `cap` is granted.
    pub fn allows(&self, cap: Capability) -> bool {
        match cap {
            Capability::Read => self.read,
            Capability::Write => self.write,
            Capability::Remove => self.remove,
        }
    }

    /// Clear `cap`.
    pub fn deny(&mut self, cap: Capability) {
        match cap {
            Capability::Read => self.read = false,
            Capability::Write => self.write = false,
            Capability::Remove => self.remove = false,
        }
    }
}
