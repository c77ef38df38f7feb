use regex::Regex;
use vdrive_backend::NodeStat;
use vdrive_types::{Capability, CapabilitySet, VfsError, VfsResult, VolumePath};

use crate::config::VolumeOptions;

/// A compiled deny rule.
#[derive(Clone, Debug)]
struct Deny {
    pattern: Regex,
    capabilities: Vec<Capability>,
}

/// Per-volume capability resolver.
///
/// Turns backend permission facts into a [`CapabilitySet`] with a fixed
/// precedence:
///
/// 1. Hidden nodes get nothing.
/// 2. `read`/`write` come from the node's own facts, `remove` from whether
///    its parent directory is writable.
/// 3. Deny rules whose pattern matches the node path clear their capabilities.
/// 4. A read-only volume clears `write` and `remove`.
/// 5. The volume root is never removable.
///
/// Resolution is a pure function of its inputs.
#[derive(Clone, Debug)]
pub struct AccessPolicy {
    read_only: bool,
    hidden: Vec<Regex>,
    deny: Vec<Deny>,
}

impl AccessPolicy {
    /// Compile the patterns of a volume's options.
    pub fn compile(options: &VolumeOptions) -> VfsResult<Self> {
        let hidden = options
            .hidden
            .iter()
            .map(|p| compile_pattern(p, "hidden"))
            .collect::<VfsResult<Vec<_>>>()?;
        let deny = options
            .deny
            .iter()
            .map(|rule| {
                Ok(Deny {
                    pattern: compile_pattern(&rule.pattern, "deny")?,
                    capabilities: rule.capabilities.clone(),
                })
            })
            .collect::<VfsResult<Vec<_>>>()?;
        Ok(Self {
            read_only: options.read_only,
            hidden,
            deny,
        })
    }

    /// Returns `true` if any component of `path` matches a hidden pattern.
    pub fn is_hidden(&self, path: &VolumePath) -> bool {
        !self.hidden.is_empty()
            && path
                .components()
                .any(|name| self.hidden.iter().any(|re| re.is_match(name)))
    }

    /// Capabilities of the node at `path`.
    ///
    /// `parent` holds the facts of the parent directory and is `None` only
    /// for the root.
    pub fn resolve(
        &self,
        path: &VolumePath,
        node: &NodeStat,
        parent: Option<&NodeStat>,
    ) -> CapabilitySet {
        self.finish(
            path,
            CapabilitySet {
                read: node.readable,
                write: node.writable,
                remove: parent.is_some_and(|p| p.writable),
            },
        )
    }

    /// Whether the entry at `path` may be removed, without looking at the
    /// entry itself (which may be a dangling link).
    pub fn removable(&self, path: &VolumePath, parent: Option<&NodeStat>) -> bool {
        self.finish(
            path,
            CapabilitySet {
                read: false,
                write: false,
                remove: parent.is_some_and(|p| p.writable),
            },
        )
        .remove
    }

    fn finish(&self, path: &VolumePath, mut caps: CapabilitySet) -> CapabilitySet {
        if self.is_hidden(path) {
            return CapabilitySet::none();
        }
        if !self.deny.is_empty() {
            let display = path.to_string();
            for rule in self.deny.iter().filter(|r| r.pattern.is_match(&display)) {
                for cap in &rule.capabilities {
                    caps.deny(*cap);
                }
            }
        }
        if self.read_only {
            caps.write = false;
            caps.remove = false;
        }
        if path.is_root() {
            caps.remove = false;
        }
        caps
    }
}

fn compile_pattern(pattern: &str, what: &str) -> VfsResult<Regex> {
    Regex::new(pattern)
        .map_err(|e| VfsError::Config(format!("invalid {what} pattern {pattern:?}: {e}")))
}
