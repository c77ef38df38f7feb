//! The [`Backend`] trait defining the storage interface.
//!
//! Any store (in-memory, local disk, remote protocol) implements this trait
//! to be mounted as a vdrive volume.

use std::collections::BTreeMap;
use std::io::Read;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vdrive_types::{NodeKind, VolumePath};

use crate::error::BackendResult;

/// Raw facts about an entry, as reported by the backend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStat {
    pub kind: NodeKind,
    pub size: u64,
    pub modified: DateTime<Utc>,
    /// Whether the backend would let the serving process read the entry.
    pub readable: bool,
    /// Whether the backend would let the serving process modify the entry.
    pub writable: bool,
}

impl NodeStat {
    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }
}

/// One entry of a directory listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    /// Whether the entry itself is a symbolic link.
    pub is_link: bool,
    /// Facts about the entry (the link target for links), or `None` when a
    /// link dangles.
    pub stat: Option<NodeStat>,
}

/// Storage backend for one volume.
///
/// Implementations must be thread-safe (`Send + Sync`). Every path is
/// relative to the backend root; the root itself is [`VolumePath::root`].
pub trait Backend: Send + Sync {
    /// Short backend kind, e.g. `"memory"` or `"local"`.
    fn kind(&self) -> &'static str;

    /// Human-readable label of the backend root.
    fn root_label(&self) -> String;

    /// Facts about an entry, following symbolic links.
    fn stat(&self, path: &VolumePath) -> BackendResult<NodeStat>;

    /// Whether the entry itself is a symbolic link (not followed).
    fn is_link(&self, path: &VolumePath) -> BackendResult<bool>;

    /// List a directory. Order is unspecified.
    fn read_dir(&self, path: &VolumePath) -> BackendResult<Vec<DirEntry>>;

    /// Resolve every symbolic link in `path`.
    ///
    /// Two paths that reach the same directory have the same canonical form.
    /// Fails with `OutsideRoot` when a link leads out of the backend.
    fn canonical(&self, path: &VolumePath) -> BackendResult<VolumePath>;

    /// Create an empty directory. Fails with `AlreadyExists` if anything
    /// already occupies `path`.
    fn create_dir(&self, path: &VolumePath) -> BackendResult<()>;

    /// Create an empty file, exclusively.
    fn create_file(&self, path: &VolumePath) -> BackendResult<()>;

    /// Create a file with the bytes of `reader`, exclusively.
    ///
    /// Content is staged before it becomes visible. When `limit` is set and
    /// the stream is longer, fails with `TooLarge` and leaves nothing behind.
    /// Returns the number of bytes written.
    fn write_new(
        &self,
        path: &VolumePath,
        reader: &mut dyn Read,
        limit: Option<u64>,
    ) -> BackendResult<u64>;

    /// Atomically replace the content of an existing file.
    fn replace(&self, path: &VolumePath, data: &[u8]) -> BackendResult<()>;

    /// Read a whole file.
    fn read(&self, path: &VolumePath) -> BackendResult<Vec<u8>> {
        let mut reader = self.open_read(path)?;
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Ok(data)
    }

    /// Open a file as a byte stream.
    fn open_read(&self, path: &VolumePath) -> BackendResult<Box<dyn Read + Send>>;

    /// Remove a file or symbolic link. Links are removed, never followed.
    fn remove_file(&self, path: &VolumePath) -> BackendResult<()>;

    /// Remove an empty directory.
    fn remove_dir(&self, path: &VolumePath) -> BackendResult<()>;

    /// Move an entry. Fails with `AlreadyExists` if `to` is occupied.
    fn rename(&self, from: &VolumePath, to: &VolumePath) -> BackendResult<()>;

    /// Returns `true` if anything (including a dangling link) occupies `path`.
    fn exists(&self, path: &VolumePath) -> BackendResult<bool> {
        match self.is_link(path) {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Backend-specific diagnostic fields for `debug()`.
    fn diagnostics(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }
}

/// Copy `reader` into `out`, failing with `TooLarge` past `limit`.
pub(crate) fn copy_limited(
    reader: &mut dyn Read,
    out: &mut dyn std::io::Write,
    limit: Option<u64>,
) -> BackendResult<u64> {
    let mut buf = [0u8; 8192];
    let mut total: u64 = 0;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        total += n as u64;
        if let Some(limit) = limit {
            if total > limit {
                return Err(crate::error::BackendError::TooLarge { size: total, limit });
            }
        }
        out.write_all(&buf[..n])?;
    }
    Ok(total)
}
