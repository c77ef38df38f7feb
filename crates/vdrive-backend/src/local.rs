use std::collections::BTreeMap;
use std::fs::{self, File, Metadata, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tempfile::NamedTempFile;
use tracing::warn;
use vdrive_types::{validate_name, NodeKind, VolumePath};

use crate::error::{BackendError, BackendResult};
use crate::traits::{copy_limited, Backend, DirEntry, NodeStat};

/// Backend over a directory on the local disk.
///
/// New content is always staged in a temporary file next to its destination
/// and moved into place with a single rename, so readers never observe a
/// partially written file. Symbolic links are followed only while they stay
/// inside the root; anything resolving elsewhere is `OutsideRoot`.
pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    /// Open a backend rooted at `root`, which must be an existing directory.
    pub fn new(root: impl AsRef<Path>) -> BackendResult<Self> {
        let root = root.as_ref();
        let root = fs::canonicalize(root).map_err(|e| {
            BackendError::InvalidRoot(format!("{}: {e}", root.display()))
        })?;
        if !root.is_dir() {
            return Err(BackendError::InvalidRoot(format!(
                "{} is not a directory",
                root.display()
            )));
        }
        Ok(Self { root })
    }

    /// The canonical root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Host path of `path` with every directory above it resolved. The last
    /// component is not followed.
    fn located(&self, path: &VolumePath) -> BackendResult<PathBuf> {
        let (Some(parent), Some(name)) = (path.parent(), path.name()) else {
            return Ok(self.root.clone());
        };
        let dir = if parent.is_root() {
            self.root.clone()
        } else {
            fs::canonicalize(self.root.join(parent.as_str()))
                .map_err(|e| BackendError::from_io(path, e))?
        };
        if !dir.starts_with(&self.root) {
            return Err(BackendError::OutsideRoot(path.clone()));
        }
        Ok(dir.join(name))
    }

    /// Host path of `path` with links followed.
    fn resolved(&self, path: &VolumePath) -> BackendResult<PathBuf> {
        let real =
            fs::canonicalize(self.located(path)?).map_err(|e| BackendError::from_io(path, e))?;
        if !real.starts_with(&self.root) {
            return Err(BackendError::OutsideRoot(path.clone()));
        }
        Ok(real)
    }

    /// Facts of a listed entry; `None` when it dangles or escapes the root.
    fn entry_stat(&self, host: &Path) -> Option<NodeStat> {
        let real = fs::canonicalize(host).ok()?;
        if !real.starts_with(&self.root) {
            return None;
        }
        fs::metadata(real).ok().map(|meta| to_stat(&meta))
    }

    /// Staging file in the directory that will receive `path`.
    fn staging_file(&self, path: &VolumePath, target: &Path) -> BackendResult<NamedTempFile> {
        let dir = target
            .parent()
            .ok_or_else(|| BackendError::PermissionDenied(path.clone()))?;
        NamedTempFile::new_in(dir).map_err(|e| BackendError::from_io(path, e))
    }
}

impl std::fmt::Debug for LocalBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalBackend")
            .field("root", &self.root)
            .finish()
    }
}

fn to_stat(meta: &Metadata) -> NodeStat {
    let kind = if meta.is_dir() {
        NodeKind::Directory
    } else {
        NodeKind::File
    };
    let modified = meta
        .modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| DateTime::<Utc>::from(std::time::UNIX_EPOCH));
    let (readable, writable) = permission_bits(meta);
    NodeStat {
        kind,
        size: if meta.is_dir() { 0 } else { meta.len() },
        modified,
        readable,
        writable,
    }
}

#[cfg(unix)]
fn permission_bits(meta: &Metadata) -> (bool, bool) {
    use std::os::unix::fs::PermissionsExt;
    let mode = meta.permissions().mode();
    (mode & 0o400 != 0, mode & 0o200 != 0)
}

#[cfg(not(unix))]
fn permission_bits(meta: &Metadata) -> (bool, bool) {
    (true, !meta.permissions().readonly())
}

/// Move a directory to `dst` only if `dst` is free.
///
/// An empty placeholder claims `dst` first; `rename(2)` then replaces it,
/// which it does only while the placeholder is still empty.
#[cfg(unix)]
fn move_dir(src: &Path, dst: &Path) -> std::io::Result<()> {
    fs::create_dir(dst)?;
    fs::rename(src, dst).inspect_err(|_| {
        if let Err(e) = fs::remove_dir(dst) {
            warn!(path = %dst.display(), error = %e, "rename placeholder left behind");
        }
    })
}

#[cfg(not(unix))]
fn move_dir(src: &Path, dst: &Path) -> std::io::Result<()> {
    // The platform rename refuses an existing destination directory.
    if fs::symlink_metadata(dst).is_ok() {
        return Err(std::io::ErrorKind::AlreadyExists.into());
    }
    fs::rename(src, dst)
}

/// Move a file or link to `dst` only if `dst` is free.
fn move_file(src: &Path, dst: &Path) -> std::io::Result<()> {
    fs::hard_link(src, dst)?;
    fs::remove_file(src).inspect_err(|_| {
        if let Err(e) = fs::remove_file(dst) {
            warn!(path = %dst.display(), error = %e, "second link left behind");
        }
    })
}

impl Backend for LocalBackend {
    fn kind(&self) -> &'static str {
        "local"
    }

    fn root_label(&self) -> String {
        self.root.display().to_string()
    }

    fn stat(&self, path: &VolumePath) -> BackendResult<NodeStat> {
        let meta =
            fs::metadata(self.resolved(path)?).map_err(|e| BackendError::from_io(path, e))?;
        Ok(to_stat(&meta))
    }

    fn is_link(&self, path: &VolumePath) -> BackendResult<bool> {
        let meta = fs::symlink_metadata(self.located(path)?)
            .map_err(|e| BackendError::from_io(path, e))?;
        Ok(meta.file_type().is_symlink())
    }

    fn read_dir(&self, path: &VolumePath) -> BackendResult<Vec<DirEntry>> {
        let full = self.resolved(path)?;
        if !fs::metadata(&full)
            .map_err(|e| BackendError::from_io(path, e))?
            .is_dir()
        {
            return Err(BackendError::NotADirectory(path.clone()));
        }
        let mut listing = Vec::new();
        for entry in fs::read_dir(&full).map_err(|e| BackendError::from_io(path, e))? {
            let entry = entry.map_err(|e| BackendError::from_io(path, e))?;
            let Ok(name) = entry.file_name().into_string() else {
                warn!(dir = %path, "skipping entry with a non UTF-8 name");
                continue;
            };
            if let Err(e) = validate_name(&name) {
                warn!(dir = %path, error = %e, "skipping entry with an unusable name");
                continue;
            }
            let is_link = entry
                .file_type()
                .map(|t| t.is_symlink())
                .map_err(|e| BackendError::from_io(path, e))?;
            listing.push(DirEntry {
                stat: self.entry_stat(&entry.path()),
                name,
                is_link,
            });
        }
        Ok(listing)
    }

    fn canonical(&self, path: &VolumePath) -> BackendResult<VolumePath> {
        let real = self.resolved(path)?;
        let rel = real
            .strip_prefix(&self.root)
            .map_err(|_| BackendError::OutsideRoot(path.clone()))?;
        let rel = rel
            .to_str()
            .ok_or_else(|| BackendError::OutsideRoot(path.clone()))?;
        Ok(VolumePath::parse(rel)?)
    }

    fn create_dir(&self, path: &VolumePath) -> BackendResult<()> {
        fs::create_dir(self.located(path)?).map_err(|e| BackendError::from_io(path, e))
    }

    fn create_file(&self, path: &VolumePath) -> BackendResult<()> {
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.located(path)?)
            .map(|_| ())
            .map_err(|e| BackendError::from_io(path, e))
    }

    fn write_new(
        &self,
        path: &VolumePath,
        reader: &mut dyn Read,
        limit: Option<u64>,
    ) -> BackendResult<u64> {
        let target = self.located(path)?;
        let mut staged = self.staging_file(path, &target)?;
        let written = copy_limited(reader, staged.as_file_mut(), limit)?;
        staged
            .as_file_mut()
            .sync_all()
            .map_err(|e| BackendError::from_io(path, e))?;
        staged
            .persist_noclobber(&target)
            .map_err(|e| BackendError::from_io(path, e.error))?;
        Ok(written)
    }

    fn replace(&self, path: &VolumePath, data: &[u8]) -> BackendResult<()> {
        // The link target is replaced, not the link.
        let target = self.resolved(path)?;
        let meta = fs::metadata(&target).map_err(|e| BackendError::from_io(path, e))?;
        if meta.is_dir() {
            return Err(BackendError::IsADirectory(path.clone()));
        }
        let mut staged = self.staging_file(path, &target)?;
        staged
            .write_all(data)
            .and_then(|_| staged.as_file_mut().sync_all())
            .map_err(|e| BackendError::from_io(path, e))?;
        fs::set_permissions(staged.path(), meta.permissions())
            .map_err(|e| BackendError::from_io(path, e))?;
        staged
            .persist(&target)
            .map_err(|e| BackendError::from_io(path, e.error))?;
        Ok(())
    }

    fn open_read(&self, path: &VolumePath) -> BackendResult<Box<dyn Read + Send>> {
        let full = self.resolved(path)?;
        if fs::metadata(&full)
            .map_err(|e| BackendError::from_io(path, e))?
            .is_dir()
        {
            return Err(BackendError::IsADirectory(path.clone()));
        }
        let file = File::open(&full).map_err(|e| BackendError::from_io(path, e))?;
        Ok(Box::new(file))
    }

    fn remove_file(&self, path: &VolumePath) -> BackendResult<()> {
        let full = self.located(path)?;
        let meta = fs::symlink_metadata(&full).map_err(|e| BackendError::from_io(path, e))?;
        if meta.is_dir() {
            return Err(BackendError::IsADirectory(path.clone()));
        }
        fs::remove_file(&full).map_err(|e| BackendError::from_io(path, e))
    }

    fn remove_dir(&self, path: &VolumePath) -> BackendResult<()> {
        if path.is_root() {
            return Err(BackendError::PermissionDenied(path.clone()));
        }
        let full = self.located(path)?;
        let meta = fs::symlink_metadata(&full).map_err(|e| BackendError::from_io(path, e))?;
        if !meta.is_dir() {
            return Err(BackendError::NotADirectory(path.clone()));
        }
        let mut children = fs::read_dir(&full).map_err(|e| BackendError::from_io(path, e))?;
        if children.next().is_some() {
            return Err(BackendError::DirectoryNotEmpty(path.clone()));
        }
        fs::remove_dir(&full).map_err(|e| BackendError::from_io(path, e))
    }

    /// Move an entry without ever replacing an occupied destination.
    fn rename(&self, from: &VolumePath, to: &VolumePath) -> BackendResult<()> {
        if from.is_root() {
            return Err(BackendError::PermissionDenied(from.clone()));
        }
        if to.starts_with(from) {
            return Err(BackendError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("cannot move {from} into itself"),
            )));
        }
        let (src, dst) = (self.located(from)?, self.located(to)?);
        let meta = fs::symlink_metadata(&src).map_err(|e| BackendError::from_io(from, e))?;
        let moved = if meta.is_dir() {
            move_dir(&src, &dst)
        } else {
            move_file(&src, &dst)
        };
        moved.map_err(|e| match e.kind() {
            std::io::ErrorKind::AlreadyExists => BackendError::AlreadyExists(to.clone()),
            _ => BackendError::from_io(from, e),
        })
    }

    fn diagnostics(&self) -> BTreeMap<String, String> {
        let mut diag = BTreeMap::new();
        diag.insert("root".to_string(), self.root_label());
        diag
    }
}
