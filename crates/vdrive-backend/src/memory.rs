use std::collections::{BTreeMap, VecDeque};
use std::io::{Cursor, Read};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use vdrive_types::{NodeKind, VolumePath};

use crate::error::{BackendError, BackendResult};
use crate::traits::{copy_limited, Backend, DirEntry, NodeStat};

/// Maximum number of symbolic links followed while resolving one path.
const MAX_LINK_HOPS: usize = 40;

#[derive(Clone, Copy, Debug)]
struct Mode {
    readable: bool,
    writable: bool,
}

impl Mode {
    const DEFAULT: Mode = Mode {
        readable: true,
        writable: true,
    };
}

#[derive(Clone, Debug)]
enum Entry {
    Dir {
        mode: Mode,
        modified: DateTime<Utc>,
    },
    File {
        data: Arc<[u8]>,
        mode: Mode,
        modified: DateTime<Utc>,
    },
    /// Symbolic link to an absolute location inside the same backend.
    Link {
        target: VolumePath,
        modified: DateTime<Utc>,
    },
}

impl Entry {
    fn stat(&self) -> NodeStat {
        match self {
            Entry::Dir { mode, modified } => NodeStat {
                kind: NodeKind::Directory,
                size: 0,
                modified: *modified,
                readable: mode.readable,
                writable: mode.writable,
            },
            Entry::File {
                data,
                mode,
                modified,
            } => NodeStat {
                kind: NodeKind::File,
                size: data.len() as u64,
                modified: *modified,
                readable: mode.readable,
                writable: mode.writable,
            },
            // Links are always resolved before stat; report the link itself
            // as an empty file if that ever changes.
            Entry::Link { modified, .. } => NodeStat {
                kind: NodeKind::File,
                size: 0,
                modified: *modified,
                readable: true,
                writable: true,
            },
        }
    }
}

type Entries = BTreeMap<VolumePath, Entry>;

/// In-memory backend.
///
/// Intended for tests and embedding. The whole tree lives in one `BTreeMap`
/// keyed by canonical path behind a `RwLock`, so every mutation is atomic with
/// respect to every other operation. Symbolic links and per-entry permission
/// bits are supported so link cycles and permission rules can be exercised
/// without touching the disk.
pub struct MemoryBackend {
    entries: RwLock<Entries>,
}

impl MemoryBackend {
    /// Create a backend holding only an empty, writable root directory.
    pub fn new() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(
            VolumePath::root(),
            Entry::Dir {
                mode: Mode::DEFAULT,
                modified: Utc::now(),
            },
        );
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Create a symbolic link at `path` pointing to `target`.
    ///
    /// The target does not need to exist.
    pub fn symlink(&self, path: &VolumePath, target: &VolumePath) -> BackendResult<()> {
        let mut entries = self.entries.write().expect("lock poisoned");
        let key = locate(&entries, path)?;
        if entries.contains_key(&key) {
            return Err(BackendError::AlreadyExists(path.clone()));
        }
        entries.insert(
            key.clone(),
            Entry::Link {
                target: target.clone(),
                modified: Utc::now(),
            },
        );
        touch_parent(&mut entries, &key);
        Ok(())
    }

    /// Set the permission bits of an entry (links are followed).
    pub fn set_mode(&self, path: &VolumePath, readable: bool, writable: bool) -> BackendResult<()> {
        let mut entries = self.entries.write().expect("lock poisoned");
        let key = resolve(&entries, path)?;
        match entries.get_mut(&key) {
            Some(Entry::Dir { mode, .. }) | Some(Entry::File { mode, .. }) => {
                *mode = Mode {
                    readable,
                    writable,
                };
                Ok(())
            }
            _ => Err(BackendError::NotFound(path.clone())),
        }
    }

    /// Number of entries, the root included.
    pub fn len(&self) -> usize {
        self.entries.read().expect("lock poisoned").len()
    }

    /// Returns `true` if only the root exists.
    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }

    /// Total bytes across all files.
    pub fn total_bytes(&self) -> u64 {
        self.entries
            .read()
            .expect("lock poisoned")
            .values()
            .map(|e| match e {
                Entry::File { data, .. } => data.len() as u64,
                _ => 0,
            })
            .sum()
    }

    fn insert_new(&self, path: &VolumePath, entry: Entry) -> BackendResult<()> {
        let mut entries = self.entries.write().expect("lock poisoned");
        let key = locate(&entries, path)?;
        if entries.contains_key(&key) {
            return Err(BackendError::AlreadyExists(path.clone()));
        }
        entries.insert(key.clone(), entry);
        touch_parent(&mut entries, &key);
        Ok(())
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("entries", &self.len())
            .finish()
    }
}

/// Resolve `path` following every link, including the last component.
fn resolve(entries: &Entries, path: &VolumePath) -> BackendResult<VolumePath> {
    let mut hops = 0;
    let mut resolved = VolumePath::root();
    let mut pending: VecDeque<String> = path.components().map(str::to_string).collect();

    while let Some(name) = pending.pop_front() {
        let next = resolved.join(&name)?;
        match entries.get(&next) {
            Some(Entry::Link { target, .. }) => {
                hops += 1;
                if hops > MAX_LINK_HOPS {
                    return Err(BackendError::LinkLoop(path.clone()));
                }
                let mut rest: VecDeque<String> =
                    target.components().map(str::to_string).collect();
                rest.append(&mut pending);
                pending = rest;
                resolved = VolumePath::root();
            }
            Some(Entry::File { .. }) if !pending.is_empty() => {
                return Err(BackendError::NotADirectory(next));
            }
            Some(_) => resolved = next,
            None => return Err(BackendError::NotFound(path.clone())),
        }
    }
    Ok(resolved)
}

/// Key under which the entry `path` itself is stored: parent directories are
/// resolved, the last component is not. The entry may not exist.
fn locate(entries: &Entries, path: &VolumePath) -> BackendResult<VolumePath> {
    let (Some(parent), Some(name)) = (path.parent(), path.name()) else {
        return Ok(VolumePath::root());
    };
    let parent_key = resolve(entries, &parent)?;
    match entries.get(&parent_key) {
        Some(Entry::Dir { .. }) => Ok(parent_key.join(name)?),
        _ => Err(BackendError::NotADirectory(parent)),
    }
}

fn touch_parent(entries: &mut Entries, key: &VolumePath) {
    if let Some(parent) = key.parent() {
        if let Some(Entry::Dir { modified, .. }) = entries.get_mut(&parent) {
            *modified = Utc::now();
        }
    }
}

impl Backend for MemoryBackend {
    fn kind(&self) -> &'static str {
        "memory"
    }

    fn root_label(&self) -> String {
        "memory:/".to_string()
    }

    fn stat(&self, path: &VolumePath) -> BackendResult<NodeStat> {
        let entries = self.entries.read().expect("lock poisoned");
        let key = resolve(&entries, path)?;
        entries
            .get(&key)
            .map(Entry::stat)
            .ok_or_else(|| BackendError::NotFound(path.clone()))
    }

    fn is_link(&self, path: &VolumePath) -> BackendResult<bool> {
        let entries = self.entries.read().expect("lock poisoned");
        let key = locate(&entries, path)?;
        match entries.get(&key) {
            Some(Entry::Link { .. }) => Ok(true),
            Some(_) => Ok(false),
            None => Err(BackendError::NotFound(path.clone())),
        }
    }

    fn read_dir(&self, path: &VolumePath) -> BackendResult<Vec<DirEntry>> {
        let entries = self.entries.read().expect("lock poisoned");
        let dir = resolve(&entries, path)?;
        if !matches!(entries.get(&dir), Some(Entry::Dir { .. })) {
            return Err(BackendError::NotADirectory(path.clone()));
        }
        let mut listing = Vec::new();
        for (key, entry) in entries.iter() {
            if key.is_root() || key.parent().as_ref() != Some(&dir) {
                continue;
            }
            let Some(name) = key.name() else { continue };
            let (is_link, stat) = match entry {
                Entry::Link { .. } => {
                    let stat = resolve(&entries, key)
                        .ok()
                        .and_then(|target| entries.get(&target).map(Entry::stat));
                    (true, stat)
                }
                other => (false, Some(other.stat())),
            };
            listing.push(DirEntry {
                name: name.to_string(),
                is_link,
                stat,
            });
        }
        Ok(listing)
    }

    fn canonical(&self, path: &VolumePath) -> BackendResult<VolumePath> {
        let entries = self.entries.read().expect("lock poisoned");
        resolve(&entries, path)
    }

    fn create_dir(&self, path: &VolumePath) -> BackendResult<()> {
        self.insert_new(
            path,
            Entry::Dir {
                mode: Mode::DEFAULT,
                modified: Utc::now(),
            },
        )
    }

    fn create_file(&self, path: &VolumePath) -> BackendResult<()> {
        self.insert_new(
            path,
            Entry::File {
                data: Arc::from(Vec::new()),
                mode: Mode::DEFAULT,
                modified: Utc::now(),
            },
        )
    }

    fn write_new(
        &self,
        path: &VolumePath,
        reader: &mut dyn Read,
        limit: Option<u64>,
    ) -> BackendResult<u64> {
        let mut staged = Vec::new();
        let written = copy_limited(reader, &mut staged, limit)?;
        self.insert_new(
            path,
            Entry::File {
                data: Arc::from(staged),
                mode: Mode::DEFAULT,
                modified: Utc::now(),
            },
        )?;
        Ok(written)
    }

    fn replace(&self, path: &VolumePath, data: &[u8]) -> BackendResult<()> {
        let mut entries = self.entries.write().expect("lock poisoned");
        let key = resolve(&entries, path)?;
        match entries.get_mut(&key) {
            Some(Entry::File {
                data: content,
                modified,
                ..
            }) => {
                *content = Arc::from(data);
                *modified = Utc::now();
                Ok(())
            }
            Some(Entry::Dir { .. }) => Err(BackendError::IsADirectory(path.clone())),
            _ => Err(BackendError::NotFound(path.clone())),
        }
    }

    fn open_read(&self, path: &VolumePath) -> BackendResult<Box<dyn Read + Send>> {
        let entries = self.entries.read().expect("lock poisoned");
        let key = resolve(&entries, path)?;
        match entries.get(&key) {
            Some(Entry::File { data, .. }) => Ok(Box::new(Cursor::new(Arc::clone(data)))),
            Some(Entry::Dir { .. }) => Err(BackendError::IsADirectory(path.clone())),
            _ => Err(BackendError::NotFound(path.clone())),
        }
    }

    fn remove_file(&self, path: &VolumePath) -> BackendResult<()> {
        let mut entries = self.entries.write().expect("lock poisoned");
        let key = locate(&entries, path)?;
        match entries.get(&key) {
            Some(Entry::Dir { .. }) => Err(BackendError::IsADirectory(path.clone())),
            Some(_) => {
                entries.remove(&key);
                touch_parent(&mut entries, &key);
                Ok(())
            }
            None => Err(BackendError::NotFound(path.clone())),
        }
    }

    fn remove_dir(&self, path: &VolumePath) -> BackendResult<()> {
        if path.is_root() {
            return Err(BackendError::PermissionDenied(path.clone()));
        }
        let mut entries = self.entries.write().expect("lock poisoned");
        let key = locate(&entries, path)?;
        match entries.get(&key) {
            Some(Entry::Dir { .. }) => {}
            Some(_) => return Err(BackendError::NotADirectory(path.clone())),
            None => return Err(BackendError::NotFound(path.clone())),
        }
        if entries.keys().any(|k| k.parent().as_ref() == Some(&key)) {
            return Err(BackendError::DirectoryNotEmpty(path.clone()));
        }
        entries.remove(&key);
        touch_parent(&mut entries, &key);
        Ok(())
    }

    fn rename(&self, from: &VolumePath, to: &VolumePath) -> BackendResult<()> {
        if from.is_root() {
            return Err(BackendError::PermissionDenied(from.clone()));
        }
        let mut entries = self.entries.write().expect("lock poisoned");
        let from_key = locate(&entries, from)?;
        if !entries.contains_key(&from_key) {
            return Err(BackendError::NotFound(from.clone()));
        }
        let to_key = locate(&entries, to)?;
        if entries.contains_key(&to_key) {
            return Err(BackendError::AlreadyExists(to.clone()));
        }
        if to_key.starts_with(&from_key) {
            return Err(BackendError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("cannot move {from} into itself"),
            )));
        }

        let moved: Vec<VolumePath> = entries
            .keys()
            .filter(|k| k.starts_with(&from_key))
            .cloned()
            .collect();
        for old in moved {
            if let (Some(entry), Some(rel)) = (entries.remove(&old), old.relative_to(&from_key)) {
                entries.insert(to_key.join_path(&rel), entry);
            }
        }
        touch_parent(&mut entries, &from_key);
        touch_parent(&mut entries, &to_key);
        Ok(())
    }

    fn diagnostics(&self) -> BTreeMap<String, String> {
        let mut diag = BTreeMap::new();
        diag.insert("entries".to_string(), self.len().to_string());
        diag.insert("bytes".to_string(), self.total_bytes().to_string());
        diag
    }
}
