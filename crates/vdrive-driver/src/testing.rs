//! Volumes over both reference backends for unit tests.

use std::collections::BTreeMap;
use std::io::Read;
use std::sync::Arc;

use tempfile::TempDir;
use vdrive_backend::{Backend, BackendResult, DirEntry, LocalBackend, MemoryBackend, NodeStat};
use vdrive_codec::HashCodec;
use vdrive_types::{NodeHash, NodeKind, VolumePath};

use crate::adapters::{ArchiveEntry, ArchiveProvider, ImageProvider, ProviderError, Providers};
use crate::config::VolumeOptions;
use crate::thumbnail::MemoryThumbnailStore;
use crate::volume::Volume;

pub(crate) struct Fixture {
    pub(crate) name: &'static str,
    pub(crate) volume: Volume,
    _dir: Option<TempDir>,
}

impl Fixture {
    pub(crate) fn hash(&self, path: &str) -> NodeHash {
        hash(&self.volume, path)
    }
}

pub(crate) fn hash(volume: &Volume, path: &str) -> NodeHash {
    volume
        .hash_of(&VolumePath::parse(path).unwrap())
        .unwrap()
}

pub(crate) fn memory_volume(options: VolumeOptions, providers: Providers) -> (Arc<MemoryBackend>, Volume) {
    let backend = Arc::new(MemoryBackend::new());
    let volume = Volume::load_with_backend(
        options,
        "v1",
        backend.clone(),
        Arc::new(HashCodec::new()),
        Arc::new(providers),
    )
    .unwrap();
    (backend, volume)
}

pub(crate) fn local_volume(options: VolumeOptions, providers: Providers) -> (TempDir, Volume) {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(LocalBackend::new(dir.path()).unwrap());
    let volume = Volume::load_with_backend(
        options,
        "v1",
        backend,
        Arc::new(HashCodec::new()),
        Arc::new(providers),
    )
    .unwrap();
    (dir, volume)
}

/// One volume per reference backend, each with its own codec and
/// thumbnail store.
pub(crate) fn fixtures(options: VolumeOptions, providers: Providers) -> Vec<Fixture> {
    let local_providers = providers
        .clone()
        .with_thumbnails(Arc::new(MemoryThumbnailStore::new()));
    let (_, memory) = memory_volume(options.clone(), providers);
    let (dir, local) = local_volume(options, local_providers);
    vec![
        Fixture {
            name: "memory",
            volume: memory,
            _dir: None,
        },
        Fixture {
            name: "local",
            volume: local,
            _dir: Some(dir),
        },
    ]
}

/// Archiver for `application/zip` that stores entries as JSON.
pub(crate) struct JsonArchiver;

impl ArchiveProvider for JsonArchiver {
    fn name(&self) -> &str {
        "json"
    }

    fn mime(&self) -> &str {
        "application/zip"
    }

    fn compress(&self, entries: &[ArchiveEntry]) -> Result<Vec<u8>, ProviderError> {
        let raw: Vec<(String, Option<Vec<u8>>)> = entries
            .iter()
            .map(|entry| match entry {
                ArchiveEntry::Directory { path } => (path.to_string(), None),
                ArchiveEntry::File { path, data } => (path.to_string(), Some(data.clone())),
            })
            .collect();
        serde_json::to_vec(&raw).map_err(|e| ProviderError::new(e.to_string()))
    }

    fn extract(&self, data: &[u8]) -> Result<Vec<ArchiveEntry>, ProviderError> {
        let raw: Vec<(String, Option<Vec<u8>>)> =
            serde_json::from_slice(data).map_err(|e| ProviderError::new(e.to_string()))?;
        raw.into_iter()
            .map(|(path, data)| {
                let path = VolumePath::parse(&path).map_err(|e| ProviderError::new(e.to_string()))?;
                Ok(match data {
                    Some(data) => ArchiveEntry::File { path, data },
                    None => ArchiveEntry::Directory { path },
                })
            })
            .collect()
    }
}

/// Image codec that prefixes the bytes it is given. Refuses `corrupt`.
pub(crate) struct TagImager;

impl ImageProvider for TagImager {
    fn name(&self) -> &str {
        "tag"
    }

    fn resize(&self, data: &[u8], _mime: &str, width: u32, height: u32) -> Result<Vec<u8>, ProviderError> {
        if data == b"corrupt" {
            return Err(ProviderError::new("cannot decode image"));
        }
        let mut out = format!("{width}x{height}:").into_bytes();
        out.extend_from_slice(data);
        Ok(out)
    }

    fn thumbnail(&self, data: &[u8], mime: &str, size: u32) -> Result<Vec<u8>, ProviderError> {
        self.resize(data, mime, size, size)
    }
}

/// Memory backend whose listings also name entries that no longer exist,
/// as if they were removed between `read_dir` and the next call.
pub(crate) struct VanishingBackend {
    pub(crate) inner: MemoryBackend,
    vanished: BTreeMap<VolumePath, Vec<String>>,
}

impl VanishingBackend {
    pub(crate) fn new(vanished: &[(&str, &str)]) -> Self {
        let mut map: BTreeMap<VolumePath, Vec<String>> = BTreeMap::new();
        for (dir, name) in vanished {
            map.entry(VolumePath::parse(dir).unwrap())
                .or_default()
                .push(name.to_string());
        }
        Self {
            inner: MemoryBackend::new(),
            vanished: map,
        }
    }
}

impl Backend for VanishingBackend {
    fn kind(&self) -> &'static str {
        "vanishing"
    }

    fn root_label(&self) -> String {
        self.inner.root_label()
    }

    fn stat(&self, path: &VolumePath) -> BackendResult<NodeStat> {
        self.inner.stat(path)
    }

    fn is_link(&self, path: &VolumePath) -> BackendResult<bool> {
        self.inner.is_link(path)
    }

    fn read_dir(&self, path: &VolumePath) -> BackendResult<Vec<DirEntry>> {
        let mut listing = self.inner.read_dir(path)?;
        if let Some(names) = self.vanished.get(path) {
            let dir = self.inner.stat(path)?;
            for name in names {
                listing.push(DirEntry {
                    name: name.clone(),
                    is_link: false,
                    stat: Some(NodeStat {
                        kind: NodeKind::File,
                        ..dir.clone()
                    }),
                });
            }
        }
        Ok(listing)
    }

    fn canonical(&self, path: &VolumePath) -> BackendResult<VolumePath> {
        self.inner.canonical(path)
    }

    fn create_dir(&self, path: &VolumePath) -> BackendResult<()> {
        self.inner.create_dir(path)
    }

    fn create_file(&self, path: &VolumePath) -> BackendResult<()> {
        self.inner.create_file(path)
    }

    fn write_new(
        &self,
        path: &VolumePath,
        reader: &mut dyn Read,
        limit: Option<u64>,
    ) -> BackendResult<u64> {
        self.inner.write_new(path, reader, limit)
    }

    fn replace(&self, path: &VolumePath, data: &[u8]) -> BackendResult<()> {
        self.inner.replace(path, data)
    }

    fn open_read(&self, path: &VolumePath) -> BackendResult<Box<dyn Read + Send>> {
        self.inner.open_read(path)
    }

    fn remove_file(&self, path: &VolumePath) -> BackendResult<()> {
        self.inner.remove_file(path)
    }

    fn remove_dir(&self, path: &VolumePath) -> BackendResult<()> {
        self.inner.remove_dir(path)
    }

    fn rename(&self, from: &VolumePath, to: &VolumePath) -> BackendResult<()> {
        self.inner.rename(from, to)
    }
}
