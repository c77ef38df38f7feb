//! Pluggable capability providers: archive codecs, image codecs and the
//! thumbnail store.
//!
//! The driver never compresses or decodes anything itself. It gates
//! permissions, resolves name collisions and hands bytes to a provider
//! registered in [`Providers`].

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;
use vdrive_types::{VfsError, VfsResult, VolumePath};

use crate::thumbnail::{MemoryThumbnailStore, ThumbnailStore};

/// Failure reported by a provider.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ProviderError(pub String);

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// One member of an archive, addressed relative to the archive root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArchiveEntry {
    Directory { path: VolumePath },
    File { path: VolumePath, data: Vec<u8> },
}

impl ArchiveEntry {
    pub fn path(&self) -> &VolumePath {
        match self {
            ArchiveEntry::Directory { path } | ArchiveEntry::File { path, .. } => path,
        }
    }
}

/// Compression codec for one archive MIME type.
pub trait ArchiveProvider: Send + Sync {
    /// Provider name used in error reports.
    fn name(&self) -> &str;

    /// MIME type of the archives this provider produces and reads.
    fn mime(&self) -> &str;

    fn compress(&self, entries: &[ArchiveEntry]) -> Result<Vec<u8>, ProviderError>;

    fn extract(&self, data: &[u8]) -> Result<Vec<ArchiveEntry>, ProviderError>;
}

/// Image codec used by `resize` and `tmb`.
pub trait ImageProvider: Send + Sync {
    fn name(&self) -> &str;

    fn resize(
        &self,
        data: &[u8],
        mime: &str,
        width: u32,
        height: u32,
    ) -> Result<Vec<u8>, ProviderError>;

    /// Square thumbnail of edge `size`, encoded as PNG.
    fn thumbnail(&self, data: &[u8], mime: &str, size: u32) -> Result<Vec<u8>, ProviderError>;
}

/// Registry of the providers available to a set of volumes.
#[derive(Clone)]
pub struct Providers {
    archivers: BTreeMap<String, Arc<dyn ArchiveProvider>>,
    image: Option<Arc<dyn ImageProvider>>,
    thumbnails: Arc<dyn ThumbnailStore>,
}

impl Providers {
    /// No codecs and an in-memory thumbnail store.
    pub fn new() -> Self {
        Self {
            archivers: BTreeMap::new(),
            image: None,
            thumbnails: Arc::new(MemoryThumbnailStore::new()),
        }
    }

    /// Register an archiver under its MIME type, replacing any previous one.
    pub fn with_archiver(mut self, provider: Arc<dyn ArchiveProvider>) -> Self {
        self.archivers.insert(provider.mime().to_string(), provider);
        self
    }

    pub fn with_image(mut self, provider: Arc<dyn ImageProvider>) -> Self {
        self.image = Some(provider);
        self
    }

    pub fn with_thumbnails(mut self, store: Arc<dyn ThumbnailStore>) -> Self {
        self.thumbnails = store;
        self
    }

    /// The archiver for `mime`, or `UnsupportedOperation`.
    pub fn archiver(&self, mime: &str) -> VfsResult<&Arc<dyn ArchiveProvider>> {
        self.archivers.get(mime).ok_or_else(|| {
            VfsError::UnsupportedOperation(format!("no archive provider for {mime}"))
        })
    }

    /// The image provider, or `UnsupportedOperation`.
    pub fn image(&self) -> VfsResult<&Arc<dyn ImageProvider>> {
        self.image
            .as_ref()
            .ok_or_else(|| VfsError::UnsupportedOperation("no image provider configured".into()))
    }

    pub fn thumbnails(&self) -> &Arc<dyn ThumbnailStore> {
        &self.thumbnails
    }

    /// MIME types with a registered archiver.
    pub fn archive_mimes(&self) -> Vec<String> {
        self.archivers.keys().cloned().collect()
    }
}

impl Default for Providers {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Providers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Providers")
            .field("archivers", &self.archive_mimes())
            .field("image", &self.image.as_ref().map(|p| p.name().to_string()))
            .finish()
    }
}

/// Translate a provider failure into the driver error taxonomy.
pub(crate) fn provider_failed(name: &str, err: ProviderError) -> VfsError {
    VfsError::provider(name, err.0)
}
