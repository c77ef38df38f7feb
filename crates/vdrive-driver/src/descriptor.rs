use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;
use vdrive_types::{
    Capability, NodeHash, OpenMode, VfsError, VfsResult, VolumeId, VolumePath,
};

use crate::volume::Volume;

/// Counts one open descriptor for as long as it lives.
struct OpenGuard(Arc<AtomicUsize>);

impl OpenGuard {
    fn new(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for OpenGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub(crate) struct Staged {
    pub(crate) data: Vec<u8>,
    pub(crate) limit: Option<u64>,
    /// Bytes offered so far, including any refused ones.
    pub(crate) offered: u64,
}

impl Staged {
    pub(crate) fn overflowed(&self) -> bool {
        self.limit.is_some_and(|limit| self.offered > limit)
    }
}

pub(crate) enum Body {
    Read(Box<dyn Read + Send>),
    Write(Staged),
}

/// Backend-agnostic byte stream bound to one node, one mode and one volume.
///
/// A read descriptor implements [`Read`]; a write descriptor implements
/// [`Write`] and stages its bytes until it is handed back to
/// [`Driver::close`](crate::Driver::close), which commits them atomically.
/// Dropping a descriptor releases it; a dropped write descriptor discards its
/// staged bytes.
pub struct Descriptor {
    pub(crate) id: Uuid,
    pub(crate) volume: VolumeId,
    pub(crate) hash: NodeHash,
    pub(crate) path: VolumePath,
    pub(crate) body: Body,
    _open: OpenGuard,
}

impl Descriptor {
    pub(crate) fn reader(
        volume: VolumeId,
        hash: NodeHash,
        path: VolumePath,
        reader: Box<dyn Read + Send>,
        counter: &Arc<AtomicUsize>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            volume,
            hash,
            path,
            body: Body::Read(reader),
            _open: OpenGuard::new(counter),
        }
    }

    pub(crate) fn writer(
        volume: VolumeId,
        hash: NodeHash,
        path: VolumePath,
        limit: Option<u64>,
        counter: &Arc<AtomicUsize>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            volume,
            hash,
            path,
            body: Body::Write(Staged {
                data: Vec::new(),
                limit,
                offered: 0,
            }),
            _open: OpenGuard::new(counter),
        }
    }

    /// Unique id of this descriptor.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Volume that opened the descriptor.
    pub fn volume(&self) -> &VolumeId {
        &self.volume
    }

    /// Node the descriptor is bound to.
    pub fn hash(&self) -> &NodeHash {
        &self.hash
    }

    pub fn mode(&self) -> OpenMode {
        match self.body {
            Body::Read(_) => OpenMode::Read,
            Body::Write(_) => OpenMode::Write,
        }
    }
}

impl Read for Descriptor {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.body {
            Body::Read(reader) => reader.read(buf),
            Body::Write(_) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "descriptor is open for writing",
            )),
        }
    }
}

impl Write for Descriptor {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.body {
            Body::Write(staged) => {
                staged.offered += buf.len() as u64;
                if staged.overflowed() {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        "upload size limit exceeded",
                    ));
                }
                staged.data.extend_from_slice(buf);
                Ok(buf.len())
            }
            Body::Read(_) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "descriptor is open for reading",
            )),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl std::fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Descriptor")
            .field("id", &self.id)
            .field("volume", &self.volume)
            .field("path", &self.path)
            .field("mode", &self.mode())
            .finish()
    }
}

impl Volume {
    pub(crate) fn open_node(&self, hash: &NodeHash, mode: OpenMode) -> VfsResult<Descriptor> {
        let path = self.locate(hash)?;
        let stat = self.visible_stat(&path)?;
        if stat.is_dir() {
            return Err(VfsError::IsADirectory(path.to_string()));
        }
        let caps = self.capabilities_at(&path, &stat)?;
        let descriptor = match mode {
            OpenMode::Read => {
                self.require(&path, &caps, Capability::Read)?;
                let reader = self.backend.open_read(&path)?;
                Descriptor::reader(
                    self.id.clone(),
                    hash.clone(),
                    path,
                    reader,
                    &self.open_descriptors,
                )
            }
            OpenMode::Write => {
                self.require(&path, &caps, Capability::Write)?;
                Descriptor::writer(
                    self.id.clone(),
                    hash.clone(),
                    path,
                    self.options.upload_max_size,
                    &self.open_descriptors,
                )
            }
        };
        debug!(volume = %self.id, descriptor = %descriptor.id, mode = %mode, path = %descriptor.path, "descriptor opened");
        Ok(descriptor)
    }

    pub(crate) fn close_descriptor(&self, descriptor: Descriptor) -> VfsResult<()> {
        if descriptor.volume != self.id {
            return Err(VfsError::InvalidArgument(format!(
                "descriptor {} belongs to volume {}",
                descriptor.id, descriptor.volume
            )));
        }
        let Descriptor {
            id,
            hash,
            path,
            body,
            ..
        } = descriptor;
        if let Body::Write(staged) = body {
            if let Some(limit) = staged.limit.filter(|_| staged.overflowed()) {
                return Err(VfsError::SizeLimitExceeded {
                    size: staged.offered,
                    limit,
                });
            }
            self.backend.replace(&path, &staged.data)?;
            self.forget_thumbnail(&hash);
            debug!(volume = %self.id, descriptor = %id, path = %path, bytes = staged.data.len(), "staged content committed");
        } else {
            debug!(volume = %self.id, descriptor = %id, "descriptor closed");
        }
        Ok(())
    }
}
