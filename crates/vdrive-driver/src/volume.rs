use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::{info, warn};
use vdrive_backend::{Backend, NodeStat};
use vdrive_codec::HashCodec;
use vdrive_types::{
    Capability, CapabilitySet, NodeHash, NodeInfo, OpenMode, SortRule, ThumbnailRef, TreeNode,
    VfsError, VfsResult, VolumeId, VolumePath,
};

use crate::adapters::Providers;
use crate::capability::AccessPolicy;
use crate::config::VolumeOptions;
use crate::descriptor::Descriptor;
use crate::diagnostics::{display_value, redact, DebugInfo, ErrorState};
use crate::driver::Driver;
use crate::slots::NameSlots;
use crate::thumbnail::thumbnail_name;

/// One mounted storage root: the reference implementation of [`Driver`].
///
/// A `Volume` only exists once [`Volume::load`] has succeeded, so every
/// operation runs against a fully configured, mounted volume. Dropping the
/// volume unmounts it, after which its hashes no longer decode.
pub struct Volume {
    pub(crate) id: VolumeId,
    pub(crate) alias: String,
    pub(crate) options: VolumeOptions,
    pub(crate) backend: Arc<dyn Backend>,
    pub(crate) codec: Arc<HashCodec>,
    pub(crate) policy: AccessPolicy,
    pub(crate) providers: Arc<Providers>,
    pub(crate) slots: NameSlots,
    pub(crate) errors: ErrorState,
    pub(crate) open_descriptors: Arc<AtomicUsize>,
    epoch: u64,
}

impl Volume {
    /// Build the configured backend and mount it under `session_key`.
    ///
    /// Fails with `Config` on an invalid volume id, pattern or backend root,
    /// and with `AlreadyExists` if the id is already mounted on `codec`.
    pub fn load(
        options: VolumeOptions,
        session_key: &str,
        codec: Arc<HashCodec>,
        providers: Arc<Providers>,
    ) -> VfsResult<Self> {
        let backend = options.backend.build()?;
        Self::load_with_backend(options, session_key, backend, codec, providers)
    }

    /// Like [`Volume::load`], over an already constructed backend.
    pub fn load_with_backend(
        options: VolumeOptions,
        session_key: &str,
        backend: Arc<dyn Backend>,
        codec: Arc<HashCodec>,
        providers: Arc<Providers>,
    ) -> VfsResult<Self> {
        let id = VolumeId::new(session_key)?;
        options.validate()?;
        let policy = AccessPolicy::compile(&options)?;

        let root = backend
            .stat(&VolumePath::root())
            .map_err(|e| VfsError::Config(format!("volume {id}: backend root unusable: {e}")))?;
        if !root.is_dir() {
            return Err(VfsError::Config(format!(
                "volume {id}: backend root is not a directory"
            )));
        }
        for mime in &options.archive_mimes {
            if providers.archiver(mime).is_err() {
                warn!(volume = %id, mime = %mime, "no archive provider registered for configured type");
            }
        }

        codec.mount(&id, backend.root_label())?;
        let alias = options.alias.clone().unwrap_or_else(|| id.to_string());
        info!(
            volume = %id,
            alias = %alias,
            driver = backend.kind(),
            read_only = options.read_only,
            "volume loaded"
        );
        Ok(Self {
            epoch: codec.epoch(),
            id,
            alias,
            options,
            backend,
            codec,
            policy,
            providers,
            slots: NameSlots::new(),
            errors: ErrorState::new(),
            open_descriptors: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn options(&self) -> &VolumeOptions {
        &self.options
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Number of descriptors currently open on this volume.
    pub fn open_descriptors(&self) -> usize {
        self.open_descriptors.load(Ordering::SeqCst)
    }

    // ---- addressing ----

    /// Decode a hash issued for this volume.
    pub(crate) fn locate(&self, hash: &NodeHash) -> VfsResult<VolumePath> {
        let (volume, path) = self.codec.decode(hash)?;
        if volume != self.id {
            return Err(VfsError::InvalidHash(format!(
                "{hash} belongs to volume {volume}, not {}",
                self.id
            )));
        }
        Ok(path)
    }

    pub(crate) fn hash_of(&self, path: &VolumePath) -> VfsResult<NodeHash> {
        self.codec.encode(&self.id, path)
    }

    // ---- permission gates ----

    /// Backend facts of a node that callers are allowed to see.
    pub(crate) fn visible_stat(&self, path: &VolumePath) -> VfsResult<NodeStat> {
        if self.policy.is_hidden(path) {
            return Err(VfsError::PermissionDenied(path.to_string()));
        }
        Ok(self.backend.stat(path)?)
    }

    pub(crate) fn parent_stat(&self, path: &VolumePath) -> VfsResult<Option<NodeStat>> {
        match path.parent() {
            Some(parent) => Ok(Some(self.backend.stat(&parent)?)),
            None => Ok(None),
        }
    }

    pub(crate) fn capabilities_at(
        &self,
        path: &VolumePath,
        stat: &NodeStat,
    ) -> VfsResult<CapabilitySet> {
        let parent = self.parent_stat(path)?;
        Ok(self.policy.resolve(path, stat, parent.as_ref()))
    }

    fn capabilities(&self, hash: &NodeHash) -> VfsResult<CapabilitySet> {
        let path = self.locate(hash)?;
        if self.policy.is_hidden(&path) {
            return Ok(CapabilitySet::none());
        }
        let stat = self.backend.stat(&path)?;
        self.capabilities_at(&path, &stat)
    }

    pub(crate) fn require(
        &self,
        path: &VolumePath,
        caps: &CapabilitySet,
        cap: Capability,
    ) -> VfsResult<()> {
        if caps.allows(cap) {
            Ok(())
        } else {
            Err(VfsError::PermissionDenied(format!("{cap} denied on {path}")))
        }
    }

    /// A visible directory the caller may create entries in.
    pub(crate) fn writable_dir(&self, path: &VolumePath) -> VfsResult<NodeStat> {
        let stat = self.visible_stat(path)?;
        if !stat.is_dir() {
            return Err(VfsError::NotADirectory(path.to_string()));
        }
        let caps = self.capabilities_at(path, &stat)?;
        self.require(path, &caps, Capability::Write)?;
        Ok(stat)
    }

    /// Path of a new entry `name` under `parent`.
    pub(crate) fn new_child(&self, parent: &VolumePath, name: &str) -> VfsResult<VolumePath> {
        let child = parent.join(name)?;
        if self.policy.is_hidden(&child) {
            return Err(VfsError::PermissionDenied(format!(
                "{child} matches a hidden pattern"
            )));
        }
        Ok(child)
    }

    pub(crate) fn check_upload(&self, size: u64) -> VfsResult<()> {
        match self.options.upload_max_size {
            Some(limit) if size > limit => Err(VfsError::SizeLimitExceeded { size, limit }),
            _ => Ok(()),
        }
    }

    pub(crate) fn forget_thumbnail(&self, hash: &NodeHash) {
        self.providers.thumbnails().remove(&thumbnail_name(hash));
    }
}

impl Drop for Volume {
    fn drop(&mut self) {
        if self.codec.unmount(&self.id).is_ok() {
            info!(volume = %self.id, "volume released");
        }
    }
}

impl std::fmt::Debug for Volume {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Volume")
            .field("id", &self.id)
            .field("alias", &self.alias)
            .field("driver", &self.backend.kind())
            .field("read_only", &self.options.read_only)
            .finish()
    }
}

impl Driver for Volume {
    fn id(&self) -> &VolumeId {
        &self.id
    }

    fn alias(&self) -> &str {
        &self.alias
    }

    fn root(&self) -> VfsResult<NodeHash> {
        self.hash_of(&VolumePath::root())
    }

    fn default_sort(&self) -> SortRule {
        self.options.default_sort
    }

    fn is_readable(&self, hash: &NodeHash) -> bool {
        self.capabilities(hash).is_ok_and(|c| c.read)
    }

    fn is_writable(&self, hash: &NodeHash) -> bool {
        self.capabilities(hash).is_ok_and(|c| c.write)
    }

    fn is_removable(&self, hash: &NodeHash) -> bool {
        self.capabilities(hash).is_ok_and(|c| c.remove)
    }

    fn info(&self, hash: &NodeHash) -> VfsResult<NodeInfo> {
        let result = self.locate(hash).and_then(|path| self.info_at(&path));
        self.errors.track(&self.id, "info", result)
    }

    fn ls(&self, hash: &NodeHash, sort: SortRule) -> VfsResult<Vec<NodeInfo>> {
        let result = self.locate(hash).and_then(|path| self.list(&path, sort));
        self.errors.track(&self.id, "ls", result)
    }

    fn tree(&self, hash: &NodeHash) -> VfsResult<Vec<TreeNode>> {
        let result = self.locate(hash).and_then(|path| self.walk_tree(&path));
        self.errors.track(&self.id, "tree", result)
    }

    fn tmb(&self, hash: &NodeHash) -> VfsResult<Vec<ThumbnailRef>> {
        let result = self.locate(hash).and_then(|path| self.make_thumbnails(&path));
        self.errors.track(&self.id, "tmb", result)
    }

    fn open(&self, hash: &NodeHash, mode: OpenMode) -> VfsResult<Descriptor> {
        let result = self.open_node(hash, mode);
        self.errors.track(&self.id, "open", result)
    }

    fn close(&self, descriptor: Descriptor) -> VfsResult<()> {
        let result = self.close_descriptor(descriptor);
        self.errors.track(&self.id, "close", result)
    }

    fn mkdir(&self, parent: &NodeHash, name: &str) -> VfsResult<NodeHash> {
        let result = self.create_node(parent, name, true);
        self.errors.track(&self.id, "mkdir", result)
    }

    fn mkfile(&self, parent: &NodeHash, name: &str) -> VfsResult<NodeHash> {
        let result = self.create_node(parent, name, false);
        self.errors.track(&self.id, "mkfile", result)
    }

    fn rm(&self, hash: &NodeHash) -> VfsResult<()> {
        let result = self.remove_node(hash);
        self.errors.track(&self.id, "rm", result)
    }

    fn rename(&self, hash: &NodeHash, name: &str) -> VfsResult<NodeHash> {
        let result = self.rename_node(hash, name);
        self.errors.track(&self.id, "rename", result)
    }

    fn duplicate(&self, hash: &NodeHash) -> VfsResult<NodeHash> {
        let result = self.duplicate_node(hash);
        self.errors.track(&self.id, "duplicate", result)
    }

    fn copy(
        &self,
        source: &mut Descriptor,
        parent: &NodeHash,
        name: &str,
    ) -> VfsResult<NodeHash> {
        let result = self.copy_from(source, parent, name);
        self.errors.track(&self.id, "copy", result)
    }

    fn get_content(&self, hash: &NodeHash) -> VfsResult<Vec<u8>> {
        let result = self.read_content(hash);
        self.errors.track(&self.id, "getContent", result)
    }

    fn set_content(&self, hash: &NodeHash, data: &[u8]) -> VfsResult<()> {
        let result = self.write_content(hash, data);
        self.errors.track(&self.id, "setContent", result)
    }

    fn archive(&self, hashes: &[NodeHash], name: &str, mime: &str) -> VfsResult<NodeHash> {
        let result = self.create_archive(hashes, name, mime);
        self.errors.track(&self.id, "archive", result)
    }

    fn extract(&self, hash: &NodeHash) -> VfsResult<NodeHash> {
        let result = self.extract_archive(hash);
        self.errors.track(&self.id, "extract", result)
    }

    fn resize(&self, hash: &NodeHash, width: u32, height: u32) -> VfsResult<()> {
        let result = self.resize_image(hash, width, height);
        self.errors.track(&self.id, "resize", result)
    }

    fn find(&self, mask: &str) -> VfsResult<Vec<NodeHash>> {
        let result = Err(VfsError::UnsupportedOperation(format!(
            "find {mask:?}: search is not available"
        )));
        self.errors.track(&self.id, "find", result)
    }

    fn error(&self) -> Option<String> {
        self.errors.last()
    }

    fn debug(&self) -> DebugInfo {
        let mut backend = self.backend.diagnostics();
        for (key, value) in &self.options.extra {
            backend.insert(key.clone(), display_value(value));
        }
        DebugInfo {
            volume: self.id.clone(),
            driver: self.backend.kind().to_string(),
            alias: self.alias.clone(),
            read_only: self.options.read_only,
            epoch: self.epoch,
            open_descriptors: self.open_descriptors(),
            last_error: self.errors.last(),
            backend: redact(backend),
        }
    }
}
