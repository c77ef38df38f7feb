//! Every configured volume over one shared codec.

use std::sync::Arc;

use tracing::{debug, info};
use vdrive_codec::HashCodec;
use vdrive_types::{NodeHash, OpenMode, VfsError, VfsResult, VolumeId};

use crate::adapters::Providers;
use crate::config::DriverConfig;
use crate::driver::Driver;
use crate::volume::Volume;

/// The volumes of one [`DriverConfig`], mounted as `<session_key>1`,
/// `<session_key>2`, ... on a shared [`HashCodec`].
///
/// Any hash issued by one of the volumes, and the bootstrap hash `"/"`,
/// resolves to the volume that owns it. Byte transfers between volumes go
/// through descriptors.
pub struct VolumeSet {
    codec: Arc<HashCodec>,
    volumes: Vec<Volume>,
}

impl VolumeSet {
    /// Load every configured volume, in order. The first one is the default.
    pub fn load(config: &DriverConfig, providers: Arc<Providers>) -> VfsResult<Self> {
        config.validate()?;
        if config.volumes.is_empty() {
            return Err(VfsError::Config("no volumes configured".into()));
        }
        let codec = Arc::new(HashCodec::new());
        let mut volumes = Vec::with_capacity(config.volumes.len());
        for (index, options) in config.volumes.iter().enumerate() {
            let id = config.volume_id(index)?;
            volumes.push(Volume::load(
                options.clone(),
                id.as_str(),
                Arc::clone(&codec),
                Arc::clone(&providers),
            )?);
        }
        info!(volumes = volumes.len(), session_key = %config.session_key, "volume set loaded");
        Ok(Self { codec, volumes })
    }

    pub fn volumes(&self) -> &[Volume] {
        &self.volumes
    }

    pub fn get(&self, id: &VolumeId) -> Option<&Volume> {
        self.volumes.iter().find(|v| v.id() == id)
    }

    pub fn codec(&self) -> &Arc<HashCodec> {
        &self.codec
    }

    /// The volume `"/"` resolves to.
    pub fn default_volume(&self) -> Option<&Volume> {
        self.codec.default_volume().and_then(|id| self.get(&id))
    }

    /// The volume that issued `hash`.
    pub fn resolve(&self, hash: &NodeHash) -> VfsResult<&Volume> {
        let id = self.codec.volume_of(hash)?;
        self.get(&id)
            .ok_or_else(|| VfsError::InvalidHash(format!("{hash}: volume {id} is not in this set")))
    }

    /// Copy the file `src` into the directory `dst_parent` as `name`,
    /// possibly across volumes.
    ///
    /// The read descriptor on the source is closed whether or not the copy
    /// succeeds.
    pub fn transfer(&self, src: &NodeHash, dst_parent: &NodeHash, name: &str) -> VfsResult<NodeHash> {
        let source = self.resolve(src)?;
        let target = self.resolve(dst_parent)?;

        let mut descriptor = source.open(src, OpenMode::Read)?;
        let copied = target.copy(&mut descriptor, dst_parent, name);
        let closed = source.close(descriptor);
        let hash = copied?;
        closed?;
        debug!(from = %source.id(), to = %target.id(), hash = %hash, "transfer complete");
        Ok(hash)
    }
}

impl std::fmt::Debug for VolumeSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VolumeSet")
            .field("codec", &self.codec)
            .field("volumes", &self.volumes)
            .finish()
    }
}
