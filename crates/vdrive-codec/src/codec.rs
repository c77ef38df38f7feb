use std::collections::BTreeMap;
use std::sync::RwLock;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use tracing::{debug, info};

use vdrive_types::{NodeHash, VfsError, VfsResult, VolumeId, VolumePath};

/// Separator between the volume id and the encoded path.
const SEPARATOR: char = '_';

struct CodecState {
    epoch: u64,
    /// Mounted volumes and the label of their backend root.
    mounts: BTreeMap<VolumeId, String>,
    /// Mount order; the first entry is the default volume.
    order: Vec<VolumeId>,
}

/// Bidirectional mapping between `(VolumeId, VolumePath)` and [`NodeHash`].
///
/// Encoding is a pure function of the pair, so the same node always gets the
/// same hash while its volume stays mounted. Decoding additionally checks the
/// mount table, which is what turns references to unmounted volumes into
/// `InvalidHash`.
pub struct HashCodec {
    state: RwLock<CodecState>,
}

impl HashCodec {
    /// Create a codec with an empty mount table at epoch 0.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(CodecState {
                epoch: 0,
                mounts: BTreeMap::new(),
                order: Vec::new(),
            }),
        }
    }

    /// Register a volume. The first volume mounted becomes the default one.
    pub fn mount(&self, volume: &VolumeId, root_label: impl Into<String>) -> VfsResult<()> {
        let mut state = self.state.write().expect("lock poisoned");
        if state.mounts.contains_key(volume) {
            return Err(VfsError::AlreadyExists(format!(
                "volume {volume} is already mounted in epoch {}",
                state.epoch
            )));
        }
        let root_label = root_label.into();
        info!(volume = %volume, root = %root_label, epoch = state.epoch, "volume mounted");
        state.mounts.insert(volume.clone(), root_label);
        state.order.push(volume.clone());
        Ok(())
    }

    /// Remove a volume. Hashes issued for it decode to `InvalidHash` from now on.
    pub fn unmount(&self, volume: &VolumeId) -> VfsResult<()> {
        let mut state = self.state.write().expect("lock poisoned");
        if state.mounts.remove(volume).is_none() {
            return Err(VfsError::NotFound(format!("volume {volume} is not mounted")));
        }
        state.order.retain(|v| v != volume);
        info!(volume = %volume, "volume unmounted");
        Ok(())
    }

    /// Drop every mount and start a new epoch.
    pub fn reset(&self) {
        let mut state = self.state.write().expect("lock poisoned");
        state.mounts.clear();
        state.order.clear();
        state.epoch += 1;
        debug!(epoch = state.epoch, "codec reset");
    }

    /// Current configuration epoch.
    pub fn epoch(&self) -> u64 {
        self.state.read().expect("lock poisoned").epoch
    }

    /// The volume that `"/"` resolves to.
    pub fn default_volume(&self) -> Option<VolumeId> {
        self.state.read().expect("lock poisoned").order.first().cloned()
    }

    /// Mounted volumes in mount order.
    pub fn mounted(&self) -> Vec<VolumeId> {
        self.state.read().expect("lock poisoned").order.clone()
    }

    pub fn is_mounted(&self, volume: &VolumeId) -> bool {
        self.state
            .read()
            .expect("lock poisoned")
            .mounts
            .contains_key(volume)
    }

    /// Label of the backend root a volume was mounted with.
    pub fn root_label(&self, volume: &VolumeId) -> Option<String> {
        self.state
            .read()
            .expect("lock poisoned")
            .mounts
            .get(volume)
            .cloned()
    }

    /// Encode a node address into its hash.
    pub fn encode(&self, volume: &VolumeId, path: &VolumePath) -> VfsResult<NodeHash> {
        if !self.is_mounted(volume) {
            return Err(VfsError::InvalidHash(format!(
                "volume {volume} is not mounted"
            )));
        }
        let display = path.to_string();
        Ok(NodeHash::from_raw(format!(
            "{volume}{SEPARATOR}{}",
            URL_SAFE_NO_PAD.encode(display.as_bytes())
        )))
    }

    /// Hash of a volume's root directory.
    pub fn root(&self, volume: &VolumeId) -> VfsResult<NodeHash> {
        self.encode(volume, &VolumePath::root())
    }

    /// Decode a hash back into its node address.
    ///
    /// `"/"` resolves to the root of the default volume.
    pub fn decode(&self, hash: &NodeHash) -> VfsResult<(VolumeId, VolumePath)> {
        if hash.is_bootstrap() {
            let volume = self
                .default_volume()
                .ok_or_else(|| VfsError::InvalidHash("no volume is mounted".into()))?;
            return Ok((volume, VolumePath::root()));
        }

        let raw = hash.as_str();
        let invalid = || VfsError::InvalidHash(raw.to_string());

        let (volume, encoded) = raw.split_once(SEPARATOR).ok_or_else(invalid)?;
        let volume = VolumeId::new(volume).map_err(|_| invalid())?;
        if !self.is_mounted(&volume) {
            return Err(VfsError::InvalidHash(format!(
                "{raw}: volume {volume} is not mounted"
            )));
        }
        let bytes = URL_SAFE_NO_PAD.decode(encoded).map_err(|_| invalid())?;
        let display = String::from_utf8(bytes).map_err(|_| invalid())?;
        let path = VolumePath::parse_strict(&display).map_err(|_| invalid())?;
        Ok((volume, path))
    }

    /// The volume a hash belongs to.
    pub fn volume_of(&self, hash: &NodeHash) -> VfsResult<VolumeId> {
        self.decode(hash).map(|(volume, _)| volume)
    }
}

impl Default for HashCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HashCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read().expect("lock poisoned");
        f.debug_struct("HashCodec")
            .field("epoch", &state.epoch)
            .field("mounted", &state.order)
            .finish()
    }
}
