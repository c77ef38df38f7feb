use std::collections::HashMap;
use std::sync::RwLock;

use vdrive_types::NodeHash;

/// Domain tag mixed into every thumbnail name.
const THUMBNAIL_DOMAIN: &str = "vdrive-tmb-v1";

/// Storage name of the thumbnail of `hash`: `hex(blake3("vdrive-tmb-v1:" + hash)).png`.
pub fn thumbnail_name(hash: &NodeHash) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(THUMBNAIL_DOMAIN.as_bytes());
    hasher.update(b":");
    hasher.update(hash.as_str().as_bytes());
    format!("{}.png", hex::encode(hasher.finalize().as_bytes()))
}

/// Where generated thumbnails are kept.
pub trait ThumbnailStore: Send + Sync {
    fn get(&self, name: &str) -> Option<Vec<u8>>;

    fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    fn put(&self, name: &str, data: Vec<u8>);

    /// Returns `true` if a thumbnail was removed.
    fn remove(&self, name: &str) -> bool;
}

/// Thumbnails held in a `HashMap`.
#[derive(Debug, Default)]
pub struct MemoryThumbnailStore {
    thumbs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryThumbnailStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.thumbs.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ThumbnailStore for MemoryThumbnailStore {
    fn get(&self, name: &str) -> Option<Vec<u8>> {
        self.thumbs.read().expect("lock poisoned").get(name).cloned()
    }

    fn contains(&self, name: &str) -> bool {
        self.thumbs.read().expect("lock poisoned").contains_key(name)
    }

    fn put(&self, name: &str, data: Vec<u8>) {
        self.thumbs
            .write()
            .expect("lock poisoned")
            .insert(name.to_string(), data);
    }

    fn remove(&self, name: &str) -> bool {
        self.thumbs
            .write()
            .expect("lock poisoned")
            .remove(name)
            .is_some()
    }
}
