//! Image resizing and thumbnail generation through an
//! [`ImageProvider`](crate::adapters::ImageProvider).

use tracing::{debug, warn};
use vdrive_types::{Capability, NodeHash, NodeKind, ThumbnailRef, VfsError, VfsResult, VolumePath};

use crate::adapters::provider_failed;
use crate::catalog::mime_of;
use crate::thumbnail::thumbnail_name;
use crate::volume::Volume;

fn is_image(mime: &str) -> bool {
    mime.starts_with("image/")
}

impl Volume {
    pub(crate) fn resize_image(&self, hash: &NodeHash, width: u32, height: u32) -> VfsResult<()> {
        let path = self.locate(hash)?;
        let provider = self.providers.image()?;
        if width == 0 || height == 0 {
            return Err(VfsError::InvalidArgument(format!(
                "cannot resize to {width}x{height}"
            )));
        }
        let stat = self.visible_stat(&path)?;
        if stat.is_dir() {
            return Err(VfsError::IsADirectory(path.to_string()));
        }
        let caps = self.capabilities_at(&path, &stat)?;
        self.require(&path, &caps, Capability::Read)?;
        self.require(&path, &caps, Capability::Write)?;
        let mime = mime_of(path.name().unwrap_or_default(), NodeKind::File);
        if !is_image(&mime) {
            return Err(VfsError::UnsupportedOperation(format!(
                "{path} is {mime}, not an image"
            )));
        }

        let data = self.backend.read(&path)?;
        let resized = provider
            .resize(&data, &mime, width, height)
            .map_err(|e| provider_failed(provider.name(), e))?;
        self.check_upload(resized.len() as u64)?;
        self.backend.replace(&path, &resized)?;
        self.forget_thumbnail(hash);
        debug!(volume = %self.id, path = %path, width, height, bytes = resized.len(), "image resized");
        Ok(())
    }

    /// Generate the missing thumbnails of the image files in `dir`.
    pub(crate) fn make_thumbnails(&self, dir: &VolumePath) -> VfsResult<Vec<ThumbnailRef>> {
        let provider = self.providers.image()?;
        let dir_stat = self.readable_dir(dir)?;
        let store = self.providers.thumbnails();

        let mut made = Vec::new();
        for entry in self.backend.read_dir(dir)? {
            let path = dir.join(&entry.name)?;
            let Some(stat) = entry.stat.filter(|s| !s.is_dir()) else {
                continue;
            };
            if self.policy.is_hidden(&path) || !self.policy.resolve(&path, &stat, Some(&dir_stat)).read {
                continue;
            }
            let mime = mime_of(&entry.name, NodeKind::File);
            if !is_image(&mime) {
                continue;
            }
            let hash = self.hash_of(&path)?;
            let tmb = thumbnail_name(&hash);
            if store.contains(&tmb) {
                continue;
            }
            let thumbnail = self
                .backend
                .read(&path)
                .map_err(VfsError::from)
                .and_then(|data| {
                    provider
                        .thumbnail(&data, &mime, self.options.tmb_size)
                        .map_err(|e| provider_failed(provider.name(), e))
                });
            match thumbnail {
                Ok(bytes) => {
                    store.put(&tmb, bytes);
                    made.push(ThumbnailRef { hash, tmb });
                }
                Err(e) => warn!(volume = %self.id, path = %path, error = %e, "thumbnail not generated"),
            }
        }
        debug!(volume = %self.id, path = %dir, count = made.len(), "thumbnails generated");
        Ok(made)
    }
}
