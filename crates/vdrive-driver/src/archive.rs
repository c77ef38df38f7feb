//! Archive creation and extraction through an [`ArchiveProvider`].
//!
//! [`ArchiveProvider`]: crate::adapters::ArchiveProvider

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};
use vdrive_backend::NodeStat;
use vdrive_types::{Capability, NodeHash, NodeKind, VfsError, VfsResult, VolumePath};

use crate::adapters::{provider_failed, ArchiveEntry, ArchiveProvider};
use crate::catalog::mime_of;
use crate::volume::Volume;

/// Name of the directory an archive is extracted into.
///
/// Drops the last extension, and a `.tar` left in front of it.
pub fn archive_stem(name: &str) -> &str {
    let without_ext = match name.rfind('.') {
        Some(dot) if dot > 0 => &name[..dot],
        _ => return name,
    };
    match without_ext.strip_suffix(".tar") {
        Some(stem) if !stem.is_empty() => stem,
        _ => without_ext,
    }
}

impl Volume {
    fn archiver_for(&self, mime: &str) -> VfsResult<Arc<dyn ArchiveProvider>> {
        let enabled = &self.options.archive_mimes;
        if !enabled.is_empty() && !enabled.iter().any(|m| m == mime) {
            return Err(VfsError::UnsupportedOperation(format!(
                "archive type {mime} is not enabled on volume {}",
                self.id
            )));
        }
        Ok(Arc::clone(self.providers.archiver(mime)?))
    }

    pub(crate) fn create_archive(
        &self,
        hashes: &[NodeHash],
        name: &str,
        mime: &str,
    ) -> VfsResult<NodeHash> {
        let provider = self.archiver_for(mime)?;
        let Some(first) = hashes.first() else {
            return Err(VfsError::InvalidArgument("nothing to archive".into()));
        };
        let parent = self
            .locate(first)?
            .parent()
            .ok_or_else(|| VfsError::InvalidArgument("the volume root cannot be archived".into()))?;

        let mut members = Vec::with_capacity(hashes.len());
        for hash in hashes {
            let path = self.locate(hash)?;
            if path.parent().as_ref() != Some(&parent) {
                return Err(VfsError::InvalidArgument(format!(
                    "{path} is not in {parent}; archive members must share one parent"
                )));
            }
            let stat = self.visible_stat(&path)?;
            let caps = self.capabilities_at(&path, &stat)?;
            self.require(&path, &caps, Capability::Read)?;
            members.push((path, stat));
        }
        self.writable_dir(&parent)?;

        let entries = self.archive_entries(&parent, &members)?;
        let data = provider
            .compress(&entries)
            .map_err(|e| provider_failed(provider.name(), e))?;
        let target = self.create_available(&parent, name, false, |candidate| {
            self.backend
                .write_new(candidate, &mut data.as_slice(), None)
                .map(|_| ())
        })?;
        debug!(
            volume = %self.id,
            path = %target,
            provider = provider.name(),
            members = members.len(),
            entries = entries.len(),
            bytes = data.len(),
            "archive created"
        );
        self.hash_of(&target)
    }

    /// Every visible node below `members`, addressed relative to `base`.
    fn archive_entries(
        &self,
        base: &VolumePath,
        members: &[(VolumePath, NodeStat)],
    ) -> VfsResult<Vec<ArchiveEntry>> {
        let mut entries = Vec::new();
        let mut visited = HashSet::new();
        let mut stack: Vec<(VolumePath, NodeStat)> = members.iter().rev().cloned().collect();

        while let Some((path, stat)) = stack.pop() {
            let relative = path
                .relative_to(base)
                .ok_or_else(|| VfsError::InvalidArgument(format!("{path} is outside {base}")))?;
            if !stat.is_dir() {
                let caps = self.capabilities_at(&path, &stat)?;
                self.require(&path, &caps, Capability::Read)?;
                entries.push(ArchiveEntry::File {
                    path: relative,
                    data: self.backend.read(&path)?,
                });
                continue;
            }
            if !visited.insert(self.backend.canonical(&path)?) {
                warn!(volume = %self.id, path = %path, "not archiving directory cycle");
                continue;
            }
            let caps = self.capabilities_at(&path, &stat)?;
            self.require(&path, &caps, Capability::Read)?;
            entries.push(ArchiveEntry::Directory { path: relative });

            let mut children = self.backend.read_dir(&path)?;
            children.sort_by(|a, b| b.name.cmp(&a.name));
            for child in children {
                let child_path = path.join(&child.name)?;
                if self.policy.is_hidden(&child_path) {
                    continue;
                }
                match child.stat {
                    Some(child_stat) => stack.push((child_path, child_stat)),
                    None => warn!(volume = %self.id, path = %child_path, "not archiving dangling link"),
                }
            }
        }
        Ok(entries)
    }

    pub(crate) fn extract_archive(&self, hash: &NodeHash) -> VfsResult<NodeHash> {
        let path = self.locate(hash)?;
        let (Some(parent), Some(name)) = (path.parent(), path.name()) else {
            return Err(VfsError::InvalidArgument("the volume root is not an archive".into()));
        };
        let stat = self.visible_stat(&path)?;
        if stat.is_dir() {
            return Err(VfsError::IsADirectory(path.to_string()));
        }
        let caps = self.capabilities_at(&path, &stat)?;
        self.require(&path, &caps, Capability::Read)?;
        self.writable_dir(&parent)?;

        let provider = self.archiver_for(&mime_of(name, NodeKind::File))?;
        let data = self.backend.read(&path)?;
        let entries = provider
            .extract(&data)
            .map_err(|e| provider_failed(provider.name(), e))?;
        if entries.iter().any(|entry| entry.path().is_root()) {
            return Err(VfsError::provider(
                provider.name(),
                "archive entry addresses the extraction root",
            ));
        }

        let target = self.create_available(&parent, archive_stem(name), true, |candidate| {
            self.backend.create_dir(candidate)
        })?;
        if let Err(e) = self.unpack(&target, entries) {
            let mut failed = Vec::new();
            if !self.remove_tree(&target, &mut failed) {
                warn!(volume = %self.id, path = %target, "partial extraction left behind");
            }
            return Err(e);
        }
        debug!(volume = %self.id, archive = %path, path = %target, provider = provider.name(), "archive extracted");
        self.hash_of(&target)
    }

    fn unpack(&self, target: &VolumePath, entries: Vec<ArchiveEntry>) -> VfsResult<()> {
        for entry in entries {
            let dest = target.join_path(entry.path());
            if self.policy.is_hidden(&dest) {
                warn!(volume = %self.id, path = %dest, "not extracting hidden entry");
                continue;
            }
            match entry {
                ArchiveEntry::Directory { .. } => self.ensure_dirs(target, &dest)?,
                ArchiveEntry::File { data, .. } => {
                    if let Some(parent) = dest.parent() {
                        self.ensure_dirs(target, &parent)?;
                    }
                    self.backend
                        .write_new(&dest, &mut data.as_slice(), self.options.upload_max_size)?;
                }
            }
        }
        Ok(())
    }

    /// Create `dir` and its missing ancestors below `base`.
    fn ensure_dirs(&self, base: &VolumePath, dir: &VolumePath) -> VfsResult<()> {
        let Some(relative) = dir.relative_to(base) else {
            return Ok(());
        };
        let mut current = base.clone();
        for name in relative.components() {
            current = current.join(name)?;
            match self.backend.create_dir(&current) {
                Ok(()) => {}
                Err(e) if e.is_already_exists() => {
                    if !self.backend.stat(&current)?.is_dir() {
                        return Err(VfsError::NotADirectory(current.to_string()));
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}
