//! Create, remove, rename, duplicate, copy and content replacement.

use std::collections::HashSet;

use tracing::{debug, warn};
use vdrive_backend::BackendError;
use vdrive_types::{Capability, NodeHash, OpenMode, VfsError, VfsResult, VolumePath};

use crate::descriptor::Descriptor;
use crate::volume::Volume;

/// Upper bound on `<name> copy <n>` candidates tried before giving up.
const MAX_COPY_ATTEMPTS: u32 = 10_000;

/// Name of the `n`-th copy of `name`.
///
/// Files keep their extension (`report copy 2.pdf`); directories and dot
/// files without a further extension get the suffix appended.
pub fn copy_name(name: &str, n: u32, is_dir: bool) -> String {
    if !is_dir {
        if let Some(dot) = name.rfind('.').filter(|&i| i > 0) {
            let (stem, ext) = name.split_at(dot);
            return format!("{stem} copy {n}{ext}");
        }
    }
    format!("{name} copy {n}")
}

impl Volume {
    pub(crate) fn create_node(
        &self,
        parent: &NodeHash,
        name: &str,
        directory: bool,
    ) -> VfsResult<NodeHash> {
        let parent = self.locate(parent)?;
        self.writable_dir(&parent)?;
        let target = self.new_child(&parent, name)?;
        let _slot = self.slots.acquire(&target);
        if directory {
            self.backend.create_dir(&target)?;
            debug!(volume = %self.id, path = %target, "directory created");
        } else {
            self.backend.create_file(&target)?;
            debug!(volume = %self.id, path = %target, "file created");
        }
        self.hash_of(&target)
    }

    pub(crate) fn remove_node(&self, hash: &NodeHash) -> VfsResult<()> {
        let path = self.locate(hash)?;
        if path.is_root() {
            return Err(VfsError::PermissionDenied(
                "the volume root cannot be removed".into(),
            ));
        }
        if self.policy.is_hidden(&path) {
            return Err(VfsError::PermissionDenied(path.to_string()));
        }
        if !self.backend.exists(&path)? {
            return Err(VfsError::NotFound(path.to_string()));
        }
        let parent = self.parent_stat(&path)?;
        if !self.policy.removable(&path, parent.as_ref()) {
            return Err(VfsError::PermissionDenied(format!("remove denied on {path}")));
        }

        let mut failed = Vec::new();
        self.remove_tree(&path, &mut failed);
        if !failed.is_empty() {
            return Err(VfsError::PartialFailure { failed });
        }
        self.forget_thumbnail(hash);
        debug!(volume = %self.id, path = %path, "node removed");
        Ok(())
    }

    /// Remove `path` and everything below it, collecting failures.
    ///
    /// Returns `true` once nothing is left at `path`. Entries that vanish
    /// while the walk runs count as removed.
    pub(crate) fn remove_tree(&self, path: &VolumePath, failed: &mut Vec<(String, String)>) -> bool {
        let gone = |e: &BackendError| e.is_not_found();

        let is_dir = match self.backend.is_link(path) {
            Ok(true) => false,
            Ok(false) => match self.backend.stat(path) {
                Ok(stat) => stat.is_dir(),
                Err(e) if gone(&e) => return true,
                Err(e) => return self.not_removed(failed, path, e.to_string()),
            },
            Err(e) if gone(&e) => return true,
            Err(e) => return self.not_removed(failed, path, e.to_string()),
        };

        if !is_dir {
            return match self.backend.remove_file(path) {
                Ok(()) => true,
                Err(e) if gone(&e) => true,
                Err(e) => self.not_removed(failed, path, e.to_string()),
            };
        }

        let (stat, entries) = match self
            .backend
            .stat(path)
            .and_then(|stat| Ok((stat, self.backend.read_dir(path)?)))
        {
            Ok(found) => found,
            Err(e) if gone(&e) => return true,
            Err(e) => return self.not_removed(failed, path, e.to_string()),
        };

        let mut emptied = true;
        for entry in entries {
            let child = match path.join(&entry.name) {
                Ok(child) => child,
                Err(e) => {
                    emptied = self.not_removed(failed, path, e.to_string());
                    continue;
                }
            };
            if !self.policy.removable(&child, Some(&stat)) {
                emptied = self.not_removed(failed, &child, "permission denied".into());
                continue;
            }
            if !self.remove_tree(&child, failed) {
                emptied = false;
            }
        }
        if !emptied {
            return false;
        }
        match self.backend.remove_dir(path) {
            Ok(()) => true,
            Err(e) if gone(&e) => true,
            Err(e) => self.not_removed(failed, path, e.to_string()),
        }
    }

    fn not_removed(
        &self,
        failed: &mut Vec<(String, String)>,
        path: &VolumePath,
        reason: String,
    ) -> bool {
        warn!(volume = %self.id, path = %path, reason = %reason, "member not removed");
        failed.push((path.to_string(), reason));
        false
    }

    pub(crate) fn rename_node(&self, hash: &NodeHash, name: &str) -> VfsResult<NodeHash> {
        let path = self.locate(hash)?;
        let (Some(parent), Some(current)) = (path.parent(), path.name()) else {
            return Err(VfsError::PermissionDenied(
                "the volume root cannot be renamed".into(),
            ));
        };
        let stat = self.visible_stat(&path)?;
        let caps = self.capabilities_at(&path, &stat)?;
        self.require(&path, &caps, Capability::Write)?;
        self.writable_dir(&parent)?;
        if current == name {
            return Ok(hash.clone());
        }
        let target = self.new_child(&parent, name)?;

        let _slot = self.slots.acquire(&target);
        self.backend.rename(&path, &target)?;
        self.forget_thumbnail(hash);
        debug!(volume = %self.id, from = %path, to = %target, "node renamed");
        self.hash_of(&target)
    }

    pub(crate) fn duplicate_node(&self, hash: &NodeHash) -> VfsResult<NodeHash> {
        let path = self.locate(hash)?;
        let (Some(parent), Some(name)) = (path.parent(), path.name()) else {
            return Err(VfsError::PermissionDenied(
                "the volume root cannot be duplicated".into(),
            ));
        };
        let stat = self.visible_stat(&path)?;
        let caps = self.capabilities_at(&path, &stat)?;
        self.require(&path, &caps, Capability::Read)?;
        self.writable_dir(&parent)?;

        let target = self.create_exclusive(&parent, name, stat.is_dir(), |candidate| {
            if stat.is_dir() {
                self.backend.create_dir(candidate)
            } else {
                let mut reader = self.backend.open_read(&path)?;
                self.backend
                    .write_new(candidate, &mut reader, None)
                    .map(|_| ())
            }
        })?;
        if stat.is_dir() {
            if let Err(e) = self.copy_children(&path, &target) {
                let mut failed = Vec::new();
                if !self.remove_tree(&target, &mut failed) {
                    warn!(volume = %self.id, path = %target, "partial duplicate left behind");
                }
                return Err(e);
            }
        }
        debug!(volume = %self.id, from = %path, to = %target, "node duplicated");
        self.hash_of(&target)
    }

    /// Create `name` under `parent`, or the first free copy name when
    /// `name` is taken.
    pub(crate) fn create_available(
        &self,
        parent: &VolumePath,
        name: &str,
        is_dir: bool,
        create: impl Fn(&VolumePath) -> Result<(), BackendError>,
    ) -> VfsResult<VolumePath> {
        let target = self.new_child(parent, name)?;
        {
            let _slot = self.slots.acquire(&target);
            match create(&target) {
                Ok(()) => return Ok(target),
                Err(e) if e.is_already_exists() => {}
                Err(e) => return Err(e.into()),
            }
        }
        self.create_exclusive(parent, name, is_dir, create)
    }

    /// Create the first free `<name> copy <n>` sibling with `create`.
    ///
    /// `create` must fail with `AlreadyExists` rather than replace; a lost
    /// race moves on to the next `n`.
    pub(crate) fn create_exclusive(
        &self,
        parent: &VolumePath,
        name: &str,
        is_dir: bool,
        create: impl Fn(&VolumePath) -> Result<(), BackendError>,
    ) -> VfsResult<VolumePath> {
        for n in 1..=MAX_COPY_ATTEMPTS {
            let candidate = self.new_child(parent, &copy_name(name, n, is_dir))?;
            if self.backend.exists(&candidate)? {
                continue;
            }
            let _slot = self.slots.acquire(&candidate);
            match create(&candidate) {
                Ok(()) => return Ok(candidate),
                Err(e) if e.is_already_exists() => {
                    debug!(volume = %self.id, path = %candidate, "copy name taken concurrently");
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(VfsError::AlreadyExists(format!(
            "no free copy name for {name} in {parent}"
        )))
    }

    /// Copy the contents of directory `src` into the existing directory `dst`.
    ///
    /// Every copied member must be readable; the first one that is not
    /// fails the copy with `PermissionDenied`.
    pub(crate) fn copy_children(&self, src: &VolumePath, dst: &VolumePath) -> VfsResult<()> {
        let mut visited = HashSet::new();
        visited.insert(self.backend.canonical(src)?);
        let mut stack = vec![(src.clone(), dst.clone())];

        while let Some((from, to)) = stack.pop() {
            let from_stat = self.backend.stat(&from)?;
            for entry in self.backend.read_dir(&from)? {
                let source = from.join(&entry.name)?;
                if self.policy.is_hidden(&source) {
                    continue;
                }
                let Some(stat) = entry.stat else {
                    warn!(volume = %self.id, path = %source, "not copying dangling link");
                    continue;
                };
                let caps = self.policy.resolve(&source, &stat, Some(&from_stat));
                self.require(&source, &caps, Capability::Read)?;
                let target = to.join(&entry.name)?;
                if stat.is_dir() {
                    if !visited.insert(self.backend.canonical(&source)?) {
                        warn!(volume = %self.id, path = %source, "not copying directory cycle");
                        continue;
                    }
                    self.backend.create_dir(&target)?;
                    stack.push((source, target));
                } else {
                    let mut reader = self.backend.open_read(&source)?;
                    self.backend.write_new(&target, &mut reader, None)?;
                }
            }
        }
        Ok(())
    }

    pub(crate) fn copy_from(
        &self,
        source: &mut Descriptor,
        parent: &NodeHash,
        name: &str,
    ) -> VfsResult<NodeHash> {
        if source.mode() != OpenMode::Read {
            return Err(VfsError::InvalidArgument(format!(
                "descriptor {} is not open for reading",
                source.id()
            )));
        }
        let parent = self.locate(parent)?;
        self.writable_dir(&parent)?;
        let target = self.new_child(&parent, name)?;

        let _slot = self.slots.acquire(&target);
        let written = self
            .backend
            .write_new(&target, source, self.options.upload_max_size)?;
        debug!(
            volume = %self.id,
            from_volume = %source.volume(),
            descriptor = %source.id(),
            path = %target,
            bytes = written,
            "stream copied"
        );
        self.hash_of(&target)
    }

    pub(crate) fn read_content(&self, hash: &NodeHash) -> VfsResult<Vec<u8>> {
        let path = self.locate(hash)?;
        let stat = self.visible_stat(&path)?;
        if stat.is_dir() {
            return Err(VfsError::IsADirectory(path.to_string()));
        }
        let caps = self.capabilities_at(&path, &stat)?;
        self.require(&path, &caps, Capability::Read)?;
        Ok(self.backend.read(&path)?)
    }

    pub(crate) fn write_content(&self, hash: &NodeHash, data: &[u8]) -> VfsResult<()> {
        let path = self.locate(hash)?;
        let stat = self.visible_stat(&path)?;
        if stat.is_dir() {
            return Err(VfsError::IsADirectory(path.to_string()));
        }
        let caps = self.capabilities_at(&path, &stat)?;
        self.require(&path, &caps, Capability::Write)?;
        self.check_upload(data.len() as u64)?;
        self.backend.replace(&path, data)?;
        self.forget_thumbnail(hash);
        debug!(volume = %self.id, path = %path, bytes = data.len(), "content replaced");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Barrier};
    use std::thread;

    use proptest::prelude::*;
    use vdrive_backend::Backend;
    use vdrive_codec::HashCodec;
    use vdrive_types::{ErrorKind, SortRule};

    use crate::adapters::Providers;
    use crate::config::VolumeOptions;
    use crate::driver::Driver;
    use crate::testing::{fixtures, hash, local_volume, memory_volume, VanishingBackend};

    fn p(raw: &str) -> VolumePath {
        VolumePath::parse(raw).unwrap()
    }

    fn names(volume: &Volume, dir: &NodeHash) -> Vec<String> {
        volume
            .ls(dir, SortRule::Name)
            .unwrap()
            .into_iter()
            .map(|n| n.name)
            .collect()
    }

    #[test]
    fn copy_names_keep_extensions() {
        assert_eq!(copy_name("report.pdf", 1, false), "report copy 1.pdf");
        assert_eq!(copy_name("archive.tar.gz", 2, false), "archive.tar copy 2.gz");
        assert_eq!(copy_name("README", 3, false), "README copy 3");
        assert_eq!(copy_name(".bashrc", 1, false), ".bashrc copy 1");
        assert_eq!(copy_name("photos.2024", 1, true), "photos.2024 copy 1");
    }

    proptest! {
        #[test]
        fn copy_names_are_valid_and_distinct(
            name in "[a-zA-Z0-9_][a-zA-Z0-9_. -]{0,20}",
            a in 1u32..500,
            b in 1u32..500,
            is_dir: bool,
        ) {
            prop_assume!(vdrive_types::validate_name(&name).is_ok());
            let first = copy_name(&name, a, is_dir);
            prop_assert!(vdrive_types::validate_name(&first).is_ok());
            prop_assert_ne!(&first, &name);
            prop_assert_eq!(first == copy_name(&name, b, is_dir), a == b);
        }
    }

    // ---- end to end ----

    #[test]
    fn create_edit_rename_duplicate_remove() {
        for fx in fixtures(VolumeOptions::default(), Providers::new()) {
            let v = &fx.volume;
            let root = v.root().unwrap();
            let docs = v.mkdir(&root, "docs").unwrap();
            let a = v.mkfile(&docs, "a.txt").unwrap();
            v.set_content(&a, b"hello").unwrap();

            let listing = v.ls(&docs, SortRule::Name).unwrap();
            assert_eq!(listing.len(), 1, "{}", fx.name);
            assert_eq!(listing[0].size, 5);
            assert_eq!(listing[0].mime, "text/plain");
            assert_eq!(listing[0].parent.as_ref(), Some(&docs));
            assert!(v.info(&root).unwrap().dirs);

            let b = v.rename(&a, "b.txt").unwrap();
            assert_ne!(a, b);
            assert_eq!(v.info(&a).unwrap_err().kind(), ErrorKind::NotFound);
            assert_eq!(v.get_content(&b).unwrap(), b"hello");

            let c1 = v.duplicate(&b).unwrap();
            let c2 = v.duplicate(&b).unwrap();
            assert_eq!(v.info(&c1).unwrap().name, "b copy 1.txt");
            assert_eq!(v.info(&c2).unwrap().name, "b copy 2.txt");
            assert_eq!(v.get_content(&c2).unwrap(), b"hello");

            v.rm(&docs).unwrap();
            assert_eq!(v.info(&docs).unwrap_err().kind(), ErrorKind::NotFound, "{}", fx.name);
            assert!(v.tree(&root).unwrap().is_empty());
            assert!(names(v, &root).is_empty());
        }
    }

    #[test]
    fn creation_never_replaces() {
        for fx in fixtures(VolumeOptions::default(), Providers::new()) {
            let v = &fx.volume;
            let root = v.root().unwrap();
            let f = v.mkfile(&root, "f").unwrap();
            v.set_content(&f, b"keep").unwrap();

            assert_eq!(v.mkfile(&root, "f").unwrap_err().kind(), ErrorKind::AlreadyExists);
            assert_eq!(v.mkdir(&root, "f").unwrap_err().kind(), ErrorKind::AlreadyExists);
            assert_eq!(v.get_content(&f).unwrap(), b"keep", "{}", fx.name);
            assert!(v.error().unwrap().starts_with("mkdir: already exists"));
        }
    }

    #[test]
    fn names_and_parents_are_validated() {
        for fx in fixtures(VolumeOptions::default(), Providers::new()) {
            let v = &fx.volume;
            let root = v.root().unwrap();
            let f = v.mkfile(&root, "f").unwrap();

            for bad in ["", ".", "..", "a/b", "a\\b", "nul\0"] {
                assert_eq!(v.mkdir(&root, bad).unwrap_err().kind(), ErrorKind::InvalidName, "{bad:?}");
            }
            assert_eq!(v.mkdir(&f, "x").unwrap_err().kind(), ErrorKind::NotADirectory);
            assert_eq!(v.get_content(&root).unwrap_err().kind(), ErrorKind::IsADirectory);
            assert_eq!(
                v.mkdir(&NodeHash::from("garbage"), "x").unwrap_err().kind(),
                ErrorKind::InvalidHash
            );
        }
    }

    // ---- rename ----

    #[test]
    fn rename_edge_cases() {
        for fx in fixtures(VolumeOptions::default(), Providers::new()) {
            let v = &fx.volume;
            let root = v.root().unwrap();
            let a = v.mkfile(&root, "a").unwrap();
            v.mkfile(&root, "b").unwrap();

            assert_eq!(v.rename(&root, "x").unwrap_err().kind(), ErrorKind::PermissionDenied);
            assert_eq!(v.rename(&a, "a").unwrap(), a);
            assert_eq!(v.rename(&a, "b").unwrap_err().kind(), ErrorKind::AlreadyExists);
            assert_eq!(names(v, &root), ["a", "b"], "{}", fx.name);
        }
    }

    #[test]
    fn renaming_a_directory_moves_its_subtree() {
        for fx in fixtures(VolumeOptions::default(), Providers::new()) {
            let v = &fx.volume;
            let root = v.root().unwrap();
            let d = v.mkdir(&root, "d").unwrap();
            let inner = v.mkfile(&d, "inner").unwrap();
            v.set_content(&inner, b"x").unwrap();

            v.rename(&d, "e").unwrap();
            assert_eq!(v.get_content(&fx.hash("e/inner")).unwrap(), b"x");
            assert_eq!(v.info(&inner).unwrap_err().kind(), ErrorKind::NotFound);
        }
    }

    // ---- remove ----

    #[test]
    fn root_is_never_removed() {
        for fx in fixtures(VolumeOptions::default(), Providers::new()) {
            let v = &fx.volume;
            let root = v.root().unwrap();
            assert!(!v.is_removable(&root));
            assert_eq!(v.rm(&root).unwrap_err().kind(), ErrorKind::PermissionDenied);
            assert_eq!(v.rm(&NodeHash::bootstrap()).unwrap_err().kind(), ErrorKind::PermissionDenied);
        }
    }

    #[test]
    fn rm_reports_every_member_it_could_not_remove() {
        let (backend, v) = memory_volume(VolumeOptions::default(), Providers::new());
        backend.create_dir(&p("d")).unwrap();
        backend.create_dir(&p("d/locked")).unwrap();
        backend.create_file(&p("d/locked/x")).unwrap();
        backend.create_file(&p("d/locked/y")).unwrap();
        backend.create_file(&p("d/free")).unwrap();
        backend.set_mode(&p("d/locked"), true, false).unwrap();

        let err = v.rm(&hash(&v, "d")).unwrap_err();
        let VfsError::PartialFailure { failed } = &err else {
            panic!("expected a partial failure, got {err:?}");
        };
        let mut paths: Vec<_> = failed.iter().map(|(path, _)| path.as_str()).collect();
        paths.sort();
        assert_eq!(paths, ["/d/locked/x", "/d/locked/y"]);

        assert!(!backend.exists(&p("d/free")).unwrap());
        assert!(backend.exists(&p("d/locked/x")).unwrap());
        assert!(v.error().unwrap().starts_with("rm: 2 member(s)"));
    }

    #[test]
    fn rm_of_a_link_leaves_its_target() {
        let (backend, v) = memory_volume(VolumeOptions::default(), Providers::new());
        backend.create_dir(&p("real")).unwrap();
        backend.create_file(&p("real/f")).unwrap();
        backend.symlink(&p("alias"), &p("real")).unwrap();
        backend.symlink(&p("dangling"), &p("nowhere")).unwrap();

        v.rm(&hash(&v, "alias")).unwrap();
        v.rm(&hash(&v, "dangling")).unwrap();
        assert!(backend.exists(&p("real/f")).unwrap());
        assert!(!backend.exists(&p("alias")).unwrap());
        assert!(!backend.exists(&p("dangling")).unwrap());
    }

    #[test]
    fn rm_counts_vanished_members_as_removed() {
        let backend = Arc::new(VanishingBackend::new(&[("d", "gone"), ("e", "gone")]));
        let v = Volume::load_with_backend(
            VolumeOptions::default(),
            "v1",
            backend.clone(),
            Arc::new(HashCodec::new()),
            Arc::new(Providers::new()),
        )
        .unwrap();
        backend.inner.create_dir(&p("d")).unwrap();
        backend.inner.create_file(&p("d/free")).unwrap();
        backend.inner.create_dir(&p("e")).unwrap();
        backend.inner.create_dir(&p("e/locked")).unwrap();
        backend.inner.create_file(&p("e/locked/x")).unwrap();
        backend.inner.create_file(&p("e/free")).unwrap();
        backend.inner.set_mode(&p("e/locked"), true, false).unwrap();

        v.rm(&hash(&v, "d")).unwrap();
        assert!(!backend.inner.exists(&p("d")).unwrap());

        let err = v.rm(&hash(&v, "e")).unwrap_err();
        let VfsError::PartialFailure { failed } = &err else {
            panic!("expected a partial failure, got {err:?}");
        };
        let paths: Vec<_> = failed.iter().map(|(path, _)| path.as_str()).collect();
        assert_eq!(paths, ["/e/locked/x"]);
        assert!(!backend.inner.exists(&p("e/free")).unwrap());
    }

    #[test]
    fn rm_needs_a_writable_parent() {
        let (backend, v) = memory_volume(VolumeOptions::default(), Providers::new());
        backend.create_dir(&p("ro")).unwrap();
        backend.create_file(&p("ro/f")).unwrap();
        backend.set_mode(&p("ro"), true, false).unwrap();

        let f = hash(&v, "ro/f");
        assert!(!v.is_removable(&f));
        assert_eq!(v.rm(&f).unwrap_err().kind(), ErrorKind::PermissionDenied);
        assert!(backend.exists(&p("ro/f")).unwrap());
    }

    // ---- duplicate ----

    #[test]
    fn duplicate_copies_directories_without_hidden_members() {
        let options = VolumeOptions {
            hidden: vec![r"^\.".into()],
            ..VolumeOptions::default()
        };
        let (backend, v) = memory_volume(options, Providers::new());
        backend.create_dir(&p("proj")).unwrap();
        backend.create_dir(&p("proj/src")).unwrap();
        backend
            .write_new(&p("proj/src/main.rs"), &mut &b"fn main() {}"[..], None)
            .unwrap();
        backend.create_file(&p("proj/.env")).unwrap();
        backend.symlink(&p("proj/loop"), &p("proj")).unwrap();

        let copy = v.duplicate(&hash(&v, "proj")).unwrap();
        assert_eq!(v.info(&copy).unwrap().name, "proj copy 1");
        assert_eq!(backend.read(&p("proj copy 1/src/main.rs")).unwrap(), b"fn main() {}");
        assert!(!backend.exists(&p("proj copy 1/.env")).unwrap());
        assert!(!backend.exists(&p("proj copy 1/loop")).unwrap());
    }

    #[test]
    fn duplicate_refuses_unreadable_members_and_cleans_up() {
        let (backend, v) = memory_volume(VolumeOptions::default(), Providers::new());
        backend.create_dir(&p("proj")).unwrap();
        backend.create_dir(&p("proj/docs")).unwrap();
        backend
            .write_new(&p("proj/docs/secret"), &mut &b"classified"[..], None)
            .unwrap();
        backend.create_file(&p("proj/readme")).unwrap();
        backend.set_mode(&p("proj/docs/secret"), false, true).unwrap();

        let secret = hash(&v, "proj/docs/secret");
        assert!(!v.is_readable(&secret));

        let err = v.duplicate(&hash(&v, "proj")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
        assert_eq!(names(&v, &v.root().unwrap()), ["proj"]);
        assert!(!backend.exists(&p("proj copy 1")).unwrap());
        assert!(v.error().unwrap().starts_with("duplicate: "));

        backend.set_mode(&p("proj/docs/secret"), true, true).unwrap();
        let copy = v.duplicate(&hash(&v, "proj")).unwrap();
        assert_eq!(v.info(&copy).unwrap().name, "proj copy 1");
        assert_eq!(backend.read(&p("proj copy 1/docs/secret")).unwrap(), b"classified");
    }

    #[test]
    fn duplicate_of_root_is_denied() {
        for fx in fixtures(VolumeOptions::default(), Providers::new()) {
            let v = &fx.volume;
            let err = v.duplicate(&v.root().unwrap()).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::PermissionDenied);
        }
    }

    // ---- read-only ----

    #[test]
    fn read_only_volume_refuses_every_mutation() {
        let (backend, v) = memory_volume(
            VolumeOptions {
                read_only: true,
                ..VolumeOptions::default()
            },
            Providers::new(),
        );
        backend.create_dir(&p("d")).unwrap();
        backend
            .write_new(&p("d/f"), &mut &b"data"[..], None)
            .unwrap();
        let root = v.root().unwrap();
        let d = hash(&v, "d");
        let f = hash(&v, "d/f");

        assert!(v.is_readable(&f));
        assert!(!v.is_writable(&f));
        assert!(!v.is_removable(&f));

        let denied = [
            v.mkdir(&root, "x").map(drop),
            v.mkfile(&d, "x").map(drop),
            v.rm(&f),
            v.rename(&f, "g").map(drop),
            v.duplicate(&f).map(drop),
            v.set_content(&f, b"new"),
            v.open(&f, OpenMode::Write).map(drop),
        ];
        for result in denied {
            assert_eq!(result.unwrap_err().kind(), ErrorKind::PermissionDenied);
        }
        assert_eq!(v.get_content(&f).unwrap(), b"data");
        assert_eq!(backend.len(), 3);
    }

    // ---- copy / content ----

    #[test]
    fn upload_limit_leaves_targets_untouched() {
        let options = VolumeOptions {
            upload_max_size: Some(4),
            ..VolumeOptions::default()
        };
        for fx in fixtures(options, Providers::new()) {
            let v = &fx.volume;
            let root = v.root().unwrap();
            let f = v.mkfile(&root, "f").unwrap();
            v.set_content(&f, b"four").unwrap();

            let err = v.set_content(&f, b"fives").unwrap_err();
            assert_eq!(err.kind(), ErrorKind::SizeLimitExceeded, "{}", fx.name);
            assert_eq!(v.get_content(&f).unwrap(), b"four");

            let mut w = v.open(&f, OpenMode::Write).unwrap();
            assert!(w.write_all(b"too long").is_err());
            assert_eq!(v.close(w).unwrap_err().kind(), ErrorKind::SizeLimitExceeded);
            assert_eq!(v.get_content(&f).unwrap(), b"four");
        }
    }

    #[test]
    fn copy_streams_a_read_descriptor() {
        for fx in fixtures(VolumeOptions::default(), Providers::new()) {
            let v = &fx.volume;
            let root = v.root().unwrap();
            let src = v.mkfile(&root, "src").unwrap();
            v.set_content(&src, b"payload").unwrap();
            let dst = v.mkdir(&root, "dst").unwrap();

            let mut r = v.open(&src, OpenMode::Read).unwrap();
            let copied = v.copy(&mut r, &dst, "copied").unwrap();
            v.close(r).unwrap();
            assert_eq!(v.get_content(&copied).unwrap(), b"payload", "{}", fx.name);

            let mut w = v.open(&src, OpenMode::Write).unwrap();
            let err = v.copy(&mut w, &dst, "other").unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument);
            drop(w);
            assert_eq!(v.open_descriptors(), 0);
        }
    }

    #[cfg(unix)]
    #[test]
    fn links_leaving_a_local_volume_are_not_followed() {
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("passwd"), b"root:x:0:0").unwrap();
        let (dir, v) = local_volume(VolumeOptions::default(), Providers::new());
        std::os::unix::fs::symlink(outside.path(), dir.path().join("escape")).unwrap();
        std::os::unix::fs::symlink(outside.path().join("passwd"), dir.path().join("pw")).unwrap();

        for path in ["escape/passwd", "pw"] {
            let h = hash(&v, path);
            assert!(!v.is_readable(&h), "{path}");
            assert_eq!(v.get_content(&h).unwrap_err().kind(), ErrorKind::PermissionDenied);
            assert_eq!(
                v.set_content(&h, b"changed").unwrap_err().kind(),
                ErrorKind::PermissionDenied
            );
            assert_eq!(v.open(&h, OpenMode::Read).unwrap_err().kind(), ErrorKind::PermissionDenied);
        }
        let escape = hash(&v, "escape");
        assert_eq!(v.mkfile(&escape, "planted").unwrap_err().kind(), ErrorKind::PermissionDenied);
        assert_eq!(v.ls(&escape, SortRule::Name).unwrap_err().kind(), ErrorKind::PermissionDenied);
        assert!(names(&v, &v.root().unwrap()).is_empty());

        v.rm(&hash(&v, "pw")).unwrap();
        assert_eq!(std::fs::read(outside.path().join("passwd")).unwrap(), b"root:x:0:0");
        assert!(!outside.path().join("planted").exists());
    }

    // ---- concurrency ----

    #[test]
    fn racing_rename_and_create_never_both_win() {
        for fx in fixtures(VolumeOptions::default(), Providers::new()) {
            let v = &fx.volume;
            let root = v.root().unwrap();
            for round in 0..50 {
                let target = format!("dst{round}");
                let src = v.mkfile(&root, &format!("src{round}")).unwrap();
                v.set_content(&src, b"moved").unwrap();
                let barrier = Barrier::new(2);
                let (renamed, created) = thread::scope(|s| {
                    let mover = s.spawn(|| {
                        barrier.wait();
                        v.rename(&src, &target)
                    });
                    let creator = s.spawn(|| {
                        barrier.wait();
                        v.mkfile(&root, &target)
                    });
                    (mover.join().unwrap(), creator.join().unwrap())
                });
                assert!(renamed.is_ok() != created.is_ok(), "{}: round {round}", fx.name);
                let (winner, loser) = match (renamed, created) {
                    (Ok(h), Err(e)) => ((h, &b"moved"[..]), e),
                    (Err(e), Ok(h)) => ((h, &b""[..]), e),
                    _ => unreachable!(),
                };
                assert_eq!(loser.kind(), ErrorKind::AlreadyExists);
                assert_eq!(v.get_content(&winner.0).unwrap(), winner.1, "{}", fx.name);
            }
        }
    }

    #[test]
    fn racing_creators_exactly_one_wins() {
        for fx in fixtures(VolumeOptions::default(), Providers::new()) {
            let v = &fx.volume;
            let root = v.root().unwrap();
            let barrier = Barrier::new(8);
            let results: Vec<_> = thread::scope(|s| {
                let handles: Vec<_> = (0..8)
                    .map(|i| {
                        let (root, barrier) = (&root, &barrier);
                        s.spawn(move || {
                            barrier.wait();
                            if i % 2 == 0 {
                                v.mkdir(root, "race")
                            } else {
                                v.mkfile(root, "race")
                            }
                        })
                    })
                    .collect();
                handles.into_iter().map(|h| h.join().unwrap()).collect()
            });
            let won = results.iter().filter(|r| r.is_ok()).count();
            assert_eq!(won, 1, "{}", fx.name);
            for err in results.into_iter().filter_map(Result::err) {
                assert_eq!(err.kind(), ErrorKind::AlreadyExists);
            }
        }
    }

    #[test]
    fn racing_duplicates_get_distinct_names() {
        for fx in fixtures(VolumeOptions::default(), Providers::new()) {
            let v = &fx.volume;
            let root = v.root().unwrap();
            let f = v.mkfile(&root, "f.txt").unwrap();
            let barrier = Barrier::new(6);
            thread::scope(|s| {
                for _ in 0..6 {
                    let (f, barrier) = (&f, &barrier);
                    s.spawn(move || {
                        barrier.wait();
                        v.duplicate(f).unwrap();
                    });
                }
            });
            let mut expected: Vec<String> = (1..=6).map(|n| format!("f copy {n}.txt")).collect();
            expected.push("f.txt".into());
            expected.sort();
            assert_eq!(names(v, &root), expected, "{}", fx.name);
        }
    }

    #[test]
    fn readers_never_see_a_torn_replace() {
        for fx in fixtures(VolumeOptions::default(), Providers::new()) {
            let v = &fx.volume;
            let f = v.mkfile(&v.root().unwrap(), "f").unwrap();
            let old = vec![b'a'; 64 * 1024];
            let new = vec![b'b'; 64 * 1024];
            v.set_content(&f, &old).unwrap();

            thread::scope(|s| {
                s.spawn(|| {
                    for i in 0..20 {
                        v.set_content(&f, if i % 2 == 0 { &new } else { &old }).unwrap();
                    }
                });
                s.spawn(|| {
                    for _ in 0..50 {
                        let seen = v.get_content(&f).unwrap();
                        assert!(seen == old || seen == new, "{}: torn read", fx.name);
                    }
                });
            });
        }
    }
}
