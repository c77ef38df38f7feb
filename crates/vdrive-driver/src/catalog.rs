//! Node metadata, directory listings and tree walks.

use std::collections::HashSet;

use tracing::{debug, warn};
use vdrive_backend::NodeStat;
use vdrive_types::node::DIRECTORY_MIME;
use vdrive_types::{
    Capability, NodeInfo, NodeKind, SortRule, TreeNode, VfsError, VfsResult, VolumePath,
};

use crate::thumbnail::thumbnail_name;
use crate::volume::Volume;

/// MIME type reported for files whose extension is unknown.
pub const FALLBACK_MIME: &str = "application/octet-stream";

/// MIME type of a node, guessed from its name.
pub fn mime_of(name: &str, kind: NodeKind) -> String {
    match kind {
        NodeKind::Directory => DIRECTORY_MIME.to_string(),
        NodeKind::File => mime_guess::from_path(name)
            .first_raw()
            .unwrap_or(FALLBACK_MIME)
            .to_string(),
    }
}

impl Volume {
    pub(crate) fn info_at(&self, path: &VolumePath) -> VfsResult<NodeInfo> {
        let stat = self.visible_stat(path)?;
        let parent = self.parent_stat(path)?;
        self.describe(path, &stat, parent.as_ref())
    }

    /// Assemble the full attribute set of a node from its backend facts.
    pub(crate) fn describe(
        &self,
        path: &VolumePath,
        stat: &NodeStat,
        parent: Option<&NodeStat>,
    ) -> VfsResult<NodeInfo> {
        let caps = self.policy.resolve(path, stat, parent);
        let hash = self.hash_of(path)?;
        let parent_hash = path.parent().map(|p| self.hash_of(&p)).transpose()?;
        let name = path.name().unwrap_or(self.alias.as_str()).to_string();
        let mime = mime_of(&name, stat.kind);
        let dirs = stat.is_dir() && caps.read && self.has_visible_subdir(path);
        let tmb = if stat.is_dir() {
            None
        } else {
            let tmb = thumbnail_name(&hash);
            self.providers.thumbnails().contains(&tmb).then_some(tmb)
        };
        Ok(NodeInfo {
            hash,
            parent: parent_hash,
            volume: self.id.clone(),
            name,
            kind: stat.kind,
            size: stat.size,
            modified: stat.modified,
            mime,
            caps,
            dirs,
            tmb,
        })
    }

    fn has_visible_subdir(&self, path: &VolumePath) -> bool {
        let Ok(entries) = self.backend.read_dir(path) else {
            return false;
        };
        entries.iter().any(|entry| {
            entry.stat.as_ref().is_some_and(NodeStat::is_dir)
                && path
                    .join(&entry.name)
                    .is_ok_and(|child| !self.policy.is_hidden(&child))
        })
    }

    /// A visible, readable directory.
    pub(crate) fn readable_dir(&self, path: &VolumePath) -> VfsResult<NodeStat> {
        let stat = self.visible_stat(path)?;
        if !stat.is_dir() {
            return Err(VfsError::NotADirectory(path.to_string()));
        }
        let caps = self.capabilities_at(path, &stat)?;
        self.require(path, &caps, Capability::Read)?;
        Ok(stat)
    }

    pub(crate) fn list(&self, path: &VolumePath, sort: SortRule) -> VfsResult<Vec<NodeInfo>> {
        let stat = self.readable_dir(path)?;
        let mut nodes = Vec::new();
        for entry in self.backend.read_dir(path)? {
            let child = path.join(&entry.name)?;
            if self.policy.is_hidden(&child) {
                continue;
            }
            let Some(child_stat) = entry.stat else {
                warn!(volume = %self.id, path = %child, "skipping dangling link");
                continue;
            };
            nodes.push(self.describe(&child, &child_stat, Some(&stat))?);
        }
        sort.sort(&mut nodes);
        Ok(nodes)
    }

    /// Depth-first walk over directories with an explicit stack.
    ///
    /// Children are visited in name order. A directory whose canonical path
    /// was already reached (through a link) is skipped, and unreadable
    /// directories are reported but not entered.
    pub(crate) fn walk_tree(&self, path: &VolumePath) -> VfsResult<Vec<TreeNode>> {
        let start = self.readable_dir(path)?;
        let mut visited = HashSet::new();
        visited.insert(self.backend.canonical(path)?);

        let mut stack = vec![(path.clone(), start)];
        let mut tree = Vec::new();

        while let Some((dir, dir_stat)) = stack.pop() {
            let dir_hash = self.hash_of(&dir)?;
            let mut entries = match self.backend.read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(volume = %self.id, path = %dir, error = %e, "cannot list directory");
                    continue;
                }
            };
            entries.sort_by(|a, b| a.name.cmp(&b.name));

            let mut descend = Vec::new();
            for entry in entries {
                let Some(child_stat) = entry.stat.filter(NodeStat::is_dir) else {
                    continue;
                };
                let child = dir.join(&entry.name)?;
                if self.policy.is_hidden(&child) {
                    continue;
                }
                let canonical = match self.backend.canonical(&child) {
                    Ok(canonical) => canonical,
                    Err(e) => {
                        warn!(volume = %self.id, path = %child, error = %e, "skipping unresolvable directory");
                        continue;
                    }
                };
                if !visited.insert(canonical) {
                    debug!(volume = %self.id, path = %child, "directory already visited");
                    continue;
                }
                tree.push(TreeNode {
                    hash: self.hash_of(&child)?,
                    parent: dir_hash.clone(),
                    name: entry.name,
                });
                if self.policy.resolve(&child, &child_stat, Some(&dir_stat)).read {
                    descend.push((child, child_stat));
                }
            }
            stack.extend(descend.into_iter().rev());
        }
        Ok(tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vdrive_backend::Backend;
    use vdrive_types::{ErrorKind, NodeHash};

    use crate::adapters::Providers;
    use crate::config::{DenyRule, VolumeOptions};
    use crate::driver::Driver;
    use crate::testing::{fixtures, hash, memory_volume};

    fn p(raw: &str) -> VolumePath {
        VolumePath::parse(raw).unwrap()
    }

    #[test]
    fn mime_guessing() {
        assert_eq!(mime_of("docs", NodeKind::Directory), "directory");
        assert_eq!(mime_of("a.txt", NodeKind::File), "text/plain");
        assert_eq!(mime_of("photo.PNG", NodeKind::File), "image/png");
        assert_eq!(mime_of("blob.zz9", NodeKind::File), FALLBACK_MIME);
        assert_eq!(mime_of("Makefile", NodeKind::File), FALLBACK_MIME);
    }

    // ---- info ----

    #[test]
    fn root_info_uses_the_alias() {
        let options = VolumeOptions {
            alias: Some("Home".into()),
            ..VolumeOptions::default()
        };
        for fx in fixtures(options, Providers::new()) {
            let v = &fx.volume;
            let info = v.info(&NodeHash::bootstrap()).unwrap();
            assert_eq!(info.name, "Home");
            assert_eq!(info.parent, None);
            assert_eq!(info.kind, NodeKind::Directory);
            assert_eq!(info.mime, DIRECTORY_MIME);
            assert!(info.caps.read && info.caps.write && !info.caps.remove, "{}", fx.name);
            assert!(!info.dirs);
        }
    }

    #[test]
    fn deny_rules_override_backend_permissions() {
        let options = VolumeOptions {
            deny: vec![DenyRule {
                pattern: r"\.lock$".into(),
                capabilities: vec![Capability::Write, Capability::Remove],
            }],
            ..VolumeOptions::default()
        };
        for fx in fixtures(options, Providers::new()) {
            let v = &fx.volume;
            let lock = v.mkfile(&v.root().unwrap(), "db.lock").unwrap();
            let caps = v.info(&lock).unwrap().caps;
            assert!(caps.read && !caps.write && !caps.remove, "{}", fx.name);
            assert_eq!(v.set_content(&lock, b"x").unwrap_err().kind(), ErrorKind::PermissionDenied);
            assert_eq!(v.rm(&lock).unwrap_err().kind(), ErrorKind::PermissionDenied);
        }
    }

    // ---- hidden ----

    #[test]
    fn hidden_nodes_are_invisible_and_inaccessible() {
        let options = VolumeOptions {
            hidden: vec![r"^\.git$".into()],
            ..VolumeOptions::default()
        };
        let (backend, v) = memory_volume(options, Providers::new());
        backend.create_dir(&p(".git")).unwrap();
        backend.create_file(&p(".git/HEAD")).unwrap();
        backend.create_file(&p("visible")).unwrap();
        let root = v.root().unwrap();

        let names: Vec<_> = v.ls(&root, SortRule::Name).unwrap().into_iter().map(|n| n.name).collect();
        assert_eq!(names, ["visible"]);
        assert!(!v.info(&root).unwrap().dirs);
        assert!(v.tree(&root).unwrap().is_empty());

        let head = hash(&v, ".git/HEAD");
        assert!(!v.is_readable(&head));
        assert_eq!(v.info(&head).unwrap_err().kind(), ErrorKind::PermissionDenied);
        assert_eq!(v.get_content(&head).unwrap_err().kind(), ErrorKind::PermissionDenied);
        assert_eq!(v.mkdir(&root, ".git").unwrap_err().kind(), ErrorKind::PermissionDenied);
        assert_eq!(v.rm(&hash(&v, ".git")).unwrap_err().kind(), ErrorKind::PermissionDenied);
    }

    // ---- ls ----

    #[test]
    fn listing_follows_the_sort_rule() {
        for fx in fixtures(VolumeOptions::default(), Providers::new()) {
            let v = &fx.volume;
            let root = v.root().unwrap();
            let big = v.mkfile(&root, "b-big").unwrap();
            v.set_content(&big, &[0u8; 100]).unwrap();
            v.mkfile(&root, "a-small").unwrap();
            v.mkdir(&root, "z-dir").unwrap();

            let order = |sort| -> Vec<String> {
                v.ls(&root, sort).unwrap().into_iter().map(|n| n.name).collect()
            };
            assert_eq!(order(SortRule::Name), ["a-small", "b-big", "z-dir"]);
            assert_eq!(order(SortRule::KindThenName), ["z-dir", "a-small", "b-big"]);
            assert_eq!(order(SortRule::Size)[2], "b-big", "{}", fx.name);
        }
    }

    #[test]
    fn ls_of_a_file_is_not_a_directory() {
        for fx in fixtures(VolumeOptions::default(), Providers::new()) {
            let v = &fx.volume;
            let f = v.mkfile(&v.root().unwrap(), "f").unwrap();
            assert_eq!(v.ls(&f, SortRule::Name).unwrap_err().kind(), ErrorKind::NotADirectory);
        }
    }

    #[test]
    fn ls_skips_dangling_links() {
        let (backend, v) = memory_volume(VolumeOptions::default(), Providers::new());
        backend.symlink(&p("gone"), &p("missing")).unwrap();
        backend.create_file(&p("here")).unwrap();
        let names: Vec<_> = v
            .ls(&v.root().unwrap(), SortRule::Name)
            .unwrap()
            .into_iter()
            .map(|n| n.name)
            .collect();
        assert_eq!(names, ["here"]);
    }

    // ---- tree ----

    #[test]
    fn tree_lists_directories_depth_first() {
        for fx in fixtures(VolumeOptions::default(), Providers::new()) {
            let v = &fx.volume;
            let root = v.root().unwrap();
            let a = v.mkdir(&root, "a").unwrap();
            v.mkdir(&a, "a1").unwrap();
            v.mkdir(&root, "b").unwrap();
            v.mkfile(&a, "file").unwrap();

            let tree = v.tree(&root).unwrap();
            let names: Vec<_> = tree.iter().map(|n| n.name.as_str()).collect();
            assert_eq!(names, ["a", "b", "a1"], "{}", fx.name);
            assert_eq!(tree[2].parent, a);
            assert_eq!(tree[0].parent, root);
        }
    }

    #[test]
    fn tree_terminates_on_link_cycles() {
        let (backend, v) = memory_volume(VolumeOptions::default(), Providers::new());
        backend.create_dir(&p("a")).unwrap();
        backend.create_dir(&p("a/b")).unwrap();
        backend.symlink(&p("a/b/up"), &p("a")).unwrap();
        backend.symlink(&p("self"), &p("")).unwrap();

        let tree = v.tree(&v.root().unwrap()).unwrap();
        let names: Vec<_> = tree.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, ["a", "b"]);
    }

    #[cfg(unix)]
    #[test]
    fn tree_terminates_on_local_link_cycles() {
        let (dir, v) = crate::testing::local_volume(VolumeOptions::default(), Providers::new());
        std::fs::create_dir_all(dir.path().join("a/b")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("a"), dir.path().join("a/b/up")).unwrap();

        let tree = v.tree(&v.root().unwrap()).unwrap();
        assert_eq!(tree.len(), 2);
    }
}
