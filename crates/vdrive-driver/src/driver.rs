//! The [`Driver`] trait: the contract every mounted volume fulfils.

use vdrive_types::{
    NodeHash, NodeInfo, OpenMode, SortRule, ThumbnailRef, TreeNode, VfsResult, VolumeId,
};

use crate::descriptor::Descriptor;
use crate::diagnostics::DebugInfo;

/// Uniform storage-driver contract.
///
/// Nodes are addressed only by hashes this driver (or the codec it shares)
/// issued; the literal `"/"` names the root of the default volume. Every verb
/// is gated by the read/write/remove capabilities of the nodes it touches.
/// Failures are returned as [`VfsError`](vdrive_types::VfsError) values and
/// also recorded, so [`Driver::error`] reports the most recent one.
///
/// The trait is object safe; callers may hold `Box<dyn Driver>` or
/// `&dyn Driver` for volumes over different backends.
pub trait Driver: Send + Sync {
    /// Identity of this volume.
    fn id(&self) -> &VolumeId;

    /// Display name of the volume root.
    fn alias(&self) -> &str;

    /// Hash of the volume root.
    fn root(&self) -> VfsResult<NodeHash>;

    /// Listing order used when the caller expresses no preference.
    fn default_sort(&self) -> SortRule;

    // ---- capabilities ----

    /// `false` for invalid, stale or unknown hashes.
    fn is_readable(&self, hash: &NodeHash) -> bool;

    fn is_writable(&self, hash: &NodeHash) -> bool;

    fn is_removable(&self, hash: &NodeHash) -> bool;

    // ---- catalog ----

    /// Full attributes of a node.
    fn info(&self, hash: &NodeHash) -> VfsResult<NodeInfo>;

    /// Visible children of a directory, ordered by `sort`.
    fn ls(&self, hash: &NodeHash, sort: SortRule) -> VfsResult<Vec<NodeInfo>>;

    /// Every visible directory below `hash`, each with its parent's hash.
    ///
    /// Terminates on link cycles: a directory reached twice is reported once.
    fn tree(&self, hash: &NodeHash) -> VfsResult<Vec<TreeNode>>;

    /// Generate missing thumbnails for the image files of a directory.
    fn tmb(&self, hash: &NodeHash) -> VfsResult<Vec<ThumbnailRef>>;

    // ---- descriptors ----

    fn open(&self, hash: &NodeHash, mode: OpenMode) -> VfsResult<Descriptor>;

    /// Release a descriptor, committing a write descriptor's staged bytes.
    fn close(&self, descriptor: Descriptor) -> VfsResult<()>;

    // ---- mutations ----

    fn mkdir(&self, parent: &NodeHash, name: &str) -> VfsResult<NodeHash>;

    /// Create an empty file.
    fn mkfile(&self, parent: &NodeHash, name: &str) -> VfsResult<NodeHash>;

    /// Remove a node, recursively for directories.
    ///
    /// Fails with `PartialFailure` listing every member that could not be
    /// removed; members that vanished concurrently count as removed.
    fn rm(&self, hash: &NodeHash) -> VfsResult<()>;

    /// Rename a node in place. The node's hash changes; the new one is returned.
    fn rename(&self, hash: &NodeHash, name: &str) -> VfsResult<NodeHash>;

    /// Copy a node next to itself as `<stem> copy <n><.ext>`.
    fn duplicate(&self, hash: &NodeHash) -> VfsResult<NodeHash>;

    /// Stream a read descriptor, possibly of another volume, into a new file
    /// `name` under `parent`.
    fn copy(&self, source: &mut Descriptor, parent: &NodeHash, name: &str)
        -> VfsResult<NodeHash>;

    fn get_content(&self, hash: &NodeHash) -> VfsResult<Vec<u8>>;

    /// Atomically replace the content of an existing file.
    fn set_content(&self, hash: &NodeHash, data: &[u8]) -> VfsResult<()>;

    // ---- adapters ----

    /// Pack sibling nodes into a new archive of type `mime` in their parent.
    fn archive(&self, hashes: &[NodeHash], name: &str, mime: &str) -> VfsResult<NodeHash>;

    /// Unpack an archive into a new directory next to it.
    fn extract(&self, hash: &NodeHash) -> VfsResult<NodeHash>;

    fn resize(&self, hash: &NodeHash, width: u32, height: u32) -> VfsResult<()>;

    /// Reserved: always `UnsupportedOperation`.
    fn find(&self, mask: &str) -> VfsResult<Vec<NodeHash>>;

    // ---- diagnostics ----

    /// Message of the most recent failure, as `"<op>: <error>"`.
    fn error(&self) -> Option<String>;

    fn debug(&self) -> DebugInfo;
}
