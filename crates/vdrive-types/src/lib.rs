//! Foundation types for vdrive.
//!
//! This crate provides the identity, addressing, and metadata types shared by
//! every other vdrive crate. Every other vdrive crate depends on `vdrive-types`.
//!
//! # Key Types
//!
//! - [`VolumeId`]: Short alphanumeric identity of a mounted volume
//! - [`NodeHash`]: Opaque, codec-issued identifier of a file or directory
//! - [`VolumePath`]: Canonical address of a node inside its volume
//! - [`NodeInfo`]: Full attribute set of a node as reported by the catalog
//! - [`CapabilitySet`]: Resolved read/write/remove permissions
//! - [`VfsError`]: The driver error taxonomy

pub mod capability;
pub mod error;
pub mod hash;
pub mod node;
pub mod path;

pub use capability::{Capability, CapabilitySet};
pub use error::{ErrorKind, VfsError, VfsResult};
pub use hash::{NodeHash, VolumeId};
pub use node::{NodeInfo, NodeKind, OpenMode, SortRule, ThumbnailRef, TreeNode};
pub use path::{validate_name, VolumePath};
