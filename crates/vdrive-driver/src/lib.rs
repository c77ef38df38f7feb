//! The vdrive storage-driver contract.
//!
//! A [`Volume`] mounts one storage backend and exposes it through the
//! [`Driver`] trait: every node is addressed by an opaque hash, every verb is
//! gated by the read/write/remove capability model, and bytes cross volume
//! boundaries only through [`Descriptor`] streams.
//!
//! # Architecture
//!
//! ```text
//! caller ──hash──▶ HashCodec ──path──▶ AccessPolicy ──▶ catalog / mutations ──▶ Backend
//!                                                         │
//!                                                         └──▶ Providers (archive, image, thumbnails)
//! ```
//!
//! [`VolumeSet`] loads every volume of a [`DriverConfig`] over one shared
//! codec and routes hashes to the volume that issued them.
//!
//! # Guarantees
//!
//! 1. Creation never replaces an existing node; of two racing creators of a name exactly one wins.
//! 2. Content replacement is atomic: readers see the old bytes or the new bytes.
//! 3. Directory walks terminate on symbolic-link cycles.
//! 4. Every failed operation leaves its message in the volume's error state.

pub mod adapters;
pub mod archive;
pub mod capability;
pub mod catalog;
pub mod config;
pub mod descriptor;
pub mod diagnostics;
pub mod driver;
pub mod imaging;
pub mod mutation;
pub mod set;
pub mod slots;
#[cfg(test)]
mod testing;
pub mod thumbnail;
pub mod volume;

pub use adapters::{ArchiveEntry, ArchiveProvider, ImageProvider, ProviderError, Providers};
pub use capability::AccessPolicy;
pub use config::{DenyRule, DriverConfig, VolumeOptions};
pub use descriptor::Descriptor;
pub use diagnostics::{DebugInfo, ErrorState};
pub use driver::Driver;
pub use set::VolumeSet;
pub use slots::{NameSlots, SlotGuard};
pub use thumbnail::{thumbnail_name, MemoryThumbnailStore, ThumbnailStore};
pub use volume::Volume;
