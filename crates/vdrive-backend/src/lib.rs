//! Storage backends for vdrive.
//!
//! A backend knows nothing about hashes, capabilities or volumes. It stores
//! files and directories addressed by [`VolumePath`](vdrive_types::VolumePath)
//! and reports the raw permission facts the driver turns into capabilities.
//!
//! # Backends
//!
//! All backends implement the [`Backend`] trait:
//!
//! - [`MemoryBackend`] -- `BTreeMap`-based tree with symbolic links, for tests and embedding
//! - [`LocalBackend`] -- a directory on the local disk
//!
//! [`BackendConfig`] selects and builds one from configuration.
//!
//! # Contract
//!
//! 1. Creation primitives (`create_dir`, `create_file`, `write_new`) never replace an existing entry.
//! 2. `replace` swaps file content atomically; readers see old or new bytes, never a mix.
//! 3. `rename` never overwrites its destination.
//! 4. `stat` follows symbolic links; `is_link`, `remove_file` and `rename` do not.

pub mod config;
pub mod error;
pub mod local;
pub mod memory;
pub mod traits;

pub use config::BackendConfig;
pub use error::{BackendError, BackendResult};
pub use local::LocalBackend;
pub use memory::MemoryBackend;
pub use traits::{Backend, DirEntry, NodeStat};
