use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::BackendResult;
use crate::local::LocalBackend;
use crate::memory::MemoryBackend;
use crate::traits::Backend;

/// Backend selection, as written in a volume's `[volumes.backend]` table.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendConfig {
    /// A directory on the local disk.
    Local { path: PathBuf },
    /// A fresh, empty in-memory tree.
    #[default]
    Memory,
}

impl BackendConfig {
    /// Construct the configured backend.
    pub fn build(&self) -> BackendResult<Arc<dyn Backend>> {
        let backend: Arc<dyn Backend> = match self {
            BackendConfig::Local { path } => Arc::new(LocalBackend::new(path)?),
            BackendConfig::Memory => Arc::new(MemoryBackend::new()),
        };
        debug!(kind = backend.kind(), root = %backend.root_label(), "backend built");
        Ok(backend)
    }
}
