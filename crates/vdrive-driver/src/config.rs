//! Driver configuration, loaded from TOML.
//!
//! ```toml
//! session_key = "v"
//!
//! [[volumes]]
//! alias = "Home"
//! hidden = ['^\.']
//! upload_max_size = 10485760
//!
//! [volumes.backend]
//! kind = "local"
//! path = "/srv/files"
//!
//! [[volumes.deny]]
//! pattern = '\.lock$'
//! capabilities = ["write", "remove"]
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use vdrive_backend::BackendConfig;
use vdrive_types::{Capability, SortRule, VfsError, VfsResult, VolumeId};

/// Default prefix of volume ids (`v1`, `v2`, ...).
pub const DEFAULT_SESSION_KEY: &str = "v";

/// Default edge length of generated thumbnails, in pixels.
pub const DEFAULT_TMB_SIZE: u32 = 48;

/// Top-level configuration: a session key and the volumes to mount.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DriverConfig {
    /// Prefix of every volume id. Volume `n` (1-based) gets id `<session_key><n>`.
    pub session_key: String,
    pub volumes: Vec<VolumeOptions>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            session_key: DEFAULT_SESSION_KEY.to_string(),
            volumes: Vec::new(),
        }
    }
}

impl DriverConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(source: &str) -> VfsResult<Self> {
        let config: Self = toml::from_str(source).map_err(|e| VfsError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> VfsResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| VfsError::Config(format!("{}: {e}", path.display())))?;
        let config: Self = toml::from_str(&source)
            .map_err(|e| VfsError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// A configuration mounting a single local directory.
    pub fn single_local(root: impl Into<PathBuf>) -> Self {
        Self {
            volumes: vec![VolumeOptions {
                backend: BackendConfig::Local { path: root.into() },
                ..VolumeOptions::default()
            }],
            ..Self::default()
        }
    }

    /// Id of the `index`-th (0-based) volume.
    pub fn volume_id(&self, index: usize) -> VfsResult<VolumeId> {
        VolumeId::new(format!("{}{}", self.session_key, index + 1))
    }

    /// Check everything that can be checked without touching a backend.
    pub fn validate(&self) -> VfsResult<()> {
        if self.session_key.is_empty() || !self.session_key.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(VfsError::Config(format!(
                "session_key {:?} must be non-empty ASCII alphanumeric",
                self.session_key
            )));
        }
        for index in 0..self.volumes.len() {
            self.volume_id(index)?;
        }
        for options in &self.volumes {
            options.validate()?;
        }
        Ok(())
    }
}

/// Rule that strips capabilities from every node whose path matches.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DenyRule {
    /// Regex matched against the node path rendered as `/a/b`.
    pub pattern: String,
    /// Capabilities to clear; all of them when omitted.
    #[serde(default = "all_capabilities")]
    pub capabilities: Vec<Capability>,
}

fn all_capabilities() -> Vec<Capability> {
    Capability::ALL.to_vec()
}

/// Options of one volume.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VolumeOptions {
    /// Display name of the root; defaults to the volume id.
    pub alias: Option<String>,
    /// Force write and remove off everywhere.
    pub read_only: bool,
    /// Regexes over single names; matching nodes are invisible and inaccessible.
    pub hidden: Vec<String>,
    /// Largest accepted upload in bytes.
    pub upload_max_size: Option<u64>,
    /// Archive MIME types this volume accepts; empty allows every registered one.
    pub archive_mimes: Vec<String>,
    pub tmb_size: u32,
    pub default_sort: SortRule,
    pub backend: BackendConfig,
    pub deny: Vec<DenyRule>,
    /// Backend-specific settings. Reported by `debug()` with secrets redacted.
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Default for VolumeOptions {
    fn default() -> Self {
        Self {
            alias: None,
            read_only: false,
            hidden: Vec::new(),
            upload_max_size: None,
            archive_mimes: Vec::new(),
            tmb_size: DEFAULT_TMB_SIZE,
            default_sort: SortRule::default(),
            backend: BackendConfig::default(),
            deny: Vec::new(),
            extra: BTreeMap::new(),
        }
    }
}

impl VolumeOptions {
    /// Options for a read-only volume over `backend`.
    pub fn read_only(backend: BackendConfig) -> Self {
        Self {
            read_only: true,
            backend,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> VfsResult<()> {
        if self.tmb_size == 0 {
            return Err(VfsError::Config("tmb_size must be positive".into()));
        }
        if let Some(alias) = &self.alias {
            if alias.trim().is_empty() {
                return Err(VfsError::Config("alias must not be blank".into()));
            }
        }
        Ok(())
    }
}
