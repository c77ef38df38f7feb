//! Error types for backend operations.

use std::io;

use thiserror::Error;
use vdrive_types::{VfsError, VolumePath};

/// Errors that can occur inside a storage backend.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("no such entry: {0}")]
    NotFound(VolumePath),

    #[error("entry already exists: {0}")]
    AlreadyExists(VolumePath),

    #[error("not a directory: {0}")]
    NotADirectory(VolumePath),

    #[error("is a directory: {0}")]
    IsADirectory(VolumePath),

    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(VolumePath),

    #[error("permission denied: {0}")]
    PermissionDenied(VolumePath),

    /// Too many symbolic links were followed while resolving a path.
    #[error("too many levels of symbolic links: {0}")]
    LinkLoop(VolumePath),

    /// A symbolic link points outside the backend root.
    #[error("link escapes the backend root: {0}")]
    OutsideRoot(VolumePath),

    /// Streamed content exceeded the caller's limit; nothing was written.
    #[error("content of {size} bytes exceeds the limit of {limit} bytes")]
    TooLarge { size: u64, limit: u64 },

    /// The backend root is missing or unusable.
    #[error("invalid backend root: {0}")]
    InvalidRoot(String),

    /// A path component read from storage is not a valid name.
    #[error(transparent)]
    Path(#[from] VfsError),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl BackendError {
    /// Classify an I/O error raised while operating on `path`.
    pub fn from_io(path: &VolumePath, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path.clone()),
            io::ErrorKind::AlreadyExists => Self::AlreadyExists(path.clone()),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.clone()),
            _ => Self::Io(err),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }
}

impl From<BackendError> for VfsError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::NotFound(p) => VfsError::NotFound(p.to_string()),
            BackendError::AlreadyExists(p) => VfsError::AlreadyExists(p.to_string()),
            BackendError::NotADirectory(p) => VfsError::NotADirectory(p.to_string()),
            BackendError::IsADirectory(p) => VfsError::IsADirectory(p.to_string()),
            BackendError::PermissionDenied(p) => VfsError::PermissionDenied(p.to_string()),
            BackendError::OutsideRoot(p) => {
                VfsError::PermissionDenied(format!("{p} resolves outside the volume"))
            }
            BackendError::TooLarge { size, limit } => VfsError::SizeLimitExceeded { size, limit },
            BackendError::InvalidRoot(msg) => VfsError::Config(msg),
            BackendError::Path(e) => e,
            other @ (BackendError::DirectoryNotEmpty(_) | BackendError::LinkLoop(_)) => {
                VfsError::BackendIo(io::Error::other(other.to_string()))
            }
            BackendError::Io(e) => VfsError::BackendIo(e),
        }
    }
}

/// Result alias for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;
