use std::fmt;

use thiserror::Error;

/// Errors produced by driver operations.
///
/// Every variant maps onto an [`ErrorKind`] through [`VfsError::kind`], which
/// is what callers should match on when they only care about the category.
#[derive(Debug, Error)]
pub enum VfsError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("is a directory: {0}")]
    IsADirectory(String),

    /// The hash was not issued by this codec, or its volume is gone.
    #[error("invalid hash: {0}")]
    InvalidHash(String),

    #[error("invalid name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("size limit exceeded: {size} bytes > {limit} bytes")]
    SizeLimitExceeded { size: u64, limit: u64 },

    /// Some members of a recursive operation failed.
    #[error("{} member(s) could not be processed: {}", failed.len(), join_failures(failed))]
    PartialFailure { failed: Vec<(String, String)> },

    #[error("provider '{provider}' failed: {message}")]
    Provider { provider: String, message: String },

    #[error("configuration error: {0}")]
    Config(String),

    /// Catch-all for transport and storage failures.
    #[error("backend I/O error: {0}")]
    BackendIo(#[from] std::io::Error),
}

fn join_failures(failed: &[(String, String)]) -> String {
    failed
        .iter()
        .map(|(path, reason)| format!("{path} ({reason})"))
        .collect::<Vec<_>>()
        .join(", ")
}

impl VfsError {
    /// Create an invalid-name error.
    pub fn invalid_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidName {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a provider error.
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// The category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Self::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Self::NotADirectory(_) => ErrorKind::NotADirectory,
            Self::IsADirectory(_) => ErrorKind::IsADirectory,
            Self::InvalidHash(_) => ErrorKind::InvalidHash,
            Self::InvalidName { .. } => ErrorKind::InvalidName,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::UnsupportedOperation(_) => ErrorKind::UnsupportedOperation,
            Self::SizeLimitExceeded { .. } => ErrorKind::SizeLimitExceeded,
            Self::PartialFailure { .. } => ErrorKind::PartialFailure,
            Self::Provider { .. } => ErrorKind::Provider,
            Self::Config(_) => ErrorKind::Config,
            Self::BackendIo(_) => ErrorKind::BackendIo,
        }
    }

    /// Returns `true` if the caller can correct the request and try again
    /// without anything changing on the backend (re-resolve the hash, pick
    /// another operation, choose another name).
    pub fn is_caller_correctable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::InvalidHash
                | ErrorKind::UnsupportedOperation
                | ErrorKind::InvalidName
                | ErrorKind::InvalidArgument
        )
    }
}

/// Error category, independent of the message payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    PermissionDenied,
    NotADirectory,
    IsADirectory,
    InvalidHash,
    InvalidName,
    InvalidArgument,
    UnsupportedOperation,
    SizeLimitExceeded,
    PartialFailure,
    Provider,
    Config,
    BackendIo,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotFound => "NotFound",
            Self::AlreadyExists => "AlreadyExists",
            Self::PermissionDenied => "PermissionDenied",
            Self::NotADirectory => "NotADirectory",
            Self::IsADirectory => "IsADirectory",
            Self::InvalidHash => "InvalidHash",
            Self::InvalidName => "InvalidName",
            Self::InvalidArgument => "InvalidArgument",
            Self::UnsupportedOperation => "UnsupportedOperation",
            Self::SizeLimitExceeded => "SizeLimitExceeded",
            Self::PartialFailure => "PartialFailure",
            Self::Provider => "Provider",
            Self::Config => "Config",
            Self::BackendIo => "BackendIO",
        };
        f.write_str(name)
    }
}

/// Result alias for driver operations.
pub type VfsResult<T> = Result<T, VfsError>;
