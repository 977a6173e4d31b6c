//! Error types for extmirror-core.

use extmirror_config::error::ConfigError;
use extmirror_dl::error::DownloadError;
use extmirror_registry::RegistryError;
use extmirror_utils::error::{FileSystemError, HashError, PathError};
use miette::Diagnostic;
use thiserror::Error;

/// Errors raised by the content store.
#[derive(Error, Diagnostic, Debug)]
pub enum StoreError {
    #[error("Invalid content hash: {0}")]
    #[diagnostic(
        code(extmirror::store::invalid_hash),
        help("Content hashes are 64 hexadecimal characters (SHA-256)")
    )]
    InvalidHash(String),

    #[error("Content hash mismatch: expected {expected}, got {actual}")]
    #[diagnostic(
        code(extmirror::store::digest_mismatch),
        help("The downloaded file does not match the catalog; it was not stored")
    )]
    DigestMismatch { expected: String, actual: String },

    #[error("Failed to read content for {hash}")]
    #[diagnostic(code(extmirror::store::read))]
    Read {
        hash: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Error while {action}")]
    #[diagnostic(code(extmirror::store::io), help("Check file permissions and disk space"))]
    IoError {
        action: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    FileSystemError(#[from] FileSystemError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    HashError(#[from] HashError),
}

impl StoreError {
    /// Only a failure of the incoming stream is worth another attempt.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Read { .. })
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Top level error of mirror operations.
#[derive(Error, Diagnostic, Debug)]
pub enum MirrorError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    DownloadError(#[from] DownloadError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    PathError(#[from] PathError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    FileSystemError(#[from] FileSystemError),

    #[error("Operation interrupted")]
    #[diagnostic(
        code(extmirror::interrupted),
        help("Everything stored so far is kept; run sync again to continue")
    )]
    Interrupted,
}
