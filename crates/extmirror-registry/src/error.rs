//! Error types for the registry crate.

use extmirror_utils::error::{FileSystemError, UtilsError};
use miette::Diagnostic;
use thiserror::Error;

/// Errors that can occur while fetching, loading or storing the catalog.
#[derive(Error, Diagnostic, Debug)]
pub enum RegistryError {
    #[error("Error while {action}: {source}")]
    #[diagnostic(code(extmirror_registry::io))]
    IoError {
        action: String,
        source: std::io::Error,
    },

    #[error(transparent)]
    #[diagnostic(code(extmirror_registry::download))]
    DownloadError(#[from] extmirror_dl::error::DownloadError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] extmirror_config::error::ConfigError),

    #[error("Failed to fetch from remote source: {0}")]
    #[diagnostic(
        code(extmirror_registry::fetch_remote),
        help("Verify the catalog URL is correct and reachable")
    )]
    FailedToFetchRemote(String),

    #[error("Unable to fetch {missing} catalog pages")]
    #[diagnostic(
        code(extmirror_registry::incomplete_catalog),
        help("Please try again later; files already stored are kept")
    )]
    IncompleteCatalog { missing: usize },

    #[error("Catalog download interrupted")]
    #[diagnostic(code(extmirror_registry::interrupted))]
    Interrupted,

    #[error(transparent)]
    #[diagnostic(
        code(extmirror_registry::json),
        help("The snapshot file may be corrupted; run a sync to rebuild it")
    )]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    #[diagnostic(
        code(extmirror_registry::invalid_url),
        help("Ensure the URL is valid and properly formatted")
    )]
    InvalidUrl(String),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Utils(#[from] UtilsError),
}

impl From<FileSystemError> for RegistryError {
    fn from(err: FileSystemError) -> Self {
        Self::Utils(UtilsError::FileSystem(err))
    }
}

/// A specialized Result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Extension trait for adding context to I/O errors.
pub trait ErrorContext<T> {
    /// Adds a description of the action that failed.
    fn with_context<C>(self, context: C) -> Result<T>
    where
        C: FnOnce() -> String;
}

impl<T> ErrorContext<T> for std::io::Result<T> {
    fn with_context<C>(self, context: C) -> Result<T>
    where
        C: FnOnce() -> String,
    {
        self.map_err(|err| {
            RegistryError::IoError {
                action: context(),
                source: err,
            }
        })
    }
}
