use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum HashError {
    #[error("Failed to read `{}`: {source}", path.display())]
    #[diagnostic(code(extmirror_utils::hash::read))]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported hash algorithm `{0}`")]
    #[diagnostic(
        code(extmirror_utils::hash::algorithm),
        help("Only sha256 digests are supported")
    )]
    UnsupportedAlgorithm(String),

    #[error("Malformed content hash `{0}`")]
    #[diagnostic(
        code(extmirror_utils::hash::malformed),
        help("Content hashes look like `sha256:<64 hex characters>`")
    )]
    Malformed(String),
}

#[derive(Error, Diagnostic, Debug)]
pub enum PathError {
    #[error("Path is empty")]
    #[diagnostic(code(extmirror_utils::path::empty))]
    Empty,

    #[error("Failed to get current directory: {source}")]
    #[diagnostic(code(extmirror_utils::path::cwd))]
    CurrentDir {
        #[source]
        source: std::io::Error,
    },

    #[error("Environment variable `{var}` not set in `{input}`")]
    #[diagnostic(
        code(extmirror_utils::path::env),
        help("Export the variable or use an absolute path")
    )]
    MissingEnvVar { var: String, input: String },

    #[error("Unclosed variable expression starting at `{input}`")]
    #[diagnostic(code(extmirror_utils::path::unclosed))]
    UnclosedVariable { input: String },
}

#[derive(Error, Diagnostic, Debug)]
pub enum FileSystemError {
    #[error("Failed to {action} file `{}`: {source}", path.display())]
    #[diagnostic(code(extmirror_utils::fs::file))]
    File {
        path: PathBuf,
        action: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to {action} directory `{}`: {source}", path.display())]
    #[diagnostic(
        code(extmirror_utils::fs::directory),
        help("Check permissions of the working directory")
    )]
    Directory {
        path: PathBuf,
        action: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("`{}` is not a directory", path.display())]
    #[diagnostic(code(extmirror_utils::fs::not_a_directory))]
    NotADirectory { path: PathBuf },
}

#[derive(Error, Diagnostic, Debug)]
pub enum UtilsError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Hash(#[from] HashError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    FileSystem(#[from] FileSystemError),
}

pub type FileSystemResult<T> = std::result::Result<T, FileSystemError>;
pub type HashResult<T> = std::result::Result<T, HashError>;
pub type PathResult<T> = std::result::Result<T, PathError>;
pub type UtilsResult<T> = std::result::Result<T, UtilsError>;

#[cfg(test)]
mod tests {
    use std::{error::Error as _, io};

    use super::*;

    #[test]
    fn test_hash_error_display() {
        let err = HashError::ReadFailed {
            path: PathBuf::from("/tmp/blob"),
            source: io::Error::new(io::ErrorKind::NotFound, "gone"),
        };
        assert_eq!(err.to_string(), "Failed to read `/tmp/blob`: gone");
        assert!(err.source().is_some());

        let err = HashError::UnsupportedAlgorithm("md5".into());
        assert_eq!(err.to_string(), "Unsupported hash algorithm `md5`");
    }

    #[test]
    fn test_path_error_display() {
        assert_eq!(PathError::Empty.to_string(), "Path is empty");

        let err = PathError::MissingEnvVar {
            var: "FOO".into(),
            input: "$FOO/bar".into(),
        };
        assert_eq!(err.to_string(), "Environment variable `FOO` not set in `$FOO/bar`");
    }

    #[test]
    fn test_filesystem_error_display() {
        let err = FileSystemError::Directory {
            path: PathBuf::from("/store"),
            action: "create",
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(err.to_string(), "Failed to create directory `/store`: denied");

        let err = FileSystemError::NotADirectory {
            path: PathBuf::from("/etc/hosts"),
        };
        assert_eq!(err.to_string(), "`/etc/hosts` is not a directory");
    }

    #[test]
    fn test_utils_error_is_transparent() {
        let err: UtilsError = PathError::Empty.into();
        assert_eq!(err.to_string(), "Path is empty");
    }
}
