use extmirror_utils::error::{FileSystemError, PathError, UtilsError};
use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum ConfigError {
    #[error("TOML serialization error: {0}")]
    #[diagnostic(
        code(extmirror_config::toml_serialize),
        help("Check your configuration structure for invalid values")
    )]
    TomlSerError(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    #[diagnostic(
        code(extmirror_config::toml_deserialize),
        help("Check your config.toml syntax and structure")
    )]
    TomlDeError(#[from] toml::de::Error),

    #[error("Failed to parse TOML: {0}")]
    #[diagnostic(code(extmirror_config::toml))]
    Toml(#[from] toml_edit::TomlError),

    #[error("Configuration file already exists: {0}")]
    #[diagnostic(
        code(extmirror_config::already_exists),
        help("Remove the existing config file or pass a different --config path")
    )]
    ConfigAlreadyExists(String),

    #[error("Invalid value for `{field}`: {reason}")]
    #[diagnostic(code(extmirror_config::invalid_value))]
    InvalidValue { field: &'static str, reason: String },

    #[error("Invalid duration for `{field}`: {value}")]
    #[diagnostic(
        code(extmirror_config::invalid_duration),
        help("Use values like `500ms`, `2s`, `1m30s`")
    )]
    InvalidDuration { field: &'static str, value: String },

    #[error("Invalid catalog URL: {0}")]
    #[diagnostic(
        code(extmirror_config::invalid_url),
        help("api_url must be an absolute http(s) URL")
    )]
    InvalidUrl(String),

    #[error("IO error: {0}")]
    #[diagnostic(code(extmirror_config::io))]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Utils(#[from] UtilsError),

    #[error("Encountered unexpected TOML item: {0}")]
    #[diagnostic(code(extmirror_config::unexpected_toml_item))]
    UnexpectedTomlItem(String),
}

impl From<PathError> for ConfigError {
    fn from(err: PathError) -> Self {
        Self::Utils(UtilsError::Path(err))
    }
}

impl From<FileSystemError> for ConfigError {
    fn from(err: FileSystemError) -> Self {
        Self::Utils(UtilsError::FileSystem(err))
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;
