use error::MirrorError;

pub mod constants;
pub mod context;
pub mod error;
pub mod file_sync;
pub mod selector;
pub mod store;

pub type MirrorResult<T> = std::result::Result<T, MirrorError>;
