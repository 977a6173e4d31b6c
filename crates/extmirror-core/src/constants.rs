//! Constants used throughout extmirror-core.

/// File extension of stored packages.
pub const BLOB_EXTENSION: &str = "zip";

/// Prefix of in-progress blobs inside the store root.
pub const INCOMING_PREFIX: &str = ".incoming-";

/// Number of completed package downloads between progress lines.
pub const FILE_PROGRESS_EVERY: usize = 100;

/// Keyword selecting every web extension in the catalog.
pub const SELECT_ALL: &str = "all";

/// Keyword selecting stored files no catalog record refers to.
pub const SELECT_ORPHANS: &str = "orphans";
