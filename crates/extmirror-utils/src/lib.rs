//! Low-level helpers shared by the extmirror crates.

pub mod error;
pub mod fs;
pub mod hash;
pub mod path;
pub mod time;
