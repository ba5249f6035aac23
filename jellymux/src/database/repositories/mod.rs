//! Repository layer for database access.

pub mod media_file;

pub use media_file::*;
