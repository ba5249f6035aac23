//! Database models.
//!
//! These map directly to the database schema.

pub mod media_file;

pub use media_file::*;
