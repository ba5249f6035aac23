//! jellymux library crate.
//!
//! Scans a media library for Matroska files, matches loose subtitle and audio
//! files to them by name, and remuxes the matches in place.

pub mod api;
pub mod config;
pub mod database;
pub mod error;
pub mod logging;
pub mod matcher;
pub mod muxer;
pub mod probe;
pub mod processor;
pub mod scanner;
pub mod services;
pub mod tracks;

#[cfg(all(test, unix))]
mod test_support;

pub use error::{Error, Result};
