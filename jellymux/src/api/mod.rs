//! Read-only HTTP dashboard.
//!
//! Serves the processing state of every known file. Nothing here writes to
//! the store.

pub mod error;
pub mod models;
pub mod routes;
pub mod server;

pub use server::{ApiServer, ApiServerConfig, AppState};
