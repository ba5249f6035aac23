//! Service layer module.
//!
//! Wires the pipeline together and runs the scan and process loops.

pub mod container;

pub use container::ServiceContainer;
