//! The `utils` module provides shared definitions used across `secdash`:
//! the crate-wide error type and logging initialisation.

pub mod error;
pub mod logging;

pub use error::BroadcastError;
