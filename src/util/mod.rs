//! Utility types and functions shared across the pipeline.
//!
//! - [`Error`] / [`Result`] - Error handling
//! - Math type re-exports from glam and small rotation helpers

mod error;
mod math;

pub use error::*;
pub use math::*;
