//! Common types for bilateral grid slicing
//!
//! This crate provides the foundational types shared by the kernel and layer
//! crates: error handling, configuration, and the immutable slice geometry
//! produced by the reshape step.

pub mod config;
pub mod error;
pub mod geometry;

pub use config::*;
pub use error::*;
pub use geometry::*;
