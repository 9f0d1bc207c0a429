//! # clerk-core
//!
//! Core types, traits, and error taxonomy for the clerk task ingestion
//! pipeline.
//!
//! This crate provides the foundational data structures and trait
//! definitions that the inference, storage and pipeline crates depend on.

pub mod defaults;
pub mod error;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use models::*;
pub use traits::*;
