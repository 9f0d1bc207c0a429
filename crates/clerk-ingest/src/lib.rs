//! # clerk-ingest
//!
//! Turns free-form text into persisted tasks.
//!
//! [`IngestionPipeline`] drives one request through extraction (or the
//! fallback path) and hands the candidates to [`EntityMaterializer`], which
//! resolves categories and tags and writes the tasks in the same
//! transaction as the raw input and its audit record.
//!
//! [`MemoryStore`] is an in-process [`IngestionStore`](clerk_core::IngestionStore)
//! for tests and local experiments; `clerk-db` provides the PostgreSQL one.

pub mod materializer;
pub mod memory;
pub mod pipeline;

pub use materializer::{category_color, EntityMaterializer};
pub use memory::{MemoryStore, MemoryTx};
pub use pipeline::{IngestionPipeline, IngestionReport, IngestionState, PipelineConfig};
