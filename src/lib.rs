//! BizScope: a self-correcting analysis orchestrator for tabular
//! business data.
//!
//! A submitted job pairs a dataset with a natural-language question.
//! The orchestrator detects the business domain, runs the applicable
//! capability pipeline, and when a capability fails it consults the
//! error advisor for a correction and retries, learning successful
//! fixes into a persistent pattern memory. Progress is streamed to a
//! single subscriber per job.

pub mod advisor;
pub mod capability;
pub mod classifier;
pub mod dataset;
pub mod error;
pub mod memory;
pub mod models;
pub mod orchestrator;
pub mod progress;

pub use error::BizscopeError;
pub use orchestrator::{JobConfig, Orchestrator};
