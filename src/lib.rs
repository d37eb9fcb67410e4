//! Harvesting pipeline for municipal procurement portals.
//!
//! The pipeline resolves a set of targets from the catalog, partitions them
//! across a pool of workers that each drive one browser session, extracts
//! and upserts the listed notices, and records the run as a session with a
//! structured log and a summary artifact.

pub mod browser;
pub mod cli;
pub mod config;
pub mod error;
pub mod extract;
pub mod harvest;
pub mod models;
pub mod repository;
pub mod schema;

pub use error::{ExtractionError, HarvestError, PersistenceError, ResolutionError, WorkerFatal};
