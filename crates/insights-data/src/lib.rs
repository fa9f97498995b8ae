//! Data ingestion layer for Repo Insights.
//!
//! Responsible for reading analysis artifacts from a directory or an HTTP
//! base, adapting each artifact shape into the normalized model, assembling
//! repository snapshots and aggregating them across repositories and years.

pub mod aggregator;
pub mod error;
pub mod partial;
pub mod snapshot;
pub mod source;
pub mod transform;
pub mod views;
pub mod yearly;

pub use insights_core as core;
