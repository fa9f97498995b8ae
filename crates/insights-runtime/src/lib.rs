//! Runtime layer for Repo Insights.
//!
//! Discovers repositories, loads their snapshots concurrently with a bounded
//! wait on optional tables, and serves filter-scoped results from a session
//! cache through the [`dashboard::Dashboard`] service object.

pub mod dashboard;
pub mod discovery;
pub mod loader;

pub use insights_core as core;
pub use insights_data as data;
