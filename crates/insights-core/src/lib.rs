//! Core types for repo-insights.
//!
//! Error taxonomy, the normalized data model, CLI configuration, the injected
//! key-value store, and the pure parsing/classification helpers used by the
//! artifact transformers.

pub mod classify;
pub mod csv_table;
pub mod error;
pub mod models;
pub mod settings;
pub mod store;
pub mod timestamps;

pub use error::{InsightsError, Result};
