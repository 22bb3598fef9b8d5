//! Core utilities and types shared across all Sendwise crates

pub mod config;
pub mod error_builder;
pub mod problemdetails;
pub mod types;
mod encryption;

pub use config::*;
pub use encryption::{EncryptionError, EncryptionService};
pub use error_builder::*;
pub use problemdetails::ProblemDetails;
pub use types::*;

// Re-export external dependencies
pub use chrono;
pub use serde_json;
