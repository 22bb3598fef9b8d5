//! Common type aliases

use chrono::{DateTime, Utc};

/// Canonical timestamp type for database columns and API responses
pub type DBDateTime = DateTime<Utc>;
