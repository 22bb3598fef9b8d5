//! Contacts, contact lists and contact file import/export for Sendwise

pub mod errors;
pub mod export;
pub mod handlers;
pub mod import;
pub mod services;

pub use errors::{ContactError, ImportError};
pub use import::{parse_contacts, ImportFormat, ImportReport};
pub use services::{ContactService, ListService};
