//! Error types for contacts, lists and file import

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("File is not valid UTF-8 text")]
    InvalidEncoding,

    #[error("Malformed file: {0}")]
    Malformed(String),

    #[error("Invalid XLSX file: {0}")]
    Xlsx(String),
}

#[derive(Error, Debug)]
pub enum ContactError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Contact not found: {0}")]
    NotFound(i32),

    #[error("Contact list not found: {0}")]
    ListNotFound(i32),

    #[error("Contact {contact_id} is not a member of list {list_id}")]
    NotMember { list_id: i32, contact_id: i32 },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Import(#[from] ImportError),
}
