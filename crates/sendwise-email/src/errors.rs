//! Error types for the email service

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmailError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Provider not found: {0}")]
    ProviderNotFound(i32),

    #[error("Domain not found: {0}")]
    DomainNotFound(i32),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid provider type: {0}")]
    InvalidProviderType(String),

    #[error("{provider} requires the '{field}' credential")]
    MissingCredential { provider: String, field: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("SendGrid error: {0}")]
    SendGrid(String),

    #[error("Mailgun error: {0}")]
    Mailgun(String),

    #[error("AWS SES error: {0}")]
    Ses(String),

    #[error("SendClean error: {0}")]
    SendClean(String),

    #[error("SendPulse error: {0}")]
    SendPulse(String),

    #[error("SMTP error: {0}")]
    Smtp(String),

    #[error("DNS error: {0}")]
    Dns(String),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl EmailError {
    /// True for failures reported by a remote provider
    pub fn is_provider_failure(&self) -> bool {
        matches!(
            self,
            EmailError::SendGrid(_)
                | EmailError::Mailgun(_)
                | EmailError::Ses(_)
                | EmailError::SendClean(_)
                | EmailError::SendPulse(_)
                | EmailError::Smtp(_)
        )
    }
}

impl From<serde_json::Error> for EmailError {
    fn from(err: serde_json::Error) -> Self {
        EmailError::Serialization(err.to_string())
    }
}

impl From<sendwise_core::EncryptionError> for EmailError {
    fn from(err: sendwise_core::EncryptionError) -> Self {
        EmailError::Encryption(err.to_string())
    }
}
