//! Error types for campaigns

use sendwise_contacts::ContactError;
use sendwise_email::EmailError;
use thiserror::Error;

use crate::blocks::BlockError;

#[derive(Error, Debug)]
pub enum CampaignError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Campaign not found: {0}")]
    NotFound(i32),

    #[error("Campaign {id} is {status}; only draft and scheduled campaigns can be changed")]
    InvalidState { id: i32, status: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Block(#[from] BlockError),

    #[error(transparent)]
    Email(#[from] EmailError),

    #[error(transparent)]
    Contact(#[from] ContactError),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for CampaignError {
    fn from(err: serde_json::Error) -> Self {
        CampaignError::Serialization(err.to_string())
    }
}
