//! Campaigns, the template block editor and dashboard statistics for Sendwise

pub mod blocks;
pub mod errors;
pub mod handlers;
pub mod services;

pub use blocks::{BlockError, BlockKind, TemplateBlock};
pub use errors::CampaignError;
pub use services::{CampaignService, CampaignStatus, StatsService};
