//! Campaign and dashboard services

mod campaign_service;
mod stats_service;

pub use campaign_service::{
    CampaignService, CampaignStatus, CreateCampaignRequest, UpdateCampaignRequest,
};
pub use stats_service::{rate, CampaignSummary, ClientStats, StatsService};
