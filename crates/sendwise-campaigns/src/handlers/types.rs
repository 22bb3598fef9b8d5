//! Handler types for campaigns and dashboard stats

use crate::blocks::TemplateBlock;
use crate::errors::CampaignError;
use crate::services::{CampaignService, StatsService};
use chrono::{DateTime, Utc};
use sendwise_core::error_builder::{bad_request, conflict, internal_server_error, not_found};
use sendwise_core::problemdetails::Problem;
use sendwise_entities::campaigns;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::{IntoParams, ToSchema};

pub struct AppState {
    pub campaign_service: Arc<CampaignService>,
    pub stats_service: Arc<StatsService>,
}

impl From<CampaignError> for Problem {
    fn from(err: CampaignError) -> Self {
        match err {
            CampaignError::NotFound(id) => {
                not_found().detail(format!("Campaign {} not found", id)).build()
            }
            e @ CampaignError::InvalidState { .. } => conflict().detail(e.to_string()).build(),
            e @ (CampaignError::Validation(_) | CampaignError::Block(_)) => {
                bad_request().detail(e.to_string()).build()
            }
            CampaignError::Email(e) => e.into(),
            CampaignError::Contact(e) => e.into(),
            e => {
                error!("Campaign service error: {}", e);
                internal_server_error().detail(e.to_string()).build()
            }
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateCampaignBody {
    #[schema(example = "March newsletter")]
    pub name: String,
    #[schema(example = "What's new in March")]
    pub subject: String,
    pub from_name: Option<String>,
    #[schema(example = "news@example.com")]
    pub from_email: String,
    pub reply_to: Option<String>,
    pub domain_id: Option<i32>,
    pub provider_id: Option<i32>,
    pub list_id: Option<i32>,
    #[serde(default)]
    pub blocks: Vec<TemplateBlock>,
}

/// Omitted fields are left unchanged
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateCampaignBody {
    pub name: Option<String>,
    pub subject: Option<String>,
    pub from_name: Option<String>,
    pub from_email: Option<String>,
    pub reply_to: Option<String>,
    pub domain_id: Option<i32>,
    pub provider_id: Option<i32>,
    pub list_id: Option<i32>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CampaignListQuery {
    /// draft, scheduled, sending, sent or failed
    pub status: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateBlocksBody {
    pub blocks: Vec<TemplateBlock>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReorderBlockBody {
    #[schema(example = 2)]
    pub from: usize,
    #[schema(example = 0)]
    pub to: usize,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ScheduleBody {
    #[schema(value_type = String, example = "2026-11-01T09:00:00Z")]
    pub scheduled_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CampaignResponse {
    pub id: i32,
    pub name: String,
    pub subject: String,
    pub from_name: Option<String>,
    pub from_email: String,
    pub reply_to: Option<String>,
    pub domain_id: Option<i32>,
    pub provider_id: Option<i32>,
    pub list_id: Option<i32>,
    #[schema(example = "draft")]
    pub status: String,
    /// Ordered template blocks
    pub blocks: serde_json::Value,
    pub scheduled_at: Option<String>,
    pub sent_at: Option<String>,
    pub recipients: i32,
    pub delivered: i32,
    pub failed: i32,
    pub opened: i32,
    pub clicked: i32,
    pub bounced: i32,
    pub unsubscribed: i32,
    pub created_at: String,
    pub updated_at: String,
}

impl From<campaigns::Model> for CampaignResponse {
    fn from(campaign: campaigns::Model) -> Self {
        Self {
            id: campaign.id,
            name: campaign.name,
            subject: campaign.subject,
            from_name: campaign.from_name,
            from_email: campaign.from_email,
            reply_to: campaign.reply_to,
            domain_id: campaign.domain_id,
            provider_id: campaign.provider_id,
            list_id: campaign.list_id,
            status: campaign.status,
            blocks: campaign.blocks,
            scheduled_at: campaign.scheduled_at.map(|t| t.to_rfc3339()),
            sent_at: campaign.sent_at.map(|t| t.to_rfc3339()),
            recipients: campaign.recipients,
            delivered: campaign.delivered,
            failed: campaign.failed,
            opened: campaign.opened,
            clicked: campaign.clicked,
            bounced: campaign.bounced,
            unsubscribed: campaign.unsubscribed,
            created_at: campaign.created_at.to_rfc3339(),
            updated_at: campaign.updated_at.to_rfc3339(),
        }
    }
}
