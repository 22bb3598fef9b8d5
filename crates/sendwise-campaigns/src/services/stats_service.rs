//! Dashboard aggregates computed from the stored campaign counters

use sea_orm::{
    sea_query::Expr, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect,
};
use sendwise_entities::campaigns;
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::errors::CampaignError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct ClientStats {
    pub total_campaigns: u64,
    pub sent_campaigns: u64,
    pub total_recipients: i64,
    pub delivered: i64,
    pub opened: i64,
    pub clicked: i64,
    pub bounced: i64,
    /// Percent of delivered emails that were opened
    #[schema(example = 42.5)]
    pub open_rate: f64,
    /// Percent of delivered emails that were clicked
    pub click_rate: f64,
    /// Percent of recipients that bounced
    pub bounce_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct CampaignSummary {
    pub id: i32,
    pub name: String,
    pub subject: String,
    pub status: String,
    pub recipients: i32,
    pub delivered: i32,
    pub opened: i32,
    pub clicked: i32,
    pub bounced: i32,
    pub open_rate: f64,
    pub click_rate: f64,
    pub scheduled_at: Option<String>,
    pub sent_at: Option<String>,
    pub created_at: String,
}

/// `part / whole` as a percentage with two decimals; 0 when `whole` is 0
pub fn rate(part: i64, whole: i64) -> f64 {
    if whole <= 0 {
        return 0.0;
    }
    (part as f64 * 10_000.0 / whole as f64).round() / 100.0
}

impl From<campaigns::Model> for CampaignSummary {
    fn from(campaign: campaigns::Model) -> Self {
        Self {
            open_rate: rate(campaign.opened.into(), campaign.delivered.into()),
            click_rate: rate(campaign.clicked.into(), campaign.delivered.into()),
            id: campaign.id,
            name: campaign.name,
            subject: campaign.subject,
            status: campaign.status,
            recipients: campaign.recipients,
            delivered: campaign.delivered,
            opened: campaign.opened,
            clicked: campaign.clicked,
            bounced: campaign.bounced,
            scheduled_at: campaign.scheduled_at.map(|t| t.to_rfc3339()),
            sent_at: campaign.sent_at.map(|t| t.to_rfc3339()),
            created_at: campaign.created_at.to_rfc3339(),
        }
    }
}

type CounterSums = (
    Option<i64>,
    Option<i64>,
    Option<i64>,
    Option<i64>,
    Option<i64>,
);

pub struct StatsService {
    db: Arc<DatabaseConnection>,
}

impl StatsService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn client_stats(&self) -> Result<ClientStats, CampaignError> {
        let total_campaigns = campaigns::Entity::find().count(self.db.as_ref()).await?;
        let sent_campaigns = campaigns::Entity::find()
            .filter(campaigns::Column::Status.eq("sent"))
            .count(self.db.as_ref())
            .await?;

        let sums: Option<CounterSums> = campaigns::Entity::find()
            .select_only()
            .column_as(Expr::col(campaigns::Column::Recipients).sum(), "recipients")
            .column_as(Expr::col(campaigns::Column::Delivered).sum(), "delivered")
            .column_as(Expr::col(campaigns::Column::Opened).sum(), "opened")
            .column_as(Expr::col(campaigns::Column::Clicked).sum(), "clicked")
            .column_as(Expr::col(campaigns::Column::Bounced).sum(), "bounced")
            .into_tuple()
            .one(self.db.as_ref())
            .await?;
        let (recipients, delivered, opened, clicked, bounced) =
            sums.unwrap_or((None, None, None, None, None));
        let (recipients, delivered, opened, clicked, bounced) = (
            recipients.unwrap_or(0),
            delivered.unwrap_or(0),
            opened.unwrap_or(0),
            clicked.unwrap_or(0),
            bounced.unwrap_or(0),
        );

        Ok(ClientStats {
            total_campaigns,
            sent_campaigns,
            total_recipients: recipients,
            delivered,
            opened,
            clicked,
            bounced,
            open_rate: rate(opened, delivered),
            click_rate: rate(clicked, delivered),
            bounce_rate: rate(bounced, recipients),
        })
    }

    /// Every campaign, newest first
    pub async fn client_campaigns(&self) -> Result<Vec<CampaignSummary>, CampaignError> {
        let campaigns = campaigns::Entity::find()
            .order_by_desc(campaigns::Column::CreatedAt)
            .order_by_desc(campaigns::Column::Id)
            .all(self.db.as_ref())
            .await?;

        Ok(campaigns.into_iter().map(CampaignSummary::from).collect())
    }
}
