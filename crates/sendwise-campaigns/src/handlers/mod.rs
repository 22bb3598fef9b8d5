//! HTTP handlers for campaigns and the dashboard

mod campaigns;
mod stats;
mod types;

pub use types::AppState;

use axum::Router;
use std::sync::Arc;
use utoipa::OpenApi;

pub fn configure_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(campaigns::routes())
        .merge(stats::routes())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        campaigns::create_campaign,
        campaigns::list_campaigns,
        campaigns::get_campaign,
        campaigns::update_campaign,
        campaigns::delete_campaign,
        campaigns::update_blocks,
        campaigns::reorder_block,
        campaigns::preview_campaign,
        campaigns::schedule_campaign,
        campaigns::send_campaign,
        stats::client_campaigns,
        stats::client_stats,
    ),
    components(
        schemas(
            types::CreateCampaignBody,
            types::UpdateCampaignBody,
            types::UpdateBlocksBody,
            types::ReorderBlockBody,
            types::ScheduleBody,
            types::CampaignResponse,
            crate::blocks::TemplateBlock,
            crate::blocks::BlockKind,
            crate::services::CampaignStatus,
            crate::services::ClientStats,
            crate::services::CampaignSummary,
        )
    ),
    tags(
        (name = "Campaigns", description = "Campaign drafts, template blocks and sending"),
        (name = "Stats", description = "Dashboard statistics")
    )
)]
pub struct CampaignsApiDoc;

#[cfg(test)]
pub(crate) mod test_support {
    use super::AppState;
    use crate::services::{CampaignService, StatsService};
    use axum::body::Body;
    use axum::http::{header, Method, Request};
    use axum::response::Response;
    use http_body_util::BodyExt;
    use sendwise_contacts::ListService;
    use sendwise_core::EncryptionService;
    use sendwise_database::test_utils::TestDatabase;
    use sendwise_email::dns::StaticTxtResolver;
    use sendwise_email::{DomainService, EmailProviderFactory, ProviderService};
    use std::sync::Arc;

    pub async fn test_state() -> (TestDatabase, Arc<AppState>) {
        let test_db = TestDatabase::with_migrations().await.unwrap();
        let db = test_db.db.clone();
        let encryption = Arc::new(
            EncryptionService::new(
                "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef",
            )
            .unwrap(),
        );
        let providers = Arc::new(ProviderService::with_factory(
            db.clone(),
            encryption,
            EmailProviderFactory::new(Arc::new(StaticTxtResolver::new())),
        ));
        let domains = Arc::new(DomainService::new(db.clone(), providers.clone()));
        let lists = Arc::new(ListService::new(db.clone()));

        let state = Arc::new(AppState {
            campaign_service: Arc::new(CampaignService::new(
                db.clone(),
                providers,
                domains,
                lists,
            )),
            stats_service: Arc::new(StatsService::new(db)),
        });
        (test_db, state)
    }

    pub fn request(method: Method, uri: &str, body: Option<serde_json::Value>) -> Request<Body> {
        let builder = Request::builder().method(method).uri(uri);
        match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    pub async fn json_body(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }
}
