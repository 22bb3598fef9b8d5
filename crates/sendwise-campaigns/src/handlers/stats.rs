use std::sync::Arc;

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use sendwise_core::problemdetails::Problem;

use super::types::AppState;
use crate::services::{CampaignSummary, ClientStats};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/client-campaigns", get(client_campaigns))
        .route("/client-stats", get(client_stats))
}

/// Campaign summaries for the dashboard, newest first
#[utoipa::path(
    tag = "Stats",
    get,
    path = "/client-campaigns",
    responses(
        (status = 200, description = "Campaign summaries", body = Vec<CampaignSummary>)
    )
)]
pub async fn client_campaigns(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, Problem> {
    let campaigns = state.stats_service.client_campaigns().await?;
    Ok(Json(campaigns))
}

/// Totals and rates across every campaign
#[utoipa::path(
    tag = "Stats",
    get,
    path = "/client-stats",
    responses(
        (status = 200, description = "Aggregated statistics", body = ClientStats)
    )
)]
pub async fn client_stats(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, Problem> {
    let stats = state.stats_service.client_stats().await?;
    Ok(Json(stats))
}
