//! Campaign handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use sendwise_core::problemdetails::Problem;

use super::types::{
    AppState, CampaignListQuery, CampaignResponse, CreateCampaignBody, ReorderBlockBody,
    ScheduleBody, UpdateBlocksBody, UpdateCampaignBody,
};
use crate::blocks::render_html;
use crate::services::{CampaignService, CampaignStatus, CreateCampaignRequest, UpdateCampaignRequest};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/campaigns", post(create_campaign).get(list_campaigns))
        .route(
            "/campaigns/{id}",
            get(get_campaign).put(update_campaign).delete(delete_campaign),
        )
        .route("/campaigns/{id}/blocks", put(update_blocks))
        .route("/campaigns/{id}/blocks/reorder", post(reorder_block))
        .route("/campaigns/{id}/preview", get(preview_campaign))
        .route("/campaigns/{id}/schedule", post(schedule_campaign))
        .route("/campaigns/{id}/send", post(send_campaign))
}

#[utoipa::path(
    tag = "Campaigns",
    post,
    path = "/campaigns",
    request_body = CreateCampaignBody,
    responses(
        (status = 201, description = "Draft campaign created", body = CampaignResponse),
        (status = 400, description = "Invalid campaign"),
        (status = 404, description = "Referenced domain, provider or list not found")
    )
)]
pub async fn create_campaign(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateCampaignBody>,
) -> Result<impl IntoResponse, Problem> {
    let campaign = state
        .campaign_service
        .create(CreateCampaignRequest {
            name: body.name,
            subject: body.subject,
            from_name: body.from_name,
            from_email: body.from_email,
            reply_to: body.reply_to,
            domain_id: body.domain_id,
            provider_id: body.provider_id,
            list_id: body.list_id,
            blocks: body.blocks,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(CampaignResponse::from(campaign))))
}

/// List campaigns, newest first
#[utoipa::path(
    tag = "Campaigns",
    get,
    path = "/campaigns",
    params(CampaignListQuery),
    responses(
        (status = 200, description = "Campaigns", body = Vec<CampaignResponse>),
        (status = 400, description = "Unknown status")
    )
)]
pub async fn list_campaigns(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CampaignListQuery>,
) -> Result<impl IntoResponse, Problem> {
    let status = query
        .status
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(CampaignStatus::parse)
        .transpose()?;

    let campaigns = state.campaign_service.list(status).await?;
    let responses: Vec<CampaignResponse> =
        campaigns.into_iter().map(CampaignResponse::from).collect();
    Ok(Json(responses))
}

#[utoipa::path(
    tag = "Campaigns",
    get,
    path = "/campaigns/{id}",
    params(("id" = i32, Path, description = "Campaign ID")),
    responses(
        (status = 200, description = "Campaign details", body = CampaignResponse),
        (status = 404, description = "Campaign not found")
    )
)]
pub async fn get_campaign(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, Problem> {
    let campaign = state.campaign_service.get(id).await?;
    Ok(Json(CampaignResponse::from(campaign)))
}

#[utoipa::path(
    tag = "Campaigns",
    put,
    path = "/campaigns/{id}",
    params(("id" = i32, Path, description = "Campaign ID")),
    request_body = UpdateCampaignBody,
    responses(
        (status = 200, description = "Campaign updated", body = CampaignResponse),
        (status = 404, description = "Campaign not found"),
        (status = 409, description = "Campaign is no longer editable")
    )
)]
pub async fn update_campaign(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Json(body): Json<UpdateCampaignBody>,
) -> Result<impl IntoResponse, Problem> {
    let campaign = state
        .campaign_service
        .update(
            id,
            UpdateCampaignRequest {
                name: body.name,
                subject: body.subject,
                from_name: body.from_name,
                from_email: body.from_email,
                reply_to: body.reply_to,
                domain_id: body.domain_id,
                provider_id: body.provider_id,
                list_id: body.list_id,
            },
        )
        .await?;

    Ok(Json(CampaignResponse::from(campaign)))
}

#[utoipa::path(
    tag = "Campaigns",
    delete,
    path = "/campaigns/{id}",
    params(("id" = i32, Path, description = "Campaign ID")),
    responses(
        (status = 204, description = "Campaign deleted"),
        (status = 404, description = "Campaign not found"),
        (status = 409, description = "Campaign is being sent")
    )
)]
pub async fn delete_campaign(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, Problem> {
    state.campaign_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Replace the template blocks
#[utoipa::path(
    tag = "Campaigns",
    put,
    path = "/campaigns/{id}/blocks",
    params(("id" = i32, Path, description = "Campaign ID")),
    request_body = UpdateBlocksBody,
    responses(
        (status = 200, description = "Blocks saved", body = CampaignResponse),
        (status = 400, description = "Duplicate or empty block id"),
        (status = 409, description = "Campaign is no longer editable")
    )
)]
pub async fn update_blocks(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Json(body): Json<UpdateBlocksBody>,
) -> Result<impl IntoResponse, Problem> {
    let campaign = state.campaign_service.update_blocks(id, body.blocks).await?;
    Ok(Json(CampaignResponse::from(campaign)))
}

/// Move one block to a new position
#[utoipa::path(
    tag = "Campaigns",
    post,
    path = "/campaigns/{id}/blocks/reorder",
    params(("id" = i32, Path, description = "Campaign ID")),
    request_body = ReorderBlockBody,
    responses(
        (status = 200, description = "Blocks reordered", body = CampaignResponse),
        (status = 400, description = "Index out of range"),
        (status = 409, description = "Campaign is no longer editable")
    )
)]
pub async fn reorder_block(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Json(body): Json<ReorderBlockBody>,
) -> Result<impl IntoResponse, Problem> {
    let campaign = state
        .campaign_service
        .reorder_block(id, body.from, body.to)
        .await?;
    Ok(Json(CampaignResponse::from(campaign)))
}

/// The rendered email body
#[utoipa::path(
    tag = "Campaigns",
    get,
    path = "/campaigns/{id}/preview",
    params(("id" = i32, Path, description = "Campaign ID")),
    responses(
        (status = 200, description = "Rendered HTML", body = String, content_type = "text/html"),
        (status = 404, description = "Campaign not found")
    )
)]
pub async fn preview_campaign(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, Problem> {
    let campaign = state.campaign_service.get(id).await?;
    let blocks = CampaignService::blocks(&campaign)?;
    Ok((
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        render_html(&blocks),
    ))
}

#[utoipa::path(
    tag = "Campaigns",
    post,
    path = "/campaigns/{id}/schedule",
    params(("id" = i32, Path, description = "Campaign ID")),
    request_body = ScheduleBody,
    responses(
        (status = 200, description = "Campaign scheduled", body = CampaignResponse),
        (status = 400, description = "Time is in the past"),
        (status = 409, description = "Campaign is no longer editable")
    )
)]
pub async fn schedule_campaign(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Json(body): Json<ScheduleBody>,
) -> Result<impl IntoResponse, Problem> {
    let campaign = state
        .campaign_service
        .schedule(id, body.scheduled_at)
        .await?;
    Ok(Json(CampaignResponse::from(campaign)))
}

/// Send the campaign to its list now
#[utoipa::path(
    tag = "Campaigns",
    post,
    path = "/campaigns/{id}/send",
    params(("id" = i32, Path, description = "Campaign ID")),
    responses(
        (status = 200, description = "Campaign sent; see delivered and failed counts", body = CampaignResponse),
        (status = 400, description = "Campaign has no list, content, recipients or provider"),
        (status = 404, description = "Campaign not found"),
        (status = 409, description = "Campaign was already sent")
    )
)]
pub async fn send_campaign(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, Problem> {
    let campaign = state.campaign_service.send(id).await?;
    Ok(Json(CampaignResponse::from(campaign)))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{json_body, request, test_state};
    use super::*;
    use axum::http::Method;
    use http_body_util::BodyExt;
    use serde_json::json;
    use tower::ServiceExt;

    fn new_campaign() -> serde_json::Value {
        json!({
            "name": "Launch",
            "subject": "We are live",
            "from_email": "hello@example.com",
            "blocks": [
                {"id": "a", "kind": "heading", "content": {"text": "A"}},
                {"id": "b", "kind": "text", "content": {"text": "B <3"}},
                {"id": "c", "kind": "divider"}
            ]
        })
    }

    #[tokio::test]
    async fn test_campaign_editing_flow() {
        let (_db, state) = test_state().await;
        let app = routes().with_state(state);

        let response = app
            .clone()
            .oneshot(request(Method::POST, "/campaigns", Some(new_campaign())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = json_body(response).await;
        assert_eq!(created["status"], "draft");
        let id = created["id"].as_i64().unwrap();

        let response = app
            .clone()
            .oneshot(request(
                Method::POST,
                &format!("/campaigns/{}/blocks/reorder", id),
                Some(json!({"from": 2, "to": 0})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let reordered = json_body(response).await;
        let ids: Vec<&str> = reordered["blocks"]
            .as_array()
            .unwrap()
            .iter()
            .map(|b| b["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["c", "a", "b"]);

        let response = app
            .clone()
            .oneshot(request(
                Method::POST,
                &format!("/campaigns/{}/blocks/reorder", id),
                Some(json!({"from": 7, "to": 0})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .clone()
            .oneshot(request(Method::GET, &format!("/campaigns/{}/preview", id), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let html = response.into_body().collect().await.unwrap().to_bytes();
        let html = String::from_utf8(html.to_vec()).unwrap();
        assert!(html.contains("B &lt;3"));

        let response = app
            .clone()
            .oneshot(request(
                Method::POST,
                &format!("/campaigns/{}/schedule", id),
                Some(json!({"scheduled_at": "2099-01-01T09:00:00Z"})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "scheduled");

        let response = app
            .oneshot(request(Method::GET, "/campaigns?status=scheduled", None))
            .await
            .unwrap();
        assert_eq!(json_body(response).await.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_send_without_list_is_bad_request() {
        let (_db, state) = test_state().await;
        let app = routes().with_state(state);

        let response = app
            .clone()
            .oneshot(request(Method::POST, "/campaigns", Some(new_campaign())))
            .await
            .unwrap();
        let id = json_body(response).await["id"].as_i64().unwrap();

        let response = app
            .oneshot(request(Method::POST, &format!("/campaigns/{}/send", id), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_missing_references() {
        let (_db, state) = test_state().await;
        let app = routes().with_state(state);

        let mut body = new_campaign();
        body["provider_id"] = json!(41);
        let response = app
            .clone()
            .oneshot(request(Method::POST, "/campaigns", Some(body)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .clone()
            .oneshot(request(Method::GET, "/campaigns/41", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .oneshot(request(Method::GET, "/campaigns?status=archived", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
