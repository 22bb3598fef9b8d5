//! Email provider handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use sendwise_core::problemdetails::Problem;
use tracing::{error, info};

use super::types::{
    AppState, CreateEmailProviderRequest, EmailProviderResponse, ProviderTypeInfo,
    TestEmailRequestBody, TestEmailResponse,
};
use crate::providers::{ConfigurationCheck, EmailProviderType};
use crate::services::{CreateProviderRequest, TestEmailRequest};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/email-providers",
            post(create_provider).get(list_providers),
        )
        .route("/email-providers/types", get(list_provider_types))
        .route(
            "/email-providers/{id}",
            get(get_provider).delete(delete_provider),
        )
        .route("/email-providers/{id}/check", post(check_provider))
        .route("/email-providers/{id}/test", post(test_provider))
}

fn to_response(
    state: &AppState,
    provider: sendwise_entities::email_providers::Model,
) -> EmailProviderResponse {
    let config = state
        .provider_service
        .get_masked_config(&provider)
        .unwrap_or_else(|e| {
            error!("Failed to read config of provider {}: {}", provider.id, e);
            serde_json::json!({})
        });
    EmailProviderResponse::new(provider, config)
}

/// Create a new email provider
#[utoipa::path(
    tag = "Email Providers",
    post,
    path = "/email-providers",
    request_body = CreateEmailProviderRequest,
    responses(
        (status = 201, description = "Provider created successfully", body = EmailProviderResponse),
        (status = 400, description = "Unknown provider type or missing credential"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn create_provider(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateEmailProviderRequest>,
) -> Result<impl IntoResponse, Problem> {
    let provider_type = EmailProviderType::from_str(&request.provider_type)?;

    let provider = state
        .provider_service
        .create(CreateProviderRequest {
            name: request.name,
            provider_type,
            config: request.config,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(to_response(&state, provider))))
}

/// List all email providers
#[utoipa::path(
    tag = "Email Providers",
    get,
    path = "/email-providers",
    responses(
        (status = 200, description = "List of email providers", body = Vec<EmailProviderResponse>),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn list_providers(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, Problem> {
    let providers = state.provider_service.list().await?;

    let responses: Vec<EmailProviderResponse> = providers
        .into_iter()
        .map(|p| to_response(&state, p))
        .collect();

    Ok(Json(responses))
}

/// Requirements and features of every supported provider type
#[utoipa::path(
    tag = "Email Providers",
    get,
    path = "/email-providers/types",
    responses(
        (status = 200, description = "Supported provider types", body = Vec<ProviderTypeInfo>)
    )
)]
pub async fn list_provider_types() -> impl IntoResponse {
    let types: Vec<ProviderTypeInfo> = EmailProviderType::ALL
        .into_iter()
        .map(|provider_type| ProviderTypeInfo {
            provider_type,
            display_name: provider_type.display_name().to_string(),
            requirements: provider_type.authentication_requirements(),
            features: provider_type.supported_features(),
        })
        .collect();

    Json(types)
}

/// Get an email provider by ID
#[utoipa::path(
    tag = "Email Providers",
    get,
    path = "/email-providers/{id}",
    params(("id" = i32, Path, description = "Provider ID")),
    responses(
        (status = 200, description = "Email provider details", body = EmailProviderResponse),
        (status = 404, description = "Provider not found")
    )
)]
pub async fn get_provider(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, Problem> {
    let provider = state.provider_service.get(id).await?;
    Ok(Json(to_response(&state, provider)))
}

/// Delete an email provider
#[utoipa::path(
    tag = "Email Providers",
    delete,
    path = "/email-providers/{id}",
    params(("id" = i32, Path, description = "Provider ID")),
    responses(
        (status = 204, description = "Provider deleted"),
        (status = 404, description = "Provider not found")
    )
)]
pub async fn delete_provider(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, Problem> {
    state.provider_service.delete(id).await?;
    info!("Deleted email provider {}", id);
    Ok(StatusCode::NO_CONTENT)
}

/// Validate the stored credentials and probe the provider
#[utoipa::path(
    tag = "Email Providers",
    post,
    path = "/email-providers/{id}/check",
    params(("id" = i32, Path, description = "Provider ID")),
    responses(
        (status = 200, description = "Configuration check result", body = ConfigurationCheck),
        (status = 404, description = "Provider not found")
    )
)]
pub async fn check_provider(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, Problem> {
    let check = state.provider_service.check(id).await?;
    Ok(Json(check))
}

/// Send a test email through a provider
#[utoipa::path(
    tag = "Email Providers",
    post,
    path = "/email-providers/{id}/test",
    params(("id" = i32, Path, description = "Provider ID")),
    request_body = TestEmailRequestBody,
    responses(
        (status = 200, description = "Test email result", body = TestEmailResponse),
        (status = 404, description = "Provider not found")
    )
)]
pub async fn test_provider(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Json(request): Json<TestEmailRequestBody>,
) -> Result<impl IntoResponse, Problem> {
    let result = state
        .provider_service
        .send_test_email(
            id,
            TestEmailRequest {
                from: request.from,
                from_name: request.from_name,
                to: request.to,
            },
        )
        .await?;

    Ok(Json(TestEmailResponse {
        success: result.success,
        message_id: result.message_id,
        error: result.error,
    }))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{json_body, request, test_state};
    use super::*;
    use axum::http::Method;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_create_and_list_providers() {
        let (_db, state) = test_state().await;
        let app = routes().with_state(state);

        let response = app
            .clone()
            .oneshot(request(
                Method::POST,
                "/email-providers",
                Some(serde_json::json!({
                    "name": "Newsletter",
                    "provider_type": "mailgun",
                    "config": {"apiKey": "key-0123456789abcdef", "domain": "mg.example.com"}
                })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = json_body(response).await;
        assert_eq!(created["display_name"], "Mailgun");
        assert_eq!(created["config"]["api_key"], "***");
        assert_eq!(created["config"]["domain"], "mg.example.com");

        let response = app
            .oneshot(request(Method::GET, "/email-providers", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let list = json_body(response).await;
        assert_eq!(list.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_with_missing_credential_is_bad_request() {
        let (_db, state) = test_state().await;
        let app = routes().with_state(state);

        let response = app
            .oneshot(request(
                Method::POST,
                "/email-providers",
                Some(serde_json::json!({
                    "name": "Broken",
                    "provider_type": "sendgrid",
                    "config": {}
                })),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert!(body["detail"].as_str().unwrap().contains("api_key"));
    }

    #[tokio::test]
    async fn test_unknown_provider_is_not_found() {
        let (_db, state) = test_state().await;
        let app = routes().with_state(state);

        let response = app
            .oneshot(request(Method::DELETE, "/email-providers/77", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_list_provider_types() {
        let (_db, state) = test_state().await;
        let app = routes().with_state(state);

        let response = app
            .oneshot(request(Method::GET, "/email-providers/types", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let types = json_body(response).await;
        let types = types.as_array().unwrap();
        assert_eq!(types.len(), 6);
        assert_eq!(types[0]["provider_type"], "sendgrid");
        assert_eq!(types[0]["requirements"]["spf_include"], "include:sendgrid.net");
    }
}
