//! Domain handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use sendwise_core::problemdetails::Problem;

use super::types::{
    AppState, CreateDomainBody, DnsRecordsResponse, DomainResponse, UpdateDomainBody,
};
use crate::services::{CreateDomainRequest, UpdateDomainRequest};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/domains", post(create_domain).get(list_domains))
        .route(
            "/domains/{id}",
            get(get_domain).put(update_domain).delete(delete_domain),
        )
        .route("/domains/{id}/verify", post(verify_domain))
        .route("/domains/{id}/set-default", post(set_default_domain))
        .route("/domains/{id}/dns-records", get(get_dns_records))
}

/// Add a sending domain
#[utoipa::path(
    tag = "Domains",
    post,
    path = "/domains",
    request_body = CreateDomainBody,
    responses(
        (status = 201, description = "Domain created", body = DomainResponse),
        (status = 400, description = "Invalid domain name"),
        (status = 404, description = "Linked provider not found"),
        (status = 409, description = "Domain already exists")
    )
)]
pub async fn create_domain(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateDomainBody>,
) -> Result<impl IntoResponse, Problem> {
    let domain = state
        .domain_service
        .create(CreateDomainRequest {
            name: body.name,
            provider_id: body.provider_id,
            dkim_selector: body.dkim_selector,
            dkim_value: body.dkim_value,
            spf_value: body.spf_value,
            dmarc_value: body.dmarc_value,
            metadata: body.metadata,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(DomainResponse::from(domain))))
}

/// List sending domains, default first
#[utoipa::path(
    tag = "Domains",
    get,
    path = "/domains",
    responses(
        (status = 200, description = "List of domains", body = Vec<DomainResponse>)
    )
)]
pub async fn list_domains(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, Problem> {
    let domains = state.domain_service.list().await?;
    let responses: Vec<DomainResponse> = domains.into_iter().map(DomainResponse::from).collect();
    Ok(Json(responses))
}

#[utoipa::path(
    tag = "Domains",
    get,
    path = "/domains/{id}",
    params(("id" = i32, Path, description = "Domain ID")),
    responses(
        (status = 200, description = "Domain details", body = DomainResponse),
        (status = 404, description = "Domain not found")
    )
)]
pub async fn get_domain(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, Problem> {
    let domain = state.domain_service.get(id).await?;
    Ok(Json(DomainResponse::from(domain)))
}

#[utoipa::path(
    tag = "Domains",
    put,
    path = "/domains/{id}",
    params(("id" = i32, Path, description = "Domain ID")),
    request_body = UpdateDomainBody,
    responses(
        (status = 200, description = "Domain updated", body = DomainResponse),
        (status = 404, description = "Domain or provider not found")
    )
)]
pub async fn update_domain(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Json(body): Json<UpdateDomainBody>,
) -> Result<impl IntoResponse, Problem> {
    let domain = state
        .domain_service
        .update(
            id,
            UpdateDomainRequest {
                provider_id: body.provider_id,
                dkim_selector: body.dkim_selector,
                dkim_value: body.dkim_value,
                spf_value: body.spf_value,
                dmarc_value: body.dmarc_value,
                metadata: body.metadata,
            },
        )
        .await?;

    Ok(Json(DomainResponse::from(domain)))
}

#[utoipa::path(
    tag = "Domains",
    delete,
    path = "/domains/{id}",
    params(("id" = i32, Path, description = "Domain ID")),
    responses(
        (status = 204, description = "Domain deleted"),
        (status = 404, description = "Domain not found")
    )
)]
pub async fn delete_domain(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, Problem> {
    state.domain_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Check the domain's DKIM, SPF and DMARC records over DNS
#[utoipa::path(
    tag = "Domains",
    post,
    path = "/domains/{id}/verify",
    params(("id" = i32, Path, description = "Domain ID")),
    responses(
        (status = 200, description = "Domain with updated verification state", body = DomainResponse),
        (status = 404, description = "Domain not found")
    )
)]
pub async fn verify_domain(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, Problem> {
    let domain = state.domain_service.verify(id).await?;
    Ok(Json(DomainResponse::from(domain)))
}

#[utoipa::path(
    tag = "Domains",
    post,
    path = "/domains/{id}/set-default",
    params(("id" = i32, Path, description = "Domain ID")),
    responses(
        (status = 200, description = "Domain is now the default", body = DomainResponse),
        (status = 404, description = "Domain not found")
    )
)]
pub async fn set_default_domain(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, Problem> {
    let domain = state.domain_service.set_default(id).await?;
    Ok(Json(DomainResponse::from(domain)))
}

/// Records to publish for the domain
#[utoipa::path(
    tag = "Domains",
    get,
    path = "/domains/{id}/dns-records",
    params(("id" = i32, Path, description = "Domain ID")),
    responses(
        (status = 200, description = "DNS records", body = DnsRecordsResponse),
        (status = 404, description = "Domain not found")
    )
)]
pub async fn get_dns_records(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, Problem> {
    let domain = state.domain_service.get(id).await?;
    let records = state.domain_service.dns_records(id).await?;
    Ok(Json(DnsRecordsResponse {
        domain: domain.name,
        records,
    }))
}
