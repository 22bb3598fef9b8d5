//! Contact list handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use sendwise_core::problemdetails::Problem;

use super::types::{
    AddContactsBody, AddContactsResponse, AppState, ContactResponse, CreateListBody,
    ListResponse, UpdateListBody,
};
use crate::services::{CreateListRequest, ListWithCount, UpdateListRequest};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/lists", post(create_list).get(list_lists))
        .route(
            "/lists/{id}",
            get(get_list).put(update_list).delete(delete_list),
        )
        .route(
            "/lists/{id}/contacts",
            get(list_members).post(add_members),
        )
        .route("/lists/{id}/contacts/{contact_id}", delete(remove_member))
}

async fn with_count(
    state: &AppState,
    list: sendwise_entities::contact_lists::Model,
) -> Result<ListResponse, Problem> {
    let member_count = state.list_service.member_count(list.id).await?;
    Ok(ListResponse::from(ListWithCount { list, member_count }))
}

#[utoipa::path(
    tag = "Lists",
    post,
    path = "/lists",
    request_body = CreateListBody,
    responses(
        (status = 201, description = "List created", body = ListResponse),
        (status = 400, description = "Missing name")
    )
)]
pub async fn create_list(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateListBody>,
) -> Result<impl IntoResponse, Problem> {
    let list = state
        .list_service
        .create(CreateListRequest {
            name: body.name,
            description: body.description,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ListResponse::from(ListWithCount {
            list,
            member_count: 0,
        })),
    ))
}

/// All lists with their member counts
#[utoipa::path(
    tag = "Lists",
    get,
    path = "/lists",
    responses(
        (status = 200, description = "Contact lists", body = Vec<ListResponse>)
    )
)]
pub async fn list_lists(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, Problem> {
    let lists = state.list_service.list().await?;
    let responses: Vec<ListResponse> = lists.into_iter().map(ListResponse::from).collect();
    Ok(Json(responses))
}

#[utoipa::path(
    tag = "Lists",
    get,
    path = "/lists/{id}",
    params(("id" = i32, Path, description = "List ID")),
    responses(
        (status = 200, description = "List details", body = ListResponse),
        (status = 404, description = "List not found")
    )
)]
pub async fn get_list(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, Problem> {
    let list = state.list_service.get(id).await?;
    Ok(Json(with_count(&state, list).await?))
}

#[utoipa::path(
    tag = "Lists",
    put,
    path = "/lists/{id}",
    params(("id" = i32, Path, description = "List ID")),
    request_body = UpdateListBody,
    responses(
        (status = 200, description = "List updated", body = ListResponse),
        (status = 404, description = "List not found")
    )
)]
pub async fn update_list(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Json(body): Json<UpdateListBody>,
) -> Result<impl IntoResponse, Problem> {
    let list = state
        .list_service
        .update(
            id,
            UpdateListRequest {
                name: body.name,
                description: body.description,
            },
        )
        .await?;

    Ok(Json(with_count(&state, list).await?))
}

/// Delete a list. Its contacts are kept.
#[utoipa::path(
    tag = "Lists",
    delete,
    path = "/lists/{id}",
    params(("id" = i32, Path, description = "List ID")),
    responses(
        (status = 204, description = "List deleted"),
        (status = 404, description = "List not found")
    )
)]
pub async fn delete_list(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, Problem> {
    state.list_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    tag = "Lists",
    get,
    path = "/lists/{id}/contacts",
    params(("id" = i32, Path, description = "List ID")),
    responses(
        (status = 200, description = "List members", body = Vec<ContactResponse>),
        (status = 404, description = "List not found")
    )
)]
pub async fn list_members(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, Problem> {
    let members = state.list_service.members(id).await?;
    let responses: Vec<ContactResponse> = members.into_iter().map(ContactResponse::from).collect();
    Ok(Json(responses))
}

#[utoipa::path(
    tag = "Lists",
    post,
    path = "/lists/{id}/contacts",
    params(("id" = i32, Path, description = "List ID")),
    request_body = AddContactsBody,
    responses(
        (status = 200, description = "Contacts added", body = AddContactsResponse),
        (status = 404, description = "List or contact not found")
    )
)]
pub async fn add_members(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Json(body): Json<AddContactsBody>,
) -> Result<impl IntoResponse, Problem> {
    let added = state.list_service.add_contacts(id, &body.contact_ids).await?;
    Ok(Json(AddContactsResponse { added }))
}

#[utoipa::path(
    tag = "Lists",
    delete,
    path = "/lists/{id}/contacts/{contact_id}",
    params(
        ("id" = i32, Path, description = "List ID"),
        ("contact_id" = i32, Path, description = "Contact ID")
    ),
    responses(
        (status = 204, description = "Contact removed from the list"),
        (status = 404, description = "List not found or contact not a member")
    )
)]
pub async fn remove_member(
    State(state): State<Arc<AppState>>,
    Path((id, contact_id)): Path<(i32, i32)>,
) -> Result<impl IntoResponse, Problem> {
    state.list_service.remove_contact(id, contact_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
