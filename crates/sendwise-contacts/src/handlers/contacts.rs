//! Contact handlers, including file import and export

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use sendwise_core::error_builder::bad_request;
use sendwise_core::problemdetails::Problem;
use sendwise_core::PaginationParams;

use super::types::{
    AppState, ContactListQuery, ContactPageResponse, ContactResponse, ContentEncoding,
    CreateContactBody, ExportQuery, ImportContactsBody, UpdateContactBody,
};
use crate::import::ImportFormat;
use crate::services::{ContactFilter, CreateContactRequest, ImportSummary, UpdateContactRequest};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/contacts", post(create_contact).get(list_contacts))
        .route("/contacts/import", post(import_contacts))
        .route("/contacts/export", get(export_contacts))
        .route(
            "/contacts/{id}",
            get(get_contact).put(update_contact).delete(delete_contact),
        )
}

#[utoipa::path(
    tag = "Contacts",
    post,
    path = "/contacts",
    request_body = CreateContactBody,
    responses(
        (status = 201, description = "Contact created", body = ContactResponse),
        (status = 400, description = "Invalid email or status"),
        (status = 409, description = "Email already exists")
    )
)]
pub async fn create_contact(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateContactBody>,
) -> Result<impl IntoResponse, Problem> {
    let contact = state
        .contact_service
        .create(CreateContactRequest {
            email: body.email,
            name: body.name,
            status: body.status,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(ContactResponse::from(contact))))
}

/// List contacts, ordered by email
#[utoipa::path(
    tag = "Contacts",
    get,
    path = "/contacts",
    params(ContactListQuery),
    responses(
        (status = 200, description = "One page of contacts", body = ContactPageResponse),
        (status = 404, description = "List not found")
    )
)]
pub async fn list_contacts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ContactListQuery>,
) -> Result<impl IntoResponse, Problem> {
    let pagination = PaginationParams {
        page: query.page,
        page_size: query.page_size,
    };
    let (page, page_size) = pagination.normalize();
    let filter = ContactFilter {
        search: query.search,
        list_id: query.list_id,
        status: query.status,
    };

    let (contacts, total) = state.contact_service.list(&filter, &pagination).await?;

    Ok(Json(ContactPageResponse {
        contacts: contacts.into_iter().map(ContactResponse::from).collect(),
        total,
        page,
        page_size,
    }))
}

#[utoipa::path(
    tag = "Contacts",
    get,
    path = "/contacts/{id}",
    params(("id" = i32, Path, description = "Contact ID")),
    responses(
        (status = 200, description = "Contact details", body = ContactResponse),
        (status = 404, description = "Contact not found")
    )
)]
pub async fn get_contact(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, Problem> {
    let contact = state.contact_service.get(id).await?;
    Ok(Json(ContactResponse::from(contact)))
}

#[utoipa::path(
    tag = "Contacts",
    put,
    path = "/contacts/{id}",
    params(("id" = i32, Path, description = "Contact ID")),
    request_body = UpdateContactBody,
    responses(
        (status = 200, description = "Contact updated", body = ContactResponse),
        (status = 400, description = "Invalid email or status"),
        (status = 404, description = "Contact not found"),
        (status = 409, description = "Email already exists")
    )
)]
pub async fn update_contact(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Json(body): Json<UpdateContactBody>,
) -> Result<impl IntoResponse, Problem> {
    let contact = state
        .contact_service
        .update(
            id,
            UpdateContactRequest {
                email: body.email,
                name: body.name,
                status: body.status,
            },
        )
        .await?;

    Ok(Json(ContactResponse::from(contact)))
}

#[utoipa::path(
    tag = "Contacts",
    delete,
    path = "/contacts/{id}",
    params(("id" = i32, Path, description = "Contact ID")),
    responses(
        (status = 204, description = "Contact deleted"),
        (status = 404, description = "Contact not found")
    )
)]
pub async fn delete_contact(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, Problem> {
    state.contact_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Import contacts from a TXT, CSV, JSON or XLSX file
#[utoipa::path(
    tag = "Contacts",
    post,
    path = "/contacts/import",
    request_body = ImportContactsBody,
    responses(
        (status = 200, description = "Import summary", body = ImportSummary),
        (status = 400, description = "Unsupported or malformed file"),
        (status = 404, description = "List not found")
    )
)]
pub async fn import_contacts(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ImportContactsBody>,
) -> Result<impl IntoResponse, Problem> {
    let format = match (body.format.as_deref(), body.file_name.as_deref()) {
        (Some(format), _) => ImportFormat::parse(format)?,
        (None, Some(file_name)) => ImportFormat::from_file_name(file_name)?,
        (None, None) => {
            return Err(bad_request()
                .detail("Either format or file_name is required")
                .build())
        }
    };

    let data = match body.encoding {
        ContentEncoding::Text => body.content.into_bytes(),
        ContentEncoding::Base64 => STANDARD.decode(body.content.trim()).map_err(|e| {
            bad_request()
                .detail(format!("Content is not valid base64: {}", e))
                .build()
        })?,
    };

    let summary = state
        .contact_service
        .import(format, &data, body.list_id)
        .await?;

    Ok(Json(summary))
}

/// Download contacts as a file
#[utoipa::path(
    tag = "Contacts",
    get,
    path = "/contacts/export",
    params(ExportQuery),
    responses(
        (status = 200, description = "Exported file", body = String, content_type = "text/csv"),
        (status = 400, description = "Unsupported format"),
        (status = 404, description = "List not found")
    )
)]
pub async fn export_contacts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ExportQuery>,
) -> Result<impl IntoResponse, Problem> {
    let format = match query.format.as_deref() {
        Some(format) => ImportFormat::parse(format)?,
        None => ImportFormat::Csv,
    };

    let bytes = state.contact_service.export(format, query.list_id).await?;
    let disposition = format!("attachment; filename=\"contacts.{}\"", format.extension());

    Ok((
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    ))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{json_body, request, test_state};
    use super::*;
    use axum::http::Method;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_contact_crud() {
        let (_db, state) = test_state().await;
        let app = routes().with_state(state);

        let response = app
            .clone()
            .oneshot(request(
                Method::POST,
                "/contacts",
                Some(serde_json::json!({"email": "Jane@Example.com", "name": "Jane"})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = json_body(response).await;
        assert_eq!(created["email"], "jane@example.com");
        let id = created["id"].as_i64().unwrap();

        let response = app
            .clone()
            .oneshot(request(
                Method::PUT,
                &format!("/contacts/{}", id),
                Some(serde_json::json!({"status": "unsubscribed"})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "unsubscribed");

        let response = app
            .clone()
            .oneshot(request(Method::GET, "/contacts?search=jane&page_size=5", None))
            .await
            .unwrap();
        let page = json_body(response).await;
        assert_eq!(page["total"], 1);
        assert_eq!(page["page_size"], 5);

        let response = app
            .clone()
            .oneshot(request(Method::DELETE, &format!("/contacts/{}", id), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .oneshot(request(Method::GET, &format!("/contacts/{}", id), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_import_text_then_export_csv() {
        let (_db, state) = test_state().await;
        let app = routes().with_state(state);

        let response = app
            .clone()
            .oneshot(request(
                Method::POST,
                "/contacts/import",
                Some(serde_json::json!({
                    "format": "csv",
                    "content": "email,name\nb@example.com,Bee\nnope\na@example.com,\n"
                })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let summary = json_body(response).await;
        assert_eq!(summary["imported"], 2);
        assert_eq!(summary["skipped"], 1);
        assert_eq!(summary["skipped_rows"][0]["row"], 3);

        let response = app
            .oneshot(request(Method::GET, "/contacts/export?format=csv", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"contacts.csv\""
        );
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"email,name\na@example.com,\nb@example.com,Bee\n");
    }

    #[tokio::test]
    async fn test_import_base64_xlsx() {
        let (_db, state) = test_state().await;
        let app = routes().with_state(state);
        let sheet = r#"<row r="1"><c r="A1" t="inlineStr"><is><t>Email</t></is></c></row>
<row r="2"><c r="A2" t="inlineStr"><is><t>x@example.com</t></is></c></row>"#;
        let xlsx = crate::import::tests::build_xlsx(sheet, &[]);

        let response = app
            .oneshot(request(
                Method::POST,
                "/contacts/import",
                Some(serde_json::json!({
                    "file_name": "people.xlsx",
                    "content": STANDARD.encode(xlsx),
                    "encoding": "base64"
                })),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["imported"], 1);
    }

    #[tokio::test]
    async fn test_import_rejects_bad_input() {
        let (_db, state) = test_state().await;
        let app = routes().with_state(state);

        for body in [
            serde_json::json!({"format": "pdf", "content": "x"}),
            serde_json::json!({"content": "a@example.com"}),
            serde_json::json!({"format": "xlsx", "content": "%%%", "encoding": "base64"}),
            serde_json::json!({"format": "json", "content": "{}"}),
        ] {
            let response = app
                .clone()
                .oneshot(request(Method::POST, "/contacts/import", Some(body)))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }
    }

    #[tokio::test]
    async fn test_export_xlsx_is_bad_request() {
        let (_db, state) = test_state().await;
        let app = routes().with_state(state);

        let response = app
            .oneshot(request(Method::GET, "/contacts/export?format=xlsx", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
