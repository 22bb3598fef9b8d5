//! HTTP handlers for contacts and contact lists

mod contacts;
mod lists;
mod types;

pub use types::AppState;

use axum::Router;
use std::sync::Arc;
use utoipa::OpenApi;

pub fn configure_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(contacts::routes())
        .merge(lists::routes())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        contacts::create_contact,
        contacts::list_contacts,
        contacts::get_contact,
        contacts::update_contact,
        contacts::delete_contact,
        contacts::import_contacts,
        contacts::export_contacts,
        lists::create_list,
        lists::list_lists,
        lists::get_list,
        lists::update_list,
        lists::delete_list,
        lists::list_members,
        lists::add_members,
        lists::remove_member,
    ),
    components(
        schemas(
            types::CreateContactBody,
            types::UpdateContactBody,
            types::ContactResponse,
            types::ContactPageResponse,
            types::ContentEncoding,
            types::ImportContactsBody,
            types::CreateListBody,
            types::UpdateListBody,
            types::ListResponse,
            types::AddContactsBody,
            types::AddContactsResponse,
            crate::services::ImportSummary,
            crate::import::SkippedRow,
            crate::import::ImportFormat,
        )
    ),
    tags(
        (name = "Contacts", description = "Contacts and contact file import/export"),
        (name = "Lists", description = "Contact lists and memberships")
    )
)]
pub struct ContactsApiDoc;


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_contact_paths() {
        let doc = ContactsApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/contacts/import"));
        assert!(doc.paths.paths.contains_key("/lists/{id}/contacts/{contact_id}"));
    }
}
