//! Handler types for contacts and lists

use crate::errors::{ContactError, ImportError};
use crate::services::{ContactService, ListService, ListWithCount};
use sendwise_core::error_builder::{bad_request, conflict, internal_server_error, not_found};
use sendwise_core::problemdetails::Problem;
use sendwise_entities::contacts;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::{IntoParams, ToSchema};

pub struct AppState {
    pub contact_service: Arc<ContactService>,
    pub list_service: Arc<ListService>,
}

impl From<ContactError> for Problem {
    fn from(err: ContactError) -> Self {
        match err {
            ContactError::NotFound(id) => {
                not_found().detail(format!("Contact {} not found", id)).build()
            }
            ContactError::ListNotFound(id) => not_found()
                .detail(format!("Contact list {} not found", id))
                .build(),
            e @ ContactError::NotMember { .. } => not_found().detail(e.to_string()).build(),
            ContactError::Conflict(msg) => conflict().detail(msg).build(),
            e @ (ContactError::Validation(_) | ContactError::Import(_)) => {
                bad_request().detail(e.to_string()).build()
            }
            ContactError::Database(e) => {
                error!("Contacts database error: {}", e);
                internal_server_error().detail(e.to_string()).build()
            }
        }
    }
}

impl From<ImportError> for Problem {
    fn from(err: ImportError) -> Self {
        ContactError::Import(err).into()
    }
}

// ========================================
// Contact Types
// ========================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateContactBody {
    #[schema(example = "jane@example.com")]
    pub email: String,
    #[schema(example = "Jane Doe")]
    pub name: Option<String>,
    /// subscribed (default), unsubscribed or bounced
    pub status: Option<String>,
}

/// Omitted fields are left unchanged; an empty name clears it
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateContactBody {
    pub email: Option<String>,
    pub name: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ContactListQuery {
    /// Substring of the email or name
    pub search: Option<String>,
    pub list_id: Option<i32>,
    pub status: Option<String>,
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ContactResponse {
    pub id: i32,
    #[schema(example = "jane@example.com")]
    pub email: String,
    pub name: Option<String>,
    #[schema(example = "subscribed")]
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<contacts::Model> for ContactResponse {
    fn from(contact: contacts::Model) -> Self {
        Self {
            id: contact.id,
            email: contact.email,
            name: contact.name,
            status: contact.status,
            created_at: contact.created_at.to_rfc3339(),
            updated_at: contact.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ContactPageResponse {
    pub contacts: Vec<ContactResponse>,
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ContentEncoding {
    #[default]
    Text,
    Base64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ImportContactsBody {
    /// txt, csv, json or xlsx; derived from `file_name` when omitted
    #[schema(example = "csv")]
    pub format: Option<String>,
    #[schema(example = "contacts.csv")]
    pub file_name: Option<String>,
    /// File content, as text or base64 (required for xlsx)
    pub content: String,
    #[serde(default)]
    pub encoding: ContentEncoding,
    /// Add every imported contact to this list
    pub list_id: Option<i32>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ExportQuery {
    /// txt, csv (default) or json
    pub format: Option<String>,
    pub list_id: Option<i32>,
}

// ========================================
// List Types
// ========================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateListBody {
    #[schema(example = "Weekly newsletter")]
    pub name: String,
    pub description: Option<String>,
}

/// Omitted fields are left unchanged; an empty description clears it
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateListBody {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ListResponse {
    pub id: i32,
    #[schema(example = "Weekly newsletter")]
    pub name: String,
    pub description: Option<String>,
    pub member_count: u64,
    pub created_at: String,
    pub updated_at: String,
}

impl From<ListWithCount> for ListResponse {
    fn from(item: ListWithCount) -> Self {
        Self {
            id: item.list.id,
            name: item.list.name,
            description: item.list.description,
            member_count: item.member_count,
            created_at: item.list.created_at.to_rfc3339(),
            updated_at: item.list.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddContactsBody {
    pub contact_ids: Vec<i32>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AddContactsResponse {
    /// Contacts that were not already members
    pub added: u64,
}
