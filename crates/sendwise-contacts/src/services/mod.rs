//! Services for contacts and contact lists

mod contact_service;
mod list_service;

pub use contact_service::{
    ContactFilter, ContactService, CreateContactRequest, ImportSummary, UpdateContactRequest,
    CONTACT_STATUSES,
};
pub use list_service::{CreateListRequest, ListService, ListWithCount, UpdateListRequest};
