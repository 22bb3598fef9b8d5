//! Contact management, import and export

use sea_orm::{
    sea_query::{Expr, Func, LikeExpr},
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, DatabaseConnection, DbErr,
    EntityTrait, JoinType, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, RelationTrait,
    Select, SqlErr, TransactionTrait,
};
use sendwise_core::PaginationParams;
use sendwise_entities::{contact_list_members, contact_lists, contacts};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};
use utoipa::ToSchema;

use super::list_service::add_memberships;
use crate::errors::ContactError;
use crate::export::{export_contacts, ExportContact};
use crate::import::{normalize_email, parse_contacts, ImportFormat, SkippedRow};

pub const CONTACT_STATUSES: &[&str] = &["subscribed", "unsubscribed", "bounced"];
pub const DEFAULT_CONTACT_STATUS: &str = "subscribed";

fn conflict_on_duplicate(err: DbErr, email: &str) -> ContactError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => {
            ContactError::Conflict(format!("Contact {} already exists", email))
        }
        _ => err.into(),
    }
}

#[derive(Debug, Clone, Default)]
pub struct CreateContactRequest {
    pub email: String,
    pub name: Option<String>,
    pub status: Option<String>,
}

/// Omitted fields are left unchanged; an empty name clears it
#[derive(Debug, Clone, Default)]
pub struct UpdateContactRequest {
    pub email: Option<String>,
    pub name: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ContactFilter {
    /// Substring of the email or name
    pub search: Option<String>,
    pub list_id: Option<i32>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct ImportSummary {
    /// New contacts created
    pub imported: u64,
    /// Existing contacts matched by email
    pub updated: u64,
    pub skipped: u64,
    pub skipped_rows: Vec<SkippedRow>,
}

fn validate_status(status: &str) -> Result<String, ContactError> {
    let status = status.trim().to_lowercase();
    if CONTACT_STATUSES.contains(&status.as_str()) {
        Ok(status)
    } else {
        Err(ContactError::Validation(format!(
            "Invalid status '{}'. Expected one of: {}",
            status,
            CONTACT_STATUSES.join(", ")
        )))
    }
}

/// Escapes LIKE wildcards so they match literally
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn clean_name(name: Option<String>) -> Option<String> {
    name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty())
}

#[derive(Clone)]
pub struct ContactService {
    db: Arc<DatabaseConnection>,
}

impl ContactService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    fn filtered(filter: &ContactFilter) -> Select<contacts::Entity> {
        let mut query = contacts::Entity::find();

        if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let pattern = format!("%{}%", escape_like(&search.to_lowercase()));
            let contains_term = |column: contacts::Column| {
                Expr::expr(Func::lower(Expr::col((contacts::Entity, column))))
                    .like(LikeExpr::new(pattern.clone()).escape('\\'))
            };
            query = query.filter(
                Condition::any()
                    .add(contains_term(contacts::Column::Email))
                    .add(contains_term(contacts::Column::Name)),
            );
        }
        if let Some(status) = filter.status.as_deref().filter(|s| !s.is_empty()) {
            query = query.filter(contacts::Column::Status.eq(status.to_lowercase()));
        }
        if let Some(list_id) = filter.list_id {
            query = query
                .join(JoinType::InnerJoin, contacts::Relation::Memberships.def())
                .filter(contact_list_members::Column::ListId.eq(list_id));
        }

        query.order_by_asc(contacts::Column::Email)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<contacts::Model>, ContactError> {
        Ok(contacts::Entity::find()
            .filter(contacts::Column::Email.eq(email))
            .one(self.db.as_ref())
            .await?)
    }

    async fn ensure_list(&self, list_id: i32) -> Result<(), ContactError> {
        contact_lists::Entity::find_by_id(list_id)
            .one(self.db.as_ref())
            .await?
            .map(|_| ())
            .ok_or(ContactError::ListNotFound(list_id))
    }

    pub async fn create(
        &self,
        request: CreateContactRequest,
    ) -> Result<contacts::Model, ContactError> {
        let email = normalize_email(&request.email).ok_or_else(|| {
            ContactError::Validation(format!("Invalid email address: {}", request.email.trim()))
        })?;
        let status = match request.status.as_deref() {
            Some(status) => validate_status(status)?,
            None => DEFAULT_CONTACT_STATUS.to_string(),
        };

        if self.find_by_email(&email).await?.is_some() {
            return Err(ContactError::Conflict(format!(
                "Contact {} already exists",
                email
            )));
        }

        let contact = contacts::ActiveModel {
            email: Set(email.clone()),
            name: Set(clean_name(request.name)),
            status: Set(status),
            ..Default::default()
        }
        .insert(self.db.as_ref())
        .await
        .map_err(|e| conflict_on_duplicate(e, &email))?;

        debug!("Created contact {} ({})", contact.email, contact.id);
        Ok(contact)
    }

    pub async fn get(&self, id: i32) -> Result<contacts::Model, ContactError> {
        contacts::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .ok_or(ContactError::NotFound(id))
    }

    /// One page of contacts ordered by email, plus the total matching the filter
    pub async fn list(
        &self,
        filter: &ContactFilter,
        pagination: &PaginationParams,
    ) -> Result<(Vec<contacts::Model>, u64), ContactError> {
        if let Some(list_id) = filter.list_id {
            self.ensure_list(list_id).await?;
        }

        let (page, page_size) = pagination.normalize();
        let paginator = Self::filtered(filter).paginate(self.db.as_ref(), page_size);
        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page - 1).await?;

        Ok((items, total))
    }

    pub async fn update(
        &self,
        id: i32,
        request: UpdateContactRequest,
    ) -> Result<contacts::Model, ContactError> {
        let contact = self.get(id).await?;
        let mut active_model: contacts::ActiveModel = contact.clone().into();
        let mut target_email = contact.email.clone();

        if let Some(email) = request.email {
            let email = normalize_email(&email).ok_or_else(|| {
                ContactError::Validation(format!("Invalid email address: {}", email.trim()))
            })?;
            if email != contact.email {
                if self.find_by_email(&email).await?.is_some() {
                    return Err(ContactError::Conflict(format!(
                        "Contact {} already exists",
                        email
                    )));
                }
                target_email = email.clone();
                active_model.email = Set(email);
            }
        }
        if let Some(name) = request.name {
            active_model.name = Set(clean_name(Some(name)));
        }
        if let Some(status) = request.status {
            active_model.status = Set(validate_status(&status)?);
        }

        active_model
            .update(self.db.as_ref())
            .await
            .map_err(|e| conflict_on_duplicate(e, &target_email))
    }

    /// Deletes the contact and its list memberships
    pub async fn delete(&self, id: i32) -> Result<(), ContactError> {
        let contact = self.get(id).await?;

        let txn = self.db.begin().await?;
        contact_list_members::Entity::delete_many()
            .filter(contact_list_members::Column::ContactId.eq(contact.id))
            .exec(&txn)
            .await?;
        contacts::Entity::delete_by_id(contact.id).exec(&txn).await?;
        txn.commit().await?;

        debug!("Deleted contact {}", contact.email);
        Ok(())
    }

    /// Parses the file, then upserts every contact by email.
    /// Existing contacts keep their status; a name in the file replaces theirs.
    pub async fn import(
        &self,
        format: ImportFormat,
        data: &[u8],
        list_id: Option<i32>,
    ) -> Result<ImportSummary, ContactError> {
        if let Some(list_id) = list_id {
            self.ensure_list(list_id).await?;
        }

        let report = parse_contacts(format, data)?;
        let mut summary = ImportSummary {
            skipped: report.skipped.len() as u64,
            skipped_rows: report.skipped,
            ..Default::default()
        };
        let mut contact_ids = Vec::with_capacity(report.contacts.len());

        let txn = self.db.begin().await?;
        for imported in report.contacts {
            let existing = contacts::Entity::find()
                .filter(contacts::Column::Email.eq(imported.email.as_str()))
                .one(&txn)
                .await?;

            let id = match existing {
                Some(existing) => {
                    summary.updated += 1;
                    if imported.name.is_some() && imported.name != existing.name {
                        let mut active_model: contacts::ActiveModel = existing.into();
                        active_model.name = Set(imported.name);
                        active_model.update(&txn).await?.id
                    } else {
                        existing.id
                    }
                }
                None => {
                    summary.imported += 1;
                    contacts::ActiveModel {
                        email: Set(imported.email),
                        name: Set(imported.name),
                        status: Set(DEFAULT_CONTACT_STATUS.to_string()),
                        ..Default::default()
                    }
                    .insert(&txn)
                    .await?
                    .id
                }
            };
            contact_ids.push(id);
        }

        if let Some(list_id) = list_id {
            add_memberships(&txn, list_id, &contact_ids).await?;
        }
        txn.commit().await?;

        info!(
            "Imported {} file: {} new, {} updated, {} skipped",
            format, summary.imported, summary.updated, summary.skipped
        );

        Ok(summary)
    }

    /// All contacts, or the members of one list, ordered by email
    pub async fn export(
        &self,
        format: ImportFormat,
        list_id: Option<i32>,
    ) -> Result<Vec<u8>, ContactError> {
        if let Some(list_id) = list_id {
            self.ensure_list(list_id).await?;
        }

        let filter = ContactFilter {
            list_id,
            ..Default::default()
        };
        let contacts: Vec<ExportContact> = Self::filtered(&filter)
            .all(self.db.as_ref())
            .await?
            .into_iter()
            .map(ExportContact::from)
            .collect();

        Ok(export_contacts(format, &contacts)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{CreateListRequest, ListService};
    use sendwise_database::test_utils::TestDatabase;

    async fn setup() -> (TestDatabase, ContactService, ListService) {
        let test_db = TestDatabase::with_migrations().await.unwrap();
        let contacts = ContactService::new(test_db.db.clone());
        let lists = ListService::new(test_db.db.clone());
        (test_db, contacts, lists)
    }

    fn new_contact(email: &str, name: Option<&str>) -> CreateContactRequest {
        CreateContactRequest {
            email: email.to_string(),
            name: name.map(str::to_string),
            status: None,
        }
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_create_is_a_conflict() {
        let (_db, service, _) = setup().await;

        let (first, second) = tokio::join!(
            service.create(new_contact("race@example.com", None)),
            service.create(new_contact("RACE@example.com", None))
        );

        let outcomes = [first, second];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(outcomes
            .iter()
            .any(|r| matches!(r, Err(ContactError::Conflict(_)))));
    }

    #[tokio::test]
    async fn test_create_normalizes_and_rejects_duplicates() {
        let (_db, service, _) = setup().await;

        let contact = service
            .create(new_contact("  Jane@Example.COM ", Some(" Jane ")))
            .await
            .unwrap();
        assert_eq!(contact.email, "jane@example.com");
        assert_eq!(contact.name.as_deref(), Some("Jane"));
        assert_eq!(contact.status, "subscribed");

        let result = service.create(new_contact("jane@example.com", None)).await;
        assert!(matches!(result, Err(ContactError::Conflict(_))));

        let result = service.create(new_contact("jane.example.com", None)).await;
        assert!(matches!(result, Err(ContactError::Validation(_))));
    }

    #[tokio::test]
    async fn test_list_filters_and_paginates() {
        let (_db, service, lists) = setup().await;
        for i in 0..5 {
            service
                .create(new_contact(&format!("user{}@example.com", i), None))
                .await
                .unwrap();
        }
        let ann = service
            .create(new_contact("ann@other.org", Some("Ann Smith")))
            .await
            .unwrap();
        service
            .update(
                ann.id,
                UpdateContactRequest {
                    status: Some("unsubscribed".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let page = PaginationParams {
            page: Some(2),
            page_size: Some(2),
        };
        let (items, total) = service.list(&ContactFilter::default(), &page).await.unwrap();
        assert_eq!(total, 6);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].email, "user1@example.com");

        let search = ContactFilter {
            search: Some("Smith".to_string()),
            ..Default::default()
        };
        let (items, total) = service
            .list(&search, &PaginationParams::default())
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(items[0].id, ann.id);

        let unsubscribed = ContactFilter {
            status: Some("unsubscribed".to_string()),
            ..Default::default()
        };
        let (_, total) = service
            .list(&unsubscribed, &PaginationParams::default())
            .await
            .unwrap();
        assert_eq!(total, 1);

        let list = lists
            .create(CreateListRequest {
                name: "Partners".to_string(),
                description: None,
            })
            .await
            .unwrap();
        lists.add_contacts(list.id, &[ann.id]).await.unwrap();
        let in_list = ContactFilter {
            list_id: Some(list.id),
            ..Default::default()
        };
        let (items, total) = service
            .list(&in_list, &PaginationParams::default())
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(items[0].email, "ann@other.org");
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive_and_literal() {
        let (_db, service, _lists) = setup().await;
        let underscored = service
            .create(new_contact("a_b@example.com", Some("Jane Doe")))
            .await
            .unwrap();
        service
            .create(new_contact("axb@example.com", Some("100% Jim")))
            .await
            .unwrap();

        let search = |term: &str| ContactFilter {
            search: Some(term.to_string()),
            ..Default::default()
        };
        let all = PaginationParams::default();

        let (items, total) = service.list(&search("a_b"), &all).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(items[0].id, underscored.id);

        let (items, _) = service.list(&search("JANE"), &all).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, underscored.id);

        let (items, _) = service.list(&search("100%"), &all).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].email, "axb@example.com");

        let (_, total) = service.list(&search("%"), &all).await.unwrap();
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn test_update_validates_email_and_status() {
        let (_db, service, _) = setup().await;
        let a = service.create(new_contact("a@example.com", Some("A"))).await.unwrap();
        service.create(new_contact("b@example.com", None)).await.unwrap();

        let result = service
            .update(
                a.id,
                UpdateContactRequest {
                    email: Some("B@example.com".to_string()),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(result, Err(ContactError::Conflict(_))));

        let result = service
            .update(
                a.id,
                UpdateContactRequest {
                    status: Some("deleted".to_string()),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(result, Err(ContactError::Validation(_))));

        let updated = service
            .update(
                a.id,
                UpdateContactRequest {
                    name: Some(String::new()),
                    status: Some("Bounced".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, None);
        assert_eq!(updated.status, "bounced");
    }

    #[tokio::test]
    async fn test_import_upserts_and_adds_to_list() {
        let (_db, service, lists) = setup().await;
        let existing = service
            .create(new_contact("old@example.com", Some("Old Name")))
            .await
            .unwrap();
        let list = lists
            .create(CreateListRequest {
                name: "Imported".to_string(),
                description: None,
            })
            .await
            .unwrap();

        let csv = "email,name\nnew@example.com,New\nOLD@example.com,Renamed\nbad-row\nnew@example.com,Dup\n";
        let summary = service
            .import(ImportFormat::Csv, csv.as_bytes(), Some(list.id))
            .await
            .unwrap();

        assert_eq!(summary.imported, 1);
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.skipped_rows[0].row, 4);

        let renamed = service.get(existing.id).await.unwrap();
        assert_eq!(renamed.name.as_deref(), Some("Renamed"));
        assert_eq!(lists.member_count(list.id).await.unwrap(), 2);

        // Importing again only matches existing contacts
        let summary = service
            .import(ImportFormat::Csv, csv.as_bytes(), Some(list.id))
            .await
            .unwrap();
        assert_eq!(summary.imported, 0);
        assert_eq!(summary.updated, 2);
        assert_eq!(lists.member_count(list.id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_import_into_missing_list_fails() {
        let (_db, service, _) = setup().await;
        let result = service
            .import(ImportFormat::Txt, b"a@example.com\n", Some(12))
            .await;
        assert!(matches!(result, Err(ContactError::ListNotFound(12))));
    }

    #[tokio::test]
    async fn test_export_with_list_filter() {
        let (_db, service, lists) = setup().await;
        let a = service.create(new_contact("a@example.com", Some("A"))).await.unwrap();
        service.create(new_contact("b@example.com", None)).await.unwrap();
        let list = lists
            .create(CreateListRequest {
                name: "Only A".to_string(),
                description: None,
            })
            .await
            .unwrap();
        lists.add_contacts(list.id, &[a.id]).await.unwrap();

        let all = service.export(ImportFormat::Txt, None).await.unwrap();
        assert_eq!(all, b"a@example.com\nb@example.com\n");

        let only_a = service.export(ImportFormat::Csv, Some(list.id)).await.unwrap();
        assert_eq!(String::from_utf8(only_a).unwrap(), "email,name\na@example.com,A\n");

        let result = service.export(ImportFormat::Xlsx, None).await;
        assert!(matches!(result, Err(ContactError::Import(_))));
    }

    #[tokio::test]
    async fn test_delete_removes_memberships() {
        let (_db, service, lists) = setup().await;
        let a = service.create(new_contact("a@example.com", None)).await.unwrap();
        let list = lists
            .create(CreateListRequest {
                name: "L".to_string(),
                description: None,
            })
            .await
            .unwrap();
        lists.add_contacts(list.id, &[a.id]).await.unwrap();

        service.delete(a.id).await.unwrap();
        assert!(matches!(service.get(a.id).await, Err(ContactError::NotFound(_))));
        assert_eq!(lists.member_count(list.id).await.unwrap(), 0);
    }
}
