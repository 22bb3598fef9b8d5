//! Contact lists and their memberships

use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait,
    DatabaseConnection, EntityTrait, JoinType, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, RelationTrait, TransactionTrait,
};
use sendwise_entities::{contact_list_members, contact_lists, contacts};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

use crate::errors::ContactError;

#[derive(Debug, Clone, Default)]
pub struct CreateListRequest {
    pub name: String,
    pub description: Option<String>,
}

/// Omitted fields are left unchanged; an empty description clears it
#[derive(Debug, Clone, Default)]
pub struct UpdateListRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListWithCount {
    pub list: contact_lists::Model,
    pub member_count: u64,
}

/// Adds the contacts to the list, skipping existing memberships. Returns how many were added.
pub(crate) async fn add_memberships<C: ConnectionTrait>(
    db: &C,
    list_id: i32,
    contact_ids: &[i32],
) -> Result<u64, sea_orm::DbErr> {
    let existing: HashSet<i32> = contact_list_members::Entity::find()
        .filter(contact_list_members::Column::ListId.eq(list_id))
        .filter(contact_list_members::Column::ContactId.is_in(contact_ids.iter().copied()))
        .all(db)
        .await?
        .into_iter()
        .map(|m| m.contact_id)
        .collect();

    let now = chrono::Utc::now();
    let mut seen = HashSet::new();
    let new_members: Vec<contact_list_members::ActiveModel> = contact_ids
        .iter()
        .copied()
        .filter(|id| !existing.contains(id) && seen.insert(*id))
        .map(|contact_id| contact_list_members::ActiveModel {
            list_id: Set(list_id),
            contact_id: Set(contact_id),
            added_at: Set(now),
        })
        .collect();

    let added = new_members.len() as u64;
    if added > 0 {
        contact_list_members::Entity::insert_many(new_members)
            .exec_without_returning(db)
            .await?;
    }

    Ok(added)
}

#[derive(Clone)]
pub struct ListService {
    db: Arc<DatabaseConnection>,
}

impl ListService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn create(
        &self,
        request: CreateListRequest,
    ) -> Result<contact_lists::Model, ContactError> {
        let name = request.name.trim().to_string();
        if name.is_empty() {
            return Err(ContactError::Validation("List name is required".into()));
        }

        let list = contact_lists::ActiveModel {
            name: Set(name),
            description: Set(request
                .description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty())),
            ..Default::default()
        }
        .insert(self.db.as_ref())
        .await?;

        info!("Created contact list {} ({})", list.name, list.id);
        Ok(list)
    }

    pub async fn get(&self, id: i32) -> Result<contact_lists::Model, ContactError> {
        contact_lists::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .ok_or(ContactError::ListNotFound(id))
    }

    /// All lists ordered by name, each with its member count
    pub async fn list(&self) -> Result<Vec<ListWithCount>, ContactError> {
        let lists = contact_lists::Entity::find()
            .order_by_asc(contact_lists::Column::Name)
            .order_by_asc(contact_lists::Column::Id)
            .all(self.db.as_ref())
            .await?;

        let counts: HashMap<i32, i64> = contact_list_members::Entity::find()
            .select_only()
            .column(contact_list_members::Column::ListId)
            .column_as(
                Expr::col(contact_list_members::Column::ContactId).count(),
                "member_count",
            )
            .group_by(contact_list_members::Column::ListId)
            .into_tuple::<(i32, i64)>()
            .all(self.db.as_ref())
            .await?
            .into_iter()
            .collect();

        Ok(lists
            .into_iter()
            .map(|list| {
                let member_count = counts.get(&list.id).copied().unwrap_or(0).max(0) as u64;
                ListWithCount { list, member_count }
            })
            .collect())
    }

    pub async fn member_count(&self, list_id: i32) -> Result<u64, ContactError> {
        let count = contact_list_members::Entity::find()
            .filter(contact_list_members::Column::ListId.eq(list_id))
            .count(self.db.as_ref())
            .await?;
        Ok(count)
    }

    pub async fn update(
        &self,
        id: i32,
        request: UpdateListRequest,
    ) -> Result<contact_lists::Model, ContactError> {
        let list = self.get(id).await?;
        let mut active_model: contact_lists::ActiveModel = list.into();

        if let Some(name) = request.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(ContactError::Validation("List name is required".into()));
            }
            active_model.name = Set(name);
        }
        if let Some(description) = request.description {
            let description = description.trim().to_string();
            active_model.description = Set((!description.is_empty()).then_some(description));
        }

        Ok(active_model.update(self.db.as_ref()).await?)
    }

    /// Deletes the list and its memberships. Contacts are kept.
    pub async fn delete(&self, id: i32) -> Result<(), ContactError> {
        let list = self.get(id).await?;

        let txn = self.db.begin().await?;
        let removed = contact_list_members::Entity::delete_many()
            .filter(contact_list_members::Column::ListId.eq(list.id))
            .exec(&txn)
            .await?;
        contact_lists::Entity::delete_by_id(list.id).exec(&txn).await?;
        txn.commit().await?;

        info!(
            "Deleted contact list {} with {} memberships",
            list.id, removed.rows_affected
        );
        Ok(())
    }

    /// Returns how many contacts were newly added
    pub async fn add_contacts(&self, list_id: i32, contact_ids: &[i32]) -> Result<u64, ContactError> {
        self.get(list_id).await?;

        let found: HashSet<i32> = contacts::Entity::find()
            .select_only()
            .column(contacts::Column::Id)
            .filter(contacts::Column::Id.is_in(contact_ids.iter().copied()))
            .into_tuple::<i32>()
            .all(self.db.as_ref())
            .await?
            .into_iter()
            .collect();
        if let Some(missing) = contact_ids.iter().find(|id| !found.contains(id)) {
            return Err(ContactError::NotFound(*missing));
        }

        let added = add_memberships(self.db.as_ref(), list_id, contact_ids).await?;
        debug!("Added {} contacts to list {}", added, list_id);
        Ok(added)
    }

    pub async fn remove_contact(&self, list_id: i32, contact_id: i32) -> Result<(), ContactError> {
        self.get(list_id).await?;

        let result = contact_list_members::Entity::delete_many()
            .filter(contact_list_members::Column::ListId.eq(list_id))
            .filter(contact_list_members::Column::ContactId.eq(contact_id))
            .exec(self.db.as_ref())
            .await?;

        if result.rows_affected == 0 {
            return Err(ContactError::NotMember {
                list_id,
                contact_id,
            });
        }
        Ok(())
    }

    /// Members of the list, ordered by email
    pub async fn members(&self, list_id: i32) -> Result<Vec<contacts::Model>, ContactError> {
        self.get(list_id).await?;

        let members = contacts::Entity::find()
            .join(JoinType::InnerJoin, contacts::Relation::Memberships.def())
            .filter(contact_list_members::Column::ListId.eq(list_id))
            .order_by_asc(contacts::Column::Email)
            .all(self.db.as_ref())
            .await?;

        Ok(members)
    }

    /// Subscribed members only; these are the addresses a campaign goes to
    pub async fn subscribed_members(
        &self,
        list_id: i32,
    ) -> Result<Vec<contacts::Model>, ContactError> {
        self.get(list_id).await?;

        let members = contacts::Entity::find()
            .join(JoinType::InnerJoin, contacts::Relation::Memberships.def())
            .filter(contact_list_members::Column::ListId.eq(list_id))
            .filter(contacts::Column::Status.eq("subscribed"))
            .order_by_asc(contacts::Column::Email)
            .all(self.db.as_ref())
            .await?;

        Ok(members)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sendwise_database::test_utils::TestDatabase;

    async fn contact(db: &DatabaseConnection, email: &str, status: &str) -> contacts::Model {
        contacts::ActiveModel {
            email: Set(email.to_string()),
            name: Set(None),
            status: Set(status.to_string()),
            ..Default::default()
        }
        .insert(db)
        .await
        .unwrap()
    }

    fn list_request(name: &str) -> CreateListRequest {
        CreateListRequest {
            name: name.to_string(),
            description: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_count_members() {
        let test_db = TestDatabase::with_migrations().await.unwrap();
        let service = ListService::new(test_db.db.clone());

        let weekly = service.create(list_request("Weekly")).await.unwrap();
        let empty = service.create(list_request("Announcements")).await.unwrap();
        let a = contact(&test_db.db, "a@example.com", "subscribed").await;
        let b = contact(&test_db.db, "b@example.com", "subscribed").await;

        let added = service.add_contacts(weekly.id, &[a.id, b.id, a.id]).await.unwrap();
        assert_eq!(added, 2);
        // Re-adding is a no-op
        assert_eq!(service.add_contacts(weekly.id, &[b.id]).await.unwrap(), 0);

        let lists = service.list().await.unwrap();
        assert_eq!(lists.len(), 2);
        assert_eq!(lists[0].list.id, empty.id);
        assert_eq!(lists[0].member_count, 0);
        assert_eq!(lists[1].member_count, 2);
        assert_eq!(service.member_count(weekly.id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_add_unknown_contact_fails() {
        let test_db = TestDatabase::with_migrations().await.unwrap();
        let service = ListService::new(test_db.db.clone());
        let list = service.create(list_request("Weekly")).await.unwrap();

        let result = service.add_contacts(list.id, &[404]).await;
        assert!(matches!(result, Err(ContactError::NotFound(404))));

        let result = service.add_contacts(999, &[]).await;
        assert!(matches!(result, Err(ContactError::ListNotFound(999))));
    }

    #[tokio::test]
    async fn test_members_and_removal() {
        let test_db = TestDatabase::with_migrations().await.unwrap();
        let service = ListService::new(test_db.db.clone());
        let list = service.create(list_request("Weekly")).await.unwrap();
        let z = contact(&test_db.db, "z@example.com", "subscribed").await;
        let a = contact(&test_db.db, "a@example.com", "unsubscribed").await;
        service.add_contacts(list.id, &[z.id, a.id]).await.unwrap();

        let members = service.members(list.id).await.unwrap();
        let emails: Vec<&str> = members.iter().map(|c| c.email.as_str()).collect();
        assert_eq!(emails, vec!["a@example.com", "z@example.com"]);

        let subscribed = service.subscribed_members(list.id).await.unwrap();
        assert_eq!(subscribed.len(), 1);
        assert_eq!(subscribed[0].id, z.id);

        service.remove_contact(list.id, z.id).await.unwrap();
        let result = service.remove_contact(list.id, z.id).await;
        assert!(matches!(result, Err(ContactError::NotMember { .. })));
    }

    #[tokio::test]
    async fn test_update_and_delete_keeps_contacts() {
        let test_db = TestDatabase::with_migrations().await.unwrap();
        let service = ListService::new(test_db.db.clone());
        let list = service
            .create(CreateListRequest {
                name: "  VIP ".to_string(),
                description: Some("Top customers".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(list.name, "VIP");

        let updated = service
            .update(
                list.id,
                UpdateListRequest {
                    name: None,
                    description: Some(String::new()),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "VIP");
        assert_eq!(updated.description, None);

        let c = contact(&test_db.db, "c@example.com", "subscribed").await;
        service.add_contacts(list.id, &[c.id]).await.unwrap();
        service.delete(list.id).await.unwrap();

        assert!(matches!(
            service.get(list.id).await,
            Err(ContactError::ListNotFound(_))
        ));
        let still_there = contacts::Entity::find_by_id(c.id)
            .one(test_db.db.as_ref())
            .await
            .unwrap();
        assert!(still_there.is_some());
    }

    #[tokio::test]
    async fn test_blank_name_is_rejected() {
        let test_db = TestDatabase::with_migrations().await.unwrap();
        let service = ListService::new(test_db.db.clone());
        let result = service.create(list_request("   ")).await;
        assert!(matches!(result, Err(ContactError::Validation(_))));
    }
}
