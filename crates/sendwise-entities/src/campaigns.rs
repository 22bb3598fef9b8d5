//! Email campaigns

use async_trait::async_trait;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue::Set, ConnectionTrait, DbErr};
use sendwise_core::DBDateTime;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "campaigns")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    pub subject: String,
    pub from_name: Option<String>,
    pub from_email: String,
    pub reply_to: Option<String>,
    pub domain_id: Option<i32>,
    pub provider_id: Option<i32>,
    pub list_id: Option<i32>,
    /// draft, scheduled, sending, sent or failed
    pub status: String,
    /// Ordered template blocks as JSON
    pub blocks: Json,
    pub scheduled_at: Option<DBDateTime>,
    pub sent_at: Option<DBDateTime>,
    pub recipients: i32,
    pub delivered: i32,
    pub failed: i32,
    pub opened: i32,
    pub clicked: i32,
    pub bounced: i32,
    pub unsubscribed: i32,
    pub created_at: DBDateTime,
    pub updated_at: DBDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::email_providers::Entity",
        from = "Column::ProviderId",
        to = "super::email_providers::Column::Id",
        on_delete = "SetNull"
    )]
    EmailProvider,
    #[sea_orm(
        belongs_to = "super::domains::Entity",
        from = "Column::DomainId",
        to = "super::domains::Column::Id",
        on_delete = "SetNull"
    )]
    Domain,
    #[sea_orm(
        belongs_to = "super::contact_lists::Entity",
        from = "Column::ListId",
        to = "super::contact_lists::Column::Id",
        on_delete = "SetNull"
    )]
    ContactList,
}

impl Related<super::email_providers::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::EmailProvider.def()
    }
}

impl Related<super::domains::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Domain.def()
    }
}

impl Related<super::contact_lists::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ContactList.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(mut self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let now = chrono::Utc::now();

        if insert {
            if self.created_at.is_not_set() {
                self.created_at = Set(now);
            }
            if self.blocks.is_not_set() {
                self.blocks = Set(serde_json::json!([]));
            }
            for counter in [
                &mut self.recipients,
                &mut self.delivered,
                &mut self.failed,
                &mut self.opened,
                &mut self.clicked,
                &mut self.bounced,
                &mut self.unsubscribed,
            ] {
                if counter.is_not_set() {
                    *counter = Set(0);
                }
            }
        }
        self.updated_at = Set(now);

        Ok(self)
    }
}
