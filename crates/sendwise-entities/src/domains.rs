//! Sending domains and their DKIM/SPF/DMARC state

use async_trait::async_trait;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue::Set, ConnectionTrait, DbErr};
use sendwise_core::DBDateTime;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "domains")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub name: String,
    pub status: String,
    pub verified: bool,
    pub default_domain: bool,
    pub dkim_verified: bool,
    pub spf_verified: bool,
    pub dmarc_verified: bool,
    pub dkim_selector: Option<String>,
    pub dkim_value: Option<String>,
    pub spf_value: Option<String>,
    pub dmarc_value: Option<String>,
    pub provider_id: Option<i32>,
    pub metadata: Json,
    pub last_used_at: Option<DBDateTime>,
    pub last_verified_at: Option<DBDateTime>,
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
}

impl Related<super::email_providers::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::EmailProvider.def()
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
            if self.metadata.is_not_set() {
                self.metadata = Set(serde_json::json!({}));
            }
        }
        self.updated_at = Set(now);

        Ok(self)
    }
}
