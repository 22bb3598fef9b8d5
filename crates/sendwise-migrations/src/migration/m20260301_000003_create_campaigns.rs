use sea_orm_migration::prelude::*;

use super::m20260301_000001_create_email_tables::{Domains, EmailProviders};
use super::m20260301_000002_create_audience_tables::ContactLists;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let mut table = Table::create();
        table
            .table(Campaigns::Table)
            .if_not_exists()
            .col(
                ColumnDef::new(Campaigns::Id)
                    .integer()
                    .not_null()
                    .auto_increment()
                    .primary_key(),
            )
            .col(ColumnDef::new(Campaigns::Name).string_len(255).not_null())
            .col(ColumnDef::new(Campaigns::Subject).text().not_null())
            .col(ColumnDef::new(Campaigns::FromName).string_len(255).null())
            .col(ColumnDef::new(Campaigns::FromEmail).string_len(320).not_null())
            .col(ColumnDef::new(Campaigns::ReplyTo).string_len(320).null())
            .col(ColumnDef::new(Campaigns::DomainId).integer().null())
            .col(ColumnDef::new(Campaigns::ProviderId).integer().null())
            .col(ColumnDef::new(Campaigns::ListId).integer().null())
            .col(
                ColumnDef::new(Campaigns::Status)
                    .string_len(50)
                    .not_null()
                    .default("draft"),
            )
            .col(ColumnDef::new(Campaigns::Blocks).json().not_null())
            .col(
                ColumnDef::new(Campaigns::ScheduledAt)
                    .timestamp_with_time_zone()
                    .null(),
            )
            .col(
                ColumnDef::new(Campaigns::SentAt)
                    .timestamp_with_time_zone()
                    .null(),
            );

        for counter in [
            Campaigns::Recipients,
            Campaigns::Delivered,
            Campaigns::Failed,
            Campaigns::Opened,
            Campaigns::Clicked,
            Campaigns::Bounced,
            Campaigns::Unsubscribed,
        ] {
            table.col(ColumnDef::new(counter).integer().not_null().default(0));
        }

        table
            .col(
                ColumnDef::new(Campaigns::CreatedAt)
                    .timestamp_with_time_zone()
                    .not_null()
                    .default(Expr::current_timestamp()),
            )
            .col(
                ColumnDef::new(Campaigns::UpdatedAt)
                    .timestamp_with_time_zone()
                    .not_null()
                    .default(Expr::current_timestamp()),
            )
            .foreign_key(
                ForeignKey::create()
                    .name("fk_campaigns_domain")
                    .from(Campaigns::Table, Campaigns::DomainId)
                    .to(Domains::Table, Domains::Id)
                    .on_delete(ForeignKeyAction::SetNull),
            )
            .foreign_key(
                ForeignKey::create()
                    .name("fk_campaigns_provider")
                    .from(Campaigns::Table, Campaigns::ProviderId)
                    .to(EmailProviders::Table, EmailProviders::Id)
                    .on_delete(ForeignKeyAction::SetNull),
            )
            .foreign_key(
                ForeignKey::create()
                    .name("fk_campaigns_list")
                    .from(Campaigns::Table, Campaigns::ListId)
                    .to(ContactLists::Table, ContactLists::Id)
                    .on_delete(ForeignKeyAction::SetNull),
            );

        manager.create_table(table.to_owned()).await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_campaigns_status")
                    .table(Campaigns::Table)
                    .col(Campaigns::Status)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_campaigns_status")
                    .table(Campaigns::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(Campaigns::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Campaigns {
    Table,
    Id,
    Name,
    Subject,
    FromName,
    FromEmail,
    ReplyTo,
    DomainId,
    ProviderId,
    ListId,
    Status,
    Blocks,
    ScheduledAt,
    SentAt,
    Recipients,
    Delivered,
    Failed,
    Opened,
    Clicked,
    Bounced,
    Unsubscribed,
    CreatedAt,
    UpdatedAt,
}
