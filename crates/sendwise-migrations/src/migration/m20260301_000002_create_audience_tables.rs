use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Contacts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Contacts::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Contacts::Email)
                            .string_len(320)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Contacts::Name).string_len(255).null())
                    .col(
                        ColumnDef::new(Contacts::Status)
                            .string_len(50)
                            .not_null()
                            .default("subscribed"),
                    )
                    .col(
                        ColumnDef::new(Contacts::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Contacts::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ContactLists::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ContactLists::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ContactLists::Name)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(ColumnDef::new(ContactLists::Description).text().null())
                    .col(
                        ColumnDef::new(ContactLists::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(ContactLists::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ContactListMembers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ContactListMembers::ListId)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ContactListMembers::ContactId)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ContactListMembers::AddedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .primary_key(
                        Index::create()
                            .col(ContactListMembers::ListId)
                            .col(ContactListMembers::ContactId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_contact_list_members_list")
                            .from(ContactListMembers::Table, ContactListMembers::ListId)
                            .to(ContactLists::Table, ContactLists::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_contact_list_members_contact")
                            .from(ContactListMembers::Table, ContactListMembers::ContactId)
                            .to(Contacts::Table, Contacts::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ContactListMembers::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ContactLists::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Contacts::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
pub(crate) enum Contacts {
    Table,
    Id,
    Email,
    Name,
    Status,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
pub(crate) enum ContactLists {
    Table,
    Id,
    Name,
    Description,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum ContactListMembers {
    Table,
    ListId,
    ContactId,
    AddedAt,
}
