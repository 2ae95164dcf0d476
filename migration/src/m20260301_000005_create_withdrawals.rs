use sea_orm_migration::prelude::*;

use super::m20260301_000001_create_users::Users;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
  async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .create_table(
        Table::create()
          .table(Withdrawals::Table)
          .if_not_exists()
          .col(
            ColumnDef::new(Withdrawals::Id)
              .integer()
              .not_null()
              .auto_increment()
              .primary_key(),
          )
          .col(ColumnDef::new(Withdrawals::UserId).big_integer().not_null())
          .col(ColumnDef::new(Withdrawals::Source).string().not_null())
          .col(ColumnDef::new(Withdrawals::Amount).big_integer().not_null())
          .col(ColumnDef::new(Withdrawals::Fee).big_integer().not_null())
          .col(
            ColumnDef::new(Withdrawals::Status)
              .string()
              .not_null()
              .default("pending"),
          )
          .col(ColumnDef::new(Withdrawals::Method).string().not_null())
          .col(ColumnDef::new(Withdrawals::Phone).string().not_null())
          .col(ColumnDef::new(Withdrawals::ConversationId).string().null())
          .col(ColumnDef::new(Withdrawals::OriginatorId).string().null())
          .col(ColumnDef::new(Withdrawals::Receipt).string().null())
          .col(ColumnDef::new(Withdrawals::FailureReason).string().null())
          .col(ColumnDef::new(Withdrawals::CreatedAt).date_time().not_null())
          .col(ColumnDef::new(Withdrawals::UpdatedAt).date_time().not_null())
          .foreign_key(
            ForeignKey::create()
              .name("fk_withdrawals_user")
              .from(Withdrawals::Table, Withdrawals::UserId)
              .to(Users::Table, Users::Id)
              .on_delete(ForeignKeyAction::Cascade),
          )
          .to_owned(),
      )
      .await?;

    manager
      .create_index(
        Index::create()
          .name("idx_withdrawals_user")
          .table(Withdrawals::Table)
          .col(Withdrawals::UserId)
          .to_owned(),
      )
      .await?;

    manager
      .create_index(
        Index::create()
          .name("idx_withdrawals_conversation")
          .table(Withdrawals::Table)
          .col(Withdrawals::ConversationId)
          .to_owned(),
      )
      .await
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager.drop_table(Table::drop().table(Withdrawals::Table).to_owned()).await
  }
}

#[derive(DeriveIden)]
pub enum Withdrawals {
  Table,
  Id,
  UserId,
  Source,
  Amount,
  Fee,
  Status,
  Method,
  Phone,
  ConversationId,
  OriginatorId,
  Receipt,
  FailureReason,
  CreatedAt,
  UpdatedAt,
}
