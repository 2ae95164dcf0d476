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
          .table(Earnings::Table)
          .if_not_exists()
          .col(
            ColumnDef::new(Earnings::Id)
              .integer()
              .not_null()
              .auto_increment()
              .primary_key(),
          )
          .col(ColumnDef::new(Earnings::UserId).big_integer().not_null())
          .col(ColumnDef::new(Earnings::Source).string().not_null())
          .col(ColumnDef::new(Earnings::Amount).big_integer().not_null())
          .col(ColumnDef::new(Earnings::Description).string().null())
          .col(ColumnDef::new(Earnings::CreatedAt).date_time().not_null())
          .foreign_key(
            ForeignKey::create()
              .name("fk_earnings_user")
              .from(Earnings::Table, Earnings::UserId)
              .to(Users::Table, Users::Id)
              .on_delete(ForeignKeyAction::Cascade),
          )
          .to_owned(),
      )
      .await?;

    manager
      .create_index(
        Index::create()
          .name("idx_earnings_user")
          .table(Earnings::Table)
          .col(Earnings::UserId)
          .to_owned(),
      )
      .await
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager.drop_table(Table::drop().table(Earnings::Table).to_owned()).await
  }
}

#[derive(DeriveIden)]
pub enum Earnings {
  Table,
  Id,
  UserId,
  Source,
  Amount,
  Description,
  CreatedAt,
}
