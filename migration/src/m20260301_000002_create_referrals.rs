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
          .table(Referrals::Table)
          .if_not_exists()
          .col(
            ColumnDef::new(Referrals::Id)
              .integer()
              .not_null()
              .auto_increment()
              .primary_key(),
          )
          .col(ColumnDef::new(Referrals::ReferrerId).big_integer().not_null())
          .col(ColumnDef::new(Referrals::ReferredId).big_integer().not_null())
          .col(ColumnDef::new(Referrals::Level).integer().not_null())
          .col(
            ColumnDef::new(Referrals::Amount)
              .big_integer()
              .not_null()
              .default(0),
          )
          .col(
            ColumnDef::new(Referrals::IsActive)
              .boolean()
              .not_null()
              .default(false),
          )
          .col(ColumnDef::new(Referrals::CreatedAt).date_time().not_null())
          .foreign_key(
            ForeignKey::create()
              .name("fk_referrals_referrer")
              .from(Referrals::Table, Referrals::ReferrerId)
              .to(Users::Table, Users::Id)
              .on_delete(ForeignKeyAction::Cascade),
          )
          .foreign_key(
            ForeignKey::create()
              .name("fk_referrals_referred")
              .from(Referrals::Table, Referrals::ReferredId)
              .to(Users::Table, Users::Id)
              .on_delete(ForeignKeyAction::Cascade),
          )
          .to_owned(),
      )
      .await?;

    manager
      .create_index(
        Index::create()
          .name("idx_referrals_referrer")
          .table(Referrals::Table)
          .col(Referrals::ReferrerId)
          .to_owned(),
      )
      .await?;

    // one edge per (referred, level) pair
    manager
      .create_index(
        Index::create()
          .name("idx_referrals_referred_level")
          .table(Referrals::Table)
          .col(Referrals::ReferredId)
          .col(Referrals::Level)
          .unique()
          .to_owned(),
      )
      .await
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager.drop_table(Table::drop().table(Referrals::Table).to_owned()).await
  }
}

#[derive(DeriveIden)]
pub enum Referrals {
  Table,
  Id,
  ReferrerId,
  ReferredId,
  Level,
  Amount,
  IsActive,
  CreatedAt,
}
