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
          .table(PaymentTransactions::Table)
          .if_not_exists()
          .col(
            ColumnDef::new(PaymentTransactions::Id)
              .integer()
              .not_null()
              .auto_increment()
              .primary_key(),
          )
          .col(
            ColumnDef::new(PaymentTransactions::UserId)
              .big_integer()
              .not_null(),
          )
          .col(
            ColumnDef::new(PaymentTransactions::Amount)
              .big_integer()
              .not_null(),
          )
          .col(
            ColumnDef::new(PaymentTransactions::Status)
              .string()
              .not_null()
              .default("pending"),
          )
          .col(
            ColumnDef::new(PaymentTransactions::MerchantRequestId)
              .string()
              .null(),
          )
          .col(
            ColumnDef::new(PaymentTransactions::CheckoutRequestId)
              .string()
              .null()
              .unique_key(),
          )
          .col(ColumnDef::new(PaymentTransactions::ResultCode).integer().null())
          .col(ColumnDef::new(PaymentTransactions::ResultDesc).string().null())
          .col(ColumnDef::new(PaymentTransactions::Receipt).string().null())
          .col(
            ColumnDef::new(PaymentTransactions::CreatedAt)
              .date_time()
              .not_null(),
          )
          .col(
            ColumnDef::new(PaymentTransactions::UpdatedAt)
              .date_time()
              .not_null(),
          )
          .foreign_key(
            ForeignKey::create()
              .name("fk_payment_transactions_user")
              .from(PaymentTransactions::Table, PaymentTransactions::UserId)
              .to(Users::Table, Users::Id)
              .on_delete(ForeignKeyAction::Cascade),
          )
          .to_owned(),
      )
      .await?;

    manager
      .create_index(
        Index::create()
          .name("idx_payment_transactions_user")
          .table(PaymentTransactions::Table)
          .col(PaymentTransactions::UserId)
          .to_owned(),
      )
      .await
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .drop_table(Table::drop().table(PaymentTransactions::Table).to_owned())
      .await
  }
}

#[derive(DeriveIden)]
pub enum PaymentTransactions {
  Table,
  Id,
  UserId,
  Amount,
  Status,
  MerchantRequestId,
  CheckoutRequestId,
  ResultCode,
  ResultDesc,
  Receipt,
  CreatedAt,
  UpdatedAt,
}
