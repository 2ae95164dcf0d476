pub use sea_orm_migration::prelude::*;

mod m20260301_000001_create_users;
mod m20260301_000002_create_referrals;
mod m20260301_000003_create_earnings;
mod m20260301_000004_create_payment_transactions;
mod m20260301_000005_create_withdrawals;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
  fn migrations() -> Vec<Box<dyn MigrationTrait>> {
    vec![
      Box::new(m20260301_000001_create_users::Migration),
      Box::new(m20260301_000002_create_referrals::Migration),
      Box::new(m20260301_000003_create_earnings::Migration),
      Box::new(m20260301_000004_create_payment_transactions::Migration),
      Box::new(m20260301_000005_create_withdrawals::Migration),
    ]
  }
}
