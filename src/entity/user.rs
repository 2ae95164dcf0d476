use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::{earning, earning::EarningSource, payment_transaction, withdrawal};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
  #[sea_orm(primary_key)]
  pub id: i64,
  #[sea_orm(unique)]
  pub phone: String,
  pub is_activated: bool,
  /// General balance, credited by referral rewards.
  pub balance: i64,
  pub ads_balance: i64,
  pub videos_balance: i64,
  pub surveys_balance: i64,
  pub offers_balance: i64,
  #[sea_orm(unique)]
  pub referral_code: String,
  pub referred_by: Option<i64>,
  pub created_at: DateTime,
}

impl Model {
  /// Resolve the balance counter backing a given earning source.
  pub fn balance_for(&self, source: &EarningSource) -> i64 {
    match source {
      EarningSource::Referral => self.balance,
      EarningSource::Ads => self.ads_balance,
      EarningSource::Videos => self.videos_balance,
      EarningSource::Surveys => self.surveys_balance,
      EarningSource::Offers => self.offers_balance,
    }
  }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
  #[sea_orm(has_many = "earning::Entity")]
  Earnings,
  #[sea_orm(has_many = "withdrawal::Entity")]
  Withdrawals,
  #[sea_orm(has_many = "payment_transaction::Entity")]
  PaymentTransactions,
}

impl Related<earning::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::Earnings.def()
  }
}

impl Related<withdrawal::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::Withdrawals.def()
  }
}

impl Related<payment_transaction::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::PaymentTransactions.def()
  }
}

impl ActiveModelBehavior for ActiveModel {}
