use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::{earning::EarningSource, user};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[derive(EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalStatus {
  #[sea_orm(string_value = "pending")]
  #[default]
  Pending,
  /// Disbursement accepted by the gateway, awaiting the result callback.
  #[sea_orm(string_value = "processing")]
  Processing,
  #[sea_orm(string_value = "completed")]
  Completed,
  #[sea_orm(string_value = "failed")]
  Failed,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[derive(EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
  #[sea_orm(string_value = "mpesa")]
  #[default]
  Mpesa,
  /// Fulfilled out of band; completes immediately.
  #[sea_orm(string_value = "manual")]
  Manual,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "withdrawals")]
pub struct Model {
  #[sea_orm(primary_key)]
  pub id: i32,
  pub user_id: i64,
  pub source: EarningSource,
  /// Gross amount debited from the balance; the payout is amount - fee.
  pub amount: i64,
  pub fee: i64,
  pub status: WithdrawalStatus,
  pub method: PaymentMethod,
  pub phone: String,
  pub conversation_id: Option<String>,
  pub originator_id: Option<String>,
  pub receipt: Option<String>,
  pub failure_reason: Option<String>,
  pub created_at: DateTime,
  pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
  #[sea_orm(
    belongs_to = "user::Entity",
    from = "Column::UserId",
    to = "user::Column::Id"
  )]
  User,
}

impl Related<user::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::User.def()
  }
}

impl ActiveModelBehavior for ActiveModel {}
