use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::user;

/// Which balance counter an earning belongs to. `Referral` is the general
/// balance; the rest are per-task-category counters.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[derive(EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "lowercase")]
pub enum EarningSource {
  #[sea_orm(string_value = "referral")]
  #[default]
  Referral,
  #[sea_orm(string_value = "ads")]
  Ads,
  #[sea_orm(string_value = "videos")]
  Videos,
  #[sea_orm(string_value = "surveys")]
  Surveys,
  #[sea_orm(string_value = "offers")]
  Offers,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "earnings")]
pub struct Model {
  #[sea_orm(primary_key)]
  pub id: i32,
  pub user_id: i64,
  pub source: EarningSource,
  /// Signed: positive for credits, negative for withdrawal debits.
  pub amount: i64,
  pub description: Option<String>,
  pub created_at: DateTime,
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
