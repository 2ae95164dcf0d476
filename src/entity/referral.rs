use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::user;

/// One direct (level 1) or one-hop-removed (level 2) referral edge.
/// Created at registration with amount 0 and inactive; activated exactly
/// once by the reward engine when the referred user activates.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "referrals")]
pub struct Model {
  #[sea_orm(primary_key)]
  pub id: i32,
  pub referrer_id: i64,
  pub referred_id: i64,
  pub level: i32,
  pub amount: i64,
  pub is_active: bool,
  pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
  #[sea_orm(
    belongs_to = "user::Entity",
    from = "Column::ReferrerId",
    to = "user::Column::Id"
  )]
  Referrer,
  #[sea_orm(
    belongs_to = "user::Entity",
    from = "Column::ReferredId",
    to = "user::Column::Id"
  )]
  Referred,
}

impl ActiveModelBehavior for ActiveModel {}
