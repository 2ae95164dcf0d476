use serde::Serialize;

use crate::{
  entity::{EarningSource, earning, referral, user},
  prelude::*,
  state::UserLocks,
};

/// Reward for a referrer's first-ever activated direct referral, in KES.
pub const FIRST_REFERRAL_REWARD: i64 = 300;
/// Reward for every subsequent direct referral.
pub const REPEAT_REFERRAL_REWARD: i64 = 270;
/// Flat reward for a level-2 (referrer's referrer) edge.
pub const LEVEL2_REWARD: i64 = 150;

pub struct Referral<'a> {
  db: &'a DatabaseConnection,
  locks: &'a UserLocks,
}

impl<'a> Referral<'a> {
  pub fn new(db: &'a DatabaseConnection, locks: &'a UserLocks) -> Self {
    Self { db, locks }
  }

  /// Pay out the referral edges pointing at a freshly activated user.
  /// Each inactive edge is activated exactly once; edges already paid are
  /// left untouched, so duplicate invocations cannot double-pay.
  pub async fn on_user_activated(&self, user_id: i64) -> Result<()> {
    let edges = referral::Entity::find()
      .filter(referral::Column::ReferredId.eq(user_id))
      .all(self.db)
      .await?;

    for edge in edges {
      if edge.is_active {
        continue;
      }

      // The first-referral count below must not race a concurrent
      // activation crediting the same referrer.
      let _guard = self.locks.acquire(edge.referrer_id).await;

      let txn = self.db.begin().await?;

      let Some(edge) = referral::Entity::find_by_id(edge.id).one(&txn).await?
      else {
        continue;
      };
      if edge.is_active {
        continue;
      }

      let reward = if edge.level == 1 {
        let active = referral::Entity::find()
          .filter(referral::Column::ReferrerId.eq(edge.referrer_id))
          .filter(referral::Column::Level.eq(1))
          .filter(referral::Column::IsActive.eq(true))
          .count(&txn)
          .await?;

        if active == 0 {
          FIRST_REFERRAL_REWARD
        } else {
          REPEAT_REFERRAL_REWARD
        }
      } else {
        LEVEL2_REWARD
      };

      let referrer = user::Entity::find_by_id(edge.referrer_id)
        .one(&txn)
        .await?
        .ok_or(Error::UserNotFound)?;
      let referrer_id = referrer.id;
      let level = edge.level;

      referral::ActiveModel {
        amount: Set(reward),
        is_active: Set(true),
        ..edge.into()
      }
      .update(&txn)
      .await?;

      let new_balance = referrer.balance + reward;
      user::ActiveModel { balance: Set(new_balance), ..referrer.into() }
        .update(&txn)
        .await?;

      let now = Utc::now().naive_utc();
      earning::ActiveModel {
        id: NotSet,
        user_id: Set(referrer_id),
        source: Set(EarningSource::Referral),
        amount: Set(reward),
        description: Set(Some(format!(
          "Level {level} referral reward for user #{user_id}"
        ))),
        created_at: Set(now),
      }
      .insert(&txn)
      .await?;

      txn.commit().await?;

      info!("paid {reward} to user #{referrer_id} (level {level} referral)");
    }

    Ok(())
  }

  /// Referral summary for a user acting as referrer.
  pub async fn stats(&self, user_id: i64) -> Result<ReferralStats> {
    user::Entity::find_by_id(user_id)
      .one(self.db)
      .await?
      .ok_or(Error::UserNotFound)?;

    let edges = referral::Entity::find()
      .filter(referral::Column::ReferrerId.eq(user_id))
      .all(self.db)
      .await?;

    let direct = edges.iter().filter(|e| e.level == 1).count() as u64;
    let active =
      edges.iter().filter(|e| e.level == 1 && e.is_active).count() as u64;
    let total_earned: i64 =
      edges.iter().filter(|e| e.is_active).map(|e| e.amount).sum();

    Ok(ReferralStats { direct_referrals: direct, active, total_earned })
  }
}

#[derive(Debug, Serialize)]
pub struct ReferralStats {
  pub direct_referrals: u64,
  pub active: u64,
  pub total_earned: i64,
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::sv::{User, test_utils::test_db};

  async fn balance_of(db: &DatabaseConnection, user_id: i64) -> i64 {
    user::Entity::find_by_id(user_id).one(db).await.unwrap().unwrap().balance
  }

  #[tokio::test]
  async fn test_first_referral_pays_300_then_270() {
    let db = test_db::setup().await;
    let locks = UserLocks::default();
    let sv = User::new(&db);

    let a = sv.register("0712345678", None).await.unwrap();
    let b = sv.register("0712345679", Some(&a.referral_code)).await.unwrap();
    let c = sv.register("0712345680", Some(&a.referral_code)).await.unwrap();

    let referral = Referral::new(&db, &locks);
    referral.on_user_activated(b.id).await.unwrap();
    assert_eq!(balance_of(&db, a.id).await, FIRST_REFERRAL_REWARD);

    referral.on_user_activated(c.id).await.unwrap();
    assert_eq!(
      balance_of(&db, a.id).await,
      FIRST_REFERRAL_REWARD + REPEAT_REFERRAL_REWARD
    );
  }

  #[tokio::test]
  async fn test_level2_pays_flat_150() {
    let db = test_db::setup().await;
    let locks = UserLocks::default();
    let sv = User::new(&db);

    let a = sv.register("0712345678", None).await.unwrap();
    let b = sv.register("0712345679", Some(&a.referral_code)).await.unwrap();
    let c = sv.register("0712345680", Some(&b.referral_code)).await.unwrap();

    let referral = Referral::new(&db, &locks);
    referral.on_user_activated(b.id).await.unwrap();
    referral.on_user_activated(c.id).await.unwrap();

    // B earned 300 for C (B's first direct), A earned 300 for B plus the
    // level-2 150 for C.
    assert_eq!(balance_of(&db, b.id).await, FIRST_REFERRAL_REWARD);
    assert_eq!(
      balance_of(&db, a.id).await,
      FIRST_REFERRAL_REWARD + LEVEL2_REWARD
    );

    let edges = referral::Entity::find()
      .filter(referral::Column::ReferredId.eq(c.id))
      .all(&db)
      .await
      .unwrap();
    assert!(edges.iter().all(|e| e.is_active));
  }

  #[tokio::test]
  async fn test_reward_is_paid_once() {
    let db = test_db::setup().await;
    let locks = UserLocks::default();
    let sv = User::new(&db);

    let a = sv.register("0712345678", None).await.unwrap();
    let b = sv.register("0712345679", Some(&a.referral_code)).await.unwrap();

    let referral = Referral::new(&db, &locks);
    referral.on_user_activated(b.id).await.unwrap();
    referral.on_user_activated(b.id).await.unwrap();

    assert_eq!(balance_of(&db, a.id).await, FIRST_REFERRAL_REWARD);

    let earnings = earning::Entity::find()
      .filter(earning::Column::UserId.eq(a.id))
      .all(&db)
      .await
      .unwrap();
    assert_eq!(earnings.len(), 1);
    assert_eq!(earnings[0].amount, FIRST_REFERRAL_REWARD);
  }

  #[tokio::test]
  async fn test_stats() {
    let db = test_db::setup().await;
    let locks = UserLocks::default();
    let sv = User::new(&db);

    let a = sv.register("0712345678", None).await.unwrap();
    let b = sv.register("0712345679", Some(&a.referral_code)).await.unwrap();
    sv.register("0712345680", Some(&a.referral_code)).await.unwrap();

    let referral = Referral::new(&db, &locks);
    referral.on_user_activated(b.id).await.unwrap();

    let stats = referral.stats(a.id).await.unwrap();
    assert_eq!(stats.direct_referrals, 2);
    assert_eq!(stats.active, 1);
    assert_eq!(stats.total_earned, FIRST_REFERRAL_REWARD);
  }
}
