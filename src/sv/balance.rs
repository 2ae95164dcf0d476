use crate::{
  entity::{EarningSource, earning, user},
  prelude::*,
};

/// Fixed credit per completed task, by category.
pub fn task_reward(source: &EarningSource) -> i64 {
  match source {
    EarningSource::Referral => 0,
    EarningSource::Ads => 10,
    EarningSource::Videos => 15,
    EarningSource::Surveys => 25,
    EarningSource::Offers => 20,
  }
}

/// Copy a user into an active model with one balance counter replaced.
pub(crate) fn with_balance(
  user: user::Model,
  source: &EarningSource,
  value: i64,
) -> user::ActiveModel {
  let mut user: user::ActiveModel = user.into();
  match source {
    EarningSource::Referral => user.balance = Set(value),
    EarningSource::Ads => user.ads_balance = Set(value),
    EarningSource::Videos => user.videos_balance = Set(value),
    EarningSource::Surveys => user.surveys_balance = Set(value),
    EarningSource::Offers => user.offers_balance = Set(value),
  }
  user
}

pub struct Balance<'a> {
  db: &'a DatabaseConnection,
}

#[allow(dead_code)]
impl<'a> Balance<'a> {
  pub fn new(db: &'a DatabaseConnection) -> Self {
    Self { db }
  }

  pub async fn get(&self, user_id: i64, source: &EarningSource) -> Result<i64> {
    let user = user::Entity::find_by_id(user_id)
      .one(self.db)
      .await?
      .ok_or(Error::UserNotFound)?;
    Ok(user.balance_for(source))
  }

  /// Credit a completed task to the matching category balance.
  pub async fn credit_task(
    &self,
    user_id: i64,
    source: EarningSource,
  ) -> Result<i64> {
    let amount = task_reward(&source);
    if amount <= 0 {
      return Err(Error::Validation("not a creditable task category".into()));
    }

    let txn = self.db.begin().await?;

    let user = user::Entity::find_by_id(user_id)
      .one(&txn)
      .await?
      .ok_or(Error::UserNotFound)?;

    if !user.is_activated {
      return Err(Error::Validation("account is not activated".into()));
    }

    let new_balance = user.balance_for(&source) + amount;
    with_balance(user, &source, new_balance).update(&txn).await?;

    let now = Utc::now().naive_utc();
    earning::ActiveModel {
      id: NotSet,
      user_id: Set(user_id),
      source: Set(source),
      amount: Set(amount),
      description: Set(Some("Task completion".into())),
      created_at: Set(now),
    }
    .insert(&txn)
    .await?;

    txn.commit().await?;
    Ok(new_balance)
  }

  pub async fn earnings(
    &self,
    user_id: i64,
    limit: u64,
  ) -> Result<Vec<earning::Model>> {
    Ok(
      earning::Entity::find()
        .filter(earning::Column::UserId.eq(user_id))
        .order_by_desc(earning::Column::CreatedAt)
        .limit(limit)
        .all(self.db)
        .await?,
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::sv::{User, test_utils::test_db};

  async fn activated_user(db: &DatabaseConnection, phone: &str) -> user::Model {
    let user = User::new(db).register(phone, None).await.unwrap();
    user::ActiveModel { is_activated: Set(true), ..user.into() }
      .update(db)
      .await
      .unwrap()
  }

  #[tokio::test]
  async fn test_credit_task_bumps_category_balance() {
    let db = test_db::setup().await;
    let user = activated_user(&db, "0712345678").await;

    let balance = Balance::new(&db)
      .credit_task(user.id, EarningSource::Videos)
      .await
      .unwrap();

    assert_eq!(balance, 15);

    let sv = Balance::new(&db);
    assert_eq!(sv.get(user.id, &EarningSource::Videos).await.unwrap(), 15);
    assert_eq!(sv.get(user.id, &EarningSource::Referral).await.unwrap(), 0);

    let earnings = Balance::new(&db).earnings(user.id, 10).await.unwrap();
    assert_eq!(earnings.len(), 1);
    assert_eq!(earnings[0].amount, 15);
    assert_eq!(earnings[0].source, EarningSource::Videos);
  }

  #[tokio::test]
  async fn test_credit_task_requires_activation() {
    let db = test_db::setup().await;
    let user = User::new(&db).register("0712345678", None).await.unwrap();

    let result =
      Balance::new(&db).credit_task(user.id, EarningSource::Ads).await;

    assert!(matches!(result, Err(Error::Validation(_))));
  }

  #[tokio::test]
  async fn test_credit_task_rejects_referral_source() {
    let db = test_db::setup().await;
    let user = activated_user(&db, "0712345678").await;

    let result =
      Balance::new(&db).credit_task(user.id, EarningSource::Referral).await;

    assert!(matches!(result, Err(Error::Validation(_))));
  }
}
