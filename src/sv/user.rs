use uuid::Uuid;

use crate::{
  entity::{referral, user},
  prelude::*,
  utils,
};

pub struct User<'a> {
  db: &'a DatabaseConnection,
}

#[allow(dead_code)]
impl<'a> User<'a> {
  pub fn new(db: &'a DatabaseConnection) -> Self {
    Self { db }
  }

  /// Create a user, optionally attached to a referrer by code. The level-1
  /// edge (and the level-2 edge, when the referrer was referred themself)
  /// starts inactive with amount 0 until the new user activates.
  pub async fn register(
    &self,
    phone: &str,
    referral_code: Option<&str>,
  ) -> Result<user::Model> {
    let msisdn = utils::normalize_msisdn(phone).ok_or_else(|| {
      Error::Validation(format!("cannot normalize phone `{phone}`"))
    })?;

    let txn = self.db.begin().await?;

    if user::Entity::find()
      .filter(user::Column::Phone.eq(msisdn.clone()))
      .one(&txn)
      .await?
      .is_some()
    {
      return Err(Error::Validation("phone is already registered".into()));
    }

    let referrer = match referral_code {
      Some(code) => Some(
        user::Entity::find()
          .filter(user::Column::ReferralCode.eq(code.trim()))
          .one(&txn)
          .await?
          .ok_or(Error::ReferrerNotFound)?,
      ),
      None => None,
    };

    let now = Utc::now().naive_utc();
    let user = user::ActiveModel {
      id: NotSet,
      phone: Set(msisdn),
      is_activated: Set(false),
      balance: Set(0),
      ads_balance: Set(0),
      videos_balance: Set(0),
      surveys_balance: Set(0),
      offers_balance: Set(0),
      referral_code: Set(generate_code()),
      referred_by: Set(referrer.as_ref().map(|r| r.id)),
      created_at: Set(now),
    }
    .insert(&txn)
    .await?;

    if let Some(referrer) = referrer {
      referral::ActiveModel {
        id: NotSet,
        referrer_id: Set(referrer.id),
        referred_id: Set(user.id),
        level: Set(1),
        amount: Set(0),
        is_active: Set(false),
        created_at: Set(now),
      }
      .insert(&txn)
      .await?;

      if let Some(grand_id) = referrer.referred_by {
        referral::ActiveModel {
          id: NotSet,
          referrer_id: Set(grand_id),
          referred_id: Set(user.id),
          level: Set(2),
          amount: Set(0),
          is_active: Set(false),
          created_at: Set(now),
        }
        .insert(&txn)
        .await?;
      }
    }

    txn.commit().await?;

    info!("registered user #{} ({})", user.id, user.referral_code);
    Ok(user)
  }

  pub async fn by_id(&self, id: i64) -> Result<Option<user::Model>> {
    Ok(user::Entity::find_by_id(id).one(self.db).await?)
  }

  pub async fn by_referral_code(
    &self,
    code: &str,
  ) -> Result<Option<user::Model>> {
    Ok(
      user::Entity::find()
        .filter(user::Column::ReferralCode.eq(code.trim()))
        .one(self.db)
        .await?,
    )
  }
}

fn generate_code() -> String {
  Uuid::new_v4().simple().to_string()[..8].to_uppercase()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::sv::test_utils::test_db;

  #[tokio::test]
  async fn test_register_without_code_creates_no_edges() {
    let db = test_db::setup().await;

    let user = User::new(&db).register("0712345678", None).await.unwrap();

    assert_eq!(user.phone, "254712345678");
    assert!(!user.is_activated);
    assert!(user.referred_by.is_none());
    assert_eq!(user.referral_code.len(), 8);

    let edges = referral::Entity::find().all(&db).await.unwrap();
    assert!(edges.is_empty());
  }

  #[tokio::test]
  async fn test_register_with_code_creates_level1_edge() {
    let db = test_db::setup().await;
    let sv = User::new(&db);

    let a = sv.register("0712345678", None).await.unwrap();
    let b = sv.register("0712345679", Some(&a.referral_code)).await.unwrap();

    assert_eq!(b.referred_by, Some(a.id));

    let edges = referral::Entity::find().all(&db).await.unwrap();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].referrer_id, a.id);
    assert_eq!(edges[0].referred_id, b.id);
    assert_eq!(edges[0].level, 1);
    assert_eq!(edges[0].amount, 0);
    assert!(!edges[0].is_active);
  }

  #[tokio::test]
  async fn test_register_chain_creates_level2_edge() {
    let db = test_db::setup().await;
    let sv = User::new(&db);

    let a = sv.register("0712345678", None).await.unwrap();
    let b = sv.register("0712345679", Some(&a.referral_code)).await.unwrap();
    let c = sv.register("0712345680", Some(&b.referral_code)).await.unwrap();

    let edges = referral::Entity::find()
      .filter(referral::Column::ReferredId.eq(c.id))
      .order_by_asc(referral::Column::Level)
      .all(&db)
      .await
      .unwrap();

    assert_eq!(edges.len(), 2);
    assert_eq!((edges[0].referrer_id, edges[0].level), (b.id, 1));
    assert_eq!((edges[1].referrer_id, edges[1].level), (a.id, 2));
  }

  #[tokio::test]
  async fn test_lookup_by_referral_code() {
    let db = test_db::setup().await;
    let sv = User::new(&db);

    let a = sv.register("0712345678", None).await.unwrap();

    let found = sv.by_referral_code(&a.referral_code).await.unwrap();
    assert_eq!(found.map(|u| u.id), Some(a.id));
    assert!(sv.by_referral_code("NOPE1234").await.unwrap().is_none());
  }

  #[tokio::test]
  async fn test_register_rejects_unknown_code() {
    let db = test_db::setup().await;

    let result =
      User::new(&db).register("0712345678", Some("NOPE1234")).await;

    assert!(matches!(result, Err(Error::ReferrerNotFound)));
  }

  #[tokio::test]
  async fn test_register_rejects_duplicate_phone() {
    let db = test_db::setup().await;
    let sv = User::new(&db);

    sv.register("0712345678", None).await.unwrap();
    let result = sv.register("+254712345678", None).await;

    assert!(matches!(result, Err(Error::Validation(_))));
  }
}
