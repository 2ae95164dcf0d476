use serde::Deserialize;

use crate::{
  entity::{
    EarningSource, PaymentMethod, WithdrawalStatus, earning, user, withdrawal,
  },
  prelude::*,
  state::UserLocks,
  sv::{Daraja, balance},
  utils,
};

/// Smallest withdrawable gross amount, in KES.
pub const MIN_WITHDRAWAL: i64 = 200;
/// Flat fee retained from every withdrawal; the payout is gross - fee.
pub const WITHDRAWAL_FEE: i64 = 30;

/// B2C result envelope as delivered by the gateway.
#[derive(Debug, Deserialize)]
pub struct ResultEnvelope {
  #[serde(rename = "Result")]
  pub result: DisbursementResult,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
pub struct DisbursementResult {
  #[serde(rename = "ConversationID")]
  pub conversation_id: String,
  #[serde(rename = "OriginatorConversationID")]
  pub originator_conversation_id: Option<String>,
  #[serde(rename = "ResultCode")]
  pub result_code: i32,
  #[serde(rename = "ResultDesc")]
  pub result_desc: Option<String>,
  #[serde(rename = "TransactionID")]
  pub transaction_id: Option<String>,
}

pub struct Withdrawal<'a> {
  db: &'a DatabaseConnection,
  locks: &'a UserLocks,
}

impl<'a> Withdrawal<'a> {
  pub fn new(db: &'a DatabaseConnection, locks: &'a UserLocks) -> Self {
    Self { db, locks }
  }

  /// Validate and submit a withdrawal. The balance is debited together
  /// with its ledger entry exactly when the payout is known to be moving:
  /// on gateway acceptance for M-Pesa, immediately for the manual path.
  pub async fn request(
    &self,
    gateway: &Daraja,
    user_id: i64,
    source: EarningSource,
    amount: i64,
    method: PaymentMethod,
    phone: &str,
  ) -> Result<withdrawal::Model> {
    if amount < MIN_WITHDRAWAL {
      return Err(Error::Validation(format!(
        "minimum withdrawal is {MIN_WITHDRAWAL}"
      )));
    }

    let _guard = self.locks.acquire(user_id).await;

    let user = user::Entity::find_by_id(user_id)
      .one(self.db)
      .await?
      .ok_or(Error::UserNotFound)?;

    if !user.is_activated {
      return Err(Error::Validation("account is not activated".into()));
    }

    let available = user.balance_for(&source);
    if amount > available {
      return Err(Error::InsufficientBalance { requested: amount, available });
    }

    let phone = match method {
      PaymentMethod::Mpesa => {
        utils::normalize_msisdn(phone).ok_or_else(|| {
          Error::Validation(format!("cannot normalize phone `{phone}`"))
        })?
      }
      PaymentMethod::Manual => phone.trim().to_string(),
    };

    let now = Utc::now().naive_utc();
    let record = withdrawal::ActiveModel {
      id: NotSet,
      user_id: Set(user_id),
      source: Set(source),
      amount: Set(amount),
      fee: Set(WITHDRAWAL_FEE),
      status: Set(WithdrawalStatus::Pending),
      method: Set(method.clone()),
      phone: Set(phone.clone()),
      conversation_id: Set(None),
      originator_id: Set(None),
      receipt: Set(None),
      failure_reason: Set(None),
      created_at: Set(now),
      updated_at: Set(now),
    }
    .insert(self.db)
    .await?;

    match method {
      PaymentMethod::Mpesa => {
        let net = amount - WITHDRAWAL_FEE;
        let remarks = format!("Balance withdrawal #{}", record.id);

        match gateway.request_disbursement(&phone, net, &remarks).await {
          Ok(accepted) => {
            self
              .settle_accepted(
                record,
                accepted.conversation_id,
                accepted.originator_conversation_id,
              )
              .await
          }
          Err(err) => {
            self.settle_rejected(record, &err.to_string()).await?;
            Err(err)
          }
        }
      }
      PaymentMethod::Manual => self.settle_manual(record).await,
    }
  }

  /// Reconcile a disbursement-result callback with its withdrawal record.
  pub async fn handle_result(&self, payload: json::Value) -> Result<()> {
    let envelope: ResultEnvelope =
      json::from_value(payload).map_err(|_| Error::MalformedCallback)?;
    let result = envelope.result;

    let record = withdrawal::Entity::find()
      .filter(
        withdrawal::Column::ConversationId.eq(result.conversation_id.clone()),
      )
      .one(self.db)
      .await?
      .ok_or(Error::UnknownTransaction)?;

    let _guard = self.locks.acquire(record.user_id).await;

    let record = withdrawal::Entity::find_by_id(record.id)
      .one(self.db)
      .await?
      .ok_or(Error::UnknownTransaction)?;

    if record.status != WithdrawalStatus::Processing {
      debug!("duplicate result for withdrawal #{}", record.id);
      return Ok(());
    }

    if result.result_code == 0 {
      let id = record.id;
      withdrawal::ActiveModel {
        status: Set(WithdrawalStatus::Completed),
        receipt: Set(result.transaction_id),
        updated_at: Set(Utc::now().naive_utc()),
        ..record.into()
      }
      .update(self.db)
      .await?;

      info!("withdrawal #{id} completed");
    } else {
      let reason = result
        .result_desc
        .unwrap_or_else(|| "disbursement failed".into());
      self.refund(record, &reason).await?;
    }

    Ok(())
  }

  pub async fn by_user(
    &self,
    user_id: i64,
    limit: u64,
  ) -> Result<Vec<withdrawal::Model>> {
    Ok(
      withdrawal::Entity::find()
        .filter(withdrawal::Column::UserId.eq(user_id))
        .order_by_desc(withdrawal::Column::CreatedAt)
        .limit(limit)
        .all(self.db)
        .await?,
    )
  }

  /// The gateway queued the disbursement: the money is moving, so the
  /// gross amount leaves the balance together with its ledger entry.
  pub(crate) async fn settle_accepted(
    &self,
    record: withdrawal::Model,
    conversation_id: String,
    originator_id: String,
  ) -> Result<withdrawal::Model> {
    let txn = self.db.begin().await?;

    let updated = withdrawal::ActiveModel {
      status: Set(WithdrawalStatus::Processing),
      conversation_id: Set(Some(conversation_id)),
      originator_id: Set(Some(originator_id)),
      updated_at: Set(Utc::now().naive_utc()),
      ..record.into()
    }
    .update(&txn)
    .await?;

    self.debit(&txn, &updated).await?;

    txn.commit().await?;
    Ok(updated)
  }

  pub(crate) async fn settle_rejected(
    &self,
    record: withdrawal::Model,
    reason: &str,
  ) -> Result<withdrawal::Model> {
    warn!("withdrawal #{} rejected by gateway: {reason}", record.id);

    Ok(
      withdrawal::ActiveModel {
        status: Set(WithdrawalStatus::Failed),
        failure_reason: Set(Some(reason.to_string())),
        updated_at: Set(Utc::now().naive_utc()),
        ..record.into()
      }
      .update(self.db)
      .await?,
    )
  }

  async fn settle_manual(
    &self,
    record: withdrawal::Model,
  ) -> Result<withdrawal::Model> {
    let txn = self.db.begin().await?;

    let updated = withdrawal::ActiveModel {
      status: Set(WithdrawalStatus::Completed),
      updated_at: Set(Utc::now().naive_utc()),
      ..record.into()
    }
    .update(&txn)
    .await?;

    self.debit(&txn, &updated).await?;

    txn.commit().await?;
    Ok(updated)
  }

  async fn debit<C: ConnectionTrait>(
    &self,
    conn: &C,
    record: &withdrawal::Model,
  ) -> Result<()> {
    let user = user::Entity::find_by_id(record.user_id)
      .one(conn)
      .await?
      .ok_or(Error::UserNotFound)?;

    let remaining = user.balance_for(&record.source) - record.amount;
    balance::with_balance(user, &record.source, remaining)
      .update(conn)
      .await?;

    earning::ActiveModel {
      id: NotSet,
      user_id: Set(record.user_id),
      source: Set(record.source.clone()),
      amount: Set(-record.amount),
      description: Set(Some(format!("Withdrawal #{}", record.id))),
      created_at: Set(Utc::now().naive_utc()),
    }
    .insert(conn)
    .await?;

    Ok(())
  }

  /// The provider rejected an already-debited payout: put the gross
  /// amount back and leave a reversal entry next to the original debit.
  async fn refund(
    &self,
    record: withdrawal::Model,
    reason: &str,
  ) -> Result<()> {
    let txn = self.db.begin().await?;

    let record = withdrawal::ActiveModel {
      status: Set(WithdrawalStatus::Failed),
      failure_reason: Set(Some(reason.to_string())),
      updated_at: Set(Utc::now().naive_utc()),
      ..record.into()
    }
    .update(&txn)
    .await?;

    let user = user::Entity::find_by_id(record.user_id)
      .one(&txn)
      .await?
      .ok_or(Error::UserNotFound)?;

    let restored = user.balance_for(&record.source) + record.amount;
    balance::with_balance(user, &record.source, restored)
      .update(&txn)
      .await?;

    earning::ActiveModel {
      id: NotSet,
      user_id: Set(record.user_id),
      source: Set(record.source.clone()),
      amount: Set(record.amount),
      description: Set(Some(format!("Withdrawal #{} reversal", record.id))),
      created_at: Set(Utc::now().naive_utc()),
    }
    .insert(&txn)
    .await?;

    txn.commit().await?;

    warn!("withdrawal #{} failed: {reason}", record.id);
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::sv::{User, test_utils::test_db};

  async fn funded_user(
    db: &DatabaseConnection,
    phone: &str,
    general: i64,
  ) -> user::Model {
    let user = User::new(db).register(phone, None).await.unwrap();
    user::ActiveModel {
      is_activated: Set(true),
      balance: Set(general),
      ..user.into()
    }
    .update(db)
    .await
    .unwrap()
  }

  async fn manual_request(
    db: &DatabaseConnection,
    locks: &UserLocks,
    user_id: i64,
    amount: i64,
  ) -> Result<withdrawal::Model> {
    Withdrawal::new(db, locks)
      .request(
        &Daraja::from_env(),
        user_id,
        EarningSource::Referral,
        amount,
        PaymentMethod::Manual,
        "0712345678",
      )
      .await
  }

  #[tokio::test]
  async fn test_rejects_below_minimum() {
    let db = test_db::setup().await;
    let locks = UserLocks::default();
    let user = funded_user(&db, "0712345678", 1000).await;

    let result = manual_request(&db, &locks, user.id, MIN_WITHDRAWAL - 1).await;

    assert!(matches!(result, Err(Error::Validation(_))));
    assert!(withdrawal::Entity::find().all(&db).await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_rejects_insufficient_balance_without_mutation() {
    let db = test_db::setup().await;
    let locks = UserLocks::default();
    let user = funded_user(&db, "0712345678", 500).await;

    let result = manual_request(&db, &locks, user.id, 1000).await;

    assert!(matches!(
      result,
      Err(Error::InsufficientBalance { requested: 1000, available: 500 })
    ));

    let user =
      user::Entity::find_by_id(user.id).one(&db).await.unwrap().unwrap();
    assert_eq!(user.balance, 500);
    assert!(withdrawal::Entity::find().all(&db).await.unwrap().is_empty());
    assert!(earning::Entity::find().all(&db).await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_manual_path_completes_and_debits() {
    let db = test_db::setup().await;
    let locks = UserLocks::default();
    let user = funded_user(&db, "0712345678", 1000).await;

    let record = manual_request(&db, &locks, user.id, 400).await.unwrap();

    assert_eq!(record.status, WithdrawalStatus::Completed);
    assert_eq!(record.amount, 400);
    assert_eq!(record.fee, WITHDRAWAL_FEE);

    let user =
      user::Entity::find_by_id(user.id).one(&db).await.unwrap().unwrap();
    assert_eq!(user.balance, 600);

    let debits = earning::Entity::find().all(&db).await.unwrap();
    assert_eq!(debits.len(), 1);
    assert_eq!(debits[0].amount, -400);
    assert_eq!(debits[0].source, EarningSource::Referral);
  }

  #[tokio::test]
  async fn test_gateway_acceptance_debits_gross() {
    let db = test_db::setup().await;
    let locks = UserLocks::default();
    let user = funded_user(&db, "0712345678", 1000).await;

    let now = Utc::now().naive_utc();
    let record = withdrawal::ActiveModel {
      id: NotSet,
      user_id: Set(user.id),
      source: Set(EarningSource::Referral),
      amount: Set(400),
      fee: Set(WITHDRAWAL_FEE),
      status: Set(WithdrawalStatus::Pending),
      method: Set(PaymentMethod::Mpesa),
      phone: Set("254712345678".into()),
      conversation_id: Set(None),
      originator_id: Set(None),
      receipt: Set(None),
      failure_reason: Set(None),
      created_at: Set(now),
      updated_at: Set(now),
    }
    .insert(&db)
    .await
    .unwrap();

    let record = Withdrawal::new(&db, &locks)
      .settle_accepted(record, "AG_1".into(), "29112-1".into())
      .await
      .unwrap();

    assert_eq!(record.status, WithdrawalStatus::Processing);
    assert_eq!(record.conversation_id.as_deref(), Some("AG_1"));

    let user =
      user::Entity::find_by_id(user.id).one(&db).await.unwrap().unwrap();
    assert_eq!(user.balance, 600);

    let debits = earning::Entity::find().all(&db).await.unwrap();
    assert_eq!(debits.len(), 1);
    assert_eq!(debits[0].amount, -400);
  }

  #[tokio::test]
  async fn test_gateway_rejection_leaves_balance_untouched() {
    let db = test_db::setup().await;
    let locks = UserLocks::default();
    let user = funded_user(&db, "0712345678", 1000).await;

    let now = Utc::now().naive_utc();
    let record = withdrawal::ActiveModel {
      id: NotSet,
      user_id: Set(user.id),
      source: Set(EarningSource::Referral),
      amount: Set(400),
      fee: Set(WITHDRAWAL_FEE),
      status: Set(WithdrawalStatus::Pending),
      method: Set(PaymentMethod::Mpesa),
      phone: Set("254712345678".into()),
      conversation_id: Set(None),
      originator_id: Set(None),
      receipt: Set(None),
      failure_reason: Set(None),
      created_at: Set(now),
      updated_at: Set(now),
    }
    .insert(&db)
    .await
    .unwrap();

    let record = Withdrawal::new(&db, &locks)
      .settle_rejected(record, "insufficient float")
      .await
      .unwrap();

    assert_eq!(record.status, WithdrawalStatus::Failed);
    assert_eq!(record.failure_reason.as_deref(), Some("insufficient float"));

    let user =
      user::Entity::find_by_id(user.id).one(&db).await.unwrap().unwrap();
    assert_eq!(user.balance, 1000);
    assert!(earning::Entity::find().all(&db).await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_result_callback_completes_processing_record() {
    let db = test_db::setup().await;
    let locks = UserLocks::default();
    let user = funded_user(&db, "0712345678", 1000).await;

    let now = Utc::now().naive_utc();
    let record = withdrawal::ActiveModel {
      id: NotSet,
      user_id: Set(user.id),
      source: Set(EarningSource::Referral),
      amount: Set(400),
      fee: Set(WITHDRAWAL_FEE),
      status: Set(WithdrawalStatus::Processing),
      method: Set(PaymentMethod::Mpesa),
      phone: Set("254712345678".into()),
      conversation_id: Set(Some("AG_1".into())),
      originator_id: Set(Some("29112-1".into())),
      receipt: Set(None),
      failure_reason: Set(None),
      created_at: Set(now),
      updated_at: Set(now),
    }
    .insert(&db)
    .await
    .unwrap();

    Withdrawal::new(&db, &locks)
      .handle_result(json::json!({
        "Result": {
          "ConversationID": "AG_1",
          "OriginatorConversationID": "29112-1",
          "ResultCode": 0,
          "ResultDesc": "The service request is processed successfully.",
          "TransactionID": "RKT99999",
        }
      }))
      .await
      .unwrap();

    let record = withdrawal::Entity::find_by_id(record.id)
      .one(&db)
      .await
      .unwrap()
      .unwrap();
    assert_eq!(record.status, WithdrawalStatus::Completed);
    assert_eq!(record.receipt.as_deref(), Some("RKT99999"));
  }

  #[tokio::test]
  async fn test_result_callback_failure_refunds_balance() {
    let db = test_db::setup().await;
    let locks = UserLocks::default();
    // Already debited at acceptance time: 1000 - 400 on the counter.
    let user = funded_user(&db, "0712345678", 600).await;

    let now = Utc::now().naive_utc();
    withdrawal::ActiveModel {
      id: NotSet,
      user_id: Set(user.id),
      source: Set(EarningSource::Referral),
      amount: Set(400),
      fee: Set(WITHDRAWAL_FEE),
      status: Set(WithdrawalStatus::Processing),
      method: Set(PaymentMethod::Mpesa),
      phone: Set("254712345678".into()),
      conversation_id: Set(Some("AG_1".into())),
      originator_id: Set(Some("29112-1".into())),
      receipt: Set(None),
      failure_reason: Set(None),
      created_at: Set(now),
      updated_at: Set(now),
    }
    .insert(&db)
    .await
    .unwrap();

    Withdrawal::new(&db, &locks)
      .handle_result(json::json!({
        "Result": {
          "ConversationID": "AG_1",
          "OriginatorConversationID": "29112-1",
          "ResultCode": 2001,
          "ResultDesc": "The initiator information is invalid.",
        }
      }))
      .await
      .unwrap();

    let user =
      user::Entity::find_by_id(user.id).one(&db).await.unwrap().unwrap();
    assert_eq!(user.balance, 1000);

    let reversal = earning::Entity::find().all(&db).await.unwrap();
    assert_eq!(reversal.len(), 1);
    assert_eq!(reversal[0].amount, 400);
  }

  #[tokio::test]
  async fn test_requires_activation() {
    let db = test_db::setup().await;
    let locks = UserLocks::default();
    let user = User::new(&db).register("0712345678", None).await.unwrap();

    let result = manual_request(&db, &locks, user.id, 400).await;

    assert!(matches!(result, Err(Error::Validation(_))));
  }
}
