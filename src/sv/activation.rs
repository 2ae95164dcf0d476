use serde::Deserialize;

use crate::{
  entity::{PaymentStatus, payment_transaction, user},
  prelude::*,
  state::UserLocks,
  sv::{Daraja, Referral},
  utils,
};

/// One-time account activation fee, in KES.
pub const ACTIVATION_FEE: i64 = 250;

/// Pending transactions older than this are eligible for the
/// reconciliation sweep.
pub const STALE_AFTER_MINUTES: i64 = 15;

/// STK callback envelope as delivered by the gateway.
#[derive(Debug, Deserialize)]
pub struct CallbackEnvelope {
  #[serde(rename = "Body")]
  pub body: CallbackBody,
}

#[derive(Debug, Deserialize)]
pub struct CallbackBody {
  #[serde(rename = "stkCallback")]
  pub stk: StkCallback,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
pub struct StkCallback {
  #[serde(rename = "MerchantRequestID")]
  pub merchant_request_id: Option<String>,
  #[serde(rename = "CheckoutRequestID")]
  pub checkout_request_id: String,
  #[serde(rename = "ResultCode")]
  pub result_code: i32,
  #[serde(rename = "ResultDesc")]
  pub result_desc: Option<String>,
  #[serde(rename = "CallbackMetadata")]
  pub metadata: Option<CallbackMetadata>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackMetadata {
  #[serde(rename = "Item")]
  pub items: Vec<MetadataItem>,
}

#[derive(Debug, Deserialize)]
pub struct MetadataItem {
  #[serde(rename = "Name")]
  pub name: String,
  #[serde(rename = "Value", default)]
  pub value: Option<json::Value>,
}

impl StkCallback {
  fn item(&self, name: &str) -> Option<&json::Value> {
    self
      .metadata
      .as_ref()?
      .items
      .iter()
      .find(|item| item.name == name)?
      .value
      .as_ref()
  }

  /// Paid amount from the metadata list, in whole KES.
  pub fn amount(&self) -> Option<i64> {
    self.item("Amount")?.as_f64().map(|v| v as i64)
  }

  pub fn receipt(&self) -> Option<String> {
    self.item("MpesaReceiptNumber")?.as_str().map(str::to_string)
  }
}

pub struct Activation<'a> {
  db: &'a DatabaseConnection,
  locks: &'a UserLocks,
}

impl<'a> Activation<'a> {
  pub fn new(db: &'a DatabaseConnection, locks: &'a UserLocks) -> Self {
    Self { db, locks }
  }

  /// Start an activation attempt: charge the fee to `phone` via an STK
  /// push and track the gateway correlation id on the transaction row.
  pub async fn initiate(
    &self,
    gateway: &Daraja,
    user_id: i64,
    phone: &str,
  ) -> Result<payment_transaction::Model> {
    let _guard = self.locks.acquire(user_id).await;

    let user = user::Entity::find_by_id(user_id)
      .one(self.db)
      .await?
      .ok_or(Error::UserNotFound)?;

    if user.is_activated {
      return Err(Error::Validation("account is already activated".into()));
    }

    let msisdn = utils::normalize_msisdn(phone).ok_or_else(|| {
      Error::Validation(format!("cannot normalize phone `{phone}`"))
    })?;

    // A prior attempt still awaiting its callback blocks a new one; a
    // terminal last attempt means the previous request went stale.
    if let Some(last) = self.latest_attempt(user_id).await?
      && last.status == PaymentStatus::Pending
      && last.checkout_request_id.is_some()
    {
      return Err(Error::DuplicatePendingActivation);
    }

    let now = Utc::now().naive_utc();
    let tx = payment_transaction::ActiveModel {
      id: NotSet,
      user_id: Set(user_id),
      amount: Set(ACTIVATION_FEE),
      status: Set(PaymentStatus::Pending),
      merchant_request_id: Set(None),
      checkout_request_id: Set(None),
      result_code: Set(None),
      result_desc: Set(None),
      receipt: Set(None),
      created_at: Set(now),
      updated_at: Set(now),
    }
    .insert(self.db)
    .await?;

    let reference = format!("ACT-{}", tx.id);
    match gateway.request_collection(&msisdn, ACTIVATION_FEE, &reference).await
    {
      Ok(accepted) => {
        info!(
          "activation #{} for user #{user_id} accepted: {}",
          tx.id, accepted.checkout_request_id
        );

        Ok(
          payment_transaction::ActiveModel {
            merchant_request_id: Set(Some(accepted.merchant_request_id)),
            checkout_request_id: Set(Some(accepted.checkout_request_id)),
            updated_at: Set(Utc::now().naive_utc()),
            ..tx.into()
          }
          .update(self.db)
          .await?,
        )
      }
      Err(err) => {
        payment_transaction::ActiveModel {
          status: Set(PaymentStatus::Failed),
          result_desc: Set(Some(err.to_string())),
          updated_at: Set(Utc::now().naive_utc()),
          ..tx.into()
        }
        .update(self.db)
        .await?;

        Err(err)
      }
    }
  }

  /// Process an asynchronous STK outcome. Idempotent against duplicate
  /// delivery: only a transaction still in `pending` can activate its
  /// user, and the reward engine never re-activates a paid edge.
  pub async fn handle_callback(&self, payload: json::Value) -> Result<()> {
    let envelope: CallbackEnvelope =
      json::from_value(payload).map_err(|_| Error::MalformedCallback)?;
    let stk = envelope.body.stk;

    let tx = payment_transaction::Entity::find()
      .filter(
        payment_transaction::Column::CheckoutRequestId
          .eq(stk.checkout_request_id.clone()),
      )
      .one(self.db)
      .await?
      .ok_or(Error::UnknownTransaction)?;

    let _guard = self.locks.acquire(tx.user_id).await;

    // Re-read under the lock; a duplicate may have settled it first.
    let tx = payment_transaction::Entity::find_by_id(tx.id)
      .one(self.db)
      .await?
      .ok_or(Error::UnknownTransaction)?;
    let user_id = tx.user_id;

    if tx.status != PaymentStatus::Pending {
      self.resolve(tx, None, &stk, None).await?;
      debug!(
        "duplicate callback for settled transaction {}",
        stk.checkout_request_id
      );
      return Ok(());
    }

    if stk.result_code == 0 {
      let paid = stk.amount();
      if paid != Some(tx.amount) {
        let expected = tx.amount;
        self
          .resolve(tx, Some(PaymentStatus::Failed), &stk, Some("amount mismatch"))
          .await?;

        return Err(Error::AmountMismatch {
          expected,
          paid: paid.unwrap_or(0),
        });
      }

      self.resolve(tx, Some(PaymentStatus::Completed), &stk, None).await?;

      match user::Entity::find_by_id(user_id).one(self.db).await? {
        Some(user) => {
          user::ActiveModel { is_activated: Set(true), ..user.into() }
            .update(self.db)
            .await?;

          info!("user #{user_id} activated");
          Referral::new(self.db, self.locks).on_user_activated(user_id).await?;
        }
        None => {
          warn!("no user for activation {}", stk.checkout_request_id);
        }
      }
    } else {
      self.resolve(tx, Some(PaymentStatus::Failed), &stk, None).await?;
      self.reset_user(user_id).await?;
    }

    Ok(())
  }

  /// Sweep `pending` transactions whose callback never arrived and ask
  /// the gateway what became of them. Definitive rejections are marked
  /// failed, which unblocks a fresh activation attempt for the user.
  pub async fn reconcile_stale(&self, gateway: &Daraja) -> Result<u64> {
    let mut swept = 0;

    for stale in self.stale_pending(STALE_AFTER_MINUTES).await? {
      let Some(checkout_id) = stale.checkout_request_id.clone() else {
        continue;
      };

      let status = match gateway.query_collection(&checkout_id).await {
        Ok(status) => status,
        Err(err) => {
          debug!("status query for {checkout_id} failed: {err}");
          continue;
        }
      };

      let code = status.result_code.as_deref().unwrap_or("");
      if code == "0" || code.is_empty() {
        continue;
      }

      let _guard = self.locks.acquire(stale.user_id).await;

      let Some(tx) =
        payment_transaction::Entity::find_by_id(stale.id).one(self.db).await?
      else {
        continue;
      };
      if tx.status != PaymentStatus::Pending {
        continue;
      }

      payment_transaction::ActiveModel {
        status: Set(PaymentStatus::Failed),
        result_code: Set(code.parse().ok()),
        result_desc: Set(status.result_desc),
        updated_at: Set(Utc::now().naive_utc()),
        ..tx.into()
      }
      .update(self.db)
      .await?;

      info!("reconciliation failed stale activation {checkout_id}");
      swept += 1;
    }

    Ok(swept)
  }

  pub async fn latest_attempt(
    &self,
    user_id: i64,
  ) -> Result<Option<payment_transaction::Model>> {
    Ok(
      payment_transaction::Entity::find()
        .filter(payment_transaction::Column::UserId.eq(user_id))
        .order_by_desc(payment_transaction::Column::Id)
        .one(self.db)
        .await?,
    )
  }

  pub async fn stale_pending(
    &self,
    older_than_minutes: i64,
  ) -> Result<Vec<payment_transaction::Model>> {
    let cutoff =
      Utc::now().naive_utc() - chrono::Duration::minutes(older_than_minutes);

    Ok(
      payment_transaction::Entity::find()
        .filter(payment_transaction::Column::Status.eq(PaymentStatus::Pending))
        .filter(payment_transaction::Column::CreatedAt.lt(cutoff))
        .all(self.db)
        .await?,
    )
  }

  /// Record the callback's result fields; `status` of `None` keeps the
  /// transaction's current state.
  async fn resolve(
    &self,
    tx: payment_transaction::Model,
    status: Option<PaymentStatus>,
    stk: &StkCallback,
    reason: Option<&str>,
  ) -> Result<payment_transaction::Model> {
    let desc = reason
      .map(str::to_string)
      .or_else(|| stk.result_desc.clone())
      .or(tx.result_desc.clone());
    let receipt = stk.receipt().or(tx.receipt.clone());
    let status = status.unwrap_or_else(|| tx.status.clone());

    Ok(
      payment_transaction::ActiveModel {
        status: Set(status),
        result_code: Set(Some(stk.result_code)),
        result_desc: Set(desc),
        receipt: Set(receipt),
        updated_at: Set(Utc::now().naive_utc()),
        ..tx.into()
      }
      .update(self.db)
      .await?,
    )
  }

  /// Failure path: the fee never arrived, so the account goes back to
  /// square one with every counter zeroed.
  async fn reset_user(&self, user_id: i64) -> Result<()> {
    let Some(user) = user::Entity::find_by_id(user_id).one(self.db).await?
    else {
      return Ok(());
    };

    user::ActiveModel {
      is_activated: Set(false),
      balance: Set(0),
      ads_balance: Set(0),
      videos_balance: Set(0),
      surveys_balance: Set(0),
      offers_balance: Set(0),
      ..user.into()
    }
    .update(self.db)
    .await?;

    warn!("activation failed, user #{user_id} reset");
    Ok(())
  }
}
