use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
};
use serde::{Deserialize, Serialize};

use crate::{
  entity::{EarningSource, PaymentMethod, earning, user, withdrawal},
  prelude::*,
  state::AppState,
  sv,
};

const HISTORY_LIMIT: u64 = 50;

pub async fn health() -> &'static str {
  "OK"
}

#[derive(Debug, Deserialize)]
pub struct RegisterReq {
  pub phone: String,
  pub referral_code: Option<String>,
}

pub async fn register(
  State(app): State<Arc<AppState>>,
  Json(req): Json<RegisterReq>,
) -> Result<Json<user::Model>> {
  let user = sv::User::new(&app.db)
    .register(&req.phone, req.referral_code.as_deref())
    .await?;

  Ok(Json(user))
}

#[derive(Debug, Deserialize)]
pub struct ActivateReq {
  pub user_id: i64,
  pub phone: String,
}

#[derive(Debug, Serialize)]
pub struct ActivateResp {
  pub transaction_id: i32,
  pub merchant_request_id: Option<String>,
  pub checkout_request_id: Option<String>,
}

pub async fn activate(
  State(app): State<Arc<AppState>>,
  Json(req): Json<ActivateReq>,
) -> Result<Json<ActivateResp>> {
  let tx = sv::Activation::new(&app.db, &app.locks)
    .initiate(&app.gateway, req.user_id, &req.phone)
    .await?;

  Ok(Json(ActivateResp {
    transaction_id: tx.id,
    merchant_request_id: tx.merchant_request_id,
    checkout_request_id: tx.checkout_request_id,
  }))
}

#[derive(Debug, Deserialize)]
pub struct CompleteTaskReq {
  pub user_id: i64,
  pub source: EarningSource,
}

#[derive(Debug, Serialize)]
pub struct BalanceResp {
  pub user_id: i64,
  pub source: EarningSource,
  pub balance: i64,
}

pub async fn complete_task(
  State(app): State<Arc<AppState>>,
  Json(req): Json<CompleteTaskReq>,
) -> Result<Json<BalanceResp>> {
  let balance = sv::Balance::new(&app.db)
    .credit_task(req.user_id, req.source.clone())
    .await?;

  Ok(Json(BalanceResp { user_id: req.user_id, source: req.source, balance }))
}

#[derive(Debug, Deserialize)]
pub struct WithdrawReq {
  pub user_id: i64,
  pub source: EarningSource,
  pub amount: i64,
  pub method: PaymentMethod,
  pub phone: String,
}

pub async fn withdraw(
  State(app): State<Arc<AppState>>,
  Json(req): Json<WithdrawReq>,
) -> Result<Json<withdrawal::Model>> {
  let record = sv::Withdrawal::new(&app.db, &app.locks)
    .request(
      &app.gateway,
      req.user_id,
      req.source,
      req.amount,
      req.method,
      &req.phone,
    )
    .await?;

  Ok(Json(record))
}

pub async fn get_user(
  State(app): State<Arc<AppState>>,
  Path(user_id): Path<i64>,
) -> Result<Json<user::Model>> {
  let user =
    sv::User::new(&app.db).by_id(user_id).await?.ok_or(Error::UserNotFound)?;

  Ok(Json(user))
}

pub async fn earnings(
  State(app): State<Arc<AppState>>,
  Path(user_id): Path<i64>,
) -> Result<Json<Vec<earning::Model>>> {
  let entries =
    sv::Balance::new(&app.db).earnings(user_id, HISTORY_LIMIT).await?;

  Ok(Json(entries))
}

pub async fn withdrawals(
  State(app): State<Arc<AppState>>,
  Path(user_id): Path<i64>,
) -> Result<Json<Vec<withdrawal::Model>>> {
  let records = sv::Withdrawal::new(&app.db, &app.locks)
    .by_user(user_id, HISTORY_LIMIT)
    .await?;

  Ok(Json(records))
}

pub async fn referral_stats(
  State(app): State<Arc<AppState>>,
  Path(user_id): Path<i64>,
) -> Result<Json<sv::referral::ReferralStats>> {
  let stats =
    sv::Referral::new(&app.db, &app.locks).stats(user_id).await?;

  Ok(Json(stats))
}

/// Acknowledgment the gateway expects on its callback routes.
#[derive(Debug, Serialize)]
pub struct CallbackAck {
  #[serde(rename = "ResultCode")]
  pub result_code: i32,
  #[serde(rename = "ResultDesc")]
  pub result_desc: String,
}

impl CallbackAck {
  fn accepted() -> Self {
    Self { result_code: 0, result_desc: "Accepted".into() }
  }

  fn rejected() -> Self {
    Self { result_code: 1, result_desc: "Rejected".into() }
  }
}

/// Structurally valid payloads are always acknowledged, even when local
/// processing failed, so the provider does not retry-storm the route.
pub async fn stk_callback(
  State(app): State<Arc<AppState>>,
  Json(payload): Json<json::Value>,
) -> (StatusCode, Json<CallbackAck>) {
  match sv::Activation::new(&app.db, &app.locks).handle_callback(payload).await
  {
    Ok(()) => (StatusCode::OK, Json(CallbackAck::accepted())),
    Err(Error::MalformedCallback) => {
      (StatusCode::BAD_REQUEST, Json(CallbackAck::rejected()))
    }
    Err(err) => {
      error!("stk callback processing failed: {err}");
      (StatusCode::OK, Json(CallbackAck::accepted()))
    }
  }
}

pub async fn b2c_callback(
  State(app): State<Arc<AppState>>,
  Json(payload): Json<json::Value>,
) -> (StatusCode, Json<CallbackAck>) {
  match sv::Withdrawal::new(&app.db, &app.locks).handle_result(payload).await {
    Ok(()) => (StatusCode::OK, Json(CallbackAck::accepted())),
    Err(Error::MalformedCallback) => {
      (StatusCode::BAD_REQUEST, Json(CallbackAck::rejected()))
    }
    Err(err) => {
      error!("b2c callback processing failed: {err}");
      (StatusCode::OK, Json(CallbackAck::accepted()))
    }
  }
}
