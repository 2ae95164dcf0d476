use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde::Serialize;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
  #[error("user not found")]
  UserNotFound,
  #[error("referrer not found")]
  ReferrerNotFound,
  #[error("{0}")]
  Validation(String),
  #[error("insufficient balance: requested {requested}, available {available}")]
  InsufficientBalance { requested: i64, available: i64 },
  #[error("an activation payment is already awaiting its callback")]
  DuplicatePendingActivation,
  #[error("no transaction matches the correlation identifier")]
  UnknownTransaction,
  #[error("paid amount {paid} does not match expected {expected}")]
  AmountMismatch { expected: i64, paid: i64 },
  #[error("malformed callback payload")]
  MalformedCallback,
  #[error("gateway not configured: {0}")]
  Configuration(&'static str),
  #[error("gateway error: {0}")]
  Gateway(String),
  #[error(transparent)]
  Db(#[from] sea_orm::DbErr),
}

impl Error {
  /// Whether retrying the same request later can reasonably succeed.
  pub fn retryable(&self) -> bool {
    matches!(self, Error::Gateway(_) | Error::Db(_))
  }

  fn status(&self) -> StatusCode {
    match self {
      Error::UserNotFound
      | Error::ReferrerNotFound
      | Error::UnknownTransaction => StatusCode::NOT_FOUND,
      Error::Validation(_)
      | Error::InsufficientBalance { .. }
      | Error::AmountMismatch { .. }
      | Error::MalformedCallback => StatusCode::BAD_REQUEST,
      Error::DuplicatePendingActivation => StatusCode::CONFLICT,
      Error::Configuration(_) | Error::Db(_) => {
        StatusCode::INTERNAL_SERVER_ERROR
      }
      Error::Gateway(_) => StatusCode::BAD_GATEWAY,
    }
  }
}

#[derive(Serialize)]
struct ErrorBody {
  success: bool,
  msg: String,
  retryable: bool,
}

impl IntoResponse for Error {
  fn into_response(self) -> Response {
    let body = ErrorBody {
      success: false,
      msg: self.to_string(),
      retryable: self.retryable(),
    };

    (self.status(), Json(body)).into_response()
  }
}
