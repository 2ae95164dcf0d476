//! Safaricom Daraja API integration for mobile-money payments
//! API docs: https://developer.safaricom.co.ke/APIs
//!
//! Collections (STK push) charge the one-time activation fee to the
//! subscriber; disbursements (B2C) pay withdrawals out. Both flows are
//! asynchronous: an accepted request only means the gateway queued it,
//! and the definitive outcome arrives later on the callback routes.

#![allow(dead_code)]

use std::env;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use reqwest::Client;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{prelude::*, utils};

pub const SANDBOX_URL: &str = "https://sandbox.safaricom.co.ke";
pub const PRODUCTION_URL: &str = "https://api.safaricom.co.ke";

/// Correlation identifiers returned for an accepted STK push.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionResponse {
  #[serde(rename = "MerchantRequestID")]
  pub merchant_request_id: String,
  #[serde(rename = "CheckoutRequestID")]
  pub checkout_request_id: String,
  #[serde(rename = "ResponseCode")]
  pub response_code: String,
  #[serde(rename = "ResponseDescription")]
  pub response_description: String,
  #[serde(rename = "CustomerMessage")]
  pub customer_message: Option<String>,
}

/// Correlation identifiers returned for an accepted B2C payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisbursementResponse {
  #[serde(rename = "ConversationID")]
  pub conversation_id: String,
  #[serde(rename = "OriginatorConversationID")]
  pub originator_conversation_id: String,
  #[serde(rename = "ResponseCode")]
  pub response_code: String,
  #[serde(rename = "ResponseDescription")]
  pub response_description: String,
}

/// Outcome of an STK status query.
#[derive(Debug, Clone, Deserialize)]
pub struct CollectionStatus {
  #[serde(rename = "ResponseCode")]
  pub response_code: String,
  #[serde(rename = "ResultCode")]
  pub result_code: Option<String>,
  #[serde(rename = "ResultDesc")]
  pub result_desc: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
  access_token: String,
}

/// Daraja client. Credentials are optional at construction so the server
/// can boot without them; calls then reject with a configuration error.
#[derive(Clone)]
pub struct Daraja {
  client: Client,
  base_url: String,
  consumer_key: Option<String>,
  consumer_secret: Option<String>,
  shortcode: String,
  passkey: Option<String>,
  initiator_name: Option<String>,
  security_credential: Option<String>,
  b2c_shortcode: String,
  callback_base: String,
}

impl Daraja {
  pub fn from_env() -> Self {
    let base_url = match env::var("DARAJA_ENV").as_deref() {
      Ok("production") => PRODUCTION_URL.to_string(),
      _ => SANDBOX_URL.to_string(),
    };

    let shortcode =
      env::var("DARAJA_SHORTCODE").unwrap_or_else(|_| "174379".into());
    let b2c_shortcode =
      env::var("DARAJA_B2C_SHORTCODE").unwrap_or_else(|_| shortcode.clone());

    Self {
      client: Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .expect("failed to build HTTP client"),
      base_url,
      consumer_key: env::var("DARAJA_CONSUMER_KEY").ok(),
      consumer_secret: env::var("DARAJA_CONSUMER_SECRET").ok(),
      shortcode,
      passkey: env::var("DARAJA_PASSKEY").ok(),
      initiator_name: env::var("DARAJA_INITIATOR_NAME").ok(),
      security_credential: env::var("DARAJA_SECURITY_CREDENTIAL").ok(),
      b2c_shortcode,
      callback_base: env::var("CALLBACK_BASE_URL")
        .unwrap_or_else(|_| "http://localhost:3000".into()),
    }
  }

  pub fn collection_ready(&self) -> bool {
    self.consumer_key.is_some()
      && self.consumer_secret.is_some()
      && self.passkey.is_some()
  }

  pub fn disbursement_ready(&self) -> bool {
    self.consumer_key.is_some()
      && self.consumer_secret.is_some()
      && self.initiator_name.is_some()
      && self.security_credential.is_some()
  }

  fn credentials(&self) -> Result<(&str, &str)> {
    match (&self.consumer_key, &self.consumer_secret) {
      (Some(key), Some(secret)) => Ok((key, secret)),
      _ => Err(Error::Configuration(
        "DARAJA_CONSUMER_KEY / DARAJA_CONSUMER_SECRET not set",
      )),
    }
  }

  /// STK password: base64 of shortcode + passkey + timestamp.
  fn password(&self, timestamp: &str) -> Result<String> {
    let passkey = self
      .passkey
      .as_deref()
      .ok_or(Error::Configuration("DARAJA_PASSKEY not set"))?;

    Ok(BASE64.encode(format!("{}{}{}", self.shortcode, passkey, timestamp)))
  }

  async fn access_token(&self) -> Result<String> {
    let (key, secret) = self.credentials()?;
    let url =
      format!("{}/oauth/v1/generate?grant_type=client_credentials", self.base_url);

    let response = self
      .client
      .get(&url)
      .basic_auth(key, Some(secret))
      .send()
      .await
      .map_err(|e| Error::Gateway(format!("token request failed: {e}")))?;

    if !response.status().is_success() {
      return Err(Error::Gateway(format!(
        "token request rejected: {}",
        response.status()
      )));
    }

    let token: TokenResponse = response.json().await.map_err(|e| {
      Error::Gateway(format!("failed to parse token response: {e}"))
    })?;

    Ok(token.access_token)
  }

  async fn post<T: DeserializeOwned>(
    &self,
    path: &str,
    token: &str,
    body: &json::Value,
  ) -> Result<T> {
    let url = format!("{}{}", self.base_url, path);

    let response = self
      .client
      .post(&url)
      .bearer_auth(token)
      .json(body)
      .send()
      .await
      .map_err(|e| Error::Gateway(format!("request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
      let detail = response.text().await.unwrap_or_default();
      return Err(Error::Gateway(format!("gateway returned {status}: {detail}")));
    }

    response
      .json()
      .await
      .map_err(|e| Error::Gateway(format!("failed to parse response: {e}")))
  }

  /// Initiate an STK push charging `amount` to `phone`. A success return
  /// only means the gateway accepted the request for processing; the
  /// outcome arrives on the STK callback route.
  pub async fn request_collection(
    &self,
    phone: &str,
    amount: i64,
    reference: &str,
  ) -> Result<CollectionResponse> {
    validate_msisdn(phone)?;

    let timestamp = Utc::now().format("%Y%m%d%H%M%S").to_string();
    let password = self.password(&timestamp)?;
    let token = self.access_token().await?;

    let body = json::json!({
      "BusinessShortCode": self.shortcode,
      "Password": password,
      "Timestamp": timestamp,
      "TransactionType": "CustomerPayBillOnline",
      "Amount": amount,
      "PartyA": phone,
      "PartyB": self.shortcode,
      "PhoneNumber": phone,
      "CallBackURL": format!("{}/api/callbacks/stk", self.callback_base),
      "AccountReference": reference,
      "TransactionDesc": "Account activation",
    });

    let response: CollectionResponse =
      self.post("/mpesa/stkpush/v1/processrequest", &token, &body).await?;

    if response.response_code != "0" {
      return Err(Error::Gateway(format!(
        "collection rejected: {}",
        response.response_description
      )));
    }

    Ok(response)
  }

  /// Queue a B2C payment of `amount` to `phone`. Requires the initiator
  /// identity on top of the API key pair.
  pub async fn request_disbursement(
    &self,
    phone: &str,
    amount: i64,
    remarks: &str,
  ) -> Result<DisbursementResponse> {
    validate_msisdn(phone)?;

    let initiator = self
      .initiator_name
      .as_deref()
      .ok_or(Error::Configuration("DARAJA_INITIATOR_NAME not set"))?;
    let credential = self
      .security_credential
      .as_deref()
      .ok_or(Error::Configuration("DARAJA_SECURITY_CREDENTIAL not set"))?;
    let token = self.access_token().await?;

    let body = json::json!({
      "InitiatorName": initiator,
      "SecurityCredential": credential,
      "CommandID": "BusinessPayment",
      "Amount": amount,
      "PartyA": self.b2c_shortcode,
      "PartyB": phone,
      "Remarks": remarks,
      "QueueTimeOutURL": format!("{}/api/callbacks/b2c", self.callback_base),
      "ResultURL": format!("{}/api/callbacks/b2c", self.callback_base),
      "Occasion": "",
    });

    let response: DisbursementResponse =
      self.post("/mpesa/b2c/v1/paymentrequest", &token, &body).await?;

    if response.response_code != "0" {
      return Err(Error::Gateway(format!(
        "disbursement rejected: {}",
        response.response_description
      )));
    }

    Ok(response)
  }

  /// Query the outcome of an earlier STK push. Used by the reconciliation
  /// sweep for transactions whose callback never arrived.
  pub async fn query_collection(
    &self,
    checkout_request_id: &str,
  ) -> Result<CollectionStatus> {
    let timestamp = Utc::now().format("%Y%m%d%H%M%S").to_string();
    let password = self.password(&timestamp)?;
    let token = self.access_token().await?;

    let body = json::json!({
      "BusinessShortCode": self.shortcode,
      "Password": password,
      "Timestamp": timestamp,
      "CheckoutRequestID": checkout_request_id,
    });

    self.post("/mpesa/stkpushquery/v1/query", &token, &body).await
  }
}

/// The gateway only accepts 12-digit `254`-prefixed subscriber numbers.
pub fn validate_msisdn(phone: &str) -> Result<()> {
  if utils::is_valid_msisdn(phone) {
    Ok(())
  } else {
    Err(Error::Validation(format!(
      "invalid msisdn `{phone}`, expected 254XXXXXXXXX"
    )))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_validate_msisdn() {
    assert!(validate_msisdn("254712345678").is_ok());
    assert!(validate_msisdn("0712345678").is_err());
    assert!(validate_msisdn("+254712345678").is_err());
    assert!(validate_msisdn("254712345").is_err());
  }
}
