//! Client for the crypto invoice processor.

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use serde_json::json;
use tracing::instrument;

use crate::http::ClientError;
use crate::http::absent_on_error;
use crate::models::Invoice;
use crate::models::InvoiceBatch;
use crate::models::InvoiceRequest;

const TOKEN_HEADER: &str = "Crypto-Pay-API-Token";

#[async_trait]
pub trait Payments: Send + Sync {
  async fn create_invoice(&self, request: &InvoiceRequest) -> Option<Invoice>;
  async fn invoice(&self, invoice_id: i64) -> Option<Invoice>;
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
  ok: bool,
  result: Option<T>,
  #[serde(default)]
  error: Option<Value>,
}

impl<T> Envelope<T> {
  fn into_result(self) -> Result<T, ClientError> {
    match (self.ok, self.result) {
      (true, Some(result)) => Ok(result),
      (_, _) => Err(ClientError::Rejected(
        self.error.map(|error| error.to_string()).unwrap_or_else(|| "empty result".to_string()),
      )),
    }
  }
}

pub struct CryptoPayClient {
  base_url: String,
  token: Option<String>,
  client: reqwest::Client,
}

impl CryptoPayClient {
  pub fn new(base_url: &str, token: Option<String>, client: reqwest::Client) -> Self {
    Self {
      base_url: base_url.trim_end_matches('/').to_string(),
      token,
      client,
    }
  }

  async fn call<B: Serialize + Sync, T: DeserializeOwned>(&self, method: &str, body: &B) -> Result<T, ClientError> {
    let token = self.token.as_deref().ok_or(ClientError::NotConfigured)?;
    let response = self
      .client
      .post(format!("{}/{method}", self.base_url))
      .header(TOKEN_HEADER, token)
      .json(body)
      .send()
      .await?;
    // The processor reports failures inside the envelope, often with a 4xx
    // status, so the body is decoded regardless of the status code.
    let envelope: Envelope<T> = response.json().await?;
    envelope.into_result()
  }
}

#[async_trait]
impl Payments for CryptoPayClient {
  #[instrument(skip(self, request), fields(asset = %request.asset, amount = %request.amount))]
  async fn create_invoice(&self, request: &InvoiceRequest) -> Option<Invoice> {
    absent_on_error("create_invoice", self.call("createInvoice", request).await)
  }

  #[instrument(skip(self))]
  async fn invoice(&self, invoice_id: i64) -> Option<Invoice> {
    let batch: Option<InvoiceBatch> = absent_on_error(
      "get_invoices",
      self.call("getInvoices", &json!({ "invoice_ids": [invoice_id] })).await,
    );
    batch.and_then(|batch| batch.items.into_iter().next())
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::CryptoPayClient;
  use super::Envelope;
  use super::Payments;
  use crate::http::ClientError;
  use crate::models::InvoiceBatch;

  #[test]
  fn envelope_unwraps_successful_results() {
    let envelope: Envelope<InvoiceBatch> = serde_json::from_value(json!({
      "ok": true,
      "result": { "items": [{ "invoice_id": 1, "status": "paid", "amount": "10" }] }
    }))
    .unwrap();
    let batch = envelope.into_result().unwrap();
    assert_eq!(batch.items[0].status, "paid");
  }

  #[test]
  fn envelope_reports_processor_errors() {
    let envelope: Envelope<InvoiceBatch> = serde_json::from_value(json!({
      "ok": false,
      "error": { "code": 401, "name": "UNAUTHORIZED" }
    }))
    .unwrap();
    assert!(matches!(envelope.into_result(), Err(ClientError::Rejected(message)) if message.contains("UNAUTHORIZED")));
  }

  #[tokio::test]
  async fn missing_token_degrades_without_network() {
    let client = CryptoPayClient::new("http://127.0.0.1:9", None, reqwest::Client::new());
    assert!(client.invoice(5).await.is_none());
  }
}
