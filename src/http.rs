use reqwest::StatusCode;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ClientError {
  #[error("request failed: {0}")]
  Transport(#[from] reqwest::Error),
  #[error("unexpected status {0}")]
  Status(StatusCode),
  #[error("payment processor rejected the call: {0}")]
  Rejected(String),
  #[error("payment processor token is not configured")]
  NotConfigured,
}

/// Collapses a failed call into an absent value. The log line is the only
/// trace the failure leaves; callers decide what "absent" means for the user.
pub fn absent_on_error<T>(operation: &'static str, result: Result<T, ClientError>) -> Option<T> {
  match result {
    Ok(value) => Some(value),
    Err(err) => {
      warn!(operation, error = %err, "remote call degraded");
      None
    },
  }
}

/// Same as [`absent_on_error`] for list endpoints, where absent means empty.
pub fn empty_on_error<T>(operation: &'static str, result: Result<Vec<T>, ClientError>) -> Vec<T> {
  absent_on_error(operation, result).unwrap_or_default()
}
