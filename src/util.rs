use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use rust_decimal::RoundingStrategy;
use thiserror::Error;

static AMOUNT_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?\d+(?:\.\d+)?$").expect("valid regex"));

const CANCEL_WORDS: [&str; 3] = ["отмена", "cancel", "назад"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AmountError {
  #[error("amount must be a number like 12.5")]
  InvalidFormat,
  #[error("amount must be greater than zero")]
  NotPositive,
  #[error("amount exceeds supported range")]
  OutOfRange,
}

/// Parses a user-typed amount. A decimal comma is accepted as a decimal point.
pub fn parse_amount(input: &str) -> Result<Decimal, AmountError> {
  let normalized = input.trim().replace(',', ".");
  if !AMOUNT_PATTERN.is_match(&normalized) {
    return Err(AmountError::InvalidFormat);
  }
  let value = Decimal::from_str(&normalized).map_err(|_| AmountError::OutOfRange)?;
  if value <= Decimal::ZERO {
    return Err(AmountError::NotPositive);
  }
  Ok(value.normalize())
}

pub fn is_cancel_word(input: &str) -> bool {
  let lowered = input.trim().to_lowercase();
  CANCEL_WORDS.iter().any(|word| *word == lowered)
}

pub fn format_amount(amount: Decimal) -> String {
  format!("{:.2}", amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
}

pub fn truncate_button_text(text: &str, max_chars: usize) -> String {
  if text.chars().count() <= max_chars {
    return text.to_string();
  }

  let guarded = max_chars.saturating_sub(3);
  if guarded == 0 {
    return "...".to_string();
  }

  let truncated: String = text.chars().take(guarded).collect();
  format!("{truncated}...")
}
