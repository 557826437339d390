use std::env;
use std::str::FromStr;

use anyhow::Context;
use anyhow::Result;

const DEFAULT_BACKEND_URL: &str = "http://server:5050/api";
const DEFAULT_PAYMENT_API_URL: &str = "https://pay.crypt.bot/api";
const DEFAULT_ASSET: &str = "USDT";
const DEFAULT_TUNNEL_API_URL: &str = "http://127.0.0.1:4040/api/tunnels";

/// How a confirmed payment turns into a purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SettlementMode {
  /// Users top up a balance and purchases are paid from it.
  #[default]
  Ledger,
  /// Each purchase not covered by the balance gets its own invoice and the
  /// pickup location stays hidden until that invoice is paid.
  Invoice,
}

impl FromStr for SettlementMode {
  type Err = String;

  fn from_str(raw: &str) -> Result<Self, Self::Err> {
    match raw.trim().to_ascii_lowercase().as_str() {
      "ledger" | "balance" => Ok(Self::Ledger),
      "invoice" | "per_purchase" => Ok(Self::Invoice),
      other => Err(format!("unknown settlement mode '{other}'")),
    }
  }
}

#[derive(Debug, Clone)]
pub struct Config {
  pub bot_token: String,
  pub backend_url: String,
  pub payment_token: Option<String>,
  pub payment_api_url: String,
  pub asset: String,
  pub public_base_url: Option<String>,
  pub tunnel_api_url: String,
  pub settlement: SettlementMode,
}

impl Config {
  pub fn from_env() -> Result<Self> {
    let bot_token = env::var("BOT_TOKEN")
      .or_else(|_| env::var("TELOXIDE_TOKEN"))
      .context("BOT_TOKEN or TELOXIDE_TOKEN must be set")?;
    let backend_url = non_empty(env::var("NODE_API_URL").ok())
      .map(|url| url.trim_end_matches('/').to_string())
      .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string());
    let payment_token = non_empty(env::var("CRYPTO_BOT_TOKEN").ok());
    if payment_token.is_none() {
      tracing::warn!("CRYPTO_BOT_TOKEN is not set, invoices cannot be created");
    }
    let payment_api_url =
      non_empty(env::var("CRYPTO_PAY_API_URL").ok()).unwrap_or_else(|| DEFAULT_PAYMENT_API_URL.to_string());
    let asset = non_empty(env::var("CRYPTO_PAYMENT_ASSET").ok()).unwrap_or_else(|| DEFAULT_ASSET.to_string());
    let public_base_url = non_empty(env::var("PUBLIC_BASE_URL").ok());
    let tunnel_api_url = non_empty(env::var("NGROK_API_URL").ok()).unwrap_or_else(|| DEFAULT_TUNNEL_API_URL.to_string());
    let settlement = parse_settlement(env::var("SETTLEMENT_MODE").ok().as_deref());

    Ok(Self {
      bot_token,
      backend_url,
      payment_token,
      payment_api_url,
      asset,
      public_base_url,
      tunnel_api_url,
      settlement,
    })
  }
}

fn non_empty(value: Option<String>) -> Option<String> {
  value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_settlement(raw: Option<&str>) -> SettlementMode {
  let Some(raw) = raw.map(str::trim).filter(|value| !value.is_empty()) else {
    return SettlementMode::default();
  };
  match raw.parse::<SettlementMode>() {
    Ok(mode) => mode,
    Err(err) => {
      tracing::warn!(value = raw, error = %err, "invalid SETTLEMENT_MODE, using ledger");
      SettlementMode::default()
    },
  }
}
