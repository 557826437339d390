mod app;
mod backend;
mod bot;
mod config;
mod http;
mod ledger;
mod media;
mod models;
mod payments;
mod store;
mod telemetry;
#[cfg(test)]
mod testing;
mod util;

use std::sync::Arc;

use anyhow::Result;
use teloxide::prelude::Bot;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
  telemetry::init()?;
  let config = config::Config::from_env()?;
  info!(
    backend = %config.backend_url,
    asset = %config.asset,
    settlement = ?config.settlement,
    "starting bot"
  );

  let client = reqwest::Client::new();
  let backend = Arc::new(backend::HttpBackend::new(&config.backend_url, client.clone()));
  let payments = Arc::new(payments::CryptoPayClient::new(
    &config.payment_api_url,
    config.payment_token.clone(),
    client.clone(),
  ));
  let media = media::MediaUrls::new(
    config.public_base_url.clone(),
    config.tunnel_api_url.clone(),
    config.backend_url.clone(),
    client,
  );
  let context = bot::AppContext::new(backend, payments, media, config.asset.clone(), config.settlement);

  let bot = Bot::new(config.bot_token.clone());
  let app = app::App::new(bot, context);
  app.run().await
}
