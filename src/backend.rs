//! Client for the remote catalog and commerce API.
//!
//! Every call is a single request without retries. Failures are logged and
//! surface as `None` or an empty list, so callers only ever deal with the
//! "unavailable" shape and never with transport errors.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use tracing::instrument;

use crate::http::ClientError;
use crate::http::absent_on_error;
use crate::http::empty_on_error;
use crate::models::BalanceAdjustment;
use crate::models::BalanceSnapshot;
use crate::models::BotContent;
use crate::models::Category;
use crate::models::City;
use crate::models::ClientProfile;
use crate::models::ClientRecord;
use crate::models::District;
use crate::models::Position;
use crate::models::PositionListing;
use crate::models::Product;
use crate::models::ProductListing;
use crate::models::ProductPage;
use crate::models::PurchaseHistory;
use crate::models::PurchaseOrder;
use crate::models::PurchaseReceipt;
use crate::models::Review;
use crate::models::ReviewStats;

pub const PAGE_SIZE: usize = 7;

/// Filter for a product page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProductQuery {
  pub category_id: i64,
  pub page: u32,
  pub city_id: Option<i64>,
  pub district_id: Option<i64>,
}

#[async_trait]
pub trait Backend: Send + Sync {
  async fn content(&self, key: &str) -> Option<BotContent>;
  async fn categories(&self) -> Vec<Category>;
  async fn products(&self, query: ProductQuery) -> ProductPage;
  async fn positions(&self, product_id: i64, city_id: Option<i64>, district_id: Option<i64>) -> Vec<Position>;
  async fn cities(&self) -> Vec<City>;
  async fn stocked_districts(&self, category_id: i64, city_id: i64) -> Vec<District>;
  async fn product(&self, product_id: i64) -> Option<Product>;
  async fn position(&self, position_id: i64) -> Option<Position>;
  async fn ensure_client(&self, profile: &ClientProfile) -> Option<ClientRecord>;
  async fn add_purchase(&self, telegram_id: i64, order: &PurchaseOrder) -> Option<PurchaseReceipt>;
  async fn purchases(&self, telegram_id: i64) -> Option<PurchaseHistory>;
  async fn balance(&self, telegram_id: i64) -> Option<BalanceSnapshot>;
  async fn adjust_balance(&self, telegram_id: i64, amount: Decimal) -> Option<BalanceSnapshot>;
  async fn review_stats(&self) -> Option<ReviewStats>;
  async fn reviews(&self) -> Vec<Review>;
}

pub struct HttpBackend {
  base_url: String,
  client: reqwest::Client,
}

impl HttpBackend {
  pub fn new(base_url: &str, client: reqwest::Client) -> Self {
    Self {
      base_url: base_url.trim_end_matches('/').to_string(),
      client,
    }
  }

  fn url(&self, path: &str) -> String {
    format!("{}/{}", self.base_url, path.trim_start_matches('/'))
  }

  async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T, ClientError> {
    let response = self.client.get(self.url(path)).query(query).send().await?;
    decode(response).await
  }

  async fn post<B: Serialize + Sync, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, ClientError> {
    let response = self.client.post(self.url(path)).json(body).send().await?;
    decode(response).await
  }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
  let status = response.status();
  if !status.is_success() {
    return Err(ClientError::Status(status));
  }
  Ok(response.json::<T>().await?)
}

fn location_params(city_id: Option<i64>, district_id: Option<i64>) -> Vec<(&'static str, String)> {
  let mut params = Vec::new();
  if let Some(city) = city_id {
    params.push(("cityId", city.to_string()));
  }
  if let Some(district) = district_id {
    params.push(("districtId", district.to_string()));
  }
  params
}

#[async_trait]
impl Backend for HttpBackend {
  #[instrument(skip(self))]
  async fn content(&self, key: &str) -> Option<BotContent> {
    absent_on_error("content", self.get(&format!("bot/content/{key}"), &[]).await)
  }

  #[instrument(skip(self))]
  async fn categories(&self) -> Vec<Category> {
    empty_on_error("categories", self.get("catalog/categories", &[]).await)
  }

  #[instrument(skip(self))]
  async fn products(&self, query: ProductQuery) -> ProductPage {
    let mut params = vec![("page", query.page.to_string()), ("limit", PAGE_SIZE.to_string())];
    params.extend(location_params(query.city_id, query.district_id));
    let path = format!("catalog/categories/{}/products", query.category_id);
    let listing: Option<ProductListing> = absent_on_error("products", self.get(&path, &params).await);
    let page = listing.map(ProductPage::from).unwrap_or_default();
    debug!(count = page.rows.len(), total = page.total, "fetched product page");
    page
  }

  #[instrument(skip(self))]
  async fn positions(&self, product_id: i64, city_id: Option<i64>, district_id: Option<i64>) -> Vec<Position> {
    let path = format!("catalog/products/{product_id}/positions");
    let params = location_params(city_id, district_id);
    let listing: Option<PositionListing> = absent_on_error("positions", self.get(&path, &params).await);
    listing.map(Vec::from).unwrap_or_default()
  }

  #[instrument(skip(self))]
  async fn cities(&self) -> Vec<City> {
    empty_on_error("cities", self.get("bot/cities-with-districts", &[]).await)
  }

  #[instrument(skip(self))]
  async fn stocked_districts(&self, category_id: i64, city_id: i64) -> Vec<District> {
    let path = format!("categories/{category_id}/districts");
    empty_on_error(
      "stocked_districts",
      self.get(&path, &[("cityId", city_id.to_string())]).await,
    )
  }

  #[instrument(skip(self))]
  async fn product(&self, product_id: i64) -> Option<Product> {
    absent_on_error("product", self.get(&format!("product/{product_id}"), &[]).await)
  }

  #[instrument(skip(self))]
  async fn position(&self, position_id: i64) -> Option<Position> {
    absent_on_error("position", self.get(&format!("position/{position_id}"), &[]).await)
  }

  #[instrument(skip(self, profile), fields(telegram_id = profile.telegram_id))]
  async fn ensure_client(&self, profile: &ClientProfile) -> Option<ClientRecord> {
    let path = format!("bot/clients/{}", profile.telegram_id);
    absent_on_error("ensure_client", self.post(&path, profile).await)
  }

  #[instrument(skip(self, order), fields(position_id = order.position_id))]
  async fn add_purchase(&self, telegram_id: i64, order: &PurchaseOrder) -> Option<PurchaseReceipt> {
    let path = format!("bot/clients/{telegram_id}/purchase");
    absent_on_error("add_purchase", self.post(&path, order).await)
  }

  #[instrument(skip(self))]
  async fn purchases(&self, telegram_id: i64) -> Option<PurchaseHistory> {
    absent_on_error(
      "purchases",
      self.get(&format!("bot/clients/{telegram_id}/purchases"), &[]).await,
    )
  }

  #[instrument(skip(self))]
  async fn balance(&self, telegram_id: i64) -> Option<BalanceSnapshot> {
    absent_on_error(
      "balance",
      self.get(&format!("bot/clients/{telegram_id}/balance"), &[]).await,
    )
  }

  #[instrument(skip(self))]
  async fn adjust_balance(&self, telegram_id: i64, amount: Decimal) -> Option<BalanceSnapshot> {
    let path = format!("bot/clients/{telegram_id}/balance/adjust");
    absent_on_error("adjust_balance", self.post(&path, &BalanceAdjustment { amount }).await)
  }

  #[instrument(skip(self))]
  async fn review_stats(&self) -> Option<ReviewStats> {
    absent_on_error("review_stats", self.get("review/stats", &[]).await)
  }

  #[instrument(skip(self))]
  async fn reviews(&self) -> Vec<Review> {
    empty_on_error("reviews", self.get("review", &[]).await)
  }
}
