use chrono::DateTime;
use chrono::NaiveDate;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct BotContent {
  #[serde(default)]
  pub text: Option<String>,
  #[serde(default)]
  pub image: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
  pub id: i64,
  pub name: String,
  #[serde(default)]
  pub products_count: i64,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct NamedRef {
  pub id: i64,
  pub name: String,
}

pub type District = NamedRef;

#[derive(Debug, Clone, Deserialize)]
pub struct City {
  pub id: i64,
  pub name: String,
  #[serde(default)]
  pub districts: Vec<District>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Product {
  pub id: i64,
  pub name: String,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default)]
  pub img: Option<String>,
  #[serde(default)]
  pub positions: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Position {
  pub id: i64,
  pub name: String,
  pub price: Decimal,
  #[serde(rename = "type", default)]
  pub packaging: Option<String>,
  #[serde(default)]
  pub location: Option<String>,
  #[serde(default)]
  pub product: Option<NamedRef>,
  #[serde(default)]
  pub city: Option<NamedRef>,
  #[serde(default)]
  pub district: Option<NamedRef>,
}

impl Position {
  pub fn product_name(&self) -> Option<&str> {
    self.product.as_ref().map(|product| product.name.as_str())
  }
}

/// One page of products plus the total reported by the backend.
#[derive(Debug, Clone, Default)]
pub struct ProductPage {
  pub rows: Vec<Product>,
  pub total: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ProductListing {
  Paged {
    rows: Vec<Product>,
    #[serde(default)]
    count: usize,
  },
  Bare(Vec<Product>),
}

impl From<ProductListing> for ProductPage {
  fn from(listing: ProductListing) -> Self {
    match listing {
      ProductListing::Paged { rows, count } => Self { rows, total: count },
      ProductListing::Bare(rows) => {
        let total = rows.len();
        Self { rows, total }
      },
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PositionListing {
  Wrapped { rows: Vec<Position> },
  Bare(Vec<Position>),
}

impl From<PositionListing> for Vec<Position> {
  fn from(listing: PositionListing) -> Self {
    match listing {
      PositionListing::Wrapped { rows } => rows,
      PositionListing::Bare(rows) => rows,
    }
  }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientProfile {
  #[serde(skip)]
  pub telegram_id: i64,
  pub username: Option<String>,
  pub first_name: Option<String>,
  pub last_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ClientRecord {
  #[serde(default)]
  pub username: Option<String>,
  #[serde(default)]
  pub first_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseOrder {
  pub position_id: i64,
  pub position_name: String,
  pub price: Decimal,
  pub product_name: Option<String>,
}

impl PurchaseOrder {
  pub fn for_position(position: &Position) -> Self {
    Self {
      position_id: position.id,
      position_name: position.name.clone(),
      price: position.price,
      product_name: position.product_name().map(str::to_string),
    }
  }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct PurchaseReceipt {
  #[serde(default)]
  pub success: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRecord {
  #[serde(default)]
  pub position_id: Option<i64>,
  #[serde(default)]
  pub position_name: Option<String>,
  #[serde(default)]
  pub product_name: Option<String>,
  #[serde(default)]
  pub price: Decimal,
  #[serde(default)]
  pub purchase_date: Option<DateTime<Utc>>,
}

impl PurchaseRecord {
  pub fn day(&self) -> Option<NaiveDate> {
    self.purchase_date.map(|at| at.date_naive())
  }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct PurchaseHistory {
  #[serde(default)]
  pub total: usize,
  #[serde(default)]
  pub client: Option<ClientRecord>,
  #[serde(default)]
  pub purchases: Vec<PurchaseRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BalanceSnapshot {
  pub balance: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct BalanceAdjustment {
  pub amount: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReviewStats {
  #[serde(default)]
  pub average: Decimal,
  #[serde(default)]
  pub count: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Review {
  #[serde(default)]
  pub author: Option<String>,
  #[serde(default)]
  pub rating: Option<u8>,
  #[serde(default)]
  pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InvoiceRequest {
  pub asset: String,
  pub amount: Decimal,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub payload: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Invoice {
  pub invoice_id: i64,
  pub status: String,
  #[serde(default)]
  pub amount: Option<Decimal>,
  #[serde(default)]
  pub asset: Option<String>,
  #[serde(default)]
  pub pay_url: Option<String>,
  #[serde(default)]
  pub bot_invoice_url: Option<String>,
}

impl Invoice {
  pub fn payment_link(&self) -> Option<&str> {
    self.bot_invoice_url.as_deref().or(self.pay_url.as_deref())
  }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct InvoiceBatch {
  #[serde(default)]
  pub items: Vec<Invoice>,
}

#[cfg(test)]
mod tests {
  use rust_decimal::Decimal;
  use serde_json::json;

  use super::Invoice;
  use super::PositionListing;
  use super::ProductListing;
  use super::ProductPage;
  use super::PurchaseHistory;
  use super::ReviewStats;

  #[test]
  fn product_listing_accepts_paged_and_bare_shapes() {
    let paged: ProductListing = serde_json::from_value(json!({
      "rows": [{ "id": 1, "name": "Tea" }],
      "count": 12
    }))
    .unwrap();
    let page = ProductPage::from(paged);
    assert_eq!(page.rows.len(), 1);
    assert_eq!(page.total, 12);

    let bare: ProductListing = serde_json::from_value(json!([
      { "id": 1, "name": "Tea" },
      { "id": 2, "name": "Coffee", "positions": [{}, {}] }
    ]))
    .unwrap();
    let page = ProductPage::from(bare);
    assert_eq!(page.total, 2);
    assert_eq!(page.rows[1].positions.len(), 2);
  }

  #[test]
  fn position_listing_accepts_wrapped_and_bare_shapes() {
    let wrapped: PositionListing = serde_json::from_value(json!({
      "rows": [{ "id": 3, "name": "Box", "price": 15, "district": { "id": 2, "name": "North" } }]
    }))
    .unwrap();
    let positions: Vec<_> = wrapped.into();
    assert_eq!(positions[0].price, Decimal::from(15));
    assert_eq!(positions[0].district.as_ref().map(|d| d.id), Some(2));

    let bare: PositionListing =
      serde_json::from_value(json!([{ "id": 4, "name": "Bag", "price": "7.5", "type": "bag" }])).unwrap();
    let positions: Vec<_> = bare.into();
    assert_eq!(positions[0].packaging.as_deref(), Some("bag"));
  }

  #[test]
  fn review_stats_accept_string_and_numeric_average() {
    let stats: ReviewStats = serde_json::from_value(json!({ "average": "4.5", "count": 10 })).unwrap();
    assert_eq!(stats.average.to_string(), "4.5");
    let empty: ReviewStats = serde_json::from_value(json!({ "average": 0, "count": 0 })).unwrap();
    assert_eq!(empty.count, 0);
  }

  #[test]
  fn purchase_history_groups_by_day() {
    let history: PurchaseHistory = serde_json::from_value(json!({
      "total": 1,
      "client": { "username": "bob" },
      "purchases": [{
        "positionId": 9,
        "positionName": "Box",
        "productName": "Tea",
        "price": 15,
        "purchaseDate": "2025-03-04T10:11:12.000Z"
      }]
    }))
    .unwrap();
    let day = history.purchases[0].day().unwrap();
    assert_eq!(day.to_string(), "2025-03-04");
  }

  #[test]
  fn invoice_prefers_bot_invoice_url() {
    let invoice: Invoice = serde_json::from_value(json!({
      "invoice_id": 77,
      "status": "active",
      "amount": "10",
      "pay_url": "https://t.me/old",
      "bot_invoice_url": "https://t.me/new"
    }))
    .unwrap();
    assert_eq!(invoice.payment_link(), Some("https://t.me/new"));
  }
}
