//! In-memory doubles of the remote services for controller and ledger tests.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Mutex;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::backend::Backend;
use crate::backend::PAGE_SIZE;
use crate::backend::ProductQuery;
use crate::models::BalanceSnapshot;
use crate::models::BotContent;
use crate::models::Category;
use crate::models::City;
use crate::models::ClientProfile;
use crate::models::ClientRecord;
use crate::models::District;
use crate::models::Invoice;
use crate::models::InvoiceRequest;
use crate::models::NamedRef;
use crate::models::Position;
use crate::models::Product;
use crate::models::ProductPage;
use crate::models::PurchaseHistory;
use crate::models::PurchaseOrder;
use crate::models::PurchaseReceipt;
use crate::models::Review;
use crate::models::ReviewStats;
use crate::payments::Payments;

pub fn dec(raw: &str) -> Decimal {
  Decimal::from_str(raw).expect("valid decimal literal")
}

pub fn named(id: i64, name: &str) -> NamedRef {
  NamedRef {
    id,
    name: name.to_string(),
  }
}

pub fn city(id: i64, name: &str, districts: Vec<District>) -> City {
  City {
    id,
    name: name.to_string(),
    districts,
  }
}

pub fn product(id: i64, name: &str) -> Product {
  Product {
    id,
    name: name.to_string(),
    description: Some("fresh".to_string()),
    img: None,
    positions: Vec::new(),
  }
}

pub fn position(id: i64, product_id: i64, price: &str, district: Option<NamedRef>) -> Position {
  Position {
    id,
    name: format!("Position {id}"),
    price: dec(price),
    packaging: Some("box".to_string()),
    location: Some(format!("Locker {id}")),
    product: Some(named(product_id, "Tea")),
    city: Some(named(5, "Springfield")),
    district,
  }
}

#[derive(Default)]
struct BackendState {
  offline: bool,
  fail_adjust: bool,
  reject_purchases: bool,
  balance: Decimal,
  balance_calls: usize,
  content: HashMap<String, BotContent>,
  categories: Vec<Category>,
  products: Vec<(i64, Option<i64>, Product)>,
  product_queries: Vec<ProductQuery>,
  positions: Vec<Position>,
  cities: Vec<City>,
  stocked: HashMap<i64, Vec<District>>,
  purchases: Vec<(i64, PurchaseOrder)>,
  adjustments: Vec<(i64, Decimal)>,
  clients: Vec<i64>,
  history: Option<PurchaseHistory>,
  stats: Option<ReviewStats>,
  reviews: Vec<Review>,
}

#[derive(Default)]
pub struct FakeBackend {
  state: Mutex<BackendState>,
}

impl FakeBackend {
  fn with<R>(&self, apply: impl FnOnce(&mut BackendState) -> R) -> R {
    let mut state = self.state.lock().expect("fake backend lock");
    apply(&mut state)
  }

  pub fn set_offline(&self, offline: bool) {
    self.with(|state| state.offline = offline);
  }

  pub fn fail_adjustments(&self) {
    self.with(|state| state.fail_adjust = true);
  }

  pub fn reject_purchases(&self) {
    self.with(|state| state.reject_purchases = true);
  }

  pub fn set_balance(&self, balance: Decimal) {
    self.with(|state| state.balance = balance);
  }

  pub fn set_content(&self, key: &str, text: &str, image: Option<&str>) {
    self.with(|state| {
      state.content.insert(
        key.to_string(),
        BotContent {
          text: Some(text.to_string()),
          image: image.map(str::to_string),
        },
      )
    });
  }

  pub fn add_category(&self, id: i64, name: &str) {
    self.with(|state| {
      state.categories.push(Category {
        id,
        name: name.to_string(),
        products_count: 0,
      })
    });
  }

  pub fn add_product(&self, category_id: i64, district_id: Option<i64>, product: Product) {
    self.with(|state| state.products.push((category_id, district_id, product)));
  }

  pub fn add_position(&self, position: Position) {
    self.with(|state| state.positions.push(position));
  }

  pub fn add_city(&self, city: City) {
    self.with(|state| state.cities.push(city));
  }

  pub fn set_stocked_districts(&self, category_id: i64, districts: Vec<District>) {
    self.with(|state| state.stocked.insert(category_id, districts));
  }

  pub fn set_history(&self, history: PurchaseHistory) {
    self.with(|state| state.history = Some(history));
  }

  pub fn set_reviews(&self, stats: ReviewStats, reviews: Vec<Review>) {
    self.with(|state| {
      state.stats = Some(stats);
      state.reviews = reviews;
    });
  }

  pub fn product_queries(&self) -> Vec<ProductQuery> {
    self.with(|state| state.product_queries.clone())
  }

  pub fn purchases(&self) -> Vec<(i64, PurchaseOrder)> {
    self.with(|state| state.purchases.clone())
  }

  pub fn adjustments(&self) -> Vec<(i64, Decimal)> {
    self.with(|state| state.adjustments.clone())
  }

  pub fn balance_calls(&self) -> usize {
    self.with(|state| state.balance_calls)
  }

  pub fn clients(&self) -> Vec<i64> {
    self.with(|state| state.clients.clone())
  }
}

#[async_trait]
impl Backend for FakeBackend {
  async fn content(&self, key: &str) -> Option<BotContent> {
    self.with(|state| if state.offline { None } else { state.content.get(key).cloned() })
  }

  async fn categories(&self) -> Vec<Category> {
    self.with(|state| if state.offline { Vec::new() } else { state.categories.clone() })
  }

  async fn products(&self, query: ProductQuery) -> ProductPage {
    self.with(|state| {
      state.product_queries.push(query);
      if state.offline {
        return ProductPage::default();
      }
      let matching: Vec<Product> = state
        .products
        .iter()
        .filter(|(category, district, _)| {
          *category == query.category_id && (query.district_id.is_none() || *district == query.district_id)
        })
        .map(|(_, _, product)| product.clone())
        .collect();
      let skip = (query.page.max(1) as usize - 1) * PAGE_SIZE;
      ProductPage {
        total: matching.len(),
        rows: matching.into_iter().skip(skip).take(PAGE_SIZE).collect(),
      }
    })
  }

  async fn positions(&self, product_id: i64, _city_id: Option<i64>, district_id: Option<i64>) -> Vec<Position> {
    self.with(|state| {
      if state.offline {
        return Vec::new();
      }
      state
        .positions
        .iter()
        .filter(|position| position.product.as_ref().map(|product| product.id) == Some(product_id))
        .filter(|position| {
          district_id.is_none() || position.district.as_ref().map(|district| district.id) == district_id
        })
        .cloned()
        .collect()
    })
  }

  async fn cities(&self) -> Vec<City> {
    self.with(|state| if state.offline { Vec::new() } else { state.cities.clone() })
  }

  async fn stocked_districts(&self, category_id: i64, _city_id: i64) -> Vec<District> {
    self.with(|state| {
      if state.offline {
        Vec::new()
      } else {
        state.stocked.get(&category_id).cloned().unwrap_or_default()
      }
    })
  }

  async fn product(&self, product_id: i64) -> Option<Product> {
    self.with(|state| {
      if state.offline {
        return None;
      }
      state
        .products
        .iter()
        .map(|(_, _, product)| product)
        .find(|product| product.id == product_id)
        .cloned()
    })
  }

  async fn position(&self, position_id: i64) -> Option<Position> {
    self.with(|state| {
      if state.offline {
        return None;
      }
      state.positions.iter().find(|position| position.id == position_id).cloned()
    })
  }

  async fn ensure_client(&self, profile: &ClientProfile) -> Option<ClientRecord> {
    self.with(|state| {
      if state.offline {
        return None;
      }
      state.clients.push(profile.telegram_id);
      Some(ClientRecord {
        username: profile.username.clone(),
        first_name: profile.first_name.clone(),
      })
    })
  }

  async fn add_purchase(&self, telegram_id: i64, order: &PurchaseOrder) -> Option<PurchaseReceipt> {
    self.with(|state| {
      if state.offline {
        return None;
      }
      state.purchases.push((telegram_id, order.clone()));
      if state.reject_purchases || state.balance < order.price {
        return Some(PurchaseReceipt { success: false });
      }
      state.balance -= order.price;
      Some(PurchaseReceipt { success: true })
    })
  }

  async fn purchases(&self, _telegram_id: i64) -> Option<PurchaseHistory> {
    self.with(|state| if state.offline { None } else { state.history.clone() })
  }

  async fn balance(&self, _telegram_id: i64) -> Option<BalanceSnapshot> {
    self.with(|state| {
      state.balance_calls += 1;
      if state.offline {
        None
      } else {
        Some(BalanceSnapshot { balance: state.balance })
      }
    })
  }

  async fn adjust_balance(&self, telegram_id: i64, amount: Decimal) -> Option<BalanceSnapshot> {
    self.with(|state| {
      if state.offline || state.fail_adjust {
        return None;
      }
      state.adjustments.push((telegram_id, amount));
      state.balance += amount;
      Some(BalanceSnapshot { balance: state.balance })
    })
  }

  async fn review_stats(&self) -> Option<ReviewStats> {
    self.with(|state| if state.offline { None } else { state.stats.clone() })
  }

  async fn reviews(&self) -> Vec<Review> {
    self.with(|state| if state.offline { Vec::new() } else { state.reviews.clone() })
  }
}

#[derive(Default)]
struct PaymentsState {
  offline: bool,
  next_id: i64,
  invoices: HashMap<i64, Invoice>,
  requests: Vec<InvoiceRequest>,
}

#[derive(Default)]
pub struct FakePayments {
  state: Mutex<PaymentsState>,
}

impl FakePayments {
  fn with<R>(&self, apply: impl FnOnce(&mut PaymentsState) -> R) -> R {
    let mut state = self.state.lock().expect("fake payments lock");
    apply(&mut state)
  }

  pub fn set_offline(&self, offline: bool) {
    self.with(|state| state.offline = offline);
  }

  pub fn mark(&self, invoice_id: i64, status: &str) {
    self.with(|state| {
      if let Some(invoice) = state.invoices.get_mut(&invoice_id) {
        invoice.status = status.to_string();
      }
    });
  }

  pub fn requests(&self) -> Vec<InvoiceRequest> {
    self.with(|state| state.requests.clone())
  }
}

#[async_trait]
impl Payments for FakePayments {
  async fn create_invoice(&self, request: &InvoiceRequest) -> Option<Invoice> {
    self.with(|state| {
      if state.offline {
        return None;
      }
      state.next_id += 1;
      let invoice = Invoice {
        invoice_id: state.next_id,
        status: "active".to_string(),
        amount: Some(request.amount),
        asset: Some(request.asset.clone()),
        pay_url: None,
        bot_invoice_url: Some(format!("https://t.me/CryptoBot?start=IV{}", state.next_id)),
      };
      state.requests.push(request.clone());
      state.invoices.insert(invoice.invoice_id, invoice.clone());
      Some(invoice)
    })
  }

  async fn invoice(&self, invoice_id: i64) -> Option<Invoice> {
    self.with(|state| {
      if state.offline {
        None
      } else {
        state.invoices.get(&invoice_id).cloned()
      }
    })
  }
}
