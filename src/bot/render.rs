//! Transport-neutral rendering instructions. The controller produces these and
//! the handlers turn them into Telegram requests.

use rust_decimal::Decimal;
use teloxide::utils::html::escape;

use crate::backend::PAGE_SIZE;
use crate::bot::action::Action;
use crate::ledger::InvoiceRecord;
use crate::models::Category;
use crate::models::City;
use crate::models::Position;
use crate::models::Product;
use crate::models::PurchaseRecord;
use crate::models::Review;
use crate::models::ReviewStats;
use crate::util::format_amount;
use crate::util::truncate_button_text;

const BUTTON_TEXT_LIMIT: usize = 48;
const TOP_UP_PRESETS: [u32; 3] = [10, 25, 50];
pub const REVIEWS_SHOWN: usize = 10;
pub const ORDERS_GROUPED_LIMIT: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
  Text(String),
  Photo { url: String, caption: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
  Callback(Action),
  Url(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
  pub label: String,
  pub target: Target,
}

impl Button {
  pub fn action(label: impl Into<String>, action: Action) -> Self {
    Self {
      label: label.into(),
      target: Target::Callback(action),
    }
  }

  pub fn link(label: impl Into<String>, url: impl Into<String>) -> Self {
    Self {
      label: label.into(),
      target: Target::Url(url.into()),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Markup {
  Plain,
  Inline(Vec<Vec<Button>>),
  MainMenu,
}

/// `Edit` replaces the message the user tapped when there is one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
  Send,
  Edit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
  pub content: Content,
  pub markup: Markup,
  pub delivery: Delivery,
}

impl Reply {
  pub fn text(text: impl Into<String>) -> Self {
    Self {
      content: Content::Text(text.into()),
      markup: Markup::Plain,
      delivery: Delivery::Send,
    }
  }

  /// A photo when an image is known, plain text otherwise.
  pub fn illustrated(image_url: Option<String>, text: impl Into<String>) -> Self {
    let text = text.into();
    let content = match image_url {
      Some(url) => Content::Photo { url, caption: text },
      None => Content::Text(text),
    };
    Self {
      content,
      markup: Markup::Plain,
      delivery: Delivery::Send,
    }
  }

  pub fn inline(mut self, rows: Vec<Vec<Button>>) -> Self {
    self.markup = Markup::Inline(rows);
    self
  }

  pub fn main_menu(mut self) -> Self {
    self.markup = Markup::MainMenu;
    self
  }

  pub fn delivered(mut self, delivery: Delivery) -> Self {
    self.delivery = delivery;
    self
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
  pub replies: Vec<Reply>,
  /// Short toast shown when answering a button tap.
  pub notice: Option<String>,
}

impl Outcome {
  pub fn single(reply: Reply) -> Self {
    Self {
      replies: vec![reply],
      notice: None,
    }
  }

  pub fn many(replies: Vec<Reply>) -> Self {
    Self { replies, notice: None }
  }

  pub fn with_notice(mut self, notice: impl Into<String>) -> Self {
    self.notice = Some(notice.into());
    self
  }
}

/// Previous iff past the first page; next iff this page was full and more
/// products remain.
pub fn pagination_controls(category_id: i64, page: u32, shown: usize, total: usize) -> Vec<Button> {
  let mut controls = Vec::new();
  if page > 1 {
    controls.push(Button::action(
      "◀️ Back",
      Action::Page {
        category_id,
        page: page - 1,
      },
    ));
  }
  if shown == PAGE_SIZE && (page as usize) * PAGE_SIZE < total {
    controls.push(Button::action(
      "Next ▶️",
      Action::Page {
        category_id,
        page: page + 1,
      },
    ));
  }
  controls
}

pub fn back_to_categories() -> Button {
  Button::action("🔙 To categories", Action::Categories)
}

pub fn back_to_balance() -> Button {
  Button::action("💳 Back to balance", Action::Balance)
}

pub fn category_rows(categories: &[Category]) -> Vec<Vec<Button>> {
  categories
    .iter()
    .map(|category| {
      let label = format!("{} ({})", category.name, category.products_count);
      vec![Button::action(
        truncate_button_text(&label, BUTTON_TEXT_LIMIT),
        Action::Category(category.id),
      )]
    })
    .collect()
}

pub fn product_rows(products: &[Product]) -> Vec<Vec<Button>> {
  products
    .iter()
    .map(|product| {
      let label = format!("{} ({})", product.name, product.positions.len());
      vec![Button::action(
        truncate_button_text(&label, BUTTON_TEXT_LIMIT),
        Action::Product(product.id),
      )]
    })
    .collect()
}

pub fn position_rows(positions: &[Position], asset: &str) -> Vec<Vec<Button>> {
  positions
    .iter()
    .map(|position| {
      let label = format!("💰 {} {asset} - {}", format_amount(position.price), position.name);
      vec![Button::action(
        truncate_button_text(&label, BUTTON_TEXT_LIMIT),
        Action::Position(position.id),
      )]
    })
    .collect()
}

pub fn city_rows(cities: &[City]) -> Vec<Vec<Button>> {
  let mut rows = vec![vec![Button::action("♻️ Reset location", Action::ResetLocation)]];
  rows.extend(
    cities
      .iter()
      .map(|city| vec![Button::action(format!("🏙️ {}", city.name), Action::City(city.id))]),
  );
  rows
}

pub fn balance_rows<'a>(asset: &str, open_invoices: impl Iterator<Item = (i64, &'a InvoiceRecord)>) -> Vec<Vec<Button>> {
  let preset = |amount: u32| {
    Button::action(
      format!("Top up {amount} {asset}"),
      Action::TopUp {
        asset: asset.to_string(),
        amount: Decimal::from(amount),
      },
    )
  };
  let mut rows = vec![
    vec![preset(TOP_UP_PRESETS[0]), preset(TOP_UP_PRESETS[1])],
    vec![
      preset(TOP_UP_PRESETS[2]),
      Button::action(
        "Other amount",
        Action::TopUpCustom {
          asset: asset.to_string(),
        },
      ),
    ],
  ];
  rows.extend(
    open_invoices.map(|(invoice_id, _)| {
      vec![Button::action(
        format!("🔄 Check payment #{invoice_id}"),
        Action::CheckInvoice(invoice_id),
      )]
    }),
  );
  rows
}

pub fn rating_line(stats: Option<&ReviewStats>) -> Option<String> {
  let stats = stats.filter(|stats| stats.count > 0)?;
  Some(format!(
    "⭐ <b>Shop rating: {}</b> ({} reviews)",
    stats.average.normalize(),
    stats.count
  ))
}

pub fn location_label(cities: &[City], city_id: Option<i64>, district_id: Option<i64>) -> String {
  let Some(city) = city_id.and_then(|id| cities.iter().find(|city| city.id == id)) else {
    return "🏙️ No city selected".to_string();
  };
  match district_id.and_then(|id| city.districts.iter().find(|district| district.id == id)) {
    Some(district) => format!("🏙️ {}, {}", city.name, district.name),
    None => format!("🏙️ {}", city.name),
  }
}

pub fn product_caption(product: &Product) -> String {
  let description = product.description.as_deref().unwrap_or("No description");
  format!(
    "<b>📦 {}</b>\n\n📝 {}\n\n",
    escape(&product.name),
    escape(description)
  )
}

/// Position card. The pickup location is only included when `reveal` is set.
pub fn position_text(position: &Position, asset: &str, reveal: bool) -> String {
  let mut text = format!(
    "<b>📍 {}</b>\n\n💰 <b>Price: {} {asset}</b>\n📦 Packaging: {}\n🏙️ City: {}",
    escape(&position.name),
    format_amount(position.price),
    escape(position.packaging.as_deref().unwrap_or("not specified")),
    escape(position.city.as_ref().map(|city| city.name.as_str()).unwrap_or("not specified")),
  );
  if let Some(district) = &position.district {
    text.push_str(&format!("\n📍 District: {}", escape(&district.name)));
  }
  if reveal {
    text.push_str(&format!("\n🏢 Pickup: {}", pickup(position)));
  } else {
    text.push_str("\n🔒 The pickup point is revealed after payment.");
  }
  text
}

pub fn pickup(position: &Position) -> String {
  escape(position.location.as_deref().unwrap_or("will be sent by support"))
}

pub fn reviews_text(stats: Option<&ReviewStats>, reviews: &[Review]) -> String {
  let mut text = "⭐ <b>Customer reviews</b>\n".to_string();
  if let Some(stats) = stats {
    text.push_str(&format!(
      "Rating: <b>{}</b> ({} reviews)\n\n",
      stats.average.normalize(),
      stats.count
    ));
  }
  let skip = reviews.len().saturating_sub(REVIEWS_SHOWN);
  for review in &reviews[skip ..] {
    let stars = "⭐".repeat(usize::from(review.rating.unwrap_or(5).min(5)));
    text.push_str(&format!(
      "👤 <b>{}</b> {stars}\n{}\n\n",
      escape(review.author.as_deref().unwrap_or("Anonymous")),
      escape(review.text.as_deref().unwrap_or(""))
    ));
  }
  text
}

/// Orders grouped by day, newest day first. `places` holds the optional
/// "city, district" label of each purchase, index-aligned with `purchases`.
pub fn orders_text(purchases: &[PurchaseRecord], places: &[Option<String>], asset: &str) -> String {
  let mut indexed: Vec<(usize, &PurchaseRecord)> = purchases.iter().enumerate().collect();
  indexed.sort_by(|(_, left), (_, right)| right.day().cmp(&left.day()));

  let mut text = "📦 <b>Your orders:</b>\n\n".to_string();
  let mut current_day = None;
  for (index, purchase) in indexed {
    let day = purchase.day();
    if current_day != Some(day) {
      if current_day.is_some() {
        text.push('\n');
      }
      let heading = day.map(|day| day.to_string()).unwrap_or_else(|| "Date unknown".to_string());
      text.push_str(&format!("📅 <b>{heading}</b>\n"));
      current_day = Some(day);
    }
    text.push_str(&format!(
      " 🌲 <b>{}</b>\n  ({})\n  💰 {} {asset}\n",
      escape(purchase.position_name.as_deref().unwrap_or("Unknown position")),
      escape(purchase.product_name.as_deref().unwrap_or("Unknown product")),
      format_amount(purchase.price),
    ));
    if let Some(Some(place)) = places.get(index) {
      text.push_str(&format!("  🏙️ {}\n", escape(place)));
    }
    text.push('\n');
  }
  text
}

/// Compact list of the most recent purchases with the overall total.
pub fn recent_orders_text(purchases: &[PurchaseRecord], asset: &str) -> String {
  let skip = purchases.len().saturating_sub(ORDERS_GROUPED_LIMIT);
  let mut text = "📦 <b>Your orders:</b>\n\n".to_string();
  for (number, purchase) in purchases[skip ..].iter().enumerate() {
    let date = purchase.day().map(|day| day.to_string()).unwrap_or_else(|| "-".to_string());
    text.push_str(&format!(
      "{}. <b>{}</b>\n   📍 {} | 💰 {} {asset} | 📅 {date}\n\n",
      number + 1,
      escape(purchase.product_name.as_deref().unwrap_or("Unknown product")),
      escape(purchase.position_name.as_deref().unwrap_or("Unknown position")),
      format_amount(purchase.price),
    ));
  }
  text.push_str(&format!("<i>Total orders: {}</i>", purchases.len()));
  text
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;
  use chrono::Utc;

  use super::Action;
  use super::Target;
  use super::location_label;
  use super::orders_text;
  use super::pagination_controls;
  use super::position_text;
  use super::recent_orders_text;
  use super::reviews_text;
  use crate::models::PurchaseRecord;
  use crate::models::Review;
  use crate::models::ReviewStats;
  use crate::testing::city;
  use crate::testing::dec;
  use crate::testing::named;
  use crate::testing::position;

  fn pages(category_id: i64, page: u32, shown: usize, total: usize) -> Vec<Action> {
    pagination_controls(category_id, page, shown, total)
      .into_iter()
      .filter_map(|button| match button.target {
        Target::Callback(action) => Some(action),
        Target::Url(_) => None,
      })
      .collect()
  }

  #[test]
  fn first_full_page_only_offers_next() {
    assert_eq!(pages(3, 1, 7, 20), vec![Action::Page {
      category_id: 3,
      page: 2
    }]);
  }

  #[test]
  fn exact_multiple_of_page_size_stops_at_last_page() {
    assert_eq!(pages(3, 2, 7, 14), vec![Action::Page {
      category_id: 3,
      page: 1
    }]);
  }

  #[test]
  fn short_page_has_no_next() {
    assert!(pages(3, 1, 5, 5).is_empty());
    assert_eq!(pages(3, 3, 6, 20).len(), 1);
  }

  #[test]
  fn location_label_falls_back_to_city_name() {
    let cities = vec![city(5, "Springfield", vec![named(9, "Downtown")])];
    assert_eq!(location_label(&cities, None, None), "🏙️ No city selected");
    assert_eq!(location_label(&cities, Some(5), Some(9)), "🏙️ Springfield, Downtown");
    assert_eq!(location_label(&cities, Some(5), Some(10)), "🏙️ Springfield");
    assert_eq!(location_label(&cities, Some(6), None), "🏙️ No city selected");
  }

  #[test]
  fn hidden_location_is_not_rendered() {
    let position = position(4, 1, "15", Some(named(9, "Downtown")));
    let hidden = position_text(&position, "USDT", false);
    assert!(!hidden.contains("Locker 4"));
    assert!(hidden.contains("15.00 USDT"));

    let shown = position_text(&position, "USDT", true);
    assert!(shown.contains("Locker 4"));
  }

  #[test]
  fn reviews_show_only_the_latest_ten() {
    let reviews: Vec<Review> = (1 ..= 12)
      .map(|index| Review {
        author: Some(format!("author{index}")),
        rating: None,
        text: Some("ok".to_string()),
      })
      .collect();
    let stats = ReviewStats {
      average: dec("4.50"),
      count: 12,
    };
    let text = reviews_text(Some(&stats), &reviews);
    assert!(!text.contains("<b>author2</b>"));
    assert!(text.contains("<b>author3</b>"));
    assert!(text.contains("<b>author12</b>"));
    assert!(text.contains("Rating: <b>4.5</b>"));
  }

  fn purchase(name: &str, day: u32) -> PurchaseRecord {
    PurchaseRecord {
      position_id: Some(1),
      position_name: Some(name.to_string()),
      product_name: Some("Tea".to_string()),
      price: dec("3"),
      purchase_date: Utc.with_ymd_and_hms(2026, 3, day, 12, 0, 0).single(),
    }
  }

  #[test]
  fn orders_are_grouped_newest_day_first() {
    let purchases = vec![purchase("old", 1), purchase("new", 2), purchase("older", 1)];
    let places = vec![None, Some("Springfield, Downtown".to_string()), None];
    let text = orders_text(&purchases, &places, "USDT");

    let newest = text.find("2026-03-02").unwrap();
    let oldest = text.find("2026-03-01").unwrap();
    assert!(newest < oldest);
    assert!(text.find("old").unwrap() < text.find("older").unwrap());
    assert!(text.contains("🏙️ Springfield, Downtown"));
    assert_eq!(text.matches("📅").count(), 2);
  }

  #[test]
  fn long_history_lists_the_last_twenty() {
    let purchases: Vec<PurchaseRecord> = (1 ..= 25).map(|index| purchase(&format!("p{index}"), 1)).collect();
    let text = recent_orders_text(&purchases, "USDT");
    assert!(text.starts_with("📦"));
    assert!(text.contains("1. <b>Tea</b>\n   📍 p6 "));
    assert!(text.contains("20. <b>Tea</b>\n   📍 p25 "));
    assert!(text.contains("Total orders: 25"));
  }
}
