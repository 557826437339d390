//! Dialogue controller. Interprets one inbound event of one user against the
//! session and wallet stores, calls the remote services and returns what to
//! render. Nothing here talks to Telegram directly.

use futures::future::join_all;
use rust_decimal::Decimal;
use teloxide::utils::html::escape;
use tracing::debug;
use tracing::info;
use tracing::instrument;
use tracing::warn;

use crate::backend::ProductQuery;
use crate::bot::action::Action;
use crate::bot::action::MenuCommand;
use crate::bot::context::AppContext;
use crate::bot::render::Button;
use crate::bot::render::Delivery;
use crate::bot::render::ORDERS_GROUPED_LIMIT;
use crate::bot::render::Outcome;
use crate::bot::render::Reply;
use crate::bot::render::back_to_balance;
use crate::bot::render::back_to_categories;
use crate::bot::render::balance_rows;
use crate::bot::render::category_rows;
use crate::bot::render::city_rows;
use crate::bot::render::location_label;
use crate::bot::render::orders_text;
use crate::bot::render::pagination_controls;
use crate::bot::render::pickup;
use crate::bot::render::position_rows;
use crate::bot::render::position_text;
use crate::bot::render::product_caption;
use crate::bot::render::product_rows;
use crate::bot::render::rating_line;
use crate::bot::render::recent_orders_text;
use crate::bot::render::reviews_text;
use crate::bot::state::ConversationState;
use crate::bot::state::Stage;
use crate::config::SettlementMode;
use crate::ledger::Affordability;
use crate::ledger::InvoicePurpose;
use crate::ledger::InvoiceStatus;
use crate::ledger::Settlement;
use crate::models::ClientProfile;
use crate::models::InvoiceRequest;
use crate::models::NamedRef;
use crate::models::Position;
use crate::models::PurchaseOrder;
use crate::store::UserId;
use crate::util::AmountError;
use crate::util::format_amount;
use crate::util::is_cancel_word;
use crate::util::parse_amount;

const DEFAULT_WELCOME: &str = "👋 Welcome to the shop!";
const DEFAULT_ABOUT: &str = "ℹ️ <b>About us</b>";
const DEFAULT_HELP: &str = "❓ <b>Help</b>\n\nContact support with any questions. Use /start to reopen the menu.";
const UNRECOGNIZED_TEXT: &str = "I did not understand that. Use the menu buttons or /help.";

/// The Telegram user behind an event.
#[derive(Debug, Clone)]
pub struct Visitor {
  pub id: UserId,
  pub username: Option<String>,
  pub first_name: Option<String>,
  pub last_name: Option<String>,
}

impl Visitor {
  fn profile(&self) -> ClientProfile {
    ClientProfile {
      telegram_id: self.id,
      username: self.username.clone(),
      first_name: self.first_name.clone(),
      last_name: self.last_name.clone(),
    }
  }

  fn display_name(&self) -> &str {
    self
      .username
      .as_deref()
      .or(self.first_name.as_deref())
      .unwrap_or("not set")
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
  Start,
  BalanceCommand,
  HelpCommand,
  Text(String),
  Action(Action),
}

#[instrument(skip(ctx, visitor), fields(user_id = visitor.id))]
pub async fn dispatch(ctx: &AppContext, visitor: &Visitor, inbound: Inbound) -> Outcome {
  match inbound {
    Inbound::Start => start(ctx, visitor).await,
    Inbound::Action(action) => on_action(ctx, visitor, action).await,
    Inbound::BalanceCommand => match require_location(ctx, visitor.id).await {
      Ok(_) => Outcome::single(balance_menu(ctx, visitor.id, Delivery::Send).await),
      Err(redirect) => redirect,
    },
    Inbound::HelpCommand => match require_location(ctx, visitor.id).await {
      Ok(_) => Outcome::single(content_page(ctx, "help", DEFAULT_HELP).await),
      Err(redirect) => redirect,
    },
    Inbound::Text(text) => match require_location(ctx, visitor.id).await {
      Ok(state) => on_text(ctx, visitor, &state, &text).await,
      Err(redirect) => redirect,
    },
  }
}

/// Main-menu entry guard: without a city every menu function lands on the
/// city picker.
async fn require_location(ctx: &AppContext, user: UserId) -> Result<ConversationState, Outcome> {
  let state = ctx.sessions().snapshot(user);
  if state.city_id().is_some() {
    return Ok(state);
  }
  debug!(user_id = user, "no city selected, redirecting to city selection");
  Err(Outcome::single(city_selection(ctx, Delivery::Send).await))
}

async fn start(ctx: &AppContext, visitor: &Visitor) -> Outcome {
  let user = visitor.id;
  let state = ctx.sessions().update(user, |state| {
    state.take_top_up();
    state.clone()
  });
  info!(user_id = user, sessions = ctx.sessions().len(), "received /start");
  ctx.wallets().refresh(ctx.backend(), user).await;

  let welcome = ctx.backend().content("welcome").await.unwrap_or_default();
  let stats = ctx.backend().review_stats().await;
  let mut text = welcome.text.unwrap_or_else(|| DEFAULT_WELCOME.to_string());
  if let Some(line) = rating_line(stats.as_ref()) {
    text.push_str("\n\n");
    text.push_str(&line);
  }
  let greeting = Reply::illustrated(image_url(ctx, welcome.image).await, text);

  if state.city_id().is_none() {
    return Outcome::many(vec![greeting, city_selection(ctx, Delivery::Send).await]);
  }
  Outcome::single(greeting.main_menu())
}

async fn on_text(ctx: &AppContext, visitor: &Visitor, state: &ConversationState, text: &str) -> Outcome {
  if state.stage() == Stage::AwaitingTopUpAmount {
    return amount_entry(ctx, visitor.id, text).await;
  }

  let Some(command) = MenuCommand::from_label(text) else {
    debug!(user_id = visitor.id, "unrecognized text");
    return Outcome::single(Reply::text(UNRECOGNIZED_TEXT).main_menu());
  };

  let reply = match command {
    MenuCommand::Profile => profile(ctx, visitor, state).await,
    MenuCommand::Catalog => categories(ctx, Delivery::Send).await,
    MenuCommand::City => city_selection(ctx, Delivery::Send).await,
    MenuCommand::Orders => orders(ctx, visitor).await,
    MenuCommand::About => content_page(ctx, "about", DEFAULT_ABOUT).await,
    MenuCommand::Help => content_page(ctx, "help", DEFAULT_HELP).await,
    MenuCommand::Balance => balance_menu(ctx, visitor.id, Delivery::Send).await,
    MenuCommand::Reviews => reviews(ctx).await,
  };
  Outcome::single(reply)
}

async fn amount_entry(ctx: &AppContext, user: UserId, text: &str) -> Outcome {
  if is_cancel_word(text) {
    ctx.sessions().update(user, ConversationState::take_top_up);
    info!(user_id = user, "top-up cancelled");
    return Outcome::single(Reply::text("Top-up cancelled.").main_menu());
  }

  match parse_amount(text) {
    Ok(amount) => {
      let asset = ctx
        .sessions()
        .update(user, ConversationState::take_top_up)
        .map(|pending| pending.asset)
        .unwrap_or_else(|| ctx.asset().to_string());
      let reply = issue_invoice(ctx, user, &asset, amount, InvoicePurpose::TopUp, Delivery::Send).await;
      Outcome::single(reply)
    },
    Err(AmountError::NotPositive) => Outcome::single(
      Reply::text("The amount must be greater than zero. Try again or send «Cancel».").main_menu(),
    ),
    Err(err) => {
      debug!(user_id = user, error = %err, "rejected top-up amount");
      Outcome::single(Reply::text("Enter the amount as a number, for example 12.5").main_menu())
    },
  }
}

async fn on_action(ctx: &AppContext, visitor: &Visitor, action: Action) -> Outcome {
  let user = visitor.id;
  debug!(user_id = user, action = %action, "handling action");
  match action {
    Action::Categories => Outcome::single(categories(ctx, Delivery::Edit).await),
    Action::Category(category_id) => Outcome::single(products(ctx, user, category_id, 1).await),
    Action::Page { category_id, page } => Outcome::single(products(ctx, user, category_id, page).await),
    Action::Product(product_id) => Outcome::single(product_detail(ctx, user, product_id).await),
    Action::ProductInDistrict {
      product_id,
      district_id,
    } => Outcome::single(district_positions(ctx, user, product_id, district_id).await),
    Action::Position(position_id) => Outcome::single(position_detail(ctx, user, position_id).await),
    Action::Buy(position_id) => Outcome::single(purchase(ctx, visitor, position_id).await),
    Action::Cities => Outcome::single(city_selection(ctx, Delivery::Edit).await),
    Action::City(city_id) => select_city(ctx, user, city_id).await,
    Action::District { city_id, district_id } => save_location(ctx, user, city_id, district_id).await,
    Action::AllDistricts { city_id } => Outcome::single(all_districts(ctx, user, city_id).await),
    Action::SwitchDistrict {
      category_id,
      city_id,
      district_id,
    } => {
      ctx
        .sessions()
        .update(user, |state| state.select_district(city_id, district_id));
      Outcome::single(products(ctx, user, category_id, 1).await)
    },
    Action::ResetLocation => Outcome::single(reset_location(ctx, user)),
    Action::MainMenu => Outcome::single(
      Reply::text("🏠 <b>Main menu</b>\n\nUse the buttons below to navigate:").main_menu(),
    ),
    Action::Balance => Outcome::single(balance_menu(ctx, user, Delivery::Edit).await),
    Action::TopUp { asset, amount } => {
      if amount <= Decimal::ZERO {
        return Outcome::default().with_notice("Invalid amount.");
      }
      Outcome::single(issue_invoice(ctx, user, &asset, amount, InvoicePurpose::TopUp, Delivery::Edit).await)
    },
    Action::TopUpCustom { asset } => {
      ctx.sessions().update(user, |state| state.begin_top_up(&asset));
      let prompt = format!(
        "Enter the top-up amount in {}.\nExample: 12.5\nSend «Cancel» to abort.",
        escape(&asset)
      );
      Outcome::single(Reply::text(prompt).main_menu())
    },
    Action::CheckInvoice(invoice_id) => Outcome::single(check_invoice(ctx, user, invoice_id).await),
  }
}

async fn image_url(ctx: &AppContext, path: Option<String>) -> Option<String> {
  match path {
    Some(path) if !path.is_empty() => Some(ctx.media().media_url(&path).await),
    _ => None,
  }
}

async fn current_location_label(ctx: &AppContext, state: &ConversationState) -> String {
  if state.city_id().is_none() {
    return location_label(&[], None, None);
  }
  let cities = ctx.backend().cities().await;
  location_label(&cities, state.city_id(), state.district_id())
}

async fn content_page(ctx: &AppContext, key: &str, fallback: &str) -> Reply {
  let content = ctx.backend().content(key).await.unwrap_or_default();
  let text = content.text.unwrap_or_else(|| fallback.to_string());
  Reply::illustrated(image_url(ctx, content.image).await, text).main_menu()
}

async fn categories(ctx: &AppContext, delivery: Delivery) -> Reply {
  let categories = ctx.backend().categories().await;
  if categories.is_empty() {
    return Reply::text("😔 <b>Categories are unavailable right now</b>").delivered(delivery);
  }
  Reply::text("🏪 <b>Choose a category:</b>")
    .inline(category_rows(&categories))
    .delivered(delivery)
}

#[instrument(skip(ctx))]
async fn products(ctx: &AppContext, user: UserId, category_id: i64, page: u32) -> Reply {
  let state = ctx.sessions().snapshot(user);
  let page = page.max(1);
  let listing = ctx
    .backend()
    .products(ProductQuery {
      category_id,
      page,
      city_id: state.city_id(),
      district_id: state.district_id(),
    })
    .await;

  if listing.rows.is_empty() {
    return empty_category(ctx, &state, category_id).await;
  }

  ctx
    .sessions()
    .update(user, |state| state.view_products(category_id, page));

  let mut rows = product_rows(&listing.rows);
  let controls = pagination_controls(category_id, page, listing.rows.len(), listing.total);
  if !controls.is_empty() {
    rows.push(controls);
  }
  let location = current_location_label(ctx, &state).await;
  rows.push(vec![back_to_categories(), Button::action(location, Action::Cities)]);

  Reply::text(format!("📦 <b>Choose a product (page {page}):</b>"))
    .inline(rows)
    .delivered(Delivery::Edit)
}

/// Nothing matched: suggest other districts of the same city that stock the
/// category, otherwise offer to change the location.
async fn empty_category(ctx: &AppContext, state: &ConversationState, category_id: i64) -> Reply {
  if let Some(city_id) = state.city_id() {
    let alternatives: Vec<NamedRef> = ctx
      .backend()
      .stocked_districts(category_id, city_id)
      .await
      .into_iter()
      .filter(|district| Some(district.id) != state.district_id())
      .collect();

    if !alternatives.is_empty() {
      let mut rows: Vec<Vec<Button>> = alternatives
        .iter()
        .map(|district| {
          vec![Button::action(
            format!("📍 {}", district.name),
            Action::SwitchDistrict {
              category_id,
              city_id,
              district_id: district.id,
            },
          )]
        })
        .collect();
      rows.push(vec![back_to_categories()]);
      return Reply::text(
        "😔 <b>No products of this category at your location.</b>\n\nTry another district that has them:",
      )
      .inline(rows)
      .delivered(Delivery::Edit);
    }
  }

  let hint = if state.city_id().is_some() {
    "\n\nℹ️ Try changing the location filter."
  } else {
    ""
  };
  let location = current_location_label(ctx, state).await;
  Reply::text(format!("😔 <b>No products in this category yet</b>{hint}"))
    .inline(vec![vec![Button::action(location, Action::Cities)], vec![back_to_categories()]])
    .delivered(Delivery::Edit)
}

#[instrument(skip(ctx))]
async fn product_detail(ctx: &AppContext, user: UserId, product_id: i64) -> Reply {
  let state = ctx.sessions().snapshot(user);
  let back = Button::action(
    "🔙 To products",
    state
      .category_id()
      .map(|category_id| Action::Page {
        category_id,
        page: state.page(),
      })
      .unwrap_or(Action::Categories),
  );

  let Some(product) = ctx.backend().product(product_id).await else {
    return Reply::text("😔 <b>Product not found</b>")
      .inline(vec![vec![back]])
      .delivered(Delivery::Edit);
  };
  let positions = ctx.backend().positions(product_id, state.city_id(), None).await;
  ctx.sessions().update(user, |state| state.view_product(product_id));

  let mut districts: Vec<&NamedRef> = Vec::new();
  for district in positions.iter().filter_map(|position| position.district.as_ref()) {
    if !districts.iter().any(|known| known.id == district.id) {
      districts.push(district);
    }
  }

  let mut text = product_caption(&product);
  let mut rows = if positions.is_empty() {
    text.push_str("😔 <b>Out of stock in your city.</b>");
    Vec::new()
  } else if districts.len() <= 1 {
    text.push_str("📍 <b>Choose a position:</b>");
    position_rows(&positions, ctx.asset())
  } else {
    text.push_str("📍 <b>Choose the district to pick up from:</b>");
    districts
      .iter()
      .map(|district| {
        vec![Button::action(
          format!("📍 {}", district.name),
          Action::ProductInDistrict {
            product_id,
            district_id: district.id,
          },
        )]
      })
      .collect()
  };
  rows.push(vec![back]);

  let image = image_url(ctx, product.img.clone()).await;
  let delivery = if image.is_some() { Delivery::Send } else { Delivery::Edit };
  Reply::illustrated(image, text).inline(rows).delivered(delivery)
}

async fn district_positions(ctx: &AppContext, user: UserId, product_id: i64, district_id: i64) -> Reply {
  let state = ctx.sessions().snapshot(user);
  let name = ctx
    .backend()
    .product(product_id)
    .await
    .map(|product| product.name)
    .unwrap_or_else(|| "Product".to_string());
  let positions = ctx
    .backend()
    .positions(product_id, state.city_id(), Some(district_id))
    .await;

  let body = if positions.is_empty() {
    "😔 <b>Nothing left in this district.</b>"
  } else {
    "📍 <b>District selected.</b> Choose a position:"
  };
  let mut rows = position_rows(&positions, ctx.asset());
  rows.push(vec![Button::action("🔙 To districts", Action::Product(product_id))]);

  Reply::text(format!("<b>📦 {}</b>\n\n{body}", escape(&name)))
    .inline(rows)
    .delivered(Delivery::Edit)
}

async fn position_detail(ctx: &AppContext, user: UserId, position_id: i64) -> Reply {
  let Some(position) = ctx.backend().position(position_id).await else {
    return Reply::text("😔 <b>Position not found</b>")
      .inline(vec![vec![back_to_categories()]])
      .delivered(Delivery::Edit);
  };

  let reveal = ctx.settlement() == SettlementMode::Ledger;
  let back = position
    .product
    .as_ref()
    .map(|product| product.id)
    .or_else(|| ctx.sessions().snapshot(user).product_id())
    .map(Action::Product)
    .unwrap_or(Action::Categories);
  Reply::text(position_text(&position, ctx.asset(), reveal))
    .inline(vec![
      vec![Button::action("🛒 Buy", Action::Buy(position.id))],
      vec![Button::action("🔙 To positions", back)],
    ])
    .delivered(Delivery::Edit)
}

#[instrument(skip(ctx, visitor), fields(user_id = visitor.id))]
async fn purchase(ctx: &AppContext, visitor: &Visitor, position_id: i64) -> Reply {
  let user = visitor.id;
  let Some(position) = ctx.backend().position(position_id).await else {
    return Reply::text("❌ <b>Error:</b> position not found")
      .inline(vec![vec![back_to_categories()]])
      .delivered(Delivery::Edit);
  };

  if ctx.backend().ensure_client(&visitor.profile()).await.is_none() {
    return Reply::text("❌ <b>Error:</b> could not register you as a client")
      .inline(vec![vec![Button::action("🔙 Back", Action::Position(position_id))]])
      .delivered(Delivery::Edit);
  }

  let ledger = ctx.wallets().refresh(ctx.backend(), user).await;
  match ctx.wallets().check(user, position.price) {
    Affordability::Covered => place_order(ctx, user, &position, String::new()).await,
    Affordability::Short { missing } => match ctx.settlement() {
      SettlementMode::Ledger => {
        info!(user_id = user, position_id, missing = %missing, "balance does not cover the price");
        let asset = escape(ctx.asset());
        Reply::text(format!(
          "❌ <b>Insufficient funds</b>\n\nPosition price: <b>{} {asset}</b>\nAvailable: <b>{} {asset}</b>\nMissing: <b>{} {asset}</b>",
          format_amount(position.price),
          format_amount(ledger.balance),
          format_amount(missing),
        ))
        .inline(vec![
          vec![Button::action("💳 Top up balance", Action::Balance)],
          vec![Button::action("🔙 Back", Action::Position(position_id))],
        ])
        .delivered(Delivery::Edit)
      },
      SettlementMode::Invoice => {
        let purpose = InvoicePurpose::Purchase { position_id };
        issue_invoice(ctx, user, ctx.asset(), position.price, purpose, Delivery::Edit).await
      },
    },
  }
}

/// Places the order and reveals the pickup point. `preface` is prepended to
/// the result text.
async fn place_order(ctx: &AppContext, user: UserId, position: &Position, mut preface: String) -> Reply {
  let order = PurchaseOrder::for_position(position);
  let receipt = ctx.backend().add_purchase(user, &order).await;

  if !receipt.is_some_and(|receipt| receipt.success) {
    warn!(user_id = user, position_id = position.id, "purchase was not accepted");
    preface.push_str("❌ <b>The order could not be placed.</b>");
    return Reply::text(preface)
      .inline(vec![vec![Button::action("🔙 Back", Action::Position(position.id))]])
      .delivered(Delivery::Edit);
  }

  let ledger = ctx.wallets().refresh(ctx.backend(), user).await;
  info!(user_id = user, position_id = position.id, price = %position.price, "purchase placed");
  let asset = escape(ctx.asset());
  preface.push_str(&format!(
    "✅ <b>Order placed!</b>\n\nProduct: {}\nPosition: {}\nPrice: {} {asset}\n🏢 Pickup: {}\n\nBalance: <b>{} {asset}</b>",
    escape(position.product_name().unwrap_or("Unknown")),
    escape(&position.name),
    format_amount(position.price),
    pickup(position),
    format_amount(ledger.balance),
  ));
  Reply::text(preface)
    .inline(vec![vec![Button::action("🛍️ Back to catalog", Action::Categories)]])
    .delivered(Delivery::Edit)
}

async fn issue_invoice(
  ctx: &AppContext,
  user: UserId,
  asset: &str,
  amount: Decimal,
  purpose: InvoicePurpose,
  delivery: Delivery,
) -> Reply {
  let description = match purpose {
    InvoicePurpose::TopUp => "Balance top-up".to_string(),
    InvoicePurpose::Purchase { position_id } => format!("Payment for position #{position_id}"),
  };
  let request = InvoiceRequest {
    asset: asset.to_string(),
    amount,
    description: Some(description),
    payload: Some(user.to_string()),
  };

  let Some(invoice) = ctx.payments().create_invoice(&request).await else {
    return Reply::text("❌ <b>Could not create an invoice</b>\nCheck the payment settings and try again.")
      .inline(vec![vec![back_to_balance()]])
      .delivered(delivery);
  };
  ctx
    .wallets()
    .record_invoice(user, invoice.invoice_id, amount, asset, purpose);

  let mut rows = Vec::new();
  if let Some(link) = invoice.payment_link() {
    rows.push(vec![Button::link("Pay via Crypto Bot", link)]);
  }
  rows.push(vec![Button::action(
    "🔄 Check payment",
    Action::CheckInvoice(invoice.invoice_id),
  )]);

  let heading = match purpose {
    InvoicePurpose::TopUp => "✅ Invoice created!",
    InvoicePurpose::Purchase { .. } => "🧾 Pay this invoice to complete the purchase.",
  };
  Reply::text(format!(
    "{heading}\nAmount: <b>{} {}</b>\nInvoice ID: <code>{}</code>",
    format_amount(amount),
    escape(asset),
    invoice.invoice_id
  ))
  .inline(rows)
  .delivered(delivery)
}

#[instrument(skip(ctx))]
async fn check_invoice(ctx: &AppContext, user: UserId, invoice_id: i64) -> Reply {
  let Some(invoice) = ctx.payments().invoice(invoice_id).await else {
    return Reply::text("❌ Could not fetch the payment status. Try again later.")
      .inline(vec![vec![back_to_balance()]])
      .delivered(Delivery::Edit);
  };

  let status = InvoiceStatus::from_processor(&invoice.status);
  if status != InvoiceStatus::Paid {
    ctx.wallets().observe_status(user, invoice_id, status);
    let mut rows = Vec::new();
    if status == InvoiceStatus::Active {
      rows.push(vec![Button::action("🔄 Check payment", Action::CheckInvoice(invoice_id))]);
    }
    rows.push(vec![back_to_balance()]);
    return Reply::text(format!(
      "Invoice #{invoice_id} has status: <b>{}</b>.\nPress «Check payment» once the payment is complete.",
      escape(&invoice.status)
    ))
    .inline(rows)
    .delivered(Delivery::Edit);
  }

  match ctx.wallets().settle_invoice(ctx.backend(), user, invoice_id).await {
    Settlement::Credited {
      record,
      balance,
      persisted,
    } => {
      let mut text = format!(
        "✅ Payment confirmed!\nCredited <b>{} {}</b>.\n",
        format_amount(record.amount),
        escape(&record.asset)
      );
      if !persisted {
        text.push_str("⚠️ The credit is not saved on the server yet. Contact support if it disappears.\n");
      }
      match record.purpose {
        InvoicePurpose::TopUp => {
          text.push_str(&format!(
            "Current balance: <b>{} {}</b>",
            format_amount(balance),
            escape(&record.asset)
          ));
          Reply::text(text)
            .inline(vec![vec![back_to_balance()]])
            .delivered(Delivery::Edit)
        },
        InvoicePurpose::Purchase { position_id } => {
          text.push('\n');
          match ctx.backend().position(position_id).await {
            Some(position) => place_order(ctx, user, &position, text).await,
            None => {
              warn!(user_id = user, invoice_id, position_id, "paid position is gone");
              text.push_str("The position is no longer available. The amount stays on your balance.");
              Reply::text(text)
                .inline(vec![vec![back_to_balance()]])
                .delivered(Delivery::Edit)
            },
          }
        },
      }
    },
    Settlement::AlreadySettled(record) => Reply::text(format!(
      "Invoice #{invoice_id} is already paid and credited ({} {}).",
      format_amount(record.amount),
      escape(&record.asset)
    ))
    .inline(vec![vec![back_to_balance()]])
    .delivered(Delivery::Edit),
    Settlement::UnknownInvoice => {
      warn!(user_id = user, invoice_id, "paid invoice is not known locally");
      Reply::text(format!(
        "Invoice #{invoice_id} is paid, but it was not issued in this session. Contact support to have it credited."
      ))
      .inline(vec![vec![back_to_balance()]])
      .delivered(Delivery::Edit)
    },
  }
}

async fn balance_menu(ctx: &AppContext, user: UserId, delivery: Delivery) -> Reply {
  let ledger = ctx.wallets().refresh(ctx.backend(), user).await;
  let asset = ctx.asset();
  Reply::text(format!(
    "💳 <b>Your balance</b>\n\nAvailable: <b>{} {}</b>\nChoose a top-up amount, enter your own, or check payment of open invoices.",
    format_amount(ledger.balance),
    escape(asset)
  ))
  .inline(balance_rows(asset, ledger.open_invoices()))
  .delivered(delivery)
}

async fn profile(ctx: &AppContext, visitor: &Visitor, state: &ConversationState) -> Reply {
  let (purchases, username) = match ctx.backend().purchases(visitor.id).await {
    Some(history) => {
      let stored = history.client.and_then(|client| client.username);
      (
        history.total,
        stored.unwrap_or_else(|| visitor.display_name().to_string()),
      )
    },
    None => {
      ctx.backend().ensure_client(&visitor.profile()).await;
      (0, visitor.display_name().to_string())
    },
  };
  let location = current_location_label(ctx, state).await;
  let ledger = ctx.wallets().refresh(ctx.backend(), visitor.id).await;

  Reply::text(format!(
    "👤 <b>Profile</b>\n\n🆔 ID: {}\n📛 Username: @{}\nCompleted purchases: <b>{purchases}</b>\n\nBalance: <b>{} {}</b>\nYour location: {}",
    visitor.id,
    escape(&username),
    format_amount(ledger.balance),
    escape(ctx.asset()),
    escape(&location),
  ))
  .main_menu()
}

async fn orders(ctx: &AppContext, visitor: &Visitor) -> Reply {
  let history = ctx.backend().purchases(visitor.id).await;
  if history.is_none() {
    ctx.backend().ensure_client(&visitor.profile()).await;
  }
  let purchases = history.map(|history| history.purchases).unwrap_or_default();

  if purchases.is_empty() {
    return Reply::text("📦 <b>Your orders</b>\n\nYou have no completed orders yet.").main_menu();
  }
  if purchases.len() > ORDERS_GROUPED_LIMIT {
    return Reply::text(recent_orders_text(&purchases, ctx.asset())).main_menu();
  }

  let places = join_all(
    purchases
      .iter()
      .map(|purchase| purchase_place(ctx, purchase.position_id)),
  )
  .await;
  Reply::text(orders_text(&purchases, &places, ctx.asset())).main_menu()
}

async fn purchase_place(ctx: &AppContext, position_id: Option<i64>) -> Option<String> {
  let position = ctx.backend().position(position_id?).await?;
  let city = position.city?;
  Some(match position.district {
    Some(district) => format!("{}, {}", city.name, district.name),
    None => city.name,
  })
}

async fn reviews(ctx: &AppContext) -> Reply {
  let reviews = ctx.backend().reviews().await;
  if reviews.is_empty() {
    return Reply::text("😔 <b>No reviews yet</b>").main_menu();
  }
  let stats = ctx.backend().review_stats().await;
  Reply::text(reviews_text(stats.as_ref(), &reviews)).main_menu()
}

async fn city_selection(ctx: &AppContext, delivery: Delivery) -> Reply {
  let cities = ctx.backend().cities().await;
  if cities.is_empty() {
    return Reply::text("😔 <b>The city list is unavailable right now</b>").delivered(delivery);
  }
  Reply::text("🏙️ <b>Choose a city:</b>")
    .inline(city_rows(&cities))
    .delivered(delivery)
}

fn city_not_found() -> Reply {
  Reply::text("😔 <b>City not found</b>")
    .inline(vec![vec![Button::action("🔙 To cities", Action::Cities)]])
    .delivered(Delivery::Edit)
}

fn main_menu_activated() -> Reply {
  Reply::text("🏠 <b>Main menu activated</b>").main_menu()
}

async fn select_city(ctx: &AppContext, user: UserId, city_id: i64) -> Outcome {
  let cities = ctx.backend().cities().await;
  let Some(city) = cities.into_iter().find(|city| city.id == city_id) else {
    warn!(user_id = user, city_id, "selected city does not resolve");
    return Outcome::single(city_not_found());
  };
  ctx.sessions().update(user, |state| state.select_city(city.id));
  info!(user_id = user, city_id, "city selected");

  let mut text = format!("📍 <b>City selected!</b>\n\n🏙️ {}", escape(&city.name));
  let confirmation = if city.districts.is_empty() {
    Reply::text(text)
  } else {
    text.push_str("\n\nNarrow the catalog down to a district or keep all of them:");
    let mut rows: Vec<Vec<Button>> = city
      .districts
      .iter()
      .map(|district| {
        vec![Button::action(
          format!("📍 {}", district.name),
          Action::District {
            city_id: city.id,
            district_id: district.id,
          },
        )]
      })
      .collect();
    rows.push(vec![Button::action(
      "🏙️ All districts",
      Action::AllDistricts { city_id: city.id },
    )]);
    Reply::text(text).inline(rows)
  };

  Outcome::many(vec![confirmation.delivered(Delivery::Edit), main_menu_activated()])
}

async fn save_location(ctx: &AppContext, user: UserId, city_id: i64, district_id: i64) -> Outcome {
  let cities = ctx.backend().cities().await;
  let Some(city) = cities.iter().find(|city| city.id == city_id) else {
    return Outcome::single(city_not_found());
  };

  let district = city.districts.iter().find(|district| district.id == district_id);
  let mut location = format!("🏙️ {}", escape(&city.name));
  match district {
    Some(district) => {
      ctx
        .sessions()
        .update(user, |state| state.select_district(city.id, district.id));
      location.push_str(&format!(", 📍 {}", escape(&district.name)));
    },
    None => {
      warn!(user_id = user, city_id, district_id, "district does not belong to the city");
      ctx.sessions().update(user, |state| state.select_city(city.id));
    },
  }
  info!(user_id = user, city_id, district_id, "location saved");

  Outcome::many(vec![
    Reply::text(format!(
      "✅ <b>Location saved!</b>\n\n{location}\n\nProducts are now filtered by the selected location."
    ))
    .delivered(Delivery::Edit),
    main_menu_activated(),
  ])
}

async fn all_districts(ctx: &AppContext, user: UserId, city_id: i64) -> Reply {
  let cities = ctx.backend().cities().await;
  let Some(city) = cities.iter().find(|city| city.id == city_id) else {
    return city_not_found();
  };
  ctx.sessions().update(user, |state| state.select_city(city.id));

  Reply::text(format!(
    "🏙️ City: <b>{}</b>\n\n✅ You will now see products from all districts of this city.",
    escape(&city.name)
  ))
  .inline(vec![vec![Button::action("🛍️ To catalog", Action::Categories)]])
  .delivered(Delivery::Edit)
}

fn reset_location(ctx: &AppContext, user: UserId) -> Reply {
  ctx.sessions().update(user, ConversationState::reset_location);
  info!(user_id = user, "location reset");
  Reply::text("✅ <b>Location reset!</b>\n\nChoose a city to keep browsing the catalog.")
    .inline(vec![vec![Button::action("🏙️ Choose a city", Action::Cities)]])
    .delivered(Delivery::Edit)
}
