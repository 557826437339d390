use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use thiserror::Error;

/// Everything an inline button can ask for. Encoded into callback data as
/// `tag:arg:arg` and decoded once when the callback arrives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
  Categories,
  Category(i64),
  Page { category_id: i64, page: u32 },
  Product(i64),
  ProductInDistrict { product_id: i64, district_id: i64 },
  Position(i64),
  Buy(i64),
  Cities,
  City(i64),
  District { city_id: i64, district_id: i64 },
  AllDistricts { city_id: i64 },
  SwitchDistrict { category_id: i64, city_id: i64, district_id: i64 },
  ResetLocation,
  MainMenu,
  Balance,
  TopUp { asset: String, amount: Decimal },
  TopUpCustom { asset: String },
  CheckInvoice(i64),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ActionError {
  #[error("unknown action tag '{0}'")]
  UnknownTag(String),
  #[error("malformed arguments for '{0}'")]
  BadArguments(String),
}

impl fmt::Display for Action {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Categories => write!(f, "cats"),
      Self::Category(id) => write!(f, "cat:{id}"),
      Self::Page { category_id, page } => write!(f, "page:{category_id}:{page}"),
      Self::Product(id) => write!(f, "prod:{id}"),
      Self::ProductInDistrict {
        product_id,
        district_id,
      } => write!(f, "pdist:{product_id}:{district_id}"),
      Self::Position(id) => write!(f, "pos:{id}"),
      Self::Buy(id) => write!(f, "buy:{id}"),
      Self::Cities => write!(f, "cities"),
      Self::City(id) => write!(f, "city:{id}"),
      Self::District { city_id, district_id } => write!(f, "dist:{city_id}:{district_id}"),
      Self::AllDistricts { city_id } => write!(f, "alldist:{city_id}"),
      Self::SwitchDistrict {
        category_id,
        city_id,
        district_id,
      } => write!(f, "sw:{category_id}:{city_id}:{district_id}"),
      Self::ResetLocation => write!(f, "reset"),
      Self::MainMenu => write!(f, "menu"),
      Self::Balance => write!(f, "bal"),
      Self::TopUp { asset, amount } => write!(f, "topup:{asset}:{amount}"),
      Self::TopUpCustom { asset } => write!(f, "topup_custom:{asset}"),
      Self::CheckInvoice(id) => write!(f, "check:{id}"),
    }
  }
}

impl FromStr for Action {
  type Err = ActionError;

  fn from_str(data: &str) -> Result<Self, Self::Err> {
    let mut parts = data.split(':');
    let tag = parts.next().unwrap_or_default();
    let args: Vec<&str> = parts.collect();

    let action = match (tag, args.as_slice()) {
      ("cats", []) => Self::Categories,
      ("cat", [id]) => Self::Category(number("cat", id)?),
      ("page", [category, page]) => Self::Page {
        category_id: number("page", category)?,
        page: number("page", page)?,
      },
      ("prod", [id]) => Self::Product(number("prod", id)?),
      ("pdist", [product, district]) => Self::ProductInDistrict {
        product_id: number("pdist", product)?,
        district_id: number("pdist", district)?,
      },
      ("pos", [id]) => Self::Position(number("pos", id)?),
      ("buy", [id]) => Self::Buy(number("buy", id)?),
      ("cities", []) => Self::Cities,
      ("city", [id]) => Self::City(number("city", id)?),
      ("dist", [city, district]) => Self::District {
        city_id: number("dist", city)?,
        district_id: number("dist", district)?,
      },
      ("alldist", [city]) => Self::AllDistricts {
        city_id: number("alldist", city)?,
      },
      ("sw", [category, city, district]) => Self::SwitchDistrict {
        category_id: number("sw", category)?,
        city_id: number("sw", city)?,
        district_id: number("sw", district)?,
      },
      ("reset", []) => Self::ResetLocation,
      ("menu", []) => Self::MainMenu,
      ("bal", []) => Self::Balance,
      ("topup", [asset, amount]) if !asset.is_empty() => Self::TopUp {
        asset: asset.to_string(),
        amount: number("topup", amount)?,
      },
      ("topup_custom", [asset]) if !asset.is_empty() => Self::TopUpCustom {
        asset: asset.to_string(),
      },
      ("check", [id]) => Self::CheckInvoice(number("check", id)?),
      (known, _) if KNOWN_TAGS.contains(&known) => return Err(ActionError::BadArguments(known.to_string())),
      (other, _) => return Err(ActionError::UnknownTag(other.to_string())),
    };
    Ok(action)
  }
}

const KNOWN_TAGS: &[&str] = &[
  "cats",
  "cat",
  "page",
  "prod",
  "pdist",
  "pos",
  "buy",
  "cities",
  "city",
  "dist",
  "alldist",
  "sw",
  "reset",
  "menu",
  "bal",
  "topup",
  "topup_custom",
  "check",
];

fn number<T: FromStr>(tag: &str, raw: &str) -> Result<T, ActionError> {
  raw.parse::<T>().map_err(|_| ActionError::BadArguments(tag.to_string()))
}

/// Buttons of the persistent main menu keyboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuCommand {
  Profile,
  Catalog,
  City,
  Orders,
  About,
  Help,
  Balance,
  Reviews,
}

impl MenuCommand {
  pub const LAYOUT: [&'static [MenuCommand]; 3] = [
    &[Self::Profile, Self::Catalog, Self::City],
    &[Self::Orders, Self::About, Self::Help],
    &[Self::Balance, Self::Reviews],
  ];

  pub fn label(self) -> &'static str {
    match self {
      Self::Profile => "👤 Profile",
      Self::Catalog => "🛍️ Catalog",
      Self::City => "🏙️ City",
      Self::Orders => "📦 Orders",
      Self::About => "ℹ️ About",
      Self::Help => "❓ Help",
      Self::Balance => "💳 Balance",
      Self::Reviews => "⭐ Reviews",
    }
  }

  pub fn from_label(text: &str) -> Option<Self> {
    let text = text.trim();
    Self::LAYOUT
      .iter()
      .flat_map(|row| row.iter().copied())
      .find(|command| command.label() == text)
  }
}

#[cfg(test)]
mod tests {
  use std::str::FromStr;

  use rust_decimal::Decimal;

  use super::Action;
  use super::ActionError;
  use super::MenuCommand;

  #[test]
  fn decodes_tagged_payloads() {
    assert_eq!("cat:4".parse(), Ok(Action::Category(4)));
    assert_eq!(
      "page:4:2".parse(),
      Ok(Action::Page {
        category_id: 4,
        page: 2
      })
    );
    assert_eq!(
      "sw:1:5:9".parse(),
      Ok(Action::SwitchDistrict {
        category_id: 1,
        city_id: 5,
        district_id: 9
      })
    );
    assert_eq!(
      "topup:USDT:12.5".parse(),
      Ok(Action::TopUp {
        asset: "USDT".to_string(),
        amount: Decimal::from_str("12.5").unwrap()
      })
    );
  }

  #[test]
  fn encoding_is_what_decoding_expects() {
    let actions = [
      Action::ProductInDistrict {
        product_id: 3,
        district_id: 8,
      },
      Action::TopUpCustom {
        asset: "TON".to_string(),
      },
      Action::ResetLocation,
      Action::CheckInvoice(123456),
    ];
    for action in actions {
      assert_eq!(action.to_string().parse::<Action>(), Ok(action));
    }
    let switch = Action::SwitchDistrict {
      category_id: 1,
      city_id: 5,
      district_id: 9,
    };
    assert_eq!(switch.to_string(), "sw:1:5:9");
  }

  #[test]
  fn rejects_unknown_and_malformed_payloads() {
    assert_eq!(
      "fav:add:1".parse::<Action>(),
      Err(ActionError::UnknownTag("fav".to_string()))
    );
    assert_eq!("cat:abc".parse::<Action>(), Err(ActionError::BadArguments("cat".to_string())));
    assert_eq!("page:1".parse::<Action>(), Err(ActionError::BadArguments("page".to_string())));
    assert_eq!("topup::5".parse::<Action>(), Err(ActionError::BadArguments("topup".to_string())));
  }

  #[test]
  fn callback_data_fits_telegram_limit() {
    let longest = Action::SwitchDistrict {
      category_id: i64::MAX,
      city_id: i64::MAX,
      district_id: i64::MAX,
    };
    let encoded = longest.to_string();
    assert!(encoded.len() <= 64, "{} bytes", encoded.len());
    assert_eq!(encoded.parse::<Action>(), Ok(longest));
  }

  #[test]
  fn menu_labels_round_trip() {
    assert_eq!(MenuCommand::from_label("💳 Balance"), Some(MenuCommand::Balance));
    assert_eq!(MenuCommand::from_label(" 🛍️ Catalog "), Some(MenuCommand::Catalog));
    assert_eq!(MenuCommand::from_label("hello"), None);
  }
}
