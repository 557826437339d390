//! Per-user wallet cache and the invoices issued on the user's behalf.
//!
//! The backend owns the real balance. The local copy is refreshed before any
//! balance-sensitive decision and is credited locally exactly once per paid
//! invoice, after which the credit is pushed to the backend.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::backend::Backend;
use crate::store::SessionStore;
use crate::store::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvoiceStatus {
  Active,
  Paid,
  Expired,
  Unknown,
}

impl InvoiceStatus {
  pub fn from_processor(raw: &str) -> Self {
    match raw {
      "active" => Self::Active,
      "paid" => Self::Paid,
      "expired" => Self::Expired,
      _ => Self::Unknown,
    }
  }
}

/// What the paid amount is for once it lands in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvoicePurpose {
  TopUp,
  Purchase { position_id: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceRecord {
  pub amount: Decimal,
  pub asset: String,
  pub status: InvoiceStatus,
  pub purpose: InvoicePurpose,
}

#[derive(Debug, Clone, Default)]
pub struct WalletLedger {
  pub balance: Decimal,
  pub invoices: BTreeMap<i64, InvoiceRecord>,
}

impl WalletLedger {
  /// Invoices that may still turn into a payment.
  pub fn open_invoices(&self) -> impl Iterator<Item = (i64, &InvoiceRecord)> {
    self
      .invoices
      .iter()
      .filter(|(_, record)| matches!(record.status, InvoiceStatus::Active | InvoiceStatus::Unknown))
      .map(|(id, record)| (*id, record))
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Affordability {
  Covered,
  Short { missing: Decimal },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
  Credited {
    record: InvoiceRecord,
    balance: Decimal,
    persisted: bool,
  },
  AlreadySettled(InvoiceRecord),
  UnknownInvoice,
}

pub struct Wallets {
  ledgers: SessionStore<WalletLedger>,
}

impl Wallets {
  pub fn new() -> Self {
    Self {
      ledgers: SessionStore::new(),
    }
  }

  pub fn snapshot(&self, user: UserId) -> WalletLedger {
    self.ledgers.snapshot(user)
  }

  /// Pulls the authoritative balance. On failure the cached value stays.
  pub async fn refresh(&self, backend: &dyn Backend, user: UserId) -> WalletLedger {
    match backend.balance(user).await {
      Some(snapshot) => self.ledgers.update(user, |ledger| {
        ledger.balance = snapshot.balance;
        ledger.clone()
      }),
      None => {
        warn!(user_id = user, "balance refresh failed, keeping cached value");
        self.ledgers.snapshot(user)
      },
    }
  }

  /// Compares the cached balance against a price. Call `refresh` first.
  pub fn check(&self, user: UserId, price: Decimal) -> Affordability {
    let balance = self.ledgers.snapshot(user).balance;
    if balance >= price {
      Affordability::Covered
    } else {
      Affordability::Short {
        missing: price - balance,
      }
    }
  }

  pub fn record_invoice(&self, user: UserId, invoice_id: i64, amount: Decimal, asset: &str, purpose: InvoicePurpose) {
    self.ledgers.update(user, |ledger| {
      ledger.invoices.insert(
        invoice_id,
        InvoiceRecord {
          amount,
          asset: asset.to_string(),
          status: InvoiceStatus::Active,
          purpose,
        },
      );
    });
    info!(user_id = user, invoice_id, amount = %amount, asset, "recorded invoice");
  }

  /// Stores a status reported by the processor. `paid` is only reachable
  /// through [`Wallets::settle_invoice`], and a paid record never changes.
  pub fn observe_status(&self, user: UserId, invoice_id: i64, status: InvoiceStatus) {
    if status == InvoiceStatus::Paid {
      return;
    }
    self.ledgers.update(user, |ledger| {
      if let Some(record) = ledger.invoices.get_mut(&invoice_id)
        && record.status != InvoiceStatus::Paid
      {
        record.status = status;
      }
    });
  }

  /// Credits a paid invoice once. The local credit happens before the remote
  /// persist call and is kept even when that call fails.
  pub async fn settle_invoice(&self, backend: &dyn Backend, user: UserId, invoice_id: i64) -> Settlement {
    let credited = self.ledgers.update(user, |ledger| {
      let record = ledger.invoices.get_mut(&invoice_id)?;
      if record.status == InvoiceStatus::Paid {
        return Some(Err(record.clone()));
      }
      record.status = InvoiceStatus::Paid;
      let record = record.clone();
      ledger.balance += record.amount;
      Some(Ok(record))
    });

    let record = match credited {
      None => return Settlement::UnknownInvoice,
      Some(Err(record)) => return Settlement::AlreadySettled(record),
      Some(Ok(record)) => record,
    };

    match backend.adjust_balance(user, record.amount).await {
      Some(snapshot) => {
        let balance = self.ledgers.update(user, |ledger| {
          ledger.balance = snapshot.balance;
          ledger.balance
        });
        info!(user_id = user, invoice_id, amount = %record.amount, balance = %balance, "settled invoice");
        Settlement::Credited {
          record,
          balance,
          persisted: true,
        }
      },
      None => {
        let balance = self.ledgers.snapshot(user).balance;
        error!(user_id = user, invoice_id, amount = %record.amount, "credit applied locally but not persisted");
        Settlement::Credited {
          record,
          balance,
          persisted: false,
        }
      },
    }
  }
}

impl Default for Wallets {
  fn default() -> Self {
    Self::new()
  }
}
