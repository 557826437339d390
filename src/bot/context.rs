use std::sync::Arc;

use crate::backend::Backend;
use crate::bot::state::ConversationState;
use crate::config::SettlementMode;
use crate::ledger::Wallets;
use crate::media::MediaUrls;
use crate::payments::Payments;
use crate::store::SessionStore;

pub struct AppContext {
  backend: Arc<dyn Backend>,
  payments: Arc<dyn Payments>,
  media: MediaUrls,
  sessions: SessionStore<ConversationState>,
  wallets: Wallets,
  asset: String,
  settlement: SettlementMode,
}

impl AppContext {
  pub fn new(
    backend: Arc<dyn Backend>,
    payments: Arc<dyn Payments>,
    media: MediaUrls,
    asset: String,
    settlement: SettlementMode,
  ) -> Self {
    Self {
      backend,
      payments,
      media,
      sessions: SessionStore::new(),
      wallets: Wallets::new(),
      asset,
      settlement,
    }
  }

  pub fn backend(&self) -> &dyn Backend {
    self.backend.as_ref()
  }

  pub fn payments(&self) -> &dyn Payments {
    self.payments.as_ref()
  }

  pub fn media(&self) -> &MediaUrls {
    &self.media
  }

  pub fn sessions(&self) -> &SessionStore<ConversationState> {
    &self.sessions
  }

  pub fn wallets(&self) -> &Wallets {
    &self.wallets
  }

  pub fn asset(&self) -> &str {
    &self.asset
  }

  pub fn settlement(&self) -> SettlementMode {
    self.settlement
  }
}
