/// Where a user currently is in the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
  NoLocation,
  Browsing,
  AwaitingTopUpAmount,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTopUp {
  pub asset: String,
}

/// Navigation context of one user. The district can only be set together
/// with a city, so every mutation goes through the methods below.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationState {
  city_id: Option<i64>,
  district_id: Option<i64>,
  category_id: Option<i64>,
  product_id: Option<i64>,
  page: u32,
  pending_top_up: Option<PendingTopUp>,
}

impl Default for ConversationState {
  fn default() -> Self {
    Self {
      city_id: None,
      district_id: None,
      category_id: None,
      product_id: None,
      page: 1,
      pending_top_up: None,
    }
  }
}

impl ConversationState {
  pub fn stage(&self) -> Stage {
    if self.pending_top_up.is_some() {
      Stage::AwaitingTopUpAmount
    } else if self.city_id.is_some() {
      Stage::Browsing
    } else {
      Stage::NoLocation
    }
  }

  pub fn city_id(&self) -> Option<i64> {
    self.city_id
  }

  pub fn district_id(&self) -> Option<i64> {
    self.district_id
  }

  pub fn category_id(&self) -> Option<i64> {
    self.category_id
  }

  pub fn product_id(&self) -> Option<i64> {
    self.product_id
  }

  pub fn page(&self) -> u32 {
    self.page
  }

  pub fn select_city(&mut self, city_id: i64) {
    self.city_id = Some(city_id);
    self.district_id = None;
  }

  pub fn select_district(&mut self, city_id: i64, district_id: i64) {
    self.city_id = Some(city_id);
    self.district_id = Some(district_id);
  }

  /// Also drops a pending top-up prompt.
  pub fn reset_location(&mut self) {
    self.city_id = None;
    self.district_id = None;
    self.pending_top_up = None;
  }

  pub fn view_products(&mut self, category_id: i64, page: u32) {
    self.category_id = Some(category_id);
    self.page = page.max(1);
  }

  pub fn view_product(&mut self, product_id: i64) {
    self.product_id = Some(product_id);
  }

  pub fn begin_top_up(&mut self, asset: &str) {
    self.pending_top_up = Some(PendingTopUp {
      asset: asset.to_string(),
    });
  }

  pub fn take_top_up(&mut self) -> Option<PendingTopUp> {
    self.pending_top_up.take()
  }
}

#[cfg(test)]
mod tests {
  use super::ConversationState;
  use super::Stage;

  #[test]
  fn new_state_has_no_location() {
    let state = ConversationState::default();
    assert_eq!(state.stage(), Stage::NoLocation);
    assert_eq!(state.page(), 1);
  }

  #[test]
  fn selecting_a_city_clears_the_district() {
    let mut state = ConversationState::default();
    state.select_district(5, 9);
    assert_eq!(state.district_id(), Some(9));

    state.select_city(6);
    assert_eq!(state.city_id(), Some(6));
    assert_eq!(state.district_id(), None);
    assert_eq!(state.stage(), Stage::Browsing);
  }

  #[test]
  fn reset_clears_city_and_district_together() {
    let mut state = ConversationState::default();
    state.select_district(5, 9);
    state.reset_location();
    assert_eq!(state.city_id(), None);
    assert_eq!(state.district_id(), None);
    assert_eq!(state.stage(), Stage::NoLocation);
  }

  #[test]
  fn reset_drops_pending_top_up() {
    let mut state = ConversationState::default();
    state.select_city(5);
    state.begin_top_up("USDT");
    state.reset_location();
    state.select_city(5);
    assert_eq!(state.stage(), Stage::Browsing);
    assert_eq!(state.take_top_up(), None);
  }

  #[test]
  fn top_up_prompt_is_consumed_once() {
    let mut state = ConversationState::default();
    state.select_city(5);
    state.begin_top_up("USDT");
    assert_eq!(state.stage(), Stage::AwaitingTopUpAmount);
    assert_eq!(state.take_top_up().map(|pending| pending.asset), Some("USDT".to_string()));
    assert_eq!(state.take_top_up(), None);
    assert_eq!(state.stage(), Stage::Browsing);
  }

  #[test]
  fn pages_start_at_one() {
    let mut state = ConversationState::default();
    state.view_products(3, 0);
    assert_eq!(state.page(), 1);
    assert_eq!(state.category_id(), Some(3));
  }
}
