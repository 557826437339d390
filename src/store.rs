use dashmap::DashMap;

pub type UserId = i64;

/// Per-user records created on first access and kept for the process lifetime.
///
/// Each access locks only the shard holding that user, and never across an
/// `.await`: callers take a snapshot, talk to the network, then apply their
/// change with [`SessionStore::update`]. Two events of the same user that
/// interleave this way are not serialized and the last write wins. That race
/// is accepted; there is no per-user sequencing.
pub struct SessionStore<T> {
  entries: DashMap<UserId, T>,
}

impl<T: Default + Clone> SessionStore<T> {
  pub fn new() -> Self {
    Self {
      entries: DashMap::new(),
    }
  }

  pub fn snapshot(&self, user: UserId) -> T {
    self.entries.entry(user).or_default().clone()
  }

  pub fn update<R>(&self, user: UserId, apply: impl FnOnce(&mut T) -> R) -> R {
    let mut entry = self.entries.entry(user).or_default();
    apply(entry.value_mut())
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }
}

impl<T: Default + Clone> Default for SessionStore<T> {
  fn default() -> Self {
    Self::new()
  }
}
