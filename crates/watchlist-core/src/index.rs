//! Secondary indexes derived from the primary records.
//!
//! Only the entity store calls the mutators here, always in the same step as
//! the primary-record change they mirror.

use std::collections::{BTreeSet, HashMap};

use crate::ids::WatchlistId;

#[derive(Debug, Default)]
pub struct IndexManager {
    by_owner: HashMap<String, BTreeSet<WatchlistId>>,
    public: BTreeSet<WatchlistId>,
    by_coin: HashMap<String, BTreeSet<WatchlistId>>,
}

impl IndexManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register_watchlist(&mut self, owner_id: &str, id: WatchlistId, is_public: bool) {
        self.by_owner.entry(owner_id.to_string()).or_default().insert(id);
        self.set_public(id, is_public);
    }

    pub(crate) fn set_public(&mut self, id: WatchlistId, is_public: bool) {
        if is_public {
            self.public.insert(id);
        } else {
            self.public.remove(&id);
        }
    }

    /// Drop every index entry mentioning `id`. `coin_ids` are the catalog
    /// ids of the watchlist's items at the time of deletion.
    pub(crate) fn unregister_watchlist<'a>(
        &mut self,
        owner_id: &str,
        id: WatchlistId,
        coin_ids: impl IntoIterator<Item = &'a str>,
    ) {
        if let Some(owned) = self.by_owner.get_mut(owner_id) {
            owned.remove(&id);
            if owned.is_empty() {
                self.by_owner.remove(owner_id);
            }
        }
        self.public.remove(&id);
        for coin_id in coin_ids {
            self.unregister_coin(coin_id, id);
        }
    }

    pub(crate) fn register_coin(&mut self, coin_id: &str, id: WatchlistId) {
        self.by_coin.entry(coin_id.to_string()).or_default().insert(id);
    }

    pub(crate) fn unregister_coin(&mut self, coin_id: &str, id: WatchlistId) {
        if let Some(lists) = self.by_coin.get_mut(coin_id) {
            lists.remove(&id);
            if lists.is_empty() {
                self.by_coin.remove(coin_id);
            }
        }
    }

    pub fn owned_by(&self, owner_id: &str) -> impl Iterator<Item = WatchlistId> + '_ {
        self.by_owner.get(owner_id).into_iter().flatten().copied()
    }

    /// Public watchlist ids in creation order.
    pub fn public_ids(&self) -> impl Iterator<Item = WatchlistId> + '_ {
        self.public.iter().copied()
    }

    pub fn is_public(&self, id: WatchlistId) -> bool {
        self.public.contains(&id)
    }

    pub fn containing_coin(&self, coin_id: &str) -> impl Iterator<Item = WatchlistId> + '_ {
        self.by_coin.get(coin_id).into_iter().flatten().copied()
    }

    /// Every (owner, watchlist) pair in the owner index.
    pub fn owner_entries(&self) -> impl Iterator<Item = (&str, WatchlistId)> + '_ {
        self.by_owner
            .iter()
            .flat_map(|(owner, ids)| ids.iter().map(move |id| (owner.as_str(), *id)))
    }

    /// Every (coin, watchlist) pair in the coin index.
    pub fn coin_entries(&self) -> impl Iterator<Item = (&str, WatchlistId)> + '_ {
        self.by_coin
            .iter()
            .flat_map(|(coin, ids)| ids.iter().map(move |id| (coin.as_str(), *id)))
    }

    pub fn public_count(&self) -> usize {
        self.public.len()
    }

    pub fn owner_count(&self) -> usize {
        self.by_owner.len()
    }

    /// True if `id` appears anywhere in any index.
    pub fn references(&self, id: WatchlistId) -> bool {
        self.public.contains(&id)
            || self.by_owner.values().any(|s| s.contains(&id))
            || self.by_coin.values().any(|s| s.contains(&id))
    }

    pub fn clear(&mut self) {
        self.by_owner.clear();
        self.public.clear();
        self.by_coin.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::IdGenerator;

    #[test]
    fn test_register_and_unregister() {
        let mut ids = IdGenerator::new();
        let a = ids.watchlist();
        let b = ids.watchlist();
        let mut index = IndexManager::new();

        index.register_watchlist("alice", a, true);
        index.register_watchlist("alice", b, false);
        index.register_coin("bitcoin", a);
        index.register_coin("bitcoin", b);

        assert_eq!(index.owned_by("alice").collect::<Vec<_>>(), vec![a, b]);
        assert_eq!(index.public_ids().collect::<Vec<_>>(), vec![a]);
        assert_eq!(index.containing_coin("bitcoin").count(), 2);

        index.unregister_watchlist("alice", a, ["bitcoin"]);
        assert!(!index.references(a));
        assert_eq!(index.containing_coin("bitcoin").collect::<Vec<_>>(), vec![b]);
        assert_eq!(index.owner_count(), 1);

        index.unregister_watchlist("alice", b, ["bitcoin"]);
        assert_eq!(index.owner_count(), 0);
        assert_eq!(index.containing_coin("bitcoin").count(), 0);
    }

    #[test]
    fn test_set_public_toggles() {
        let mut ids = IdGenerator::new();
        let a = ids.watchlist();
        let mut index = IndexManager::new();
        index.register_watchlist("bob", a, false);
        assert!(!index.is_public(a));
        index.set_public(a, true);
        assert!(index.is_public(a));
        index.set_public(a, false);
        assert_eq!(index.public_count(), 0);
    }

    #[test]
    fn test_unknown_owner_is_empty() {
        let index = IndexManager::new();
        assert_eq!(index.owned_by("nobody").count(), 0);
        assert_eq!(index.containing_coin("dogecoin").count(), 0);
    }
}
