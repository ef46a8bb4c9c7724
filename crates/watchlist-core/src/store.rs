//! In-memory entity store.
//!
//! Holds the canonical watchlist, item and note records together with the
//! secondary indexes. Every mutating method takes `&mut self` and performs its
//! existence check, authorization check, record change and index change
//! before returning, so no caller can observe a half-applied mutation. All
//! checks that can fail run before the first write.

use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::access::{ensure_readable, ensure_writable};
use crate::config::Limits;
use crate::error::{WatchlistError, WatchlistResult};
use crate::ids::{IdGenerator, ItemId, NoteId, WatchlistId};
use crate::index::IndexManager;
use crate::models::{
    DeletedWatchlist, NewItem, NewWatchlist, Note, StoreStats, Watchlist, WatchlistDetail,
    WatchlistItem, WatchlistSummary,
};
use crate::patch::{apply_patch, ItemPatch, NotePatch, WatchlistPatch};
use crate::validation::normalize_coin_id;

/// Ids of the items and notes belonging to one watchlist.
#[derive(Debug, Default)]
struct Contents {
    items: BTreeSet<ItemId>,
    notes: BTreeSet<NoteId>,
}

pub struct WatchlistStore {
    ids: IdGenerator,
    watchlists: BTreeMap<WatchlistId, Watchlist>,
    items: BTreeMap<ItemId, WatchlistItem>,
    notes: BTreeMap<NoteId, Note>,
    contents: HashMap<WatchlistId, Contents>,
    index: IndexManager,
    limits: Limits,
}

impl Default for WatchlistStore {
    fn default() -> Self {
        Self::new(Limits::default())
    }
}

impl WatchlistStore {
    pub fn new(limits: Limits) -> Self {
        Self {
            ids: IdGenerator::new(),
            watchlists: BTreeMap::new(),
            items: BTreeMap::new(),
            notes: BTreeMap::new(),
            contents: HashMap::new(),
            index: IndexManager::new(),
            limits,
        }
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn index(&self) -> &IndexManager {
        &self.index
    }

    // ---- lookups ----

    fn watchlist(&self, id: WatchlistId) -> WatchlistResult<&Watchlist> {
        self.watchlists
            .get(&id)
            .ok_or_else(|| WatchlistError::not_found("Watchlist", id))
    }

    /// Resolve a watchlist and require `owner_id` to own it.
    fn owned_watchlist(&self, id: WatchlistId, owner_id: &str) -> WatchlistResult<&Watchlist> {
        let wl = self.watchlist(id)?;
        ensure_writable(wl, owner_id)?;
        Ok(wl)
    }

    fn items_of(&self, id: WatchlistId) -> impl Iterator<Item = &WatchlistItem> + '_ {
        self.contents
            .get(&id)
            .into_iter()
            .flat_map(|c| c.items.iter())
            .filter_map(move |item_id| self.items.get(item_id))
    }

    fn notes_of(&self, id: WatchlistId) -> impl Iterator<Item = &Note> + '_ {
        self.contents
            .get(&id)
            .into_iter()
            .flat_map(|c| c.notes.iter())
            .filter_map(move |note_id| self.notes.get(note_id))
    }

    fn item_count(&self, id: WatchlistId) -> usize {
        self.contents.get(&id).map_or(0, |c| c.items.len())
    }

    fn find_item(&self, id: WatchlistId, coin_id: &str) -> Option<ItemId> {
        self.items_of(id).find(|i| i.coin_id == coin_id).map(|i| i.id)
    }

    pub fn detail(&self, wl: &Watchlist) -> WatchlistDetail {
        WatchlistDetail {
            watchlist: wl.clone(),
            items: self.items_of(wl.id).cloned().collect(),
            notes: self.notes_of(wl.id).cloned().collect(),
        }
    }

    pub fn summary(&self, wl: &Watchlist) -> WatchlistSummary {
        WatchlistSummary {
            watchlist: wl.clone(),
            item_count: self.item_count(wl.id),
            note_count: self.contents.get(&wl.id).map_or(0, |c| c.notes.len()),
        }
    }

    /// Public watchlists in directory order.
    pub fn public_watchlists(&self) -> impl Iterator<Item = &Watchlist> + '_ {
        self.index
            .public_ids()
            .filter_map(move |id| self.watchlists.get(&id))
    }

    // ---- watchlists ----

    pub fn create_watchlist(&mut self, owner_id: &str, input: NewWatchlist) -> WatchlistResult<Watchlist> {
        if input.tags.len() > self.limits.max_tags {
            return Err(WatchlistError::validation_field(
                "tags",
                format!("tags cannot have more than {} items", self.limits.max_tags),
            ));
        }

        let now = Utc::now();
        let wl = Watchlist {
            id: self.ids.watchlist(),
            owner_id: owner_id.to_string(),
            name: input.name,
            description: input.description,
            is_public: input.is_public,
            tags: input.tags,
            created_at: now,
            updated_at: now,
        };

        self.index.register_watchlist(owner_id, wl.id, wl.is_public);
        self.contents.insert(wl.id, Contents::default());
        self.watchlists.insert(wl.id, wl.clone());

        tracing::info!("Created watchlist {} for {} (public: {})", wl.id, owner_id, wl.is_public);
        Ok(wl)
    }

    pub fn get_watchlist(
        &self,
        id: WatchlistId,
        requester: Option<&str>,
    ) -> WatchlistResult<WatchlistDetail> {
        let wl = self.watchlist(id)?;
        ensure_readable(wl, requester)?;
        Ok(self.detail(wl))
    }

    pub fn update_watchlist(
        &mut self,
        id: WatchlistId,
        owner_id: &str,
        patch: WatchlistPatch,
    ) -> WatchlistResult<Watchlist> {
        self.owned_watchlist(id, owner_id)?;
        if let Some(tags) = &patch.tags {
            if tags.len() > self.limits.max_tags {
                return Err(WatchlistError::validation_field(
                    "tags",
                    format!("tags cannot have more than {} items", self.limits.max_tags),
                ));
            }
        }

        let wl = self
            .watchlists
            .get_mut(&id)
            .ok_or_else(|| WatchlistError::not_found("Watchlist", id))?;
        let visibility_changed = patch.changes_visibility(wl);
        apply_patch(wl, patch, Utc::now())?;
        let updated = wl.clone();

        if visibility_changed {
            self.index.set_public(id, updated.is_public);
            tracing::info!("Watchlist {} visibility now public={}", id, updated.is_public);
        }

        tracing::debug!("Updated watchlist {}", id);
        Ok(updated)
    }

    pub fn delete_watchlist(&mut self, id: WatchlistId, owner_id: &str) -> WatchlistResult<DeletedWatchlist> {
        self.owned_watchlist(id, owner_id)?;

        let contents = self.contents.remove(&id).unwrap_or_default();
        let removed_items: Vec<WatchlistItem> = contents
            .items
            .iter()
            .filter_map(|item_id| self.items.remove(item_id))
            .collect();
        for note_id in &contents.notes {
            self.notes.remove(note_id);
        }
        let note_ids = contents.notes;
        if let Some(wl) = self.watchlists.remove(&id) {
            self.index.unregister_watchlist(
                &wl.owner_id,
                id,
                removed_items.iter().map(|i| i.coin_id.as_str()),
            );
        }

        tracing::info!(
            "Deleted watchlist {} ({} items, {} notes)",
            id,
            removed_items.len(),
            note_ids.len()
        );

        Ok(DeletedWatchlist {
            id,
            items_removed: removed_items.len(),
            notes_removed: note_ids.len(),
        })
    }

    pub fn list_owned(&self, owner_id: &str) -> Vec<WatchlistSummary> {
        self.index
            .owned_by(owner_id)
            .filter_map(|id| self.watchlists.get(&id))
            .map(|wl| self.summary(wl))
            .collect()
    }

    /// Watchlists containing `coin_id` that `requester` is allowed to read.
    pub fn find_by_coin(&self, coin_id: &str, requester: Option<&str>) -> Vec<WatchlistSummary> {
        let coin_id = normalize_coin_id(coin_id);
        self.index
            .containing_coin(&coin_id)
            .filter_map(|id| self.watchlists.get(&id))
            .filter(|wl| ensure_readable(*wl, requester).is_ok())
            .map(|wl| self.summary(wl))
            .collect()
    }

    // ---- items ----

    pub fn add_item(
        &mut self,
        watchlist_id: WatchlistId,
        owner_id: &str,
        input: NewItem,
    ) -> WatchlistResult<WatchlistItem> {
        self.owned_watchlist(watchlist_id, owner_id)?;

        let coin_id = normalize_coin_id(&input.coin_id);
        if self.find_item(watchlist_id, &coin_id).is_some() {
            return Err(WatchlistError::validation_field(
                "coin_id",
                format!("Coin {} is already in this watchlist", coin_id),
            ));
        }
        if self.item_count(watchlist_id) >= self.limits.max_items_per_watchlist {
            return Err(WatchlistError::validation(format!(
                "Watchlist cannot have more than {} items",
                self.limits.max_items_per_watchlist
            )));
        }

        let item = WatchlistItem {
            id: self.ids.item(),
            watchlist_id,
            coin_id,
            symbol: input.symbol,
            name: input.name,
            added_at: Utc::now(),
            target_price: input.target_price,
            notes: input.notes,
        };

        self.index.register_coin(&item.coin_id, watchlist_id);
        self.contents.entry(watchlist_id).or_default().items.insert(item.id);
        self.items.insert(item.id, item.clone());

        tracing::info!("Added {} to watchlist {}", item.coin_id, watchlist_id);
        Ok(item)
    }

    pub fn update_item(
        &mut self,
        watchlist_id: WatchlistId,
        owner_id: &str,
        coin_id: &str,
        patch: ItemPatch,
    ) -> WatchlistResult<WatchlistItem> {
        self.owned_watchlist(watchlist_id, owner_id)?;
        let coin_id = normalize_coin_id(coin_id);
        let item_id = self
            .find_item(watchlist_id, &coin_id)
            .ok_or_else(|| WatchlistError::not_found("Coin in watchlist", &coin_id))?;

        let item = self
            .items
            .get_mut(&item_id)
            .ok_or_else(|| WatchlistError::not_found("Coin in watchlist", &coin_id))?;
        apply_patch(item, patch, Utc::now())?;
        let updated = item.clone();

        // Item edits count as watchlist edits.
        if let Some(wl) = self.watchlists.get_mut(&watchlist_id) {
            wl.updated_at = Utc::now();
        }

        tracing::debug!("Updated {} in watchlist {}", coin_id, watchlist_id);
        Ok(updated)
    }

    pub fn remove_item(
        &mut self,
        watchlist_id: WatchlistId,
        owner_id: &str,
        coin_id: &str,
    ) -> WatchlistResult<WatchlistItem> {
        self.owned_watchlist(watchlist_id, owner_id)?;
        let coin_id = normalize_coin_id(coin_id);
        let item_id = self
            .find_item(watchlist_id, &coin_id)
            .ok_or_else(|| WatchlistError::not_found("Coin in watchlist", &coin_id))?;

        let removed = self
            .items
            .remove(&item_id)
            .ok_or_else(|| WatchlistError::not_found("Coin in watchlist", &coin_id))?;
        if let Some(c) = self.contents.get_mut(&watchlist_id) {
            c.items.remove(&item_id);
        }
        if self.find_item(watchlist_id, &coin_id).is_none() {
            self.index.unregister_coin(&coin_id, watchlist_id);
        }

        tracing::info!("Removed {} from watchlist {}", coin_id, watchlist_id);
        Ok(removed)
    }

    // ---- notes ----

    pub fn add_note(
        &mut self,
        watchlist_id: WatchlistId,
        owner_id: &str,
        content: String,
        coin_id: Option<String>,
    ) -> WatchlistResult<Note> {
        self.owned_watchlist(watchlist_id, owner_id)?;
        let coin_id = coin_id.map(|c| normalize_coin_id(&c));
        if let Some(coin) = &coin_id {
            if self.find_item(watchlist_id, coin).is_none() {
                return Err(WatchlistError::not_found("Coin in watchlist", coin));
            }
        }

        let now = Utc::now();
        let note = Note {
            id: self.ids.note(),
            watchlist_id,
            coin_id,
            content,
            created_at: now,
            updated_at: now,
        };
        self.contents.entry(watchlist_id).or_default().notes.insert(note.id);
        self.notes.insert(note.id, note.clone());

        tracing::info!("Added note {} to watchlist {}", note.id, watchlist_id);
        Ok(note)
    }

    /// Resolve a note's parent and require `owner_id` to own it now.
    fn authorize_note(&self, note_id: NoteId, owner_id: &str) -> WatchlistResult<()> {
        let note = self
            .notes
            .get(&note_id)
            .ok_or_else(|| WatchlistError::not_found("Note", note_id))?;
        let parent = self.watchlist(note.watchlist_id)?;
        ensure_writable(parent, owner_id)
    }

    pub fn update_note(&mut self, note_id: NoteId, owner_id: &str, patch: NotePatch) -> WatchlistResult<Note> {
        self.authorize_note(note_id, owner_id)?;
        let note = self
            .notes
            .get_mut(&note_id)
            .ok_or_else(|| WatchlistError::not_found("Note", note_id))?;
        apply_patch(note, patch, Utc::now())?;

        tracing::debug!("Updated note {}", note_id);
        Ok(note.clone())
    }

    pub fn delete_note(&mut self, note_id: NoteId, owner_id: &str) -> WatchlistResult<Note> {
        self.authorize_note(note_id, owner_id)?;
        let removed = self
            .notes
            .remove(&note_id)
            .ok_or_else(|| WatchlistError::not_found("Note", note_id))?;
        if let Some(c) = self.contents.get_mut(&removed.watchlist_id) {
            c.notes.remove(&note_id);
        }

        tracing::info!("Deleted note {}", note_id);
        Ok(removed)
    }

    /// Notes of a readable watchlist, optionally only those about one coin.
    pub fn list_notes(
        &self,
        watchlist_id: WatchlistId,
        requester: Option<&str>,
        coin_id: Option<&str>,
    ) -> WatchlistResult<Vec<Note>> {
        let wl = self.watchlist(watchlist_id)?;
        ensure_readable(wl, requester)?;
        let coin_id = coin_id.map(normalize_coin_id);
        Ok(self
            .notes_of(watchlist_id)
            .filter(|n| coin_id.is_none() || n.coin_id == coin_id)
            .cloned()
            .collect())
    }

    // ---- whole store ----

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            watchlists: self.watchlists.len(),
            items: self.items.len(),
            notes: self.notes.len(),
            public_watchlists: self.index.public_count(),
            owners: self.index.owner_count(),
        }
    }

    /// Drop all records, indexes and id sequencing.
    pub fn reset(&mut self) {
        self.watchlists.clear();
        self.items.clear();
        self.notes.clear();
        self.contents.clear();
        self.index.clear();
        self.ids.reset();
        tracing::info!("Watchlist store reset");
    }

    /// Cross-check every index and reference against the primary records.
    pub fn check_consistency(&self) -> Result<(), String> {
        for item in self.items.values() {
            if !self.watchlists.contains_key(&item.watchlist_id) {
                return Err(format!("item {} references missing {}", item.id, item.watchlist_id));
            }
        }
        for note in self.notes.values() {
            if !self.watchlists.contains_key(&note.watchlist_id) {
                return Err(format!("note {} references missing {}", note.id, note.watchlist_id));
            }
        }

        if self.contents.len() != self.watchlists.len() {
            return Err("content sets do not match the watchlists".to_string());
        }
        let (mut listed_items, mut listed_notes) = (0, 0);
        for (id, c) in &self.contents {
            if !self.watchlists.contains_key(id) {
                return Err(format!("content set for missing {}", id));
            }
            for item_id in &c.items {
                match self.items.get(item_id) {
                    Some(item) if item.watchlist_id == *id => listed_items += 1,
                    _ => return Err(format!("content set of {} lists stale {}", id, item_id)),
                }
            }
            for note_id in &c.notes {
                match self.notes.get(note_id) {
                    Some(note) if note.watchlist_id == *id => listed_notes += 1,
                    _ => return Err(format!("content set of {} lists stale {}", id, note_id)),
                }
            }
        }
        if listed_items != self.items.len() || listed_notes != self.notes.len() {
            return Err("content sets do not cover every item and note".to_string());
        }

        for wl in self.watchlists.values() {
            if self.index.is_public(wl.id) != wl.is_public {
                return Err(format!("public index out of sync for {}", wl.id));
            }
            let mut coins: Vec<&str> = self.items_of(wl.id).map(|i| i.coin_id.as_str()).collect();
            let total = coins.len();
            coins.sort_unstable();
            coins.dedup();
            if coins.len() != total {
                return Err(format!("duplicate coin in {}", wl.id));
            }
        }
        if self.index.public_ids().any(|id| !self.watchlists.contains_key(&id)) {
            return Err("public index references a missing watchlist".to_string());
        }

        let mut owner_entries = 0;
        for (owner_id, id) in self.index.owner_entries() {
            match self.watchlists.get(&id) {
                Some(wl) if wl.owner_id == owner_id => owner_entries += 1,
                _ => return Err(format!("owner index entry {} -> {} is stale", owner_id, id)),
            }
        }
        if owner_entries != self.watchlists.len() {
            return Err("owner index does not cover every watchlist".to_string());
        }

        let mut coin_entries = 0;
        for (coin_id, id) in self.index.coin_entries() {
            if self.find_item(id, coin_id).is_none() {
                return Err(format!("coin index entry {} -> {} is stale", coin_id, id));
            }
            coin_entries += 1;
        }
        let expected: usize = self
            .watchlists
            .keys()
            .map(|id| {
                let mut coins: Vec<&str> = self.items_of(*id).map(|i| i.coin_id.as_str()).collect();
                coins.sort_unstable();
                coins.dedup();
                coins.len()
            })
            .sum();
        if coin_entries != expected {
            return Err("coin index does not cover every item".to_string());
        }
        Ok(())
    }
}
