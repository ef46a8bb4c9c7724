//! Watchlist Data Models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ItemId, NoteId, WatchlistId};

/// A named, owned collection of tracked coins
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Watchlist {
    pub id: WatchlistId,
    /// User id of the creator; the only identity allowed to mutate it
    pub owner_id: String,
    pub name: String,
    pub description: Option<String>,
    /// Listed in the public directory when true
    pub is_public: bool,
    /// Normalized, de-duplicated, insertion ordered
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Watchlist {
    pub fn has_any_tag(&self, wanted: &[String]) -> bool {
        self.tags.iter().any(|t| wanted.contains(t))
    }

    /// Case-insensitive substring match against name or description.
    /// `needle` must already be lower-cased.
    pub fn matches_search(&self, needle: &str) -> bool {
        self.name.to_lowercase().contains(needle)
            || self
                .description
                .as_ref()
                .map(|d| d.to_lowercase().contains(needle))
                .unwrap_or(false)
    }
}

/// A tracked coin inside a watchlist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchlistItem {
    pub id: ItemId,
    pub watchlist_id: WatchlistId,
    /// External catalog id (e.g. "bitcoin"), unique within a watchlist
    pub coin_id: String,
    pub symbol: String,
    pub name: String,
    pub added_at: DateTime<Utc>,
    pub target_price: Option<f64>,
    pub notes: Option<String>,
}

/// Free-text annotation on a watchlist, optionally about one coin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: NoteId,
    pub watchlist_id: WatchlistId,
    /// None for a general watchlist note
    pub coin_id: Option<String>,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A watchlist together with its current items and notes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WatchlistDetail {
    #[serde(flatten)]
    pub watchlist: Watchlist,
    pub items: Vec<WatchlistItem>,
    pub notes: Vec<Note>,
}

/// A watchlist with content counts, used for listings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WatchlistSummary {
    #[serde(flatten)]
    pub watchlist: Watchlist,
    pub item_count: usize,
    pub note_count: usize,
}

/// What a cascading delete removed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletedWatchlist {
    pub id: WatchlistId,
    pub items_removed: usize,
    pub notes_removed: usize,
}

/// Input for creating a watchlist, already validated
#[derive(Debug, Clone, Default)]
pub struct NewWatchlist {
    pub name: String,
    pub description: Option<String>,
    pub is_public: bool,
    pub tags: Vec<String>,
}

/// Input for adding an item, already validated
#[derive(Debug, Clone, Default)]
pub struct NewItem {
    pub coin_id: String,
    pub symbol: String,
    pub name: String,
    pub target_price: Option<f64>,
    pub notes: Option<String>,
}

/// Aggregate counts over the whole store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub watchlists: usize,
    pub items: usize,
    pub notes: usize,
    pub public_watchlists: usize,
    pub owners: usize,
}
