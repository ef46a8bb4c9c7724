//! Partial updates. Each mutable entity has a patch type with one optional
//! field per mutable attribute; every update path goes through `apply_patch`.

use chrono::{DateTime, Utc};

use crate::error::{WatchlistError, WatchlistResult};
use crate::models::{Note, Watchlist, WatchlistItem};

pub trait Patch<T> {
    fn is_empty(&self) -> bool;

    /// Merge the supplied fields into `target`.
    fn merge_into(self, target: &mut T);
}

/// Entities that record when they were last modified.
pub trait Touch {
    fn touch(&mut self, now: DateTime<Utc>);
}

impl Touch for Watchlist {
    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

impl Touch for Note {
    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

// Items only carry an addition timestamp.
impl Touch for WatchlistItem {
    fn touch(&mut self, _now: DateTime<Utc>) {}
}

pub fn apply_patch<T, P>(target: &mut T, patch: P, now: DateTime<Utc>) -> WatchlistResult<()>
where
    T: Touch,
    P: Patch<T>,
{
    if patch.is_empty() {
        return Err(WatchlistError::validation("No fields to update"));
    }
    patch.merge_into(target);
    target.touch(now);
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WatchlistPatch {
    pub name: Option<String>,
    /// `Some(None)` clears the description
    pub description: Option<Option<String>>,
    pub is_public: Option<bool>,
    pub tags: Option<Vec<String>>,
}

impl WatchlistPatch {
    /// Whether applying this patch to `current` flips its visibility.
    pub fn changes_visibility(&self, current: &Watchlist) -> bool {
        self.is_public.is_some_and(|p| p != current.is_public)
    }
}

impl Patch<Watchlist> for WatchlistPatch {
    fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.is_public.is_none()
            && self.tags.is_none()
    }

    fn merge_into(self, target: &mut Watchlist) {
        if let Some(name) = self.name {
            target.name = name;
        }
        if let Some(description) = self.description {
            target.description = description;
        }
        if let Some(is_public) = self.is_public {
            target.is_public = is_public;
        }
        if let Some(tags) = self.tags {
            target.tags = tags;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemPatch {
    pub target_price: Option<Option<f64>>,
    pub notes: Option<Option<String>>,
}

impl Patch<WatchlistItem> for ItemPatch {
    fn is_empty(&self) -> bool {
        self.target_price.is_none() && self.notes.is_none()
    }

    fn merge_into(self, target: &mut WatchlistItem) {
        if let Some(target_price) = self.target_price {
            target.target_price = target_price;
        }
        if let Some(notes) = self.notes {
            target.notes = notes;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotePatch {
    pub content: Option<String>,
}

impl Patch<Note> for NotePatch {
    fn is_empty(&self) -> bool {
        self.content.is_none()
    }

    fn merge_into(self, target: &mut Note) {
        if let Some(content) = self.content {
            target.content = content;
        }
    }
}
