//! Public directory queries.
//!
//! Filtering happens before counting: `total` is the number of public
//! watchlists matching the filters, and the page is a slice of that set.

use serde::Serialize;

use crate::config::Limits;
use crate::models::{Watchlist, WatchlistDetail};
use crate::store::WatchlistStore;
use crate::validation::normalize_tags;

/// Normalized page position. Only `new` builds one, so `page >= 1` and
/// `limit >= 1` always hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    limit: u32,
}

impl PageRequest {
    /// `page` defaults to 1 and is floored at 1; `limit` defaults to the
    /// configured page size and is clamped to `1..=max_page_size`.
    pub fn new(page: Option<i64>, limit: Option<i64>, limits: &Limits) -> Self {
        let max = limits.max_page_size.max(1) as i64;
        let page = page.unwrap_or(1).clamp(1, u32::MAX as i64) as u32;
        let limit = limit
            .unwrap_or(limits.default_page_size as i64)
            .clamp(1, max) as u32;
        Self { page, limit }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn offset(&self) -> usize {
        (self.page as usize - 1) * self.limit as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryQuery {
    pub page: PageRequest,
    /// Lower-cased, non-empty
    pub search: Option<String>,
    /// Normalized, non-empty
    pub tags: Option<Vec<String>>,
}

impl DirectoryQuery {
    pub fn new(page: PageRequest, search: Option<String>, tags: Option<Vec<String>>) -> Self {
        let search = search
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());
        let tags = tags.map(normalize_tags).filter(|t| !t.is_empty());
        Self { page, search, tags }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: u32,
    pub limit: u32,
    pub has_next: bool,
    pub has_previous: bool,
}

impl<T> Paginated<T> {
    /// Slice `[offset, offset + limit)` out of the full filtered set.
    pub fn from_filtered(all: Vec<T>, page: PageRequest) -> Self {
        let total = all.len();
        let items: Vec<T> = all
            .into_iter()
            .skip(page.offset())
            .take(page.limit as usize)
            .collect();
        Self {
            items,
            total,
            page: page.page,
            limit: page.limit,
            has_next: (page.page as usize) * (page.limit as usize) < total,
            has_previous: page.page > 1,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Paginated<U> {
        Paginated {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            limit: self.limit,
            has_next: self.has_next,
            has_previous: self.has_previous,
        }
    }
}

pub struct QueryEngine;

impl QueryEngine {
    /// Filter and count over the bare records, then enrich only the page.
    pub fn list_public(store: &WatchlistStore, query: &DirectoryQuery) -> Paginated<WatchlistDetail> {
        let matching: Vec<&Watchlist> = store
            .public_watchlists()
            .filter(|wl| {
                query
                    .search
                    .as_deref()
                    .map_or(true, |needle| wl.matches_search(needle))
            })
            .filter(|wl| query.tags.as_deref().map_or(true, |tags| wl.has_any_tag(tags)))
            .collect();

        tracing::debug!(
            "Public directory query matched {} watchlists (page {}, limit {})",
            matching.len(),
            query.page.page(),
            query.page.limit()
        );

        Paginated::from_filtered(matching, query.page).map(|wl| store.detail(wl))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewItem, NewWatchlist};

    fn limits() -> Limits {
        Limits::default()
    }

    #[test]
    fn test_page_request_defaults_and_clamps() {
        let l = limits();
        assert_eq!(PageRequest::new(None, None, &l), PageRequest { page: 1, limit: 20 });
        assert_eq!(PageRequest::new(Some(0), Some(0), &l), PageRequest { page: 1, limit: 1 });
        assert_eq!(PageRequest::new(Some(-4), Some(500), &l), PageRequest { page: 1, limit: 100 });
        assert_eq!(PageRequest::new(Some(3), Some(20), &l).offset(), 40);
    }

    #[test]
    fn test_page_request_survives_zero_max() {
        let l = Limits {
            max_page_size: 0,
            default_page_size: 0,
            ..Limits::default()
        };
        let page = PageRequest::new(Some(0), None, &l);
        assert_eq!((page.page(), page.limit()), (1, 1));
        assert_eq!(page.offset(), 0);
    }

    #[test]
    fn test_paginated_flags() {
        let l = limits();
        let all: Vec<u32> = (0..45).collect();

        let first = Paginated::from_filtered(all.clone(), PageRequest::new(Some(1), Some(20), &l));
        assert_eq!(first.items.len(), 20);
        assert_eq!(first.total, 45);
        assert!(first.has_next);
        assert!(!first.has_previous);

        let third = Paginated::from_filtered(all.clone(), PageRequest::new(Some(3), Some(20), &l));
        assert_eq!(third.items, vec![40, 41, 42, 43, 44]);
        assert!(!third.has_next);
        assert!(third.has_previous);

        let beyond = Paginated::from_filtered(all, PageRequest::new(Some(9), Some(20), &l));
        assert!(beyond.items.is_empty());
        assert_eq!(beyond.total, 45);
    }

    #[test]
    fn test_query_normalization() {
        let page = PageRequest::new(None, None, &limits());
        let q = DirectoryQuery::new(page, Some("   ".to_string()), Some(vec![]));
        assert!(q.search.is_none());
        assert!(q.tags.is_none());

        let q = DirectoryQuery::new(page, Some(" DeFi ".to_string()), Some(vec!["L2".to_string()]));
        assert_eq!(q.search.as_deref(), Some("defi"));
        assert_eq!(q.tags, Some(vec!["l2".to_string()]));
    }

    #[test]
    fn test_filters_apply_before_count() {
        let mut store = WatchlistStore::default();
        let lists = [
            ("DeFi Majors", true, vec!["defi"]),
            ("Layer Two", true, vec!["l2"]),
            ("Secret DeFi", false, vec!["defi"]),
            ("Memes", true, vec!["meme", "fun"]),
        ];
        for (name, is_public, tags) in lists {
            store
                .create_watchlist(
                    "alice",
                    NewWatchlist {
                        name: name.to_string(),
                        description: None,
                        is_public,
                        tags: tags.into_iter().map(String::from).collect(),
                    },
                )
                .unwrap();
        }
        let page = PageRequest::new(None, None, &limits());

        let all = QueryEngine::list_public(&store, &DirectoryQuery::new(page, None, None));
        assert_eq!(all.total, 3);

        let defi = QueryEngine::list_public(
            &store,
            &DirectoryQuery::new(page, Some("defi".to_string()), None),
        );
        assert_eq!(defi.total, 1);
        assert_eq!(defi.items[0].watchlist.name, "DeFi Majors");

        let tagged = QueryEngine::list_public(
            &store,
            &DirectoryQuery::new(page, None, Some(vec!["l2".to_string(), "FUN".to_string()])),
        );
        let names: Vec<_> = tagged.items.iter().map(|d| d.watchlist.name.as_str()).collect();
        assert_eq!(names, vec!["Layer Two", "Memes"]);
    }

    #[test]
    fn test_only_page_rows_are_enriched() {
        let mut store = WatchlistStore::default();
        let mut ids = Vec::new();
        for i in 0..5 {
            let wl = store
                .create_watchlist(
                    "alice",
                    NewWatchlist {
                        name: format!("List {}", i),
                        is_public: true,
                        ..Default::default()
                    },
                )
                .unwrap();
            ids.push(wl.id);
        }
        let coin = NewItem {
            coin_id: "bitcoin".to_string(),
            symbol: "BTC".to_string(),
            name: "Bitcoin".to_string(),
            ..Default::default()
        };
        store.add_item(ids[3], "alice", coin).unwrap();

        let page = PageRequest::new(Some(4), Some(1), &limits());
        let result = QueryEngine::list_public(&store, &DirectoryQuery::new(page, None, None));
        assert_eq!(result.total, 5);
        assert_eq!(result.items.len(), 1);
        assert_eq!(result.items[0].watchlist.id, ids[3]);
        assert_eq!(result.items[0].items[0].coin_id, "bitcoin");
        assert!(result.has_next && result.has_previous);
    }
}
