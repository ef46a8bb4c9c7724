//! Typed entity identifiers and the generator that issues them.
//!
//! Ids wrap a sequence number, so ordering by id is ordering by creation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! entity_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(into = "String", try_from = "String")]
        pub struct $name(u64);

        impl $name {
            pub const PREFIX: &'static str = $prefix;

            pub fn seq(&self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}_{}", $prefix, self.0)
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.strip_prefix($prefix)
                    .and_then(|rest| rest.strip_prefix('_'))
                    .and_then(|n| n.parse::<u64>().ok())
                    .filter(|n| *n > 0)
                    .map($name)
                    .ok_or_else(|| format!("invalid {} id: {}", $prefix, s))
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.to_string()
            }
        }

        impl TryFrom<String> for $name {
            type Error = String;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                s.parse()
            }
        }
    };
}

entity_id!(WatchlistId, "wl");
entity_id!(ItemId, "item");
entity_id!(NoteId, "note");

/// Issues never-reused ids per entity kind until `reset`.
#[derive(Debug, Default)]
pub struct IdGenerator {
    next_watchlist: u64,
    next_item: u64,
    next_note: u64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn watchlist(&mut self) -> WatchlistId {
        self.next_watchlist += 1;
        WatchlistId(self.next_watchlist)
    }

    pub fn item(&mut self) -> ItemId {
        self.next_item += 1;
        ItemId(self.next_item)
    }

    pub fn note(&mut self) -> NoteId {
        self.next_note += 1;
        NoteId(self.next_note)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_sequential_per_kind() {
        let mut ids = IdGenerator::new();
        assert_eq!(ids.watchlist().to_string(), "wl_1");
        assert_eq!(ids.watchlist().to_string(), "wl_2");
        assert_eq!(ids.item().to_string(), "item_1");
        assert_eq!(ids.note().to_string(), "note_1");
    }

    #[test]
    fn test_reset_restarts_sequence() {
        let mut ids = IdGenerator::new();
        ids.watchlist();
        ids.watchlist();
        ids.reset();
        assert_eq!(ids.watchlist().seq(), 1);
    }

    #[test]
    fn test_parse() {
        assert_eq!("wl_12".parse::<WatchlistId>().unwrap().seq(), 12);
        assert!("wl_0".parse::<WatchlistId>().is_err());
        assert!("note_3".parse::<WatchlistId>().is_err());
        assert!("wl12".parse::<WatchlistId>().is_err());
        assert!("wl_abc".parse::<WatchlistId>().is_err());
    }

    #[test]
    fn test_ordering_follows_creation() {
        let mut ids = IdGenerator::new();
        let first = ids.watchlist();
        for _ in 0..9 {
            ids.watchlist();
        }
        let tenth_plus = ids.watchlist();
        assert!(first < tenth_plus);
        assert_eq!(serde_json::to_value(tenth_plus).unwrap(), "wl_11");
    }
}
