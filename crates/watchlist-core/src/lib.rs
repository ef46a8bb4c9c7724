//! Watchlist Core
//!
//! In-memory store for owned coin watchlists with items, notes, a public
//! directory, and ownership/visibility access control.

pub mod access;
pub mod config;
pub mod error;
pub mod ids;
pub mod index;
pub mod models;
pub mod patch;
pub mod query;
pub mod rate_limit;
pub mod service;
pub mod store;
pub mod validation;


pub use config::{CoreConfig, Environment, Limits, RateLimitConfig};
pub use error::{ErrorBody, ErrorKind, WatchlistError, WatchlistResult};
pub use ids::{ItemId, NoteId, WatchlistId};
pub use models::{
    DeletedWatchlist, NewItem, NewWatchlist, Note, StoreStats, Watchlist, WatchlistDetail,
    WatchlistItem, WatchlistSummary,
};
pub use patch::{ItemPatch, NotePatch, WatchlistPatch};
pub use query::{DirectoryQuery, PageRequest, Paginated, QueryEngine};
pub use rate_limit::RateLimiter;
pub use service::{ApiResponse, Operation, WatchlistService};
pub use store::WatchlistStore;
