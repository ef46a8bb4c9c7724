//! Market Link
//!
//! Connection management for the remote market-data service. The watchlist
//! core never talks to it; adapters that enrich responses with live data hold
//! a `ConnectionManager` and call `ensure_connected` before each request.

pub mod error;
pub mod manager;

pub use error::ConnectionError;
pub use manager::{ConnectionConfig, ConnectionManager, ConnectionState, Connector};
