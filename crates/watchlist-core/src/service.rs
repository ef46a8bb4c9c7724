//! Service boundary.
//!
//! Receives already-authenticated `(requester, operation, params)` calls,
//! validates parameters, applies rate limiting and runs the operation against
//! the store. The store sits behind one lock; each operation holds it for its
//! whole read-verify-mutate-reindex sequence.

use serde::Serialize;
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::config::CoreConfig;
use crate::error::{ErrorBody, WatchlistError, WatchlistResult};
use crate::ids::{NoteId, WatchlistId};
use crate::models::{
    DeletedWatchlist, NewItem, NewWatchlist, Note, StoreStats, Watchlist, WatchlistDetail,
    WatchlistItem, WatchlistSummary,
};
use crate::patch::{ItemPatch, NotePatch, WatchlistPatch};
use crate::query::{DirectoryQuery, PageRequest, Paginated, QueryEngine};
use crate::rate_limit::{RateLimiter, ANONYMOUS};
use crate::store::WatchlistStore;
use crate::validation::{tag_filter_param, tags_param, NumberRule, Params};


/// Response envelope handed back to the adapter.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(err: &WatchlistError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(err.to_body()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateWatchlist,
    GetWatchlist,
    UpdateWatchlist,
    DeleteWatchlist,
    ListMyWatchlists,
    ListPublicWatchlists,
    AddItem,
    UpdateItem,
    RemoveItem,
    AddNote,
    UpdateNote,
    DeleteNote,
    ListNotes,
    FindWatchlistsByCoin,
    GetStats,
}

impl Operation {
    pub const ALL: [Operation; 15] = [
        Operation::CreateWatchlist,
        Operation::GetWatchlist,
        Operation::UpdateWatchlist,
        Operation::DeleteWatchlist,
        Operation::ListMyWatchlists,
        Operation::ListPublicWatchlists,
        Operation::AddItem,
        Operation::UpdateItem,
        Operation::RemoveItem,
        Operation::AddNote,
        Operation::UpdateNote,
        Operation::DeleteNote,
        Operation::ListNotes,
        Operation::FindWatchlistsByCoin,
        Operation::GetStats,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::CreateWatchlist => "create_watchlist",
            Operation::GetWatchlist => "get_watchlist",
            Operation::UpdateWatchlist => "update_watchlist",
            Operation::DeleteWatchlist => "delete_watchlist",
            Operation::ListMyWatchlists => "list_my_watchlists",
            Operation::ListPublicWatchlists => "list_public_watchlists",
            Operation::AddItem => "add_item",
            Operation::UpdateItem => "update_item",
            Operation::RemoveItem => "remove_item",
            Operation::AddNote => "add_note",
            Operation::UpdateNote => "update_note",
            Operation::DeleteNote => "delete_note",
            Operation::ListNotes => "list_notes",
            Operation::FindWatchlistsByCoin => "find_watchlists_by_coin",
            Operation::GetStats => "get_stats",
        }
    }
}

impl FromStr for Operation {
    type Err = WatchlistError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .iter()
            .copied()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| WatchlistError::validation(format!("Unknown operation: {}", s)))
    }
}

/// Parse an id parameter. A string that is not a valid id cannot name an
/// existing entity, so it is reported as not found.
fn id_param<T: FromStr>(params: &Params<'_>, field: &str, what: &str) -> WatchlistResult<T> {
    let raw = params.required_string(field, None)?;
    raw.parse()
        .map_err(|_| WatchlistError::not_found(what, &raw))
}

fn identity(requester: Option<&str>) -> Option<&str> {
    requester.map(str::trim).filter(|r| !r.is_empty())
}

pub struct WatchlistService {
    store: RwLock<WatchlistStore>,
    limiter: Arc<RateLimiter>,
    config: CoreConfig,
}

impl WatchlistService {
    pub fn new(config: CoreConfig) -> Self {
        Self {
            store: RwLock::new(WatchlistStore::new(config.limits.clone())),
            limiter: Arc::new(RateLimiter::new(&config.rate_limit)),
            config,
        }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Start the periodic rate-limit window purge.
    pub fn spawn_maintenance(&self) -> JoinHandle<()> {
        self.limiter
            .clone()
            .spawn_cleanup(self.config.rate_limit.cleanup_interval)
    }

    /// Clear every record, index, id sequence and rate-limit window.
    pub async fn reset(&self) {
        self.store.write().await.reset();
        self.limiter.clear();
    }

    /// Run a read-only closure against the store.
    pub async fn inspect<R>(&self, f: impl FnOnce(&WatchlistStore) -> R) -> R {
        let store = self.store.read().await;
        f(&store)
    }

    /// Map any fault to the error taxonomy. Errors already in the taxonomy
    /// pass through unchanged.
    pub fn wrap_fault(&self, err: anyhow::Error) -> WatchlistError {
        match err.downcast::<WatchlistError>() {
            Ok(known) => known,
            Err(other) => WatchlistError::internal(&other, self.config.expose_internal_errors()),
        }
    }

    fn admit<'r>(&self, requester: Option<&'r str>, op: Operation) -> WatchlistResult<Option<&'r str>> {
        let who = identity(requester);
        match who {
            Some(requester) => self.limiter.check(requester, op.as_str())?,
            None => self.limiter.check_anonymous(op.as_str())?,
        }
        Ok(who)
    }

    fn admit_owner<'r>(&self, requester: Option<&'r str>, op: Operation) -> WatchlistResult<&'r str> {
        let who = identity(requester).ok_or_else(|| {
            tracing::warn!("{} called without an identity", op.as_str());
            WatchlistError::unauthorized()
        })?;
        self.limiter.check(who, op.as_str())?;
        Ok(who)
    }

    // ---- watchlists ----

    pub async fn create_watchlist(&self, requester: Option<&str>, params: &Value) -> WatchlistResult<Watchlist> {
        let owner = self.admit_owner(requester, Operation::CreateWatchlist)?;
        let limits = &self.config.limits;
        let params = Params::new(params)?;
        let input = NewWatchlist {
            name: params.required_string("name", Some(limits.max_name_len))?,
            description: params.optional_string("description", Some(limits.max_description_len))?,
            is_public: params.optional_boolean("is_public")?.unwrap_or(false),
            tags: tags_param(&params, "tags", limits)?.unwrap_or_default(),
        };

        self.store.write().await.create_watchlist(owner, input)
    }

    pub async fn get_watchlist(&self, requester: Option<&str>, params: &Value) -> WatchlistResult<WatchlistDetail> {
        let who = self.admit(requester, Operation::GetWatchlist)?;
        let params = Params::new(params)?;
        let id: WatchlistId = id_param(&params, "watchlist_id", "Watchlist")?;

        self.store.read().await.get_watchlist(id, who)
    }

    pub async fn update_watchlist(&self, requester: Option<&str>, params: &Value) -> WatchlistResult<Watchlist> {
        let owner = self.admit_owner(requester, Operation::UpdateWatchlist)?;
        let limits = &self.config.limits;
        let params = Params::new(params)?;
        let id: WatchlistId = id_param(&params, "watchlist_id", "Watchlist")?;
        let patch = WatchlistPatch {
            name: params.optional_string("name", Some(limits.max_name_len))?,
            description: params.nullable_string("description", Some(limits.max_description_len))?,
            is_public: params.optional_boolean("is_public")?,
            tags: tags_param(&params, "tags", limits)?,
        };

        self.store.write().await.update_watchlist(id, owner, patch)
    }

    pub async fn delete_watchlist(&self, requester: Option<&str>, params: &Value) -> WatchlistResult<DeletedWatchlist> {
        let owner = self.admit_owner(requester, Operation::DeleteWatchlist)?;
        let params = Params::new(params)?;
        let id: WatchlistId = id_param(&params, "watchlist_id", "Watchlist")?;

        self.store.write().await.delete_watchlist(id, owner)
    }

    pub async fn list_my_watchlists(&self, requester: Option<&str>) -> WatchlistResult<Vec<WatchlistSummary>> {
        let owner = self.admit_owner(requester, Operation::ListMyWatchlists)?;
        Ok(self.store.read().await.list_owned(owner))
    }

    pub async fn list_public_watchlists(
        &self,
        requester: Option<&str>,
        params: &Value,
    ) -> WatchlistResult<Paginated<WatchlistDetail>> {
        self.admit(requester, Operation::ListPublicWatchlists)?;
        let limits = &self.config.limits;
        let params = Params::new(params)?;
        let page = PageRequest::new(
            params.optional_integer("page")?,
            params.optional_integer("limit")?,
            limits,
        );
        let query = DirectoryQuery::new(
            page,
            params.optional_text("search")?,
            tag_filter_param(&params, "tags", limits)?,
        );

        let store = self.store.read().await;
        Ok(QueryEngine::list_public(&store, &query))
    }

    pub async fn find_watchlists_by_coin(
        &self,
        requester: Option<&str>,
        params: &Value,
    ) -> WatchlistResult<Vec<WatchlistSummary>> {
        let who = self.admit(requester, Operation::FindWatchlistsByCoin)?;
        let params = Params::new(params)?;
        let coin_id = params.required_string("coin_id", Some(self.config.limits.max_coin_id_len))?;

        Ok(self.store.read().await.find_by_coin(&coin_id, who))
    }

    // ---- items ----

    pub async fn add_item(&self, requester: Option<&str>, params: &Value) -> WatchlistResult<WatchlistItem> {
        let owner = self.admit_owner(requester, Operation::AddItem)?;
        let limits = &self.config.limits;
        let params = Params::new(params)?;
        let id: WatchlistId = id_param(&params, "watchlist_id", "Watchlist")?;
        let input = NewItem {
            coin_id: params.required_string("coin_id", Some(limits.max_coin_id_len))?,
            symbol: params.required_string("symbol", Some(limits.max_symbol_len))?,
            name: params.required_string("name", Some(limits.max_coin_name_len))?,
            target_price: params.optional_number("target_price", NumberRule::positive())?,
            notes: params.optional_string("notes", Some(limits.max_note_len))?,
        };

        self.store.write().await.add_item(id, owner, input)
    }

    pub async fn update_item(&self, requester: Option<&str>, params: &Value) -> WatchlistResult<WatchlistItem> {
        let owner = self.admit_owner(requester, Operation::UpdateItem)?;
        let limits = &self.config.limits;
        let params = Params::new(params)?;
        let id: WatchlistId = id_param(&params, "watchlist_id", "Watchlist")?;
        let coin_id = params.required_string("coin_id", Some(limits.max_coin_id_len))?;
        let patch = ItemPatch {
            target_price: params.nullable_number("target_price", NumberRule::positive())?,
            notes: params.nullable_string("notes", Some(limits.max_note_len))?,
        };

        self.store.write().await.update_item(id, owner, &coin_id, patch)
    }

    pub async fn remove_item(&self, requester: Option<&str>, params: &Value) -> WatchlistResult<WatchlistItem> {
        let owner = self.admit_owner(requester, Operation::RemoveItem)?;
        let params = Params::new(params)?;
        let id: WatchlistId = id_param(&params, "watchlist_id", "Watchlist")?;
        let coin_id = params.required_string("coin_id", Some(self.config.limits.max_coin_id_len))?;

        self.store.write().await.remove_item(id, owner, &coin_id)
    }

    // ---- notes ----

    pub async fn add_note(&self, requester: Option<&str>, params: &Value) -> WatchlistResult<Note> {
        let owner = self.admit_owner(requester, Operation::AddNote)?;
        let limits = &self.config.limits;
        let params = Params::new(params)?;
        let id: WatchlistId = id_param(&params, "watchlist_id", "Watchlist")?;
        let content = params.required_string("content", Some(limits.max_note_len))?;
        let coin_id = params.optional_string("coin_id", Some(limits.max_coin_id_len))?;

        self.store.write().await.add_note(id, owner, content, coin_id)
    }

    pub async fn update_note(&self, requester: Option<&str>, params: &Value) -> WatchlistResult<Note> {
        let owner = self.admit_owner(requester, Operation::UpdateNote)?;
        let params = Params::new(params)?;
        let note_id: NoteId = id_param(&params, "note_id", "Note")?;
        let patch = NotePatch {
            content: params.optional_string("content", Some(self.config.limits.max_note_len))?,
        };

        self.store.write().await.update_note(note_id, owner, patch)
    }

    pub async fn delete_note(&self, requester: Option<&str>, params: &Value) -> WatchlistResult<Note> {
        let owner = self.admit_owner(requester, Operation::DeleteNote)?;
        let params = Params::new(params)?;
        let note_id: NoteId = id_param(&params, "note_id", "Note")?;

        self.store.write().await.delete_note(note_id, owner)
    }

    pub async fn list_notes(&self, requester: Option<&str>, params: &Value) -> WatchlistResult<Vec<Note>> {
        let who = self.admit(requester, Operation::ListNotes)?;
        let params = Params::new(params)?;
        let id: WatchlistId = id_param(&params, "watchlist_id", "Watchlist")?;
        let coin_id = params.optional_string("coin_id", Some(self.config.limits.max_coin_id_len))?;

        self.store.read().await.list_notes(id, who, coin_id.as_deref())
    }

    pub async fn stats(&self, requester: Option<&str>) -> WatchlistResult<StoreStats> {
        self.admit(requester, Operation::GetStats)?;
        Ok(self.store.read().await.stats())
    }

    // ---- dispatch ----

    /// Route a named operation and wrap the outcome in the response envelope.
    pub async fn dispatch(&self, requester: Option<&str>, operation: &str, params: &Value) -> ApiResponse<Value> {
        tracing::debug!("Dispatching {} for {}", operation, identity(requester).unwrap_or(ANONYMOUS));
        match self.execute(requester, operation, params).await {
            Ok(data) => ApiResponse::success(data),
            Err(err) => {
                tracing::debug!("{} failed: {} ({})", operation, err, err.kind());
                ApiResponse::error(&err)
            }
        }
    }

    async fn execute(&self, requester: Option<&str>, operation: &str, params: &Value) -> WatchlistResult<Value> {
        let op: Operation = operation.parse()?;
        match op {
            Operation::CreateWatchlist => self.to_json(self.create_watchlist(requester, params).await?),
            Operation::GetWatchlist => self.to_json(self.get_watchlist(requester, params).await?),
            Operation::UpdateWatchlist => self.to_json(self.update_watchlist(requester, params).await?),
            Operation::DeleteWatchlist => self.to_json(self.delete_watchlist(requester, params).await?),
            Operation::ListMyWatchlists => self.to_json(self.list_my_watchlists(requester).await?),
            Operation::ListPublicWatchlists => {
                self.to_json(self.list_public_watchlists(requester, params).await?)
            }
            Operation::AddItem => self.to_json(self.add_item(requester, params).await?),
            Operation::UpdateItem => self.to_json(self.update_item(requester, params).await?),
            Operation::RemoveItem => self.to_json(self.remove_item(requester, params).await?),
            Operation::AddNote => self.to_json(self.add_note(requester, params).await?),
            Operation::UpdateNote => self.to_json(self.update_note(requester, params).await?),
            Operation::DeleteNote => self.to_json(self.delete_note(requester, params).await?),
            Operation::ListNotes => self.to_json(self.list_notes(requester, params).await?),
            Operation::FindWatchlistsByCoin => {
                self.to_json(self.find_watchlists_by_coin(requester, params).await?)
            }
            Operation::GetStats => self.to_json(self.stats(requester).await?),
        }
    }

    fn to_json<T: Serialize>(&self, value: T) -> WatchlistResult<Value> {
        serde_json::to_value(value)
            .map_err(|e| self.wrap_fault(anyhow::Error::from(e).context("Failed to serialize response")))
    }
}
