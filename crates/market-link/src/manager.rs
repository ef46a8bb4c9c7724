use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::error::ConnectionError;

/// Something that can open a connection to the market-data service.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Connection: Send + Sync + 'static;

    async fn connect(&self) -> Result<Self::Connection, ConnectionError>;

    fn name(&self) -> &str;
}

#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub connect_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl ConnectionConfig {
    /// Load from environment variables.
    pub fn from_env() -> Self {
        let connect_timeout = std::env::var("MARKET_DATA_CONNECT_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|secs: &u64| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or_else(|| ConnectionConfig::default().connect_timeout);
        Self { connect_timeout }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

type Attempt<T> = Shared<BoxFuture<'static, Result<Arc<T>, ConnectionError>>>;

enum State<T> {
    Disconnected,
    Connecting { attempt: u64, pending: Attempt<T> },
    Connected(Arc<T>),
    Failed(ConnectionError),
}

struct Inner<T> {
    state: State<T>,
    attempts: u64,
}

/// Owns the single connection to the market-data service.
///
/// Concurrent `ensure_connected` callers share one in-flight attempt. A failed
/// attempt leaves the manager in `Failed`, and the next call starts over.
pub struct ConnectionManager<C: Connector> {
    connector: Arc<C>,
    config: ConnectionConfig,
    inner: Mutex<Inner<C::Connection>>,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(connector: C, config: ConnectionConfig) -> Self {
        Self {
            connector: Arc::new(connector),
            config,
            inner: Mutex::new(Inner {
                state: State::Disconnected,
                attempts: 0,
            }),
        }
    }

    pub async fn state(&self) -> ConnectionState {
        match self.inner.lock().await.state {
            State::Disconnected => ConnectionState::Disconnected,
            State::Connecting { .. } => ConnectionState::Connecting,
            State::Connected(_) => ConnectionState::Connected,
            State::Failed(_) => ConnectionState::Failed,
        }
    }

    pub async fn last_error(&self) -> Option<ConnectionError> {
        match &self.inner.lock().await.state {
            State::Failed(err) => Some(err.clone()),
            _ => None,
        }
    }

    /// Return the live connection, connecting first if needed.
    pub async fn ensure_connected(&self) -> Result<Arc<C::Connection>, ConnectionError> {
        let (attempt, pending) = {
            let mut inner = self.inner.lock().await;
            let in_flight = match &inner.state {
                State::Connected(conn) => return Ok(conn.clone()),
                State::Connecting { attempt, pending } => Some((*attempt, pending.clone())),
                State::Disconnected | State::Failed(_) => None,
            };
            match in_flight {
                Some(joined) => joined,
                None => self.start_attempt(&mut inner),
            }
        };

        let result = pending.await;

        let mut inner = self.inner.lock().await;
        let current = matches!(&inner.state, State::Connecting { attempt: a, .. } if *a == attempt);
        if current {
            inner.state = match &result {
                Ok(conn) => {
                    tracing::info!("Connected to {}", self.connector.name());
                    State::Connected(conn.clone())
                }
                Err(err) => {
                    tracing::warn!("Connection to {} failed: {}", self.connector.name(), err);
                    State::Failed(err.clone())
                }
            };
        }
        result
    }

    fn start_attempt(&self, inner: &mut Inner<C::Connection>) -> (u64, Attempt<C::Connection>) {
        inner.attempts += 1;
        let attempt = inner.attempts;
        let connector = self.connector.clone();
        let timeout = self.config.connect_timeout;

        tracing::debug!("Connecting to {} (attempt {})", connector.name(), attempt);

        let pending = async move {
            match tokio::time::timeout(timeout, connector.connect()).await {
                Ok(Ok(conn)) => Ok(Arc::new(conn)),
                Ok(Err(err)) => Err(err),
                Err(_) => Err(ConnectionError::Timeout(timeout)),
            }
        }
        .boxed()
        .shared();

        inner.state = State::Connecting {
            attempt,
            pending: pending.clone(),
        };
        (attempt, pending)
    }

    /// Drop the current connection. An attempt still in flight will not be
    /// recorded when it finishes.
    pub async fn disconnect(&self) {
        let mut inner = self.inner.lock().await;
        if !matches!(inner.state, State::Disconnected) {
            tracing::info!("Disconnecting from {}", self.connector.name());
        }
        inner.state = State::Disconnected;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeFeed {
        calls: Arc<AtomicUsize>,
        delay: Duration,
        failures: usize,
    }

    struct FeedSession {
        id: usize,
    }

    #[async_trait]
    impl Connector for FakeFeed {
        type Connection = FeedSession;

        async fn connect(&self) -> Result<FeedSession, ConnectionError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(self.delay).await;
            if call <= self.failures {
                return Err(ConnectionError::Refused(format!("attempt {}", call)));
            }
            Ok(FeedSession { id: call })
        }

        fn name(&self) -> &str {
            "fake-feed"
        }
    }

    fn manager(delay_ms: u64, failures: usize) -> (ConnectionManager<FakeFeed>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let feed = FakeFeed {
            calls: calls.clone(),
            delay: Duration::from_millis(delay_ms),
            failures,
        };
        (ConnectionManager::new(feed, ConnectionConfig::default()), calls)
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_attempt() {
        let (mgr, calls) = manager(100, 0);
        assert_eq!(mgr.state().await, ConnectionState::Disconnected);

        let (a, b, c) = tokio::join!(
            mgr.ensure_connected(),
            mgr.ensure_connected(),
            mgr.ensure_connected()
        );
        let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&a, &b) && Arc::ptr_eq(&b, &c));
        assert_eq!(mgr.state().await, ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connected_is_reused() {
        let (mgr, calls) = manager(10, 0);
        let first = mgr.ensure_connected().await.unwrap();
        let second = mgr.ensure_connected().await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_then_clean_retry() {
        let (mgr, calls) = manager(10, 1);

        let err = mgr.ensure_connected().await.err().unwrap();
        assert_eq!(err, ConnectionError::Refused("attempt 1".to_string()));
        assert_eq!(mgr.state().await, ConnectionState::Failed);
        assert_eq!(mgr.last_error().await, Some(err));

        let conn = mgr.ensure_connected().await.unwrap();
        assert_eq!(conn.id, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(mgr.state().await, ConnectionState::Connected);
        assert!(mgr.last_error().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout() {
        let calls = Arc::new(AtomicUsize::new(0));
        let feed = FakeFeed {
            calls: calls.clone(),
            delay: Duration::from_secs(60),
            failures: 0,
        };
        let config = ConnectionConfig {
            connect_timeout: Duration::from_secs(1),
        };
        let mgr = ConnectionManager::new(feed, config);

        let err = mgr.ensure_connected().await.err().unwrap();
        assert_eq!(err, ConnectionError::Timeout(Duration::from_secs(1)));
        assert_eq!(mgr.state().await, ConnectionState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_forces_reconnect() {
        let (mgr, calls) = manager(10, 0);
        mgr.ensure_connected().await.unwrap();
        mgr.disconnect().await;
        assert_eq!(mgr.state().await, ConnectionState::Disconnected);

        let conn = mgr.ensure_connected().await.unwrap();
        assert_eq!(conn.id, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
