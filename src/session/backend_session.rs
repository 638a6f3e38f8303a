use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::CONFIG;
use crate::session::datasource::{
    BackendDataSource, ConnectionMode, Cursor, ExecutionHandle, PhysicalConnection,
};
use crate::session::resource_cache::ResourceCache;
use crate::session::transaction_manager::TransactionType;
use crate::{Result, ShardSessionError};

/// Lifecycle state of a backend session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Created, no resources touched yet
    Init,
    /// Resources may be acquired
    Running,
    /// Closed; no further acquisition is permitted
    Terminated,
}

/// One logical client session's backend resource and transaction context.
///
/// A session may be driven by several workers at once (parallel statement
/// execution within one logical connection), so every resource operation runs
/// under a single per-session mutex. The mutex is held across the awaited
/// acquisition call inside `get_connections`; that serializes concurrent
/// growth on the same session and is what keeps the shortfall acquired
/// exactly once.
///
/// Sessions are scoped resources: callers must invoke `close` on every exit
/// path. `close` must not race with in-flight acquisition on the same
/// session; that is the caller's responsibility.
pub struct BackendSession {
    id: Uuid,
    /// The single per-session exclusion guarding all resource state
    resources: Mutex<ResourceCache>,
    status: RwLock<SessionStatus>,
    transaction_type: RwLock<TransactionType>,
    /// Owned by the transaction manager, consulted here
    transaction_active: AtomicBool,
    data_source: Arc<dyn BackendDataSource>,
    max_connections: usize,
}

impl BackendSession {
    pub fn new(transaction_type: TransactionType, data_source: Arc<dyn BackendDataSource>) -> Self {
        Self::with_cache(transaction_type, data_source, ResourceCache::new())
    }

    /// Create a session over a pre-populated cache. This is how tests seed
    /// deterministic cache state; production callers start from
    /// `ResourceCache::new()` via `new`.
    pub fn with_cache(
        transaction_type: TransactionType,
        data_source: Arc<dyn BackendDataSource>,
        cache: ResourceCache,
    ) -> Self {
        let id = Uuid::new_v4();
        debug!("Created backend session {}", id);
        BackendSession {
            id,
            resources: Mutex::new(cache),
            status: RwLock::new(SessionStatus::Init),
            transaction_type: RwLock::new(transaction_type),
            transaction_active: AtomicBool::new(false),
            data_source,
            max_connections: CONFIG.max_session_connections,
        }
    }

    /// Override the per-session connection ceiling (defaults to
    /// `CONFIG.max_session_connections`).
    pub fn with_connection_limit(mut self, limit: usize) -> Self {
        self.max_connections = limit;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Return exactly `count` physical connections for `data_source_name`,
    /// reusing cached connections and acquiring only the shortfall from the
    /// backend data source. `mode` is forwarded to the data source untouched.
    ///
    /// A failed acquisition leaves previously cached connections in place.
    pub async fn get_connections(
        &self,
        mode: ConnectionMode,
        data_source_name: &str,
        count: usize,
    ) -> Result<Vec<Arc<dyn PhysicalConnection>>> {
        if data_source_name.is_empty() {
            return Err(ShardSessionError::InvalidParameter(
                "data source name must not be empty".to_string(),
            ));
        }
        if self.status() == SessionStatus::Terminated {
            return Err(ShardSessionError::SessionTerminated);
        }
        {
            let mut status = self.status.write();
            if *status == SessionStatus::Init {
                *status = SessionStatus::Running;
            }
        }

        let mut resources = self.resources.lock().await;
        let shortfall = count.saturating_sub(resources.cached_count(data_source_name));
        let projected = resources.connection_count() + shortfall;
        if projected > self.max_connections {
            return Err(ShardSessionError::ConnectionLimit {
                requested: projected,
                limit: self.max_connections,
            });
        }

        let data_source = &self.data_source;
        let connections = resources
            .ensure(data_source_name, count, |needed| async move {
                data_source
                    .get_connections(mode, data_source_name, needed)
                    .await
            })
            .await?;
        debug!(
            "Session {} holds {} connections after request for {} on {}",
            self.id,
            resources.connection_count(),
            count,
            data_source_name
        );
        Ok(connections)
    }

    /// Total cached-connection count across all data sources, read under the
    /// same exclusion used for mutation.
    pub async fn connection_size(&self) -> usize {
        self.resources.lock().await.connection_count()
    }

    pub async fn register_cursor(&self, cursor: Arc<dyn Cursor>) {
        self.resources.lock().await.register_cursor(cursor);
    }

    pub async fn register_execution_handle(&self, handle: Arc<dyn ExecutionHandle>) {
        self.resources.lock().await.register_execution_handle(handle);
    }

    pub async fn cursor_count(&self) -> usize {
        self.resources.lock().await.cursor_count()
    }

    pub async fn execution_handle_count(&self) -> usize {
        self.resources.lock().await.execution_handle_count()
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.read()
    }

    /// Plain mutator, no validation. `close` sets `Terminated` itself; callers
    /// must not use this to skip draining.
    pub fn set_status(&self, status: SessionStatus) {
        *self.status.write() = status;
    }

    pub fn transaction_type(&self) -> TransactionType {
        *self.transaction_type.read()
    }

    /// Change the session's transaction type. Silently ignored while a
    /// transaction is active; the previous value is retained.
    pub fn set_transaction_type(&self, transaction_type: TransactionType) {
        if self.transaction_active() {
            debug!(
                "Session {} ignoring transaction type change to {:?} during active transaction",
                self.id, transaction_type
            );
            return;
        }
        *self.transaction_type.write() = transaction_type;
    }

    pub fn transaction_active(&self) -> bool {
        self.transaction_active.load(Ordering::Acquire)
    }

    pub(crate) fn set_transaction_active(&self, active: bool) {
        self.transaction_active.store(active, Ordering::Release);
    }

    /// Terminate the session and release every cached resource: cursors, then
    /// execution handles, then connections. Release failures are aggregated
    /// into a single error with the full chain attached; the cache is empty by
    /// the time this returns, on the failure path too. Closing an
    /// already-terminated, drained session is a no-op.
    pub async fn close(&self) -> Result<()> {
        self.set_status(SessionStatus::Terminated);
        let mut resources = self.resources.lock().await;
        match resources.drain_and_close_all() {
            Ok(()) => {
                info!("Closed backend session {}", self.id);
                Ok(())
            }
            Err(failure) => {
                warn!(
                    "Session {} released resources with {} failure(s)",
                    self.id,
                    failure.len()
                );
                Err(failure.into())
            }
        }
    }
}

impl Drop for BackendSession {
    fn drop(&mut self) {
        // close() cannot run here (async and fallible), so a leak is the
        // caller's bug; make it visible.
        if *self.status.get_mut() != SessionStatus::Terminated {
            let resources = self.resources.get_mut();
            if !resources.is_empty() {
                warn!(
                    "Backend session {} dropped without close; {} connections, {} cursors, {} handles leaked",
                    self.id,
                    resources.connection_count(),
                    resources.cursor_count(),
                    resources.execution_handle_count()
                );
            }
        }
    }
}
