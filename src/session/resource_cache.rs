use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::session::datasource::{Cursor, ExecutionHandle, PhysicalConnection};
use crate::{Result, ShardSessionError};

/// Per-session cache of acquired backend resources: physical connections
/// grouped by data-source name, plus the flat collections of open cursors
/// and execution handles created on those connections.
///
/// The cache carries no locking of its own; every operation runs under the
/// owning session's single exclusion (see `BackendSession`).
pub struct ResourceCache {
    /// Connections held for the session, keyed by data-source name
    connections: HashMap<String, Vec<Arc<dyn PhysicalConnection>>>,
    /// Open cursors, in registration order
    cursors: Vec<Arc<dyn Cursor>>,
    /// Open execution handles, in registration order
    execution_handles: Vec<Arc<dyn ExecutionHandle>>,
}

impl ResourceCache {
    pub fn new() -> Self {
        ResourceCache {
            connections: HashMap::new(),
            cursors: Vec::new(),
            execution_handles: Vec::new(),
        }
    }

    /// Number of connections already held for the given data source (0 when
    /// the key is absent).
    pub fn cached_count(&self, data_source_name: &str) -> usize {
        self.connections
            .get(data_source_name)
            .map_or(0, |held| held.len())
    }

    /// Total connections held across all data sources.
    pub fn connection_count(&self) -> usize {
        self.connections.values().map(|held| held.len()).sum()
    }

    pub fn cursor_count(&self) -> usize {
        self.cursors.len()
    }

    pub fn execution_handle_count(&self) -> usize {
        self.execution_handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty() && self.cursors.is_empty() && self.execution_handles.is_empty()
    }

    /// Insert already-acquired connections under a data-source key. Used by
    /// `ensure` and by deterministic test seeding through
    /// `BackendSession::with_cache`.
    pub fn insert_connections(
        &mut self,
        data_source_name: &str,
        connections: Vec<Arc<dyn PhysicalConnection>>,
    ) {
        self.connections
            .entry(data_source_name.to_string())
            .or_default()
            .extend(connections);
    }

    pub fn register_cursor(&mut self, cursor: Arc<dyn Cursor>) {
        self.cursors.push(cursor);
    }

    pub fn register_execution_handle(&mut self, handle: Arc<dyn ExecutionHandle>) {
        self.execution_handles.push(handle);
    }

    /// Grow the held connections for `data_source_name` to `target` and return
    /// exactly `target` of them. When the cache already holds enough, the first
    /// `target` cached connections are returned and `acquire` is never called;
    /// otherwise `acquire` is called once for exactly the shortfall and the new
    /// connections are inserted before being returned alongside the cached ones.
    ///
    /// A failed or short acquisition leaves the key in its pre-call state.
    pub async fn ensure<F, Fut>(
        &mut self,
        data_source_name: &str,
        target: usize,
        acquire: F,
    ) -> Result<Vec<Arc<dyn PhysicalConnection>>>
    where
        F: FnOnce(usize) -> Fut,
        Fut: Future<Output = anyhow::Result<Vec<Arc<dyn PhysicalConnection>>>>,
    {
        let cached = self.cached_count(data_source_name);
        if cached >= target {
            debug!(
                "Reusing {} cached connections for data source {} ({} held)",
                target, data_source_name, cached
            );
            let held = self
                .connections
                .get(data_source_name)
                .map_or(&[][..], |held| held.as_slice());
            return Ok(held[..target].to_vec());
        }

        let shortfall = target - cached;
        debug!(
            "Acquiring {} new connections for data source {} ({} cached, {} requested)",
            shortfall, data_source_name, cached, target
        );
        let acquired = acquire(shortfall)
            .await
            .map_err(|source| ShardSessionError::Acquisition {
                data_source: data_source_name.to_string(),
                source,
            })?;
        if acquired.len() != shortfall {
            return Err(ShardSessionError::Acquisition {
                data_source: data_source_name.to_string(),
                source: anyhow::anyhow!(
                    "requested {} connections, data source returned {}",
                    shortfall,
                    acquired.len()
                ),
            });
        }

        let held = self
            .connections
            .entry(data_source_name.to_string())
            .or_default();
        held.extend(acquired);
        Ok(held.clone())
    }

    /// Close every cursor, then every execution handle, then every connection,
    /// clearing each collection as it goes. Higher-level handles are released
    /// before the connections they depend on. Failures never stop the drain;
    /// they are collected and returned once as a `ReleaseFailure`.
    pub fn drain_and_close_all(&mut self) -> std::result::Result<(), ReleaseFailure> {
        let mut failures = Vec::new();

        for cursor in self.cursors.drain(..) {
            if let Err(e) = cursor.close() {
                failures.push(e);
            }
        }
        for handle in self.execution_handles.drain(..) {
            if let Err(e) = handle.close() {
                failures.push(e);
            }
        }
        for (data_source_name, held) in self.connections.drain() {
            for connection in held {
                if let Err(e) = connection.close() {
                    warn!(
                        "Failed to close connection for data source {}: {}",
                        data_source_name, e
                    );
                    failures.push(e);
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ReleaseFailure::new(failures))
        }
    }
}

impl Default for ResourceCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Aggregated failure from draining a session's resources. The first failure
/// encountered is the primary error; every further failure collected while the
/// drain continued is chained behind it rather than discarded.
#[derive(Debug)]
pub struct ReleaseFailure {
    failures: Vec<anyhow::Error>,
}

impl ReleaseFailure {
    fn new(failures: Vec<anyhow::Error>) -> Self {
        debug_assert!(!failures.is_empty());
        ReleaseFailure { failures }
    }

    /// The first failure encountered during the drain.
    pub fn primary(&self) -> &anyhow::Error {
        &self.failures[0]
    }

    /// Failures collected after the primary one, in drain order.
    pub fn chained(&self) -> &[anyhow::Error] {
        &self.failures[1..]
    }

    /// Every collected failure, primary first.
    pub fn failures(&self) -> &[anyhow::Error] {
        &self.failures
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for ReleaseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "failed to release {} resource(s) during session close: {}",
            self.failures.len(),
            self.failures[0]
        )
    }
}

impl std::error::Error for ReleaseFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        let primary: &(dyn std::error::Error + 'static) = self.failures[0].as_ref();
        Some(primary)
    }
}
