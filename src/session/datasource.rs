use async_trait::async_trait;
use std::sync::Arc;

/// Policy tag controlling whether acquired connections may be shared across
/// routing units. The session layer never interprets it; it is forwarded
/// unchanged to the acquisition collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMode {
    MemoryStrictly,
    ConnectionStrictly,
}

/// An opaque, independently closable physical connection to one backend
/// data source.
pub trait PhysicalConnection: std::fmt::Debug + Send + Sync {
    fn close(&self) -> anyhow::Result<()>;
}

/// A per-query cursor created on a physical connection, requiring explicit
/// release before the connection it depends on is closed.
pub trait Cursor: Send + Sync {
    fn close(&self) -> anyhow::Result<()>;
}

/// A per-query execution handle created on a physical connection, requiring
/// explicit release before the connection it depends on is closed.
pub trait ExecutionHandle: Send + Sync {
    fn close(&self) -> anyhow::Result<()>;
}

/// Acquisition service that opens new physical connections against a named
/// data source.
#[async_trait]
pub trait BackendDataSource: Send + Sync {
    /// Open `count` new physical connections against `data_source_name`.
    /// Returns exactly `count` connections on success; a short delivery is
    /// treated as a failed acquisition by the caller.
    async fn get_connections(
        &self,
        mode: ConnectionMode,
        data_source_name: &str,
        count: usize,
    ) -> anyhow::Result<Vec<Arc<dyn PhysicalConnection>>>;
}
