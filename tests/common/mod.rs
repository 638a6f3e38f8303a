use async_trait::async_trait;
use std::sync::Arc;
use std::sync::Once;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use shardsession::session::{
    BackendDataSource, ConnectionMode, Cursor, ExecutionHandle, PhysicalConnection,
    ResourceCache, TransactionBackend, TransactionType,
};

static TRACING: Once = Once::new();

/// Install the test log subscriber once per test binary; honors RUST_LOG.
#[allow(dead_code)]
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Physical connection stub; close can be made to fail.
#[derive(Debug)]
pub struct MockConnection {
    fail_on_close: bool,
    pub closed: AtomicBool,
}

impl MockConnection {
    pub fn new() -> Self {
        MockConnection {
            fail_on_close: false,
            closed: AtomicBool::new(false),
        }
    }

    #[allow(dead_code)]
    pub fn failing() -> Self {
        MockConnection {
            fail_on_close: true,
            closed: AtomicBool::new(false),
        }
    }
}

impl PhysicalConnection for MockConnection {
    fn close(&self) -> anyhow::Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        if self.fail_on_close {
            anyhow::bail!("mock connection refused to close")
        }
        Ok(())
    }
}

/// Cursor/execution-handle stub that always fails to close, for exercising
/// aggregated release failures.
pub struct FailingResource {
    label: &'static str,
}

impl FailingResource {
    pub fn new(label: &'static str) -> Arc<Self> {
        Arc::new(FailingResource { label })
    }
}

impl Cursor for FailingResource {
    fn close(&self) -> anyhow::Result<()> {
        anyhow::bail!("{} close failed", self.label)
    }
}

impl ExecutionHandle for FailingResource {
    fn close(&self) -> anyhow::Result<()> {
        anyhow::bail!("{} close failed", self.label)
    }
}

pub fn mock_connections(count: usize) -> Vec<Arc<dyn PhysicalConnection>> {
    (0..count)
        .map(|_| Arc::new(MockConnection::new()) as Arc<dyn PhysicalConnection>)
        .collect()
}

/// Build a cache pre-seeded with `count` connections under `data_source_name`,
/// for deterministic session setup.
pub fn seeded_cache(data_source_name: &str, count: usize) -> ResourceCache {
    let mut cache = ResourceCache::new();
    cache.insert_connections(data_source_name, mock_connections(count));
    cache
}

/// Acquisition service stub. Counts calls and connections served; can be
/// slowed down, made to fail, or made to under-deliver.
pub struct MockDataSource {
    pub calls: AtomicUsize,
    pub connections_served: AtomicUsize,
    delay: Option<Duration>,
    fail: bool,
    short_delivery: bool,
}

impl MockDataSource {
    pub fn new() -> Arc<Self> {
        Arc::new(MockDataSource {
            calls: AtomicUsize::new(0),
            connections_served: AtomicUsize::new(0),
            delay: None,
            fail: false,
            short_delivery: false,
        })
    }

    #[allow(dead_code)]
    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(MockDataSource {
            calls: AtomicUsize::new(0),
            connections_served: AtomicUsize::new(0),
            delay: Some(delay),
            fail: false,
            short_delivery: false,
        })
    }

    #[allow(dead_code)]
    pub fn failing() -> Arc<Self> {
        Arc::new(MockDataSource {
            calls: AtomicUsize::new(0),
            connections_served: AtomicUsize::new(0),
            delay: None,
            fail: true,
            short_delivery: false,
        })
    }

    #[allow(dead_code)]
    pub fn short_delivering() -> Arc<Self> {
        Arc::new(MockDataSource {
            calls: AtomicUsize::new(0),
            connections_served: AtomicUsize::new(0),
            delay: None,
            fail: false,
            short_delivery: true,
        })
    }
}

#[async_trait]
impl BackendDataSource for MockDataSource {
    async fn get_connections(
        &self,
        _mode: ConnectionMode,
        data_source_name: &str,
        count: usize,
    ) -> anyhow::Result<Vec<Arc<dyn PhysicalConnection>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            anyhow::bail!("data source '{}' unavailable", data_source_name);
        }
        let served = if self.short_delivery {
            count.saturating_sub(1)
        } else {
            count
        };
        self.connections_served.fetch_add(served, Ordering::SeqCst);
        Ok(mock_connections(served))
    }
}

/// Transaction backend stub with per-operation counters and failure switches.
pub struct MockTransactionBackend {
    pub begins: AtomicUsize,
    pub commits: AtomicUsize,
    pub rollbacks: AtomicUsize,
    fail_begin: bool,
    fail_commit: bool,
}

impl MockTransactionBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(MockTransactionBackend {
            begins: AtomicUsize::new(0),
            commits: AtomicUsize::new(0),
            rollbacks: AtomicUsize::new(0),
            fail_begin: false,
            fail_commit: false,
        })
    }

    #[allow(dead_code)]
    pub fn failing_begin() -> Arc<Self> {
        Arc::new(MockTransactionBackend {
            begins: AtomicUsize::new(0),
            commits: AtomicUsize::new(0),
            rollbacks: AtomicUsize::new(0),
            fail_begin: true,
            fail_commit: false,
        })
    }

    #[allow(dead_code)]
    pub fn failing_commit() -> Arc<Self> {
        Arc::new(MockTransactionBackend {
            begins: AtomicUsize::new(0),
            commits: AtomicUsize::new(0),
            rollbacks: AtomicUsize::new(0),
            fail_begin: false,
            fail_commit: true,
        })
    }
}

#[async_trait]
impl TransactionBackend for MockTransactionBackend {
    async fn begin(&self, _transaction_type: TransactionType) -> anyhow::Result<()> {
        self.begins.fetch_add(1, Ordering::SeqCst);
        if self.fail_begin {
            anyhow::bail!("begin failed")
        }
        Ok(())
    }

    async fn commit(&self) -> anyhow::Result<()> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        if self.fail_commit {
            anyhow::bail!("commit failed")
        }
        Ok(())
    }

    async fn rollback(&self) -> anyhow::Result<()> {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
