use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::session::backend_session::BackendSession;
use crate::{Result, ShardSessionError};

/// Commit protocol bound to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionType {
    /// Single-resource local transaction
    #[default]
    Local,
    /// Distributed two-phase commit
    Xa,
    /// Saga-style eventual commit
    Base,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionOperation {
    Begin,
    Commit,
    Rollback,
}

/// Transaction execution backend consumed by the transaction manager.
#[async_trait]
pub trait TransactionBackend: Send + Sync {
    async fn begin(&self, transaction_type: TransactionType) -> anyhow::Result<()>;
    async fn commit(&self) -> anyhow::Result<()>;
    async fn rollback(&self) -> anyhow::Result<()>;
}

/// Executes begin/commit/rollback for one session and maintains the session's
/// active-transaction flag. While the flag is set, the session refuses
/// transaction-type changes.
pub struct BackendTransactionManager {
    session: Arc<BackendSession>,
    backend: Arc<dyn TransactionBackend>,
}

impl BackendTransactionManager {
    pub fn new(session: Arc<BackendSession>, backend: Arc<dyn TransactionBackend>) -> Self {
        BackendTransactionManager { session, backend }
    }

    pub async fn do_in_transaction(&self, operation: TransactionOperation) -> Result<()> {
        match operation {
            TransactionOperation::Begin => self.begin().await,
            TransactionOperation::Commit => self.commit().await,
            TransactionOperation::Rollback => self.rollback().await,
        }
    }

    /// Begin while already in a transaction is a no-op; the flag is set only
    /// after the backend begin succeeds, so a failed begin leaves the
    /// transaction type changeable.
    async fn begin(&self) -> Result<()> {
        if self.session.transaction_active() {
            debug!(
                "Session {} begin ignored, transaction already active",
                self.session.id()
            );
            return Ok(());
        }
        let transaction_type = self.session.transaction_type();
        self.backend
            .begin(transaction_type)
            .await
            .map_err(ShardSessionError::Transaction)?;
        self.session.set_transaction_active(true);
        debug!(
            "Session {} began {:?} transaction",
            self.session.id(),
            transaction_type
        );
        Ok(())
    }

    /// Commit outside a transaction is a no-op. The active flag clears before
    /// the backend call so a failed commit cannot wedge the session in the
    /// active state.
    async fn commit(&self) -> Result<()> {
        if !self.session.transaction_active() {
            return Ok(());
        }
        self.session.set_transaction_active(false);
        self.backend
            .commit()
            .await
            .map_err(ShardSessionError::Transaction)
    }

    /// Rollback outside a transaction is a no-op; clears the flag like commit.
    async fn rollback(&self) -> Result<()> {
        if !self.session.transaction_active() {
            return Ok(());
        }
        self.session.set_transaction_active(false);
        self.backend
            .rollback()
            .await
            .map_err(ShardSessionError::Transaction)
    }
}
