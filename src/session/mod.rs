// Module for session management
pub mod backend_session;
pub mod datasource;
pub mod resource_cache;
pub mod transaction_manager;

pub use backend_session::{BackendSession, SessionStatus};
pub use datasource::{BackendDataSource, ConnectionMode, Cursor, ExecutionHandle, PhysicalConnection};
pub use resource_cache::{ReleaseFailure, ResourceCache};
pub use transaction_manager::{
    BackendTransactionManager, TransactionBackend, TransactionOperation, TransactionType,
};
