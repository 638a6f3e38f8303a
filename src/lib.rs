pub mod config;
pub mod session;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShardSessionError {
    #[error("failed to acquire connections from data source '{data_source}': {source}")]
    Acquisition {
        data_source: String,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Release(#[from] session::ReleaseFailure),

    #[error("session is terminated; no further resource acquisition is permitted")]
    SessionTerminated,

    #[error("session connection limit exceeded: would hold {requested} connections, limit is {limit}")]
    ConnectionLimit { requested: usize, limit: usize },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("transaction backend error: {0}")]
    Transaction(#[source] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ShardSessionError>;
