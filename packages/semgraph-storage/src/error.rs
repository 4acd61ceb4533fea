//! `thiserror`-derived error type for the storage crate.
//!
//! Contrasts deliberately with `semgraph-ir`'s hand-rolled `CodegraphError`
//! — the source material mixes both styles across crates.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(String),
}

impl StorageError {
    pub fn database(message: impl Into<String>) -> Self {
        StorageError::Database(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        StorageError::Config(message.into())
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        StorageError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::Io(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;
