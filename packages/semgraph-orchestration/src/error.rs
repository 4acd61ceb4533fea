//! `thiserror`-derived error type for the orchestration crate, matching
//! `semgraph-storage::error::StorageError`'s style rather than
//! `semgraph-ir`'s hand-rolled one — the split is deliberate, see
//! `SPEC_FULL.md` §7.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error("store error: {0}")]
    Store(#[from] semgraph_storage::StorageError),

    #[error("extraction error: {0}")]
    Extraction(#[from] semgraph_ir::CodegraphError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl OrchestrationError {
    pub fn config(message: impl Into<String>) -> Self {
        OrchestrationError::Config(message.into())
    }
}

pub type Result<T> = std::result::Result<T, OrchestrationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = OrchestrationError::config("missing store.uri");
        assert_eq!(err.to_string(), "invalid configuration: missing store.uri");
    }
}
