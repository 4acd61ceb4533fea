//! The persistence port and query façade, `spec.md` §4.3 and §4.5.
//!
//! `port` defines the database-agnostic `GraphStore` contract;
//! `infrastructure::sqlite` is the one concrete backend; `query` is the
//! read-only façade the orchestration crate drives for diagnostics and
//! impact analysis.

pub mod error;
pub mod infrastructure;
pub mod port;
pub mod query;

pub use error::{Result, StorageError};
pub use infrastructure::SqliteGraphStore;
pub use port::{Direction, GraphStatistics, GraphStore, PropagationResult, Subgraph};
pub use query::ChangeType;
