pub mod sqlite;

pub use sqlite::SqliteGraphStore;
