//! Runtime-config stores and the SQLite audit log.

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryRuntimeConfig;
pub use sqlite::SqliteStore;
