//! Append-only movement ledger boundary.
//!
//! Defines the storage abstraction for the ledger and its balance projection
//! without making storage assumptions, plus in-memory and Postgres backends.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryLedgerStore;
pub use postgres::PostgresLedgerStore;
pub use r#trait::{LedgerStore, LedgerStoreError, MovementBatch, MovementFilter};
