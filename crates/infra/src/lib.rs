//! Infrastructure layer: ledger storage, catalog lookups, config, orchestration.

pub mod catalog;
pub mod config;
pub mod ledger_store;
pub mod service;

#[cfg(test)]
mod integration_tests;

pub use config::{ConfigError, LedgerConfig};
pub use service::{InventoryService, LowStockItem, ProductStock, ServiceSettings};
