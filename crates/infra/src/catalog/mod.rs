//! Catalog lookups the ledger consumes.
//!
//! Product and warehouse records are owned by the catalog layer; the ledger
//! only reads them (existence, valuation policy, capacity, active flag).

pub mod in_memory;

use std::sync::Arc;

use stockledger_core::{ProductId, WarehouseId};
use stockledger_inventory::{Product, Warehouse};

pub use in_memory::InMemoryCatalog;

pub trait ProductCatalog: Send + Sync {
    fn product(&self, id: ProductId) -> Option<Product>;
    fn products(&self) -> Vec<Product>;
}

pub trait WarehouseDirectory: Send + Sync {
    fn warehouse(&self, id: WarehouseId) -> Option<Warehouse>;
    fn warehouses(&self) -> Vec<Warehouse>;
}

impl<S> ProductCatalog for Arc<S>
where
    S: ProductCatalog + ?Sized,
{
    fn product(&self, id: ProductId) -> Option<Product> {
        (**self).product(id)
    }

    fn products(&self) -> Vec<Product> {
        (**self).products()
    }
}

impl<S> WarehouseDirectory for Arc<S>
where
    S: WarehouseDirectory + ?Sized,
{
    fn warehouse(&self, id: WarehouseId) -> Option<Warehouse> {
        (**self).warehouse(id)
    }

    fn warehouses(&self) -> Vec<Warehouse> {
        (**self).warehouses()
    }
}
