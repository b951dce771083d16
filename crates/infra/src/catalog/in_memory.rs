use std::collections::HashMap;
use std::sync::RwLock;

use stockledger_core::{DomainError, Entity, ProductId, WarehouseId};
use stockledger_inventory::{Product, Warehouse};

use super::{ProductCatalog, WarehouseDirectory};

/// In-memory keyed store of catalog records, for tests/dev.
#[derive(Debug)]
pub struct InMemoryCatalog<V: Entity> {
    inner: RwLock<HashMap<V::Id, V>>,
}

impl<V: Entity> InMemoryCatalog<V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<V: Entity> Default for InMemoryCatalog<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Entity + Clone> InMemoryCatalog<V> {
    pub fn get(&self, id: &V::Id) -> Option<V> {
        let map = self.inner.read().ok()?;
        map.get(id).cloned()
    }

    pub fn upsert(&self, value: V) {
        if let Ok(mut map) = self.inner.write() {
            map.insert(*value.id(), value);
        }
    }

    pub fn remove(&self, id: &V::Id) -> Option<V> {
        self.inner.write().ok()?.remove(id)
    }

    pub fn list(&self) -> Vec<V> {
        match self.inner.read() {
            Ok(map) => map.values().cloned().collect(),
            Err(_) => vec![],
        }
    }
}

impl InMemoryCatalog<Warehouse> {
    /// Insert after validating name and capacity.
    pub fn register(&self, warehouse: Warehouse) -> Result<(), DomainError> {
        warehouse.validate()?;
        self.upsert(warehouse);
        Ok(())
    }
}

impl ProductCatalog for InMemoryCatalog<Product> {
    fn product(&self, id: ProductId) -> Option<Product> {
        self.get(&id)
    }

    fn products(&self) -> Vec<Product> {
        let mut all = self.list();
        all.sort_by(|a, b| a.sku.cmp(&b.sku));
        all
    }
}

impl WarehouseDirectory for InMemoryCatalog<Warehouse> {
    fn warehouse(&self, id: WarehouseId) -> Option<Warehouse> {
        self.get(&id)
    }

    fn warehouses(&self) -> Vec<Warehouse> {
        let mut all = self.list();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }
}
