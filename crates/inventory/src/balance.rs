//! Balance projection: (product, warehouse) → quantity.
//!
//! A cache over the ledger, never the ledger itself. Every balance equals
//! `Σ IN.quantity − Σ OUT.quantity` over the movements for its key, and is only
//! ever changed as a direct consequence of appending a movement.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, ProductId, WarehouseId};

use crate::movement::StockMovement;

/// Unique key of a balance row.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BalanceKey {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
}

impl BalanceKey {
    pub fn new(product_id: ProductId, warehouse_id: WarehouseId) -> Self {
        Self {
            product_id,
            warehouse_id,
        }
    }

    pub fn of(movement: &StockMovement) -> Self {
        Self::new(movement.product_id, movement.warehouse_id)
    }
}

/// Derived current quantity of a product in a warehouse. Signed: outgoing
/// movements recorded directly (not via transfer) are not stock-checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryBalance {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub quantity: i64,
}

impl InventoryBalance {
    pub fn zero(key: BalanceKey) -> Self {
        Self {
            product_id: key.product_id,
            warehouse_id: key.warehouse_id,
            quantity: 0,
        }
    }

    pub fn key(&self) -> BalanceKey {
        BalanceKey::new(self.product_id, self.warehouse_id)
    }

    /// Apply exactly ±quantity for one movement.
    pub fn apply(&mut self, movement: &StockMovement) -> Result<(), DomainError> {
        if BalanceKey::of(movement) != self.key() {
            return Err(DomainError::invariant(
                "movement applied to a balance with a different key",
            ));
        }
        self.quantity = self
            .quantity
            .checked_add(movement.signed_quantity())
            .ok_or_else(|| DomainError::invariant("balance quantity overflow"))?;
        Ok(())
    }
}

/// In-memory balance projection.
///
/// Rows are created lazily on the first movement that touches a key. A missing
/// key reads as zero.
#[derive(Debug, Clone, Default)]
pub struct BalanceProjection {
    rows: HashMap<BalanceKey, InventoryBalance>,
}

impl BalanceProjection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from scratch by replaying a movement set.
    pub fn rebuild<'a>(
        movements: impl IntoIterator<Item = &'a StockMovement>,
    ) -> Result<Self, DomainError> {
        let mut projection = Self::new();
        for m in movements {
            projection.apply_movement(m)?;
        }
        Ok(projection)
    }

    /// Apply a single movement. Called exactly once per appended movement.
    pub fn apply_movement(&mut self, movement: &StockMovement) -> Result<(), DomainError> {
        let key = BalanceKey::of(movement);
        let row = self
            .rows
            .entry(key)
            .or_insert_with(|| InventoryBalance::zero(key));
        row.apply(movement)
    }

    pub fn get(&self, key: &BalanceKey) -> Option<&InventoryBalance> {
        self.rows.get(key)
    }

    pub fn quantity(&self, product_id: ProductId, warehouse_id: WarehouseId) -> i64 {
        self.rows
            .get(&BalanceKey::new(product_id, warehouse_id))
            .map(|b| b.quantity)
            .unwrap_or(0)
    }

    /// Replace (or create) a single row. Used to write back staged rows.
    pub fn put(&mut self, balance: InventoryBalance) {
        self.rows.insert(balance.key(), balance);
    }

    pub fn for_warehouse(&self, warehouse_id: WarehouseId) -> Vec<InventoryBalance> {
        let mut rows: Vec<_> = self
            .rows
            .values()
            .filter(|b| b.warehouse_id == warehouse_id)
            .cloned()
            .collect();
        rows.sort_by_key(InventoryBalance::key);
        rows
    }

    pub fn for_product(&self, product_id: ProductId) -> Vec<InventoryBalance> {
        let mut rows: Vec<_> = self
            .rows
            .values()
            .filter(|b| b.product_id == product_id)
            .cloned()
            .collect();
        rows.sort_by_key(InventoryBalance::key);
        rows
    }

    /// Σ balance quantities across all products in a warehouse.
    pub fn used_capacity(&self, warehouse_id: WarehouseId) -> i64 {
        self.rows
            .values()
            .filter(|b| b.warehouse_id == warehouse_id)
            .map(|b| b.quantity)
            .sum()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
