//! Catalog records the ledger reads from its collaborators.
//!
//! Products and warehouses are owned elsewhere (catalog CRUD is not part of the
//! ledger); the ledger only needs their ids, the product's valuation policy,
//! and the warehouse's capacity/active flag.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, Entity, ProductId, WarehouseId};

use crate::valuation::ValuationStrategy;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub sku: String,
    pub name: String,
    pub valuation_strategy: ValuationStrategy,
    /// Listing price. Not used by the ledger.
    pub unit_price: Decimal,
    /// Standard cost for margin display. Not used by the ledger.
    pub unit_cost: Decimal,
    /// Threshold for the low-stock view.
    pub min_stock_level: i64,
}

impl Product {
    pub fn new(
        id: ProductId,
        sku: impl Into<String>,
        name: impl Into<String>,
        valuation_strategy: ValuationStrategy,
    ) -> Self {
        Self {
            id,
            sku: sku.into(),
            name: name.into(),
            valuation_strategy,
            unit_price: Decimal::ZERO,
            unit_cost: Decimal::ZERO,
            min_stock_level: 0,
        }
    }

    pub fn with_min_stock_level(mut self, level: i64) -> Self {
        self.min_stock_level = level;
        self
    }

    pub fn with_pricing(mut self, unit_price: Decimal, unit_cost: Decimal) -> Self {
        self.unit_price = unit_price;
        self.unit_cost = unit_cost;
        self
    }

    /// `unit_price − unit_cost`, for listing views.
    pub fn unit_margin(&self) -> Decimal {
        self.unit_price - self.unit_cost
    }
}

impl Entity for Product {
    const KIND: &'static str = "product";
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warehouse {
    pub id: WarehouseId,
    pub name: String,
    /// Ceiling on total held quantity across all products. `None` = unlimited.
    pub capacity: Option<i64>,
    pub is_active: bool,
}

impl Warehouse {
    pub fn new(id: WarehouseId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            capacity: None,
            is_active: true,
        }
    }

    pub fn with_capacity(mut self, capacity: i64) -> Self {
        self.capacity = Some(capacity);
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("warehouse name cannot be empty"));
        }
        if let Some(capacity) = self.capacity {
            if capacity < 0 {
                return Err(DomainError::validation(format!(
                    "warehouse capacity cannot be negative (got {capacity})"
                )));
            }
        }
        Ok(())
    }
}

impl Entity for Warehouse {
    const KIND: &'static str = "warehouse";
    type Id = WarehouseId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
