//! Stock movements: the append-only facts of the ledger.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockledger_core::{ActorId, Entity, MovementId, ProductId, WarehouseId};

use crate::error::{InventoryError, InventoryResult};

/// Direction of a movement relative to the warehouse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "in" => Some(Direction::In),
            "out" => Some(Direction::Out),
            _ => None,
        }
    }
}

impl core::fmt::Display for Direction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A movement that has not been appended yet (no id, no sequence).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementDraft {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub direction: Direction,
    pub quantity: i64,
    /// Only meaningful on IN movements. `None` excludes the batch from valuation.
    pub unit_cost: Option<Decimal>,
    pub description: String,
    pub actor_id: ActorId,
    /// Business time. Defaults to the commit time when `None`.
    pub occurred_at: Option<DateTime<Utc>>,
}

impl MovementDraft {
    pub fn incoming(
        product_id: ProductId,
        warehouse_id: WarehouseId,
        quantity: i64,
        unit_cost: Option<Decimal>,
        description: impl Into<String>,
        actor_id: ActorId,
    ) -> Self {
        Self {
            product_id,
            warehouse_id,
            direction: Direction::In,
            quantity,
            unit_cost,
            description: description.into(),
            actor_id,
            occurred_at: None,
        }
    }

    pub fn outgoing(
        product_id: ProductId,
        warehouse_id: WarehouseId,
        quantity: i64,
        description: impl Into<String>,
        actor_id: ActorId,
    ) -> Self {
        Self {
            product_id,
            warehouse_id,
            direction: Direction::Out,
            quantity,
            unit_cost: None,
            description: description.into(),
            actor_id,
            occurred_at: None,
        }
    }

    pub fn at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(occurred_at);
        self
    }

    /// Structural validation. The ledger never rejects a movement for business
    /// reasons (stock, capacity); only for malformed input.
    pub fn validate(&self) -> InventoryResult<()> {
        if self.quantity <= 0 {
            return Err(InventoryError::invalid_movement(format!(
                "quantity must be positive (got {})",
                self.quantity
            )));
        }
        if let Some(cost) = self.unit_cost {
            if self.direction == Direction::Out {
                return Err(InventoryError::invalid_movement(
                    "unit cost only applies to incoming movements",
                ));
            }
            if cost < Decimal::ZERO {
                return Err(InventoryError::invalid_movement(format!(
                    "unit cost cannot be negative (got {cost})"
                )));
            }
        }
        Ok(())
    }

    /// Turn the draft into an appended fact.
    pub fn into_movement(
        self,
        id: MovementId,
        sequence: u64,
        committed_at: DateTime<Utc>,
    ) -> StockMovement {
        StockMovement {
            id,
            sequence,
            product_id: self.product_id,
            warehouse_id: self.warehouse_id,
            direction: self.direction,
            quantity: self.quantity,
            unit_cost: self.unit_cost,
            description: self.description,
            actor_id: self.actor_id,
            occurred_at: self.occurred_at.unwrap_or(committed_at),
        }
    }
}

/// An immutable ledger fact. Never updated, never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: MovementId,
    /// Ledger-wide insertion order; breaks `occurred_at` ties.
    pub sequence: u64,
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub direction: Direction,
    pub quantity: i64,
    pub unit_cost: Option<Decimal>,
    pub description: String,
    pub actor_id: ActorId,
    pub occurred_at: DateTime<Utc>,
}

impl StockMovement {
    /// Effect on the (product, warehouse) balance.
    pub fn signed_quantity(&self) -> i64 {
        match self.direction {
            Direction::In => self.quantity,
            Direction::Out => -self.quantity,
        }
    }

    /// Key used to order movements for valuation: business time, then
    /// insertion order.
    pub fn ordering_key(&self) -> (DateTime<Utc>, u64) {
        (self.occurred_at, self.sequence)
    }

    pub fn summary(&self) -> MovementSummary {
        MovementSummary {
            id: self.id,
            direction: self.direction,
            quantity: self.quantity,
            description: self.description.clone(),
            occurred_at: self.occurred_at,
        }
    }
}

impl Entity for StockMovement {
    const KIND: &'static str = "movement";
    type Id = MovementId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Caller-facing view of a created movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementSummary {
    pub id: MovementId,
    pub direction: Direction,
    pub quantity: i64,
    pub description: String,
    pub occurred_at: DateTime<Utc>,
}

/// Sort movements into valuation order in place.
pub fn sort_chronologically(movements: &mut [StockMovement]) {
    movements.sort_by_key(StockMovement::ordering_key);
}
