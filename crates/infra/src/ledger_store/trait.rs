use serde::{Deserialize, Serialize};
use thiserror::Error;

use stockledger_core::{ProductId, WarehouseId};
use stockledger_inventory::{
    Direction, InventoryBalance, MovementDraft, Precondition, PreconditionViolation, StockMovement,
};
use std::sync::Arc;

/// Movements to append as one all-or-nothing unit, plus the guards that must
/// hold at the moment of writing.
///
/// A single append is a batch of one with no preconditions. A transfer is a
/// batch of two (OUT then IN) guarded by stock and capacity preconditions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MovementBatch {
    pub drafts: Vec<MovementDraft>,
    pub preconditions: Vec<Precondition>,
}

impl MovementBatch {
    pub fn single(draft: MovementDraft) -> Self {
        Self {
            drafts: vec![draft],
            preconditions: Vec::new(),
        }
    }

    pub fn guarded(drafts: Vec<MovementDraft>, preconditions: Vec<Precondition>) -> Self {
        Self {
            drafts,
            preconditions,
        }
    }
}

/// Query over the ledger. Empty fields match everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementFilter {
    pub product_id: Option<ProductId>,
    pub warehouse_id: Option<WarehouseId>,
    pub direction: Option<Direction>,
}

impl MovementFilter {
    pub fn product(product_id: ProductId) -> Self {
        Self {
            product_id: Some(product_id),
            ..Self::default()
        }
    }

    pub fn warehouse(warehouse_id: WarehouseId) -> Self {
        Self {
            warehouse_id: Some(warehouse_id),
            ..Self::default()
        }
    }

    pub fn matches(&self, movement: &StockMovement) -> bool {
        self.product_id.is_none_or(|p| p == movement.product_id)
            && self.warehouse_id.is_none_or(|w| w == movement.warehouse_id)
            && self.direction.is_none_or(|d| d == movement.direction)
    }
}

/// Ledger store operation error.
///
/// These are **infrastructure** outcomes. The service maps them onto the
/// ledger's error taxonomy.
#[derive(Debug, Error)]
pub enum LedgerStoreError {
    /// A draft was structurally invalid; nothing was written.
    #[error("invalid movement: {0}")]
    InvalidMovement(String),

    /// A batch precondition did not hold at commit time; nothing was written.
    #[error("precondition failed: {0}")]
    PreconditionFailed(PreconditionViolation),

    /// A concurrent writer conflicted with this commit (serialization failure,
    /// deadlock). Nothing was written; the caller may retry.
    #[error("write conflict: {0}")]
    Concurrency(String),

    /// Any other storage failure. The commit was rolled back.
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl LedgerStoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerStoreError::Concurrency(_))
    }
}

/// Append-only movement ledger with its balance projection.
///
/// ## Commit semantics
///
/// `commit()`:
/// - validates every draft structurally
/// - evaluates the batch preconditions against the current projection, inside
///   the same critical section / transaction as the write
/// - assigns ids and a ledger-wide monotonically increasing `sequence`
/// - appends the movements and applies each one to the balance projection
///
/// Either all of that happens or none of it does. Balances are never written
/// except as the direct consequence of an appended movement.
///
/// ## Reads
///
/// Missing balance rows read as zero. Movement reads are ordered by
/// `(occurred_at, sequence)`.
pub trait LedgerStore: Send + Sync {
    /// Append a batch of movements atomically.
    fn commit(&self, batch: MovementBatch) -> Result<Vec<StockMovement>, LedgerStoreError>;

    fn balance(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> Result<i64, LedgerStoreError>;

    fn balances_for_warehouse(
        &self,
        warehouse_id: WarehouseId,
    ) -> Result<Vec<InventoryBalance>, LedgerStoreError>;

    fn balances_for_product(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<InventoryBalance>, LedgerStoreError>;

    /// Σ balance quantities across all products held in a warehouse.
    fn used_capacity(&self, warehouse_id: WarehouseId) -> Result<i64, LedgerStoreError>;

    fn movements(&self, filter: MovementFilter) -> Result<Vec<StockMovement>, LedgerStoreError>;

    /// All movements of a product across every warehouse (valuation input).
    fn movements_for_product(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<StockMovement>, LedgerStoreError> {
        self.movements(MovementFilter::product(product_id))
    }

    fn has_movements(&self, product_id: ProductId) -> Result<bool, LedgerStoreError>;
}

impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    fn commit(&self, batch: MovementBatch) -> Result<Vec<StockMovement>, LedgerStoreError> {
        (**self).commit(batch)
    }

    fn balance(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> Result<i64, LedgerStoreError> {
        (**self).balance(product_id, warehouse_id)
    }

    fn balances_for_warehouse(
        &self,
        warehouse_id: WarehouseId,
    ) -> Result<Vec<InventoryBalance>, LedgerStoreError> {
        (**self).balances_for_warehouse(warehouse_id)
    }

    fn balances_for_product(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<InventoryBalance>, LedgerStoreError> {
        (**self).balances_for_product(product_id)
    }

    fn used_capacity(&self, warehouse_id: WarehouseId) -> Result<i64, LedgerStoreError> {
        (**self).used_capacity(warehouse_id)
    }

    fn movements(&self, filter: MovementFilter) -> Result<Vec<StockMovement>, LedgerStoreError> {
        (**self).movements(filter)
    }

    fn has_movements(&self, product_id: ProductId) -> Result<bool, LedgerStoreError> {
        (**self).has_movements(product_id)
    }
}
