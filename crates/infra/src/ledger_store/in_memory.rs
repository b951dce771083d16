use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;

use stockledger_core::{MovementId, ProductId, WarehouseId};
use stockledger_inventory::{
    BalanceKey, BalanceProjection, InventoryBalance, Precondition, StockMovement,
    sort_chronologically,
};

use super::r#trait::{LedgerStore, LedgerStoreError, MovementBatch, MovementFilter};

#[derive(Debug, Default)]
struct LedgerState {
    movements: Vec<StockMovement>,
    projection: BalanceProjection,
    last_sequence: u64,
}

/// In-memory append-only ledger.
///
/// Intended for tests/dev. One lock guards both the movement log and the
/// projection: a commit holds the write lock from precondition check to the
/// last projection update, so concurrent commits are serialized and readers
/// never see half a batch.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    state: RwLock<LedgerState>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of movements ever appended.
    pub fn len(&self) -> usize {
        self.state.read().map(|s| s.movements.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn poisoned() -> LedgerStoreError {
        LedgerStoreError::Backend("lock poisoned".to_string())
    }
}

fn observed_for(projection: &BalanceProjection, guard: &Precondition) -> i64 {
    match *guard {
        Precondition::MinimumBalance {
            product_id,
            warehouse_id,
            ..
        } => projection.quantity(product_id, warehouse_id),
        Precondition::AvailableCapacity { warehouse_id, .. } => {
            projection.used_capacity(warehouse_id)
        }
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn commit(&self, batch: MovementBatch) -> Result<Vec<StockMovement>, LedgerStoreError> {
        if batch.drafts.is_empty() {
            return Ok(vec![]);
        }

        for draft in &batch.drafts {
            draft
                .validate()
                .map_err(|e| LedgerStoreError::InvalidMovement(e.to_string()))?;
        }

        let mut state = self.state.write().map_err(|_| Self::poisoned())?;

        for guard in &batch.preconditions {
            guard
                .verify(observed_for(&state.projection, guard))
                .map_err(LedgerStoreError::PreconditionFailed)?;
        }

        // Stage: build movements and the balance rows they touch without
        // modifying shared state. Any failure here leaves the ledger untouched.
        let committed_at = Utc::now();
        let mut next = state.last_sequence;
        let mut staged_rows: HashMap<BalanceKey, InventoryBalance> = HashMap::new();
        let mut committed = Vec::with_capacity(batch.drafts.len());

        for draft in batch.drafts {
            next += 1;
            let movement = draft.into_movement(MovementId::new(), next, committed_at);
            let key = BalanceKey::of(&movement);
            let row = staged_rows.entry(key).or_insert_with(|| {
                state
                    .projection
                    .get(&key)
                    .cloned()
                    .unwrap_or_else(|| InventoryBalance::zero(key))
            });
            row.apply(&movement)
                .map_err(|e| LedgerStoreError::Backend(e.to_string()))?;
            committed.push(movement);
        }

        // Publish: infallible from here on.
        for row in staged_rows.into_values() {
            state.projection.put(row);
        }
        state.movements.extend(committed.iter().cloned());
        state.last_sequence = next;

        Ok(committed)
    }

    fn balance(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> Result<i64, LedgerStoreError> {
        let state = self.state.read().map_err(|_| Self::poisoned())?;
        Ok(state.projection.quantity(product_id, warehouse_id))
    }

    fn balances_for_warehouse(
        &self,
        warehouse_id: WarehouseId,
    ) -> Result<Vec<InventoryBalance>, LedgerStoreError> {
        let state = self.state.read().map_err(|_| Self::poisoned())?;
        Ok(state.projection.for_warehouse(warehouse_id))
    }

    fn balances_for_product(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<InventoryBalance>, LedgerStoreError> {
        let state = self.state.read().map_err(|_| Self::poisoned())?;
        Ok(state.projection.for_product(product_id))
    }

    fn used_capacity(&self, warehouse_id: WarehouseId) -> Result<i64, LedgerStoreError> {
        let state = self.state.read().map_err(|_| Self::poisoned())?;
        Ok(state.projection.used_capacity(warehouse_id))
    }

    fn movements(&self, filter: MovementFilter) -> Result<Vec<StockMovement>, LedgerStoreError> {
        let state = self.state.read().map_err(|_| Self::poisoned())?;
        let mut out: Vec<StockMovement> = state
            .movements
            .iter()
            .filter(|m| filter.matches(m))
            .cloned()
            .collect();
        sort_chronologically(&mut out);
        Ok(out)
    }

    fn has_movements(&self, product_id: ProductId) -> Result<bool, LedgerStoreError> {
        let state = self.state.read().map_err(|_| Self::poisoned())?;
        Ok(state.movements.iter().any(|m| m.product_id == product_id))
    }
}
