//! Ledger service (application-level orchestration).
//!
//! `InventoryService` is the surface the calling service layer talks to. It
//! composes a [`LedgerStore`] with the two catalog lookups and owns the only
//! multi-step write in the system: the warehouse-to-warehouse transfer.
//!
//! ## Transfer Execution Flow
//!
//! ```text
//! TransferRequest
//!   ↓
//! 1. Plan: look up warehouses + product, check stock, check capacity
//!   ↓
//! 2. Commit: append OUT + IN as one batch, guarded by the same checks
//!   ↓
//! 3. Committed: summarize both movements
//! ```
//!
//! The planning checks give callers precise rejections without touching the
//! store's write path. The store re-verifies the same guards inside its
//! critical section, so two transfers draining the same balance can never both
//! commit on stale reads.
//!
//! ## Error Semantics
//!
//! - Business rejections (`InsufficientStock`, `InsufficientCapacity`,
//!   `InactiveDestination`, `SelfTransfer`) are never retried.
//! - Store write conflicts are retried up to `commit_retries` times; after that
//!   a transfer fails with `TransferFailed`.
//! - Any other commit failure during a transfer is `TransferFailed`. The store
//!   rolled back, so the ledger is exactly as it was.
//!
//! This module contains no IO itself; it composes infrastructure traits.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use stockledger_core::{ActorId, DomainError, Money, ProductId, WarehouseId};
use stockledger_inventory::{
    CapacityReport, InventoryBalance, InventoryError, InventoryResult, MovementDraft, Product,
    StockMovement, TransferReads, TransferRequest, TransferResult, TransferStage,
    ValuationStrategy, Warehouse, plan_transfer,
};

use crate::catalog::{ProductCatalog, WarehouseDirectory};
use crate::config::LedgerConfig;
use crate::ledger_store::{LedgerStore, LedgerStoreError, MovementBatch, MovementFilter};

/// Behavioural switches taken from [`LedgerConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceSettings {
    pub allow_self_transfer: bool,
    pub commit_retries: u32,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self::from(&LedgerConfig::default())
    }
}

impl From<&LedgerConfig> for ServiceSettings {
    fn from(config: &LedgerConfig) -> Self {
        Self {
            allow_self_transfer: config.allow_self_transfer,
            commit_retries: config.commit_retries,
        }
    }
}

/// Per-warehouse balances of one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductStock {
    pub product_id: ProductId,
    pub balances: Vec<InventoryBalance>,
    pub total: i64,
}

/// A product at or below its minimum stock level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowStockItem {
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub quantity: i64,
    pub min_stock_level: i64,
}

/// Stock ledger operations over a store and its catalog collaborators.
///
/// ## Generic Parameters
///
/// - `L`: ledger store (`InMemoryLedgerStore`, `PostgresLedgerStore`, or an `Arc` of either)
/// - `P`: product lookup
/// - `W`: warehouse lookup
#[derive(Debug)]
pub struct InventoryService<L, P, W> {
    ledger: L,
    products: P,
    warehouses: W,
    settings: ServiceSettings,
}

impl<L, P, W> InventoryService<L, P, W> {
    pub fn new(ledger: L, products: P, warehouses: W) -> Self {
        Self::with_settings(ledger, products, warehouses, ServiceSettings::default())
    }

    pub fn with_settings(ledger: L, products: P, warehouses: W, settings: ServiceSettings) -> Self {
        Self {
            ledger,
            products,
            warehouses,
            settings,
        }
    }

    pub fn settings(&self) -> ServiceSettings {
        self.settings
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }
}

impl<L, P, W> InventoryService<L, P, W>
where
    L: LedgerStore,
    P: ProductCatalog,
    W: WarehouseDirectory,
{
    /// Append an IN movement.
    ///
    /// `unit_cost = None` records the receipt without making it part of any
    /// valuation.
    #[instrument(
        skip_all,
        fields(product_id = %product_id, warehouse_id = %warehouse_id, quantity = quantity, actor_id = %actor_id),
        err
    )]
    pub fn record_incoming(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        quantity: i64,
        unit_cost: Option<Decimal>,
        description: impl Into<String>,
        actor_id: ActorId,
    ) -> InventoryResult<StockMovement> {
        self.record(MovementDraft::incoming(
            product_id,
            warehouse_id,
            quantity,
            unit_cost,
            description,
            actor_id,
        ))
    }

    /// Append an OUT movement.
    ///
    /// The ledger does not stock-check a plain outgoing movement; only
    /// transfers are guarded.
    #[instrument(
        skip_all,
        fields(product_id = %product_id, warehouse_id = %warehouse_id, quantity = quantity, actor_id = %actor_id),
        err
    )]
    pub fn record_outgoing(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        quantity: i64,
        description: impl Into<String>,
        actor_id: ActorId,
    ) -> InventoryResult<StockMovement> {
        self.record(MovementDraft::outgoing(
            product_id,
            warehouse_id,
            quantity,
            description,
            actor_id,
        ))
    }

    /// Append a prepared draft (use [`MovementDraft::at`] to set business time).
    #[instrument(
        skip_all,
        fields(product_id = %draft.product_id, warehouse_id = %draft.warehouse_id, direction = %draft.direction),
        err
    )]
    pub fn record(&self, draft: MovementDraft) -> InventoryResult<StockMovement> {
        draft.validate()?;
        self.require_product(draft.product_id)?;
        self.require_warehouse(draft.warehouse_id)?;

        let committed = self
            .ledger
            .commit(MovementBatch::single(draft))
            .map_err(storage_error)?;
        let movement = committed
            .into_iter()
            .next()
            .ok_or_else(|| InventoryError::Storage("commit returned no movement".to_string()))?;

        info!(
            movement_id = %movement.id,
            sequence = movement.sequence,
            direction = %movement.direction,
            quantity = movement.quantity,
            "movement recorded"
        );
        Ok(movement)
    }

    /// Move stock between warehouses as one OUT + IN pair.
    #[instrument(
        skip_all,
        fields(
            product_id = %request.product_id,
            source = %request.source_warehouse_id,
            destination = %request.destination_warehouse_id,
            quantity = request.quantity,
            actor_id = %request.actor_id
        ),
        err
    )]
    pub fn transfer(&self, request: TransferRequest) -> InventoryResult<TransferResult> {
        let reads = ServiceReads { service: self };
        let plan = plan_transfer(&request, &reads, self.settings.allow_self_transfer)
            .inspect_err(|err| {
                let stage = TransferStage::of_failure(err).as_str();
                if err.is_business_rejection() {
                    info!(stage, error = %err, "transfer rejected");
                } else {
                    debug!(stage, error = %err, "transfer invalid");
                }
            })?;

        let batch = MovementBatch::guarded(plan.drafts(), plan.preconditions.clone());
        let mut attempt = 0u32;
        let committed = loop {
            debug!(stage = TransferStage::Committing.as_str(), attempt, "committing transfer");
            match self.ledger.commit(batch.clone()) {
                Ok(committed) => break committed,
                Err(err) if err.is_retryable() && attempt < self.settings.commit_retries => {
                    attempt += 1;
                    warn!(error = %err, attempt, "transfer commit conflicted; retrying");
                }
                Err(err) => return Err(transfer_commit_error(err)),
            }
        };

        let result = TransferResult::from_committed(&request, &committed)?;
        info!(
            stage = TransferStage::Committed.as_str(),
            outgoing_id = %result.outgoing.id,
            incoming_id = %result.incoming.id,
            "transfer committed"
        );
        Ok(result)
    }

    /// Current quantity of a product in a warehouse. A pair that never moved reads as 0.
    pub fn current_balance(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> InventoryResult<i64> {
        self.ledger
            .balance(product_id, warehouse_id)
            .map_err(storage_error)
    }

    /// Value a product's remaining stock under the strategy named by `strategy_tag`.
    ///
    /// The tag is resolved before anything else is looked up.
    #[instrument(skip(self), fields(product_id = %product_id), err)]
    pub fn valuate(&self, product_id: ProductId, strategy_tag: &str) -> InventoryResult<Money> {
        let strategy: ValuationStrategy = strategy_tag.parse()?;
        self.require_product(product_id)?;
        self.valuate_with(product_id, strategy)
    }

    /// Value a product under its configured strategy.
    #[instrument(skip(self), fields(product_id = %product_id), err)]
    pub fn valuate_product(&self, product_id: ProductId) -> InventoryResult<Money> {
        let product = self.require_product(product_id)?;
        self.valuate_with(product_id, product.valuation_strategy)
    }

    /// Sum of every catalog product's valuation under its own strategy.
    #[instrument(skip(self), err)]
    pub fn total_valuation(&self) -> InventoryResult<Money> {
        let mut total = Money::zero();
        for product in self.products.products() {
            let value = self.valuate_with(product.id, product.valuation_strategy)?;
            total = total.checked_add(value).ok_or_else(|| {
                InventoryError::ValuationOverflow("total valuation".to_string())
            })?;
        }
        Ok(total)
    }

    #[instrument(skip(self), fields(warehouse_id = %warehouse_id), err)]
    pub fn capacity_report(&self, warehouse_id: WarehouseId) -> InventoryResult<CapacityReport> {
        let warehouse = self.require_warehouse(warehouse_id)?;
        let used = self
            .ledger
            .used_capacity(warehouse_id)
            .map_err(storage_error)?;
        Ok(CapacityReport::new(warehouse_id, warehouse.capacity, used))
    }

    /// Movements matching `filter`, oldest first.
    pub fn movement_history(&self, filter: MovementFilter) -> InventoryResult<Vec<StockMovement>> {
        self.ledger.movements(filter).map_err(storage_error)
    }

    pub fn product_stock(&self, product_id: ProductId) -> InventoryResult<ProductStock> {
        self.require_product(product_id)?;
        let balances = self
            .ledger
            .balances_for_product(product_id)
            .map_err(storage_error)?;
        let total = balances.iter().map(|b| b.quantity).sum();
        Ok(ProductStock {
            product_id,
            balances,
            total,
        })
    }

    pub fn warehouse_stock(&self, warehouse_id: WarehouseId) -> InventoryResult<Vec<InventoryBalance>> {
        self.require_warehouse(warehouse_id)?;
        self.ledger
            .balances_for_warehouse(warehouse_id)
            .map_err(storage_error)
    }

    /// Products whose total stock across warehouses is at or below their minimum level.
    #[instrument(skip(self), err)]
    pub fn low_stock(&self) -> InventoryResult<Vec<LowStockItem>> {
        let mut items = Vec::new();
        for product in self.products.products() {
            let quantity: i64 = self
                .ledger
                .balances_for_product(product.id)
                .map_err(storage_error)?
                .iter()
                .map(|b| b.quantity)
                .sum();
            if quantity <= product.min_stock_level {
                items.push(LowStockItem {
                    product_id: product.id,
                    sku: product.sku,
                    name: product.name,
                    quantity,
                    min_stock_level: product.min_stock_level,
                });
            }
        }
        debug!(count = items.len(), "low stock computed");
        Ok(items)
    }

    /// A product may leave the catalog only while no movement references it.
    pub fn ensure_product_removable(&self, product_id: ProductId) -> InventoryResult<()> {
        self.require_product(product_id)?;
        if self
            .ledger
            .has_movements(product_id)
            .map_err(storage_error)?
        {
            return Err(DomainError::conflict(format!(
                "product {product_id} has stock movements and cannot be removed"
            ))
            .into());
        }
        Ok(())
    }

    /// A warehouse may be removed only once every balance in it is zero.
    pub fn ensure_warehouse_removable(&self, warehouse_id: WarehouseId) -> InventoryResult<()> {
        self.require_warehouse(warehouse_id)?;
        let held = self
            .ledger
            .balances_for_warehouse(warehouse_id)
            .map_err(storage_error)?
            .into_iter()
            .filter(|b| b.quantity != 0)
            .count();
        if held > 0 {
            return Err(DomainError::conflict(format!(
                "warehouse {warehouse_id} still holds stock for {held} product(s)"
            ))
            .into());
        }
        Ok(())
    }

    fn valuate_with(
        &self,
        product_id: ProductId,
        strategy: ValuationStrategy,
    ) -> InventoryResult<Money> {
        let movements = self
            .ledger
            .movements_for_product(product_id)
            .map_err(storage_error)?;
        let value = strategy.calculate(&movements)?;
        debug!(strategy = strategy.tag(), movements = movements.len(), value = %value, "valuated");
        Ok(value)
    }

    fn require_product(&self, id: ProductId) -> InventoryResult<Product> {
        self.products
            .product(id)
            .ok_or_else(|| InventoryError::product_not_found(id))
    }

    fn require_warehouse(&self, id: WarehouseId) -> InventoryResult<Warehouse> {
        self.warehouses
            .warehouse(id)
            .ok_or_else(|| InventoryError::warehouse_not_found(id))
    }
}

struct ServiceReads<'a, L, P, W> {
    service: &'a InventoryService<L, P, W>,
}

impl<L, P, W> TransferReads for ServiceReads<'_, L, P, W>
where
    L: LedgerStore,
    P: ProductCatalog,
    W: WarehouseDirectory,
{
    fn product(&self, id: ProductId) -> InventoryResult<Option<Product>> {
        Ok(self.service.products.product(id))
    }

    fn warehouse(&self, id: WarehouseId) -> InventoryResult<Option<Warehouse>> {
        Ok(self.service.warehouses.warehouse(id))
    }

    fn balance(&self, product_id: ProductId, warehouse_id: WarehouseId) -> InventoryResult<i64> {
        self.service.current_balance(product_id, warehouse_id)
    }

    fn used_capacity(&self, warehouse_id: WarehouseId) -> InventoryResult<i64> {
        self.service
            .ledger
            .used_capacity(warehouse_id)
            .map_err(storage_error)
    }
}

fn storage_error(err: LedgerStoreError) -> InventoryError {
    match err {
        LedgerStoreError::InvalidMovement(msg) => InventoryError::InvalidMovement(msg),
        LedgerStoreError::PreconditionFailed(violation) => violation.into(),
        other => InventoryError::Storage(other.to_string()),
    }
}

fn transfer_commit_error(err: LedgerStoreError) -> InventoryError {
    match err {
        // Lost the race between planning and commit.
        LedgerStoreError::PreconditionFailed(violation) => violation.into(),
        other => InventoryError::TransferFailed(other.to_string()),
    }
}
