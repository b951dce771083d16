//! Warehouse-to-warehouse transfers.
//!
//! A transfer is not stored; it is a paired OUT (source) + IN (destination)
//! committed as one unit. Planning walks the stages in order and stops at the
//! first failure, before anything is written:
//!
//! ```text
//! Validating → CheckingStock → CheckingCapacity → Committing → Committed
//! ```
//!
//! The plan carries [`Precondition`]s so the store can re-check stock and
//! capacity atomically with the write.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{ActorId, ProductId, WarehouseId};

use crate::capacity::available_capacity;
use crate::catalog::{Product, Warehouse};
use crate::error::{InventoryError, InventoryResult};
use crate::movement::{Direction, MovementDraft, MovementSummary, StockMovement};
use crate::precondition::Precondition;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub product_id: ProductId,
    pub source_warehouse_id: WarehouseId,
    pub destination_warehouse_id: WarehouseId,
    pub quantity: i64,
    /// Free-text note, embedded in both movement descriptions.
    pub description: String,
    pub actor_id: ActorId,
    pub occurred_at: Option<DateTime<Utc>>,
}

impl TransferRequest {
    pub fn new(
        product_id: ProductId,
        source_warehouse_id: WarehouseId,
        destination_warehouse_id: WarehouseId,
        quantity: i64,
        description: impl Into<String>,
        actor_id: ActorId,
    ) -> Self {
        Self {
            product_id,
            source_warehouse_id,
            destination_warehouse_id,
            quantity,
            description: description.into(),
            actor_id,
            occurred_at: None,
        }
    }

    pub fn is_self_transfer(&self) -> bool {
        self.source_warehouse_id == self.destination_warehouse_id
    }
}

/// Stages of the transfer state machine. Only `Committed` is externally
/// observable; the rest are used for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferStage {
    Validating,
    CheckingStock,
    CheckingCapacity,
    Committing,
    Committed,
}

impl TransferStage {
    /// Stage at which a given rejection happens.
    pub fn of_failure(err: &InventoryError) -> Self {
        match err {
            InventoryError::InsufficientStock { .. } => TransferStage::CheckingStock,
            InventoryError::InsufficientCapacity { .. } => TransferStage::CheckingCapacity,
            InventoryError::TransferFailed(_) | InventoryError::Storage(_) => {
                TransferStage::Committing
            }
            _ => TransferStage::Validating,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStage::Validating => "validating",
            TransferStage::CheckingStock => "checking_stock",
            TransferStage::CheckingCapacity => "checking_capacity",
            TransferStage::Committing => "committing",
            TransferStage::Committed => "committed",
        }
    }
}

/// Reads a transfer needs from catalog + projection.
pub trait TransferReads {
    fn product(&self, id: ProductId) -> InventoryResult<Option<Product>>;
    fn warehouse(&self, id: WarehouseId) -> InventoryResult<Option<Warehouse>>;
    fn balance(&self, product_id: ProductId, warehouse_id: WarehouseId) -> InventoryResult<i64>;
    fn used_capacity(&self, warehouse_id: WarehouseId) -> InventoryResult<i64>;
}

/// A validated transfer, ready to be committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferPlan {
    pub request: TransferRequest,
    pub outgoing: MovementDraft,
    pub incoming: MovementDraft,
    pub preconditions: Vec<Precondition>,
}

impl TransferPlan {
    /// Drafts in commit order: OUT first, then IN.
    pub fn drafts(&self) -> Vec<MovementDraft> {
        vec![self.outgoing.clone(), self.incoming.clone()]
    }
}

/// Run the validation stages and build the paired drafts.
///
/// Self-transfers are rejected unless `allow_self_transfer` is set; when
/// allowed they skip the capacity check since the warehouse's held quantity
/// does not change.
pub fn plan_transfer<R: TransferReads + ?Sized>(
    request: &TransferRequest,
    reads: &R,
    allow_self_transfer: bool,
) -> InventoryResult<TransferPlan> {
    // Validating
    if request.quantity <= 0 {
        return Err(InventoryError::invalid_movement(format!(
            "transfer quantity must be positive (got {})",
            request.quantity
        )));
    }
    let source = reads
        .warehouse(request.source_warehouse_id)?
        .ok_or_else(|| InventoryError::warehouse_not_found(request.source_warehouse_id))?;
    let destination = reads
        .warehouse(request.destination_warehouse_id)?
        .ok_or_else(|| InventoryError::warehouse_not_found(request.destination_warehouse_id))?;
    reads
        .product(request.product_id)?
        .ok_or_else(|| InventoryError::product_not_found(request.product_id))?;

    let self_transfer = request.is_self_transfer();
    if self_transfer && !allow_self_transfer {
        return Err(InventoryError::SelfTransfer {
            warehouse_id: source.id,
        });
    }
    if !destination.is_active {
        return Err(InventoryError::InactiveDestination {
            warehouse_id: destination.id,
        });
    }

    // CheckingStock
    let mut preconditions = Vec::with_capacity(2);
    let stock_guard = Precondition::MinimumBalance {
        product_id: request.product_id,
        warehouse_id: source.id,
        required: request.quantity,
    };
    stock_guard.verify(reads.balance(request.product_id, source.id)?)?;
    preconditions.push(stock_guard);

    // CheckingCapacity
    if let (Some(capacity), false) = (destination.capacity, self_transfer) {
        let used = reads.used_capacity(destination.id)?;
        let available = available_capacity(Some(capacity), used).unwrap_or(capacity);
        if available < request.quantity {
            return Err(InventoryError::InsufficientCapacity {
                warehouse_id: destination.id,
                available,
                requested: request.quantity,
            });
        }
        preconditions.push(Precondition::AvailableCapacity {
            warehouse_id: destination.id,
            capacity,
            required: request.quantity,
        });
    }

    let (out_description, in_description) =
        paired_descriptions(&source, &destination, &request.description);

    let outgoing = MovementDraft {
        product_id: request.product_id,
        warehouse_id: source.id,
        direction: Direction::Out,
        quantity: request.quantity,
        unit_cost: None,
        description: out_description,
        actor_id: request.actor_id,
        occurred_at: request.occurred_at,
    };
    let incoming = MovementDraft {
        product_id: request.product_id,
        warehouse_id: destination.id,
        direction: Direction::In,
        quantity: request.quantity,
        unit_cost: None,
        description: in_description,
        actor_id: request.actor_id,
        occurred_at: request.occurred_at,
    };

    Ok(TransferPlan {
        request: request.clone(),
        outgoing,
        incoming,
        preconditions,
    })
}

fn paired_descriptions(source: &Warehouse, destination: &Warehouse, note: &str) -> (String, String) {
    let note = note.trim();
    if note.is_empty() {
        (
            format!("Transfer to {}", destination.name),
            format!("Transfer from {}", source.name),
        )
    } else {
        (
            format!("Transfer to {}: {note}", destination.name),
            format!("Transfer from {}: {note}", source.name),
        )
    }
}

/// Outcome of a committed transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferResult {
    pub product_id: ProductId,
    pub source_warehouse_id: WarehouseId,
    pub destination_warehouse_id: WarehouseId,
    pub quantity: i64,
    pub outgoing: MovementSummary,
    pub incoming: MovementSummary,
}

impl TransferResult {
    /// Build from the committed movements (OUT first, IN second).
    pub fn from_committed(
        request: &TransferRequest,
        committed: &[StockMovement],
    ) -> InventoryResult<Self> {
        let outgoing = committed
            .iter()
            .find(|m| m.direction == Direction::Out)
            .ok_or_else(|| InventoryError::TransferFailed("no outgoing movement committed".into()))?;
        let incoming = committed
            .iter()
            .find(|m| m.direction == Direction::In)
            .ok_or_else(|| InventoryError::TransferFailed("no incoming movement committed".into()))?;

        Ok(Self {
            product_id: request.product_id,
            source_warehouse_id: request.source_warehouse_id,
            destination_warehouse_id: request.destination_warehouse_id,
            quantity: request.quantity,
            outgoing: outgoing.summary(),
            incoming: incoming.summary(),
        })
    }
}
