//! Ledger error taxonomy.

use thiserror::Error;

use stockledger_core::{DomainError, Entity, ProductId, WarehouseId};

use crate::catalog::{Product, Warehouse};
use crate::precondition::PreconditionViolation;

pub type InventoryResult<T> = Result<T, InventoryError>;

/// Errors surfaced by ledger operations.
///
/// Every business rejection carries the data a caller needs to render an
/// actionable message (which entity, how much was available, how much was asked
/// for). None of these are retried by the ledger itself.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InventoryError {
    /// Structurally invalid movement (non-positive quantity, negative cost, ...).
    #[error("invalid movement: {0}")]
    InvalidMovement(String),

    #[error(
        "insufficient stock of product {product_id} in warehouse {warehouse_id}: available {available}, requested {requested}"
    )]
    InsufficientStock {
        product_id: ProductId,
        warehouse_id: WarehouseId,
        available: i64,
        requested: i64,
    },

    #[error(
        "insufficient capacity in warehouse {warehouse_id}: available {available}, requested {requested}"
    )]
    InsufficientCapacity {
        warehouse_id: WarehouseId,
        available: i64,
        requested: i64,
    },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("destination warehouse {warehouse_id} is inactive")]
    InactiveDestination { warehouse_id: WarehouseId },

    #[error("source and destination are the same warehouse ({warehouse_id})")]
    SelfTransfer { warehouse_id: WarehouseId },

    /// Configuration/programming error: fail fast, never default silently.
    #[error("unknown valuation strategy '{0}' (expected fifo, lifo or avg)")]
    UnknownValuationStrategy(String),

    /// The value of held stock does not fit the decimal range.
    #[error("{0} overflowed the decimal range")]
    ValuationOverflow(String),

    /// The atomic commit of a transfer failed and was rolled back.
    #[error("transfer failed and was rolled back: {0}")]
    TransferFailed(String),

    /// A storage failure outside of a transfer commit.
    #[error("storage failure: {0}")]
    Storage(String),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl InventoryError {
    pub fn invalid_movement(msg: impl Into<String>) -> Self {
        Self::InvalidMovement(msg.into())
    }

    pub fn not_found<E: Entity>(id: E::Id) -> Self {
        Self::NotFound {
            entity: E::KIND,
            id: id.to_string(),
        }
    }

    pub fn product_not_found(id: ProductId) -> Self {
        Self::not_found::<Product>(id)
    }

    pub fn warehouse_not_found(id: WarehouseId) -> Self {
        Self::not_found::<Warehouse>(id)
    }

    /// True for rejections caused by business rules rather than bad input or
    /// infrastructure.
    pub fn is_business_rejection(&self) -> bool {
        matches!(
            self,
            Self::InsufficientStock { .. }
                | Self::InsufficientCapacity { .. }
                | Self::InactiveDestination { .. }
                | Self::SelfTransfer { .. }
        )
    }
}

impl From<PreconditionViolation> for InventoryError {
    fn from(value: PreconditionViolation) -> Self {
        match value {
            PreconditionViolation::InsufficientStock {
                product_id,
                warehouse_id,
                available,
                requested,
            } => Self::InsufficientStock {
                product_id,
                warehouse_id,
                available,
                requested,
            },
            PreconditionViolation::InsufficientCapacity {
                warehouse_id,
                available,
                requested,
            } => Self::InsufficientCapacity {
                warehouse_id,
                available,
                requested,
            },
        }
    }
}
