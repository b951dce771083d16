//! Guards evaluated atomically with a ledger commit.
//!
//! A transfer checks stock and capacity up front to produce a friendly error,
//! but that read can go stale before the write. The store therefore re-checks
//! each precondition inside the same lock/transaction that appends the
//! movements, so two concurrent transfers cannot both draw on the same units.

use serde::{Deserialize, Serialize};

use stockledger_core::{ProductId, WarehouseId};

use crate::capacity::available_capacity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Precondition {
    /// The (product, warehouse) balance must be at least `required`.
    MinimumBalance {
        product_id: ProductId,
        warehouse_id: WarehouseId,
        required: i64,
    },
    /// The warehouse must have room for `required` more units.
    AvailableCapacity {
        warehouse_id: WarehouseId,
        capacity: i64,
        required: i64,
    },
}

/// Why a precondition did not hold, with the values observed under lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PreconditionViolation {
    InsufficientStock {
        product_id: ProductId,
        warehouse_id: WarehouseId,
        available: i64,
        requested: i64,
    },
    InsufficientCapacity {
        warehouse_id: WarehouseId,
        available: i64,
        requested: i64,
    },
}

impl core::fmt::Display for PreconditionViolation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            PreconditionViolation::InsufficientStock {
                available,
                requested,
                ..
            } => write!(f, "insufficient stock (available {available}, requested {requested})"),
            PreconditionViolation::InsufficientCapacity {
                available,
                requested,
                ..
            } => write!(
                f,
                "insufficient capacity (available {available}, requested {requested})"
            ),
        }
    }
}

impl Precondition {
    pub fn warehouse_id(&self) -> WarehouseId {
        match self {
            Precondition::MinimumBalance { warehouse_id, .. }
            | Precondition::AvailableCapacity { warehouse_id, .. } => *warehouse_id,
        }
    }

    /// Check against an observed value: the current balance for
    /// `MinimumBalance`, the warehouse's used capacity for `AvailableCapacity`.
    pub fn verify(&self, observed: i64) -> Result<(), PreconditionViolation> {
        match *self {
            Precondition::MinimumBalance {
                product_id,
                warehouse_id,
                required,
            } => {
                if observed < required {
                    return Err(PreconditionViolation::InsufficientStock {
                        product_id,
                        warehouse_id,
                        available: observed,
                        requested: required,
                    });
                }
                Ok(())
            }
            Precondition::AvailableCapacity {
                warehouse_id,
                capacity,
                required,
            } => {
                let available = available_capacity(Some(capacity), observed).unwrap_or(capacity);
                if available < required {
                    return Err(PreconditionViolation::InsufficientCapacity {
                        warehouse_id,
                        available,
                        requested: required,
                    });
                }
                Ok(())
            }
        }
    }
}
