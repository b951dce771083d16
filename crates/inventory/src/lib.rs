//! Inventory ledger domain.
//!
//! Business rules for the stock-movement ledger, implemented purely as
//! deterministic domain logic (no IO, no storage):
//!
//! - [`movement`]: the immutable movement fact and its draft form
//! - [`balance`]: the (product, warehouse) balance projection
//! - [`valuation`]: FIFO / LIFO / weighted-average valuation
//! - [`capacity`]: warehouse capacity accounting
//! - [`transfer`]: staged validation of warehouse-to-warehouse transfers
//! - [`precondition`]: guards a store re-checks atomically with a commit

pub mod balance;
pub mod capacity;
pub mod catalog;
pub mod error;
pub mod movement;
pub mod precondition;
pub mod transfer;
pub mod valuation;

pub use balance::{BalanceKey, BalanceProjection, InventoryBalance};
pub use capacity::{CapacityReport, available_capacity};
pub use catalog::{Product, Warehouse};
pub use error::{InventoryError, InventoryResult};
pub use movement::{Direction, MovementDraft, MovementSummary, StockMovement, sort_chronologically};
pub use precondition::{Precondition, PreconditionViolation};
pub use transfer::{
    TransferPlan, TransferReads, TransferRequest, TransferResult, TransferStage, plan_transfer,
};
pub use valuation::ValuationStrategy;
