//! Warehouse capacity accounting.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockledger_core::WarehouseId;

/// Remaining room in a warehouse.
///
/// `None` means unlimited (no capacity configured). Never negative, even if
/// historical data left the warehouse over capacity.
pub fn available_capacity(capacity: Option<i64>, used: i64) -> Option<i64> {
    capacity.map(|total| total.saturating_sub(used).max(0))
}

/// Capacity summary for one warehouse. Fields derived from the configured
/// capacity are `None` when the warehouse is unlimited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityReport {
    pub warehouse_id: WarehouseId,
    pub total: Option<i64>,
    pub used: i64,
    pub available: Option<i64>,
    /// `used / total × 100`, rounded to two decimal places.
    pub utilization_percent: Option<Decimal>,
}

impl CapacityReport {
    pub fn new(warehouse_id: WarehouseId, capacity: Option<i64>, used: i64) -> Self {
        Self {
            warehouse_id,
            total: capacity,
            used,
            available: available_capacity(capacity, used),
            utilization_percent: capacity.map(|total| utilization(total, used)),
        }
    }

    pub fn is_unlimited(&self) -> bool {
        self.total.is_none()
    }
}

fn utilization(total: i64, used: i64) -> Decimal {
    if total <= 0 {
        // Zero-capacity warehouse: full as soon as it holds anything.
        return if used > 0 {
            Decimal::ONE_HUNDRED
        } else {
            Decimal::ZERO
        };
    }
    (Decimal::from(used) * Decimal::ONE_HUNDRED / Decimal::from(total)).round_dp(2)
}
