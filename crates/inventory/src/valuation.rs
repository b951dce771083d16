//! Valuation strategies: the monetary value of currently-held stock.
//!
//! All three strategies are pure functions of a product's movement history:
//! they read every movement for the product across all warehouses, ordered by
//! `(occurred_at, sequence)`. IN movements without a unit cost are not batches
//! and do not participate. OUT movements are summed into `total_out` and
//! consumed against the eligible batches.

use core::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockledger_core::Money;

use crate::error::{InventoryError, InventoryResult};
use crate::movement::{Direction, StockMovement};

/// Accounting policy for valuing remaining stock. A closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValuationStrategy {
    #[serde(rename = "fifo")]
    Fifo,
    #[serde(rename = "lifo")]
    Lifo,
    #[serde(rename = "avg")]
    WeightedAverage,
}

impl ValuationStrategy {
    pub const ALL: [ValuationStrategy; 3] = [
        ValuationStrategy::Fifo,
        ValuationStrategy::Lifo,
        ValuationStrategy::WeightedAverage,
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            ValuationStrategy::Fifo => "fifo",
            ValuationStrategy::Lifo => "lifo",
            ValuationStrategy::WeightedAverage => "avg",
        }
    }

    /// Value the remaining stock described by `movements`.
    ///
    /// Movements for other products must be filtered out by the caller; the
    /// input order does not matter.
    ///
    /// Fails with `ValuationOverflow` only when the value itself does not fit
    /// in a `Decimal`.
    pub fn calculate(&self, movements: &[StockMovement]) -> InventoryResult<Money> {
        let history = History::from_movements(movements);
        let value = match self {
            ValuationStrategy::Fifo => consume_batches(history.batches.iter(), history.total_out),
            ValuationStrategy::Lifo => {
                consume_batches(history.batches.iter().rev(), history.total_out)
            }
            ValuationStrategy::WeightedAverage => weighted_average(&history),
        };
        value
            .map(|v| Money::new(v).non_negative())
            .ok_or_else(|| InventoryError::ValuationOverflow(format!("{} valuation", self.tag())))
    }
}

impl FromStr for ValuationStrategy {
    type Err = InventoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fifo" => Ok(ValuationStrategy::Fifo),
            "lifo" => Ok(ValuationStrategy::Lifo),
            "avg" => Ok(ValuationStrategy::WeightedAverage),
            other => Err(InventoryError::UnknownValuationStrategy(other.to_string())),
        }
    }
}

impl core::fmt::Display for ValuationStrategy {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.tag())
    }
}

/// A single IN movement seen as a discrete lot at a unit cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Batch {
    quantity: i64,
    unit_cost: Decimal,
}

/// Valuation-relevant view of a product history.
#[derive(Debug, Default)]
struct History {
    /// Eligible batches, oldest first.
    batches: Vec<Batch>,
    total_out: i64,
}

impl History {
    fn from_movements(movements: &[StockMovement]) -> Self {
        let mut ordered: Vec<&StockMovement> = movements.iter().collect();
        ordered.sort_by_key(|m| m.ordering_key());

        let mut history = History::default();
        for m in ordered {
            match (m.direction, m.unit_cost) {
                (Direction::In, Some(unit_cost)) => history.batches.push(Batch {
                    quantity: m.quantity,
                    unit_cost,
                }),
                (Direction::In, None) => {}
                (Direction::Out, _) => {
                    history.total_out = history.total_out.saturating_add(m.quantity);
                }
            }
        }
        history
    }
}

/// Consume `total_out` units from batches in the given order, then value what
/// is left. Over-consumption simply empties every batch. `None` on overflow.
fn consume_batches<'a>(batches: impl Iterator<Item = &'a Batch>, total_out: i64) -> Option<Decimal> {
    let mut to_consume = total_out.max(0);
    let mut value = Decimal::ZERO;

    for batch in batches {
        let consumed = batch.quantity.min(to_consume);
        to_consume -= consumed;
        let remaining = batch.quantity - consumed;
        if remaining > 0 {
            value = value.checked_add(Decimal::from(remaining).checked_mul(batch.unit_cost)?)?;
        }
    }

    Some(value)
}

/// `remaining × (Σ qty·cost / Σ qty)`; zero when nothing remains or nothing
/// was costed. `None` on overflow.
fn weighted_average(history: &History) -> Option<Decimal> {
    let total_in: i64 = history
        .batches
        .iter()
        .fold(0i64, |acc, b| acc.saturating_add(b.quantity));
    if total_in == 0 {
        return Some(Decimal::ZERO);
    }

    let remaining = total_in.saturating_sub(history.total_out);
    if remaining <= 0 {
        return Some(Decimal::ZERO);
    }

    let total_cost = history.batches.iter().try_fold(Decimal::ZERO, |acc, b| {
        acc.checked_add(Decimal::from(b.quantity).checked_mul(b.unit_cost)?)
    })?;
    let (remaining, total_in) = (Decimal::from(remaining), Decimal::from(total_in));

    // Multiply first so exact averages stay exact; divide first only when the
    // intermediate product would not fit.
    match total_cost.checked_mul(remaining) {
        Some(scaled) => scaled.checked_div(total_in),
        None => total_cost.checked_div(total_in)?.checked_mul(remaining),
    }
}
