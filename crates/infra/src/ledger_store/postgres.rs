//! Postgres-backed ledger store.
//!
//! ## Tables
//!
//! - `stock_movements`: the append-only log. `sequence` is a `BIGSERIAL`
//!   giving insertion order; a trigger rejects `UPDATE` and `DELETE`.
//! - `inventory_balances`: the projection, keyed by `(product_id, warehouse_id)`.
//!
//! ## Commit protocol
//!
//! One transaction per batch:
//! 1. take a transaction-scoped advisory lock per warehouse touched by the
//!    batch (sorted, so two batches never wait on each other in opposite order)
//! 2. read the balances the preconditions need (`FOR UPDATE`) and verify them
//! 3. insert each movement and upsert its balance row (`quantity ± delta`)
//! 4. commit
//!
//! Any failure rolls the whole transaction back. The warehouse lock means a
//! stock or capacity check cannot go stale before the write it guards.
//!
//! ## Error Mapping
//!
//! | PostgreSQL code | LedgerStoreError |
//! |-----------------|------------------|
//! | `40001` serialization failure, `40P01` deadlock | `Concurrency` |
//! | `23514` check violation | `InvalidMovement` |
//! | anything else, pool/network errors | `Backend` |

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tokio::runtime::RuntimeFlavor;
use tracing::{Span, instrument};
use uuid::Uuid;

use stockledger_core::{ActorId, MovementId, ProductId, WarehouseId};
use stockledger_inventory::{Direction, InventoryBalance, Precondition, StockMovement};

use super::r#trait::{LedgerStore, LedgerStoreError, MovementBatch, MovementFilter};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS stock_movements (
        sequence BIGSERIAL PRIMARY KEY,
        movement_id UUID NOT NULL UNIQUE,
        product_id UUID NOT NULL,
        warehouse_id UUID NOT NULL,
        direction TEXT NOT NULL CHECK (direction IN ('in', 'out')),
        quantity BIGINT NOT NULL CHECK (quantity > 0),
        unit_cost NUMERIC NULL CHECK (unit_cost IS NULL OR unit_cost >= 0),
        description TEXT NOT NULL,
        actor_id UUID NOT NULL,
        occurred_at TIMESTAMPTZ NOT NULL,
        recorded_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS stock_movements_product_idx
        ON stock_movements (product_id, occurred_at, sequence)
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS stock_movements_warehouse_idx
        ON stock_movements (warehouse_id, occurred_at, sequence)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS inventory_balances (
        product_id UUID NOT NULL,
        warehouse_id UUID NOT NULL,
        quantity BIGINT NOT NULL DEFAULT 0,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        PRIMARY KEY (product_id, warehouse_id)
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS inventory_balances_warehouse_idx
        ON inventory_balances (warehouse_id)
    "#,
    r#"
    CREATE OR REPLACE FUNCTION stock_movements_append_only() RETURNS trigger AS $$
    BEGIN
        RAISE EXCEPTION 'stock_movements is append-only';
    END;
    $$ LANGUAGE plpgsql
    "#,
    r#"DROP TRIGGER IF EXISTS stock_movements_append_only ON stock_movements"#,
    r#"
    CREATE TRIGGER stock_movements_append_only
        BEFORE UPDATE OR DELETE ON stock_movements
        FOR EACH ROW EXECUTE FUNCTION stock_movements_append_only()
    "#,
];

const MOVEMENT_COLUMNS: &str = "sequence, movement_id, product_id, warehouse_id, direction, \
     quantity, unit_cost, description, actor_id, occurred_at";

/// Postgres-backed ledger store.
///
/// `Send + Sync`; all access goes through the SQLx pool.
#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: Arc<PgPool>,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Connect a fresh pool.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, LedgerStoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create tables, indexes and the append-only trigger if absent.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), LedgerStoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        }
        Ok(())
    }

    #[instrument(
        skip(self, batch),
        fields(
            drafts = batch.drafts.len(),
            preconditions = batch.preconditions.len(),
            committed = tracing::field::Empty
        ),
        err
    )]
    pub async fn commit_batch(
        &self,
        batch: MovementBatch,
    ) -> Result<Vec<StockMovement>, LedgerStoreError> {
        if batch.drafts.is_empty() {
            return Ok(vec![]);
        }

        for draft in &batch.drafts {
            draft
                .validate()
                .map_err(|e| LedgerStoreError::InvalidMovement(e.to_string()))?;
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let warehouses: BTreeSet<WarehouseId> = batch
            .drafts
            .iter()
            .map(|d| d.warehouse_id)
            .chain(batch.preconditions.iter().map(Precondition::warehouse_id))
            .collect();
        for warehouse_id in &warehouses {
            lock_warehouse(&mut tx, *warehouse_id).await?;
        }

        for guard in &batch.preconditions {
            let observed = observed_for(&mut tx, guard).await?;
            if let Err(violation) = guard.verify(observed) {
                tx.rollback()
                    .await
                    .map_err(|e| map_sqlx_error("rollback", e))?;
                return Err(LedgerStoreError::PreconditionFailed(violation));
            }
        }

        let committed_at = Utc::now();
        let mut committed = Vec::with_capacity(batch.drafts.len());

        for draft in batch.drafts {
            let movement_id = MovementId::new();
            let occurred_at = draft.occurred_at.unwrap_or(committed_at);

            let row = sqlx::query(
                r#"
                INSERT INTO stock_movements (
                    movement_id,
                    product_id,
                    warehouse_id,
                    direction,
                    quantity,
                    unit_cost,
                    description,
                    actor_id,
                    occurred_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                RETURNING sequence
                "#,
            )
            .bind(movement_id.as_uuid())
            .bind(draft.product_id.as_uuid())
            .bind(draft.warehouse_id.as_uuid())
            .bind(draft.direction.as_str())
            .bind(draft.quantity)
            .bind(draft.unit_cost)
            .bind(&draft.description)
            .bind(draft.actor_id.as_uuid())
            .bind(occurred_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_movement", e))?;

            let sequence: i64 = row
                .try_get("sequence")
                .map_err(|e| map_sqlx_error("insert_movement", e))?;

            let movement = draft.into_movement(movement_id, sequence as u64, committed_at);
            apply_to_balance(&mut tx, &movement).await?;
            committed.push(movement);
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Span::current().record("committed", committed.len());
        Ok(committed)
    }

    #[instrument(skip(self), fields(product_id = %product_id, warehouse_id = %warehouse_id), err)]
    pub async fn load_balance(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> Result<i64, LedgerStoreError> {
        let quantity: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT quantity
            FROM inventory_balances
            WHERE product_id = $1 AND warehouse_id = $2
            "#,
        )
        .bind(product_id.as_uuid())
        .bind(warehouse_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_balance", e))?;

        Ok(quantity.unwrap_or(0))
    }

    pub async fn load_balances(
        &self,
        product_id: Option<ProductId>,
        warehouse_id: Option<WarehouseId>,
    ) -> Result<Vec<InventoryBalance>, LedgerStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT product_id, warehouse_id, quantity
            FROM inventory_balances
            WHERE ($1::uuid IS NULL OR product_id = $1)
              AND ($2::uuid IS NULL OR warehouse_id = $2)
            ORDER BY product_id, warehouse_id
            "#,
        )
        .bind(product_id.map(Uuid::from))
        .bind(warehouse_id.map(Uuid::from))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_balances", e))?;

        rows.iter()
            .map(|row| {
                Ok(InventoryBalance {
                    product_id: ProductId::from_uuid(row.try_get("product_id")?),
                    warehouse_id: WarehouseId::from_uuid(row.try_get("warehouse_id")?),
                    quantity: row.try_get("quantity")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(|e| map_sqlx_error("load_balances", e))
    }

    pub async fn load_used_capacity(
        &self,
        warehouse_id: WarehouseId,
    ) -> Result<i64, LedgerStoreError> {
        sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(quantity), 0)::BIGINT
            FROM inventory_balances
            WHERE warehouse_id = $1
            "#,
        )
        .bind(warehouse_id.as_uuid())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_used_capacity", e))
    }

    #[instrument(skip(self), fields(movement_count = tracing::field::Empty), err)]
    pub async fn load_movements(
        &self,
        filter: MovementFilter,
    ) -> Result<Vec<StockMovement>, LedgerStoreError> {
        let sql = format!(
            r#"
            SELECT {MOVEMENT_COLUMNS}
            FROM stock_movements
            WHERE ($1::uuid IS NULL OR product_id = $1)
              AND ($2::uuid IS NULL OR warehouse_id = $2)
              AND ($3::text IS NULL OR direction = $3)
            ORDER BY occurred_at ASC, sequence ASC
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(filter.product_id.map(Uuid::from))
            .bind(filter.warehouse_id.map(Uuid::from))
            .bind(filter.direction.map(|d| d.as_str()))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_movements", e))?;

        let mut movements = Vec::with_capacity(rows.len());
        for row in &rows {
            movements.push(MovementRow::from_pg(row)?.try_into()?);
        }
        Span::current().record("movement_count", movements.len());
        Ok(movements)
    }

    pub async fn product_has_movements(
        &self,
        product_id: ProductId,
    ) -> Result<bool, LedgerStoreError> {
        sqlx::query_scalar(
            r#"SELECT EXISTS (SELECT 1 FROM stock_movements WHERE product_id = $1)"#,
        )
        .bind(product_id.as_uuid())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("product_has_movements", e))
    }
}

/// Stable 64-bit advisory lock key for a warehouse.
fn warehouse_lock_key(warehouse_id: WarehouseId) -> i64 {
    let (hi, lo) = warehouse_id.as_uuid().as_u64_pair();
    (hi ^ lo) as i64
}

async fn lock_warehouse(
    tx: &mut Transaction<'_, Postgres>,
    warehouse_id: WarehouseId,
) -> Result<(), LedgerStoreError> {
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(warehouse_lock_key(warehouse_id))
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("lock_warehouse", e))?;
    Ok(())
}

async fn observed_for(
    tx: &mut Transaction<'_, Postgres>,
    guard: &Precondition,
) -> Result<i64, LedgerStoreError> {
    match *guard {
        Precondition::MinimumBalance {
            product_id,
            warehouse_id,
            ..
        } => {
            let quantity: Option<i64> = sqlx::query_scalar(
                r#"
                SELECT quantity
                FROM inventory_balances
                WHERE product_id = $1 AND warehouse_id = $2
                FOR UPDATE
                "#,
            )
            .bind(product_id.as_uuid())
            .bind(warehouse_id.as_uuid())
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("check_balance", e))?;
            Ok(quantity.unwrap_or(0))
        }
        Precondition::AvailableCapacity { warehouse_id, .. } => sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(quantity), 0)::BIGINT
            FROM inventory_balances
            WHERE warehouse_id = $1
            "#,
        )
        .bind(warehouse_id.as_uuid())
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("check_capacity", e)),
    }
}

async fn apply_to_balance(
    tx: &mut Transaction<'_, Postgres>,
    movement: &StockMovement,
) -> Result<(), LedgerStoreError> {
    sqlx::query(
        r#"
        INSERT INTO inventory_balances (product_id, warehouse_id, quantity)
        VALUES ($1, $2, $3)
        ON CONFLICT (product_id, warehouse_id)
        DO UPDATE SET
            quantity = inventory_balances.quantity + EXCLUDED.quantity,
            updated_at = now()
        "#,
    )
    .bind(movement.product_id.as_uuid())
    .bind(movement.warehouse_id.as_uuid())
    .bind(movement.signed_quantity())
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("apply_to_balance", e))?;
    Ok(())
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> LedgerStoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("40001") | Some("40P01") => LedgerStoreError::Concurrency(msg),
                Some("23514") => LedgerStoreError::InvalidMovement(msg),
                _ => LedgerStoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            LedgerStoreError::Backend(format!("connection pool closed in {operation}"))
        }
        other => LedgerStoreError::Backend(format!("sqlx error in {operation}: {other}")),
    }
}

#[derive(Debug)]
struct MovementRow {
    sequence: i64,
    movement_id: Uuid,
    product_id: Uuid,
    warehouse_id: Uuid,
    direction: String,
    quantity: i64,
    unit_cost: Option<Decimal>,
    description: String,
    actor_id: Uuid,
    occurred_at: DateTime<Utc>,
}

impl MovementRow {
    fn from_pg(row: &PgRow) -> Result<Self, LedgerStoreError> {
        let read = || -> Result<Self, sqlx::Error> {
            Ok(MovementRow {
                sequence: row.try_get("sequence")?,
                movement_id: row.try_get("movement_id")?,
                product_id: row.try_get("product_id")?,
                warehouse_id: row.try_get("warehouse_id")?,
                direction: row.try_get("direction")?,
                quantity: row.try_get("quantity")?,
                unit_cost: row.try_get("unit_cost")?,
                description: row.try_get("description")?,
                actor_id: row.try_get("actor_id")?,
                occurred_at: row.try_get("occurred_at")?,
            })
        };
        read().map_err(|e| map_sqlx_error("decode_movement", e))
    }
}

impl TryFrom<MovementRow> for StockMovement {
    type Error = LedgerStoreError;

    fn try_from(row: MovementRow) -> Result<Self, Self::Error> {
        let direction = Direction::parse(&row.direction).ok_or_else(|| {
            LedgerStoreError::Backend(format!("unknown direction '{}' in ledger", row.direction))
        })?;
        Ok(StockMovement {
            id: MovementId::from_uuid(row.movement_id),
            sequence: row.sequence as u64,
            product_id: ProductId::from_uuid(row.product_id),
            warehouse_id: WarehouseId::from_uuid(row.warehouse_id),
            direction,
            quantity: row.quantity,
            unit_cost: row.unit_cost,
            description: row.description,
            actor_id: ActorId::from_uuid(row.actor_id),
            occurred_at: row.occurred_at,
        })
    }
}

// The LedgerStore trait is synchronous. Calls must come from a multi-threaded
// tokio runtime; the async query runs on the current handle while the worker
// thread is marked as blocking.
fn block_on<F: std::future::Future>(fut: F) -> Result<F::Output, LedgerStoreError> {
    let unsupported = || {
        LedgerStoreError::Backend(
            "PostgresLedgerStore requires a multi-threaded tokio runtime".to_string(),
        )
    };
    let handle = tokio::runtime::Handle::try_current().map_err(|_| unsupported())?;
    // block_in_place panics on a current-thread runtime.
    if handle.runtime_flavor() != RuntimeFlavor::MultiThread {
        return Err(unsupported());
    }
    Ok(tokio::task::block_in_place(|| handle.block_on(fut)))
}

impl LedgerStore for PostgresLedgerStore {
    fn commit(&self, batch: MovementBatch) -> Result<Vec<StockMovement>, LedgerStoreError> {
        block_on(self.commit_batch(batch))?
    }

    fn balance(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> Result<i64, LedgerStoreError> {
        block_on(self.load_balance(product_id, warehouse_id))?
    }

    fn balances_for_warehouse(
        &self,
        warehouse_id: WarehouseId,
    ) -> Result<Vec<InventoryBalance>, LedgerStoreError> {
        block_on(self.load_balances(None, Some(warehouse_id)))?
    }

    fn balances_for_product(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<InventoryBalance>, LedgerStoreError> {
        block_on(self.load_balances(Some(product_id), None))?
    }

    fn used_capacity(&self, warehouse_id: WarehouseId) -> Result<i64, LedgerStoreError> {
        block_on(self.load_used_capacity(warehouse_id))?
    }

    fn movements(&self, filter: MovementFilter) -> Result<Vec<StockMovement>, LedgerStoreError> {
        block_on(self.load_movements(filter))?
    }

    fn has_movements(&self, product_id: ProductId) -> Result<bool, LedgerStoreError> {
        block_on(self.product_has_movements(product_id))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockledger_inventory::MovementDraft;

    #[test]
    fn lock_key_is_stable_per_warehouse() {
        let w = WarehouseId::new();
        assert_eq!(warehouse_lock_key(w), warehouse_lock_key(w));
        assert_ne!(warehouse_lock_key(w), warehouse_lock_key(WarehouseId::new()));
    }

    #[test]
    fn rejects_unknown_direction_from_storage() {
        let row = MovementRow {
            sequence: 1,
            movement_id: Uuid::now_v7(),
            product_id: Uuid::now_v7(),
            warehouse_id: Uuid::now_v7(),
            direction: "sideways".into(),
            quantity: 1,
            unit_cost: None,
            description: String::new(),
            actor_id: Uuid::now_v7(),
            occurred_at: Utc::now(),
        };
        assert!(matches!(
            StockMovement::try_from(row),
            Err(LedgerStoreError::Backend(_))
        ));
    }

    #[test]
    fn trait_calls_outside_runtime_fail_cleanly() {
        let err = block_on(async { 1 }).unwrap_err();
        assert!(matches!(err, LedgerStoreError::Backend(_)));
    }

    #[test]
    fn current_thread_runtime_is_rejected() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let result = rt.block_on(async { block_on(async { 1 }) });
        assert!(matches!(result, Err(LedgerStoreError::Backend(_))));
    }

    #[test]
    fn multi_thread_runtime_bridges_sync_calls() {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .build()
            .unwrap();
        let task = rt.spawn(async { block_on(async { 7 }) });
        assert_eq!(rt.block_on(task).unwrap().unwrap(), 7);
    }

    /// Runs only when `STOCKLEDGER_DATABASE_URL` points at a scratch database.
    #[test]
    fn commit_protocol_against_live_database() {
        let Ok(url) = std::env::var("STOCKLEDGER_DATABASE_URL") else {
            return;
        };
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();

        let store = rt
            .block_on(async {
                let store = PostgresLedgerStore::connect(&url, 2).await?;
                store.ensure_schema().await?;
                Ok::<_, LedgerStoreError>(store)
            })
            .unwrap();

        let task = rt.spawn(async move {
            let (p, src, dst, actor) =
                (ProductId::new(), WarehouseId::new(), WarehouseId::new(), ActorId::new());
            let receipt = MovementDraft::incoming(p, src, 100, Some(Decimal::new(250, 2)), "", actor);
            store.commit(MovementBatch::single(receipt)).unwrap();

            let pair = |qty| {
                vec![
                    MovementDraft::outgoing(p, src, qty, "out", actor),
                    MovementDraft::incoming(p, dst, qty, None, "in", actor),
                ]
            };
            let guard = |qty| Precondition::MinimumBalance {
                product_id: p,
                warehouse_id: src,
                required: qty,
            };

            // Failing guard: rolled back, nothing written.
            let err = store
                .commit(MovementBatch::guarded(pair(150), vec![guard(150)]))
                .unwrap_err();
            assert!(matches!(err, LedgerStoreError::PreconditionFailed(_)));
            assert_eq!(store.movements(MovementFilter::product(p)).unwrap().len(), 1);
            assert_eq!(store.balance(p, src).unwrap(), 100);
            assert_eq!(store.balance(p, dst).unwrap(), 0);

            // Passing guard: both rows land, balances upserted.
            let committed = store
                .commit(MovementBatch::guarded(pair(40), vec![guard(40)]))
                .unwrap();
            assert_eq!(committed.len(), 2);
            assert!(committed[0].sequence < committed[1].sequence);
            assert_eq!(store.balance(p, src).unwrap(), 60);
            assert_eq!(store.balance(p, dst).unwrap(), 40);
            assert_eq!(store.used_capacity(dst).unwrap(), 40);
            assert!(store.has_movements(p).unwrap());
        });
        rt.block_on(task).unwrap();
    }
}
