//! Integration tests for the full ledger pipeline.
//!
//! Tests: InventoryService → LedgerStore (in-memory) → BalanceProjection → valuation
//!
//! Verifies:
//! - Valuation and transfer scenarios end to end
//! - Failed transfers leave the ledger untouched
//! - Concurrent transfers never overdraw a balance

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Barrier};

    use chrono::{Duration, TimeZone, Utc};
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    use stockledger_core::{ActorId, Money, ProductId, WarehouseId};
    use stockledger_inventory::{
        Direction, InventoryBalance, InventoryError, MovementDraft, Product, StockMovement,
        TransferRequest, ValuationStrategy, Warehouse,
    };

    use crate::catalog::InMemoryCatalog;
    use crate::ledger_store::{
        InMemoryLedgerStore, LedgerStore, LedgerStoreError, MovementBatch, MovementFilter,
    };
    use crate::service::{InventoryService, ServiceSettings};

    type Service<L = InMemoryLedgerStore> =
        InventoryService<L, InMemoryCatalog<Product>, InMemoryCatalog<Warehouse>>;

    struct Fixture {
        product: Product,
        main: Warehouse,
        overflow: Warehouse,
        actor: ActorId,
    }

    fn fixture() -> Fixture {
        Fixture {
            product: Product::new(ProductId::new(), "PUMP-01", "Pump", ValuationStrategy::Fifo),
            main: Warehouse::new(WarehouseId::new(), "Main"),
            overflow: Warehouse::new(WarehouseId::new(), "Overflow"),
            actor: ActorId::new(),
        }
    }

    fn build<L: LedgerStore>(
        ledger: L,
        products: &[Product],
        warehouses: &[Warehouse],
        settings: ServiceSettings,
    ) -> Service<L> {
        let product_catalog = InMemoryCatalog::new();
        for p in products {
            product_catalog.upsert(p.clone());
        }
        let warehouse_directory = InMemoryCatalog::new();
        for w in warehouses {
            warehouse_directory.upsert(w.clone());
        }
        InventoryService::with_settings(ledger, product_catalog, warehouse_directory, settings)
    }

    fn service(fx: &Fixture) -> Service {
        build(
            InMemoryLedgerStore::new(),
            &[fx.product.clone()],
            &[fx.main.clone(), fx.overflow.clone()],
            ServiceSettings::default(),
        )
    }

    fn all_movements<L: LedgerStore>(svc: &Service<L>) -> Vec<StockMovement> {
        svc.movement_history(MovementFilter::default()).unwrap()
    }

    // -- valuation ---------------------------------------------------------

    /// IN 10@$10, IN 10@$20, OUT 15 with strictly increasing business time.
    fn record_valuation_history(svc: &Service, fx: &Fixture) {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let p = fx.product.id;
        let w = fx.main.id;
        svc.record(MovementDraft::incoming(p, w, 10, Some(dec!(10)), "lot A", fx.actor).at(t0))
            .unwrap();
        svc.record(
            MovementDraft::incoming(p, w, 10, Some(dec!(20)), "lot B", fx.actor)
                .at(t0 + Duration::hours(1)),
        )
        .unwrap();
        svc.record(MovementDraft::outgoing(p, w, 15, "order", fx.actor).at(t0 + Duration::hours(2)))
            .unwrap();
    }

    #[test]
    fn valuation_scenarios() {
        let fx = fixture();
        let svc = service(&fx);
        record_valuation_history(&svc, &fx);

        assert_eq!(svc.valuate(fx.product.id, "fifo").unwrap(), Money::new(dec!(100)));
        assert_eq!(svc.valuate(fx.product.id, "lifo").unwrap(), Money::new(dec!(50)));
        assert_eq!(svc.valuate(fx.product.id, "avg").unwrap(), Money::new(dec!(75)));

        // Configured strategy is FIFO.
        assert_eq!(svc.valuate_product(fx.product.id).unwrap(), Money::new(dec!(100)));
    }

    #[test]
    fn valuation_is_idempotent_and_spans_warehouses() {
        let fx = fixture();
        let svc = service(&fx);
        record_valuation_history(&svc, &fx);
        svc.record_incoming(fx.product.id, fx.overflow.id, 5, Some(dec!(4)), "", fx.actor)
            .unwrap();

        let first = svc.valuate(fx.product.id, "avg").unwrap();
        let second = svc.valuate(fx.product.id, "avg").unwrap();
        assert_eq!(first, second);
        // 25 in for $320, 10 remain.
        assert_eq!(first, Money::new(dec!(128)));
    }

    #[test]
    fn total_valuation_sums_each_product_strategy() {
        let fx = fixture();
        let other = Product::new(ProductId::new(), "VALVE-02", "Valve", ValuationStrategy::Lifo);
        let svc = build(
            InMemoryLedgerStore::new(),
            &[fx.product.clone(), other.clone()],
            &[fx.main.clone()],
            ServiceSettings::default(),
        );
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();

        svc.record(MovementDraft::incoming(fx.product.id, fx.main.id, 2, Some(dec!(3)), "", fx.actor).at(t0))
            .unwrap();
        svc.record(MovementDraft::incoming(other.id, fx.main.id, 4, Some(dec!(1)), "", fx.actor).at(t0))
            .unwrap();
        svc.record(
            MovementDraft::incoming(other.id, fx.main.id, 4, Some(dec!(2)), "", fx.actor)
                .at(t0 + Duration::minutes(1)),
        )
        .unwrap();
        svc.record_outgoing(other.id, fx.main.id, 4, "", fx.actor).unwrap();

        // 2 × $3 + LIFO leaves the $1 lot: 4 × $1.
        assert_eq!(svc.total_valuation().unwrap(), Money::new(dec!(10)));
    }

    // -- transfers ---------------------------------------------------------

    #[test]
    fn transfer_moves_stock_with_paired_movements() {
        let fx = fixture();
        let svc = service(&fx);
        svc.record_incoming(fx.product.id, fx.main.id, 100, Some(dec!(1)), "", fx.actor)
            .unwrap();
        let before = all_movements(&svc).len();

        let result = svc
            .transfer(TransferRequest::new(
                fx.product.id,
                fx.main.id,
                fx.overflow.id,
                10,
                "rebalance",
                fx.actor,
            ))
            .unwrap();

        assert_eq!(svc.current_balance(fx.product.id, fx.main.id).unwrap(), 90);
        assert_eq!(svc.current_balance(fx.product.id, fx.overflow.id).unwrap(), 10);

        let after = all_movements(&svc);
        assert_eq!(after.len(), before + 2);
        let new: Vec<_> = after
            .iter()
            .filter(|m| m.id == result.outgoing.id || m.id == result.incoming.id)
            .collect();
        assert_eq!(new.len(), 2);
        assert!(new.iter().all(|m| m.quantity == 10 && m.unit_cost.is_none()));

        assert_eq!(result.quantity, 10);
        assert_eq!(result.outgoing.direction, Direction::Out);
        assert_eq!(result.incoming.direction, Direction::In);
        assert_eq!(result.outgoing.description, "Transfer to Overflow: rebalance");
        assert_eq!(result.incoming.description, "Transfer from Main: rebalance");
    }

    #[test]
    fn transfer_rejects_insufficient_stock_without_writing() {
        let fx = fixture();
        let svc = service(&fx);
        svc.record_incoming(fx.product.id, fx.main.id, 100, None, "", fx.actor)
            .unwrap();
        let before = all_movements(&svc);

        let err = svc
            .transfer(TransferRequest::new(
                fx.product.id,
                fx.main.id,
                fx.overflow.id,
                150,
                "",
                fx.actor,
            ))
            .unwrap_err();

        assert_eq!(
            err,
            InventoryError::InsufficientStock {
                product_id: fx.product.id,
                warehouse_id: fx.main.id,
                available: 100,
                requested: 150,
            }
        );
        assert_eq!(all_movements(&svc), before);
        assert_eq!(svc.current_balance(fx.product.id, fx.main.id).unwrap(), 100);
        assert_eq!(svc.current_balance(fx.product.id, fx.overflow.id).unwrap(), 0);
    }

    #[test]
    fn transfer_rejects_insufficient_capacity_without_writing() {
        let mut fx = fixture();
        fx.overflow = fx.overflow.clone().with_capacity(20);
        let svc = service(&fx);
        svc.record_incoming(fx.product.id, fx.main.id, 100, None, "", fx.actor)
            .unwrap();
        let before = all_movements(&svc);

        let err = svc
            .transfer(TransferRequest::new(
                fx.product.id,
                fx.main.id,
                fx.overflow.id,
                50,
                "",
                fx.actor,
            ))
            .unwrap_err();

        assert_eq!(
            err,
            InventoryError::InsufficientCapacity {
                warehouse_id: fx.overflow.id,
                available: 20,
                requested: 50,
            }
        );
        assert_eq!(all_movements(&svc), before);
    }

    #[test]
    fn transfer_rejects_inactive_destination_and_missing_entities() {
        let mut fx = fixture();
        fx.overflow = fx.overflow.clone().inactive();
        let svc = service(&fx);
        svc.record_incoming(fx.product.id, fx.main.id, 10, None, "", fx.actor)
            .unwrap();
        let before = all_movements(&svc);

        let err = svc
            .transfer(TransferRequest::new(fx.product.id, fx.main.id, fx.overflow.id, 1, "", fx.actor))
            .unwrap_err();
        assert_eq!(
            err,
            InventoryError::InactiveDestination {
                warehouse_id: fx.overflow.id
            }
        );

        let err = svc
            .transfer(TransferRequest::new(ProductId::new(), fx.main.id, fx.overflow.id, 1, "", fx.actor))
            .unwrap_err();
        assert!(matches!(err, InventoryError::NotFound { entity: "product", .. }));

        let err = svc
            .transfer(TransferRequest::new(fx.product.id, WarehouseId::new(), fx.main.id, 1, "", fx.actor))
            .unwrap_err();
        assert!(matches!(err, InventoryError::NotFound { entity: "warehouse", .. }));

        assert_eq!(all_movements(&svc), before);
    }

    #[test]
    fn self_transfer_follows_policy() {
        let fx = fixture();
        let strict = service(&fx);
        strict
            .record_incoming(fx.product.id, fx.main.id, 10, None, "", fx.actor)
            .unwrap();
        let err = strict
            .transfer(TransferRequest::new(fx.product.id, fx.main.id, fx.main.id, 5, "", fx.actor))
            .unwrap_err();
        assert_eq!(err, InventoryError::SelfTransfer { warehouse_id: fx.main.id });
        assert_eq!(all_movements(&strict).len(), 1);

        // A full warehouse still accepts a self-transfer: held quantity is unchanged.
        let full = Warehouse::new(fx.main.id, "Main").with_capacity(10);
        let lenient = build(
            InMemoryLedgerStore::new(),
            &[fx.product.clone()],
            &[full],
            ServiceSettings {
                allow_self_transfer: true,
                ..ServiceSettings::default()
            },
        );
        lenient
            .record_incoming(fx.product.id, fx.main.id, 10, None, "", fx.actor)
            .unwrap();
        lenient
            .transfer(TransferRequest::new(fx.product.id, fx.main.id, fx.main.id, 5, "", fx.actor))
            .unwrap();
        assert_eq!(lenient.current_balance(fx.product.id, fx.main.id).unwrap(), 10);
        assert_eq!(all_movements(&lenient).len(), 3);
    }

    #[test]
    fn movement_history_and_stock_views() {
        let fx = fixture();
        let svc = service(&fx);
        svc.record_incoming(fx.product.id, fx.main.id, 30, None, "", fx.actor)
            .unwrap();
        svc.transfer(TransferRequest::new(fx.product.id, fx.main.id, fx.overflow.id, 12, "", fx.actor))
            .unwrap();

        let outs = svc
            .movement_history(MovementFilter {
                direction: Some(Direction::Out),
                ..MovementFilter::default()
            })
            .unwrap();
        assert_eq!(outs.len(), 1);
        assert_eq!(outs[0].warehouse_id, fx.main.id);

        let at_overflow = svc
            .movement_history(MovementFilter::warehouse(fx.overflow.id))
            .unwrap();
        assert_eq!(at_overflow.len(), 1);

        let stock = svc.product_stock(fx.product.id).unwrap();
        assert_eq!(stock.total, 30);
        assert_eq!(stock.balances.len(), 2);

        let main_stock = svc.warehouse_stock(fx.main.id).unwrap();
        assert_eq!(
            main_stock,
            vec![InventoryBalance {
                product_id: fx.product.id,
                warehouse_id: fx.main.id,
                quantity: 18,
            }]
        );
    }

    // -- store failure modes ----------------------------------------------

    /// Delegating store whose transfer commits misbehave in scripted ways.
    struct ScriptedStore {
        inner: InMemoryLedgerStore,
        /// Number of upcoming multi-movement commits that report a write conflict.
        conflicts: AtomicU32,
        /// Fail every multi-movement commit with a backend error.
        broken: bool,
        /// Extra quantity reported by `balance()`, simulating a stale read.
        stale_bonus: i64,
    }

    impl ScriptedStore {
        fn new() -> Self {
            Self {
                inner: InMemoryLedgerStore::new(),
                conflicts: AtomicU32::new(0),
                broken: false,
                stale_bonus: 0,
            }
        }
    }

    impl LedgerStore for ScriptedStore {
        fn commit(&self, batch: MovementBatch) -> Result<Vec<StockMovement>, LedgerStoreError> {
            if batch.drafts.len() > 1 {
                if self.broken {
                    return Err(LedgerStoreError::Backend("connection reset".into()));
                }
                let pending = self.conflicts.load(Ordering::SeqCst);
                if pending > 0 {
                    self.conflicts.store(pending - 1, Ordering::SeqCst);
                    return Err(LedgerStoreError::Concurrency("serialization failure".into()));
                }
            }
            self.inner.commit(batch)
        }

        fn balance(&self, p: ProductId, w: WarehouseId) -> Result<i64, LedgerStoreError> {
            Ok(self.inner.balance(p, w)? + self.stale_bonus)
        }

        fn balances_for_warehouse(
            &self,
            w: WarehouseId,
        ) -> Result<Vec<InventoryBalance>, LedgerStoreError> {
            self.inner.balances_for_warehouse(w)
        }

        fn balances_for_product(
            &self,
            p: ProductId,
        ) -> Result<Vec<InventoryBalance>, LedgerStoreError> {
            self.inner.balances_for_product(p)
        }

        fn used_capacity(&self, w: WarehouseId) -> Result<i64, LedgerStoreError> {
            self.inner.used_capacity(w)
        }

        fn movements(&self, filter: MovementFilter) -> Result<Vec<StockMovement>, LedgerStoreError> {
            self.inner.movements(filter)
        }

        fn has_movements(&self, p: ProductId) -> Result<bool, LedgerStoreError> {
            self.inner.has_movements(p)
        }
    }

    fn scripted(fx: &Fixture, store: ScriptedStore, retries: u32) -> Service<ScriptedStore> {
        let svc = build(
            store,
            &[fx.product.clone()],
            &[fx.main.clone(), fx.overflow.clone()],
            ServiceSettings {
                commit_retries: retries,
                ..ServiceSettings::default()
            },
        );
        svc.record_incoming(fx.product.id, fx.main.id, 50, None, "", fx.actor)
            .unwrap();
        svc
    }

    #[test]
    fn backend_failure_during_commit_is_transfer_failed() {
        let fx = fixture();
        let svc = scripted(
            &fx,
            ScriptedStore {
                broken: true,
                ..ScriptedStore::new()
            },
            3,
        );

        let err = svc
            .transfer(TransferRequest::new(fx.product.id, fx.main.id, fx.overflow.id, 5, "", fx.actor))
            .unwrap_err();
        assert!(matches!(err, InventoryError::TransferFailed(_)));
        assert_eq!(all_movements(&svc).len(), 1);
        assert_eq!(svc.current_balance(fx.product.id, fx.main.id).unwrap(), 50);
    }

    #[test]
    fn write_conflicts_are_retried_up_to_the_limit() {
        let fx = fixture();
        let store = ScriptedStore::new();
        store.conflicts.store(2, Ordering::SeqCst);
        let svc = scripted(&fx, store, 2);
        svc.transfer(TransferRequest::new(fx.product.id, fx.main.id, fx.overflow.id, 5, "", fx.actor))
            .unwrap();
        assert_eq!(svc.current_balance(fx.product.id, fx.overflow.id).unwrap(), 5);

        let fx = fixture();
        let store = ScriptedStore::new();
        store.conflicts.store(3, Ordering::SeqCst);
        let svc = scripted(&fx, store, 2);
        let err = svc
            .transfer(TransferRequest::new(fx.product.id, fx.main.id, fx.overflow.id, 5, "", fx.actor))
            .unwrap_err();
        assert!(matches!(err, InventoryError::TransferFailed(_)));
        assert_eq!(all_movements(&svc).len(), 1);
    }

    #[test]
    fn stale_read_is_caught_at_commit() {
        let fx = fixture();
        let svc = scripted(
            &fx,
            ScriptedStore {
                stale_bonus: 1_000,
                ..ScriptedStore::new()
            },
            3,
        );

        let err = svc
            .transfer(TransferRequest::new(fx.product.id, fx.main.id, fx.overflow.id, 80, "", fx.actor))
            .unwrap_err();
        assert_eq!(
            err,
            InventoryError::InsufficientStock {
                product_id: fx.product.id,
                warehouse_id: fx.main.id,
                available: 50,
                requested: 80,
            }
        );
        assert_eq!(all_movements(&svc).len(), 1);
    }

    // -- concurrency -------------------------------------------------------

    #[test]
    fn concurrent_transfers_never_overdraw() {
        const THREADS: usize = 16;
        const EACH: i64 = 10;

        let fx = fixture();
        let svc = Arc::new(service(&fx));
        svc.record_incoming(fx.product.id, fx.main.id, 100, None, "", fx.actor)
            .unwrap();

        let barrier = Arc::new(Barrier::new(THREADS));
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let svc = Arc::clone(&svc);
                let barrier = Arc::clone(&barrier);
                let (p, src, dst, actor) = (fx.product.id, fx.main.id, fx.overflow.id, fx.actor);
                std::thread::spawn(move || {
                    barrier.wait();
                    svc.transfer(TransferRequest::new(p, src, dst, EACH, "", actor))
                })
            })
            .collect();

        let mut committed = 0;
        for handle in handles {
            match handle.join().unwrap() {
                Ok(_) => committed += 1,
                Err(InventoryError::InsufficientStock { requested, .. }) => {
                    assert_eq!(requested, EACH)
                }
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(committed, 10);
        assert_eq!(svc.current_balance(fx.product.id, fx.main.id).unwrap(), 0);
        assert_eq!(svc.current_balance(fx.product.id, fx.overflow.id).unwrap(), 100);
        assert_eq!(all_movements(&svc).len(), 1 + 2 * committed);
    }

    // -- properties --------------------------------------------------------

    #[derive(Debug, Clone)]
    enum Op {
        In { w: usize, qty: i64 },
        Out { w: usize, qty: i64 },
        Transfer { from: usize, to: usize, qty: i64 },
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0usize..3, 1i64..50).prop_map(|(w, qty)| Op::In { w, qty }),
            (0usize..3, 1i64..50).prop_map(|(w, qty)| Op::Out { w, qty }),
            (0usize..3, 0usize..3, 1i64..80).prop_map(|(from, to, qty)| Op::Transfer { from, to, qty }),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 64,
            ..ProptestConfig::default()
        })]

        #[test]
        fn balances_match_history_and_failed_transfers_write_nothing(ops in prop::collection::vec(op(), 1..40)) {
            let product = Product::new(ProductId::new(), "P", "P", ValuationStrategy::WeightedAverage);
            let warehouses = [
                Warehouse::new(WarehouseId::new(), "A"),
                Warehouse::new(WarehouseId::new(), "B").with_capacity(60),
                Warehouse::new(WarehouseId::new(), "C"),
            ];
            let actor = ActorId::new();
            let svc = build(InMemoryLedgerStore::new(), &[product.clone()], &warehouses, ServiceSettings::default());

            for op in ops {
                let before = all_movements(&svc).len();
                match op {
                    Op::In { w, qty } => {
                        svc.record_incoming(product.id, warehouses[w].id, qty, Some(dec!(2)), "", actor).unwrap();
                    }
                    Op::Out { w, qty } => {
                        svc.record_outgoing(product.id, warehouses[w].id, qty, "", actor).unwrap();
                    }
                    Op::Transfer { from, to, qty } => {
                        let req = TransferRequest::new(product.id, warehouses[from].id, warehouses[to].id, qty, "", actor);
                        if svc.transfer(req).is_err() {
                            prop_assert_eq!(all_movements(&svc).len(), before);
                        }
                    }
                }
            }

            let history = all_movements(&svc);
            for w in &warehouses {
                let expected: i64 = history
                    .iter()
                    .filter(|m| m.warehouse_id == w.id)
                    .map(StockMovement::signed_quantity)
                    .sum();
                prop_assert_eq!(svc.current_balance(product.id, w.id).unwrap(), expected);
            }

            let value = svc.valuate_product(product.id).unwrap();
            prop_assert!(value.amount() >= rust_decimal::Decimal::ZERO);
            prop_assert_eq!(value, svc.valuate_product(product.id).unwrap());
        }
    }
}
