//! One refresh cycle: fetch both datasets, decode, rebuild views, swap.
//!
//! Failures are isolated per dataset. A failed balances fetch keeps every
//! balance-derived view from the previous cycle; a failed prices fetch still
//! refreshes the quantity views and only carries the USD half over. The swap
//! is always a complete `ViewSet`, never a partial update.

use std::sync::Arc;

use crate::decode::{decode_balances, decode_prices, report_violations, DecodeReport};
use crate::fetch::{BalancesFetcher, PricesFetcher};
use crate::valuation::PriceTable;
use crate::views::{QuantityViews, SnapshotStore, UsdViews, ViewSet};

use common::types::{BalanceRecord, PriceRecord};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshSummary {
    pub balance_rows: usize,
    pub price_rows: usize,
    pub balance_violations: usize,
    pub price_violations: usize,
    pub quantity_carried_over: bool,
    pub usd_carried_over: bool,
}

impl RefreshSummary {
    pub fn fully_refreshed(&self) -> bool {
        !self.quantity_carried_over && !self.usd_carried_over
    }
}

pub async fn run_refresh_once<F>(
    fetcher: &F,
    store: &SnapshotStore,
    focus_denom: &str,
) -> RefreshSummary
where
    F: BalancesFetcher + PricesFetcher + Sync,
{
    // Independent datasets, no ordering dependency: fetch concurrently.
    let (balances_res, prices_res) =
        tokio::join!(fetcher.fetch_balances(), fetcher.fetch_prices());

    let balances: Option<DecodeReport<BalanceRecord>> = match balances_res {
        Ok(rows) => {
            let report = decode_balances(&rows);
            report_violations("balances", &report.violations);
            Some(report)
        }
        Err(err) => {
            tracing::error!(dataset = "balances", error = %err, "fetch failed; keeping previous balance views");
            None
        }
    };

    let prices: Option<DecodeReport<PriceRecord>> = match prices_res {
        Ok(rows) => {
            let report = decode_prices(&rows);
            report_violations("prices", &report.violations);
            Some(report)
        }
        Err(err) => {
            tracing::error!(dataset = "prices", error = %err, "fetch failed; keeping previous USD views");
            None
        }
    };

    let prev = store.load();
    let mut summary = RefreshSummary {
        balance_rows: balances.as_ref().map_or(0, |r| r.records.len()),
        price_rows: prices.as_ref().map_or(0, |r| r.records.len()),
        balance_violations: balances.as_ref().map_or(0, |r| r.violations.len()),
        price_violations: prices.as_ref().map_or(0, |r| r.violations.len()),
        quantity_carried_over: false,
        usd_carried_over: false,
    };

    let usd = match (&balances, prices) {
        (Some(b), Some(p)) => {
            let table = PriceTable::from_records(p.records);
            if table.is_empty() {
                tracing::warn!("price snapshot decoded to an empty table; USD views will be unvalued");
            } else {
                tracing::debug!(denom_days = table.len(), "price table built");
            }
            Arc::new(UsdViews::build(&b.records, &table, focus_denom))
        }
        _ => {
            summary.usd_carried_over = true;
            metrics::counter!("aggregator_view_carried_over_total", "views" => "usd").increment(1);
            prev.usd.clone()
        }
    };

    let quantity = match balances {
        Some(report) => Arc::new(QuantityViews::build(report.records, focus_denom)),
        None => {
            summary.quantity_carried_over = true;
            metrics::counter!("aggregator_view_carried_over_total", "views" => "quantity")
                .increment(1);
            prev.quantity.clone()
        }
    };

    store.swap(ViewSet { quantity, usd });

    let status = if summary.fully_refreshed() {
        "ok"
    } else if summary.quantity_carried_over && summary.usd_carried_over {
        "failed"
    } else {
        "partial"
    };
    metrics::counter!("aggregator_refresh_total", "status" => status).increment(1);
    metrics::gauge!("aggregator_snapshot_rows", "dataset" => "balances")
        .set(summary.balance_rows as f64);
    metrics::gauge!("aggregator_snapshot_rows", "dataset" => "prices")
        .set(summary.price_rows as f64);

    tracing::info!(
        balance_rows = summary.balance_rows,
        price_rows = summary.price_rows,
        balance_violations = summary.balance_violations,
        price_violations = summary.price_violations,
        status,
        "refresh cycle complete"
    );

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::error::FetchFailure;
    use common::types::{BalanceType, EntityKind, RankMetric};
    use rust_decimal::Decimal;
    use serde_json::{json, Value};
    use std::str::FromStr;

    /// Fake provider: `None` for a dataset makes its fetch fail.
    struct FakeProvider {
        balances: Option<Vec<Value>>,
        prices: Option<Vec<Value>>,
    }

    impl FakeProvider {
        fn failing(dataset: &str) -> FetchFailure {
            FetchFailure::MalformedPayload {
                dataset: dataset.to_string(),
            }
        }
    }

    impl BalancesFetcher for FakeProvider {
        async fn fetch_balances(&self) -> Result<Vec<Value>, FetchFailure> {
            self.balances.clone().ok_or_else(|| Self::failing("balances"))
        }
    }

    impl PricesFetcher for FakeProvider {
        async fn fetch_prices(&self) -> Result<Vec<Value>, FetchFailure> {
            self.prices.clone().ok_or_else(|| Self::failing("prices"))
        }
    }

    fn balance_rows() -> Vec<Value> {
        vec![
            json!({"ADDRESS": "A", "DATE": "2022-01-01", "BALANCE_TYPE": "liquid", "CURRENCY": "uosmo", "BALANCE": 100}),
            json!({"ADDRESS": "B", "DATE": "2022-01-01", "BALANCE_TYPE": "liquid", "CURRENCY": "uosmo", "BALANCE": 50}),
        ]
    }

    fn price_rows() -> Vec<Value> {
        vec![json!({"CURRENCY": "uosmo", "DATE": "2022-01-01", "PRICE": 2.0})]
    }

    #[tokio::test]
    async fn test_refresh_builds_all_views() {
        let store = SnapshotStore::new();
        let provider = FakeProvider {
            balances: Some(balance_rows()),
            prices: Some(price_rows()),
        };

        let summary = run_refresh_once(&provider, &store, "uosmo").await;
        assert!(summary.fully_refreshed());
        assert_eq!(summary.balance_rows, 2);

        let views = store.load();
        assert_eq!(views.active_wallets(BalanceType::Liquid), Some(2));
        assert_eq!(
            views.balance_total(BalanceType::Liquid),
            Some(Decimal::from(300))
        );
        let top = views.top_k(EntityKind::Wallet, RankMetric::BalanceUsd, None, 1);
        assert_eq!(top[0].entity_id, "A");
    }

    #[tokio::test]
    async fn test_prices_failure_refreshes_quantity_and_carries_usd() {
        let store = SnapshotStore::new();

        // First cycle: both datasets healthy.
        let provider = FakeProvider {
            balances: Some(balance_rows()),
            prices: Some(price_rows()),
        };
        run_refresh_once(&provider, &store, "uosmo").await;
        let first = store.load();

        // Second cycle: more balances, prices down.
        let provider = FakeProvider {
            balances: Some(vec![
                json!({"ADDRESS": "A", "DATE": "2022-01-02", "BALANCE_TYPE": "liquid", "CURRENCY": "uosmo", "BALANCE": 100}),
                json!({"ADDRESS": "B", "DATE": "2022-01-02", "BALANCE_TYPE": "liquid", "CURRENCY": "uosmo", "BALANCE": 50}),
                json!({"ADDRESS": "C", "DATE": "2022-01-02", "BALANCE_TYPE": "liquid", "CURRENCY": "uosmo", "BALANCE": 1}),
            ]),
            prices: None,
        };
        let summary = run_refresh_once(&provider, &store, "uosmo").await;
        assert!(!summary.quantity_carried_over);
        assert!(summary.usd_carried_over);

        let views = store.load();
        // Quantity views moved to the new day.
        assert_eq!(views.active_wallets(BalanceType::Liquid), Some(3));
        // USD views are the previous cycle's, untouched.
        assert!(Arc::ptr_eq(&views.usd, &first.usd));
        assert_eq!(
            views.balance_total(BalanceType::Liquid),
            Some(Decimal::from(300))
        );
    }

    #[tokio::test]
    async fn test_balances_failure_carries_everything() {
        let store = SnapshotStore::new();
        let provider = FakeProvider {
            balances: Some(balance_rows()),
            prices: Some(price_rows()),
        };
        run_refresh_once(&provider, &store, "uosmo").await;
        let first = store.load();

        let provider = FakeProvider {
            balances: None,
            prices: Some(price_rows()),
        };
        let summary = run_refresh_once(&provider, &store, "uosmo").await;
        assert!(summary.quantity_carried_over);
        assert!(summary.usd_carried_over);

        let views = store.load();
        assert!(Arc::ptr_eq(&views.quantity, &first.quantity));
        assert!(Arc::ptr_eq(&views.usd, &first.usd));
    }

    #[tokio::test]
    async fn test_empty_snapshot_is_a_valid_refresh() {
        let store = SnapshotStore::new();
        let provider = FakeProvider {
            balances: Some(Vec::new()),
            prices: Some(Vec::new()),
        };
        let summary = run_refresh_once(&provider, &store, "uosmo").await;
        assert!(summary.fully_refreshed());
        assert_eq!(summary.balance_rows, 0);
        assert_eq!(store.load().latest_date(), None);
    }

    #[tokio::test]
    async fn test_invalid_rows_drop_but_refresh_continues() {
        let store = SnapshotStore::new();
        let provider = FakeProvider {
            balances: Some(vec![
                json!({"ADDRESS": "A", "DATE": "2022-01-01", "BALANCE_TYPE": "mystery", "CURRENCY": "uosmo", "BALANCE": 100}),
                json!({"ADDRESS": "B", "DATE": "2022-01-01", "BALANCE_TYPE": "liquid", "CURRENCY": "uosmo", "BALANCE": "12.5"}),
            ]),
            prices: Some(price_rows()),
        };
        let summary = run_refresh_once(&provider, &store, "uosmo").await;
        assert!(summary.fully_refreshed());
        assert_eq!(summary.balance_rows, 1);
        assert_eq!(summary.balance_violations, 1);

        let views = store.load();
        assert_eq!(views.active_wallets(BalanceType::Liquid), Some(1));
        assert_eq!(
            views.balance_total(BalanceType::Liquid),
            Some(Decimal::from_str("25.0").unwrap())
        );
    }
}
