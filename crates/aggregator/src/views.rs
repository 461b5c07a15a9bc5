//! Immutable per-refresh view sets and the store that swaps them.
//!
//! A `ViewSet` is a pure function of one decoded snapshot. Consumers only
//! ever see a complete set; the store replaces the whole `Arc` at once, so a
//! reader can never observe a partially updated mix of aggregates.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

use common::types::{BalanceRecord, BalanceType, EntityKind, RankMetric, ValuedBalance};

use crate::aggregate::{self, AvgSplit, FocusSummary, RankedEntity};
use crate::valuation::{value_balances, PriceTable};

/// Views derivable from the balances snapshot alone (no price join):
/// active-wallet counts, quantity rankings, focus-denom quantity metrics.
#[derive(Debug)]
pub struct QuantityViews {
    built_at: DateTime<Utc>,
    records: Vec<BalanceRecord>,
    active_wallets: BTreeMap<(NaiveDate, BalanceType), u64>,
    latest: Option<NaiveDate>,
    focus: FocusSummary,
}

impl QuantityViews {
    pub fn build(records: Vec<BalanceRecord>, focus_denom: &str) -> Self {
        let active_wallets = aggregate::active_wallet_counts(&records);
        let latest = aggregate::latest_date(records.iter().map(|r| &r.date));
        let focus = aggregate::focus_summary(&records, focus_denom);
        Self {
            built_at: Utc::now(),
            records,
            active_wallets,
            latest,
            focus,
        }
    }

    pub fn empty() -> Self {
        Self::build(Vec::new(), "")
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }
}

/// Views that need the price join: USD totals, USD rankings, focus-denom USD
/// shares and the focus-vs-other average split.
#[derive(Debug)]
pub struct UsdViews {
    built_at: DateTime<Utc>,
    valued: Vec<ValuedBalance>,
    totals_by_day: BTreeMap<(NaiveDate, BalanceType), Decimal>,
    latest: Option<NaiveDate>,
    focus_share: BTreeMap<BalanceType, Decimal>,
    focus_series: BTreeMap<(NaiveDate, BalanceType), Decimal>,
    avg_split: BTreeMap<NaiveDate, AvgSplit>,
}

impl UsdViews {
    pub fn build(records: &[BalanceRecord], prices: &PriceTable, focus_denom: &str) -> Self {
        let valued = value_balances(records, prices);
        let totals_by_day = aggregate::usd_totals_by_day(&valued);
        let latest = aggregate::latest_date(valued.iter().map(|r| &r.date));
        let focus_share = aggregate::focus_usd_by_type(&valued, focus_denom);
        let focus_series = aggregate::focus_usd_series(&valued, focus_denom);
        let avg_split = aggregate::avg_balance_split(&valued, focus_denom);
        Self {
            built_at: Utc::now(),
            valued,
            totals_by_day,
            latest,
            focus_share,
            focus_series,
            avg_split,
        }
    }

    pub fn empty() -> Self {
        Self::build(&[], &PriceTable::default(), "")
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }
}

/// The complete set of aggregates for one refresh cycle. The quantity and
/// USD halves can come from different cycles when a dataset fetch failed and
/// its views were carried over.
#[derive(Debug, Clone)]
pub struct ViewSet {
    pub quantity: Arc<QuantityViews>,
    pub usd: Arc<UsdViews>,
}

impl ViewSet {
    pub fn empty() -> Self {
        Self {
            quantity: Arc::new(QuantityViews::empty()),
            usd: Arc::new(UsdViews::empty()),
        }
    }

    /// Active wallets for a balance type on the most recent day in the
    /// snapshot. `None` means no data at all for that type.
    pub fn active_wallets(&self, balance_type: BalanceType) -> Option<u64> {
        let latest = self.quantity.latest?;
        self.quantity
            .active_wallets
            .get(&(latest, balance_type))
            .copied()
    }

    pub fn active_wallet_series(&self, balance_type: BalanceType) -> Vec<(NaiveDate, u64)> {
        self.quantity
            .active_wallets
            .iter()
            .filter(|((_, bt), _)| *bt == balance_type)
            .map(|((date, _), count)| (*date, *count))
            .collect()
    }

    /// Latest USD total for a balance type. `None` means the type has no
    /// records on the latest day; a `Some(0)` means records exist but none
    /// were valuable.
    pub fn balance_total(&self, balance_type: BalanceType) -> Option<Decimal> {
        let latest = self.usd.latest?;
        self.usd.totals_by_day.get(&(latest, balance_type)).copied()
    }

    pub fn balance_series(&self, balance_type: BalanceType) -> Vec<(NaiveDate, Decimal)> {
        self.usd
            .totals_by_day
            .iter()
            .filter(|((_, bt), _)| *bt == balance_type)
            .map(|((date, _), total)| (*date, *total))
            .collect()
    }

    /// Top-K ranking; `k` is caller-supplied, the window is whatever the
    /// fetched snapshot covers. `balance_type` restricts the ranking to one
    /// classification (top pools by locked liquidity, top wallets by staked
    /// balance); `None` ranks across all four.
    pub fn top_k(
        &self,
        kind: EntityKind,
        metric: RankMetric,
        balance_type: Option<BalanceType>,
        k: usize,
    ) -> Vec<RankedEntity> {
        match metric {
            RankMetric::BalanceUsd => {
                aggregate::top_k_by_usd(&self.usd.valued, kind, balance_type, k)
            }
            RankMetric::Quantity => {
                aggregate::top_k_by_quantity(&self.quantity.records, kind, balance_type, k)
            }
            RankMetric::WalletCount => {
                aggregate::top_k_by_wallet_count(&self.quantity.records, kind, balance_type, k)
            }
        }
    }

    pub fn focus_summary(&self) -> &FocusSummary {
        &self.quantity.focus
    }

    pub fn focus_usd_share(&self) -> &BTreeMap<BalanceType, Decimal> {
        &self.usd.focus_share
    }

    pub fn focus_usd_series(&self) -> &BTreeMap<(NaiveDate, BalanceType), Decimal> {
        &self.usd.focus_series
    }

    pub fn avg_balance_split(&self) -> &BTreeMap<NaiveDate, AvgSplit> {
        &self.usd.avg_split
    }

    pub fn latest_date(&self) -> Option<NaiveDate> {
        self.quantity.latest.max(self.usd.latest)
    }
}

/// Current view set, replaced wholesale on each successful refresh.
pub struct SnapshotStore {
    current: RwLock<Arc<ViewSet>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(ViewSet::empty())),
        }
    }

    pub fn load(&self) -> Arc<ViewSet> {
        // Only an Arc lives behind the lock, so a poisoned lock is still
        // readable.
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn swap(&self, next: ViewSet) {
        let next = Arc::new(next);
        match self.current.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::types::PriceRecord;
    use std::str::FromStr;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2022, 1, d).unwrap()
    }

    fn rec(wallet: &str, denom: &str, d: u32, bt: BalanceType, qty: &str) -> BalanceRecord {
        BalanceRecord {
            wallet_address: wallet.to_string(),
            denom: denom.to_string(),
            date: day(d),
            balance_type: bt,
            quantity: Decimal::from_str(qty).unwrap(),
        }
    }

    fn sample_viewset() -> ViewSet {
        let records = vec![
            rec("A", "uosmo", 1, BalanceType::Liquid, "100"),
            rec("B", "uosmo", 1, BalanceType::Liquid, "50"),
            rec("A", "uosmo", 2, BalanceType::Liquid, "100"),
            rec("A", "gamm/pool/1", 2, BalanceType::LockedLiquidity, "10"),
        ];
        let prices = PriceTable::from_records(vec![
            PriceRecord {
                denom: "uosmo".to_string(),
                date: day(1),
                price_usd: Decimal::from(2),
            },
            PriceRecord {
                denom: "uosmo".to_string(),
                date: day(2),
                price_usd: Decimal::from(3),
            },
        ]);
        let usd = UsdViews::build(&records, &prices, "uosmo");
        let quantity = QuantityViews::build(records, "uosmo");
        ViewSet {
            quantity: Arc::new(quantity),
            usd: Arc::new(usd),
        }
    }

    #[test]
    fn test_latest_accessors_use_snapshot_max_date() {
        let views = sample_viewset();
        assert_eq!(views.latest_date(), Some(day(2)));
        assert_eq!(views.active_wallets(BalanceType::Liquid), Some(1));
        assert_eq!(
            views.balance_total(BalanceType::Liquid),
            Some(Decimal::from(300))
        );
        // Pool share has no price on day 2: present with a zero USD total.
        assert_eq!(
            views.balance_total(BalanceType::LockedLiquidity),
            Some(Decimal::ZERO)
        );
        assert_eq!(views.balance_total(BalanceType::Staked), None);
    }

    #[test]
    fn test_series_are_date_ordered() {
        let views = sample_viewset();
        let series = views.active_wallet_series(BalanceType::Liquid);
        assert_eq!(series, vec![(day(1), 2), (day(2), 1)]);

        let totals = views.balance_series(BalanceType::Liquid);
        assert_eq!(
            totals,
            vec![
                (day(1), Decimal::from(300)),
                (day(2), Decimal::from(300)),
            ]
        );
    }

    #[test]
    fn test_top_k_dispatches_by_metric() {
        let views = sample_viewset();
        let by_usd = views.top_k(EntityKind::Wallet, RankMetric::BalanceUsd, None, 1);
        assert_eq!(by_usd[0].entity_id, "A");

        let pools = views.top_k(EntityKind::Pool, RankMetric::Quantity, None, 5);
        assert_eq!(pools.len(), 1);
        assert_eq!(pools[0].entity_id, "1");

        let tokens = views.top_k(EntityKind::Token, RankMetric::WalletCount, None, 5);
        assert_eq!(tokens[0].entity_id, "uosmo");
    }

    #[test]
    fn test_top_k_scopes_to_a_balance_type() {
        let views = sample_viewset();
        let locked = views.top_k(
            EntityKind::Pool,
            RankMetric::Quantity,
            Some(BalanceType::LockedLiquidity),
            5,
        );
        assert_eq!(locked.len(), 1);
        assert_eq!(locked[0].entity_id, "1");

        // No pool shares are held as liquid balances in this snapshot.
        let liquid = views.top_k(
            EntityKind::Pool,
            RankMetric::Quantity,
            Some(BalanceType::Liquid),
            5,
        );
        assert!(liquid.is_empty());
    }

    #[test]
    fn test_empty_viewset_answers_none_everywhere() {
        let views = ViewSet::empty();
        assert_eq!(views.active_wallets(BalanceType::Liquid), None);
        assert_eq!(views.balance_total(BalanceType::Staked), None);
        assert!(views.top_k(EntityKind::Wallet, RankMetric::BalanceUsd, None, 10).is_empty());
        assert_eq!(views.focus_summary().wallet_count, 0);
    }

    #[test]
    fn test_store_swap_replaces_whole_set() {
        let store = SnapshotStore::new();
        let before = store.load();
        assert_eq!(before.latest_date(), None);

        store.swap(sample_viewset());
        let after = store.load();
        assert_eq!(after.latest_date(), Some(day(2)));

        // The handle loaded before the swap still sees the old complete set.
        assert_eq!(before.latest_date(), None);
    }
}
