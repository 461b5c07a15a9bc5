//! The four aggregate views: active-wallet counts, USD balance totals,
//! top-K rankings, and the derived token-focus metrics.
//!
//! Everything here is a pure function of the decoded snapshot. Sums run in
//! `Decimal`, so accumulation order cannot move the result.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::NaiveDate;
use rust_decimal::Decimal;

use serde::Serialize;

use common::error::DivisionUndefined;
use common::types::{pool_id_from_denom, BalanceRecord, BalanceType, EntityKind, ValuedBalance};

/// Distinct wallets with a positive quantity, per day and balance type.
/// Zero and negative quantities (corrections) are not "active"; a wallet
/// holding several tokens under the same type on one day counts once.
pub fn active_wallet_counts(
    records: &[BalanceRecord],
) -> BTreeMap<(NaiveDate, BalanceType), u64> {
    let mut wallets: BTreeMap<(NaiveDate, BalanceType), HashSet<&str>> = BTreeMap::new();
    for r in records {
        if r.quantity > Decimal::ZERO {
            wallets
                .entry((r.date, r.balance_type))
                .or_default()
                .insert(r.wallet_address.as_str());
        }
    }
    wallets
        .into_iter()
        .map(|(key, set)| (key, set.len() as u64))
        .collect()
}

/// USD totals per day and balance type, summed over valued records only.
/// A group whose records are all unvaluable still appears with a zero total;
/// that is distinguishable from the group not existing at all.
pub fn usd_totals_by_day(
    records: &[ValuedBalance],
) -> BTreeMap<(NaiveDate, BalanceType), Decimal> {
    let mut totals: BTreeMap<(NaiveDate, BalanceType), Decimal> = BTreeMap::new();
    for r in records {
        let entry = totals.entry((r.date, r.balance_type)).or_default();
        if let Some(usd) = r.balance_usd {
            *entry += usd;
        }
    }
    totals
}

/// The most recent day present in the snapshot. "Latest" always means this,
/// never wall-clock today: the warehouse lags up to 12 hours.
pub fn latest_date<'a, I>(dates: I) -> Option<NaiveDate>
where
    I: IntoIterator<Item = &'a NaiveDate>,
{
    dates.into_iter().max().copied()
}

/// One entry of a top-K ranking. `rank` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedEntity {
    pub entity_id: String,
    pub value: Decimal,
    pub rank: u32,
}

fn entity_id(kind: EntityKind, wallet: &str, denom: &str) -> Option<String> {
    match kind {
        EntityKind::Wallet => Some(wallet.to_string()),
        EntityKind::Token => Some(denom.to_string()),
        // Only GAMM share denoms identify a pool.
        EntityKind::Pool => pool_id_from_denom(denom).map(str::to_string),
    }
}

/// Sort descending by value with a deterministic entity-id tie-break, then
/// truncate. |result| = min(k, distinct entities).
fn rank_and_truncate(sums: HashMap<String, Decimal>, k: usize) -> Vec<RankedEntity> {
    let mut rows: Vec<(String, Decimal)> = sums.into_iter().collect();
    rows.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    rows.truncate(k);
    rows.into_iter()
        .enumerate()
        .map(|(i, (entity_id, value))| RankedEntity {
            entity_id,
            value,
            rank: i as u32 + 1,
        })
        .collect()
}

fn in_scope(record_type: BalanceType, scope: Option<BalanceType>) -> bool {
    scope.map_or(true, |bt| bt == record_type)
}

/// Top K entities by summed USD balance, optionally scoped to one balance
/// type. Records without a valuation are excluded from USD rankings entirely.
pub fn top_k_by_usd(
    records: &[ValuedBalance],
    kind: EntityKind,
    balance_type: Option<BalanceType>,
    k: usize,
) -> Vec<RankedEntity> {
    let mut sums: HashMap<String, Decimal> = HashMap::new();
    for r in records {
        if !in_scope(r.balance_type, balance_type) {
            continue;
        }
        let Some(usd) = r.balance_usd else { continue };
        let Some(id) = entity_id(kind, &r.wallet_address, &r.denom) else {
            continue;
        };
        *sums.entry(id).or_default() += usd;
    }
    rank_and_truncate(sums, k)
}

/// Top K entities by summed raw quantity; works without a price join.
pub fn top_k_by_quantity(
    records: &[BalanceRecord],
    kind: EntityKind,
    balance_type: Option<BalanceType>,
    k: usize,
) -> Vec<RankedEntity> {
    let mut sums: HashMap<String, Decimal> = HashMap::new();
    for r in records {
        if !in_scope(r.balance_type, balance_type) {
            continue;
        }
        let Some(id) = entity_id(kind, &r.wallet_address, &r.denom) else {
            continue;
        };
        *sums.entry(id).or_default() += r.quantity;
    }
    rank_and_truncate(sums, k)
}

/// Top K entities by distinct holding wallets (quantity > 0).
pub fn top_k_by_wallet_count(
    records: &[BalanceRecord],
    kind: EntityKind,
    balance_type: Option<BalanceType>,
    k: usize,
) -> Vec<RankedEntity> {
    let mut wallets: HashMap<String, HashSet<&str>> = HashMap::new();
    for r in records {
        if r.quantity <= Decimal::ZERO || !in_scope(r.balance_type, balance_type) {
            continue;
        }
        let Some(id) = entity_id(kind, &r.wallet_address, &r.denom) else {
            continue;
        };
        wallets.entry(id).or_default().insert(r.wallet_address.as_str());
    }
    let sums = wallets
        .into_iter()
        .map(|(id, set)| (id, Decimal::from(set.len())))
        .collect();
    rank_and_truncate(sums, k)
}

/// Ratio with an explicit undefined case; callers surface this as
/// "unavailable", never as zero.
pub fn safe_div(numerator: Decimal, denominator: Decimal) -> Result<Decimal, DivisionUndefined> {
    if denominator.is_zero() {
        Err(DivisionUndefined)
    } else {
        Ok(numerator / denominator)
    }
}

/// Headline metrics for the configured focus denom: how many wallets hold it
/// in any balance type, how much of it is held, and the average per wallet.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct FocusSummary {
    pub wallet_count: u64,
    pub total_quantity: Decimal,
    pub avg_quantity_per_wallet: Option<Decimal>,
}

pub fn focus_summary(records: &[BalanceRecord], focus_denom: &str) -> FocusSummary {
    let mut wallets: HashSet<&str> = HashSet::new();
    let mut total = Decimal::ZERO;
    for r in records {
        if r.denom != focus_denom {
            continue;
        }
        total += r.quantity;
        if r.quantity > Decimal::ZERO {
            wallets.insert(r.wallet_address.as_str());
        }
    }
    let wallet_count = wallets.len() as u64;
    FocusSummary {
        wallet_count,
        total_quantity: total,
        avg_quantity_per_wallet: safe_div(total, Decimal::from(wallet_count)).ok(),
    }
}

/// Focus-denom USD totals split by balance type at the latest day the focus
/// denom appears. Feeds the balance-type share view.
pub fn focus_usd_by_type(
    records: &[ValuedBalance],
    focus_denom: &str,
) -> BTreeMap<BalanceType, Decimal> {
    let focus: Vec<&ValuedBalance> = records.iter().filter(|r| r.denom == focus_denom).collect();
    let Some(latest) = latest_date(focus.iter().map(|r| &r.date)) else {
        return BTreeMap::new();
    };
    let mut totals: BTreeMap<BalanceType, Decimal> = BTreeMap::new();
    for r in focus.iter().filter(|r| r.date == latest) {
        let entry = totals.entry(r.balance_type).or_default();
        if let Some(usd) = r.balance_usd {
            *entry += usd;
        }
    }
    totals
}

/// Daily focus-denom USD totals per balance type (the share-over-time view).
pub fn focus_usd_series(
    records: &[ValuedBalance],
    focus_denom: &str,
) -> BTreeMap<(NaiveDate, BalanceType), Decimal> {
    let mut totals: BTreeMap<(NaiveDate, BalanceType), Decimal> = BTreeMap::new();
    for r in records.iter().filter(|r| r.denom == focus_denom) {
        let entry = totals.entry((r.date, r.balance_type)).or_default();
        if let Some(usd) = r.balance_usd {
            *entry += usd;
        }
    }
    totals
}

/// Average USD balance per wallet, focus denom vs. everything else, per day.
/// Either side is unavailable when no wallet holds that side that day.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct AvgSplit {
    pub avg_focus_usd: Option<Decimal>,
    pub avg_other_usd: Option<Decimal>,
}

pub fn avg_balance_split(
    records: &[ValuedBalance],
    focus_denom: &str,
) -> BTreeMap<NaiveDate, AvgSplit> {
    struct Side<'a> {
        usd: Decimal,
        wallets: HashSet<&'a str>,
    }
    let mut days: BTreeMap<NaiveDate, (Side<'_>, Side<'_>)> = BTreeMap::new();

    for r in records {
        let Some(usd) = r.balance_usd else { continue };
        let (focus, other) = days.entry(r.date).or_insert_with(|| {
            (
                Side {
                    usd: Decimal::ZERO,
                    wallets: HashSet::new(),
                },
                Side {
                    usd: Decimal::ZERO,
                    wallets: HashSet::new(),
                },
            )
        });
        let side = if r.denom == focus_denom { focus } else { other };
        side.usd += usd;
        side.wallets.insert(r.wallet_address.as_str());
    }

    days.into_iter()
        .map(|(date, (focus, other))| {
            let split = AvgSplit {
                avg_focus_usd: safe_div(focus.usd, Decimal::from(focus.wallets.len())).ok(),
                avg_other_usd: safe_div(other.usd, Decimal::from(other.wallets.len())).ok(),
            };
            (date, split)
        })
        .collect()
}
