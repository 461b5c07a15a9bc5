//! Price join: balance quantities against the daily price table.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use common::types::{BalanceRecord, PriceRecord, ValuedBalance};

/// Daily close prices keyed by denom and date. Built once per refresh from
/// the prices snapshot.
#[derive(Debug, Default, Clone)]
pub struct PriceTable {
    by_denom: HashMap<String, HashMap<NaiveDate, Decimal>>,
    len: usize,
}

impl PriceTable {
    /// At most one price per (denom, date); like the decode step, the first
    /// occurrence wins and later duplicates are ignored.
    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = PriceRecord>,
    {
        let mut table = Self::default();
        for r in records {
            let days = table.by_denom.entry(r.denom).or_default();
            if let Entry::Vacant(slot) = days.entry(r.date) {
                slot.insert(r.price_usd);
                table.len += 1;
            }
        }
        table
    }

    pub fn get(&self, denom: &str, date: NaiveDate) -> Option<Decimal> {
        self.by_denom.get(denom)?.get(&date).copied()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Joins one observation against the price table. No price for (denom, date)
/// leaves `balance_usd` unset; the record keeps contributing to quantity
/// aggregates but never to USD ones.
pub fn value_balance(record: &BalanceRecord, prices: &PriceTable) -> ValuedBalance {
    let balance_usd = prices
        .get(&record.denom, record.date)
        .map(|price| record.quantity * price);
    ValuedBalance {
        wallet_address: record.wallet_address.clone(),
        denom: record.denom.clone(),
        date: record.date,
        balance_type: record.balance_type,
        quantity: record.quantity,
        balance_usd,
    }
}

pub fn value_balances(records: &[BalanceRecord], prices: &PriceTable) -> Vec<ValuedBalance> {
    records.iter().map(|r| value_balance(r, prices)).collect()
}
