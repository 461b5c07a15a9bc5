//! Row-level decode of provider snapshots into typed records.
//!
//! The provider contract is column-oriented and case-sensitive; a row that is
//! missing a required column, carries an unusable value, or repeats a key is
//! dropped with a recorded violation. Decoding never fails wholesale: the
//! valid remainder always flows on to aggregation.

use std::collections::HashSet;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::Value;

use common::error::SchemaViolation;
use common::types::{BalanceRecord, BalanceType, PriceRecord};

pub const COL_ADDRESS: &str = "ADDRESS";
pub const COL_DATE: &str = "DATE";
pub const COL_BALANCE_TYPE: &str = "BALANCE_TYPE";
pub const COL_CURRENCY: &str = "CURRENCY";
pub const COL_BALANCE: &str = "BALANCE";
pub const COL_PRICE: &str = "PRICE";

#[derive(Debug)]
pub struct DecodeReport<T> {
    pub records: Vec<T>,
    pub violations: Vec<SchemaViolation>,
}

impl<T> DecodeReport<T> {
    fn new() -> Self {
        Self {
            records: Vec::new(),
            violations: Vec::new(),
        }
    }
}

/// Decodes the balances dataset. Enforces the uniqueness invariant: at most
/// one record per (wallet, denom, date, balance type); later duplicates are
/// dropped as violations.
pub fn decode_balances(rows: &[Value]) -> DecodeReport<BalanceRecord> {
    let mut report = DecodeReport::new();
    let mut seen: HashSet<(String, String, NaiveDate, BalanceType)> = HashSet::new();

    for row in rows {
        let record: Result<BalanceRecord, SchemaViolation> = (|| {
            let wallet_address = req_str(row, COL_ADDRESS)?.to_string();
            let date = req_date(row, COL_DATE)?;
            let balance_type = req_balance_type(row)?;
            let denom = req_str(row, COL_CURRENCY)?.to_string();
            let quantity = req_decimal(row, COL_BALANCE)?;
            Ok(BalanceRecord {
                wallet_address,
                denom,
                date,
                balance_type,
                quantity,
            })
        })();

        match record {
            Ok(r) => {
                let key = (
                    r.wallet_address.clone(),
                    r.denom.clone(),
                    r.date,
                    r.balance_type,
                );
                if seen.insert(key) {
                    report.records.push(r);
                } else {
                    report.violations.push(SchemaViolation::DuplicateRecord(format!(
                        "({}, {}, {}, {})",
                        r.wallet_address,
                        r.denom,
                        r.date,
                        r.balance_type.as_str()
                    )));
                }
            }
            Err(v) => report.violations.push(v),
        }
    }

    report
}

/// Decodes the prices dataset. One price per (denom, date); negative prices
/// violate the schema contract and are dropped.
pub fn decode_prices(rows: &[Value]) -> DecodeReport<PriceRecord> {
    let mut report = DecodeReport::new();
    let mut seen: HashSet<(String, NaiveDate)> = HashSet::new();

    for row in rows {
        let record: Result<PriceRecord, SchemaViolation> = (|| {
            let denom = req_str(row, COL_CURRENCY)?.to_string();
            let date = req_date(row, COL_DATE)?;
            let price_usd = req_decimal(row, COL_PRICE)?;
            if price_usd < Decimal::ZERO {
                return Err(SchemaViolation::BadValue {
                    column: COL_PRICE,
                    value: price_usd.to_string(),
                });
            }
            Ok(PriceRecord {
                denom,
                date,
                price_usd,
            })
        })();

        match record {
            Ok(r) => {
                if seen.insert((r.denom.clone(), r.date)) {
                    report.records.push(r);
                } else {
                    report.violations.push(SchemaViolation::DuplicateRecord(format!(
                        "({}, {})",
                        r.denom, r.date
                    )));
                }
            }
            Err(v) => report.violations.push(v),
        }
    }

    report
}

/// Warn-logs and counts violations for a dataset. Individual violations go to
/// debug so a noisy snapshot cannot flood the log.
pub fn report_violations(dataset: &'static str, violations: &[SchemaViolation]) {
    if violations.is_empty() {
        return;
    }
    metrics::counter!("aggregator_schema_violations_total", "dataset" => dataset)
        .increment(violations.len() as u64);
    tracing::warn!(
        dataset,
        dropped = violations.len(),
        first = %violations[0],
        "dropped rows violating the dataset schema"
    );
    for v in violations {
        tracing::debug!(dataset, violation = %v, "schema violation");
    }
}

fn req_field<'a>(row: &'a Value, column: &'static str) -> Result<&'a Value, SchemaViolation> {
    match row.get(column) {
        None | Some(Value::Null) => Err(SchemaViolation::MissingColumn(column)),
        Some(v) => Ok(v),
    }
}

fn req_str<'a>(row: &'a Value, column: &'static str) -> Result<&'a str, SchemaViolation> {
    let v = req_field(row, column)?;
    v.as_str()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| SchemaViolation::BadValue {
            column,
            value: v.to_string(),
        })
}

/// Numeric columns arrive either as JSON numbers or as decimal strings.
/// Numbers go through their exact serde_json text form, so no float detour.
fn req_decimal(row: &Value, column: &'static str) -> Result<Decimal, SchemaViolation> {
    let v = req_field(row, column)?;
    let text = match v {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        _ => {
            return Err(SchemaViolation::BadValue {
                column,
                value: v.to_string(),
            })
        }
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|_| SchemaViolation::BadValue {
            column,
            value: text,
        })
}

fn req_balance_type(row: &Value) -> Result<BalanceType, SchemaViolation> {
    let s = req_str(row, COL_BALANCE_TYPE)?;
    BalanceType::parse(s).ok_or_else(|| SchemaViolation::UnknownBalanceType(s.to_string()))
}

/// Dates arrive as `YYYY-MM-DD`, sometimes with a trailing timestamp
/// (`2022-01-02T00:00:00.000Z`); only the day part matters here. The value is
/// untrusted, so the prefix is taken with `get` (a non-boundary index means
/// the row is garbage and falls through to the parse error).
fn req_date(row: &Value, column: &'static str) -> Result<NaiveDate, SchemaViolation> {
    let s = req_str(row, column)?;
    let day = s.get(..10).unwrap_or(s);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").map_err(|_| SchemaViolation::BadValue {
        column,
        value: s.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fixture_balances() -> Vec<Value> {
        serde_json::from_str(include_str!("../../../tests/fixtures/balances_sample.json")).unwrap()
    }

    #[test]
    fn test_decode_fixture_balances() {
        let report = decode_balances(&fixture_balances());
        assert_eq!(report.records.len(), 5);
        assert!(report.violations.is_empty());

        let r = &report.records[0];
        assert_eq!(r.wallet_address, "osmo1qy3e8w");
        assert_eq!(r.balance_type, BalanceType::Liquid);
        assert_eq!(r.quantity, Decimal::from(100));
    }

    #[test]
    fn test_decode_accepts_timestamp_dates_and_string_balances() {
        let report = decode_balances(&fixture_balances());
        let r = report
            .records
            .iter()
            .find(|r| r.wallet_address == "osmo1m7k2cd")
            .unwrap();
        assert_eq!(r.date, NaiveDate::from_ymd_opt(2022, 1, 2).unwrap());
        assert_eq!(r.quantity, Decimal::from_str("3.75").unwrap());
    }

    #[test]
    fn test_unknown_balance_type_is_dropped_not_coerced() {
        let rows = vec![json!({
            "ADDRESS": "osmo1a", "DATE": "2022-01-01",
            "BALANCE_TYPE": "bonded", "CURRENCY": "uosmo", "BALANCE": 1
        })];
        let report = decode_balances(&rows);
        assert!(report.records.is_empty());
        assert_eq!(
            report.violations,
            vec![SchemaViolation::UnknownBalanceType("bonded".to_string())]
        );
    }

    #[test]
    fn test_missing_column_is_a_violation() {
        let rows = vec![json!({
            "ADDRESS": "osmo1a", "DATE": "2022-01-01",
            "CURRENCY": "uosmo", "BALANCE": 1
        })];
        let report = decode_balances(&rows);
        assert_eq!(
            report.violations,
            vec![SchemaViolation::MissingColumn(COL_BALANCE_TYPE)]
        );
    }

    #[test]
    fn test_bad_row_does_not_poison_the_rest() {
        let rows = vec![
            json!({"ADDRESS": "osmo1a", "DATE": "not-a-date", "BALANCE_TYPE": "liquid", "CURRENCY": "uosmo", "BALANCE": 1}),
            json!({"ADDRESS": "osmo1b", "DATE": "2022-01-01", "BALANCE_TYPE": "liquid", "CURRENCY": "uosmo", "BALANCE": 2}),
        ];
        let report = decode_balances(&rows);
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].wallet_address, "osmo1b");
        assert_eq!(report.violations.len(), 1);
    }

    #[test]
    fn test_multibyte_date_row_is_dropped_not_panicking() {
        // 10th byte lands inside the two-byte 'é'; the row must degrade to a
        // violation, not abort the decode.
        let rows = vec![
            json!({"ADDRESS": "osmo1a", "DATE": "2022-01-0é", "BALANCE_TYPE": "liquid", "CURRENCY": "uosmo", "BALANCE": 1}),
            json!({"ADDRESS": "osmo1b", "DATE": "2022-01-01", "BALANCE_TYPE": "liquid", "CURRENCY": "uosmo", "BALANCE": 2}),
        ];
        let report = decode_balances(&rows);
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].wallet_address, "osmo1b");
        assert_eq!(
            report.violations,
            vec![SchemaViolation::BadValue {
                column: COL_DATE,
                value: "2022-01-0é".to_string(),
            }]
        );
    }

    #[test]
    fn test_duplicate_balance_key_is_dropped() {
        let row = json!({"ADDRESS": "osmo1a", "DATE": "2022-01-01", "BALANCE_TYPE": "liquid", "CURRENCY": "uosmo", "BALANCE": 5});
        let report = decode_balances(&[row.clone(), row]);
        assert_eq!(report.records.len(), 1);
        assert!(matches!(
            report.violations[0],
            SchemaViolation::DuplicateRecord(_)
        ));
    }

    #[test]
    fn test_decode_prices_rejects_negative() {
        let rows = vec![
            json!({"CURRENCY": "uosmo", "DATE": "2022-01-01", "PRICE": -1.0}),
            json!({"CURRENCY": "uosmo", "DATE": "2022-01-02", "PRICE": 2.0}),
        ];
        let report = decode_prices(&rows);
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].date, NaiveDate::from_ymd_opt(2022, 1, 2).unwrap());
        assert_eq!(report.violations.len(), 1);
    }

    #[test]
    fn test_decode_prices_one_per_denom_day() {
        let rows = vec![
            json!({"CURRENCY": "uosmo", "DATE": "2022-01-01", "PRICE": 2.0}),
            json!({"CURRENCY": "uosmo", "DATE": "2022-01-01", "PRICE": 3.0}),
        ];
        let report = decode_prices(&rows);
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].price_usd, Decimal::from(2));
    }

    #[test]
    fn test_empty_snapshot_is_valid() {
        let report = decode_balances(&[]);
        assert!(report.records.is_empty());
        assert!(report.violations.is_empty());
    }
}
