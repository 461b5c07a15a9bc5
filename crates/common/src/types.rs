use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

/// The four balance classifications the warehouse attaches to daily balance
/// observations. Wire spellings use spaces (`locked liquidity`); the stable
/// identifiers exposed to consumers use underscores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceType {
    Liquid,
    LockedLiquidity,
    Staked,
    SuperfluidStaked,
}

impl BalanceType {
    pub const ALL: [BalanceType; 4] = [
        Self::Liquid,
        Self::LockedLiquidity,
        Self::Staked,
        Self::SuperfluidStaked,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Liquid => "liquid",
            Self::LockedLiquidity => "locked_liquidity",
            Self::Staked => "staked",
            Self::SuperfluidStaked => "superfluid_staked",
        }
    }

    /// Accepts both the warehouse spelling and the underscore identifier.
    /// Anything else is an unrecognized type and must be rejected, never
    /// coerced.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "liquid" => Some(Self::Liquid),
            "locked liquidity" | "locked_liquidity" => Some(Self::LockedLiquidity),
            "staked" => Some(Self::Staked),
            "superfluid staked" | "superfluid_staked" => Some(Self::SuperfluidStaked),
            _ => None,
        }
    }
}

/// One validated per-wallet, per-token, per-day balance observation.
/// Immutable once decoded; the engine only derives views from these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceRecord {
    pub wallet_address: String,
    pub denom: String,
    pub date: NaiveDate,
    pub balance_type: BalanceType,
    pub quantity: Decimal,
}

/// One validated daily closing price. At most one per (denom, date).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceRecord {
    pub denom: String,
    pub date: NaiveDate,
    pub price_usd: Decimal,
}

/// A balance observation joined against the daily price table.
/// `balance_usd` is `None` when no price exists for (denom, date); such a
/// record still counts toward quantity aggregates but never toward USD ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValuedBalance {
    pub wallet_address: String,
    pub denom: String,
    pub date: NaiveDate,
    pub balance_type: BalanceType,
    pub quantity: Decimal,
    pub balance_usd: Option<Decimal>,
}

/// Entity dimension for top-K rankings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Wallet,
    Pool,
    Token,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wallet => "wallet",
            Self::Pool => "pool",
            Self::Token => "token",
        }
    }
}

/// Metric a top-K ranking is ordered by. USD requires a successful price
/// join; quantity and wallet-count rankings work without prices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankMetric {
    BalanceUsd,
    Quantity,
    WalletCount,
}

impl RankMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BalanceUsd => "balance_usd",
            Self::Quantity => "quantity",
            Self::WalletCount => "wallet_count",
        }
    }
}

/// Pool id recovered from a GAMM share denom (`gamm/pool/{id}`); non-pool
/// denoms don't participate in pool rankings.
pub fn pool_id_from_denom(denom: &str) -> Option<&str> {
    let id = denom.strip_prefix("gamm/pool/")?;
    if !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()) {
        Some(id)
    } else {
        None
    }
}
