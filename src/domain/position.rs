//! Share positions derived from the append-only holding log.

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

use super::error::PortfolioError;
use super::money::trade_value;

/// One signed share movement: positive for a buy, negative for a sell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HoldingRecord {
    #[serde(skip)]
    pub tid: i64,
    #[serde(skip)]
    pub pid: i64,
    #[serde(rename = "stock")]
    pub symbol: String,
    pub shares: i64,
}

/// Net share count of one symbol in one portfolio.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub symbol: String,
    pub shares: i64,
}

impl Position {
    /// What selling the whole position at `price` would credit.
    pub fn market_value(&self, price: f64) -> Result<Decimal, PortfolioError> {
        trade_value(price, self.shares)
    }
}

/// An executed buy or sell. `amount` is the cash that moved.
#[derive(Debug, Clone, PartialEq)]
pub struct Fill {
    pub symbol: String,
    pub shares: i64,
    pub price: f64,
    pub amount: Decimal,
}

/// Sums deltas per symbol and keeps only strictly positive positions,
/// ordered by symbol.
pub fn fold_positions(records: &[HoldingRecord]) -> Vec<Position> {
    let mut totals: BTreeMap<&str, i64> = BTreeMap::new();
    for record in records {
        *totals.entry(record.symbol.as_str()).or_insert(0) += record.shares;
    }
    totals
        .into_iter()
        .filter(|(_, shares)| *shares > 0)
        .map(|(symbol, shares)| Position {
            symbol: symbol.to_string(),
            shares,
        })
        .collect()
}
