//! Daily price bar representation.

use chrono::NaiveDate;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceBar {
    #[serde(skip)]
    pub symbol: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

impl PriceBar {
    /// A bar whose OHLC fields are finite and internally consistent.
    pub fn is_well_formed(&self) -> bool {
        let prices = [self.open, self.high, self.low, self.close];
        prices.iter().all(|p| p.is_finite() && *p >= 0.0)
            && self.low <= self.high
            && self.volume >= 0
    }
}

/// Close series of `bars` in date order, paired with their dates.
pub fn dated_closes(bars: &[PriceBar]) -> Vec<(NaiveDate, f64)> {
    let mut closes: Vec<(NaiveDate, f64)> = bars.iter().map(|b| (b.date, b.close)).collect();
    closes.sort_by_key(|(date, _)| *date);
    closes
}
