//! Share trading against the latest close.

use crate::domain::error::PortfolioError;
use crate::domain::position::{Fill, HoldingRecord};

pub trait HoldingsPort {
    /// Prices at the latest close, debits the cost with a guarded update and
    /// appends a positive holding record, in one transaction.
    fn buy(&self, owner: &str, pid: i64, symbol: &str, shares: i64)
    -> Result<Fill, PortfolioError>;

    /// Appends a negative holding record only if the summed position covers
    /// `shares`, then credits the proceeds, in one transaction.
    fn sell(&self, owner: &str, pid: i64, symbol: &str, shares: i64)
    -> Result<Fill, PortfolioError>;

    /// The raw holding log of a portfolio, oldest first.
    fn holding_records(&self, owner: &str, pid: i64)
    -> Result<Vec<HoldingRecord>, PortfolioError>;
}
