//! Market data access port.

use crate::domain::error::PortfolioError;
use crate::domain::price_bar::PriceBar;
use chrono::NaiveDate;

pub trait MarketDataPort {
    /// Adds `symbol` to the stock master table if absent.
    fn register_symbol(&self, symbol: &str) -> Result<(), PortfolioError>;

    fn symbol_exists(&self, symbol: &str) -> Result<bool, PortfolioError>;

    /// Inserts bars, replacing any existing bar for the same (symbol, date).
    /// Returns the number of bars written.
    fn upsert_bars(&self, bars: &[PriceBar]) -> Result<usize, PortfolioError>;

    /// Full history of `symbol` in ascending date order.
    fn fetch_history(&self, symbol: &str) -> Result<Vec<PriceBar>, PortfolioError>;

    /// The bar with the greatest date for `symbol`; `None` without price data.
    fn latest_bar(&self, symbol: &str) -> Result<Option<PriceBar>, PortfolioError>;

    fn list_symbols(&self) -> Result<Vec<String>, PortfolioError>;

    fn get_data_range(
        &self,
        symbol: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, PortfolioError>;
}
