#![allow(dead_code)]

use chrono::{Duration, NaiveDate};
use std::collections::HashMap;
use stockfolio::domain::error::PortfolioError;
use stockfolio::domain::portfolio::User;
pub use stockfolio::domain::price_bar::PriceBar;
use stockfolio::ports::ledger_port::LedgerPort;
use stockfolio::ports::market_data_port::MarketDataPort;

#[cfg(feature = "sqlite")]
pub use stockfolio::adapters::sqlite_adapter::SqliteAdapter;
#[cfg(feature = "sqlite")]
use stockfolio::adapters::file_config_adapter::FileConfigAdapter;
#[cfg(feature = "sqlite")]
use std::path::Path;

/// Read-only market data held in memory.
pub struct MockMarketData {
    pub data: HashMap<String, Vec<PriceBar>>,
}

impl MockMarketData {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, symbol: &str, bars: Vec<PriceBar>) -> Self {
        self.data.insert(symbol.to_string(), bars);
        self
    }
}

impl MarketDataPort for MockMarketData {
    fn register_symbol(&self, _symbol: &str) -> Result<(), PortfolioError> {
        Ok(())
    }

    fn symbol_exists(&self, symbol: &str) -> Result<bool, PortfolioError> {
        Ok(self.data.contains_key(symbol))
    }

    fn upsert_bars(&self, bars: &[PriceBar]) -> Result<usize, PortfolioError> {
        Ok(bars.len())
    }

    fn fetch_history(&self, symbol: &str) -> Result<Vec<PriceBar>, PortfolioError> {
        let mut bars = self.data.get(symbol).cloned().unwrap_or_default();
        bars.sort_by_key(|b| b.date);
        Ok(bars)
    }

    fn latest_bar(&self, symbol: &str) -> Result<Option<PriceBar>, PortfolioError> {
        Ok(self.fetch_history(symbol)?.pop())
    }

    fn list_symbols(&self) -> Result<Vec<String>, PortfolioError> {
        let mut symbols: Vec<String> = self.data.keys().cloned().collect();
        symbols.sort();
        Ok(symbols)
    }

    fn get_data_range(
        &self,
        symbol: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, PortfolioError> {
        let bars = self.fetch_history(symbol)?;
        match (bars.first(), bars.last()) {
            (Some(first), Some(last)) => Ok(Some((first.date, last.date, bars.len()))),
            _ => Ok(None),
        }
    }
}

/// Fresh in-memory store with the schema applied.
#[cfg(feature = "sqlite")]
pub fn store() -> SqliteAdapter {
    let store = SqliteAdapter::in_memory().unwrap();
    store.initialize_schema().unwrap();
    store
}

/// Pooled store on `dir/store.db`, for tests that need several connections.
#[cfg(feature = "sqlite")]
pub fn file_store(dir: &Path) -> SqliteAdapter {
    let config = FileConfigAdapter::from_string(&format!(
        "[sqlite]\npath = {}\npool_size = 4\n",
        dir.join("store.db").display()
    ))
    .unwrap();
    let store = SqliteAdapter::from_config(&config).unwrap();
    store.initialize_schema().unwrap();
    store
}

/// Drops `table` behind the store's back so its next query fails.
#[cfg(feature = "sqlite")]
pub fn drop_table(dir: &Path, table: &str) {
    let conn = rusqlite::Connection::open(dir.join("store.db")).unwrap();
    conn.execute_batch(&format!("DROP TABLE {table}")).unwrap();
}

pub fn add_user<L: LedgerPort + ?Sized>(store: &L, email: &str) {
    store
        .create_user(&User {
            email: email.to_string(),
            name: email.split('@').next().unwrap_or(email).to_string(),
            password_hash: "not-a-real-hash".to_string(),
        })
        .unwrap();
}

/// Registers `symbol` and stores one bar per close on consecutive days from
/// 2024-01-01.
pub fn seed_closes<M: MarketDataPort + ?Sized>(store: &M, symbol: &str, closes: &[f64]) {
    store.register_symbol(symbol).unwrap();
    let bars: Vec<PriceBar> = closes
        .iter()
        .enumerate()
        .map(|(i, &close)| bar_on(symbol, date(2024, 1, 1) + Duration::days(i as i64), close))
        .collect();
    store.upsert_bars(&bars).unwrap();
}

pub fn make_bar(symbol: &str, date: &str, close: f64) -> PriceBar {
    bar_on(
        symbol,
        NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
        close,
    )
}

fn bar_on(symbol: &str, date: NaiveDate, close: f64) -> PriceBar {
    PriceBar {
        symbol: symbol.to_string(),
        date,
        open: close - 1.0,
        high: close + 1.0,
        low: close - 2.0,
        close,
        volume: 1000,
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// `count` daily bars whose close rises by one each day.
pub fn generate_bars(
    symbol: &str,
    start_date: &str,
    count: usize,
    start_price: f64,
) -> Vec<PriceBar> {
    let start = NaiveDate::parse_from_str(start_date, "%Y-%m-%d").unwrap();
    (0..count)
        .map(|i| bar_on(symbol, start + Duration::days(i as i64), start_price + i as f64))
        .collect()
}
