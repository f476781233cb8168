//! Port traits the domain depends on.

pub mod config_port;
pub mod holdings_port;
pub mod ledger_port;
pub mod market_data_port;
pub mod stock_list_port;

use holdings_port::HoldingsPort;
use ledger_port::LedgerPort;
use market_data_port::MarketDataPort;
use stock_list_port::StockListPort;

/// Everything the web and CLI layers need from a relational store.
pub trait PortfolioStore: MarketDataPort + LedgerPort + HoldingsPort + StockListPort {}

impl<T> PortfolioStore for T where T: MarketDataPort + LedgerPort + HoldingsPort + StockListPort {}
