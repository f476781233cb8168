//! Read-only portfolio and stock-list snapshots.
//!
//! Recomputed from the market data store on every call; nothing here writes.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

use super::error::PortfolioError;
use super::position::fold_positions;
use super::price_bar::dated_closes;
use super::stats;
use super::stock_list::{StockList, Visibility};
use crate::ports::holdings_port::HoldingsPort;
use crate::ports::ledger_port::LedgerPort;
use crate::ports::market_data_port::MarketDataPort;
use crate::ports::stock_list_port::StockListPort;

pub const DEFAULT_BENCHMARK: &str = "SPY";

type DatedCloses = Vec<(NaiveDate, f64)>;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SymbolStats {
    pub coefficient_of_variation: Option<f64>,
    pub beta: Option<f64>,
}

impl SymbolStats {
    pub fn compute(closes: &[(NaiveDate, f64)], benchmark: &[(NaiveDate, f64)]) -> Self {
        let values: Vec<f64> = closes.iter().map(|(_, c)| *c).collect();
        SymbolStats {
            coefficient_of_variation: stats::coefficient_of_variation(&values),
            beta: stats::beta(closes, benchmark),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationEntry {
    pub stock1: String,
    pub stock2: String,
    pub correlation: Option<f64>,
}

/// Pearson correlation for every unordered pair of distinct symbols, each pair
/// reported once with `stock1 < stock2`.
pub fn correlation_matrix(histories: &BTreeMap<String, DatedCloses>) -> Vec<CorrelationEntry> {
    let symbols: Vec<&String> = histories.keys().collect();
    let mut entries = Vec::new();
    for (i, s1) in symbols.iter().enumerate() {
        for s2 in &symbols[i + 1..] {
            entries.push(CorrelationEntry {
                stock1: (*s1).clone(),
                stock2: (*s2).clone(),
                correlation: stats::correlation(&histories[*s1], &histories[*s2]),
            });
        }
    }
    entries
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HoldingView {
    pub stock: String,
    pub shares: i64,
    pub close: Option<f64>,
    pub value: Option<Decimal>,
    pub coefficient_of_variation: Option<f64>,
    pub beta: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioView {
    pub pid: i64,
    pub name: String,
    pub money: Decimal,
    pub holdings: Vec<HoldingView>,
    pub total_stock_value: Decimal,
    pub correlation_matrix: Vec<CorrelationEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListStockView {
    pub symbol: String,
    pub shares: i64,
    pub coefficient_of_variation: Option<f64>,
    pub beta: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListCorrelationEntry {
    pub stock1: String,
    pub stock2: String,
    pub value: Option<f64>,
}

impl From<CorrelationEntry> for ListCorrelationEntry {
    fn from(entry: CorrelationEntry) -> Self {
        ListCorrelationEntry {
            stock1: entry.stock1,
            stock2: entry.stock2,
            value: entry.correlation,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockListView {
    pub lid: i64,
    pub name: String,
    pub owner: String,
    pub visibility: Visibility,
    pub stocks: Vec<ListStockView>,
    pub correlation_matrix: Vec<ListCorrelationEntry>,
}

fn load_histories<M: MarketDataPort + ?Sized>(
    market: &M,
    symbols: &[&str],
) -> Result<BTreeMap<String, DatedCloses>, PortfolioError> {
    let mut histories = BTreeMap::new();
    for symbol in symbols {
        if !histories.contains_key(*symbol) {
            let bars = market.fetch_history(symbol)?;
            histories.insert(symbol.to_string(), dated_closes(&bars));
        }
    }
    Ok(histories)
}

/// A held symbol with its latest close, as listed beside each portfolio.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeldStock {
    pub stock: String,
    pub shares: i64,
    pub close: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioSummary {
    pub pid: i64,
    pub name: String,
    pub money: Decimal,
    pub holdings: Vec<HeldStock>,
}

/// Every portfolio of `caller` with its open positions priced at the latest
/// close. Symbols without price data carry a null close.
pub fn portfolio_summaries<S>(
    store: &S,
    caller: &str,
) -> Result<Vec<PortfolioSummary>, PortfolioError>
where
    S: LedgerPort + HoldingsPort + MarketDataPort + ?Sized,
{
    let mut closes: BTreeMap<String, Option<f64>> = BTreeMap::new();
    let mut summaries = Vec::new();
    for portfolio in store.list_portfolios(caller)? {
        let positions = fold_positions(&store.holding_records(caller, portfolio.pid)?);
        let mut holdings = Vec::with_capacity(positions.len());
        for position in positions {
            let close = match closes.get(&position.symbol) {
                Some(close) => *close,
                None => {
                    let close = store.latest_bar(&position.symbol)?.map(|b| b.close);
                    closes.insert(position.symbol.clone(), close);
                    close
                }
            };
            holdings.push(HeldStock {
                stock: position.symbol,
                shares: position.shares,
                close,
            });
        }
        summaries.push(PortfolioSummary {
            pid: portfolio.pid,
            name: portfolio.name,
            money: portfolio.money,
            holdings,
        });
    }
    Ok(summaries)
}

pub fn portfolio_view<S>(
    store: &S,
    caller: &str,
    pid: i64,
    benchmark: &str,
) -> Result<PortfolioView, PortfolioError>
where
    S: LedgerPort + HoldingsPort + MarketDataPort + ?Sized,
{
    let portfolio = store.get_portfolio(caller, pid)?;
    let positions = fold_positions(&store.holding_records(caller, pid)?);

    let symbols: Vec<&str> = positions.iter().map(|p| p.symbol.as_str()).collect();
    let histories = load_histories(store, &symbols)?;
    let bench = dated_closes(&store.fetch_history(benchmark)?);

    let mut holdings = Vec::with_capacity(positions.len());
    for position in &positions {
        let history = &histories[&position.symbol];
        let close = history.last().map(|(_, c)| *c);
        let stats = SymbolStats::compute(history, &bench);
        holdings.push(HoldingView {
            stock: position.symbol.clone(),
            shares: position.shares,
            close,
            value: close.map(|c| position.market_value(c)).transpose()?,
            coefficient_of_variation: stats.coefficient_of_variation,
            beta: stats.beta,
        });
    }

    let total_stock_value = holdings.iter().filter_map(|h| h.value).sum();

    Ok(PortfolioView {
        pid: portfolio.pid,
        name: portfolio.name,
        money: portfolio.money,
        holdings,
        total_stock_value,
        correlation_matrix: correlation_matrix(&histories),
    })
}

/// Resolves a list the viewer may see. Lists hidden from the viewer are
/// reported as not found.
pub fn visible_list<S: StockListPort + ?Sized>(
    store: &S,
    viewer: &str,
    lid: i64,
) -> Result<StockList, PortfolioError> {
    let list = store.get_list(lid)?;
    let grantees = if list.visibility == Visibility::Shared {
        store.list_grantees(lid)?
    } else {
        Vec::new()
    };
    if !list.is_visible_to(viewer, &grantees) {
        return Err(PortfolioError::not_found("stock list", lid));
    }
    Ok(list)
}

pub fn stock_list_view<S>(
    store: &S,
    viewer: &str,
    lid: i64,
    benchmark: &str,
) -> Result<StockListView, PortfolioError>
where
    S: StockListPort + MarketDataPort + ?Sized,
{
    let list = visible_list(store, viewer, lid)?;
    let items = store.list_items(lid)?;

    let symbols: Vec<&str> = items.iter().map(|i| i.symbol.as_str()).collect();
    let histories = load_histories(store, &symbols)?;
    let bench = dated_closes(&store.fetch_history(benchmark)?);

    let stocks = items
        .iter()
        .map(|item| {
            let stats = SymbolStats::compute(&histories[&item.symbol], &bench);
            ListStockView {
                symbol: item.symbol.clone(),
                shares: item.shares,
                coefficient_of_variation: stats.coefficient_of_variation,
                beta: stats.beta,
            }
        })
        .collect();

    Ok(StockListView {
        lid: list.lid,
        name: list.name,
        owner: list.owner,
        visibility: list.visibility,
        stocks,
        correlation_matrix: correlation_matrix(&histories)
            .into_iter()
            .map(ListCorrelationEntry::from)
            .collect(),
    })
}
