//! HTTP request handlers for the web adapter.

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;

use crate::domain::analytics::{self, PortfolioSummary, PortfolioView, StockListView};
use crate::domain::error::PortfolioError;
use crate::domain::forecast::{self, Horizon};
use crate::domain::holdings::{self, normalize_symbol};
use crate::domain::ledger::{self, CashTransaction};
use crate::domain::position::HoldingRecord;
use crate::domain::price_bar::PriceBar;
use crate::domain::stock_list::{self, ListsOverview, StockList};
use crate::ports::PortfolioStore;

use super::{AppState, Caller, WebError};

type Store = dyn PortfolioStore + Send + Sync;
type JsonBody<T> = Result<Json<T>, JsonRejection>;

/// Runs a store call on the blocking pool.
async fn with_store<T, F>(state: &AppState, f: F) -> Result<T, WebError>
where
    T: Send + 'static,
    F: FnOnce(&Store) -> Result<T, PortfolioError> + Send + 'static,
{
    let store = Arc::clone(&state.store);
    let joined = tokio::task::spawn_blocking(move || f(store.as_ref())).await;
    match joined {
        Ok(result) => result.map_err(WebError::from),
        Err(e) => {
            tracing::error!(error = %e, "store task failed");
            Err(WebError::internal())
        }
    }
}

fn message(text: impl Into<String>) -> Json<Value> {
    Json(json!({ "message": text.into() }))
}

#[derive(Debug, Deserialize)]
pub struct NameBody {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct AmountBody {
    pub amount: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferBody {
    pub from_pid: i64,
    pub to_pid: i64,
    pub amount: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct TradeBody {
    pub stock: String,
    pub shares: i64,
}

#[derive(Debug, Deserialize)]
pub struct ShareBody {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct VisibilityBody {
    pub visibility: String,
}

#[derive(Debug, Deserialize)]
pub struct PredictBody {
    pub stock: String,
    pub range: String,
}

pub async fn health() -> &'static str {
    "OK"
}

pub async fn not_found() -> WebError {
    WebError::not_found("no such route")
}

pub async fn list_portfolios(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
) -> Result<Json<Vec<PortfolioSummary>>, WebError> {
    let portfolios = with_store(&state, move |store| {
        analytics::portfolio_summaries(store, &caller)
    })
    .await?;
    Ok(Json(portfolios))
}

pub async fn create_portfolio(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    body: JsonBody<NameBody>,
) -> Result<impl IntoResponse, WebError> {
    let Json(body) = body?;
    let portfolio = with_store(&state, move |store| {
        ledger::open_portfolio(store, &caller, &body.name)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(portfolio)))
}

pub async fn portfolio_view(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Path(pid): Path<i64>,
) -> Result<Json<PortfolioView>, WebError> {
    let benchmark = state.settings.benchmark.clone();
    let view = with_store(&state, move |store| {
        analytics::portfolio_view(store, &caller, pid, &benchmark)
    })
    .await?;
    Ok(Json(view))
}

pub async fn delete_portfolio(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Path(pid): Path<i64>,
) -> Result<Json<Value>, WebError> {
    let returned =
        with_store(&state, move |store| ledger::close_portfolio(store, &caller, pid)).await?;
    Ok(Json(json!({
        "message": "Portfolio deleted successfully",
        "cashReturned": returned,
    })))
}

pub async fn deposit(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Path(pid): Path<i64>,
    body: JsonBody<AmountBody>,
) -> Result<Json<Value>, WebError> {
    let Json(body) = body?;
    with_store(&state, move |store| {
        ledger::deposit(store, &caller, pid, body.amount)
    })
    .await?;
    Ok(message("Deposit successful"))
}

pub async fn withdraw(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Path(pid): Path<i64>,
    body: JsonBody<AmountBody>,
) -> Result<Json<Value>, WebError> {
    let Json(body) = body?;
    with_store(&state, move |store| {
        ledger::withdraw(store, &caller, pid, body.amount)
    })
    .await?;
    Ok(message("Withdrawal successful"))
}

pub async fn transfer(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    body: JsonBody<TransferBody>,
) -> Result<Json<Value>, WebError> {
    let Json(body) = body?;
    with_store(&state, move |store| {
        ledger::transfer(store, &caller, body.from_pid, body.to_pid, body.amount)
    })
    .await?;
    Ok(message("Transfer successful"))
}

pub async fn buy(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Path(pid): Path<i64>,
    body: JsonBody<TradeBody>,
) -> Result<Json<Value>, WebError> {
    let Json(body) = body?;
    let fill = with_store(&state, move |store| {
        holdings::buy(store, &caller, pid, &body.stock, body.shares)
    })
    .await?;
    Ok(Json(json!({
        "message": "Stock purchased successfully",
        "cost": fill.amount,
    })))
}

pub async fn sell(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Path(pid): Path<i64>,
    body: JsonBody<TradeBody>,
) -> Result<Json<Value>, WebError> {
    let Json(body) = body?;
    let fill = with_store(&state, move |store| {
        holdings::sell(store, &caller, pid, &body.stock, body.shares)
    })
    .await?;
    Ok(Json(json!({
        "message": "Stock sold successfully",
        "cashAdded": fill.amount,
    })))
}

pub async fn transactions(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Path(pid): Path<i64>,
) -> Result<Json<Value>, WebError> {
    let (cash, mut stock): (Vec<CashTransaction>, Vec<HoldingRecord>) =
        with_store(&state, move |store| {
            Ok((
                store.cash_transactions(&caller, pid)?,
                store.holding_records(&caller, pid)?,
            ))
        })
        .await?;
    stock.reverse();
    Ok(Json(json!({
        "cashTransactions": cash,
        "stockTransactions": stock,
    })))
}

pub async fn lists_overview(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
) -> Result<Json<ListsOverview>, WebError> {
    let overview =
        with_store(&state, move |store| stock_list::lists_overview(store, &caller)).await?;
    Ok(Json(overview))
}

pub async fn create_list(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    body: JsonBody<NameBody>,
) -> Result<(StatusCode, Json<StockList>), WebError> {
    let Json(body) = body?;
    let list = with_store(&state, move |store| {
        stock_list::create_list(store, &caller, &body.name)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(list)))
}

pub async fn stock_list_view(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Path(lid): Path<i64>,
) -> Result<Json<StockListView>, WebError> {
    let benchmark = state.settings.benchmark.clone();
    let view = with_store(&state, move |store| {
        analytics::stock_list_view(store, &caller, lid, &benchmark)
    })
    .await?;
    Ok(Json(view))
}

pub async fn add_list_item(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Path(lid): Path<i64>,
    body: JsonBody<TradeBody>,
) -> Result<Json<Value>, WebError> {
    let Json(body) = body?;
    with_store(&state, move |store| {
        stock_list::add_item(store, &caller, lid, &body.stock, body.shares)
    })
    .await?;
    Ok(message("Stock added to list"))
}

pub async fn share_list(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Path(lid): Path<i64>,
    body: JsonBody<ShareBody>,
) -> Result<Json<Value>, WebError> {
    let Json(body) = body?;
    with_store(&state, move |store| {
        stock_list::share_list(store, &caller, lid, &body.email)
    })
    .await?;
    Ok(message("Stock list shared successfully"))
}

pub async fn set_visibility(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Path(lid): Path<i64>,
    body: JsonBody<VisibilityBody>,
) -> Result<Json<Value>, WebError> {
    let Json(body) = body?;
    let visibility = with_store(&state, move |store| {
        stock_list::set_visibility(store, &caller, lid, &body.visibility)
    })
    .await?;
    Ok(message(format!("Stock list visibility updated to {visibility}.")))
}

pub async fn delete_list(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Path(lid): Path<i64>,
) -> Result<Json<Value>, WebError> {
    with_store(&state, move |store| store.delete_list(&caller, lid)).await?;
    Ok(message("Stock list deleted successfully"))
}

pub async fn stock_history(
    State(state): State<Arc<AppState>>,
    Caller(_caller): Caller,
    Path(symbol): Path<String>,
) -> Result<Json<Vec<PriceBar>>, WebError> {
    let symbol = normalize_symbol(&symbol)?;
    let bars = with_store(&state, move |store| {
        let bars = store.fetch_history(&symbol)?;
        if bars.is_empty() {
            return Err(PortfolioError::NoHistory { symbol });
        }
        Ok(bars)
    })
    .await?;
    Ok(Json(bars))
}

pub async fn predict(
    State(state): State<Arc<AppState>>,
    Caller(_caller): Caller,
    body: JsonBody<PredictBody>,
) -> Result<Json<Value>, WebError> {
    let Json(body) = body?;
    let symbol = normalize_symbol(&body.stock)?;
    let horizon: Horizon = body.range.parse()?;

    let lookup = symbol.clone();
    let history = with_store(&state, move |store| store.fetch_history(&lookup)).await?;
    let predictions = forecast::predict(&symbol, &history, horizon)?;

    Ok(Json(json!({
        "stock": symbol,
        "range": horizon.as_str(),
        "predictions": predictions,
    })))
}
