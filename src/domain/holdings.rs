//! Buy and sell execution against the latest close.
//!
//! Input is validated here; the price lookup, the guarded balance or position
//! check and the record insert all happen inside one store transaction in
//! [`HoldingsPort`].

use super::error::PortfolioError;
use super::position::Fill;
use crate::ports::holdings_port::HoldingsPort;

/// Trims and upper-cases a ticker.
pub fn normalize_symbol(symbol: &str) -> Result<String, PortfolioError> {
    let symbol = symbol.trim().to_uppercase();
    if symbol.is_empty() {
        return Err(PortfolioError::validation("stock symbol must not be empty"));
    }
    if !symbol
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^'))
    {
        return Err(PortfolioError::validation(format!(
            "invalid stock symbol: {symbol}"
        )));
    }
    Ok(symbol)
}

pub fn validate_shares(shares: i64) -> Result<i64, PortfolioError> {
    if shares <= 0 {
        return Err(PortfolioError::validation(
            "shares must be a positive integer",
        ));
    }
    Ok(shares)
}

pub fn buy<H: HoldingsPort + ?Sized>(
    holdings: &H,
    caller: &str,
    pid: i64,
    symbol: &str,
    shares: i64,
) -> Result<Fill, PortfolioError> {
    let symbol = normalize_symbol(symbol)?;
    let shares = validate_shares(shares)?;
    let fill = holdings.buy(caller, pid, &symbol, shares).inspect_err(|e| {
        tracing::warn!(pid, %symbol, shares, error = %e, "buy rejected");
    })?;
    tracing::info!(pid, %symbol, shares, price = fill.price, cost = %fill.amount, "buy filled");
    Ok(fill)
}

pub fn sell<H: HoldingsPort + ?Sized>(
    holdings: &H,
    caller: &str,
    pid: i64,
    symbol: &str,
    shares: i64,
) -> Result<Fill, PortfolioError> {
    let symbol = normalize_symbol(symbol)?;
    let shares = validate_shares(shares)?;
    let fill = holdings.sell(caller, pid, &symbol, shares).inspect_err(|e| {
        tracing::warn!(pid, %symbol, shares, error = %e, "sell rejected");
    })?;
    tracing::info!(pid, %symbol, shares, price = fill.price, proceeds = %fill.amount, "sell filled");
    Ok(fill)
}
