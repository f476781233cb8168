//! Cash ledger: deposits, withdrawals and transfers between portfolios.
//!
//! Balances live on the portfolio row; every change to one is paired with
//! append-only [`LedgerEntry`] rows written in the same store transaction.
//! The entry shapes are built here so every adapter records identical rows.

use rust_decimal::Decimal;
use serde::Serialize;

use super::error::PortfolioError;
use super::money::validate_amount;
use super::portfolio::{Portfolio, validate_portfolio_name};
use crate::ports::ledger_port::LedgerPort;

/// Counterparty label for money entering or leaving the system.
pub const EXTERNAL: &str = "external";

/// A cash ledger row about to be appended.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub pid: i64,
    pub amount: Decimal,
    pub source: String,
    pub destination: String,
}

impl LedgerEntry {
    pub fn deposit(portfolio: &Portfolio, amount: Decimal) -> Self {
        LedgerEntry {
            pid: portfolio.pid,
            amount,
            source: EXTERNAL.to_string(),
            destination: portfolio.name.clone(),
        }
    }

    pub fn withdrawal(portfolio: &Portfolio, amount: Decimal) -> Self {
        LedgerEntry {
            pid: portfolio.pid,
            amount: -amount,
            source: portfolio.name.clone(),
            destination: EXTERNAL.to_string(),
        }
    }

    /// Pays the whole balance out when a portfolio is deleted.
    pub fn closing(portfolio: &Portfolio) -> Self {
        Self::withdrawal(portfolio, portfolio.money)
    }

    /// Debit leg for `from` and credit leg for `to`; the amounts net to zero.
    pub fn transfer_legs(from: &Portfolio, to: &Portfolio, amount: Decimal) -> [Self; 2] {
        [
            LedgerEntry {
                pid: from.pid,
                amount: -amount,
                source: from.name.clone(),
                destination: to.name.clone(),
            },
            LedgerEntry {
                pid: to.pid,
                amount,
                source: from.name.clone(),
                destination: to.name.clone(),
            },
        ]
    }
}

/// A cash ledger row as stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CashTransaction {
    #[serde(skip)]
    pub tid: i64,
    #[serde(skip)]
    pub pid: i64,
    pub amount: Decimal,
    pub source: String,
    pub destination: String,
}

pub fn open_portfolio<L: LedgerPort + ?Sized>(
    ledger: &L,
    caller: &str,
    name: &str,
) -> Result<Portfolio, PortfolioError> {
    let name = validate_portfolio_name(name)?;
    let portfolio = ledger.create_portfolio(caller, &name)?;
    tracing::info!(pid = portfolio.pid, owner = caller, "portfolio created");
    Ok(portfolio)
}

/// Deletes an empty-of-shares portfolio, paying its cash out. Returns the
/// amount paid out.
pub fn close_portfolio<L: LedgerPort + ?Sized>(
    ledger: &L,
    caller: &str,
    pid: i64,
) -> Result<Decimal, PortfolioError> {
    let returned = ledger.delete_portfolio(caller, pid)?;
    tracing::info!(pid, owner = caller, %returned, "portfolio deleted");
    Ok(returned)
}

pub fn deposit<L: LedgerPort + ?Sized>(
    ledger: &L,
    caller: &str,
    pid: i64,
    amount: Decimal,
) -> Result<(), PortfolioError> {
    let amount = validate_amount(amount)?;
    ledger.deposit(caller, pid, amount)?;
    tracing::info!(pid, %amount, "deposit committed");
    Ok(())
}

pub fn withdraw<L: LedgerPort + ?Sized>(
    ledger: &L,
    caller: &str,
    pid: i64,
    amount: Decimal,
) -> Result<(), PortfolioError> {
    let amount = validate_amount(amount)?;
    ledger.withdraw(caller, pid, amount).inspect_err(|e| {
        tracing::warn!(pid, %amount, error = %e, "withdrawal rejected");
    })?;
    tracing::info!(pid, %amount, "withdrawal committed");
    Ok(())
}

pub fn transfer<L: LedgerPort + ?Sized>(
    ledger: &L,
    caller: &str,
    from_pid: i64,
    to_pid: i64,
    amount: Decimal,
) -> Result<(), PortfolioError> {
    if from_pid == to_pid {
        return Err(PortfolioError::SameAccount);
    }
    let amount = validate_amount(amount)?;
    ledger
        .transfer(caller, from_pid, to_pid, amount)
        .inspect_err(|e| {
            tracing::warn!(from_pid, to_pid, %amount, error = %e, "transfer rejected");
        })?;
    tracing::info!(from_pid, to_pid, %amount, "transfer committed");
    Ok(())
}
