//! Users, portfolios and the cash ledger.
//!
//! Every mutating method runs as one store transaction: the balance change
//! and its ledger rows are committed together or not at all. Sufficiency
//! checks are single guarded statements, never a read followed by a write.

use rust_decimal::Decimal;

use crate::domain::error::PortfolioError;
use crate::domain::ledger::CashTransaction;
use crate::domain::portfolio::{Portfolio, User};

pub trait LedgerPort {
    /// Fails with `Conflict` when the email is taken.
    fn create_user(&self, user: &User) -> Result<(), PortfolioError>;

    fn user_exists(&self, email: &str) -> Result<bool, PortfolioError>;

    fn create_portfolio(&self, owner: &str, name: &str) -> Result<Portfolio, PortfolioError>;

    fn list_portfolios(&self, owner: &str) -> Result<Vec<Portfolio>, PortfolioError>;

    /// `NotFound` when absent or owned by someone else.
    fn get_portfolio(&self, owner: &str, pid: i64) -> Result<Portfolio, PortfolioError>;

    /// Returns the remaining cash to the owner's external account and deletes
    /// the portfolio. Refused with `OpenPositions` while shares are held.
    /// Returns the amount paid out.
    fn delete_portfolio(&self, owner: &str, pid: i64) -> Result<Decimal, PortfolioError>;

    fn deposit(&self, owner: &str, pid: i64, amount: Decimal) -> Result<(), PortfolioError>;

    fn withdraw(&self, owner: &str, pid: i64, amount: Decimal) -> Result<(), PortfolioError>;

    fn transfer(
        &self,
        owner: &str,
        from_pid: i64,
        to_pid: i64,
        amount: Decimal,
    ) -> Result<(), PortfolioError>;

    /// Cash ledger rows of a portfolio, newest first.
    fn cash_transactions(
        &self,
        owner: &str,
        pid: i64,
    ) -> Result<Vec<CashTransaction>, PortfolioError>;
}
