//! Cash amounts.
//!
//! Balances and ledger amounts are [`Decimal`] in the domain and whole cents
//! in the store, so sums and sufficiency checks never round.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};

use super::error::PortfolioError;

/// Decimal places of a cash amount.
pub const CASH_SCALE: u32 = 2;

fn out_of_range(amount: Decimal) -> PortfolioError {
    PortfolioError::validation(format!("amount {amount} is out of range"))
}

pub fn from_cents(cents: i64) -> Decimal {
    Decimal::new(cents, CASH_SCALE)
}

/// Exact cent count of `amount`. Fails on fractional cents.
pub fn to_cents(amount: Decimal) -> Result<i64, PortfolioError> {
    let scaled = amount
        .checked_mul(Decimal::ONE_HUNDRED)
        .ok_or_else(|| out_of_range(amount))?;
    if !scaled.fract().is_zero() {
        return Err(PortfolioError::validation(format!(
            "amount {amount} has more than {CASH_SCALE} decimal places"
        )));
    }
    scaled.to_i64().ok_or_else(|| out_of_range(amount))
}

/// Deposit, withdrawal and transfer amounts: positive, at most two decimal
/// places and storable.
pub fn validate_amount(amount: Decimal) -> Result<Decimal, PortfolioError> {
    if amount <= Decimal::ZERO {
        return Err(PortfolioError::validation("amount must be greater than zero"));
    }
    to_cents(amount)?;
    Ok(amount.normalize())
}

/// Cash value of `shares` at `price`, rounded half away from zero to the cent.
pub fn trade_value(price: f64, shares: i64) -> Result<Decimal, PortfolioError> {
    let price = Decimal::from_f64(price)
        .ok_or_else(|| PortfolioError::validation(format!("price {price} is not a cash value")))?;
    price
        .checked_mul(Decimal::from(shares))
        .map(|v| v.round_dp_with_strategy(CASH_SCALE, RoundingStrategy::MidpointAwayFromZero))
        .ok_or_else(|| out_of_range(price))
}
