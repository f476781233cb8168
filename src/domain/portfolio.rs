//! Users and portfolio accounts.

use rust_decimal::Decimal;
use serde::Serialize;

use super::error::PortfolioError;

/// A registered user. The email is the identity every core call is made with.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub email: String,
    pub name: String,
    pub password_hash: String,
}

/// A user-owned cash account that also carries stock positions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Portfolio {
    pub pid: i64,
    #[serde(skip)]
    pub owner: String,
    pub name: String,
    pub money: Decimal,
}

pub fn validate_portfolio_name(name: &str) -> Result<String, PortfolioError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(PortfolioError::validation("portfolio name must not be empty"));
    }
    Ok(name.to_string())
}

pub fn validate_email(email: &str) -> Result<String, PortfolioError> {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {
            Ok(email.to_lowercase())
        }
        _ => Err(PortfolioError::validation(format!(
            "invalid email address: {email:?}"
        ))),
    }
}
