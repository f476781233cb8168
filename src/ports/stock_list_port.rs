//! Stock list storage and sharing.

use crate::domain::error::PortfolioError;
use crate::domain::stock_list::{ListItem, StockList, Visibility};

pub trait StockListPort {
    fn create_list(&self, owner: &str, name: &str) -> Result<StockList, PortfolioError>;

    /// Lists owned by `owner`.
    fn owned_lists(&self, owner: &str) -> Result<Vec<StockList>, PortfolioError>;

    fn public_lists(&self) -> Result<Vec<StockList>, PortfolioError>;

    /// Lists shared with `email`.
    fn granted_lists(&self, email: &str) -> Result<Vec<StockList>, PortfolioError>;

    fn get_list(&self, lid: i64) -> Result<StockList, PortfolioError>;

    fn list_items(&self, lid: i64) -> Result<Vec<ListItem>, PortfolioError>;

    fn list_grantees(&self, lid: i64) -> Result<Vec<String>, PortfolioError>;

    /// Adds shares of `symbol`, accumulating onto an existing item.
    fn add_item(&self, owner: &str, lid: i64, symbol: &str, shares: i64)
    -> Result<(), PortfolioError>;

    /// Grants `email` access and marks the list shared, in one transaction.
    fn share_list(&self, owner: &str, lid: i64, email: &str) -> Result<(), PortfolioError>;

    /// Sets visibility and drops every grant, in one transaction.
    fn set_visibility(
        &self,
        owner: &str,
        lid: i64,
        visibility: Visibility,
    ) -> Result<(), PortfolioError>;

    fn delete_list(&self, owner: &str, lid: i64) -> Result<(), PortfolioError>;
}
