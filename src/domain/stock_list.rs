//! Named, shareable collections of symbols.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use super::error::PortfolioError;
use super::holdings::{normalize_symbol, validate_shares};
use super::portfolio::validate_email;
use crate::ports::ledger_port::LedgerPort;
use crate::ports::market_data_port::MarketDataPort;
use crate::ports::stock_list_port::StockListPort;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Private,
    Shared,
    Public,
}

impl Visibility {
    pub fn as_str(self) -> &'static str {
        match self {
            Visibility::Private => "private",
            Visibility::Shared => "shared",
            Visibility::Public => "public",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Visibility {
    type Err = PortfolioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "private" => Ok(Visibility::Private),
            "shared" => Ok(Visibility::Shared),
            "public" => Ok(Visibility::Public),
            other => Err(PortfolioError::validation(format!(
                "invalid visibility {other:?}"
            ))),
        }
    }
}

/// Parses a visibility a user may set directly. `shared` is only entered by
/// sharing the list with someone.
pub fn parse_requested_visibility(s: &str) -> Result<Visibility, PortfolioError> {
    match s.parse::<Visibility>() {
        Ok(v @ (Visibility::Private | Visibility::Public)) => Ok(v),
        _ => Err(PortfolioError::validation(
            "invalid visibility value: must be \"public\" or \"private\"",
        )),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockList {
    pub lid: i64,
    pub owner: String,
    pub name: String,
    pub visibility: Visibility,
}

impl StockList {
    /// Owners always see their lists; others see public lists, and shared
    /// lists they were granted.
    pub fn is_visible_to(&self, viewer: &str, grantees: &[String]) -> bool {
        if self.owner == viewer {
            return true;
        }
        match self.visibility {
            Visibility::Public => true,
            Visibility::Shared => grantees.iter().any(|g| g == viewer),
            Visibility::Private => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListItem {
    pub symbol: String,
    pub shares: i64,
}

/// Every list a viewer can reach, grouped the way the overview page shows them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListsOverview {
    pub private_lists: Vec<StockList>,
    pub shared_lists: Vec<StockList>,
    pub public_lists: Vec<StockList>,
    pub shared_with_me: Vec<StockList>,
}

impl ListsOverview {
    /// Partitions `owned` by visibility; `public` and `granted` come from
    /// other users.
    pub fn build(
        viewer: &str,
        owned: Vec<StockList>,
        public: Vec<StockList>,
        granted: Vec<StockList>,
    ) -> Self {
        let mut overview = ListsOverview::default();
        for list in owned {
            match list.visibility {
                Visibility::Private => overview.private_lists.push(list),
                Visibility::Shared => overview.shared_lists.push(list),
                Visibility::Public => overview.public_lists.push(list),
            }
        }
        overview
            .public_lists
            .extend(public.into_iter().filter(|l| l.owner != viewer));
        overview.shared_with_me = granted
            .into_iter()
            .filter(|l| l.owner != viewer && l.visibility == Visibility::Shared)
            .collect();
        overview
    }
}

pub fn validate_list_name(name: &str) -> Result<String, PortfolioError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(PortfolioError::validation("stock list name must not be empty"));
    }
    Ok(name.to_string())
}

pub fn lists_overview<S: StockListPort + ?Sized>(
    store: &S,
    viewer: &str,
) -> Result<ListsOverview, PortfolioError> {
    Ok(ListsOverview::build(
        viewer,
        store.owned_lists(viewer)?,
        store.public_lists()?,
        store.granted_lists(viewer)?,
    ))
}

pub fn create_list<S: StockListPort + ?Sized>(
    store: &S,
    owner: &str,
    name: &str,
) -> Result<StockList, PortfolioError> {
    let name = validate_list_name(name)?;
    let list = store.create_list(owner, &name)?;
    tracing::info!(lid = list.lid, owner, "stock list created");
    Ok(list)
}

pub fn add_item<S>(
    store: &S,
    owner: &str,
    lid: i64,
    symbol: &str,
    shares: i64,
) -> Result<(), PortfolioError>
where
    S: StockListPort + MarketDataPort + ?Sized,
{
    let symbol = normalize_symbol(symbol)?;
    let shares = validate_shares(shares)?;
    if !store.symbol_exists(&symbol)? {
        return Err(PortfolioError::UnknownSymbol { symbol });
    }
    store.add_item(owner, lid, &symbol, shares)
}

pub fn share_list<S>(store: &S, owner: &str, lid: i64, email: &str) -> Result<(), PortfolioError>
where
    S: StockListPort + LedgerPort + ?Sized,
{
    let email = validate_email(email)?;
    if email == owner {
        return Err(PortfolioError::validation(
            "cannot share a stock list with yourself",
        ));
    }
    if !store.user_exists(&email)? {
        return Err(PortfolioError::not_found("user", &email));
    }
    store.share_list(owner, lid, &email)?;
    tracing::info!(lid, owner, grantee = %email, "stock list shared");
    Ok(())
}

pub fn set_visibility<S: StockListPort + ?Sized>(
    store: &S,
    owner: &str,
    lid: i64,
    requested: &str,
) -> Result<Visibility, PortfolioError> {
    let visibility = parse_requested_visibility(requested)?;
    store.set_visibility(owner, lid, visibility)?;
    tracing::info!(lid, owner, %visibility, "stock list visibility changed");
    Ok(visibility)
}
