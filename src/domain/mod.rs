//! Core domain types and logic.
//!
//! Nothing here touches a database or the network; orchestration functions
//! are generic over the port traits in [`crate::ports`].

pub mod analytics;
pub mod error;
pub mod forecast;
pub mod holdings;
pub mod ledger;
pub mod money;
pub mod portfolio;
pub mod position;
pub mod price_bar;
pub mod stats;
pub mod stock_list;
