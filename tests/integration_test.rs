//! End-to-end tests of the core operations against an in-memory SQLite store.
//!
//! Tests cover:
//! - Cash ledger: deposit, withdraw, transfer and their failure modes
//! - Buy/sell execution against the latest close
//! - Portfolio deletion policy
//! - Stock list visibility and sharing
//! - Analytics snapshots and price projection
//! - Concurrent withdrawals, trades and transfers on a file-backed database
#![cfg(feature = "sqlite")]

mod common;

use approx::assert_relative_eq;
use common::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use stockfolio::domain::analytics::{portfolio_summaries, portfolio_view, stock_list_view};
use stockfolio::domain::error::PortfolioError;
use stockfolio::domain::forecast::{Horizon, predict};
use stockfolio::domain::holdings::{buy, sell};
use stockfolio::domain::ledger::{self, EXTERNAL};
use stockfolio::domain::position::fold_positions;
use stockfolio::domain::stock_list::{self, Visibility};
use stockfolio::ports::holdings_port::HoldingsPort;
use stockfolio::ports::ledger_port::LedgerPort;
use stockfolio::ports::market_data_port::MarketDataPort;
use stockfolio::ports::stock_list_port::StockListPort;

const ALICE: &str = "alice@example.com";
const BOB: &str = "bob@example.com";
const CAROL: &str = "carol@example.com";

fn funded(store: &SqliteAdapter, owner: &str, amount: Decimal) -> i64 {
    let portfolio = ledger::open_portfolio(store, owner, "Main").unwrap();
    if amount > Decimal::ZERO {
        ledger::deposit(store, owner, portfolio.pid, amount).unwrap();
    }
    portfolio.pid
}

fn balance(store: &SqliteAdapter, owner: &str, pid: i64) -> Decimal {
    store.get_portfolio(owner, pid).unwrap().money
}

fn shares_held(store: &SqliteAdapter, owner: &str, pid: i64, symbol: &str) -> i64 {
    fold_positions(&store.holding_records(owner, pid).unwrap())
        .iter()
        .find(|p| p.symbol == symbol)
        .map_or(0, |p| p.shares)
}

mod cash_ledger {
    use super::*;

    #[test]
    fn deposit_credits_and_records_external_source() {
        let store = store();
        let pid = funded(&store, ALICE, dec!(1000));

        assert_eq!(balance(&store, ALICE, pid), dec!(1000));
        let rows = store.cash_transactions(ALICE, pid).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].amount, dec!(1000));
        assert_eq!(rows[0].source, EXTERNAL);
        assert_eq!(rows[0].destination, "Main");
    }

    #[test]
    fn overdrawn_withdrawal_changes_nothing() {
        let store = store();
        let pid = funded(&store, ALICE, dec!(1000));

        let err = ledger::withdraw(&store, ALICE, pid, dec!(2000)).unwrap_err();
        assert!(matches!(err, PortfolioError::InsufficientFunds { .. }));
        assert_eq!(balance(&store, ALICE, pid), dec!(1000));
        assert_eq!(store.cash_transactions(ALICE, pid).unwrap().len(), 1);
    }

    #[test]
    fn withdrawal_of_whole_balance_leaves_zero() {
        let store = store();
        let pid = funded(&store, ALICE, dec!(250));

        ledger::withdraw(&store, ALICE, pid, dec!(250)).unwrap();
        assert_eq!(balance(&store, ALICE, pid), Decimal::ZERO);

        let rows = store.cash_transactions(ALICE, pid).unwrap();
        assert_eq!(rows[0].amount, dec!(-250));
        assert_eq!(rows[0].destination, EXTERNAL);
    }

    #[test]
    fn cent_amounts_withdraw_to_exactly_zero() {
        let store = store();
        let pid = funded(&store, ALICE, dec!(0.3));

        ledger::withdraw(&store, ALICE, pid, dec!(0.1)).unwrap();
        assert_eq!(balance(&store, ALICE, pid), dec!(0.2));
        ledger::withdraw(&store, ALICE, pid, dec!(0.2)).unwrap();
        assert_eq!(balance(&store, ALICE, pid), Decimal::ZERO);

        let total: Decimal = store
            .cash_transactions(ALICE, pid)
            .unwrap()
            .iter()
            .map(|row| row.amount)
            .sum();
        assert_eq!(total, Decimal::ZERO);
    }

    #[test]
    fn non_positive_amounts_are_rejected() {
        let store = store();
        let pid = funded(&store, ALICE, Decimal::ZERO);

        for amount in [Decimal::ZERO, dec!(-5), dec!(0.001), Decimal::MAX] {
            let err = ledger::deposit(&store, ALICE, pid, amount).unwrap_err();
            assert!(matches!(err, PortfolioError::Validation { .. }));
        }
        assert!(store.cash_transactions(ALICE, pid).unwrap().is_empty());
    }

    #[test]
    fn transfer_conserves_money() {
        let store = store();
        let from = funded(&store, ALICE, dec!(1000));
        let to = ledger::open_portfolio(&store, ALICE, "Savings").unwrap().pid;

        ledger::transfer(&store, ALICE, from, to, dec!(300)).unwrap();

        let a = balance(&store, ALICE, from);
        let b = balance(&store, ALICE, to);
        assert_eq!(a, dec!(700));
        assert_eq!(b, dec!(300));
        assert_eq!(a + b, dec!(1000));

        let debit = &store.cash_transactions(ALICE, from).unwrap()[0];
        let credit = &store.cash_transactions(ALICE, to).unwrap()[0];
        assert_eq!(debit.amount + credit.amount, Decimal::ZERO);
        assert_eq!(debit.destination, "Savings");
        assert_eq!(credit.source, "Main");
    }

    #[test]
    fn transfer_to_same_portfolio_is_rejected() {
        let store = store();
        let pid = funded(&store, ALICE, dec!(100));

        let err = ledger::transfer(&store, ALICE, pid, pid, dec!(10)).unwrap_err();
        assert!(matches!(err, PortfolioError::SameAccount));
        assert_eq!(balance(&store, ALICE, pid), dec!(100));
    }

    #[test]
    fn transfer_beyond_balance_moves_nothing() {
        let store = store();
        let from = funded(&store, ALICE, dec!(100));
        let to = ledger::open_portfolio(&store, ALICE, "Savings").unwrap().pid;

        let err = ledger::transfer(&store, ALICE, from, to, dec!(100.01)).unwrap_err();
        assert!(matches!(err, PortfolioError::InsufficientFunds { .. }));
        assert_eq!(balance(&store, ALICE, from), dec!(100));
        assert_eq!(balance(&store, ALICE, to), Decimal::ZERO);
        assert!(store.cash_transactions(ALICE, to).unwrap().is_empty());
    }

    #[test]
    fn transfer_into_foreign_portfolio_is_not_found() {
        let store = store();
        let mine = funded(&store, ALICE, dec!(100));
        let theirs = funded(&store, BOB, Decimal::ZERO);

        let err = ledger::transfer(&store, ALICE, mine, theirs, dec!(10)).unwrap_err();
        assert!(matches!(err, PortfolioError::NotFound { .. }));
        assert_eq!(balance(&store, ALICE, mine), dec!(100));
        assert_eq!(balance(&store, BOB, theirs), Decimal::ZERO);
    }

    #[test]
    fn other_users_portfolio_is_invisible() {
        let store = store();
        let pid = funded(&store, ALICE, dec!(10));

        assert!(matches!(
            store.get_portfolio(BOB, pid),
            Err(PortfolioError::NotFound { .. })
        ));
        assert!(store.list_portfolios(BOB).unwrap().is_empty());
        assert!(matches!(
            ledger::deposit(&store, BOB, pid, dec!(5)),
            Err(PortfolioError::NotFound { .. })
        ));
    }
}

mod trading {
    use super::*;

    #[test]
    fn buy_then_partial_sell() {
        let store = store();
        seed_closes(&store, "ACME", &[40.0, 45.0, 50.0]);
        let pid = funded(&store, ALICE, dec!(1000));

        let bought = buy(&store, ALICE, pid, "acme", 10).unwrap();
        assert_eq!(bought.symbol, "ACME");
        assert_relative_eq!(bought.price, 50.0);
        assert_eq!(bought.amount, dec!(500));
        assert_eq!(balance(&store, ALICE, pid), dec!(500));

        let sold = sell(&store, ALICE, pid, "ACME", 4).unwrap();
        assert_eq!(sold.amount, dec!(200));
        assert_eq!(balance(&store, ALICE, pid), dec!(700));

        assert_eq!(shares_held(&store, ALICE, pid, "ACME"), 6);
        let records = store.holding_records(ALICE, pid).unwrap();
        assert_eq!(records.iter().map(|r| r.shares).collect::<Vec<_>>(), [10, -4]);
    }

    #[test]
    fn trades_write_no_cash_rows() {
        let store = store();
        seed_closes(&store, "ACME", &[10.0]);
        let pid = funded(&store, ALICE, dec!(100));

        buy(&store, ALICE, pid, "ACME", 3).unwrap();
        sell(&store, ALICE, pid, "ACME", 1).unwrap();

        assert_eq!(store.cash_transactions(ALICE, pid).unwrap().len(), 1);
    }

    #[test]
    fn buy_uses_latest_close_after_new_prices() {
        let store = store();
        seed_closes(&store, "ACME", &[10.0]);
        store
            .upsert_bars(&[make_bar("ACME", "2024-02-01", 12.5)])
            .unwrap();
        let pid = funded(&store, ALICE, dec!(100));

        let fill = buy(&store, ALICE, pid, "ACME", 2).unwrap();
        assert_eq!(fill.amount, dec!(25));
    }

    #[test]
    fn buy_at_penny_close_spends_exact_balance() {
        let store = store();
        seed_closes(&store, "PENNY", &[0.1]);
        let pid = funded(&store, ALICE, dec!(0.3));

        let fill = buy(&store, ALICE, pid, "PENNY", 3).unwrap();
        assert_eq!(fill.amount, dec!(0.3));
        assert_eq!(balance(&store, ALICE, pid), Decimal::ZERO);

        let sold = sell(&store, ALICE, pid, "PENNY", 3).unwrap();
        assert_eq!(sold.amount, dec!(0.3));
        assert_eq!(balance(&store, ALICE, pid), dec!(0.3));
    }

    #[test]
    fn buy_beyond_cash_is_rejected() {
        let store = store();
        seed_closes(&store, "ACME", &[50.0]);
        let pid = funded(&store, ALICE, dec!(100));

        let err = buy(&store, ALICE, pid, "ACME", 3).unwrap_err();
        match err {
            PortfolioError::InsufficientFunds { pid: p, amount } => {
                assert_eq!(p, pid);
                assert_eq!(amount, dec!(150));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(balance(&store, ALICE, pid), dec!(100));
        assert!(store.holding_records(ALICE, pid).unwrap().is_empty());
    }

    #[test]
    fn oversell_reports_held_quantity_and_changes_nothing() {
        let store = store();
        seed_closes(&store, "ACME", &[10.0]);
        let pid = funded(&store, ALICE, dec!(100));
        buy(&store, ALICE, pid, "ACME", 5).unwrap();

        let err = sell(&store, ALICE, pid, "ACME", 6).unwrap_err();
        match err {
            PortfolioError::InsufficientPosition {
                symbol,
                requested,
                held,
            } => {
                assert_eq!(symbol, "ACME");
                assert_eq!(requested, 6);
                assert_eq!(held, 5);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(store.holding_records(ALICE, pid).unwrap().len(), 1);
        assert_eq!(balance(&store, ALICE, pid), dec!(50));
    }

    #[test]
    fn sell_everything_then_buy_back() {
        let store = store();
        seed_closes(&store, "ACME", &[10.0]);
        let pid = funded(&store, ALICE, dec!(100));

        buy(&store, ALICE, pid, "ACME", 5).unwrap();
        sell(&store, ALICE, pid, "ACME", 5).unwrap();
        assert!(fold_positions(&store.holding_records(ALICE, pid).unwrap()).is_empty());

        buy(&store, ALICE, pid, "ACME", 2).unwrap();
        let positions = fold_positions(&store.holding_records(ALICE, pid).unwrap());
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].shares, 2);
        assert_eq!(balance(&store, ALICE, pid), dec!(80));
    }

    #[test]
    fn unknown_symbol_is_rejected_before_pricing() {
        let store = store();
        let pid = funded(&store, ALICE, dec!(100));

        let err = buy(&store, ALICE, pid, "ZZZ", 1).unwrap_err();
        assert!(matches!(err, PortfolioError::UnknownSymbol { .. }));
    }

    #[test]
    fn registered_symbol_without_bars_has_no_price() {
        let store = store();
        store.register_symbol("EMPTY").unwrap();
        let pid = funded(&store, ALICE, dec!(100));

        let err = buy(&store, ALICE, pid, "EMPTY", 1).unwrap_err();
        assert!(matches!(err, PortfolioError::NoPriceData { .. }));
        assert_eq!(balance(&store, ALICE, pid), dec!(100));
    }

    #[test]
    fn invalid_share_counts_are_rejected() {
        let store = store();
        seed_closes(&store, "ACME", &[10.0]);
        let pid = funded(&store, ALICE, dec!(100));

        for shares in [0, -3] {
            assert!(matches!(
                buy(&store, ALICE, pid, "ACME", shares),
                Err(PortfolioError::Validation { .. })
            ));
            assert!(matches!(
                sell(&store, ALICE, pid, "ACME", shares),
                Err(PortfolioError::Validation { .. })
            ));
        }
    }
}

mod portfolio_deletion {
    use super::*;

    #[test]
    fn delete_returns_cash() {
        let store = store();
        let pid = funded(&store, ALICE, dec!(250));

        let returned = ledger::close_portfolio(&store, ALICE, pid).unwrap();
        assert_eq!(returned, dec!(250));
        assert!(matches!(
            store.get_portfolio(ALICE, pid),
            Err(PortfolioError::NotFound { .. })
        ));
        assert!(store.list_portfolios(ALICE).unwrap().is_empty());
    }

    #[test]
    fn delete_with_open_position_is_refused() {
        let store = store();
        seed_closes(&store, "ACME", &[10.0]);
        let pid = funded(&store, ALICE, dec!(100));
        buy(&store, ALICE, pid, "ACME", 1).unwrap();

        let err = ledger::close_portfolio(&store, ALICE, pid).unwrap_err();
        assert!(matches!(err, PortfolioError::OpenPositions { .. }));
        assert_eq!(balance(&store, ALICE, pid), dec!(90));
    }

    #[test]
    fn delete_after_closing_positions_succeeds() {
        let store = store();
        seed_closes(&store, "ACME", &[10.0]);
        let pid = funded(&store, ALICE, dec!(100));
        buy(&store, ALICE, pid, "ACME", 1).unwrap();
        sell(&store, ALICE, pid, "ACME", 1).unwrap();

        let returned = ledger::close_portfolio(&store, ALICE, pid).unwrap();
        assert_eq!(returned, dec!(100));
    }

    #[test]
    fn empty_portfolio_returns_zero() {
        let store = store();
        let pid = funded(&store, ALICE, Decimal::ZERO);
        assert_eq!(ledger::close_portfolio(&store, ALICE, pid).unwrap(), Decimal::ZERO);
    }
}

mod stock_lists {
    use super::*;

    fn seeded() -> (SqliteAdapter, i64) {
        let store = store();
        for user in [ALICE, BOB, CAROL] {
            add_user(&store, user);
        }
        seed_closes(&store, "ACME", &[10.0, 11.0, 12.0]);
        let list = stock_list::create_list(&store, ALICE, "Watch").unwrap();
        stock_list::add_item(&store, ALICE, list.lid, "ACME", 10).unwrap();
        (store, list.lid)
    }

    #[test]
    fn new_list_is_private_to_owner() {
        let (store, lid) = seeded();

        let view = stock_list_view(&store, ALICE, lid, "SPY").unwrap();
        assert_eq!(view.visibility, Visibility::Private);
        assert_eq!(view.stocks.len(), 1);

        assert!(matches!(
            stock_list_view(&store, BOB, lid, "SPY"),
            Err(PortfolioError::NotFound { .. })
        ));
    }

    #[test]
    fn sharing_grants_only_the_grantee() {
        let (store, lid) = seeded();
        stock_list::share_list(&store, ALICE, lid, "Bob@Example.com").unwrap();

        let view = stock_list_view(&store, BOB, lid, "SPY").unwrap();
        assert_eq!(view.visibility, Visibility::Shared);
        assert!(stock_list_view(&store, CAROL, lid, "SPY").is_err());

        let overview = stock_list::lists_overview(&store, BOB).unwrap();
        assert_eq!(overview.shared_with_me.len(), 1);
        let owner_view = stock_list::lists_overview(&store, ALICE).unwrap();
        assert_eq!(owner_view.shared_lists.len(), 1);
        assert!(owner_view.private_lists.is_empty());
    }

    #[test]
    fn sharing_twice_is_a_conflict() {
        let (store, lid) = seeded();
        stock_list::share_list(&store, ALICE, lid, BOB).unwrap();
        assert!(matches!(
            stock_list::share_list(&store, ALICE, lid, BOB),
            Err(PortfolioError::Conflict { .. })
        ));
    }

    #[test]
    fn sharing_with_unknown_user_is_not_found() {
        let (store, lid) = seeded();
        assert!(matches!(
            stock_list::share_list(&store, ALICE, lid, "nobody@example.com"),
            Err(PortfolioError::NotFound { .. })
        ));
    }

    #[test]
    fn going_public_clears_grants() {
        let (store, lid) = seeded();
        stock_list::share_list(&store, ALICE, lid, BOB).unwrap();

        let v = stock_list::set_visibility(&store, ALICE, lid, "public").unwrap();
        assert_eq!(v, Visibility::Public);
        assert!(store.list_grantees(lid).unwrap().is_empty());
        assert!(stock_list_view(&store, CAROL, lid, "SPY").is_ok());

        let overview = stock_list::lists_overview(&store, BOB).unwrap();
        assert!(overview.shared_with_me.is_empty());
        assert_eq!(overview.public_lists.len(), 1);
    }

    #[test]
    fn shared_cannot_be_set_directly() {
        let (store, lid) = seeded();
        assert!(matches!(
            stock_list::set_visibility(&store, ALICE, lid, "shared"),
            Err(PortfolioError::Validation { .. })
        ));
    }

    #[test]
    fn only_owner_may_modify() {
        let (store, lid) = seeded();
        stock_list::set_visibility(&store, ALICE, lid, "public").unwrap();

        assert!(matches!(
            stock_list::add_item(&store, BOB, lid, "ACME", 1),
            Err(PortfolioError::NotFound { .. })
        ));
        assert!(store.delete_list(BOB, lid).is_err());
        store.delete_list(ALICE, lid).unwrap();
        assert!(store.get_list(lid).is_err());
    }

    #[test]
    fn adding_unknown_symbol_is_rejected() {
        let (store, lid) = seeded();
        assert!(matches!(
            stock_list::add_item(&store, ALICE, lid, "NOPE", 1),
            Err(PortfolioError::UnknownSymbol { .. })
        ));
    }
}

mod analytics {
    use super::*;

    #[test]
    fn single_holding_has_no_pairs_and_null_beta_without_benchmark() {
        let store = store();
        seed_closes(&store, "ACME", &[10.0, 20.0, 30.0]);
        let pid = funded(&store, ALICE, dec!(1000));
        buy(&store, ALICE, pid, "ACME", 2).unwrap();

        let view = portfolio_view(&store, ALICE, pid, "SPY").unwrap();
        assert_eq!(view.holdings.len(), 1);
        let holding = &view.holdings[0];
        assert_eq!(holding.close, Some(30.0));
        assert_eq!(view.total_stock_value, dec!(60));
        assert!(holding.beta.is_none());
        assert!(holding.coefficient_of_variation.is_some());
        assert!(view.correlation_matrix.is_empty());
    }

    #[test]
    fn co_moving_holdings_correlate_perfectly() {
        let store = store();
        seed_closes(&store, "ACME", &[10.0, 20.0, 30.0]);
        seed_closes(&store, "BETA", &[20.0, 40.0, 60.0]);
        seed_closes(&store, "SPY", &[10.0, 20.0, 30.0]);
        let pid = funded(&store, ALICE, dec!(1000));
        buy(&store, ALICE, pid, "BETA", 1).unwrap();
        buy(&store, ALICE, pid, "ACME", 1).unwrap();

        let view = portfolio_view(&store, ALICE, pid, "SPY").unwrap();
        assert_eq!(view.correlation_matrix.len(), 1);
        let pair = &view.correlation_matrix[0];
        assert_eq!((pair.stock1.as_str(), pair.stock2.as_str()), ("ACME", "BETA"));
        assert_relative_eq!(pair.correlation.unwrap(), 1.0, epsilon = 1e-9);

        let acme = view.holdings.iter().find(|h| h.stock == "ACME").unwrap();
        let beta = view.holdings.iter().find(|h| h.stock == "BETA").unwrap();
        assert_relative_eq!(acme.beta.unwrap(), 1.0, epsilon = 1e-9);
        assert_relative_eq!(beta.beta.unwrap(), 2.0, epsilon = 1e-9);
        // CV is scale-free.
        assert_relative_eq!(
            acme.coefficient_of_variation.unwrap(),
            beta.coefficient_of_variation.unwrap(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn list_view_renames_correlation_value() {
        let store = store();
        seed_closes(&store, "ACME", &[1.0, 2.0, 3.0]);
        seed_closes(&store, "BETA", &[3.0, 2.0, 1.0]);
        let list = stock_list::create_list(&store, ALICE, "Pair").unwrap();
        stock_list::add_item(&store, ALICE, list.lid, "ACME", 1).unwrap();
        stock_list::add_item(&store, ALICE, list.lid, "BETA", 1).unwrap();

        let view = stock_list_view(&store, ALICE, list.lid, "SPY").unwrap();
        assert_eq!(view.correlation_matrix.len(), 1);
        assert_relative_eq!(
            view.correlation_matrix[0].value.unwrap(),
            -1.0,
            epsilon = 1e-9
        );
    }

    #[test]
    fn summaries_list_positions_with_latest_close() {
        let store = store();
        seed_closes(&store, "ACME", &[10.0, 12.0]);
        seed_closes(&store, "BETA", &[5.0]);
        let main = funded(&store, ALICE, dec!(100));
        let spare = ledger::open_portfolio(&store, ALICE, "Spare").unwrap().pid;
        buy(&store, ALICE, main, "ACME", 2).unwrap();
        buy(&store, ALICE, main, "BETA", 4).unwrap();
        sell(&store, ALICE, main, "BETA", 4).unwrap();

        let summaries = portfolio_summaries(&store, ALICE).unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].pid, main);
        assert_eq!(summaries[0].money, dec!(76));
        assert_eq!(summaries[0].holdings.len(), 1);
        assert_eq!(summaries[0].holdings[0].stock, "ACME");
        assert_eq!(summaries[0].holdings[0].shares, 2);
        assert_eq!(summaries[0].holdings[0].close, Some(12.0));
        assert_eq!(summaries[1].pid, spare);
        assert!(summaries[1].holdings.is_empty());

        assert!(portfolio_summaries(&store, BOB).unwrap().is_empty());
    }

    #[test]
    fn market_data_failure_propagates_from_views() {
        let dir = tempfile::tempdir().unwrap();
        let store = file_store(dir.path());
        seed_closes(&store, "ACME", &[10.0, 11.0]);
        let pid = funded(&store, ALICE, dec!(100));
        buy(&store, ALICE, pid, "ACME", 1).unwrap();
        let list = stock_list::create_list(&store, ALICE, "Watch").unwrap();
        stock_list::add_item(&store, ALICE, list.lid, "ACME", 1).unwrap();

        drop_table(dir.path(), "stock_data");

        let err = portfolio_view(&store, ALICE, pid, "SPY").unwrap_err();
        assert!(err.is_store_failure(), "unexpected error: {err:?}");
        let err = stock_list_view(&store, ALICE, list.lid, "SPY").unwrap_err();
        assert!(err.is_store_failure(), "unexpected error: {err:?}");
        let err = portfolio_summaries(&store, ALICE).unwrap_err();
        assert!(err.is_store_failure(), "unexpected error: {err:?}");
    }

    #[test]
    fn empty_portfolio_view() {
        let store = store();
        let pid = funded(&store, ALICE, dec!(42));

        let view = portfolio_view(&store, ALICE, pid, "SPY").unwrap();
        assert_eq!(view.money, dec!(42));
        assert!(view.holdings.is_empty());
        assert_eq!(view.total_stock_value, Decimal::ZERO);
    }
}

mod forecasting {
    use super::*;

    #[test]
    fn week_projection_continues_the_trend() {
        let market = MockMarketData::new()
            .with_bars("ACME", generate_bars("ACME", "2024-01-01", 10, 100.0));
        let history = market.fetch_history("ACME").unwrap();

        let predictions = predict("ACME", &history, Horizon::Week).unwrap();
        assert_eq!(predictions.len(), 7);
        assert_eq!(predictions[0].date, date(2024, 1, 11));
        assert_relative_eq!(predictions[0].price, 110.0, epsilon = 1e-9);
        assert_relative_eq!(predictions[6].price, 116.0, epsilon = 1e-9);
    }

    #[test]
    fn projection_from_store_history() {
        let store = store();
        seed_closes(&store, "ACME", &[5.0, 5.0, 5.0]);

        let history = store.fetch_history("ACME").unwrap();
        let predictions = predict("ACME", &history, "month".parse().unwrap()).unwrap();
        assert_eq!(predictions.len(), 30);
        assert!(predictions.iter().all(|p| (p.price - 5.0).abs() < 1e-9));
    }

    #[test]
    fn no_history_is_reported() {
        let market = MockMarketData::new();
        let history = market.fetch_history("ACME").unwrap();
        assert!(matches!(
            predict("ACME", &history, Horizon::Year),
            Err(PortfolioError::NoHistory { .. })
        ));
    }

}

mod concurrency {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    /// Runs `count` copies of `op` on their own threads; returns how many
    /// succeeded.
    fn race<F>(store: &Arc<SqliteAdapter>, count: usize, op: F) -> usize
    where
        F: Fn(&SqliteAdapter) -> bool + Send + Sync + 'static,
    {
        let op = Arc::new(op);
        let handles: Vec<_> = (0..count)
            .map(|_| {
                let store = Arc::clone(store);
                let op = Arc::clone(&op);
                thread::spawn(move || op(store.as_ref()))
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count()
    }

    #[test]
    fn concurrent_withdrawals_never_overdraw() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(file_store(dir.path()));
        let pid = funded(&store, ALICE, dec!(1000));

        let succeeded = race(&store, 8, move |s| {
            ledger::withdraw(s, ALICE, pid, dec!(200)).is_ok()
        });

        assert_eq!(succeeded, 5);
        assert_eq!(balance(&store, ALICE, pid), Decimal::ZERO);
        assert_eq!(store.cash_transactions(ALICE, pid).unwrap().len(), 6);
    }

    #[test]
    fn concurrent_sells_never_oversell() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(file_store(dir.path()));
        seed_closes(store.as_ref(), "ACME", &[10.0]);
        let pid = funded(&store, ALICE, dec!(100));
        buy(store.as_ref(), ALICE, pid, "ACME", 5).unwrap();

        let succeeded = race(&store, 8, move |s| sell(s, ALICE, pid, "ACME", 2).is_ok());

        assert_eq!(succeeded, 2);
        assert_eq!(shares_held(&store, ALICE, pid, "ACME"), 1);
        assert_eq!(store.holding_records(ALICE, pid).unwrap().len(), 3);
        assert_eq!(balance(&store, ALICE, pid), dec!(90));
        assert_eq!(store.cash_transactions(ALICE, pid).unwrap().len(), 1);
    }

    #[test]
    fn concurrent_buys_never_overspend() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(file_store(dir.path()));
        seed_closes(store.as_ref(), "ACME", &[10.0]);
        let pid = funded(&store, ALICE, dec!(100));

        let succeeded = race(&store, 8, move |s| buy(s, ALICE, pid, "ACME", 3).is_ok());

        assert_eq!(succeeded, 3);
        assert_eq!(balance(&store, ALICE, pid), dec!(10));
        assert_eq!(shares_held(&store, ALICE, pid, "ACME"), 9);
        assert_eq!(store.holding_records(ALICE, pid).unwrap().len(), 3);
        assert_eq!(store.cash_transactions(ALICE, pid).unwrap().len(), 1);
    }

    #[test]
    fn opposing_transfers_conserve_money() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(file_store(dir.path()));
        let a = funded(&store, ALICE, dec!(300));
        let b = ledger::open_portfolio(store.as_ref(), ALICE, "Other").unwrap().pid;
        ledger::deposit(store.as_ref(), ALICE, b, dec!(100)).unwrap();

        let backward_store = Arc::clone(&store);
        let backward = thread::spawn(move || {
            race(&backward_store, 6, move |s| {
                ledger::transfer(s, ALICE, b, a, dec!(50.5)).is_ok()
            })
        });
        let forward = race(&store, 6, move |s| {
            ledger::transfer(s, ALICE, a, b, dec!(75.25)).is_ok()
        });
        let backward = backward.join().unwrap();

        let balance_a = balance(&store, ALICE, a);
        let balance_b = balance(&store, ALICE, b);
        assert_eq!(balance_a + balance_b, dec!(400));
        assert!(balance_a >= Decimal::ZERO && balance_b >= Decimal::ZERO);

        // One opening deposit plus one leg per committed transfer on each side.
        let moves = forward + backward;
        for (pid, money) in [(a, balance_a), (b, balance_b)] {
            let rows = store.cash_transactions(ALICE, pid).unwrap();
            assert_eq!(rows.len(), 1 + moves);
            let total: Decimal = rows.iter().map(|r| r.amount).sum();
            assert_eq!(total, money);
        }
        assert_eq!(
            balance_a,
            dec!(300) - dec!(75.25) * Decimal::from(forward) + dec!(50.5) * Decimal::from(backward)
        );
    }
}

mod invariants {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone)]
    enum Op {
        Deposit(i64),
        Withdraw(i64),
        Buy(i64),
        Sell(i64),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1..50_000i64).prop_map(Op::Deposit),
            (1..50_000i64).prop_map(Op::Withdraw),
            (1..20i64).prop_map(Op::Buy),
            (1..20i64).prop_map(Op::Sell),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn balance_matches_cash_flows(ops in prop::collection::vec(op(), 1..40)) {
            let store = store();
            seed_closes(&store, "ACME", &[12.35]);
            let pid = funded(&store, ALICE, Decimal::ZERO);
            let mut expected = Decimal::ZERO;

            for op in ops {
                match op {
                    Op::Deposit(cents) => {
                        let amount = Decimal::new(cents, 2);
                        if ledger::deposit(&store, ALICE, pid, amount).is_ok() {
                            expected += amount;
                        }
                    }
                    Op::Withdraw(cents) => {
                        let amount = Decimal::new(cents, 2);
                        if ledger::withdraw(&store, ALICE, pid, amount).is_ok() {
                            expected -= amount;
                        }
                    }
                    Op::Buy(n) => {
                        if let Ok(fill) = buy(&store, ALICE, pid, "ACME", n) {
                            expected -= fill.amount;
                        }
                    }
                    Op::Sell(n) => {
                        if let Ok(fill) = sell(&store, ALICE, pid, "ACME", n) {
                            expected += fill.amount;
                        }
                    }
                }
                let money = balance(&store, ALICE, pid);
                prop_assert_eq!(money, expected);
                prop_assert!(money >= Decimal::ZERO);
                let net: i64 = store
                    .holding_records(ALICE, pid)
                    .unwrap()
                    .iter()
                    .map(|r| r.shares)
                    .sum();
                prop_assert!(net >= 0);
            }
        }
    }
}
