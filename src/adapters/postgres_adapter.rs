//! PostgreSQL store adapter.
//!
//! Mutations lock the affected portfolio or list row with `SELECT ... FOR
//! UPDATE` before the guarded statement, so concurrent requests against the
//! same account run one after the other.

use std::time::Duration;

use chrono::NaiveDate;
use postgres::types::ToSql;
use postgres::{GenericClient, NoTls, Row};
use r2d2::{Pool, PooledConnection};
use r2d2_postgres::PostgresConnectionManager;
use rust_decimal::Decimal;

use crate::domain::error::PortfolioError;
use crate::domain::ledger::{CashTransaction, LedgerEntry};
use crate::domain::money::{from_cents, to_cents, trade_value};
use crate::domain::portfolio::{Portfolio, User};
use crate::domain::position::{Fill, HoldingRecord};
use crate::domain::price_bar::PriceBar;
use crate::domain::stock_list::{ListItem, StockList, Visibility};
use crate::ports::config_port::ConfigPort;
use crate::ports::holdings_port::HoldingsPort;
use crate::ports::ledger_port::LedgerPort;
use crate::ports::market_data_port::MarketDataPort;
use crate::ports::stock_list_port::StockListPort;

type Manager = PostgresConnectionManager<NoTls>;

/// Cash columns (`money`, `amount`) hold whole cents.
const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS users (
        email TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        password_hash TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS portfolios (
        pid BIGSERIAL PRIMARY KEY,
        owner TEXT NOT NULL,
        name TEXT NOT NULL,
        money BIGINT NOT NULL DEFAULT 0 CHECK (money >= 0)
    );
    CREATE INDEX IF NOT EXISTS idx_portfolios_owner ON portfolios(owner);
    CREATE TABLE IF NOT EXISTS cash_transactions (
        tid BIGSERIAL PRIMARY KEY,
        pid BIGINT NOT NULL,
        amount BIGINT NOT NULL,
        source TEXT NOT NULL,
        destination TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_cash_transactions_pid ON cash_transactions(pid);
    CREATE TABLE IF NOT EXISTS holdings (
        tid BIGSERIAL PRIMARY KEY,
        pid BIGINT NOT NULL,
        symbol TEXT NOT NULL,
        shares BIGINT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_holdings_pid_symbol ON holdings(pid, symbol);
    CREATE TABLE IF NOT EXISTS stocks (
        symbol TEXT PRIMARY KEY
    );
    CREATE TABLE IF NOT EXISTS stock_data (
        symbol TEXT NOT NULL,
        date DATE NOT NULL,
        open DOUBLE PRECISION NOT NULL,
        high DOUBLE PRECISION NOT NULL,
        low DOUBLE PRECISION NOT NULL,
        close DOUBLE PRECISION NOT NULL,
        volume BIGINT NOT NULL,
        PRIMARY KEY (symbol, date)
    );
    CREATE TABLE IF NOT EXISTS stock_lists (
        lid BIGSERIAL PRIMARY KEY,
        owner TEXT NOT NULL,
        name TEXT NOT NULL,
        visibility TEXT NOT NULL DEFAULT 'private'
    );
    CREATE TABLE IF NOT EXISTS stock_list_items (
        lid BIGINT NOT NULL,
        symbol TEXT NOT NULL,
        shares BIGINT NOT NULL,
        PRIMARY KEY (lid, symbol)
    );
    CREATE TABLE IF NOT EXISTS stock_list_shares (
        lid BIGINT NOT NULL,
        email TEXT NOT NULL,
        PRIMARY KEY (lid, email)
    );";

const BAR_COLUMNS: &str = "symbol, date, open, high, low, close, volume";

pub struct PostgresAdapter {
    pool: Pool<Manager>,
}

fn pool_err(e: r2d2::Error) -> PortfolioError {
    PortfolioError::Database {
        reason: e.to_string(),
    }
}

fn query_err(e: postgres::Error) -> PortfolioError {
    PortfolioError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn bar_from_row(row: &Row) -> PriceBar {
    PriceBar {
        symbol: row.get(0),
        date: row.get(1),
        open: row.get(2),
        high: row.get(3),
        low: row.get(4),
        close: row.get(5),
        volume: row.get(6),
    }
}

fn portfolio_from_row(row: &Row) -> Portfolio {
    Portfolio {
        pid: row.get(0),
        owner: row.get(1),
        name: row.get(2),
        money: from_cents(row.get(3)),
    }
}

fn list_from_row(row: &Row) -> Result<StockList, PortfolioError> {
    let visibility: String = row.get(3);
    Ok(StockList {
        lid: row.get(0),
        owner: row.get(1),
        name: row.get(2),
        visibility: visibility.parse()?,
    })
}

/// Looks up a portfolio of `owner`, row-locked when `lock` is set.
fn owned_portfolio<C: GenericClient>(
    client: &mut C,
    owner: &str,
    pid: i64,
    lock: bool,
) -> Result<Portfolio, PortfolioError> {
    let sql = if lock {
        "SELECT pid, owner, name, money FROM portfolios WHERE pid = $1 AND owner = $2 FOR UPDATE"
    } else {
        "SELECT pid, owner, name, money FROM portfolios WHERE pid = $1 AND owner = $2"
    };
    client
        .query_opt(sql, &[&pid, &owner])
        .map_err(query_err)?
        .map(|row| portfolio_from_row(&row))
        .ok_or_else(|| PortfolioError::not_found("portfolio", pid))
}

fn owned_list<C: GenericClient>(
    client: &mut C,
    owner: &str,
    lid: i64,
) -> Result<StockList, PortfolioError> {
    let row = client
        .query_opt(
            "SELECT lid, owner, name, visibility FROM stock_lists
             WHERE lid = $1 AND owner = $2 FOR UPDATE",
            &[&lid, &owner],
        )
        .map_err(query_err)?
        .ok_or_else(|| PortfolioError::not_found("stock list", lid))?;
    list_from_row(&row)
}

fn append_entry<C: GenericClient>(client: &mut C, entry: &LedgerEntry) -> Result<(), PortfolioError> {
    let cents = to_cents(entry.amount)?;
    client
        .execute(
            "INSERT INTO cash_transactions (pid, amount, source, destination)
             VALUES ($1, $2, $3, $4)",
            &[&entry.pid, &cents, &entry.source, &entry.destination],
        )
        .map_err(query_err)?;
    Ok(())
}

fn debit<C: GenericClient>(
    client: &mut C,
    owner: &str,
    pid: i64,
    amount: Decimal,
) -> Result<bool, PortfolioError> {
    let cents = to_cents(amount)?;
    let updated = client
        .execute(
            "UPDATE portfolios SET money = money - $1
             WHERE pid = $2 AND owner = $3 AND money >= $1",
            &[&cents, &pid, &owner],
        )
        .map_err(query_err)?;
    Ok(updated == 1)
}

fn credit<C: GenericClient>(
    client: &mut C,
    owner: &str,
    pid: i64,
    amount: Decimal,
) -> Result<(), PortfolioError> {
    let cents = to_cents(amount)?;
    client
        .execute(
            "UPDATE portfolios SET money = money + $1 WHERE pid = $2 AND owner = $3",
            &[&cents, &pid, &owner],
        )
        .map_err(query_err)?;
    Ok(())
}

fn latest_close<C: GenericClient>(client: &mut C, symbol: &str) -> Result<f64, PortfolioError> {
    client
        .query_opt(
            "SELECT close FROM stock_data WHERE symbol = $1 ORDER BY date DESC LIMIT 1",
            &[&symbol],
        )
        .map_err(query_err)?
        .map(|row| row.get(0))
        .ok_or_else(|| PortfolioError::NoPriceData {
            symbol: symbol.to_string(),
        })
}

impl PostgresAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, PortfolioError> {
        // [postgres] connection_string, falling back to [database] conninfo
        let connection_string = config
            .get_string("postgres", "connection_string")
            .or_else(|| config.get_string("database", "conninfo"))
            .ok_or_else(|| PortfolioError::ConfigMissing {
                section: "postgres".into(),
                key: "connection_string".into(),
            })?;

        let pg_config = connection_string
            .parse::<postgres::Config>()
            .map_err(|e| PortfolioError::ConfigInvalid {
                section: "postgres".into(),
                key: "connection_string".into(),
                reason: e.to_string(),
            })?;

        let pool_size = config.get_int("postgres", "pool_size", 8).max(1) as u32;
        let timeout = config.get_int("postgres", "connect_timeout_secs", 10).max(1) as u64;

        let manager = PostgresConnectionManager::new(pg_config, NoTls);
        let pool = Pool::builder()
            .max_size(pool_size)
            .connection_timeout(Duration::from_secs(timeout))
            .build(manager)
            .map_err(pool_err)?;

        tracing::debug!(pool_size, "postgres pool ready");
        Ok(Self { pool })
    }

    pub fn initialize_schema(&self) -> Result<(), PortfolioError> {
        self.client()?.batch_execute(SCHEMA).map_err(query_err)
    }

    fn client(&self) -> Result<PooledConnection<Manager>, PortfolioError> {
        self.pool.get().map_err(pool_err)
    }

    fn query_lists(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Vec<StockList>, PortfolioError> {
        self.client()?
            .query(sql, params)
            .map_err(query_err)?
            .iter()
            .map(list_from_row)
            .collect()
    }
}

impl MarketDataPort for PostgresAdapter {
    fn register_symbol(&self, symbol: &str) -> Result<(), PortfolioError> {
        self.client()?
            .execute(
                "INSERT INTO stocks (symbol) VALUES ($1) ON CONFLICT DO NOTHING",
                &[&symbol],
            )
            .map_err(query_err)?;
        Ok(())
    }

    fn symbol_exists(&self, symbol: &str) -> Result<bool, PortfolioError> {
        let row = self
            .client()?
            .query_one(
                "SELECT EXISTS(SELECT 1 FROM stocks WHERE symbol = $1)",
                &[&symbol],
            )
            .map_err(query_err)?;
        Ok(row.get(0))
    }

    fn upsert_bars(&self, bars: &[PriceBar]) -> Result<usize, PortfolioError> {
        let mut client = self.client()?;
        let mut tx = client.transaction().map_err(query_err)?;

        for bar in bars {
            tx.execute(
                "INSERT INTO stocks (symbol) VALUES ($1) ON CONFLICT DO NOTHING",
                &[&bar.symbol],
            )
            .map_err(query_err)?;
            tx.execute(
                "INSERT INTO stock_data (symbol, date, open, high, low, close, volume)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)
                 ON CONFLICT (symbol, date) DO UPDATE SET
                     open = EXCLUDED.open, high = EXCLUDED.high, low = EXCLUDED.low,
                     close = EXCLUDED.close, volume = EXCLUDED.volume",
                &[
                    &bar.symbol,
                    &bar.date,
                    &bar.open,
                    &bar.high,
                    &bar.low,
                    &bar.close,
                    &bar.volume,
                ],
            )
            .map_err(query_err)?;
        }

        tx.commit().map_err(query_err)?;
        Ok(bars.len())
    }

    fn fetch_history(&self, symbol: &str) -> Result<Vec<PriceBar>, PortfolioError> {
        let query =
            format!("SELECT {BAR_COLUMNS} FROM stock_data WHERE symbol = $1 ORDER BY date ASC");
        let rows = self
            .client()?
            .query(query.as_str(), &[&symbol])
            .map_err(query_err)?;
        Ok(rows.iter().map(bar_from_row).collect())
    }

    fn latest_bar(&self, symbol: &str) -> Result<Option<PriceBar>, PortfolioError> {
        let query = format!(
            "SELECT {BAR_COLUMNS} FROM stock_data WHERE symbol = $1 ORDER BY date DESC LIMIT 1"
        );
        let row = self
            .client()?
            .query_opt(query.as_str(), &[&symbol])
            .map_err(query_err)?;
        Ok(row.as_ref().map(bar_from_row))
    }

    fn list_symbols(&self) -> Result<Vec<String>, PortfolioError> {
        let rows = self
            .client()?
            .query("SELECT symbol FROM stocks ORDER BY symbol", &[])
            .map_err(query_err)?;
        Ok(rows.iter().map(|row| row.get(0)).collect())
    }

    fn get_data_range(
        &self,
        symbol: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, PortfolioError> {
        let row = self
            .client()?
            .query_one(
                "SELECT MIN(date), MAX(date), COUNT(*) FROM stock_data WHERE symbol = $1",
                &[&symbol],
            )
            .map_err(query_err)?;

        let min: Option<NaiveDate> = row.get(0);
        let max: Option<NaiveDate> = row.get(1);
        let count: i64 = row.get(2);

        match (min, max) {
            (Some(min), Some(max)) if count > 0 => Ok(Some((min, max, count as usize))),
            _ => Ok(None),
        }
    }
}

impl LedgerPort for PostgresAdapter {
    fn create_user(&self, user: &User) -> Result<(), PortfolioError> {
        let inserted = self
            .client()?
            .execute(
                "INSERT INTO users (email, name, password_hash) VALUES ($1, $2, $3)
                 ON CONFLICT (email) DO NOTHING",
                &[&user.email, &user.name, &user.password_hash],
            )
            .map_err(query_err)?;
        if inserted == 0 {
            return Err(PortfolioError::Conflict {
                reason: format!("user {} already exists", user.email),
            });
        }
        Ok(())
    }

    fn user_exists(&self, email: &str) -> Result<bool, PortfolioError> {
        let row = self
            .client()?
            .query_one(
                "SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)",
                &[&email],
            )
            .map_err(query_err)?;
        Ok(row.get(0))
    }

    fn create_portfolio(&self, owner: &str, name: &str) -> Result<Portfolio, PortfolioError> {
        let row = self
            .client()?
            .query_one(
                "INSERT INTO portfolios (owner, name, money) VALUES ($1, $2, 0)
                 RETURNING pid, owner, name, money",
                &[&owner, &name],
            )
            .map_err(query_err)?;
        Ok(portfolio_from_row(&row))
    }

    fn list_portfolios(&self, owner: &str) -> Result<Vec<Portfolio>, PortfolioError> {
        let rows = self
            .client()?
            .query(
                "SELECT pid, owner, name, money FROM portfolios WHERE owner = $1 ORDER BY pid",
                &[&owner],
            )
            .map_err(query_err)?;
        Ok(rows.iter().map(portfolio_from_row).collect())
    }

    fn get_portfolio(&self, owner: &str, pid: i64) -> Result<Portfolio, PortfolioError> {
        let mut client = self.client()?;
        owned_portfolio(&mut *client, owner, pid, false)
    }

    fn delete_portfolio(&self, owner: &str, pid: i64) -> Result<Decimal, PortfolioError> {
        let mut client = self.client()?;
        let mut tx = client.transaction().map_err(query_err)?;
        let portfolio = owned_portfolio(&mut tx, owner, pid, true)?;

        let open: i64 = tx
            .query_one(
                "SELECT COUNT(*) FROM (
                     SELECT symbol FROM holdings WHERE pid = $1
                     GROUP BY symbol HAVING SUM(shares) > 0
                 ) AS open_positions",
                &[&pid],
            )
            .map_err(query_err)?
            .get(0);
        if open > 0 {
            return Err(PortfolioError::OpenPositions { pid });
        }

        if portfolio.money > Decimal::ZERO {
            append_entry(&mut tx, &LedgerEntry::closing(&portfolio))?;
        }
        tx.execute(
            "DELETE FROM portfolios WHERE pid = $1 AND owner = $2",
            &[&pid, &owner],
        )
        .map_err(query_err)?;

        tx.commit().map_err(query_err)?;
        Ok(portfolio.money)
    }

    fn deposit(&self, owner: &str, pid: i64, amount: Decimal) -> Result<(), PortfolioError> {
        let mut client = self.client()?;
        let mut tx = client.transaction().map_err(query_err)?;
        let portfolio = owned_portfolio(&mut tx, owner, pid, true)?;

        credit(&mut tx, owner, pid, amount)?;
        append_entry(&mut tx, &LedgerEntry::deposit(&portfolio, amount))?;

        tx.commit().map_err(query_err)
    }

    fn withdraw(&self, owner: &str, pid: i64, amount: Decimal) -> Result<(), PortfolioError> {
        let mut client = self.client()?;
        let mut tx = client.transaction().map_err(query_err)?;
        let portfolio = owned_portfolio(&mut tx, owner, pid, true)?;

        if !debit(&mut tx, owner, pid, amount)? {
            return Err(PortfolioError::InsufficientFunds { pid, amount });
        }
        append_entry(&mut tx, &LedgerEntry::withdrawal(&portfolio, amount))?;

        tx.commit().map_err(query_err)
    }

    fn transfer(
        &self,
        owner: &str,
        from_pid: i64,
        to_pid: i64,
        amount: Decimal,
    ) -> Result<(), PortfolioError> {
        let mut client = self.client()?;
        let mut tx = client.transaction().map_err(query_err)?;

        // Lock in pid order so opposing transfers cannot deadlock.
        let (first, second) = if from_pid < to_pid {
            (from_pid, to_pid)
        } else {
            (to_pid, from_pid)
        };
        let a = owned_portfolio(&mut tx, owner, first, true)?;
        let b = owned_portfolio(&mut tx, owner, second, true)?;
        let (from, to) = if a.pid == from_pid { (a, b) } else { (b, a) };

        if !debit(&mut tx, owner, from_pid, amount)? {
            return Err(PortfolioError::InsufficientFunds {
                pid: from_pid,
                amount,
            });
        }
        credit(&mut tx, owner, to_pid, amount)?;
        for leg in LedgerEntry::transfer_legs(&from, &to, amount) {
            append_entry(&mut tx, &leg)?;
        }

        tx.commit().map_err(query_err)
    }

    fn cash_transactions(
        &self,
        owner: &str,
        pid: i64,
    ) -> Result<Vec<CashTransaction>, PortfolioError> {
        let mut client = self.client()?;
        owned_portfolio(&mut *client, owner, pid, false)?;
        let rows = client
            .query(
                "SELECT tid, pid, amount, source, destination
                 FROM cash_transactions WHERE pid = $1 ORDER BY tid DESC",
                &[&pid],
            )
            .map_err(query_err)?;
        Ok(rows
            .iter()
            .map(|row| CashTransaction {
                tid: row.get(0),
                pid: row.get(1),
                amount: from_cents(row.get(2)),
                source: row.get(3),
                destination: row.get(4),
            })
            .collect())
    }
}

impl HoldingsPort for PostgresAdapter {
    fn buy(
        &self,
        owner: &str,
        pid: i64,
        symbol: &str,
        shares: i64,
    ) -> Result<Fill, PortfolioError> {
        let mut client = self.client()?;
        let mut tx = client.transaction().map_err(query_err)?;
        owned_portfolio(&mut tx, owner, pid, true)?;

        let known: bool = tx
            .query_one(
                "SELECT EXISTS(SELECT 1 FROM stocks WHERE symbol = $1)",
                &[&symbol],
            )
            .map_err(query_err)?
            .get(0);
        if !known {
            return Err(PortfolioError::UnknownSymbol {
                symbol: symbol.to_string(),
            });
        }

        let price = latest_close(&mut tx, symbol)?;
        let cost = trade_value(price, shares)?;
        if !debit(&mut tx, owner, pid, cost)? {
            return Err(PortfolioError::InsufficientFunds { pid, amount: cost });
        }
        tx.execute(
            "INSERT INTO holdings (pid, symbol, shares) VALUES ($1, $2, $3)",
            &[&pid, &symbol, &shares],
        )
        .map_err(query_err)?;

        tx.commit().map_err(query_err)?;
        Ok(Fill {
            symbol: symbol.to_string(),
            shares,
            price,
            amount: cost,
        })
    }

    fn sell(
        &self,
        owner: &str,
        pid: i64,
        symbol: &str,
        shares: i64,
    ) -> Result<Fill, PortfolioError> {
        let mut client = self.client()?;
        let mut tx = client.transaction().map_err(query_err)?;
        owned_portfolio(&mut tx, owner, pid, true)?;

        let inserted = tx
            .execute(
                "INSERT INTO holdings (pid, symbol, shares)
                 SELECT $1::BIGINT, $2::TEXT, -$3::BIGINT
                 WHERE (SELECT COALESCE(SUM(shares), 0)::BIGINT FROM holdings
                        WHERE pid = $1::BIGINT AND symbol = $2::TEXT) >= $3::BIGINT",
                &[&pid, &symbol, &shares],
            )
            .map_err(query_err)?;
        if inserted == 0 {
            let held: i64 = tx
                .query_one(
                    "SELECT COALESCE(SUM(shares), 0)::BIGINT FROM holdings
                     WHERE pid = $1 AND symbol = $2",
                    &[&pid, &symbol],
                )
                .map_err(query_err)?
                .get(0);
            return Err(PortfolioError::InsufficientPosition {
                symbol: symbol.to_string(),
                requested: shares,
                held,
            });
        }

        let price = latest_close(&mut tx, symbol)?;
        let proceeds = trade_value(price, shares)?;
        credit(&mut tx, owner, pid, proceeds)?;

        tx.commit().map_err(query_err)?;
        Ok(Fill {
            symbol: symbol.to_string(),
            shares,
            price,
            amount: proceeds,
        })
    }

    fn holding_records(&self, owner: &str, pid: i64) -> Result<Vec<HoldingRecord>, PortfolioError> {
        let mut client = self.client()?;
        owned_portfolio(&mut *client, owner, pid, false)?;
        let rows = client
            .query(
                "SELECT tid, pid, symbol, shares FROM holdings WHERE pid = $1 ORDER BY tid",
                &[&pid],
            )
            .map_err(query_err)?;
        Ok(rows
            .iter()
            .map(|row| HoldingRecord {
                tid: row.get(0),
                pid: row.get(1),
                symbol: row.get(2),
                shares: row.get(3),
            })
            .collect())
    }
}

impl StockListPort for PostgresAdapter {
    fn create_list(&self, owner: &str, name: &str) -> Result<StockList, PortfolioError> {
        let row = self
            .client()?
            .query_one(
                "INSERT INTO stock_lists (owner, name, visibility) VALUES ($1, $2, 'private')
                 RETURNING lid, owner, name, visibility",
                &[&owner, &name],
            )
            .map_err(query_err)?;
        list_from_row(&row)
    }

    fn owned_lists(&self, owner: &str) -> Result<Vec<StockList>, PortfolioError> {
        self.query_lists(
            "SELECT lid, owner, name, visibility FROM stock_lists WHERE owner = $1 ORDER BY lid",
            &[&owner],
        )
    }

    fn public_lists(&self) -> Result<Vec<StockList>, PortfolioError> {
        self.query_lists(
            "SELECT lid, owner, name, visibility FROM stock_lists
             WHERE visibility = 'public' ORDER BY lid",
            &[],
        )
    }

    fn granted_lists(&self, email: &str) -> Result<Vec<StockList>, PortfolioError> {
        self.query_lists(
            "SELECT l.lid, l.owner, l.name, l.visibility
             FROM stock_lists l JOIN stock_list_shares s ON s.lid = l.lid
             WHERE s.email = $1 ORDER BY l.lid",
            &[&email],
        )
    }

    fn get_list(&self, lid: i64) -> Result<StockList, PortfolioError> {
        let row = self
            .client()?
            .query_opt(
                "SELECT lid, owner, name, visibility FROM stock_lists WHERE lid = $1",
                &[&lid],
            )
            .map_err(query_err)?
            .ok_or_else(|| PortfolioError::not_found("stock list", lid))?;
        list_from_row(&row)
    }

    fn list_items(&self, lid: i64) -> Result<Vec<ListItem>, PortfolioError> {
        let rows = self
            .client()?
            .query(
                "SELECT symbol, shares FROM stock_list_items WHERE lid = $1 ORDER BY symbol",
                &[&lid],
            )
            .map_err(query_err)?;
        Ok(rows
            .iter()
            .map(|row| ListItem {
                symbol: row.get(0),
                shares: row.get(1),
            })
            .collect())
    }

    fn list_grantees(&self, lid: i64) -> Result<Vec<String>, PortfolioError> {
        let rows = self
            .client()?
            .query(
                "SELECT email FROM stock_list_shares WHERE lid = $1 ORDER BY email",
                &[&lid],
            )
            .map_err(query_err)?;
        Ok(rows.iter().map(|row| row.get(0)).collect())
    }

    fn add_item(
        &self,
        owner: &str,
        lid: i64,
        symbol: &str,
        shares: i64,
    ) -> Result<(), PortfolioError> {
        let mut client = self.client()?;
        let mut tx = client.transaction().map_err(query_err)?;
        owned_list(&mut tx, owner, lid)?;
        tx.execute(
            "INSERT INTO stock_list_items (lid, symbol, shares) VALUES ($1, $2, $3)
             ON CONFLICT (lid, symbol) DO UPDATE
             SET shares = stock_list_items.shares + EXCLUDED.shares",
            &[&lid, &symbol, &shares],
        )
        .map_err(query_err)?;
        tx.commit().map_err(query_err)
    }

    fn share_list(&self, owner: &str, lid: i64, email: &str) -> Result<(), PortfolioError> {
        let mut client = self.client()?;
        let mut tx = client.transaction().map_err(query_err)?;
        owned_list(&mut tx, owner, lid)?;

        let granted = tx
            .execute(
                "INSERT INTO stock_list_shares (lid, email) VALUES ($1, $2)
                 ON CONFLICT DO NOTHING",
                &[&lid, &email],
            )
            .map_err(query_err)?;
        if granted == 0 {
            return Err(PortfolioError::Conflict {
                reason: format!("stock list {lid} is already shared with {email}"),
            });
        }
        tx.execute(
            "UPDATE stock_lists SET visibility = 'shared' WHERE lid = $1",
            &[&lid],
        )
        .map_err(query_err)?;

        tx.commit().map_err(query_err)
    }

    fn set_visibility(
        &self,
        owner: &str,
        lid: i64,
        visibility: Visibility,
    ) -> Result<(), PortfolioError> {
        let mut client = self.client()?;
        let mut tx = client.transaction().map_err(query_err)?;
        owned_list(&mut tx, owner, lid)?;

        tx.execute("DELETE FROM stock_list_shares WHERE lid = $1", &[&lid])
            .map_err(query_err)?;
        tx.execute(
            "UPDATE stock_lists SET visibility = $1 WHERE lid = $2",
            &[&visibility.as_str(), &lid],
        )
        .map_err(query_err)?;

        tx.commit().map_err(query_err)
    }

    fn delete_list(&self, owner: &str, lid: i64) -> Result<(), PortfolioError> {
        let mut client = self.client()?;
        let mut tx = client.transaction().map_err(query_err)?;
        owned_list(&mut tx, owner, lid)?;

        for sql in [
            "DELETE FROM stock_list_shares WHERE lid = $1",
            "DELETE FROM stock_list_items WHERE lid = $1",
            "DELETE FROM stock_lists WHERE lid = $1",
        ] {
            tx.execute(sql, &[&lid]).map_err(query_err)?;
        }

        tx.commit().map_err(query_err)
    }
}
