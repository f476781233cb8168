//! SQLite store adapter.
//!
//! Every mutation opens a `BEGIN IMMEDIATE` transaction so concurrent writers
//! queue on the database lock instead of failing at commit. Sufficiency checks
//! are single guarded statements whose affected-row count decides the outcome.

use std::time::Duration;

use chrono::NaiveDate;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OptionalExtension, Row, Transaction, TransactionBehavior, params};
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

const DATE_FMT: &str = "%Y-%m-%d";

/// Cash columns (`money`, `amount`) hold whole cents.
const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS users (
        email TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        password_hash TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS portfolios (
        pid INTEGER PRIMARY KEY AUTOINCREMENT,
        owner TEXT NOT NULL,
        name TEXT NOT NULL,
        money INTEGER NOT NULL DEFAULT 0 CHECK (money >= 0)
    );
    CREATE INDEX IF NOT EXISTS idx_portfolios_owner ON portfolios(owner);
    CREATE TABLE IF NOT EXISTS cash_transactions (
        tid INTEGER PRIMARY KEY AUTOINCREMENT,
        pid INTEGER NOT NULL,
        amount INTEGER NOT NULL,
        source TEXT NOT NULL,
        destination TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_cash_transactions_pid ON cash_transactions(pid);
    CREATE TABLE IF NOT EXISTS holdings (
        tid INTEGER PRIMARY KEY AUTOINCREMENT,
        pid INTEGER NOT NULL,
        symbol TEXT NOT NULL,
        shares INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_holdings_pid_symbol ON holdings(pid, symbol);
    CREATE TABLE IF NOT EXISTS stocks (
        symbol TEXT PRIMARY KEY
    );
    CREATE TABLE IF NOT EXISTS stock_data (
        symbol TEXT NOT NULL,
        date TEXT NOT NULL,
        open REAL NOT NULL,
        high REAL NOT NULL,
        low REAL NOT NULL,
        close REAL NOT NULL,
        volume INTEGER NOT NULL,
        PRIMARY KEY (symbol, date)
    );
    CREATE INDEX IF NOT EXISTS idx_stock_data_date ON stock_data(date);
    CREATE TABLE IF NOT EXISTS stock_lists (
        lid INTEGER PRIMARY KEY AUTOINCREMENT,
        owner TEXT NOT NULL,
        name TEXT NOT NULL,
        visibility TEXT NOT NULL DEFAULT 'private'
    );
    CREATE TABLE IF NOT EXISTS stock_list_items (
        lid INTEGER NOT NULL,
        symbol TEXT NOT NULL,
        shares INTEGER NOT NULL,
        PRIMARY KEY (lid, symbol)
    );
    CREATE TABLE IF NOT EXISTS stock_list_shares (
        lid INTEGER NOT NULL,
        email TEXT NOT NULL,
        PRIMARY KEY (lid, email)
    );";

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

fn pool_err(e: r2d2::Error) -> PortfolioError {
    PortfolioError::Database {
        reason: e.to_string(),
    }
}

fn query_err(e: rusqlite::Error) -> PortfolioError {
    PortfolioError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn date_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let text: String = row.get(idx)?;
    NaiveDate::parse_from_str(&text, DATE_FMT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn bar_from_row(row: &Row<'_>) -> rusqlite::Result<PriceBar> {
    Ok(PriceBar {
        symbol: row.get(0)?,
        date: date_column(row, 1)?,
        open: row.get(2)?,
        high: row.get(3)?,
        low: row.get(4)?,
        close: row.get(5)?,
        volume: row.get(6)?,
    })
}

fn portfolio_from_row(row: &Row<'_>) -> rusqlite::Result<Portfolio> {
    Ok(Portfolio {
        pid: row.get(0)?,
        owner: row.get(1)?,
        name: row.get(2)?,
        money: from_cents(row.get(3)?),
    })
}

fn list_from_row(row: &Row<'_>) -> rusqlite::Result<StockList> {
    let visibility: String = row.get(3)?;
    let visibility = visibility.parse::<Visibility>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(StockList {
        lid: row.get(0)?,
        owner: row.get(1)?,
        name: row.get(2)?,
        visibility,
    })
}

fn immediate(conn: &mut Connection) -> Result<Transaction<'_>, PortfolioError> {
    conn.transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(query_err)
}

fn owned_portfolio(conn: &Connection, owner: &str, pid: i64) -> Result<Portfolio, PortfolioError> {
    conn.query_row(
        "SELECT pid, owner, name, money FROM portfolios WHERE pid = ?1 AND owner = ?2",
        params![pid, owner],
        portfolio_from_row,
    )
    .optional()
    .map_err(query_err)?
    .ok_or_else(|| PortfolioError::not_found("portfolio", pid))
}

fn owned_list(conn: &Connection, owner: &str, lid: i64) -> Result<StockList, PortfolioError> {
    conn.query_row(
        "SELECT lid, owner, name, visibility FROM stock_lists WHERE lid = ?1 AND owner = ?2",
        params![lid, owner],
        list_from_row,
    )
    .optional()
    .map_err(query_err)?
    .ok_or_else(|| PortfolioError::not_found("stock list", lid))
}

fn append_entry(conn: &Connection, entry: &LedgerEntry) -> Result<(), PortfolioError> {
    conn.execute(
        "INSERT INTO cash_transactions (pid, amount, source, destination)
         VALUES (?1, ?2, ?3, ?4)",
        params![entry.pid, to_cents(entry.amount)?, entry.source, entry.destination],
    )
    .map_err(query_err)?;
    Ok(())
}

/// Guarded decrement: touches the row only when it covers `amount`.
fn debit(
    conn: &Connection,
    owner: &str,
    pid: i64,
    amount: Decimal,
) -> Result<bool, PortfolioError> {
    let cents = to_cents(amount)?;
    let updated = conn
        .execute(
            "UPDATE portfolios SET money = money - ?1
             WHERE pid = ?2 AND owner = ?3 AND money >= ?1",
            params![cents, pid, owner],
        )
        .map_err(query_err)?;
    Ok(updated == 1)
}

fn credit(
    conn: &Connection,
    owner: &str,
    pid: i64,
    amount: Decimal,
) -> Result<(), PortfolioError> {
    conn.execute(
        "UPDATE portfolios SET money = money + ?1 WHERE pid = ?2 AND owner = ?3",
        params![to_cents(amount)?, pid, owner],
    )
    .map_err(query_err)?;
    Ok(())
}

fn held_shares(conn: &Connection, pid: i64, symbol: &str) -> Result<i64, PortfolioError> {
    conn.query_row(
        "SELECT COALESCE(SUM(shares), 0) FROM holdings WHERE pid = ?1 AND symbol = ?2",
        params![pid, symbol],
        |row| row.get(0),
    )
    .map_err(query_err)
}

fn latest_close(conn: &Connection, symbol: &str) -> Result<f64, PortfolioError> {
    conn.query_row(
        "SELECT close FROM stock_data WHERE symbol = ?1 ORDER BY date DESC LIMIT 1",
        params![symbol],
        |row| row.get(0),
    )
    .optional()
    .map_err(query_err)?
    .ok_or_else(|| PortfolioError::NoPriceData {
        symbol: symbol.to_string(),
    })
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, PortfolioError> {
        let db_path = config.require_string("sqlite", "path")?;
        let pool_size = config.get_int("sqlite", "pool_size", 4).max(1) as u32;
        let busy_ms = config.get_int("sqlite", "busy_timeout_ms", 5000).max(0) as u64;

        let manager = SqliteConnectionManager::file(&db_path)
            .with_init(move |c| c.busy_timeout(Duration::from_millis(busy_ms)));
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(pool_err)?;

        tracing::debug!(path = %db_path, pool_size, "sqlite pool ready");
        Ok(Self { pool })
    }

    /// A single-connection in-memory database, for tests and dry runs. The
    /// connection is never recycled; dropping it would drop the database.
    pub fn in_memory() -> Result<Self, PortfolioError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .max_lifetime(None)
            .idle_timeout(None)
            .build(manager)
            .map_err(pool_err)?;

        Ok(Self { pool })
    }

    pub fn initialize_schema(&self) -> Result<(), PortfolioError> {
        self.conn()?.execute_batch(SCHEMA).map_err(query_err)
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, PortfolioError> {
        self.pool.get().map_err(pool_err)
    }

    fn query_lists(&self, sql: &str, param: Option<&str>) -> Result<Vec<StockList>, PortfolioError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql).map_err(query_err)?;
        let rows = match param {
            Some(p) => stmt.query_map(params![p], list_from_row),
            None => stmt.query_map([], list_from_row),
        }
        .map_err(query_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(query_err)
    }
}

impl MarketDataPort for SqliteAdapter {
    fn register_symbol(&self, symbol: &str) -> Result<(), PortfolioError> {
        self.conn()?
            .execute(
                "INSERT OR IGNORE INTO stocks (symbol) VALUES (?1)",
                params![symbol],
            )
            .map_err(query_err)?;
        Ok(())
    }

    fn symbol_exists(&self, symbol: &str) -> Result<bool, PortfolioError> {
        self.conn()?
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM stocks WHERE symbol = ?1)",
                params![symbol],
                |row| row.get(0),
            )
            .map_err(query_err)
    }

    fn upsert_bars(&self, bars: &[PriceBar]) -> Result<usize, PortfolioError> {
        let mut conn = self.conn()?;
        let tx = immediate(&mut conn)?;

        for bar in bars {
            tx.execute(
                "INSERT OR IGNORE INTO stocks (symbol) VALUES (?1)",
                params![bar.symbol],
            )
            .map_err(query_err)?;
            tx.execute(
                "INSERT OR REPLACE INTO stock_data (symbol, date, open, high, low, close, volume)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    bar.symbol,
                    bar.date.format(DATE_FMT).to_string(),
                    bar.open,
                    bar.high,
                    bar.low,
                    bar.close,
                    bar.volume
                ],
            )
            .map_err(query_err)?;
        }

        tx.commit().map_err(query_err)?;
        Ok(bars.len())
    }

    fn fetch_history(&self, symbol: &str) -> Result<Vec<PriceBar>, PortfolioError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT symbol, date, open, high, low, close, volume
                 FROM stock_data WHERE symbol = ?1 ORDER BY date ASC",
            )
            .map_err(query_err)?;
        let rows = stmt
            .query_map(params![symbol], bar_from_row)
            .map_err(query_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(query_err)
    }

    fn latest_bar(&self, symbol: &str) -> Result<Option<PriceBar>, PortfolioError> {
        self.conn()?
            .query_row(
                "SELECT symbol, date, open, high, low, close, volume
                 FROM stock_data WHERE symbol = ?1 ORDER BY date DESC LIMIT 1",
                params![symbol],
                bar_from_row,
            )
            .optional()
            .map_err(query_err)
    }

    fn list_symbols(&self) -> Result<Vec<String>, PortfolioError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT symbol FROM stocks ORDER BY symbol")
            .map_err(query_err)?;
        let rows = stmt.query_map([], |row| row.get(0)).map_err(query_err)?;
        rows.collect::<Result<Vec<String>, _>>().map_err(query_err)
    }

    fn get_data_range(
        &self,
        symbol: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, PortfolioError> {
        let result: (Option<String>, Option<String>, i64) = self
            .conn()?
            .query_row(
                "SELECT MIN(date), MAX(date), COUNT(*) FROM stock_data WHERE symbol = ?1",
                params![symbol],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map_err(query_err)?;

        match result {
            (Some(min_str), Some(max_str), count) if count > 0 => {
                let parse = |s: &str| {
                    NaiveDate::parse_from_str(s, DATE_FMT).map_err(|e| PortfolioError::Database {
                        reason: e.to_string(),
                    })
                };
                Ok(Some((parse(&min_str)?, parse(&max_str)?, count as usize)))
            }
            _ => Ok(None),
        }
    }
}

impl LedgerPort for SqliteAdapter {
    fn create_user(&self, user: &User) -> Result<(), PortfolioError> {
        let inserted = self
            .conn()?
            .execute(
                "INSERT OR IGNORE INTO users (email, name, password_hash) VALUES (?1, ?2, ?3)",
                params![user.email, user.name, user.password_hash],
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
        self.conn()?
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE email = ?1)",
                params![email],
                |row| row.get(0),
            )
            .map_err(query_err)
    }

    fn create_portfolio(&self, owner: &str, name: &str) -> Result<Portfolio, PortfolioError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO portfolios (owner, name, money) VALUES (?1, ?2, 0)",
            params![owner, name],
        )
        .map_err(query_err)?;
        Ok(Portfolio {
            pid: conn.last_insert_rowid(),
            owner: owner.to_string(),
            name: name.to_string(),
            money: Decimal::ZERO,
        })
    }

    fn list_portfolios(&self, owner: &str) -> Result<Vec<Portfolio>, PortfolioError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT pid, owner, name, money FROM portfolios WHERE owner = ?1 ORDER BY pid")
            .map_err(query_err)?;
        let rows = stmt
            .query_map(params![owner], portfolio_from_row)
            .map_err(query_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(query_err)
    }

    fn get_portfolio(&self, owner: &str, pid: i64) -> Result<Portfolio, PortfolioError> {
        let conn = self.conn()?;
        owned_portfolio(&conn, owner, pid)
    }

    fn delete_portfolio(&self, owner: &str, pid: i64) -> Result<Decimal, PortfolioError> {
        let mut conn = self.conn()?;
        let tx = immediate(&mut conn)?;
        let portfolio = owned_portfolio(&tx, owner, pid)?;

        let open: i64 = tx
            .query_row(
                "SELECT COUNT(*) FROM (
                     SELECT symbol FROM holdings WHERE pid = ?1
                     GROUP BY symbol HAVING SUM(shares) > 0
                 )",
                params![pid],
                |row| row.get(0),
            )
            .map_err(query_err)?;
        if open > 0 {
            return Err(PortfolioError::OpenPositions { pid });
        }

        if portfolio.money > Decimal::ZERO {
            append_entry(&tx, &LedgerEntry::closing(&portfolio))?;
        }
        tx.execute(
            "DELETE FROM portfolios WHERE pid = ?1 AND owner = ?2",
            params![pid, owner],
        )
        .map_err(query_err)?;

        tx.commit().map_err(query_err)?;
        Ok(portfolio.money)
    }

    fn deposit(&self, owner: &str, pid: i64, amount: Decimal) -> Result<(), PortfolioError> {
        let mut conn = self.conn()?;
        let tx = immediate(&mut conn)?;
        let portfolio = owned_portfolio(&tx, owner, pid)?;

        credit(&tx, owner, pid, amount)?;
        append_entry(&tx, &LedgerEntry::deposit(&portfolio, amount))?;

        tx.commit().map_err(query_err)
    }

    fn withdraw(&self, owner: &str, pid: i64, amount: Decimal) -> Result<(), PortfolioError> {
        let mut conn = self.conn()?;
        let tx = immediate(&mut conn)?;
        let portfolio = owned_portfolio(&tx, owner, pid)?;

        if !debit(&tx, owner, pid, amount)? {
            return Err(PortfolioError::InsufficientFunds { pid, amount });
        }
        append_entry(&tx, &LedgerEntry::withdrawal(&portfolio, amount))?;

        tx.commit().map_err(query_err)
    }

    fn transfer(
        &self,
        owner: &str,
        from_pid: i64,
        to_pid: i64,
        amount: Decimal,
    ) -> Result<(), PortfolioError> {
        let mut conn = self.conn()?;
        let tx = immediate(&mut conn)?;
        let from = owned_portfolio(&tx, owner, from_pid)?;
        let to = owned_portfolio(&tx, owner, to_pid)?;

        if !debit(&tx, owner, from_pid, amount)? {
            return Err(PortfolioError::InsufficientFunds {
                pid: from_pid,
                amount,
            });
        }
        credit(&tx, owner, to_pid, amount)?;
        for leg in LedgerEntry::transfer_legs(&from, &to, amount) {
            append_entry(&tx, &leg)?;
        }

        tx.commit().map_err(query_err)
    }

    fn cash_transactions(
        &self,
        owner: &str,
        pid: i64,
    ) -> Result<Vec<CashTransaction>, PortfolioError> {
        let conn = self.conn()?;
        owned_portfolio(&conn, owner, pid)?;
        let mut stmt = conn
            .prepare(
                "SELECT tid, pid, amount, source, destination
                 FROM cash_transactions WHERE pid = ?1 ORDER BY tid DESC",
            )
            .map_err(query_err)?;
        let rows = stmt
            .query_map(params![pid], |row| {
                Ok(CashTransaction {
                    tid: row.get(0)?,
                    pid: row.get(1)?,
                    amount: from_cents(row.get(2)?),
                    source: row.get(3)?,
                    destination: row.get(4)?,
                })
            })
            .map_err(query_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(query_err)
    }
}

impl HoldingsPort for SqliteAdapter {
    fn buy(
        &self,
        owner: &str,
        pid: i64,
        symbol: &str,
        shares: i64,
    ) -> Result<Fill, PortfolioError> {
        let mut conn = self.conn()?;
        let tx = immediate(&mut conn)?;
        owned_portfolio(&tx, owner, pid)?;

        let known: bool = tx
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM stocks WHERE symbol = ?1)",
                params![symbol],
                |row| row.get(0),
            )
            .map_err(query_err)?;
        if !known {
            return Err(PortfolioError::UnknownSymbol {
                symbol: symbol.to_string(),
            });
        }

        let price = latest_close(&tx, symbol)?;
        let cost = trade_value(price, shares)?;
        if !debit(&tx, owner, pid, cost)? {
            return Err(PortfolioError::InsufficientFunds { pid, amount: cost });
        }
        tx.execute(
            "INSERT INTO holdings (pid, symbol, shares) VALUES (?1, ?2, ?3)",
            params![pid, symbol, shares],
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
        let mut conn = self.conn()?;
        let tx = immediate(&mut conn)?;
        owned_portfolio(&tx, owner, pid)?;

        let inserted = tx
            .execute(
                "INSERT INTO holdings (pid, symbol, shares)
                 SELECT ?1, ?2, -?3
                 WHERE (SELECT COALESCE(SUM(shares), 0) FROM holdings
                        WHERE pid = ?1 AND symbol = ?2) >= ?3",
                params![pid, symbol, shares],
            )
            .map_err(query_err)?;
        if inserted == 0 {
            return Err(PortfolioError::InsufficientPosition {
                symbol: symbol.to_string(),
                requested: shares,
                held: held_shares(&tx, pid, symbol)?,
            });
        }

        let price = latest_close(&tx, symbol)?;
        let proceeds = trade_value(price, shares)?;
        credit(&tx, owner, pid, proceeds)?;

        tx.commit().map_err(query_err)?;
        Ok(Fill {
            symbol: symbol.to_string(),
            shares,
            price,
            amount: proceeds,
        })
    }

    fn holding_records(&self, owner: &str, pid: i64) -> Result<Vec<HoldingRecord>, PortfolioError> {
        let conn = self.conn()?;
        owned_portfolio(&conn, owner, pid)?;
        let mut stmt = conn
            .prepare("SELECT tid, pid, symbol, shares FROM holdings WHERE pid = ?1 ORDER BY tid")
            .map_err(query_err)?;
        let rows = stmt
            .query_map(params![pid], |row| {
                Ok(HoldingRecord {
                    tid: row.get(0)?,
                    pid: row.get(1)?,
                    symbol: row.get(2)?,
                    shares: row.get(3)?,
                })
            })
            .map_err(query_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(query_err)
    }
}

impl StockListPort for SqliteAdapter {
    fn create_list(&self, owner: &str, name: &str) -> Result<StockList, PortfolioError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO stock_lists (owner, name, visibility) VALUES (?1, ?2, 'private')",
            params![owner, name],
        )
        .map_err(query_err)?;
        Ok(StockList {
            lid: conn.last_insert_rowid(),
            owner: owner.to_string(),
            name: name.to_string(),
            visibility: Visibility::Private,
        })
    }

    fn owned_lists(&self, owner: &str) -> Result<Vec<StockList>, PortfolioError> {
        self.query_lists(
            "SELECT lid, owner, name, visibility FROM stock_lists WHERE owner = ?1 ORDER BY lid",
            Some(owner),
        )
    }

    fn public_lists(&self) -> Result<Vec<StockList>, PortfolioError> {
        self.query_lists(
            "SELECT lid, owner, name, visibility FROM stock_lists
             WHERE visibility = 'public' ORDER BY lid",
            None,
        )
    }

    fn granted_lists(&self, email: &str) -> Result<Vec<StockList>, PortfolioError> {
        self.query_lists(
            "SELECT l.lid, l.owner, l.name, l.visibility
             FROM stock_lists l JOIN stock_list_shares s ON s.lid = l.lid
             WHERE s.email = ?1 ORDER BY l.lid",
            Some(email),
        )
    }

    fn get_list(&self, lid: i64) -> Result<StockList, PortfolioError> {
        self.conn()?
            .query_row(
                "SELECT lid, owner, name, visibility FROM stock_lists WHERE lid = ?1",
                params![lid],
                list_from_row,
            )
            .optional()
            .map_err(query_err)?
            .ok_or_else(|| PortfolioError::not_found("stock list", lid))
    }

    fn list_items(&self, lid: i64) -> Result<Vec<ListItem>, PortfolioError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT symbol, shares FROM stock_list_items WHERE lid = ?1 ORDER BY symbol")
            .map_err(query_err)?;
        let rows = stmt
            .query_map(params![lid], |row| {
                Ok(ListItem {
                    symbol: row.get(0)?,
                    shares: row.get(1)?,
                })
            })
            .map_err(query_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(query_err)
    }

    fn list_grantees(&self, lid: i64) -> Result<Vec<String>, PortfolioError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT email FROM stock_list_shares WHERE lid = ?1 ORDER BY email")
            .map_err(query_err)?;
        let rows = stmt.query_map(params![lid], |row| row.get(0)).map_err(query_err)?;
        rows.collect::<Result<Vec<String>, _>>().map_err(query_err)
    }

    fn add_item(
        &self,
        owner: &str,
        lid: i64,
        symbol: &str,
        shares: i64,
    ) -> Result<(), PortfolioError> {
        let mut conn = self.conn()?;
        let tx = immediate(&mut conn)?;
        owned_list(&tx, owner, lid)?;
        tx.execute(
            "INSERT INTO stock_list_items (lid, symbol, shares) VALUES (?1, ?2, ?3)
             ON CONFLICT (lid, symbol) DO UPDATE
             SET shares = stock_list_items.shares + excluded.shares",
            params![lid, symbol, shares],
        )
        .map_err(query_err)?;
        tx.commit().map_err(query_err)
    }

    fn share_list(&self, owner: &str, lid: i64, email: &str) -> Result<(), PortfolioError> {
        let mut conn = self.conn()?;
        let tx = immediate(&mut conn)?;
        owned_list(&tx, owner, lid)?;

        let granted = tx
            .execute(
                "INSERT OR IGNORE INTO stock_list_shares (lid, email) VALUES (?1, ?2)",
                params![lid, email],
            )
            .map_err(query_err)?;
        if granted == 0 {
            return Err(PortfolioError::Conflict {
                reason: format!("stock list {lid} is already shared with {email}"),
            });
        }
        tx.execute(
            "UPDATE stock_lists SET visibility = 'shared' WHERE lid = ?1",
            params![lid],
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
        let mut conn = self.conn()?;
        let tx = immediate(&mut conn)?;
        owned_list(&tx, owner, lid)?;

        tx.execute("DELETE FROM stock_list_shares WHERE lid = ?1", params![lid])
            .map_err(query_err)?;
        tx.execute(
            "UPDATE stock_lists SET visibility = ?1 WHERE lid = ?2",
            params![visibility.as_str(), lid],
        )
        .map_err(query_err)?;

        tx.commit().map_err(query_err)
    }

    fn delete_list(&self, owner: &str, lid: i64) -> Result<(), PortfolioError> {
        let mut conn = self.conn()?;
        let tx = immediate(&mut conn)?;
        owned_list(&tx, owner, lid)?;

        for sql in [
            "DELETE FROM stock_list_shares WHERE lid = ?1",
            "DELETE FROM stock_list_items WHERE lid = ?1",
            "DELETE FROM stock_lists WHERE lid = ?1",
        ] {
            tx.execute(sql, params![lid]).map_err(query_err)?;
        }

        tx.commit().map_err(query_err)
    }
}
