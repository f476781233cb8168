//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use argon2::{Algorithm, Argon2, Params, PasswordHasher, Version, password_hash::SaltString};
use rand::rngs::OsRng;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::error::PortfolioError;
use crate::domain::forecast::{self, Horizon};
use crate::domain::holdings::normalize_symbol;
use crate::domain::portfolio::{User, validate_email};
use crate::logging::{LoggingConfig, init_logging};
use crate::ports::PortfolioStore;
use crate::ports::config_port::ConfigPort;
use crate::ports::ledger_port::LedgerPort;
use crate::ports::market_data_port::MarketDataPort;

#[derive(Parser, Debug)]
#[command(name = "stockfolio", about = "Multi-user stock portfolio manager")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the database schema
    InitDb {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Load daily prices for one symbol from a CSV file
    ImportPrices {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        symbol: String,
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Register a user; the password is read from stdin
    AddUser {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: String,
    },
    /// List known symbols
    ListSymbols {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show the stored price range of a symbol
    Info {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        symbol: String,
    },
    /// Project closing prices with a least-squares trend line
    Predict {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        symbol: String,
        #[arg(long, default_value = "week")]
        range: String,
    },
    /// Start the HTTP API
    Serve {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::InitDb { config } => run_init_db(&config),
        Command::ImportPrices {
            config,
            symbol,
            file,
        } => run_import_prices(&config, &symbol, &file),
        Command::AddUser {
            config,
            email,
            name,
        } => run_add_user(&config, &email, &name),
        Command::ListSymbols { config } => run_list_symbols(&config),
        Command::Info { config, symbol } => run_info(&config, &symbol),
        Command::Predict {
            config,
            symbol,
            range,
        } => run_predict(&config, &symbol, &range),
        Command::Serve { config } => run_serve(&config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(&e)
        }
    }
}

/// Loads the INI file and installs the log subscriber it configures.
pub fn load_config(path: &Path) -> Result<FileConfigAdapter, PortfolioError> {
    let config = FileConfigAdapter::from_file(path)?;
    init_logging(&LoggingConfig::from_config(&config));
    tracing::debug!(path = %path.display(), "config loaded");
    Ok(config)
}

/// Opens the store named by `[database] backend` (default `sqlite`) and makes
/// sure its schema exists.
pub fn open_store(
    config: &dyn ConfigPort,
) -> Result<Arc<dyn PortfolioStore + Send + Sync>, PortfolioError> {
    let backend = config
        .get_string("database", "backend")
        .unwrap_or_else(|| "sqlite".to_string())
        .trim()
        .to_lowercase();

    match backend.as_str() {
        #[cfg(feature = "sqlite")]
        "sqlite" => {
            let adapter = crate::adapters::sqlite_adapter::SqliteAdapter::from_config(config)?;
            adapter.initialize_schema()?;
            let store: Arc<dyn PortfolioStore + Send + Sync> = Arc::new(adapter);
            Ok(store)
        }
        #[cfg(feature = "postgres")]
        "postgres" => {
            let adapter = crate::adapters::postgres_adapter::PostgresAdapter::from_config(config)?;
            adapter.initialize_schema()?;
            let store: Arc<dyn PortfolioStore + Send + Sync> = Arc::new(adapter);
            Ok(store)
        }
        other => Err(PortfolioError::ConfigInvalid {
            section: "database".into(),
            key: "backend".into(),
            reason: format!("backend {other:?} is unknown or not compiled in"),
        }),
    }
}

/// Reads `file` and upserts its bars for `symbol`, registering the symbol
/// even when the file has no rows. Returns the number of bars written.
pub fn import_prices<M: MarketDataPort + ?Sized>(
    store: &M,
    symbol: &str,
    file: &Path,
) -> Result<usize, PortfolioError> {
    let symbol = normalize_symbol(symbol)?;
    let bars = CsvAdapter::read_bars(file, &symbol)?;
    store.register_symbol(&symbol)?;
    let written = store.upsert_bars(&bars)?;
    tracing::info!(%symbol, bars = written, "prices imported");
    Ok(written)
}

pub fn hash_password(password: &str) -> Result<String, PortfolioError> {
    if password.is_empty() {
        return Err(PortfolioError::validation("password must not be empty"));
    }
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, Params::default());
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| PortfolioError::validation(format!("cannot hash password: {e}")))?;
    Ok(hash.to_string())
}

pub fn register_user<L: LedgerPort + ?Sized>(
    store: &L,
    email: &str,
    name: &str,
    password: &str,
) -> Result<User, PortfolioError> {
    let email = validate_email(email)?;
    let name = name.trim();
    if name.is_empty() {
        return Err(PortfolioError::validation("name must not be empty"));
    }
    let user = User {
        email,
        name: name.to_string(),
        password_hash: hash_password(password)?,
    };
    store.create_user(&user)?;
    tracing::info!(email = %user.email, "user registered");
    Ok(user)
}

fn run_init_db(config_path: &Path) -> Result<(), PortfolioError> {
    let config = load_config(config_path)?;
    open_store(&config)?;
    eprintln!("Schema ready");
    Ok(())
}

fn run_import_prices(config_path: &Path, symbol: &str, file: &Path) -> Result<(), PortfolioError> {
    let config = load_config(config_path)?;
    let store = open_store(&config)?;
    eprintln!("Importing {} from {}", symbol, file.display());
    let written = import_prices(store.as_ref(), symbol, file)?;
    eprintln!("{written} bars imported");
    Ok(())
}

fn run_add_user(config_path: &Path, email: &str, name: &str) -> Result<(), PortfolioError> {
    let config = load_config(config_path)?;
    let store = open_store(&config)?;

    eprintln!("Enter password:");
    let password = io::stdin()
        .lock()
        .lines()
        .next()
        .transpose()?
        .unwrap_or_default();

    let user = register_user(store.as_ref(), email, name, password.trim_end())?;
    eprintln!("User {} created", user.email);
    Ok(())
}

fn run_list_symbols(config_path: &Path) -> Result<(), PortfolioError> {
    let config = load_config(config_path)?;
    let store = open_store(&config)?;
    let symbols = store.list_symbols()?;

    if symbols.is_empty() {
        eprintln!("No symbols found");
    } else {
        for symbol in &symbols {
            println!("{symbol}");
        }
        eprintln!("{} symbols found", symbols.len());
    }
    Ok(())
}

fn run_info(config_path: &Path, symbol: &str) -> Result<(), PortfolioError> {
    let config = load_config(config_path)?;
    let store = open_store(&config)?;
    let symbol = normalize_symbol(symbol)?;

    match store.get_data_range(&symbol)? {
        Some((min_date, max_date, count)) => {
            println!("{symbol}: {count} bars, {min_date} to {max_date}");
            Ok(())
        }
        None => Err(PortfolioError::NoHistory { symbol }),
    }
}

fn run_predict(config_path: &Path, symbol: &str, range: &str) -> Result<(), PortfolioError> {
    let horizon: Horizon = range.parse()?;
    let config = load_config(config_path)?;
    let store = open_store(&config)?;
    let symbol = normalize_symbol(symbol)?;

    let history = store.fetch_history(&symbol)?;
    let predictions = forecast::predict(&symbol, &history, horizon)?;

    println!("date,price");
    for p in &predictions {
        println!("{},{:.4}", p.date, p.price);
    }
    eprintln!(
        "{} {} projections from {} bars",
        predictions.len(),
        horizon,
        history.len()
    );
    Ok(())
}

fn run_serve(config_path: &Path) -> Result<(), PortfolioError> {
    #[cfg(feature = "web")]
    {
        use crate::adapters::web::{AppState, DEFAULT_LISTEN, WebSettings, serve};

        let config = load_config(config_path)?;
        let store = open_store(&config)?;
        let settings = WebSettings::from_config(&config)?;
        let listen = config
            .get_string("web", "listen")
            .unwrap_or_else(|| DEFAULT_LISTEN.to_string());

        eprintln!("Starting web server on {listen}");
        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(serve(AppState { store, settings }, &listen))
    }

    #[cfg(not(feature = "web"))]
    {
        let _ = config_path;
        Err(PortfolioError::ConfigInvalid {
            section: "web".into(),
            key: "listen".into(),
            reason: "this build does not include the web feature".into(),
        })
    }
}
