//! Domain error types.

/// Top-level error type for stockfolio.
#[derive(Debug, thiserror::Error)]
pub enum PortfolioError {
    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("{reason}")]
    Validation { reason: String },

    #[error("insufficient funds in portfolio {pid} for {amount}")]
    InsufficientFunds {
        pid: i64,
        amount: rust_decimal::Decimal,
    },

    #[error("cannot sell {requested} shares of {symbol}: only {held} held")]
    InsufficientPosition {
        symbol: String,
        requested: i64,
        held: i64,
    },

    #[error("source and destination portfolio are the same")]
    SameAccount,

    #[error("stock {symbol} does not exist")]
    UnknownSymbol { symbol: String },

    #[error("no price data for {symbol}")]
    NoPriceData { symbol: String },

    #[error("no price history for {symbol}")]
    NoHistory { symbol: String },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("portfolio {pid} still holds shares")]
    OpenPositions { pid: i64 },

    #[error("{reason}")]
    Conflict { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PortfolioError {
    pub fn validation(reason: impl Into<String>) -> Self {
        PortfolioError::Validation {
            reason: reason.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        PortfolioError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// True for failures of the store itself rather than of the request.
    pub fn is_store_failure(&self) -> bool {
        matches!(
            self,
            PortfolioError::Database { .. } | PortfolioError::DatabaseQuery { .. }
        )
    }
}

impl From<&PortfolioError> for std::process::ExitCode {
    fn from(err: &PortfolioError) -> Self {
        let code: u8 = match err {
            PortfolioError::Io(_) => 1,
            PortfolioError::ConfigParse { .. }
            | PortfolioError::ConfigMissing { .. }
            | PortfolioError::ConfigInvalid { .. } => 2,
            PortfolioError::Database { .. } | PortfolioError::DatabaseQuery { .. } => 3,
            PortfolioError::Validation { .. }
            | PortfolioError::InsufficientFunds { .. }
            | PortfolioError::InsufficientPosition { .. }
            | PortfolioError::SameAccount
            | PortfolioError::UnknownSymbol { .. }
            | PortfolioError::NotFound { .. }
            | PortfolioError::OpenPositions { .. }
            | PortfolioError::Conflict { .. } => 4,
            PortfolioError::NoPriceData { .. } | PortfolioError::NoHistory { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
