//! Naive price projection by ordinary least squares.
//!
//! The independent variable is the 1-based position of each close in the
//! history, not its calendar date. Projected dates step one calendar day at a
//! time from the last bar and ignore weekends and holidays. This is a linear
//! extrapolation with no confidence interval, not a forecasting model.

use chrono::{Duration, NaiveDate};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use super::error::PortfolioError;
use super::price_bar::PriceBar;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Horizon {
    Week,
    Month,
    Year,
}

impl Horizon {
    pub fn days(self) -> u32 {
        match self {
            Horizon::Week => 7,
            Horizon::Month => 30,
            Horizon::Year => 365,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Horizon::Week => "week",
            Horizon::Month => "month",
            Horizon::Year => "year",
        }
    }
}

impl fmt::Display for Horizon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Horizon {
    type Err = PortfolioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "week" => Ok(Horizon::Week),
            "month" => Ok(Horizon::Month),
            "year" => Ok(Horizon::Year),
            other => Err(PortfolioError::validation(format!(
                "invalid range {other:?}: expected week, month or year"
            ))),
        }
    }
}

/// y = slope * x + intercept
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
}

impl LinearFit {
    pub fn at(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub date: NaiveDate,
    pub price: f64,
}

/// Least-squares line through (1, y1), (2, y2), ... (n, yn).
///
/// A single observation has no slope; the fit is the flat line through it.
pub fn fit_ols(closes: &[f64]) -> Option<LinearFit> {
    if closes.is_empty() {
        return None;
    }
    let n = closes.len() as f64;
    let (mut sx, mut sy, mut sxy, mut sxx) = (0.0, 0.0, 0.0, 0.0);
    for (i, &y) in closes.iter().enumerate() {
        let x = (i + 1) as f64;
        sx += x;
        sy += y;
        sxy += x * y;
        sxx += x * x;
    }
    let denominator = n * sxx - sx * sx;
    let slope = if denominator.abs() < f64::EPSILON {
        0.0
    } else {
        (n * sxy - sx * sy) / denominator
    };
    let intercept = (sy - slope * sx) / n;
    Some(LinearFit { slope, intercept })
}

/// Projects `horizon` daily prices past the end of `history`.
pub fn predict(
    symbol: &str,
    history: &[PriceBar],
    horizon: Horizon,
) -> Result<Vec<Prediction>, PortfolioError> {
    let mut bars: Vec<&PriceBar> = history.iter().collect();
    bars.sort_by_key(|b| b.date);

    let last_date = match bars.last() {
        Some(bar) => bar.date,
        None => {
            return Err(PortfolioError::NoHistory {
                symbol: symbol.to_string(),
            });
        }
    };

    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let fit = fit_ols(&closes).ok_or_else(|| PortfolioError::NoHistory {
        symbol: symbol.to_string(),
    })?;

    let n = closes.len() as f64;
    let predictions = (1..=horizon.days())
        .map(|i| Prediction {
            date: last_date + Duration::days(i64::from(i)),
            price: fit.at(n + f64::from(i)),
        })
        .collect();
    Ok(predictions)
}
