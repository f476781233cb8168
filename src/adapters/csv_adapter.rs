//! Daily price import from CSV files.
//!
//! Expected header: `date,open,high,low,close,volume` (any column order,
//! case-insensitive). Dates are `YYYY-MM-DD`.

use crate::domain::error::PortfolioError;
use crate::domain::price_bar::PriceBar;
use chrono::NaiveDate;
use csv::StringRecord;
use std::fs::File;
use std::path::Path;
use std::str::FromStr;

const COLUMNS: [&str; 6] = ["date", "open", "high", "low", "close", "volume"];

pub struct CsvAdapter;

/// Column positions resolved from the header row, in `COLUMNS` order.
struct Layout([usize; 6]);

impl Layout {
    fn from_headers(headers: &StringRecord) -> Result<Self, PortfolioError> {
        let mut positions = [0usize; 6];
        for (slot, name) in positions.iter_mut().zip(COLUMNS) {
            *slot = headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
                .ok_or_else(|| PortfolioError::validation(format!("missing {name} column")))?;
        }
        Ok(Layout(positions))
    }
}

fn field<T>(record: &StringRecord, layout: &Layout, column: usize, line: u64) -> Result<T, PortfolioError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let name = COLUMNS[column];
    let raw = record
        .get(layout.0[column])
        .ok_or_else(|| PortfolioError::validation(format!("line {line}: missing {name} value")))?;
    raw.trim()
        .parse()
        .map_err(|e| PortfolioError::validation(format!("line {line}: invalid {name} value: {e}")))
}

impl CsvAdapter {
    pub fn read_bars(path: &Path, symbol: &str) -> Result<Vec<PriceBar>, PortfolioError> {
        let file = File::open(path)?;
        Self::parse_bars(file, symbol)
    }

    /// Parses bars for `symbol` from any reader, sorted by date.
    pub fn parse_bars<R: std::io::Read>(reader: R, symbol: &str) -> Result<Vec<PriceBar>, PortfolioError> {
        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let headers = rdr
            .headers()
            .map_err(|e| PortfolioError::validation(format!("CSV header error: {e}")))?
            .clone();
        let layout = Layout::from_headers(&headers)?;

        let mut bars = Vec::new();
        for result in rdr.records() {
            let record =
                result.map_err(|e| PortfolioError::validation(format!("CSV parse error: {e}")))?;
            let line = record.position().map_or(0, |p| p.line());

            let date_str: String = field(&record, &layout, 0, line)?;
            let date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d").map_err(|e| {
                PortfolioError::validation(format!("line {line}: invalid date {date_str:?}: {e}"))
            })?;

            let bar = PriceBar {
                symbol: symbol.to_string(),
                date,
                open: field(&record, &layout, 1, line)?,
                high: field(&record, &layout, 2, line)?,
                low: field(&record, &layout, 3, line)?,
                close: field(&record, &layout, 4, line)?,
                volume: field(&record, &layout, 5, line)?,
            };
            if !bar.is_well_formed() {
                return Err(PortfolioError::validation(format!(
                    "line {line}: inconsistent price bar for {date}"
                )));
            }
            bars.push(bar);
        }

        bars.sort_by_key(|b| b.date);
        Ok(bars)
    }
}
