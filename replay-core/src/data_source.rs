//! C6 external collaborator: the `DataSource` capability (spec.md §6).
//!
//! The kernel only consumes `initialize`, `count`, `read_all`, and
//! `read_last_data`; the remaining methods are part of the strategy-facing
//! surface and carry default "unsupported" bodies so a minimal `DataSource`
//! implementation only needs to cover what the kernel actually calls.

use crate::domain::Bar;
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum DataSourceError {
    #[error("data source io error: {0}")]
    Io(String),
    #[error("insufficient data for {symbol}: requested {requested}, got {got}")]
    InsufficientData {
        requested: usize,
        got: usize,
        symbol: String,
    },
    #[error("data source does not support {0}")]
    Unsupported(&'static str),
}

/// One bar or a read failure, yielded lazily by `read_all`.
pub type BarResult = Result<Bar, DataSourceError>;

/// Abstract historical bar-data source consumed by the driver.
///
/// Out of scope per spec.md §1 (file parsing, SQL-backed stores); only the
/// shape this trait describes is part of the kernel's contract.
pub trait DataSource {
    fn initialize(&mut self, path: &str) -> Result<(), DataSourceError>;

    fn count(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<usize, DataSourceError>;

    /// Lazy finite sequence of bars in the requested range, in production
    /// order (the kernel assumes non-decreasing time per symbol and never
    /// re-sorts, per spec.md §5).
    fn read_all(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Box<dyn Iterator<Item = BarResult> + '_>;

    fn read_last_data(&self, symbol: &str) -> Result<Bar, DataSourceError>;

    fn get_all_symbols(&self) -> Result<Vec<String>, DataSourceError> {
        Err(DataSourceError::Unsupported("get_all_symbols"))
    }

    fn get_previous_number_of_data_points(
        &self,
        _end: DateTime<Utc>,
        _symbol: &str,
        _n: usize,
    ) -> Result<Vec<Bar>, DataSourceError> {
        Err(DataSourceError::Unsupported("get_previous_number_of_data_points"))
    }

    fn get_range(
        &self,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
        _symbol: &str,
    ) -> Result<Vec<Bar>, DataSourceError> {
        Err(DataSourceError::Unsupported("get_range"))
    }

    fn get_market_data(&self, _symbol: &str, _time: DateTime<Utc>) -> Result<Bar, DataSourceError> {
        Err(DataSourceError::Unsupported("get_market_data"))
    }

    fn execute_sql(&self, _query: &str, _args: &[String]) -> Result<Vec<Bar>, DataSourceError> {
        Err(DataSourceError::Unsupported("execute_sql"))
    }
}

/// An in-memory `DataSource` over a pre-loaded bar vector, used in tests and
/// as a reference implementation for embedders without a real store.
#[derive(Debug, Default)]
pub struct InMemoryDataSource {
    bars: Vec<Bar>,
}

impl InMemoryDataSource {
    pub fn new(bars: Vec<Bar>) -> Self {
        Self { bars }
    }
}

impl DataSource for InMemoryDataSource {
    fn initialize(&mut self, _path: &str) -> Result<(), DataSourceError> {
        Ok(())
    }

    fn count(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<usize, DataSourceError> {
        Ok(self.in_range(start, end).count())
    }

    fn read_all(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Box<dyn Iterator<Item = BarResult> + '_> {
        Box::new(self.in_range(start, end).cloned().map(Ok))
    }

    fn read_last_data(&self, symbol: &str) -> Result<Bar, DataSourceError> {
        self.bars
            .iter()
            .filter(|b| b.symbol == symbol)
            .max_by_key(|b| b.time)
            .cloned()
            .ok_or_else(|| DataSourceError::Io(format!("no data for symbol {symbol}")))
    }

    fn get_all_symbols(&self) -> Result<Vec<String>, DataSourceError> {
        let mut symbols: Vec<String> = self
            .bars
            .iter()
            .map(|b| b.symbol.clone())
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect();
        symbols.sort();
        Ok(symbols)
    }
}

impl InMemoryDataSource {
    fn in_range(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> impl Iterator<Item = &Bar> {
        self.bars.iter().filter(move |b| {
            start.map(|s| b.time >= s).unwrap_or(true) && end.map(|e| b.time <= e).unwrap_or(true)
        })
    }
}
