//! Bar — a single OHLCV market data point, immutable once produced.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// OHLCV bar for a single symbol at a single instant.
///
/// Invariant: `low <= min(open, close) <= max(open, close) <= high` and
/// `volume >= 0`. Produced once by the `DataSource` and consumed once per
/// driver step; never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub id: String,
    pub symbol: String,
    pub time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: f64,
}

impl Bar {
    /// Whether OHLC/volume values satisfy the bar sanity invariant.
    pub fn is_sane(&self) -> bool {
        let lo = self.open.min(self.close);
        let hi = self.open.max(self.close);
        self.low <= lo && lo <= hi && hi <= self.high && self.volume >= 0.0
    }

    /// Market midpoint `(high + low) / 2`, used as the market-order
    /// execution price.
    pub fn midpoint(&self) -> Decimal {
        (self.high + self.low) / Decimal::from(2)
    }
}
