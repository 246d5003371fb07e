//! Position — a derived, symbol-keyed aggregate over the trade stream.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Aggregate position view for a single symbol, derived from trades.
///
/// Invariants (spec.md §3): all totals are `>= 0`; `long_out_qty <=
/// long_in_qty` and `short_out_qty <= short_in_qty` at all times.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,

    pub total_long_in_qty: Decimal,
    pub total_long_in_amount: Decimal,
    pub total_long_in_fee: Decimal,

    pub total_long_out_qty: Decimal,
    pub total_long_out_amount: Decimal,
    pub total_long_out_fee: Decimal,

    pub total_short_in_qty: Decimal,
    pub total_short_in_amount: Decimal,
    pub total_short_in_fee: Decimal,

    pub total_short_out_qty: Decimal,
    pub total_short_out_amount: Decimal,
    pub total_short_out_fee: Decimal,

    pub open_timestamp: Option<DateTime<Utc>>,
}

impl Position {
    pub fn empty(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            ..Default::default()
        }
    }

    pub fn total_long_qty(&self) -> Decimal {
        self.total_long_in_qty - self.total_long_out_qty
    }

    pub fn total_short_qty(&self) -> Decimal {
        self.total_short_in_qty - self.total_short_out_qty
    }

    /// Average long entry price. Zero if no long opens have occurred.
    pub fn avg_long_entry(&self) -> Decimal {
        if self.total_long_in_qty.is_zero() {
            Decimal::ZERO
        } else {
            self.total_long_in_amount / self.total_long_in_qty
        }
    }

    /// Average short entry price, computed over the *opening* (in) side,
    /// per spec.md §3's definition.
    pub fn avg_short_entry(&self) -> Decimal {
        if self.total_short_in_qty.is_zero() {
            Decimal::ZERO
        } else {
            self.total_short_in_amount / self.total_short_in_qty
        }
    }

    /// Average price at which short shares were covered — the `out`-side
    /// divisor. Used by the statistics deriver's unrealized-P&L formula,
    /// per spec.md §9's documented asymmetry (the two divisors are not the
    /// same field and both are intentionally kept).
    pub fn avg_short_cover_price(&self) -> Decimal {
        if self.total_short_out_qty.is_zero() {
            Decimal::ZERO
        } else {
            self.total_short_out_amount / self.total_short_out_qty
        }
    }

    pub fn is_flat(&self) -> bool {
        self.total_long_qty().is_zero() && self.total_short_qty().is_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn empty_position_has_zero_totals() {
        let pos = Position::empty("AAPL");
        assert_eq!(pos.total_long_qty(), Decimal::ZERO);
        assert_eq!(pos.avg_long_entry(), Decimal::ZERO);
        assert!(pos.is_flat());
    }

    #[test]
    fn avg_long_entry_is_weighted() {
        let mut pos = Position::empty("AAPL");
        pos.total_long_in_qty = dec!(20);
        pos.total_long_in_amount = dec!(2100); // 10 @100 + 10 @110
        assert_eq!(pos.avg_long_entry(), dec!(105));
    }

    #[test]
    fn net_long_qty_subtracts_closed_quantity() {
        let mut pos = Position::empty("AAPL");
        pos.total_long_in_qty = dec!(30);
        pos.total_long_out_qty = dec!(10);
        assert_eq!(pos.total_long_qty(), dec!(20));
    }
}
