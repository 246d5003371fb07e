//! Trade — created only for filled orders; carries realized P&L on closing legs.

use super::order::Order;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A completed execution against a `Filled` order.
///
/// `pnl` is nonzero only on closing legs (Sell closing Long, Buy closing
/// Short); it is zero on opening legs and on any leg where the
/// corresponding open quantity was zero before this trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub order: Order,
    pub executed_at: DateTime<Utc>,
    pub executed_qty: Decimal,
    pub executed_price: Decimal,
    pub fee: Decimal,
    pub pnl: Decimal,
}

impl Trade {
    pub fn is_closing(&self) -> bool {
        self.pnl != Decimal::ZERO
    }
}
