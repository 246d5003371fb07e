//! Signal — a strategy-emitted annotation, optionally carried on a `Mark`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalType {
    BuyLong,
    SellLong,
    BuyShort,
    SellShort,
    Custom,
}

/// A strategy-emitted signal, carried optionally on a `Mark` for
/// diagnostic correlation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub signal_type: SignalType,
    pub name: String,
    pub time: DateTime<Utc>,
    pub symbol: String,
    pub reason: String,
    pub indicator: Option<String>,
    pub raw_value: Option<f64>,
}
