//! Run configuration (spec.md §6). YAML-shaped, deserialized with
//! `serde_yaml` — the pack's YAML-config equivalent of the teacher's
//! `toml`-based `trendlab-runner/src/config.rs`.

use crate::commission::BrokerKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

fn default_decimal_precision() -> u32 {
    1
}

fn default_market_data_cache_size() -> usize {
    1000
}

fn default_broker() -> BrokerKind {
    BrokerKind::InteractiveBroker
}

/// Deserialized shape of the per-run YAML config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub initial_capital: rust_decimal::Decimal,

    #[serde(default = "default_broker")]
    pub broker: BrokerKind,

    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,

    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,

    #[serde(default = "default_decimal_precision")]
    pub decimal_precision: u32,

    #[serde(default = "default_market_data_cache_size")]
    pub market_data_cache_size: usize,
}

impl Config {
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn commission(&self) -> Box<dyn crate::commission::Commission> {
        self.broker.build()
    }

    /// Whether both `start_time` and `end_time` are absent — used by the
    /// output layout (spec.md §6) to decide whether the time-range
    /// subfolder is emitted.
    pub fn has_time_range(&self) -> bool {
        self.start_time.is_some() || self.end_time.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_uses_defaults() {
        let cfg = Config::from_yaml("initial_capital: 100000").unwrap();
        assert_eq!(cfg.decimal_precision, 1);
        assert_eq!(cfg.market_data_cache_size, 1000);
        assert_eq!(cfg.broker, BrokerKind::InteractiveBroker);
        assert!(cfg.start_time.is_none());
        assert!(!cfg.has_time_range());
    }

    #[test]
    fn missing_initial_capital_fails_to_parse() {
        let result = Config::from_yaml("broker: zero");
        assert!(result.is_err());
    }

    #[test]
    fn explicit_broker_and_precision_round_trip() {
        let cfg = Config::from_yaml(
            "initial_capital: 50000\nbroker: zero\ndecimal_precision: 2\n",
        )
        .unwrap();
        assert_eq!(cfg.broker, BrokerKind::Zero);
        assert_eq!(cfg.decimal_precision, 2);
    }

    #[test]
    fn time_range_present_when_either_bound_set() {
        let cfg = Config::from_yaml(
            "initial_capital: 1000\nstart_time: 2024-01-01T00:00:00Z\n",
        )
        .unwrap();
        assert!(cfg.has_time_range());
    }
}
