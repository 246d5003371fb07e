//! Top-level error taxonomy (spec.md §7). `OrderRejection`s are not part of
//! this enum — they are recorded as Failed `Order` rows by the matching
//! engine and never surfaced as an `Err` to a caller.

use thiserror::Error;

/// Fatal-at-some-scope error kinds the simulation driver can return.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("config error: {0}")]
    Config(String),
    #[error("engine/strategy version mismatch: engine={engine} strategy={strategy}")]
    VersionMismatch { engine: String, strategy: String },
    #[error("ledger/storage state error: {0}")]
    State(String),
    #[error("data source error: {0}")]
    Data(String),
    #[error("lifecycle callback failed: {0}")]
    CallbackFailed(String),
    #[error("run cancelled")]
    Cancelled,
}
