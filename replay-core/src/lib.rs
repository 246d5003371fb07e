//! Replay Core — deterministic market-replay backtesting kernel.
//!
//! This crate contains the kernel described by the spec:
//! - Decimal/rounding utilities and the commission model
//! - The ledger (orders, trades, positions) and the marker store
//! - The matching engine (pending-order book, fills, account power checks)
//! - The `Strategy`/`DataSource` host-call capability surface
//! - The simulation driver that wires all of the above into one run
//! - The statistics deriver that turns a finalized ledger into `TradeStats`
//!
//! The outer multi-run loop, strategy sandboxing, and file-format
//! discovery are out of scope (spec.md §1) — this crate is the single-run
//! kernel a driver layer is built on top of.

pub mod commission;
pub mod config;
pub mod data_source;
pub mod decimal;
pub mod domain;
pub mod driver;
pub mod error;
pub mod ledger;
pub mod marker;
pub mod matching;
pub mod stats;
pub mod strategy;
pub mod version;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: the plain data types that cross the
    /// ledger/marker/stats boundary are `Send + Sync`. `MatchingEngine`,
    /// `HostApi`, and `MarkerStore` are deliberately excluded — they carry
    /// `Rc<RefCell<_>>` by design (spec.md §9's capability-record, single
    /// owning driver thread) and are not meant to cross a thread boundary.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<domain::Bar>();
        require_sync::<domain::Bar>();
        require_send::<domain::Order>();
        require_sync::<domain::Order>();
        require_send::<domain::ExecuteOrder>();
        require_sync::<domain::ExecuteOrder>();
        require_send::<domain::Trade>();
        require_sync::<domain::Trade>();
        require_send::<domain::Position>();
        require_sync::<domain::Position>();
        require_send::<domain::Mark>();
        require_sync::<domain::Mark>();
        require_send::<domain::AccountInfo>();
        require_sync::<domain::AccountInfo>();
        require_send::<domain::OrderId>();
        require_sync::<domain::OrderId>();
        require_send::<domain::MarkId>();
        require_sync::<domain::MarkId>();

        require_send::<ledger::Ledger>();
        require_sync::<ledger::Ledger>();

        require_send::<config::Config>();
        require_sync::<config::Config>();

        require_send::<stats::TradeStats>();
        require_sync::<stats::TradeStats>();

        require_send::<version::EngineVersion>();
        require_sync::<version::EngineVersion>();
    }
}
