//! C6 external collaborator: the `Strategy` capability and its host-call
//! API surface (spec.md §6, §9).
//!
//! The host-call API is realized as a capability record: a plain struct of
//! handles into the matching engine and marker store, handed to the
//! strategy once via `initialize_api`. There are no back-pointers from the
//! engine to the strategy — the cyclic "strategy calls engine, engine is
//! driven by the loop that also drives the strategy" relationship is
//! broken by the driver owning both sides and only ever handing the
//! strategy a cloneable handle.

use crate::domain::{AccountInfo, ExecuteOrder, OrderId, OrderStatus, Position};
use crate::ledger::UpdateResult;
use crate::marker::MarkerStore;
use crate::matching::{MatchingEngine, MatchingError};
use rust_decimal::Decimal;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use thiserror::Error;

/// Errors a strategy may return from its lifecycle methods.
///
/// `InsufficientData` is the sub-kind spec.md §7 calls out specially: the
/// driver brackets consecutive insufficient-data bars with Warning marks
/// instead of treating every bar as an independent strategy error.
#[derive(Debug, Clone, Error)]
pub enum StrategyError {
    #[error("insufficient data for {symbol}: requested {requested}, got {got}")]
    InsufficientData {
        requested: usize,
        got: usize,
        symbol: String,
    },
    #[error("{0}")]
    Other(String),
}

/// Capability record handed to a strategy's `initialize_api`. Cheap to
/// clone (an `Rc` handle); the strategy never sees the driver itself.
#[derive(Clone)]
pub struct HostApi {
    engine: Rc<RefCell<MatchingEngine>>,
    markers: Rc<RefCell<MarkerStore>>,
}

impl HostApi {
    pub fn new(engine: Rc<RefCell<MatchingEngine>>, markers: Rc<RefCell<MarkerStore>>) -> Self {
        Self { engine, markers }
    }

    pub fn place_order(&self, order: ExecuteOrder) -> Result<(), MatchingError> {
        self.engine.borrow_mut().place_order(order)
    }

    pub fn place_multiple_orders(&self, orders: Vec<ExecuteOrder>) -> Result<(), MatchingError> {
        self.engine.borrow_mut().place_multiple_orders(orders)
    }

    pub fn cancel_order(&self, id: OrderId) -> bool {
        self.engine.borrow_mut().cancel_order(id)
    }

    pub fn cancel_all_orders(&self) {
        self.engine.borrow_mut().cancel_all_orders();
    }

    pub fn order_status(&self, id: OrderId) -> Option<OrderStatus> {
        self.engine.borrow().order_status(id)
    }

    pub fn position(&self, symbol: &str) -> Position {
        self.engine.borrow().position(symbol)
    }

    pub fn positions(&self) -> HashMap<String, Position> {
        self.engine.borrow().positions()
    }

    pub fn account_info(&self) -> AccountInfo {
        self.engine.borrow().account_info()
    }

    pub fn get_max_buy_quantity(&self, price: Decimal) -> Decimal {
        self.engine.borrow().get_max_buy_quantity(price)
    }

    pub fn get_max_sell_quantity(&self, symbol: &str) -> Decimal {
        self.engine.borrow().get_max_sell_quantity(symbol)
    }

    pub fn mark(&self, builder: crate::domain::mark::MarkBuilder) {
        self.markers.borrow_mut().mark(builder);
    }
}

/// Strategy capability (spec.md §6). The WASM sandbox, host-call bridge,
/// and version negotiation wire protocol are out of scope per spec.md §1;
/// this trait is the shape the driver programs against.
pub trait Strategy {
    fn initialize_api(&mut self, api: HostApi) -> Result<(), StrategyError>;
    fn initialize(&mut self, config_text: &str) -> Result<(), StrategyError>;
    fn process_data(&mut self, bar: &crate::domain::Bar) -> Result<(), StrategyError>;
    fn name(&self) -> &str;
    fn get_runtime_engine_version(&self) -> Result<String, StrategyError>;
    fn get_identifier(&self) -> Result<String, StrategyError>;
}

/// Re-exported for callers that want the `update` outcome shape without
/// importing `crate::ledger` directly.
pub type OrderUpdateResult = UpdateResult;
