//! C5: Matching Engine — validates, fills, defers, or rejects strategy
//! order intents; drives the pending book forward on each new bar.

use crate::commission::Commission;
use crate::decimal::round_precision;
use crate::domain::{
    AccountInfo, Bar, ExecuteOrder, FailureReason, Order, OrderId, OrderKind, OrderSide,
    OrderStatus, Position, PositionType, Trade,
};
use crate::ledger::Ledger;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use thiserror::Error;

/// Domain errors returned directly to the caller of `place_order` —
/// distinct from `OrderRejection`s, which are persisted as Failed orders
/// and never surfaced as an `Err` (spec.md §7).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MatchingError {
    #[error("symbol must not be empty")]
    InvalidSymbol,
    #[error("quantity rounded to zero at the configured decimal precision")]
    QuantityRoundedToZero,
    #[error("execution price must be positive")]
    NonPositiveExecutionPrice,
}

/// Accepts strategy order intents, validates them against the current bar
/// and account state, and either fills immediately, defers to the pending
/// book, or records a failed order. Owns the `Ledger` it persists fills to.
pub struct MatchingEngine {
    balance: Decimal,
    current_bar: Option<Bar>,
    pending: Vec<ExecuteOrder>,
    commission: Box<dyn Commission>,
    decimal_precision: u32,
    ledger: Ledger,
    last_price: HashMap<String, Decimal>,
}

impl MatchingEngine {
    pub fn new(initial_balance: Decimal, commission: Box<dyn Commission>, decimal_precision: u32) -> Self {
        Self {
            balance: initial_balance,
            current_bar: None,
            pending: Vec::new(),
            commission,
            decimal_precision,
            ledger: Ledger::new(),
            last_price: HashMap::new(),
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut Ledger {
        &mut self.ledger
    }

    /// Set the current bar, then process the pending book against it
    /// (spec.md §4.5).
    pub fn update_current_market_data(&mut self, bar: Bar) {
        self.last_price.insert(bar.symbol.clone(), bar.close);
        self.current_bar = Some(bar.clone());
        self.process_pending(&bar);
    }

    /// Partition the pending book into remaining and executable orders
    /// (symbol match + limit trigger), then fire the executable ones in
    /// their original submission order. A single order's execution
    /// failure does not halt the pass.
    fn process_pending(&mut self, bar: &Bar) {
        let pending = std::mem::take(&mut self.pending);
        let mut remaining = Vec::with_capacity(pending.len());
        let mut executable = Vec::new();
        for o in pending {
            if o.symbol != bar.symbol {
                remaining.push(o);
                continue;
            }
            let triggers = match o.order_type {
                OrderKind::Market => true,
                OrderKind::Limit => match o.side {
                    OrderSide::Buy => bar.low <= o.price,
                    OrderSide::Sell => bar.high >= o.price,
                },
            };
            if triggers {
                executable.push(o);
            } else {
                remaining.push(o);
            }
        }
        self.pending = remaining;
        for o in executable {
            self.execute_pending(o, bar);
        }
    }

    fn execute_pending(&mut self, o: ExecuteOrder, bar: &Bar) {
        let exec_price = Self::exec_price_for(&o, bar);
        if exec_price <= Decimal::ZERO {
            self.fail(o, FailureReason::InvalidPrice);
            return;
        }
        if let Some(reason) = self.power_check(&o, exec_price) {
            self.fail(o, reason);
            return;
        }
        self.fill(o, exec_price, bar);
    }

    fn exec_price_for(o: &ExecuteOrder, bar: &Bar) -> Decimal {
        match o.order_type {
            OrderKind::Market => bar.midpoint(),
            OrderKind::Limit => match o.side {
                OrderSide::Buy => o.price.min(bar.midpoint()),
                OrderSide::Sell => o.price,
            },
        }
    }

    /// `None` if the order may proceed; `Some(reason)` if it must fail.
    /// Sell/Short (opening a short sale) has no power check — shorting is
    /// unbounded at the kernel level, per spec.md §9's note that short
    /// coverage sizing is deliberately left unenforced.
    fn power_check(&self, o: &ExecuteOrder, price_for_cost: Decimal) -> Option<FailureReason> {
        match o.side {
            OrderSide::Buy => {
                let total_cost = o.quantity * price_for_cost;
                if total_cost > self.balance {
                    Some(FailureReason::InsufficientBuyPower)
                } else {
                    None
                }
            }
            OrderSide::Sell if o.position_type == PositionType::Long => {
                let power = self.selling_power(&o.symbol);
                if o.quantity > power {
                    Some(FailureReason::InsufficientSellPower)
                } else {
                    None
                }
            }
            OrderSide::Sell => None,
        }
    }

    fn selling_power(&self, symbol: &str) -> Decimal {
        round_precision(
            self.ledger.position_for(symbol).total_long_qty(),
            self.decimal_precision,
        )
    }

    /// Submit a single order intent. Returns `Ok(())` even when the order
    /// is rejected (an `OrderRejection` is recorded as a Failed order, not
    /// surfaced as an error); returns `Err` only for the structural/domain
    /// error classes of spec.md §7.
    pub fn place_order(&mut self, mut o: ExecuteOrder) -> Result<(), MatchingError> {
        o.id = OrderId::new();

        if o.quantity <= Decimal::ZERO {
            self.fail(o, FailureReason::InvalidQuantity);
            return Ok(());
        }
        if o.price <= Decimal::ZERO {
            self.fail(o, FailureReason::InvalidPrice);
            return Ok(());
        }
        if o.symbol.trim().is_empty() {
            return Err(MatchingError::InvalidSymbol);
        }

        o.quantity = round_precision(o.quantity, self.decimal_precision);
        if o.quantity <= Decimal::ZERO {
            return Err(MatchingError::QuantityRoundedToZero);
        }

        let bar = match &self.current_bar {
            Some(b) if b.symbol == o.symbol => b.clone(),
            _ => {
                self.pending.push(o);
                return Ok(());
            }
        };

        self.match_against_bar(o, &bar)
    }

    pub fn place_multiple_orders(&mut self, orders: Vec<ExecuteOrder>) -> Result<(), MatchingError> {
        for o in orders {
            self.place_order(o)?;
        }
        Ok(())
    }

    fn match_against_bar(&mut self, o: ExecuteOrder, bar: &Bar) -> Result<(), MatchingError> {
        match o.order_type {
            OrderKind::Market => {
                let exec_price = bar.midpoint();
                if exec_price <= Decimal::ZERO {
                    return Err(MatchingError::NonPositiveExecutionPrice);
                }
                if let Some(reason) = self.power_check(&o, exec_price) {
                    self.fail(o, reason);
                    return Ok(());
                }
                self.fill(o, exec_price, bar);
                Ok(())
            }
            OrderKind::Limit => {
                // Initial gating check is against the order's own limit
                // price, not the eventual (possibly better) fill price.
                if let Some(reason) = self.power_check(&o, o.price) {
                    self.fail(o, reason);
                    return Ok(());
                }
                let triggers = match o.side {
                    OrderSide::Buy => bar.low <= o.price,
                    OrderSide::Sell => bar.high >= o.price,
                };
                if triggers {
                    let exec_price = Self::exec_price_for(&o, bar);
                    self.fill(o, exec_price, bar);
                } else {
                    self.pending.push(o);
                }
                Ok(())
            }
        }
    }

    /// Internal fill path: persists the order+trade to the ledger, applies
    /// the balance effect, and synthesizes any take-profit/stop-loss
    /// attachments into the pending book.
    fn fill(&mut self, o: ExecuteOrder, exec_price: Decimal, bar: &Bar) {
        let fee = self.commission.calculate(o.quantity);
        let order = Order::filled(
            o.id,
            o.symbol.clone(),
            o.side,
            o.position_type,
            o.quantity,
            exec_price,
            bar.time,
            o.reason.clone(),
            o.strategy_name.clone(),
            fee,
        );
        self.ledger.update(vec![order]);
        self.apply_balance_effect(&o, exec_price, fee);
        self.spawn_attachments(&o);
    }

    fn apply_balance_effect(&mut self, o: &ExecuteOrder, exec_price: Decimal, fee: Decimal) {
        match o.side {
            OrderSide::Buy => self.balance -= o.quantity * exec_price,
            OrderSide::Sell => self.balance += o.quantity * exec_price,
        }
        self.balance -= fee;
    }

    fn spawn_attachments(&mut self, o: &ExecuteOrder) {
        if let Some(tp) = o.take_profit {
            self.pending.push(ExecuteOrder {
                id: OrderId::new(),
                symbol: o.symbol.clone(),
                side: tp.side,
                order_type: OrderKind::Limit,
                position_type: o.position_type,
                quantity: o.quantity,
                price: tp.level,
                reason: "TakeProfit".into(),
                strategy_name: o.strategy_name.clone(),
                take_profit: None,
                stop_loss: None,
            });
        }
        if let Some(sl) = o.stop_loss {
            self.pending.push(ExecuteOrder {
                id: OrderId::new(),
                symbol: o.symbol.clone(),
                side: sl.side,
                order_type: OrderKind::Limit,
                position_type: o.position_type,
                quantity: o.quantity,
                price: sl.level,
                reason: "StopLoss".into(),
                strategy_name: o.strategy_name.clone(),
                take_profit: None,
                stop_loss: None,
            });
        }
    }

    fn fail(&mut self, o: ExecuteOrder, reason: FailureReason) {
        let timestamp = self.current_bar.as_ref().map(|b| b.time).unwrap_or_else(Utc::now);
        let order = Order::failed(
            o.id,
            o.symbol,
            o.side,
            o.position_type,
            o.quantity,
            o.price,
            timestamp,
            reason,
            o.strategy_name,
        );
        self.ledger.store_failed_order(order);
    }

    /// Remove a pending order by ID; never touches already-filled trades.
    pub fn cancel_order(&mut self, id: OrderId) -> bool {
        let before = self.pending.len();
        self.pending.retain(|o| o.id != id);
        self.pending.len() != before
    }

    pub fn cancel_all_orders(&mut self) {
        self.pending.clear();
    }

    pub fn order_status(&self, id: OrderId) -> Option<OrderStatus> {
        if let Some(order) = self.ledger.order_by_id(id) {
            return Some(order.status);
        }
        if self.pending.iter().any(|o| o.id == id) {
            return Some(OrderStatus::Pending);
        }
        None
    }

    pub fn position(&self, symbol: &str) -> Position {
        self.ledger.position_for(symbol)
    }

    pub fn positions(&self) -> HashMap<String, Position> {
        self.ledger.all_positions()
    }

    /// Pending orders, in submission order (spec.md §8 property 4).
    pub fn open_orders(&self) -> &[ExecuteOrder] {
        &self.pending
    }

    pub fn trades(&self, symbol: Option<&str>) -> Vec<Trade> {
        match symbol {
            Some(sym) => self
                .ledger
                .all_trades()
                .into_iter()
                .filter(|t| t.order.symbol == sym)
                .collect(),
            None => self.ledger.all_trades(),
        }
    }

    pub fn account_info(&self) -> AccountInfo {
        let trades = self.ledger.all_trades();
        let realized_pnl: Decimal = trades.iter().map(|t| t.pnl).sum();
        let total_fees: Decimal = self.ledger.all_orders().iter().map(|o| o.fee).sum();
        let unrealized_pnl = self.unrealized_pnl();
        AccountInfo {
            balance: self.balance,
            equity: self.balance + self.open_position_market_value(),
            buying_power: self.balance,
            realized_pnl,
            unrealized_pnl,
            total_fees,
            margin_used: Decimal::ZERO,
        }
    }

    /// Mark-to-last price for a symbol, falling back to the position's own
    /// average entry when no bar for it has been seen yet.
    fn last_or_entry(&self, symbol: &str, pos: &Position) -> Decimal {
        self.last_price
            .get(symbol)
            .copied()
            .unwrap_or(pos.avg_long_entry())
    }

    /// Paper profit/loss on still-open quantity, marked at the last traded
    /// price (spec.md §4.7's unrealized-P&L definition).
    fn unrealized_pnl(&self) -> Decimal {
        self.positions()
            .iter()
            .map(|(symbol, pos)| {
                let last = self.last_or_entry(symbol, pos);
                let long_qty = pos.total_long_qty();
                let short_qty = pos.total_short_qty();
                long_qty * (last - pos.avg_long_entry()) + short_qty * (pos.avg_short_entry() - last)
            })
            .sum()
    }

    /// Liquidation value contributed by all open positions, marked at the
    /// last traded price. `balance` already reflects the cash paid/received
    /// when each open leg executed (spec.md §4.5's `apply_balance_effect`),
    /// so `equity` must re-price the still-open quantity rather than add
    /// `unrealized_pnl` (the profit-only figure) on top of a balance that
    /// has already had the full cost basis removed — doing so double-counts
    /// the cost basis and violates spec.md §8 property 6.
    fn open_position_market_value(&self) -> Decimal {
        self.positions()
            .iter()
            .map(|(symbol, pos)| {
                let last = self.last_or_entry(symbol, pos);
                pos.total_long_qty() * last - pos.total_short_qty() * last
            })
            .sum()
    }

    pub fn get_max_buy_quantity(&self, price: Decimal) -> Decimal {
        crate::decimal::calculate_max_quantity(
            self.balance,
            price,
            self.commission.as_ref(),
            self.decimal_precision,
        )
    }

    /// Reports only long holdings, per spec.md §9: short-coverage sizing
    /// is deliberately left unexposed.
    pub fn get_max_sell_quantity(&self, symbol: &str) -> Decimal {
        self.selling_power(symbol)
    }

    /// Clears pending, resets balance and current bar to zero-value.
    /// Ledger state is untouched (a separate `cleanup()` concern).
    pub fn reset(&mut self, initial_balance: Decimal) {
        self.pending.clear();
        self.balance = initial_balance;
        self.current_bar = None;
        self.last_price.clear();
    }

    pub fn balance(&self) -> Decimal {
        self.balance
    }
}
