//! C3: Ledger — append-only order/trade stores, position aggregation, and
//! Parquet export.

use crate::domain::{Order, OrderSide, OrderStatus, Position, PositionType, Trade};
use polars::prelude::{Column, DataFrame, NamedFrom, ParquetWriter, Series};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("failed to build {0} dataframe: {1}")]
    DataFrame(&'static str, String),
    #[error("failed to write {0} to {1}: {2}")]
    Write(&'static str, String, String),
}

/// Outcome of persisting one realized `Order` (spec.md §4.3 `update`).
#[derive(Debug, Clone)]
pub struct UpdateResult {
    pub order: Order,
    pub trade: Trade,
    pub is_new_position: bool,
}

/// Append-only store of orders and trades; positions are a derived view,
/// never a source of truth (mirrors the teacher's `Portfolio`/`Position`
/// split, where trades are the ledger of record).
#[derive(Default)]
pub struct Ledger {
    orders: Vec<Order>,
    trades: Vec<Trade>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Persist a batch of already-filled orders. Each input is isolated:
    /// per spec.md §4.3 the batch is "transactionally per order" — since
    /// both rows are plain in-memory appends with no fallible step between
    /// them, each order's (order, trade) pair commits as a unit by
    /// construction.
    pub fn update(&mut self, orders: Vec<Order>) -> Vec<UpdateResult> {
        let mut results = Vec::with_capacity(orders.len());
        for order in orders {
            debug_assert_eq!(order.status, OrderStatus::Filled);

            let pos_before = self.position_for(&order.symbol);
            let before_qty = match order.position_type {
                PositionType::Long => pos_before.total_long_qty(),
                PositionType::Short => pos_before.total_short_qty(),
            };
            let is_new_position = before_qty.is_zero();
            let pnl = Self::closing_pnl(&order, &pos_before);

            let trade = Trade {
                order: order.clone(),
                executed_at: order.timestamp,
                executed_qty: order.quantity,
                executed_price: order.price,
                fee: order.fee,
                pnl,
            };

            self.orders.push(order.clone());
            self.trades.push(trade.clone());

            results.push(UpdateResult {
                order,
                trade,
                is_new_position,
            });
        }
        results
    }

    /// Persist a failed order: an `orders` row only, no `trades` row.
    pub fn store_failed_order(&mut self, order: Order) {
        debug_assert!(matches!(order.status, OrderStatus::Failed(_)));
        self.orders.push(order);
    }

    /// Realized P&L for a closing leg, per spec.md §4.3's formulas. Zero on
    /// opening legs and on any leg where the corresponding open quantity
    /// was zero before this order (spec.md §8 property 2).
    fn closing_pnl(order: &Order, pos_before: &Position) -> Decimal {
        match (order.side, order.position_type) {
            (OrderSide::Sell, PositionType::Long) if pos_before.total_long_qty() > Decimal::ZERO => {
                order.quantity * order.price - order.fee
                    - order.quantity * pos_before.avg_long_entry()
            }
            (OrderSide::Buy, PositionType::Short)
                if pos_before.total_short_qty() > Decimal::ZERO =>
            {
                order.quantity * pos_before.avg_short_entry()
                    - (order.quantity * order.price + order.fee)
            }
            _ => Decimal::ZERO,
        }
    }

    /// Aggregate position for one symbol, computed fresh from the trade
    /// stream (spec.md §3). Returns a zero-position, never "not found", when
    /// the symbol has no trades.
    pub fn position_for(&self, symbol: &str) -> Position {
        let mut pos = Position::empty(symbol);
        for trade in self.trades.iter().filter(|t| t.order.symbol == symbol) {
            Self::fold_trade_into_position(&mut pos, trade);
        }
        pos
    }

    /// All non-flat positions, keyed by symbol.
    pub fn all_positions(&self) -> HashMap<String, Position> {
        let mut by_symbol: HashMap<String, Position> = HashMap::new();
        for trade in &self.trades {
            let entry = by_symbol
                .entry(trade.order.symbol.clone())
                .or_insert_with(|| Position::empty(&trade.order.symbol));
            Self::fold_trade_into_position(entry, trade);
        }
        by_symbol.retain(|_, pos| !pos.is_flat());
        by_symbol
    }

    fn fold_trade_into_position(pos: &mut Position, trade: &Trade) {
        let qty = trade.executed_qty;
        let amount = trade.executed_qty * trade.executed_price;
        let fee = trade.fee;
        match (trade.order.side, trade.order.position_type) {
            (OrderSide::Buy, PositionType::Long) => {
                pos.total_long_in_qty += qty;
                pos.total_long_in_amount += amount;
                pos.total_long_in_fee += fee;
            }
            (OrderSide::Sell, PositionType::Long) => {
                pos.total_long_out_qty += qty;
                pos.total_long_out_amount += amount;
                pos.total_long_out_fee += fee;
            }
            (OrderSide::Sell, PositionType::Short) => {
                pos.total_short_in_qty += qty;
                pos.total_short_in_amount += amount;
                pos.total_short_in_fee += fee;
            }
            (OrderSide::Buy, PositionType::Short) => {
                pos.total_short_out_qty += qty;
                pos.total_short_out_amount += amount;
                pos.total_short_out_fee += fee;
            }
        }
        pos.open_timestamp = Some(match pos.open_timestamp {
            Some(existing) => existing.min(trade.executed_at),
            None => trade.executed_at,
        });
    }

    pub fn order_by_id(&self, id: crate::domain::OrderId) -> Option<&Order> {
        self.orders.iter().find(|o| o.order_id == id)
    }

    /// All trades, ordered by execution time ascending.
    pub fn all_trades(&self) -> Vec<Trade> {
        let mut trades = self.trades.clone();
        trades.sort_by_key(|t| t.executed_at);
        trades
    }

    /// All orders, ordered by execution time ascending.
    pub fn all_orders(&self) -> Vec<Order> {
        let mut orders = self.orders.clone();
        orders.sort_by_key(|o| o.timestamp);
        orders
    }

    /// Drop and recreate storage; used between runs.
    pub fn cleanup(&mut self) {
        self.orders.clear();
        self.trades.clear();
    }

    /// Export both tables to Parquet under `dir` as `orders.parquet` and
    /// `trades.parquet`, with the column order spec.md §6 fixes.
    pub fn write(&self, dir: &Path) -> Result<(), LedgerError> {
        std::fs::create_dir_all(dir)
            .map_err(|e| LedgerError::Write("state.db", dir.display().to_string(), e.to_string()))?;
        self.write_orders(&dir.join("orders.parquet"))?;
        self.write_trades(&dir.join("trades.parquet"))?;
        Ok(())
    }

    fn write_orders(&self, path: &Path) -> Result<(), LedgerError> {
        let orders = self.all_orders();
        let order_id: Vec<String> = orders.iter().map(|o| o.order_id.to_string()).collect();
        let symbol: Vec<String> = orders.iter().map(|o| o.symbol.clone()).collect();
        let order_type: Vec<&str> = orders
            .iter()
            .map(|o| match o.side {
                OrderSide::Buy => "Buy",
                OrderSide::Sell => "Sell",
            })
            .collect();
        let quantity: Vec<f64> = orders.iter().map(|o| o.quantity.to_f64().unwrap_or(0.0)).collect();
        let price: Vec<f64> = orders.iter().map(|o| o.price.to_f64().unwrap_or(0.0)).collect();
        let timestamp: Vec<i64> = orders.iter().map(|o| o.timestamp.timestamp_millis()).collect();
        let is_completed: Vec<bool> = orders.iter().map(|o| o.is_completed).collect();
        let status: Vec<&str> = orders
            .iter()
            .map(|o| match o.status {
                OrderStatus::Filled => "Filled",
                OrderStatus::Pending => "Pending",
                OrderStatus::Failed(_) => "Failed",
            })
            .collect();
        let reason: Vec<String> = orders.iter().map(|o| o.reason.clone()).collect();
        let message: Vec<String> = orders.iter().map(|o| o.reason.clone()).collect();
        let strategy_name: Vec<String> = orders.iter().map(|o| o.strategy_name.clone()).collect();
        let position_type: Vec<&str> = orders
            .iter()
            .map(|o| match o.position_type {
                PositionType::Long => "Long",
                PositionType::Short => "Short",
            })
            .collect();

        let mut df = DataFrame::new(vec![
            Column::Series(Series::new("orderId".into(), order_id)),
            Column::Series(Series::new("symbol".into(), symbol)),
            Column::Series(Series::new("orderType".into(), order_type)),
            Column::Series(Series::new("quantity".into(), quantity)),
            Column::Series(Series::new("price".into(), price)),
            Column::Series(Series::new("timestamp".into(), timestamp)),
            Column::Series(Series::new("isCompleted".into(), is_completed)),
            Column::Series(Series::new("status".into(), status)),
            Column::Series(Series::new("reason".into(), reason)),
            Column::Series(Series::new("message".into(), message)),
            Column::Series(Series::new("strategyName".into(), strategy_name)),
            Column::Series(Series::new("positionType".into(), position_type)),
        ])
        .map_err(|e| LedgerError::DataFrame("orders", e.to_string()))?;

        let mut file = File::create(path)
            .map_err(|e| LedgerError::Write("orders.parquet", path.display().to_string(), e.to_string()))?;
        ParquetWriter::new(&mut file)
            .finish(&mut df)
            .map_err(|e| LedgerError::Write("orders.parquet", path.display().to_string(), e.to_string()))?;
        Ok(())
    }

    fn write_trades(&self, path: &Path) -> Result<(), LedgerError> {
        let trades = self.all_trades();
        let order_id: Vec<String> = trades.iter().map(|t| t.order.order_id.to_string()).collect();
        let symbol: Vec<String> = trades.iter().map(|t| t.order.symbol.clone()).collect();
        let order_type: Vec<&str> = trades
            .iter()
            .map(|t| match t.order.side {
                OrderSide::Buy => "Buy",
                OrderSide::Sell => "Sell",
            })
            .collect();
        let quantity: Vec<f64> = trades.iter().map(|t| t.order.quantity.to_f64().unwrap_or(0.0)).collect();
        let price: Vec<f64> = trades.iter().map(|t| t.order.price.to_f64().unwrap_or(0.0)).collect();
        let timestamp: Vec<i64> = trades.iter().map(|t| t.order.timestamp.timestamp_millis()).collect();
        let is_completed: Vec<bool> = trades.iter().map(|t| t.order.is_completed).collect();
        let reason: Vec<String> = trades.iter().map(|t| t.order.reason.clone()).collect();
        let message: Vec<String> = trades.iter().map(|t| t.order.reason.clone()).collect();
        let strategy_name: Vec<String> = trades.iter().map(|t| t.order.strategy_name.clone()).collect();
        let executed_at: Vec<i64> = trades.iter().map(|t| t.executed_at.timestamp_millis()).collect();
        let executed_qty: Vec<f64> = trades.iter().map(|t| t.executed_qty.to_f64().unwrap_or(0.0)).collect();
        let executed_price: Vec<f64> = trades.iter().map(|t| t.executed_price.to_f64().unwrap_or(0.0)).collect();
        let commission: Vec<f64> = trades.iter().map(|t| t.fee.to_f64().unwrap_or(0.0)).collect();
        let pnl: Vec<f64> = trades.iter().map(|t| t.pnl.to_f64().unwrap_or(0.0)).collect();
        let position_type: Vec<&str> = trades
            .iter()
            .map(|t| match t.order.position_type {
                PositionType::Long => "Long",
                PositionType::Short => "Short",
            })
            .collect();

        let mut df = DataFrame::new(vec![
            Column::Series(Series::new("orderId".into(), order_id)),
            Column::Series(Series::new("symbol".into(), symbol)),
            Column::Series(Series::new("orderType".into(), order_type)),
            Column::Series(Series::new("quantity".into(), quantity)),
            Column::Series(Series::new("price".into(), price)),
            Column::Series(Series::new("timestamp".into(), timestamp)),
            Column::Series(Series::new("isCompleted".into(), is_completed)),
            Column::Series(Series::new("reason".into(), reason)),
            Column::Series(Series::new("message".into(), message)),
            Column::Series(Series::new("strategyName".into(), strategy_name)),
            Column::Series(Series::new("executedAt".into(), executed_at)),
            Column::Series(Series::new("executedQty".into(), executed_qty)),
            Column::Series(Series::new("executedPrice".into(), executed_price)),
            Column::Series(Series::new("commission".into(), commission)),
            Column::Series(Series::new("pnl".into(), pnl)),
            Column::Series(Series::new("positionType".into(), position_type)),
        ])
        .map_err(|e| LedgerError::DataFrame("trades", e.to_string()))?;

        let mut file = File::create(path)
            .map_err(|e| LedgerError::Write("trades.parquet", path.display().to_string(), e.to_string()))?;
        ParquetWriter::new(&mut file)
            .finish(&mut df)
            .map_err(|e| LedgerError::Write("trades.parquet", path.display().to_string(), e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OrderId, OrderKind};
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn filled(
        side: OrderSide,
        position_type: PositionType,
        qty: Decimal,
        price: Decimal,
        fee: Decimal,
        ts: i64,
    ) -> Order {
        Order::filled(
            OrderId::new(),
            "AAPL",
            side,
            position_type,
            qty,
            price,
            Utc.timestamp_opt(ts, 0).unwrap(),
            "signal",
            "demo",
            fee,
        )
    }

    #[test]
    fn opening_leg_has_zero_pnl_and_marks_new_position() {
        let mut ledger = Ledger::new();
        let order = filled(OrderSide::Buy, PositionType::Long, dec!(10), dec!(100), dec!(0), 0);
        let results = ledger.update(vec![order]);
        assert_eq!(results.len(), 1);
        assert!(results[0].is_new_position);
        assert_eq!(results[0].trade.pnl, Decimal::ZERO);
    }

    #[test]
    fn closing_long_computes_pnl_against_avg_entry() {
        let mut ledger = Ledger::new();
        ledger.update(vec![filled(
            OrderSide::Buy,
            PositionType::Long,
            dec!(10),
            dec!(100),
            dec!(0),
            0,
        )]);
        let results = ledger.update(vec![filled(
            OrderSide::Sell,
            PositionType::Long,
            dec!(10),
            dec!(120),
            dec!(0),
            1,
        )]);
        assert_eq!(results[0].trade.pnl, dec!(200));
        assert!(!results[0].is_new_position);
        let pos = ledger.position_for("AAPL");
        assert_eq!(pos.total_long_qty(), Decimal::ZERO);
    }

    #[test]
    fn closing_short_computes_pnl_against_avg_entry() {
        let mut ledger = Ledger::new();
        ledger.update(vec![filled(
            OrderSide::Sell,
            PositionType::Short,
            dec!(10),
            dec!(100),
            dec!(0),
            0,
        )]);
        let results = ledger.update(vec![filled(
            OrderSide::Buy,
            PositionType::Short,
            dec!(10),
            dec!(80),
            dec!(0),
            1,
        )]);
        // avgShortEntry(100)*10 - (10*80 + 0) = 1000 - 800 = 200
        assert_eq!(results[0].trade.pnl, dec!(200));
    }

    #[test]
    fn sell_with_no_open_long_has_zero_pnl() {
        let mut ledger = Ledger::new();
        let results = ledger.update(vec![filled(
            OrderSide::Sell,
            PositionType::Long,
            dec!(10),
            dec!(120),
            dec!(0),
            0,
        )]);
        assert_eq!(results[0].trade.pnl, Decimal::ZERO);
    }

    #[test]
    fn failed_order_has_no_trade_row() {
        let mut ledger = Ledger::new();
        let order = Order::failed(
            OrderId::new(),
            "AAPL",
            OrderSide::Buy,
            PositionType::Long,
            dec!(10),
            dec!(0),
            Utc::now(),
            crate::domain::FailureReason::InsufficientBuyPower,
            "demo",
        );
        ledger.store_failed_order(order);
        assert_eq!(ledger.all_orders().len(), 1);
        assert_eq!(ledger.all_trades().len(), 0);
    }

    #[test]
    fn cleanup_is_idempotent() {
        let mut ledger = Ledger::new();
        ledger.update(vec![filled(OrderSide::Buy, PositionType::Long, dec!(10), dec!(100), dec!(0), 0)]);
        ledger.cleanup();
        ledger.cleanup();
        assert!(ledger.all_orders().is_empty());
        assert!(ledger.all_trades().is_empty());
        ledger.update(vec![filled(OrderSide::Buy, PositionType::Long, dec!(5), dec!(50), dec!(0), 0)]);
        assert_eq!(ledger.all_orders().len(), 1);
    }

    #[test]
    fn all_positions_excludes_flat_symbols() {
        let mut ledger = Ledger::new();
        ledger.update(vec![filled(OrderSide::Buy, PositionType::Long, dec!(10), dec!(100), dec!(0), 0)]);
        ledger.update(vec![filled(OrderSide::Sell, PositionType::Long, dec!(10), dec!(110), dec!(0), 1)]);
        assert!(ledger.all_positions().is_empty());
    }
}
