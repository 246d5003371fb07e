//! Orders: strategy intents (`ExecuteOrder`) and realized records (`Order`).

use super::ids::OrderId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderKind {
    Market,
    Limit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionType {
    Long,
    Short,
}

/// Attachment describing where a take-profit or stop-loss should trigger.
///
/// Per spec.md §9, the trigger `level` is the caller's responsibility — the
/// kernel never derives it; it only synthesizes the resulting limit order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Attachment {
    pub side: OrderSide,
    pub level: Decimal,
}

/// A strategy's intent to trade, submitted to the matching engine.
///
/// `id` is always overwritten by the engine on submission — any
/// strategy-supplied value is discarded to guarantee uniqueness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteOrder {
    pub id: OrderId,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderKind,
    pub position_type: PositionType,
    pub quantity: Decimal,
    /// Required for `Limit` orders; market orders may pass an unused value.
    pub price: Decimal,
    pub reason: String,
    pub strategy_name: String,
    pub take_profit: Option<Attachment>,
    pub stop_loss: Option<Attachment>,
}

impl ExecuteOrder {
    /// Construct a minimal market order; callers fill in the rest via `..`.
    pub fn market(
        symbol: impl Into<String>,
        side: OrderSide,
        position_type: PositionType,
        quantity: Decimal,
        strategy_name: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id: OrderId::new(),
            symbol: symbol.into(),
            side,
            order_type: OrderKind::Market,
            position_type,
            quantity,
            price: Decimal::ZERO,
            reason: reason.into(),
            strategy_name: strategy_name.into(),
            take_profit: None,
            stop_loss: None,
        }
    }
}

/// Why a submitted order failed validation or power checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    InvalidQuantity,
    InvalidPrice,
    InsufficientBuyPower,
    InsufficientSellPower,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureReason::InvalidQuantity => "InvalidQuantity",
            FailureReason::InvalidPrice => "InvalidPrice",
            FailureReason::InsufficientBuyPower => "InsufficientBuyPower",
            FailureReason::InsufficientSellPower => "InsufficientSellPower",
        };
        f.write_str(s)
    }
}

/// Lifecycle status of a realized `Order`. Never mutated after insert —
/// an order is created already in its terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Filled,
    Pending,
    Failed(FailureReason),
}

/// A realized order record: either immediately filled or failed.
/// Pending orders living in the `PendingBook` are still `ExecuteOrder`s;
/// an `Order` row only exists once the engine has reached a final verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub order_id: OrderId,
    pub symbol: String,
    pub side: OrderSide,
    pub position_type: PositionType,
    pub quantity: Decimal,
    /// Execution price (meaningless, but present, for failed orders).
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
    pub is_completed: bool,
    pub status: OrderStatus,
    pub reason: String,
    pub strategy_name: String,
    pub fee: Decimal,
}

impl Order {
    pub fn filled(
        order_id: OrderId,
        symbol: impl Into<String>,
        side: OrderSide,
        position_type: PositionType,
        quantity: Decimal,
        price: Decimal,
        timestamp: DateTime<Utc>,
        reason: impl Into<String>,
        strategy_name: impl Into<String>,
        fee: Decimal,
    ) -> Self {
        Self {
            order_id,
            symbol: symbol.into(),
            side,
            position_type,
            quantity,
            price,
            timestamp,
            is_completed: true,
            status: OrderStatus::Filled,
            reason: reason.into(),
            strategy_name: strategy_name.into(),
            fee,
        }
    }

    pub fn failed(
        order_id: OrderId,
        symbol: impl Into<String>,
        side: OrderSide,
        position_type: PositionType,
        quantity: Decimal,
        price: Decimal,
        timestamp: DateTime<Utc>,
        reason: FailureReason,
        strategy_name: impl Into<String>,
    ) -> Self {
        Self {
            order_id,
            symbol: symbol.into(),
            side,
            position_type,
            quantity,
            price,
            timestamp,
            is_completed: false,
            status: OrderStatus::Failed(reason),
            reason: reason.to_string(),
            strategy_name: strategy_name.into(),
            fee: Decimal::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn failed_order_has_zero_fee_and_is_incomplete() {
        let order = Order::failed(
            OrderId::new(),
            "AAPL",
            OrderSide::Buy,
            PositionType::Long,
            dec!(10),
            dec!(0),
            Utc::now(),
            FailureReason::InsufficientBuyPower,
            "demo",
        );
        assert!(!order.is_completed);
        assert_eq!(order.fee, Decimal::ZERO);
        assert_eq!(order.reason, "InsufficientBuyPower");
    }

    #[test]
    fn filled_order_is_completed() {
        let order = Order::filled(
            OrderId::new(),
            "AAPL",
            OrderSide::Buy,
            PositionType::Long,
            dec!(10),
            dec!(100),
            Utc::now(),
            "signal",
            "demo",
            dec!(1),
        );
        assert!(order.is_completed);
        assert_eq!(order.status, OrderStatus::Filled);
    }
}
