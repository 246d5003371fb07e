//! C7: Statistics Deriver — reads the finalized trade/order streams and
//! produces a `TradeStats` record per symbol (spec.md §4.7).

use crate::data_source::DataSource;
use crate::domain::{OrderSide, PositionType, Trade};
use crate::ledger::Ledger;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeResultStats {
    pub number_of_trades: usize,
    pub number_of_winning_trades: usize,
    pub number_of_losing_trades: usize,
    pub win_rate: f64,
    pub max_drawdown: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoldingTimeStats {
    pub min_seconds: i64,
    pub max_seconds: i64,
    pub avg_seconds: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PnlStats {
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    pub total_pnl: Decimal,
    pub maximum_loss: Decimal,
    pub maximum_profit: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeStats {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub trade_result: TradeResultStats,
    pub total_fees: Decimal,
    pub trade_holding_time: HoldingTimeStats,
    pub trade_pnl: PnlStats,
    pub buy_and_hold_pnl: Decimal,
    pub trades_path: String,
    pub orders_path: String,
    pub marks_path: String,
    pub strategy_path: String,
    pub data_path: String,
}

/// Paths recorded on every `TradeStats` row (spec.md §4.7 "Bookkeeping").
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub trades_path: String,
    pub orders_path: String,
    pub marks_path: String,
    pub strategy_path: String,
    pub data_path: String,
}

/// Derives per-symbol `TradeStats` from a finalized ledger's trade stream.
pub struct StatisticsDeriver<'a> {
    ledger: &'a Ledger,
    data_source: &'a dyn DataSource,
}

impl<'a> StatisticsDeriver<'a> {
    pub fn new(ledger: &'a Ledger, data_source: &'a dyn DataSource) -> Self {
        Self { ledger, data_source }
    }

    /// One `TradeStats` per symbol that appears in `trades`, run-stamped
    /// with `run_id`/`timestamp` and the given artifact paths.
    pub fn derive(
        &self,
        run_id: &str,
        timestamp: DateTime<Utc>,
        paths: &ArtifactPaths,
    ) -> Vec<TradeStats> {
        let mut by_symbol: BTreeMap<String, Vec<Trade>> = BTreeMap::new();
        for trade in self.ledger.all_trades() {
            by_symbol
                .entry(trade.order.symbol.clone())
                .or_default()
                .push(trade);
        }

        by_symbol
            .into_iter()
            .map(|(symbol, trades)| self.derive_for_symbol(run_id, timestamp, &symbol, trades, paths))
            .collect()
    }

    fn derive_for_symbol(
        &self,
        run_id: &str,
        timestamp: DateTime<Utc>,
        symbol: &str,
        mut trades: Vec<Trade>,
        paths: &ArtifactPaths,
    ) -> TradeStats {
        trades.sort_by_key(|t| t.executed_at);

        let trade_result = Self::trade_result(&trades);
        let total_fees: Decimal = trades.iter().map(|t| t.fee).sum();
        let trade_holding_time = self.holding_time(symbol, &trades);
        let trade_pnl = self.pnl_stats(symbol, &trades);
        let buy_and_hold_pnl = self.buy_and_hold_pnl(symbol, &trades);

        TradeStats {
            id: run_id.to_string(),
            timestamp,
            symbol: symbol.to_string(),
            trade_result,
            total_fees,
            trade_holding_time,
            trade_pnl,
            buy_and_hold_pnl,
            trades_path: paths.trades_path.clone(),
            orders_path: paths.orders_path.clone(),
            marks_path: paths.marks_path.clone(),
            strategy_path: paths.strategy_path.clone(),
            data_path: paths.data_path.clone(),
        }
    }

    fn trade_result(trades: &[Trade]) -> TradeResultStats {
        let number_of_trades = trades.len();
        let number_of_winning_trades = trades.iter().filter(|t| t.pnl > Decimal::ZERO).count();
        let number_of_losing_trades = trades.iter().filter(|t| t.pnl < Decimal::ZERO).count();
        let win_rate = if number_of_trades == 0 {
            0.0
        } else {
            number_of_winning_trades as f64 / number_of_trades as f64
        };
        let min_pnl = trades.iter().map(|t| t.pnl).min().unwrap_or(Decimal::ZERO);
        let max_drawdown = if min_pnl < Decimal::ZERO { -min_pnl } else { Decimal::ZERO };

        TradeResultStats {
            number_of_trades,
            number_of_winning_trades,
            number_of_losing_trades,
            win_rate,
            max_drawdown,
        }
    }

    /// FIFO-matched buy/sell pairs (spec.md §4.7, §8 property 7). Buys and
    /// sells are ranked separately by execution time and paired by rank;
    /// unmatched trailing buys use `dataSource.readLastData(symbol).time`
    /// as their end time.
    fn holding_time(&self, symbol: &str, trades: &[Trade]) -> HoldingTimeStats {
        let mut buys: Vec<DateTime<Utc>> = trades
            .iter()
            .filter(|t| t.order.side == OrderSide::Buy)
            .map(|t| t.executed_at)
            .collect();
        let mut sells: Vec<DateTime<Utc>> = trades
            .iter()
            .filter(|t| t.order.side == OrderSide::Sell)
            .map(|t| t.executed_at)
            .collect();
        buys.sort();
        sells.sort();

        if buys.is_empty() {
            return HoldingTimeStats {
                min_seconds: 0,
                max_seconds: 0,
                avg_seconds: 0.0,
            };
        }

        let end_time = self
            .data_source
            .read_last_data(symbol)
            .map(|b| b.time)
            .unwrap_or_else(|_| buys.last().copied().unwrap());

        let mut durations: Vec<i64> = Vec::with_capacity(buys.len());
        for (i, buy_time) in buys.iter().enumerate() {
            let sell_time = sells.get(i).copied().unwrap_or(end_time);
            durations.push((sell_time - *buy_time).num_seconds());
        }

        let min_seconds = *durations.iter().min().unwrap();
        let max_seconds = *durations.iter().max().unwrap();
        let avg_seconds = durations.iter().sum::<i64>() as f64 / durations.len() as f64;

        HoldingTimeStats {
            min_seconds,
            max_seconds,
            avg_seconds,
        }
    }

    fn pnl_stats(&self, symbol: &str, trades: &[Trade]) -> PnlStats {
        let realized_pnl: Decimal = trades.iter().map(|t| t.pnl).sum();
        let maximum_loss = trades.iter().map(|t| t.pnl).min().unwrap_or(Decimal::ZERO);
        let maximum_profit = trades.iter().map(|t| t.pnl).max().unwrap_or(Decimal::ZERO);

        let position = self.ledger.position_for(symbol);
        let last_close = self
            .data_source
            .read_last_data(symbol)
            .map(|b| b.close)
            .unwrap_or(Decimal::ZERO);

        let long_qty = position.total_long_qty();
        let short_qty = position.total_short_qty();
        // Unrealized P&L for shorts uses the out-side (cover price) average
        // per spec.md §9's documented source asymmetry, not the in-side
        // `avg_short_entry` used for closing-leg realized P&L.
        let unrealized_pnl = long_qty * (last_close - position.avg_long_entry())
            + short_qty * (position.avg_short_cover_price() - last_close);

        PnlStats {
            realized_pnl,
            unrealized_pnl,
            total_pnl: realized_pnl + unrealized_pnl,
            maximum_loss,
            maximum_profit,
        }
    }

    fn buy_and_hold_pnl(&self, symbol: &str, trades: &[Trade]) -> Decimal {
        let Some(first) = trades.first() else {
            return Decimal::ZERO;
        };
        let last_close = self
            .data_source
            .read_last_data(symbol)
            .map(|b| b.close)
            .unwrap_or(Decimal::ZERO);
        match first.order.position_type {
            PositionType::Long => (last_close - first.executed_price) * first.executed_qty,
            PositionType::Short => (first.executed_price - last_close) * first.executed_qty,
        }
    }
}
