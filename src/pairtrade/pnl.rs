use serde::{Deserialize, Serialize};

use super::signal::{ExitReason, Position, PositionDirection};

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Realized PnL of one round trip, net of a single slippage charge of
/// `size * slippage_rate`.
#[allow(clippy::too_many_arguments)]
pub fn compute_pnl(
    direction: PositionDirection,
    entry_price_a: f64,
    entry_price_b: f64,
    exit_price_a: f64,
    exit_price_b: f64,
    hedge_ratio: f64,
    size: f64,
    slippage_rate: f64,
) -> f64 {
    let (pnl_a, pnl_b) = match direction {
        PositionDirection::LongSpread => (
            (exit_price_a - entry_price_a) / entry_price_a * size,
            (entry_price_b - exit_price_b) / entry_price_b * size * hedge_ratio,
        ),
        PositionDirection::ShortSpread => (
            (entry_price_a - exit_price_a) / entry_price_a * size,
            (exit_price_b - entry_price_b) / entry_price_b * size * hedge_ratio,
        ),
    };
    pnl_a + pnl_b - size * slippage_rate
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub entry_ts: i64,
    pub exit_ts: i64,
    pub direction: PositionDirection,
    pub entry_price_a: f64,
    pub entry_price_b: f64,
    pub exit_price_a: f64,
    pub exit_price_b: f64,
    pub hedge_ratio: f64,
    pub entry_z: f64,
    pub exit_z: f64,
    pub pnl: f64,
    pub exit_reason: ExitReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquitySnapshot {
    pub ts: i64,
    pub capital: f64,
}

/// End-of-run report, flat so it serializes as a single key-value object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestSummary {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub win_rate: f64,
    pub total_pnl: f64,
    pub avg_trade: f64,
    pub final_capital: f64,
    pub return_pct: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub hedge_ratio: Option<f64>,
}

/// Annualized Sharpe of period-over-period percentage returns. Uses the
/// sample standard deviation; zero with fewer than two returns or no dispersion.
pub fn sharpe_ratio(equity: &[f64]) -> f64 {
    let returns: Vec<f64> = equity
        .windows(2)
        .filter(|w| w[0] != 0.0)
        .map(|w| (w[1] - w[0]) / w[0])
        .collect();
    if returns.len() < 2 {
        return 0.0;
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let var = returns.iter().map(|r| (r - mean) * (r - mean)).sum::<f64>() / (n - 1.0);
    let std = var.sqrt();
    if std <= 0.0 || !std.is_finite() {
        return 0.0;
    }
    mean / std * TRADING_DAYS_PER_YEAR.sqrt()
}

/// Most negative `(equity - running_max) / running_max`, zero for an empty curve.
pub fn max_drawdown(equity: &[f64]) -> f64 {
    let mut running_max = f64::NEG_INFINITY;
    let mut worst = 0.0_f64;
    for &value in equity {
        running_max = running_max.max(value);
        if running_max > 0.0 {
            worst = worst.min((value - running_max) / running_max);
        }
    }
    worst
}

#[derive(Debug)]
pub struct PnlLedger {
    initial_capital: f64,
    capital: f64,
    position_size: f64,
    slippage_rate: f64,
    trades: Vec<TradeRecord>,
    equity: Vec<EquitySnapshot>,
}

impl PnlLedger {
    pub fn new(initial_capital: f64, position_size: f64, slippage_rate: f64) -> Self {
        Self {
            initial_capital,
            capital: initial_capital,
            position_size,
            slippage_rate,
            trades: Vec::new(),
            equity: Vec::new(),
        }
    }

    /// Books the round trip and returns the immutable record that was appended.
    pub fn close(
        &mut self,
        position: &Position,
        exit_price_a: f64,
        exit_price_b: f64,
        exit_ts: i64,
        exit_z: f64,
        reason: ExitReason,
    ) -> &TradeRecord {
        let pnl = compute_pnl(
            position.direction,
            position.entry_price_a,
            position.entry_price_b,
            exit_price_a,
            exit_price_b,
            position.hedge_ratio,
            self.position_size,
            self.slippage_rate,
        );
        self.capital += pnl;
        self.trades.push(TradeRecord {
            entry_ts: position.entry_ts,
            exit_ts,
            direction: position.direction,
            entry_price_a: position.entry_price_a,
            entry_price_b: position.entry_price_b,
            exit_price_a,
            exit_price_b,
            hedge_ratio: position.hedge_ratio,
            entry_z: position.entry_z,
            exit_z,
            pnl,
            exit_reason: reason,
        });
        &self.trades[self.trades.len() - 1]
    }

    pub fn snapshot(&mut self, ts: i64) -> EquitySnapshot {
        let snap = EquitySnapshot {
            ts,
            capital: self.capital,
        };
        self.equity.push(snap);
        snap
    }

    pub fn capital(&self) -> f64 {
        self.capital
    }

    pub fn initial_capital(&self) -> f64 {
        self.initial_capital
    }

    pub fn trades(&self) -> &[TradeRecord] {
        &self.trades
    }

    pub fn equity_curve(&self) -> &[EquitySnapshot] {
        &self.equity
    }

    pub fn summary(&self, hedge_ratio: Option<f64>) -> BacktestSummary {
        let total_trades = self.trades.len();
        let winning_trades = self.trades.iter().filter(|t| t.pnl > 0.0).count();
        let total_pnl: f64 = self.trades.iter().map(|t| t.pnl).sum();
        let (win_rate, avg_trade) = if total_trades > 0 {
            (
                winning_trades as f64 / total_trades as f64,
                total_pnl / total_trades as f64,
            )
        } else {
            (0.0, 0.0)
        };
        let curve: Vec<f64> = self.equity.iter().map(|e| e.capital).collect();
        BacktestSummary {
            total_trades,
            winning_trades,
            win_rate,
            total_pnl,
            avg_trade,
            final_capital: self.capital,
            return_pct: (self.capital - self.initial_capital) / self.initial_capital * 100.0,
            sharpe_ratio: sharpe_ratio(&curve),
            max_drawdown: max_drawdown(&curve),
            hedge_ratio,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn position(direction: PositionDirection) -> Position {
        Position {
            direction,
            entry_ts: 1_000,
            entry_price_a: 40_000.0,
            entry_price_b: 2_500.0,
            entry_z: 2.3,
            hedge_ratio: 1.3,
            qty_a: Decimal::ZERO,
            qty_b: Decimal::ZERO,
        }
    }

    #[test]
    fn flat_round_trip_costs_exactly_slippage() {
        for direction in [PositionDirection::LongSpread, PositionDirection::ShortSpread] {
            let pnl = compute_pnl(direction, 100.0, 50.0, 100.0, 50.0, 1.7, 1000.0, 0.001);
            assert_eq!(pnl, -1.0);
        }
    }

    #[test]
    fn long_spread_profits_when_a_rises_and_b_falls() {
        let pnl = compute_pnl(
            PositionDirection::LongSpread,
            100.0,
            50.0,
            110.0,
            45.0,
            2.0,
            1000.0,
            0.001,
        );
        // 100 on A, 0.1 * 1000 * 2 = 200 on B, minus 1 slippage
        assert!((pnl - 299.0).abs() < 1e-9);
        let short = compute_pnl(
            PositionDirection::ShortSpread,
            100.0,
            50.0,
            110.0,
            45.0,
            2.0,
            1000.0,
            0.001,
        );
        assert!((short + 301.0).abs() < 1e-9);
    }

    #[test]
    fn ledger_tracks_capital_and_records() {
        let mut ledger = PnlLedger::new(50_000.0, 1000.0, 0.001);
        let record = ledger
            .close(
                &position(PositionDirection::ShortSpread),
                40_000.0,
                2_500.0,
                5_000,
                0.3,
                ExitReason::Signal,
            )
            .clone();
        assert_eq!(record.pnl, -1.0);
        assert_eq!(record.exit_reason, ExitReason::Signal);
        assert_eq!(record.entry_ts, 1_000);
        assert_eq!(ledger.capital(), 49_999.0);

        let summary = ledger.summary(Some(1.3));
        assert_eq!(summary.total_trades, 1);
        assert_eq!(summary.winning_trades, 0);
        assert_eq!(summary.win_rate, 0.0);
        assert_eq!(summary.avg_trade, -1.0);
        assert!((summary.return_pct + 0.002).abs() < 1e-12);
        assert_eq!(summary.hedge_ratio, Some(1.3));
    }

    #[test]
    fn max_drawdown_of_known_curve() {
        let dd = max_drawdown(&[50_000.0, 51_000.0, 49_500.0, 52_000.0]);
        assert!((dd - (49_500.0 - 51_000.0) / 51_000.0).abs() < 1e-12);
        assert!((dd * 100.0 + 2.94).abs() < 0.01);
        assert_eq!(max_drawdown(&[]), 0.0);
        assert_eq!(max_drawdown(&[1.0, 2.0, 3.0]), 0.0);
    }

    #[test]
    fn sharpe_needs_two_returns_and_dispersion() {
        assert_eq!(sharpe_ratio(&[]), 0.0);
        assert_eq!(sharpe_ratio(&[50_000.0, 51_000.0]), 0.0);
        assert_eq!(sharpe_ratio(&[100.0, 100.0, 100.0]), 0.0);
        let curve = [50_000.0, 51_000.0, 49_500.0, 52_000.0];
        let returns = [0.02, -1_500.0 / 51_000.0, 2_500.0 / 49_500.0];
        let mean = returns.iter().sum::<f64>() / 3.0;
        let var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / 2.0;
        let expected = mean / var.sqrt() * 252.0_f64.sqrt();
        assert!((sharpe_ratio(&curve) - expected).abs() < 1e-9);
    }

    #[test]
    fn empty_ledger_summary_is_all_zero() {
        let ledger = PnlLedger::new(50_000.0, 1000.0, 0.001);
        let summary = ledger.summary(None);
        assert_eq!(summary.total_trades, 0);
        assert_eq!(summary.avg_trade, 0.0);
        assert_eq!(summary.final_capital, 50_000.0);
        assert_eq!(summary.return_pct, 0.0);
        assert_eq!(summary.sharpe_ratio, 0.0);
    }
}
