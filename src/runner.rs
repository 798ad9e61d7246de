use tokio::sync::mpsc;

use crate::pairtrade::{
    log_event, Bar, BacktestSummary, BarSink, EquitySnapshot, PairTradeEngine, TickOutcome,
    TradeIntent, TradeRecord,
};
use crate::trade::execution::order_sink::OrderSink;

#[derive(Debug, Clone)]
pub struct BacktestReport {
    pub summary: BacktestSummary,
    pub trades: Vec<TradeRecord>,
    pub intents: Vec<TradeIntent>,
    pub equity_curve: Vec<EquitySnapshot>,
    /// Bars fed to the engine, rejected ones included.
    pub bars: usize,
    pub rejected: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub bars: usize,
    pub rejected: usize,
}

fn log_outcome(key: &str, outcome: &TickOutcome) {
    for event in &outcome.events {
        log_event(key, event);
    }
}

/// Pushes every bar through `sink`, then finishes it. Rejected bars are
/// logged and skipped.
pub fn replay<S, I>(sink: &mut S, bars: I, mut on_outcome: impl FnMut(TickOutcome)) -> ReplayStats
where
    S: BarSink,
    I: IntoIterator<Item = Bar>,
{
    let mut stats = ReplayStats::default();
    for bar in bars {
        stats.bars += 1;
        match sink.push_bar(&bar) {
            Ok(outcome) => {
                if !outcome.is_empty() {
                    log_outcome(sink.key(), &outcome);
                    on_outcome(outcome);
                }
            }
            Err(err) => {
                stats.rejected += 1;
                log::warn!("[DATA] {} dropped bar {:?}: {}", sink.key(), bar, err);
            }
        }
    }
    let last = sink.finish();
    log_outcome(sink.key(), &last);
    on_outcome(last);
    stats
}

pub fn run_backtest<I>(engine: &mut PairTradeEngine, bars: I) -> BacktestReport
where
    I: IntoIterator<Item = Bar>,
{
    let mut intents = Vec::new();
    let stats = replay(engine, bars, |outcome| intents.extend(outcome.intents));
    let summary = engine.summary();
    log::info!(
        "[BACKTEST] {} bars={} rejected={} trades={} pnl={:.2}",
        engine.key(),
        stats.bars,
        stats.rejected,
        summary.total_trades,
        summary.total_pnl
    );
    BacktestReport {
        summary,
        trades: engine.trades().to_vec(),
        intents,
        equity_curve: engine.equity_curve().to_vec(),
        bars: stats.bars,
        rejected: stats.rejected,
    }
}

async fn forward(sink: &dyn OrderSink, key: &str, intents: &[TradeIntent]) {
    for intent in intents {
        if let Err(e) = sink.submit(intent).await {
            log::error!(
                "[ORDER] {} failed to submit {} {} {}: {}",
                key,
                intent.side,
                intent.quantity,
                intent.symbol,
                e
            );
        }
    }
}

/// Drives `engine` from a channel until every sender is dropped, forwarding
/// intents to `orders` as they are produced.
pub async fn run_live<S: BarSink>(
    engine: &mut S,
    mut bars: mpsc::Receiver<Bar>,
    orders: &dyn OrderSink,
) -> ReplayStats {
    let mut stats = ReplayStats::default();
    while let Some(bar) = bars.recv().await {
        stats.bars += 1;
        match engine.push_bar(&bar) {
            Ok(outcome) => {
                log_outcome(engine.key(), &outcome);
                forward(orders, engine.key(), &outcome.intents).await;
            }
            Err(err) => {
                stats.rejected += 1;
                log::warn!("[DATA] {} dropped bar {:?}: {}", engine.key(), bar, err);
            }
        }
    }
    log::info!("[LIVE] {} feed closed, finalizing", engine.key());
    let last = engine.finish();
    log_outcome(engine.key(), &last);
    forward(orders, engine.key(), &last.intents).await;
    stats
}
